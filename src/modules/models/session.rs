use std::fmt;

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::errors::{CustomResult, Error, RecalculationFailureSnafu};
use crate::macros::database_error_handeler::{db_handle_get_error, db_handle_write_error};
use crate::modules::helpers::format::format_lap_time;
use crate::modules::models::general::DbConnection;
use crate::modules::models::lap::Lap;
use crate::modules::statistics::{SessionStatistics, StatisticsCalculator};
use crate::schema::{laps, sessions};

/// one entry of the player list in an uploaded result file
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct PlayerInfo {
    pub name: String,
    pub car: String,
}

/// the metadata of a session that is about to be stored
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct NewSession {
    pub session_name: Option<String>,
    pub track: String,
    pub car: String,
    pub session_type: String,
    pub upload_date: NaiveDateTime,
    pub file_name: String,
    pub file_hash: Option<String>,
    pub players: Vec<PlayerInfo>,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
struct NewSessionRow<'a> {
    session_name: Option<&'a str>,
    track: &'a str,
    car: &'a str,
    session_type: &'a str,
    upload_date: NaiveDateTime,
    file_name: &'a str,
    file_hash: Option<&'a str>,
    players_data: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, PartialEq, Debug, Clone)]
#[diesel(table_name = sessions, check_for_backend(diesel::sqlite::Sqlite))]
pub struct Session {
    pub id: i32,
    pub session_name: Option<String>,
    pub track: String,
    pub car: String,
    pub session_type: String,
    pub upload_date: NaiveDateTime,
    pub file_name: String,
    pub file_hash: Option<String>,
    pub players_data: String,
    pub laps_revision: i32,
    pub fastest_lap_time: Option<f64>,
    pub fastest_lap_driver: Option<String>,
    pub total_laps: Option<i32>,
    pub total_drivers: Option<i32>,
    pub driver_statistics: Option<String>,
    pub chart_series: Option<String>,
    pub sector_statistics: Option<String>,
    pub stats_revision: Option<i32>,
    pub last_calculated: Option<NaiveDateTime>,
}

/// metadata edits. `None` keeps the current value, `session_name:
/// Some(None)` clears the name.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct SessionDetails {
    pub session_name: Option<Option<String>>,
    pub track: Option<String>,
    pub car: Option<String>,
    pub session_type: Option<String>,
    pub upload_date: Option<NaiveDateTime>,
}

#[derive(AsChangeset)]
#[diesel(table_name = sessions)]
struct SessionDetailsChangeset<'a> {
    session_name: Option<Option<&'a str>>,
    track: Option<&'a str>,
    car: Option<&'a str>,
    session_type: Option<&'a str>,
    upload_date: Option<NaiveDateTime>,
}

/// every cached column, written in a single update
#[derive(AsChangeset)]
#[diesel(table_name = sessions, treat_none_as_null = true)]
struct CachedStatisticsRow {
    fastest_lap_time: Option<f64>,
    fastest_lap_driver: Option<String>,
    total_laps: Option<i32>,
    total_drivers: Option<i32>,
    driver_statistics: Option<String>,
    chart_series: Option<String>,
    sector_statistics: Option<String>,
    stats_revision: Option<i32>,
    last_calculated: Option<NaiveDateTime>,
}

impl CachedStatisticsRow {
    fn new(statistics: &SessionStatistics, revision: i32) -> CustomResult<CachedStatisticsRow> {
        Ok(CachedStatisticsRow {
            fastest_lap_time: statistics.fastest_lap_time,
            fastest_lap_driver: statistics.fastest_lap_driver.clone(),
            total_laps: Some(statistics.total_laps),
            total_drivers: Some(statistics.total_drivers),
            driver_statistics: Some(serde_json::to_string(&statistics.driver_statistics)?),
            chart_series: Some(serde_json::to_string(&statistics.chart_series)?),
            sector_statistics: Some(serde_json::to_string(&statistics.sector_statistics)?),
            stats_revision: Some(revision),
            last_calculated: Some(Utc::now().naive_utc()),
        })
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub enum StatisticsSource {
    /// read from the cached columns
    Cached,
    /// calculated from the laps for this request only
    Computed,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct StatisticsView {
    pub statistics: SessionStatistics,
    pub source: StatisticsSource,
    pub last_calculated: Option<NaiveDateTime>,
}

impl Session {
    /************ CREATION ************/
    /// # create session
    /// store the metadata of a new session. the session starts without laps
    /// and without cached statistics.
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `new_session` - the metadata of the session
    ///
    /// ## Returns
    /// * `Session` - the created session
    /// * `Error::AlreadyExists` - a session with the same file hash is stored
    pub(crate) fn new(conn: &mut DbConnection, new_session: &NewSession) -> CustomResult<Session> {
        let row = NewSessionRow {
            session_name: new_session.session_name.as_deref(),
            track: &new_session.track,
            car: &new_session.car,
            session_type: &new_session.session_type,
            upload_date: new_session.upload_date,
            file_name: &new_session.file_name,
            file_hash: new_session.file_hash.as_deref(),
            players_data: serde_json::to_string(&new_session.players)?,
        };

        let result = diesel::insert_into(sessions::table)
            .values(&row)
            .returning(Session::as_returning())
            .get_result::<Session>(conn);

        match result {
            Ok(session) => Ok(session),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(Error::AlreadyExists {
                    message: format!("session file {} was already uploaded", new_session.file_name),
                })
            }
            Err(e) => {
                error!(target: "models/session:new", "Error creating session {}: {}", new_session.file_name, e);
                Err(Error::from(e))
            }
        }
    }

    /// bump the lap revision of a session, marking its cache as outdated
    pub(crate) fn touch_laps(conn: &mut DbConnection, session_id: i32) -> CustomResult<()> {
        let updated = db_handle_write_error!(
            diesel::update(sessions::table.find(session_id))
                .set(sessions::laps_revision.eq(sessions::laps_revision + 1))
                .execute(conn),
            "models/session:touch_laps",
            format!("revision of session {}", session_id)
        );

        if updated == 0 {
            return Err(Error::NotFound {
                what: format!("session {}", session_id),
            });
        }

        Ok(())
    }

    /************ GETTERS ************/
    pub fn exists_with_hash(conn: &mut DbConnection, file_hash: &str) -> CustomResult<bool> {
        let count = db_handle_get_error!(
            sessions::table
                .filter(sessions::file_hash.eq(file_hash))
                .count()
                .get_result::<i64>(conn),
            "models/session:exists_with_hash",
            format!("session with hash {}", file_hash)
        );

        Ok(count > 0)
    }

    /// # get session by id
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `session_id` - the database id of the session
    ///
    /// ## Returns
    /// * `Session` - the session
    /// * `Error::NotFound` - no session has this id
    pub fn get_by_db_id(conn: &mut DbConnection, session_id: i32) -> CustomResult<Session> {
        let session = db_handle_get_error!(
            sessions::table
                .find(session_id)
                .select(Session::as_select())
                .first::<Session>(conn),
            "models/session:get_by_db_id",
            format!("session {}", session_id)
        );

        Ok(session)
    }

    /// all sessions, newest upload first
    pub fn get_all(conn: &mut DbConnection) -> CustomResult<Vec<Session>> {
        let all = db_handle_get_error!(
            sessions::table
                .order((sessions::upload_date.desc(), sessions::id.desc()))
                .select(Session::as_select())
                .load::<Session>(conn),
            "models/session:get_all",
            "sessions"
        );

        Ok(all)
    }

    /// # get outdated sessions
    /// all sessions whose cached statistics are missing or were calculated
    /// from an older set of laps, ordered by id
    pub fn get_outdated(conn: &mut DbConnection) -> CustomResult<Vec<Session>> {
        let all = db_handle_get_error!(
            sessions::table
                .order(sessions::id.asc())
                .select(Session::as_select())
                .load::<Session>(conn),
            "models/session:get_outdated",
            "sessions"
        );

        Ok(all
            .into_iter()
            .filter(|session| !session.has_fresh_statistics())
            .collect())
    }

    pub fn laps(&self, conn: &mut DbConnection) -> CustomResult<Vec<Lap>> {
        Ok(Lap::from_session(conn, self.id)?)
    }

    pub fn drivers(&self, conn: &mut DbConnection) -> CustomResult<Vec<String>> {
        Ok(Lap::drivers_of_session(conn, self.id)?)
    }

    /************ EDITS ************/
    /// # edit session metadata
    /// change name, track, car, type or upload date. the laps stay untouched
    /// so the cached statistics stay valid.
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `session_id` - the database id of the session
    /// * `details` - the fields to change
    ///
    /// ## Returns
    /// * `Session` - the session after the edit
    pub fn update_details(
        conn: &mut DbConnection,
        session_id: i32,
        details: &SessionDetails,
    ) -> CustomResult<Session> {
        if details == &SessionDetails::default() {
            return Session::get_by_db_id(conn, session_id);
        }

        let changeset = SessionDetailsChangeset {
            session_name: details.session_name.as_ref().map(|name| name.as_deref()),
            track: details.track.as_deref(),
            car: details.car.as_deref(),
            session_type: details.session_type.as_deref(),
            upload_date: details.upload_date,
        };

        let session = db_handle_get_error!(
            diesel::update(sessions::table.find(session_id))
                .set(&changeset)
                .returning(Session::as_returning())
                .get_result::<Session>(conn),
            "models/session:update_details",
            format!("session {}", session_id)
        );

        info!(target: "models/session:update_details", "updated details of {}", session);
        Ok(session)
    }

    /// # delete session
    /// delete a session together with all of its laps
    ///
    /// ## Returns
    /// * `true` - the session was deleted
    /// * `false` - there was no session with this id
    pub fn delete(conn: &mut DbConnection, session_id: i32) -> CustomResult<bool> {
        conn.transaction::<_, Error, _>(|conn| {
            let deleted_laps = db_handle_write_error!(
                diesel::delete(laps::table.filter(laps::session_id.eq(session_id))).execute(conn),
                "models/session:delete",
                format!("laps of session {}", session_id)
            );
            let deleted = db_handle_write_error!(
                diesel::delete(sessions::table.find(session_id)).execute(conn),
                "models/session:delete",
                format!("session {}", session_id)
            );

            if deleted == 0 {
                warn!(target: "models/session:delete", "session {} does not exist", session_id);
                return Ok(false);
            }

            info!(target: "models/session:delete", "deleted session {} and {} laps", session_id, deleted_laps);
            Ok(true)
        })
    }

    /// # remove driver
    /// delete every lap of one driver from a session and recalculate the
    /// statistics in the same transaction
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `session_id` - the database id of the session
    /// * `driver_name` - the driver to remove
    ///
    /// ## Returns
    /// * `usize` - the number of deleted laps, 0 when the driver did not drive
    ///   in the session
    pub fn remove_driver(
        conn: &mut DbConnection,
        session_id: i32,
        driver_name: &str,
    ) -> CustomResult<usize> {
        conn.transaction::<_, Error, _>(|conn| {
            Session::get_by_db_id(conn, session_id)?;

            let deleted = Lap::delete_driver_laps(conn, session_id, driver_name)?;
            if deleted == 0 {
                warn!(
                    target: "models/session:remove_driver",
                    "driver {} has no laps in session {}", driver_name, session_id
                );
                return Ok(0);
            }

            Session::recalculate(conn, session_id)?;
            info!(
                target: "models/session:remove_driver",
                "removed {} laps of {} from session {}", deleted, driver_name, session_id
            );
            Ok(deleted)
        })
    }

    /************ STATISTICS ************/
    /// # recalculate statistics
    /// read the laps of the session, calculate the statistics and overwrite
    /// every cached column in one update. runs in a transaction, or a
    /// savepoint when called from inside a lap mutation.
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `session_id` - the database id of the session
    ///
    /// ## Returns
    /// * `SessionStatistics` - the statistics that were stored
    /// * `Error::RecalculationFailure` - the laps could not be turned into
    ///   statistics, nothing was written
    pub fn recalculate(conn: &mut DbConnection, session_id: i32) -> CustomResult<SessionStatistics> {
        conn.transaction::<_, Error, _>(|conn| {
            let session = Session::get_by_db_id(conn, session_id)?;

            let statistics = StatisticsCalculator::calculate(conn, session_id).map_err(|e| {
                error!(
                    target: "models/session:recalculate",
                    "calculating statistics of session {} failed: {}", session_id, e
                );
                e
            }).context(RecalculationFailureSnafu { session_id })?;

            let row = CachedStatisticsRow::new(&statistics, session.laps_revision)?;
            db_handle_write_error!(
                diesel::update(sessions::table.find(session_id))
                    .set(&row)
                    .execute(conn),
                "models/session:recalculate",
                format!("statistics of session {}", session_id)
            );

            info!(
                target: "models/session:recalculate",
                "recalculated session {} ({} laps, {} drivers)",
                session_id, statistics.total_laps, statistics.total_drivers
            );
            Ok(statistics)
        })
    }

    /// the cache is fresh when it is complete and was calculated from the
    /// current lap revision
    pub fn has_fresh_statistics(&self) -> bool {
        self.last_calculated.is_some()
            && self.total_laps.is_some()
            && self.total_drivers.is_some()
            && self.driver_statistics.is_some()
            && self.chart_series.is_some()
            && self.sector_statistics.is_some()
            && self.stats_revision == Some(self.laps_revision)
    }

    /// # cached statistics
    /// decode the cached columns. gives `None` when the cache is not fresh or
    /// any of the cached structures can not be decoded.
    pub fn cached_statistics(&self) -> Option<SessionStatistics> {
        if !self.has_fresh_statistics() {
            return None;
        }

        match self.decode_cache() {
            Ok(statistics) => statistics,
            Err(e) => {
                warn!(
                    target: "models/session:cached_statistics",
                    "cached statistics of session {} are unreadable: {}", self.id, e
                );
                None
            }
        }
    }

    fn decode_cache(&self) -> CustomResult<Option<SessionStatistics>> {
        let (Some(driver_statistics), Some(chart_series), Some(sector_statistics)) = (
            self.driver_statistics.as_deref(),
            self.chart_series.as_deref(),
            self.sector_statistics.as_deref(),
        ) else {
            return Ok(None);
        };
        let (Some(total_laps), Some(total_drivers)) = (self.total_laps, self.total_drivers) else {
            return Ok(None);
        };

        Ok(Some(SessionStatistics {
            driver_statistics: serde_json::from_str(driver_statistics)?,
            chart_series: serde_json::from_str(chart_series)?,
            sector_statistics: serde_json::from_str(sector_statistics)?,
            fastest_lap_time: self.fastest_lap_time,
            fastest_lap_driver: self.fastest_lap_driver.clone(),
            total_laps,
            total_drivers,
        }))
    }

    /// # get statistics
    /// the cached statistics when they are fresh, otherwise statistics
    /// calculated from the laps. calculated statistics are not stored.
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `session_id` - the database id of the session
    ///
    /// ## Returns
    /// * `StatisticsView` - the statistics and where they came from
    pub fn get_statistics(conn: &mut DbConnection, session_id: i32) -> CustomResult<StatisticsView> {
        let session = Session::get_by_db_id(conn, session_id)?;

        if let Some(statistics) = session.cached_statistics() {
            return Ok(StatisticsView {
                statistics,
                source: StatisticsSource::Cached,
                last_calculated: session.last_calculated,
            });
        }

        info!(
            target: "models/session:get_statistics",
            "statistics of session {} are outdated, calculating on demand", session_id
        );
        let statistics = StatisticsCalculator::calculate(conn, session_id)?;

        Ok(StatisticsView {
            statistics,
            source: StatisticsSource::Computed,
            last_calculated: session.last_calculated,
        })
    }

    /************ UTILS ************/
    pub fn players(&self) -> CustomResult<Vec<PlayerInfo>> {
        Ok(serde_json::from_str::<Vec<PlayerInfo>>(&self.players_data)?)
    }

    pub fn display_name(&self) -> String {
        match &self.session_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{} - {}", self.track, self.car),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, fastest {})",
            self.display_name(),
            self.session_type,
            self.upload_date.format("%Y-%m-%d %H:%M"),
            format_lap_time(self.fastest_lap_time)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            id: 1,
            session_name: None,
            track: "ks_vallelunga".to_string(),
            car: "ks_mazda_mx5_cup".to_string(),
            session_type: "Practice".to_string(),
            upload_date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .unwrap(),
            file_name: "race.json".to_string(),
            file_hash: None,
            players_data: r#"[{"name":"A","car":"ks_mazda_mx5_cup"}]"#.to_string(),
            laps_revision: 2,
            fastest_lap_time: Some(88.5),
            fastest_lap_driver: Some("A".to_string()),
            total_laps: Some(3),
            total_drivers: Some(1),
            driver_statistics: Some("{}".to_string()),
            chart_series: Some(r#"{"lap_numbers":[],"drivers":{}}"#.to_string()),
            sector_statistics: Some(
                r#"{"sector_count":0,"sector_highlights":{},"driver_pb_sectors":{},"lap_highlights":{"fastest_total":null,"slowest_total":null,"driver_pb_total":{}}}"#
                    .to_string(),
            ),
            stats_revision: Some(2),
            last_calculated: chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(12, 5, 0)),
        }
    }

    #[test]
    fn fresh_when_revisions_match() {
        let session = session();
        assert!(session.has_fresh_statistics());
        assert!(session.cached_statistics().is_some());
    }

    #[test]
    fn outdated_after_lap_revision_moves_on() {
        let mut session = session();
        session.laps_revision = 3;
        assert!(!session.has_fresh_statistics());
        assert!(session.cached_statistics().is_none());
    }

    #[test]
    fn incomplete_cache_is_not_fresh() {
        let mut session = session();
        session.chart_series = None;
        assert!(!session.has_fresh_statistics());

        let mut session = self::session();
        session.last_calculated = None;
        assert!(!session.has_fresh_statistics());
    }

    #[test]
    fn unreadable_cache_is_ignored() {
        let mut session = session();
        session.driver_statistics = Some("not json".to_string());
        assert!(session.has_fresh_statistics());
        assert!(session.cached_statistics().is_none());
    }

    #[test]
    fn display_name_falls_back_to_track_and_car() {
        let mut session = session();
        assert_eq!(session.display_name(), "ks_vallelunga - ks_mazda_mx5_cup");
        session.session_name = Some("Sunday league".to_string());
        assert_eq!(session.display_name(), "Sunday league");
    }

    #[test]
    fn players_are_decoded() {
        let players = session().players().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].name, "A");
    }
}
