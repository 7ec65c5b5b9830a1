use std::fmt;

use diesel::prelude::*;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{CustomResult, Error};
use crate::macros::database_error_handeler::{db_handle_get_error, db_handle_write_error};
use crate::modules::helpers::format::format_lap_time;
use crate::modules::models::general::DbConnection;
use crate::modules::models::session::Session;
use crate::schema::laps;

/// a lap as it comes in, before it belongs to a stored session
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct LapRecord {
    pub lap_number: i32,
    pub driver_name: String,
    pub car_index: i32,
    /// seconds
    pub total_time: f64,
    /// seconds, `None` for a sector without a recorded time
    pub sectors: Vec<Option<f64>>,
    pub tyre_compound: String,
    pub cuts: i32,
}

impl LapRecord {
    /// reject records that can never produce a usable lap
    pub fn validate(&self) -> CustomResult<()> {
        if !self.total_time.is_finite() || self.total_time < 0.0 {
            return Err(Error::InvalidLap {
                reason: format!(
                    "lap {} of {} has an invalid time {}",
                    self.lap_number, self.driver_name, self.total_time
                ),
            });
        }

        if self.lap_number < 0 {
            return Err(Error::InvalidLap {
                reason: format!("lap number {} of {} is negative", self.lap_number, self.driver_name),
            });
        }

        if self.sectors.iter().flatten().any(|sector| !sector.is_finite()) {
            return Err(Error::InvalidLap {
                reason: format!(
                    "lap {} of {} has a sector time that is not a number",
                    self.lap_number, self.driver_name
                ),
            });
        }

        Ok(())
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = laps)]
pub struct NewLap {
    pub session_id: i32,
    pub lap_number: i32,
    pub driver_name: String,
    pub car_index: i32,
    pub total_time: f64,
    pub sectors: String,
    pub tyre_compound: String,
    pub cuts: i32,
}

impl NewLap {
    pub fn from_record(session_id: i32, record: &LapRecord) -> CustomResult<NewLap> {
        record.validate()?;

        Ok(NewLap {
            session_id,
            lap_number: record.lap_number,
            driver_name: record.driver_name.clone(),
            car_index: record.car_index,
            total_time: record.total_time,
            sectors: serde_json::to_string(&record.sectors)?,
            tyre_compound: record.tyre_compound.clone(),
            cuts: record.cuts,
        })
    }
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, PartialEq, Debug, Clone,
)]
#[diesel(table_name = laps, check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(belongs_to(Session, foreign_key = session_id))]
pub struct Lap {
    pub id: i32,
    pub session_id: i32,
    pub lap_number: i32,
    pub driver_name: String,
    pub car_index: i32,
    pub total_time: f64,
    /// json list of sector times in seconds, entries may be null
    pub sectors: String,
    pub tyre_compound: String,
    pub cuts: i32,
}

/// the editable fields of a lap, `None` leaves a field as it is
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct LapChanges {
    pub lap_number: Option<i32>,
    pub driver_name: Option<String>,
    pub total_time: Option<f64>,
    pub sectors: Option<Vec<Option<f64>>>,
    pub tyre_compound: Option<String>,
    pub cuts: Option<i32>,
}

impl LapChanges {
    pub fn is_empty(&self) -> bool {
        self == &LapChanges::default()
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = laps)]
struct LapChangeset {
    lap_number: Option<i32>,
    driver_name: Option<String>,
    total_time: Option<f64>,
    sectors: Option<String>,
    tyre_compound: Option<String>,
    cuts: Option<i32>,
}

impl Lap {
    /************ MUTATIONS ************/
    /// # add a lap to a session
    /// insert a single lap into a stored session and recalculate the
    /// statistics of that session in the same transaction
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `session_id` - the database id of the session
    /// * `record` - the lap to add
    ///
    /// ## Returns
    /// * `Lap` - the inserted lap
    pub fn insert(conn: &mut DbConnection, session_id: i32, record: &LapRecord) -> CustomResult<Lap> {
        let new_lap = NewLap::from_record(session_id, record)?;

        conn.transaction::<_, Error, _>(|conn| {
            Session::get_by_db_id(conn, session_id)?;

            let lap = db_handle_write_error!(
                diesel::insert_into(laps::table)
                    .values(&new_lap)
                    .returning(Lap::as_returning())
                    .get_result::<Lap>(conn),
                "models/lap:insert",
                format!("lap {} of session {}", new_lap.lap_number, session_id)
            );
            Session::touch_laps(conn, session_id)?;
            Session::recalculate(conn, session_id)?;

            info!(target: "models/lap:insert", "added {} to session {}", lap, session_id);
            Ok(lap)
        })
    }

    /// # edit a lap
    /// change the given fields of a lap and recalculate the statistics of its
    /// session in the same transaction. an empty change set leaves
    /// everything untouched.
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `lap_id` - the database id of the lap
    /// * `changes` - the fields to change
    ///
    /// ## Returns
    /// * `Lap` - the lap after the edit
    pub fn update(conn: &mut DbConnection, lap_id: i32, changes: &LapChanges) -> CustomResult<Lap> {
        if changes.is_empty() {
            return Lap::from_id(conn, lap_id);
        }

        if let Some(total_time) = changes.total_time {
            if !total_time.is_finite() || total_time < 0.0 {
                return Err(Error::InvalidLap {
                    reason: format!("lap time {} is invalid", total_time),
                });
            }
        }
        let sectors = match &changes.sectors {
            Some(sectors) if sectors.iter().flatten().any(|s| !s.is_finite()) => {
                return Err(Error::InvalidLap {
                    reason: "sector time is not a number".to_string(),
                });
            }
            Some(sectors) => Some(serde_json::to_string(sectors)?),
            None => None,
        };

        let changeset = LapChangeset {
            lap_number: changes.lap_number,
            driver_name: changes.driver_name.clone(),
            total_time: changes.total_time,
            sectors,
            tyre_compound: changes.tyre_compound.clone(),
            cuts: changes.cuts,
        };

        conn.transaction::<_, Error, _>(|conn| {
            let lap = Lap::from_id(conn, lap_id)?;

            let updated = db_handle_write_error!(
                diesel::update(laps::table.find(lap_id))
                    .set(&changeset)
                    .returning(Lap::as_returning())
                    .get_result::<Lap>(conn),
                "models/lap:update",
                format!("lap {}", lap_id)
            );
            Session::touch_laps(conn, lap.session_id)?;
            Session::recalculate(conn, lap.session_id)?;

            info!(target: "models/lap:update", "edited lap {} of session {}", lap_id, lap.session_id);
            Ok(updated)
        })
    }

    /// # delete a lap
    /// delete a single lap and recalculate the statistics of its session in
    /// the same transaction
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `lap_id` - the database id of the lap
    pub fn delete(conn: &mut DbConnection, lap_id: i32) -> CustomResult<()> {
        conn.transaction::<_, Error, _>(|conn| {
            let lap = Lap::from_id(conn, lap_id)?;

            db_handle_write_error!(
                diesel::delete(laps::table.find(lap_id)).execute(conn),
                "models/lap:delete",
                format!("lap {}", lap_id)
            );
            Session::touch_laps(conn, lap.session_id)?;
            Session::recalculate(conn, lap.session_id)?;

            info!(target: "models/lap:delete", "deleted {} from session {}", lap, lap.session_id);
            Ok(())
        })
    }

    /// # insert the laps of a new session
    /// write all laps in one statement and bump the lap revision of the
    /// session. the caller is responsible for recalculating afterwards.
    pub(crate) fn insert_bulk(
        conn: &mut DbConnection,
        session_id: i32,
        records: &[LapRecord],
    ) -> CustomResult<usize> {
        let new_laps = records
            .iter()
            .map(|record| NewLap::from_record(session_id, record))
            .collect::<CustomResult<Vec<NewLap>>>()?;

        if new_laps.is_empty() {
            warn!(target: "models/lap:insert_bulk", "session {} has no laps", session_id);
            return Ok(0);
        }

        let inserted = db_handle_write_error!(
            diesel::insert_into(laps::table).values(&new_laps).execute(conn),
            "models/lap:insert_bulk",
            format!("laps of session {}", session_id)
        );
        Session::touch_laps(conn, session_id)?;

        Ok(inserted)
    }

    /// # delete the laps of one driver
    /// delete every lap a driver drove in a session and bump the lap
    /// revision when anything was deleted. the caller is responsible for
    /// recalculating afterwards.
    pub(crate) fn delete_driver_laps(
        conn: &mut DbConnection,
        session_id: i32,
        driver_name: &str,
    ) -> CustomResult<usize> {
        let deleted = db_handle_write_error!(
            diesel::delete(
                laps::table
                    .filter(laps::session_id.eq(session_id))
                    .filter(laps::driver_name.eq(driver_name)),
            )
            .execute(conn),
            "models/lap:delete_driver_laps",
            format!("laps of {} in session {}", driver_name, session_id)
        );

        if deleted > 0 {
            Session::touch_laps(conn, session_id)?;
        }

        Ok(deleted)
    }

    /************ GETTERS ************/
    /// # get a lap by its id
    ///
    /// ## Arguments
    /// * `conn` - The database connection to use
    /// * `lap_id` - The id of the lap to get
    ///
    /// ## Returns
    /// * `Lap` - The lap with the given id
    pub fn from_id(conn: &mut DbConnection, lap_id: i32) -> CustomResult<Lap> {
        let lap = db_handle_get_error!(
            laps::table
                .find(lap_id)
                .select(Lap::as_select())
                .first::<Lap>(conn),
            "models/lap:from_id",
            format!("lap {}", lap_id)
        );

        Ok(lap)
    }

    /// # get all laps driven in a session
    /// ordered by lap number, then car index
    ///
    /// ## Arguments
    /// * `conn` - The database connection to use
    /// * `session_id` - The database id of the session
    ///
    /// ## Returns
    /// * `Vec<Lap>` - All laps driven in the session
    pub fn from_session(conn: &mut DbConnection, session_id: i32) -> QueryResult<Vec<Lap>> {
        laps::table
            .filter(laps::session_id.eq(session_id))
            .order((laps::lap_number.asc(), laps::car_index.asc(), laps::id.asc()))
            .select(Lap::as_select())
            .load::<Lap>(conn)
    }

    /// # get the drivers of a session
    /// the distinct driver names in a session, sorted by name
    pub fn drivers_of_session(conn: &mut DbConnection, session_id: i32) -> QueryResult<Vec<String>> {
        laps::table
            .filter(laps::session_id.eq(session_id))
            .select(laps::driver_name)
            .distinct()
            .order(laps::driver_name.asc())
            .load::<String>(conn)
    }

    /************ UTILS ************/

    /// out-laps (lap number 0) are not racing laps
    pub fn is_racing_lap(&self) -> bool {
        self.lap_number > 0
    }

    /// # get the sector times
    /// parse the stored sector list. an empty or null column is a lap
    /// without sectors.
    ///
    /// ## Returns
    /// * `Vec<Option<f64>>` - the sector times in seconds
    /// * `Error::MalformedLapData` - the column does not hold a list of times
    pub fn sector_times(&self) -> CustomResult<Vec<Option<f64>>> {
        let raw = self.sectors.trim();
        if raw.is_empty() || raw == "null" {
            return Ok(Vec::new());
        }

        serde_json::from_str::<Vec<Option<f64>>>(raw).map_err(|error| Error::MalformedLapData {
            lap_id: self.id,
            reason: format!("sectors are not a list of times ({})", error),
        })
    }

    /// the lap time as `M:SS.mmm`
    pub fn format_time(&self) -> String {
        format_lap_time(Some(self.total_time))
    }
}

impl fmt::Display for Lap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Lap {} - {} ({})", self.lap_number, self.driver_name, self.format_time())
    }
}
