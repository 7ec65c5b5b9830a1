use diesel::Connection;
use log::{info, warn};

use crate::errors::{CustomResult, Error};
use crate::modules::models::general::DbConnection;
use crate::modules::models::lap::{Lap, LapRecord};
use crate::modules::models::session::{NewSession, Session};

/// # ingest a session
/// store a session with all of its laps and calculate its statistics, all in
/// one transaction. when anything fails nothing of the session is stored.
///
/// ## Arguments
/// * `conn` - the database connection
/// * `new_session` - the metadata of the session
/// * `laps` - every lap driven in the session
///
/// ## Returns
/// * `Session` - the stored session with its statistics cached
/// * `Error::AlreadyExists` - a session with the same file hash is stored
pub fn ingest(conn: &mut DbConnection, new_session: &NewSession, laps: &[LapRecord]) -> CustomResult<Session> {
    for lap in laps {
        lap.validate()?;
    }

    conn.transaction::<_, Error, _>(|conn| {
        if let Some(file_hash) = &new_session.file_hash {
            if Session::exists_with_hash(conn, file_hash)? {
                warn!(target: "ingest:ingest", "skipping {}, it was already uploaded", new_session.file_name);
                return Err(Error::AlreadyExists {
                    message: format!("session file {} was already uploaded", new_session.file_name),
                });
            }
        }

        let session = Session::new(conn, new_session)?;
        let inserted = Lap::insert_bulk(conn, session.id, laps)?;
        Session::recalculate(conn, session.id)?;

        info!(
            target: "ingest:ingest",
            "stored session {} from {} with {} laps", session.id, new_session.file_name, inserted
        );
        Session::get_by_db_id(conn, session.id)
    })
}
