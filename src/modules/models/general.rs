use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info};

use crate::errors::{ConnectionSnafu, CustomResult, Error};
use snafu::ResultExt;

pub type DbConnection = SqliteConnection;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// # establish a connection
/// open the sqlite database at the given url and bring its schema up to date
///
/// ## Arguments
/// * `database_url` - the path of the database, `:memory:` for a throwaway one
///
/// ## Returns
/// * `DbConnection` - a connection with foreign keys enabled and all migrations applied
pub fn establish_connection(database_url: &str) -> CustomResult<DbConnection> {
    let mut conn = SqliteConnection::establish(database_url).context(ConnectionSnafu {
        url: database_url.to_string(),
    })?;

    conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
    run_migrations(&mut conn)?;

    Ok(conn)
}

/// apply every pending embedded migration
pub fn run_migrations(conn: &mut DbConnection) -> CustomResult<()> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if !applied.is_empty() {
                info!(target: "models/general:run_migrations", "applied {} migration(s)", applied.len());
            }
            Ok(())
        }
        Err(error) => {
            error!(target: "models/general:run_migrations", "Error running migrations: {}", error);
            Err(Error::Migration {
                message: error.to_string(),
            })
        }
    }
}
