use snafu::prelude::*;

pub type CustomResult<T> = Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(context(false), display("database error: {}", source))]
    Database { source: diesel::result::Error },

    #[snafu(display("could not connect to database {}: {}", url, source))]
    Connection {
        url: String,
        source: diesel::ConnectionError,
    },

    #[snafu(display("failed to run migrations: {}", message))]
    Migration { message: String },

    #[snafu(display("{} not found", what))]
    NotFound { what: String },

    #[snafu(display("{}", message))]
    AlreadyExists { message: String },

    #[snafu(display("invalid session file: {}", message))]
    InvalidUpload { message: String },

    #[snafu(display("invalid lap: {}", reason))]
    InvalidLap { reason: String },

    #[snafu(display("malformed data in lap {}: {}", lap_id, reason))]
    MalformedLapData { lap_id: i32, reason: String },

    #[snafu(display("recalculating statistics of session {} failed: {}", session_id, source))]
    RecalculationFailure {
        session_id: i32,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(context(false), display("serialization error: {}", source))]
    Serialization { source: serde_json::Error },

    #[snafu(display("could not read {}: {}", path, source))]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("scheduler error: {}", message))]
    Scheduler { message: String },
}

impl Error {
    /// true when the error came out of the statistics calculation rather than
    /// the database round trip around it
    pub fn is_recalculation_failure(&self) -> bool {
        matches!(self, Error::RecalculationFailure { .. })
    }
}
