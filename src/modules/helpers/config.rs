use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use log::LevelFilter;

const DEFAULT_DATABASE_URL: &str = "laptimes.sqlite3";
const DEFAULT_LOG_FILE: &str = "program.log";
// every 2 hours
const DEFAULT_BACKFILL_INTERVAL_SECS: u64 = 7200;

/// runtime settings read from the environment (and `.env` when present)
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub logging_level: LevelFilter,
    pub log_file: Option<String>,
    pub backfill_interval: Duration,
}

impl Settings {
    /// # load settings
    /// read the settings from the environment. a `.env` file in the working
    /// directory is loaded first.
    ///
    /// ## Environment
    /// * `DATABASE_URL` - path of the sqlite database
    /// * `LOGGING_LEVEL` - OFF, ERROR, WARN, INFO, DEBUG or TRACE
    /// * `LOG_FILE` - file to log into, `-` to only log to stdout
    /// * `BACKFILL_INTERVAL_SECS` - seconds between two scheduled backfills
    pub fn from_env() -> Settings {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let logging_level = Settings::parse_level(
            &env::var("LOGGING_LEVEL").unwrap_or_default(),
        );

        let log_file = match env::var("LOG_FILE") {
            Ok(file) if file == "-" => None,
            Ok(file) if !file.is_empty() => Some(file),
            _ => Some(DEFAULT_LOG_FILE.to_string()),
        };

        let backfill_interval = env::var("BACKFILL_INTERVAL_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_BACKFILL_INTERVAL_SECS);

        Settings {
            database_url,
            logging_level,
            log_file,
            backfill_interval: Duration::from_secs(backfill_interval),
        }
    }

    /// map a level name onto a filter, anything unknown is info
    pub fn parse_level(level: &str) -> LevelFilter {
        match level.to_uppercase().as_str() {
            "OFF" => LevelFilter::Off,
            "ERROR" => LevelFilter::Error,
            "WARN" => LevelFilter::Warn,
            "DEBUG" => LevelFilter::Debug,
            "TRACE" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            logging_level: LevelFilter::Info,
            log_file: Some(DEFAULT_LOG_FILE.to_string()),
            backfill_interval: Duration::from_secs(DEFAULT_BACKFILL_INTERVAL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_is_case_insensitive() {
        assert_eq!(Settings::parse_level("debug"), LevelFilter::Debug);
        assert_eq!(Settings::parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(Settings::parse_level("Off"), LevelFilter::Off);
    }

    #[test]
    fn unknown_level_defaults_to_info() {
        assert_eq!(Settings::parse_level(""), LevelFilter::Info);
        assert_eq!(Settings::parse_level("verbose"), LevelFilter::Info);
    }
}
