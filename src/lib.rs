pub mod cron_jobs;
pub mod errors;
pub mod modules;
pub mod schema;

pub(crate) mod macros {
    pub mod database_error_handeler;
}
