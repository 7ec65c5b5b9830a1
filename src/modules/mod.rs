pub mod ingest;
pub mod maintenance;
pub mod session_file;
pub mod statistics;

pub mod models {
    pub mod session;
    pub mod lap;

    pub mod general;
}

pub mod helpers {
    pub mod config;
    pub mod format;
    pub mod logging;
    pub mod math;
}
