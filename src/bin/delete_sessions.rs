use clap::Parser;
use log::{error, info, warn};

use laptime_analytics::modules::helpers::config::Settings;
use laptime_analytics::modules::helpers::logging::setup_logging;
use laptime_analytics::modules::models::general::establish_connection;
use laptime_analytics::modules::models::session::Session;

/// delete sessions and their laps
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(required = true)]
    session_ids: Vec<i32>,
}

fn main() {
    let args = Args::parse();
    let settings = Settings::from_env();
    if let Err(e) = setup_logging(&settings) {
        eprintln!("failed to setup logging: {}", e);
    }

    let connection = &mut match establish_connection(&settings.database_url) {
        Ok(conn) => conn,
        Err(e) => {
            error!(target: "delete_sessions", "{}", e);
            std::process::exit(1);
        }
    };

    for session_id in args.session_ids {
        match Session::delete(connection, session_id) {
            Ok(true) => info!(target: "delete_sessions", "deleted session {}", session_id),
            Ok(false) => warn!(target: "delete_sessions", "session {} does not exist", session_id),
            Err(e) => error!(target: "delete_sessions", "failed to delete session {}: {}", session_id, e),
        }
    }
}
