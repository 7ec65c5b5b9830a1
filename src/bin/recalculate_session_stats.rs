use std::process;

use clap::{ArgGroup, Parser};
use log::{error, info};

use laptime_analytics::modules::helpers::config::Settings;
use laptime_analytics::modules::helpers::logging::setup_logging;
use laptime_analytics::modules::maintenance::{recalculate_all, RecalculationScope, SessionOutcome};
use laptime_analytics::modules::models::general::establish_connection;

/// recalculate the cached statistics of stored sessions
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(group(ArgGroup::new("scope").required(true).args(["session_id", "all", "outdated_only"])))]
struct Args {
    /// only this session
    #[arg(long)]
    session_id: Option<i32>,

    /// every stored session
    #[arg(long)]
    all: bool,

    /// sessions without fresh statistics
    #[arg(long)]
    outdated_only: bool,

    /// calculate and report, but store nothing
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn scope(&self) -> RecalculationScope {
        match self.session_id {
            Some(id) => RecalculationScope::Session(id),
            None if self.outdated_only => RecalculationScope::OutdatedOnly,
            None => RecalculationScope::All,
        }
    }
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
            error!(target: "recalculate_session_stats", "{}", e);
            process::exit(1);
        }
    };

    let report = match recalculate_all(connection, args.scope(), args.dry_run) {
        Ok(report) => report,
        Err(e) => {
            error!(target: "recalculate_session_stats", "{}", e);
            process::exit(1);
        }
    };

    for session in &report.sessions {
        match &session.outcome {
            SessionOutcome::Recalculated => println!("session {}: recalculated", session.session_id),
            SessionOutcome::WouldRecalculate { changed: true } => {
                println!("session {}: statistics would change", session.session_id)
            }
            SessionOutcome::WouldRecalculate { changed: false } => {
                println!("session {}: up to date", session.session_id)
            }
            SessionOutcome::Failed { message } => {
                println!("session {}: failed ({})", session.session_id, message)
            }
        }
    }

    info!(
        target: "recalculate_session_stats",
        "{} sessions, {} recalculated, {} changed, {} failed",
        report.sessions.len(),
        report.recalculated(),
        report.changed(),
        report.failed()
    );

    if report.failed() > 0 {
        process::exit(1);
    }
}
