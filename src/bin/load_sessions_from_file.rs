use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{error, info, warn};

use laptime_analytics::errors::Error;
use laptime_analytics::modules::helpers::config::Settings;
use laptime_analytics::modules::helpers::logging::setup_logging;
use laptime_analytics::modules::models::general::establish_connection;
use laptime_analytics::modules::session_file::{load_session_file, save_session};

/// store result files, or every json file in a directory
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn collect_files(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            error!(target: "load_sessions_from_file", "can not read {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|file| file.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    files.sort();
    files
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
            error!(target: "load_sessions_from_file", "{}", e);
            std::process::exit(1);
        }
    };

    for file in args.paths.iter().flat_map(|path| collect_files(path)) {
        let upload = match load_session_file(&file) {
            Ok(upload) => upload,
            Err(e) => {
                warn!(target: "load_sessions_from_file", "skipping {}: {}", file.display(), e);
                continue;
            }
        };

        match save_session(connection, &upload) {
            Ok(session) => {
                info!(target: "load_sessions_from_file", "saved session {}: {}", session.id, session);
            }
            Err(Error::AlreadyExists { .. }) => {
                info!(target: "load_sessions_from_file", "already stored: {}", file.display());
            }
            Err(e) => {
                error!(target: "load_sessions_from_file", "failed to save {}: {}", file.display(), e);
            }
        }
    }
}
