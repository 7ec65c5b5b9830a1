use std::fs;
use std::path::Path;

use chrono::{NaiveDateTime, Utc};
use log::{debug, info};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use snafu::ResultExt;

use crate::errors::{CustomResult, Error, IoSnafu};
use crate::modules::ingest::ingest;
use crate::modules::models::general::DbConnection;
use crate::modules::models::lap::LapRecord;
use crate::modules::models::session::{NewSession, PlayerInfo, Session};

const DEFAULT_SESSION_TYPE: &str = "Practice";
const UNKNOWN: &str = "Unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

#[derive(Deserialize, Debug)]
struct RaceFile {
    track: String,
    #[serde(default)]
    players: Vec<RaceFilePlayer>,
    #[serde(default)]
    sessions: Vec<RaceFileSession>,
    /// json encoded settings of the quick drive screen
    #[serde(rename = "__quickDrive", default)]
    quick_drive: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RaceFilePlayer {
    #[serde(default = "unknown")]
    name: String,
    #[serde(default = "unknown")]
    car: String,
}

#[derive(Deserialize, Debug)]
struct RaceFileSession {
    #[serde(rename = "type", default)]
    session_type: Option<i64>,
    #[serde(default)]
    laps: Vec<RaceFileLap>,
}

#[derive(Deserialize, Debug)]
struct RaceFileLap {
    #[serde(default)]
    lap: i32,
    #[serde(default)]
    car: i32,
    /// milliseconds
    #[serde(default)]
    time: f64,
    /// milliseconds
    #[serde(default)]
    sectors: Vec<Option<f64>>,
    #[serde(default = "unknown")]
    tyre: String,
    #[serde(default)]
    cuts: i32,
}

#[derive(Deserialize, Debug)]
struct QuickDrive {
    #[serde(rename = "Mode")]
    mode: Option<String>,
}

/// a parsed result file, ready to be ingested
#[derive(PartialEq, Debug, Clone)]
pub struct SessionUpload {
    pub session: NewSession,
    pub laps: Vec<LapRecord>,
}

/// # parse a result file
/// turn the content of an uploaded result file into session metadata and
/// lap records. only the first session of the file is used.
///
/// ## Arguments
/// * `file_name` - the name the file was uploaded as, must end in `.json`
/// * `content` - the content of the file
/// * `upload_date` - the moment of the upload
///
/// ## Returns
/// * `SessionUpload` - the session and its laps
/// * `Error::InvalidUpload` - the file is not a usable result file
pub fn parse_session_file(
    file_name: &str,
    content: &str,
    upload_date: NaiveDateTime,
) -> CustomResult<SessionUpload> {
    if !file_name.to_lowercase().ends_with(".json") {
        return Err(Error::InvalidUpload {
            message: format!("{} is not a json file", file_name),
        });
    }

    let file: RaceFile = serde_json::from_str(content).map_err(|e| Error::InvalidUpload {
        message: format!("{} could not be read: {}", file_name, e),
    })?;

    let session_data = file.sessions.first().ok_or_else(|| Error::InvalidUpload {
        message: format!("{} contains no sessions", file_name),
    })?;

    let players: Vec<PlayerInfo> = file
        .players
        .iter()
        .map(|player| PlayerInfo {
            name: player.name.clone(),
            car: player.car.clone(),
        })
        .collect();

    let laps = session_data
        .laps
        .iter()
        .map(|lap| LapRecord {
            lap_number: lap.lap,
            driver_name: driver_name(&players, lap.car),
            car_index: lap.car,
            total_time: lap.time / 1000.0,
            sectors: lap
                .sectors
                .iter()
                .map(|sector| sector.map(|ms| ms / 1000.0))
                .collect(),
            tyre_compound: lap.tyre.clone(),
            cuts: lap.cuts,
        })
        .collect::<Vec<LapRecord>>();

    let session_type = session_type(file.quick_drive.as_deref(), session_data.session_type);
    debug!(
        target: "session_file:parse_session_file",
        "{} is a {} session on {} with {} laps", file_name, session_type, file.track, laps.len()
    );

    Ok(SessionUpload {
        session: NewSession {
            session_name: None,
            track: file.track,
            car: players.first().map_or_else(unknown, |player| player.car.clone()),
            session_type,
            upload_date,
            file_name: file_name.to_string(),
            file_hash: Some(file_hash(content)),
            players,
        },
        laps,
    })
}

/// # load a result file from disk
/// read and parse a result file, using the current time as upload date
pub fn load_session_file(path: &Path) -> CustomResult<SessionUpload> {
    let content = fs::read_to_string(path).context(IoSnafu {
        path: path.display().to_string(),
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    parse_session_file(&file_name, &content, Utc::now().naive_utc())
}

/// store a parsed result file
pub fn save_session(conn: &mut DbConnection, upload: &SessionUpload) -> CustomResult<Session> {
    let session = ingest(conn, &upload.session, &upload.laps)?;
    info!(target: "session_file:save_session", "saved {}", session);

    Ok(session)
}

/// sha256 of the file content, used to detect duplicate uploads
pub fn file_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

fn driver_name(players: &[PlayerInfo], car_index: i32) -> String {
    usize::try_from(car_index)
        .ok()
        .and_then(|idx| players.get(idx))
        .map_or_else(unknown, |player| player.name.clone())
}

/// the mode name of the quick drive screen, falling back to the numeric
/// session type when the mode does not tell more than the default
fn session_type(quick_drive: Option<&str>, numeric_type: Option<i64>) -> String {
    let from_mode = quick_drive
        .and_then(mode_name)
        .unwrap_or_else(|| DEFAULT_SESSION_TYPE.to_string());

    if from_mode != DEFAULT_SESSION_TYPE {
        return from_mode;
    }

    match numeric_type {
        Some(2) => "Qualifying".to_string(),
        Some(3) => "Race".to_string(),
        _ => DEFAULT_SESSION_TYPE.to_string(),
    }
}

/// `/Pages/Drive/QuickDrive_Trackday.xaml` -> `Trackday`
fn mode_name(quick_drive: &str) -> Option<String> {
    let mode = serde_json::from_str::<QuickDrive>(quick_drive).ok()?.mode?;
    if !mode.contains('/') {
        return None;
    }

    let last = mode.rsplit('/').next()?;
    let last = last.strip_suffix(".xaml").unwrap_or(last);
    let name = last.strip_prefix("QuickDrive_").unwrap_or(last);

    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_date() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .unwrap()
    }

    const FILE: &str = r#"{
        "track": "ks_vallelunga",
        "players": [
            {"name": "Alice", "car": "ks_mazda_mx5_cup"},
            {"name": "Bob", "car": "ks_mazda_mx5_cup"}
        ],
        "sessions": [{
            "type": 3,
            "laps": [
                {"lap": 0, "car": 0, "time": 120000, "sectors": [40000, 40000, 40000], "tyre": "M", "cuts": 0},
                {"lap": 1, "car": 0, "time": 90567, "sectors": [30000, 30567, 30000], "tyre": "M", "cuts": 1},
                {"lap": 1, "car": 5, "time": 91000, "sectors": [], "tyre": "S", "cuts": 0}
            ]
        }]
    }"#;

    #[test]
    fn parses_laps_and_converts_to_seconds() {
        let upload = parse_session_file("race.json", FILE, upload_date()).unwrap();

        assert_eq!(upload.session.track, "ks_vallelunga");
        assert_eq!(upload.session.car, "ks_mazda_mx5_cup");
        assert_eq!(upload.session.session_type, "Race");
        assert_eq!(upload.session.players.len(), 2);
        assert_eq!(upload.laps.len(), 3);

        let lap = &upload.laps[1];
        assert_eq!(lap.driver_name, "Alice");
        assert_eq!(lap.total_time, 90.567);
        assert_eq!(lap.sectors, vec![Some(30.0), Some(30.567), Some(30.0)]);
        assert_eq!(lap.cuts, 1);
    }

    #[test]
    fn unknown_car_index_gets_unknown_driver() {
        let upload = parse_session_file("race.json", FILE, upload_date()).unwrap();
        assert_eq!(upload.laps[2].driver_name, "Unknown");
        assert!(upload.laps[2].sectors.is_empty());
    }

    #[test]
    fn quick_drive_mode_names_the_session() {
        let content = r#"{
            "track": "Trackday Test Track",
            "__quickDrive": "{\"Mode\": \"/Pages/Drive/QuickDrive_Trackday.xaml\"}",
            "players": [{"name": "Test Driver", "car": "Test Car"}],
            "sessions": [{"laps": [{"lap": 1, "car": 0, "time": 90567, "sectors": [], "tyre": "M", "cuts": 0}]}]
        }"#;

        let upload = parse_session_file("test.json", content, upload_date()).unwrap();
        assert_eq!(upload.session.session_type, "Trackday");
    }

    #[test]
    fn session_type_fallbacks() {
        assert_eq!(session_type(None, None), "Practice");
        assert_eq!(session_type(None, Some(2)), "Qualifying");
        assert_eq!(session_type(Some("not json"), Some(3)), "Race");
        assert_eq!(session_type(Some(r#"{"Mode": "Trackday"}"#), None), "Practice");
        assert_eq!(session_type(Some(r#"{"Mode": "/Pages/Drive/Hotlap.xaml"}"#), Some(3)), "Hotlap");
    }

    #[test]
    fn rejects_unusable_files() {
        let not_json = parse_session_file("race.txt", FILE, upload_date());
        assert!(matches!(not_json, Err(Error::InvalidUpload { .. })));

        let broken = parse_session_file("race.json", "{\"track\": ", upload_date());
        assert!(matches!(broken, Err(Error::InvalidUpload { .. })));

        let empty = parse_session_file("race.json", r#"{"track": "x", "players": [], "sessions": []}"#, upload_date());
        assert!(matches!(empty, Err(Error::InvalidUpload { .. })));
    }

    #[test]
    fn same_content_gives_same_hash() {
        let first = parse_session_file("a.json", FILE, upload_date()).unwrap();
        let second = parse_session_file("b.json", FILE, upload_date()).unwrap();
        assert_eq!(first.session.file_hash, second.session.file_hash);
        assert_eq!(first.session.file_hash.as_deref().map(str::len), Some(64));
    }
}
