mod helpers;

use std::fs;

use laptime_analytics::errors::Error;
use laptime_analytics::modules::models::session::{Session, StatisticsSource};
use laptime_analytics::modules::session_file::{load_session_file, parse_session_file, save_session};

use helpers::*;

const RESULT_FILE: &str = r#"{
    "track": "ks_vallelunga",
    "__quickDrive": "{\"Mode\": \"/Pages/Drive/QuickDrive_Trackday.xaml\"}",
    "players": [
        {"name": "Alice", "car": "ks_mazda_mx5_cup"},
        {"name": "Bob", "car": "ks_mazda_mx5_cup"}
    ],
    "sessions": [{
        "laps": [
            {"lap": 0, "car": 0, "time": 120000, "sectors": [40000, 40000, 40000], "tyre": "M", "cuts": 0},
            {"lap": 1, "car": 0, "time": 90000, "sectors": [30000, 30000, 30000], "tyre": "M", "cuts": 0},
            {"lap": 2, "car": 0, "time": 88500, "sectors": [29000, 30000, 29500], "tyre": "M", "cuts": 0},
            {"lap": 1, "car": 1, "time": 91000, "sectors": [31000, 30000, 30000], "tyre": "S", "cuts": 2}
        ]
    }]
}"#;

#[test]
fn result_file_is_stored_with_statistics() {
    let conn = &mut connection();
    let upload = parse_session_file("vallelunga.json", RESULT_FILE, upload_date()).unwrap();
    let session = save_session(conn, &upload).unwrap();

    assert_eq!(session.session_type, "Trackday");
    assert_eq!(session.car, "ks_mazda_mx5_cup");
    assert_eq!(session.players().unwrap().len(), 2);
    assert_eq!(session.drivers(conn).unwrap(), vec!["Alice", "Bob"]);

    let view = Session::get_statistics(conn, session.id).unwrap();
    assert_eq!(view.source, StatisticsSource::Cached);
    let stats = view.statistics;
    assert_eq!(stats.total_laps, 4);
    assert_eq!(stats.fastest_lap_time, Some(88.5));
    assert_eq!(stats.fastest_lap_driver.as_deref(), Some("Alice"));
    assert_eq!(stats.driver_statistics["Alice"].lap_count, 3);
    assert_eq!(stats.driver_statistics["Alice"].racing_lap_count, 2);
    assert_eq!(stats.chart_series.lap_numbers, vec![0, 1, 2]);
    assert_eq!(stats.chart_series.time_at("Bob", 2), None);
}

#[test]
fn same_file_is_only_stored_once() {
    let conn = &mut connection();
    let first = parse_session_file("a.json", RESULT_FILE, upload_date()).unwrap();
    let second = parse_session_file("b.json", RESULT_FILE, upload_date()).unwrap();

    save_session(conn, &first).unwrap();
    let again = save_session(conn, &second);
    assert!(matches!(again, Err(Error::AlreadyExists { .. })));
}

#[test]
fn file_is_loaded_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vallelunga.json");
    fs::write(&path, RESULT_FILE).unwrap();

    let upload = load_session_file(&path).unwrap();
    assert_eq!(upload.session.file_name, "vallelunga.json");
    assert_eq!(upload.laps.len(), 4);

    let conn = &mut connection();
    let session = save_session(conn, &upload).unwrap();
    assert!(session.has_fresh_statistics());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_session_file(&dir.path().join("missing.json"));
    assert!(matches!(result, Err(Error::Io { .. })));
}
