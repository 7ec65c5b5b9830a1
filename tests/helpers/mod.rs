#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

use laptime_analytics::modules::ingest::ingest;
use laptime_analytics::modules::models::general::{establish_connection, DbConnection};
use laptime_analytics::modules::models::lap::LapRecord;
use laptime_analytics::modules::models::session::{NewSession, PlayerInfo, Session};
use laptime_analytics::schema::{laps, sessions};

pub fn connection() -> DbConnection {
    establish_connection(":memory:").expect("in-memory database")
}

pub fn upload_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .and_then(|d| d.and_hms_opt(18, 0, 0))
        .expect("valid date")
}

pub fn lap(lap_number: i32, driver: &str, car_index: i32, total_time: f64, sectors: &[f64]) -> LapRecord {
    LapRecord {
        lap_number,
        driver_name: driver.to_string(),
        car_index,
        total_time,
        sectors: sectors.iter().map(|s| Some(*s)).collect(),
        tyre_compound: "M".to_string(),
        cuts: 0,
    }
}

pub fn new_session(file_name: &str) -> NewSession {
    NewSession {
        session_name: None,
        track: "ks_vallelunga".to_string(),
        car: "ks_mazda_mx5_cup".to_string(),
        session_type: "Practice".to_string(),
        upload_date: upload_date(),
        file_name: file_name.to_string(),
        file_hash: Some(format!("hash-of-{}", file_name)),
        players: vec![
            PlayerInfo {
                name: "A".to_string(),
                car: "ks_mazda_mx5_cup".to_string(),
            },
            PlayerInfo {
                name: "B".to_string(),
                car: "ks_mazda_mx5_cup".to_string(),
            },
        ],
    }
}

/// driver A: 90.0 and 88.5, driver B: 91.0
pub fn two_driver_laps() -> Vec<LapRecord> {
    vec![
        lap(1, "A", 0, 90.0, &[30.0, 30.0, 30.0]),
        lap(2, "A", 0, 88.5, &[29.0, 30.0, 29.5]),
        lap(1, "B", 1, 91.0, &[31.0, 30.0, 30.0]),
    ]
}

pub fn two_driver_session(conn: &mut DbConnection, file_name: &str) -> Session {
    ingest(conn, &new_session(file_name), &two_driver_laps()).expect("ingest")
}

/// move the lap revision on without touching the cache, as if the laps were
/// changed behind the cache writer's back
pub fn mark_outdated(conn: &mut DbConnection, session_id: i32) {
    diesel::update(sessions::table.find(session_id))
        .set(sessions::laps_revision.eq(sessions::laps_revision + 1))
        .execute(conn)
        .expect("bump revision");
}

/// store sectors that can not be parsed, bypassing validation
pub fn corrupt_sectors(conn: &mut DbConnection, lap_id: i32) {
    diesel::update(laps::table.find(lap_id))
        .set(laps::sectors.eq("not a list"))
        .execute(conn)
        .expect("corrupt lap");
}
