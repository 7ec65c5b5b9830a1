//! Statistics of a single session.
//!
//! Everything in here is derived from the laps of one session and nothing
//! else: no previously cached value is ever read back. The calculation walks
//! the laps once, collecting per driver and per sector index, and then folds
//! the collected values into the structures that are cached on the session.
//!
//! Racing laps are the laps with a lap number above 0. The out-lap (lap 0)
//! counts towards a driver's `lap_count` and shows up in the chart series, but
//! never in best, average, optimal, consistency or any sector highlight.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{CustomResult, Error};
use crate::modules::helpers::math::Math;
use crate::modules::models::general::DbConnection;
use crate::modules::models::lap::Lap;

/// aggregate values of one driver in a session
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct DriverStatistics {
    pub best_lap_time: Option<f64>,
    /// sum of the driver's best time at every sector index they recorded.
    /// a sector index the driver never recorded adds nothing, so this is only
    /// comparable between drivers with the same sector coverage.
    pub optimal_lap_time: Option<f64>,
    /// every lap of the driver, out-lap included
    pub lap_count: i32,
    pub racing_lap_count: i32,
    pub avg_lap_time: Option<f64>,
    pub consistency: Option<f64>,
    /// presentation only, always true when calculated
    pub visible: bool,
}

/// lap times per driver, ready to be drawn
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct ChartSeries {
    /// every lap number driven in the session, ascending
    pub lap_numbers: Vec<i32>,
    /// per driver the total time of every lap they recorded. a lap number
    /// the driver did not record is missing from their map.
    pub drivers: BTreeMap<String, BTreeMap<i32, f64>>,
}

impl ChartSeries {
    /// the time a driver set on a lap, `None` when they did not record it
    pub fn time_at(&self, driver_name: &str, lap_number: i32) -> Option<f64> {
        self.drivers
            .get(driver_name)
            .and_then(|laps| laps.get(&lap_number))
            .copied()
    }
}

/// a single sector time and who set it
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct SectorRecord {
    pub time: f64,
    pub driver_name: String,
    pub lap_number: i32,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct SectorHighlight {
    pub fastest: SectorRecord,
    pub slowest: SectorRecord,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct LapHighlights {
    pub fastest_total: Option<f64>,
    pub slowest_total: Option<f64>,
    pub driver_pb_total: BTreeMap<String, f64>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct SectorStatistics {
    /// length of the longest sector list in the session
    pub sector_count: usize,
    pub sector_highlights: BTreeMap<usize, SectorHighlight>,
    /// per driver their best time at every sector index they recorded
    pub driver_pb_sectors: BTreeMap<String, BTreeMap<usize, f64>>,
    pub lap_highlights: LapHighlights,
}

impl SectorStatistics {
    pub fn fastest(&self, sector: usize) -> Option<&SectorRecord> {
        self.sector_highlights.get(&sector).map(|h| &h.fastest)
    }

    pub fn slowest(&self, sector: usize) -> Option<&SectorRecord> {
        self.sector_highlights.get(&sector).map(|h| &h.slowest)
    }

    pub fn personal_best(&self, driver_name: &str, sector: usize) -> Option<f64> {
        self.driver_pb_sectors
            .get(driver_name)
            .and_then(|sectors| sectors.get(&sector))
            .copied()
    }
}

/// everything that is cached on a session
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct SessionStatistics {
    pub driver_statistics: BTreeMap<String, DriverStatistics>,
    pub chart_series: ChartSeries,
    pub sector_statistics: SectorStatistics,
    pub fastest_lap_time: Option<f64>,
    pub fastest_lap_driver: Option<String>,
    pub total_laps: i32,
    pub total_drivers: i32,
}

#[derive(Default)]
struct DriverAccumulator {
    lap_count: i32,
    racing_times: Vec<f64>,
    best_lap: Option<f64>,
    best_sectors: Vec<Option<f64>>,
}

impl DriverAccumulator {
    fn finish(self) -> (DriverStatistics, BTreeMap<usize, f64>) {
        let personal_bests: BTreeMap<usize, f64> = self
            .best_sectors
            .iter()
            .enumerate()
            .filter_map(|(idx, time)| time.map(|t| (idx, t)))
            .collect();

        let optimal_lap_time = if personal_bests.is_empty() {
            None
        } else {
            Some(personal_bests.values().sum())
        };

        let statistics = DriverStatistics {
            best_lap_time: self.best_lap,
            optimal_lap_time,
            lap_count: self.lap_count,
            racing_lap_count: self.racing_times.len() as i32,
            avg_lap_time: Math::mean(&self.racing_times),
            consistency: Math::consistency(&self.racing_times),
            visible: true,
        };

        (statistics, personal_bests)
    }
}

fn keep_min(slot: &mut Option<f64>, value: f64) {
    match slot {
        Some(current) if *current <= value => {}
        _ => *slot = Some(value),
    }
}

fn grow_to<T: Clone>(values: &mut Vec<T>, len: usize, fill: T) {
    if values.len() < len {
        values.resize(len, fill);
    }
}

pub struct StatisticsCalculator {}

impl StatisticsCalculator {
    /// # calculate the statistics of a session
    /// read the current laps of the session and calculate every statistic
    /// from them.
    ///
    /// ## Arguments
    /// * `conn` - the database connection
    /// * `session_id` - the database id of the session
    ///
    /// ## Returns
    /// * `SessionStatistics` - the statistics of the session as it is stored right now
    pub fn calculate(conn: &mut DbConnection, session_id: i32) -> CustomResult<SessionStatistics> {
        let laps = Lap::from_session(conn, session_id)?;
        StatisticsCalculator::from_laps(&laps)
    }

    /// # calculate statistics from laps
    /// calculate the statistics of a set of laps belonging to one session.
    /// the order of the slice does not matter, laps are walked in
    /// (lap number, car index, id) order so ties are resolved the same way
    /// every time.
    ///
    /// ## Arguments
    /// * `laps` - every lap of the session
    ///
    /// ## Returns
    /// * `SessionStatistics` - the statistics
    /// * `Error::MalformedLapData` - a lap has an unreadable sector list or a non finite time
    pub fn from_laps(laps: &[Lap]) -> CustomResult<SessionStatistics> {
        let mut ordered: Vec<&Lap> = laps.iter().collect();
        ordered.sort_by_key(|lap| (lap.lap_number, lap.car_index, lap.id));

        let mut drivers: BTreeMap<String, DriverAccumulator> = BTreeMap::new();
        let mut chart_drivers: BTreeMap<String, BTreeMap<i32, f64>> = BTreeMap::new();
        let mut lap_numbers: BTreeSet<i32> = BTreeSet::new();

        let mut sector_count = 0;
        let mut sector_fastest: Vec<Option<SectorRecord>> = Vec::new();
        let mut sector_slowest: Vec<Option<SectorRecord>> = Vec::new();

        let mut fastest_lap: Option<&Lap> = None;
        let mut slowest_total: Option<f64> = None;

        for lap in ordered {
            if !lap.total_time.is_finite() {
                return Err(Error::MalformedLapData {
                    lap_id: lap.id,
                    reason: format!("lap time {} is not a number", lap.total_time),
                });
            }
            let sectors = lap.sector_times()?;
            sector_count = sector_count.max(sectors.len());

            lap_numbers.insert(lap.lap_number);
            let chart_laps = chart_drivers.entry(lap.driver_name.clone()).or_default();
            let chart_time = chart_laps.entry(lap.lap_number).or_insert(lap.total_time);
            if lap.total_time < *chart_time {
                *chart_time = lap.total_time;
            }

            let driver = drivers.entry(lap.driver_name.clone()).or_default();
            driver.lap_count += 1;

            if !lap.is_racing_lap() {
                continue;
            }

            driver.racing_times.push(lap.total_time);
            keep_min(&mut driver.best_lap, lap.total_time);

            if fastest_lap.map_or(true, |fastest| lap.total_time < fastest.total_time) {
                fastest_lap = Some(lap);
            }
            if slowest_total.map_or(true, |slowest| lap.total_time > slowest) {
                slowest_total = Some(lap.total_time);
            }

            grow_to(&mut driver.best_sectors, sectors.len(), None);
            grow_to(&mut sector_fastest, sectors.len(), None);
            grow_to(&mut sector_slowest, sectors.len(), None);

            for (idx, time) in sectors.iter().enumerate() {
                let time = match time {
                    Some(time) => *time,
                    None => continue,
                };

                keep_min(&mut driver.best_sectors[idx], time);

                let record = || SectorRecord {
                    time,
                    driver_name: lap.driver_name.clone(),
                    lap_number: lap.lap_number,
                };
                if sector_fastest[idx].as_ref().map_or(true, |f| time < f.time) {
                    sector_fastest[idx] = Some(record());
                }
                if sector_slowest[idx].as_ref().map_or(true, |s| time > s.time) {
                    sector_slowest[idx] = Some(record());
                }
            }
        }

        let mut driver_statistics = BTreeMap::new();
        let mut driver_pb_sectors = BTreeMap::new();
        let mut driver_pb_total = BTreeMap::new();
        for (name, accumulator) in drivers {
            let (statistics, personal_bests) = accumulator.finish();
            if let Some(best) = statistics.best_lap_time {
                driver_pb_total.insert(name.clone(), best);
            }
            driver_pb_sectors.insert(name.clone(), personal_bests);
            driver_statistics.insert(name, statistics);
        }

        let sector_highlights = sector_fastest
            .into_iter()
            .zip(sector_slowest)
            .enumerate()
            .filter_map(|(idx, pair)| match pair {
                (Some(fastest), Some(slowest)) => Some((idx, SectorHighlight { fastest, slowest })),
                _ => None,
            })
            .collect();

        let fastest_lap_time = fastest_lap.map(|lap| lap.total_time);
        let total_drivers = driver_statistics.len() as i32;

        Ok(SessionStatistics {
            driver_statistics,
            chart_series: ChartSeries {
                lap_numbers: lap_numbers.into_iter().collect(),
                drivers: chart_drivers,
            },
            sector_statistics: SectorStatistics {
                sector_count,
                sector_highlights,
                driver_pb_sectors,
                lap_highlights: LapHighlights {
                    fastest_total: fastest_lap_time,
                    slowest_total,
                    driver_pb_total,
                },
            },
            fastest_lap_time,
            fastest_lap_driver: fastest_lap.map(|lap| lap.driver_name.clone()),
            total_laps: laps.len() as i32,
            total_drivers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap(id: i32, lap_number: i32, driver: &str, car_index: i32, total_time: f64, sectors: &str) -> Lap {
        Lap {
            id,
            session_id: 1,
            lap_number,
            driver_name: driver.to_string(),
            car_index,
            total_time,
            sectors: sectors.to_string(),
            tyre_compound: "M".to_string(),
            cuts: 0,
        }
    }

    #[test]
    fn two_driver_scenario() {
        let laps = vec![
            lap(1, 1, "A", 0, 90.0, "[30.0,30.0,30.0]"),
            lap(2, 2, "A", 0, 88.5, "[29.0,30.0,29.5]"),
            lap(3, 1, "B", 1, 91.0, "[31.0,30.0,30.0]"),
        ];

        let stats = StatisticsCalculator::from_laps(&laps).unwrap();

        let a = &stats.driver_statistics["A"];
        assert_eq!(a.best_lap_time, Some(88.5));
        assert_eq!(a.optimal_lap_time, Some(88.5));
        assert_eq!(a.racing_lap_count, 2);
        assert_eq!(stats.driver_statistics["B"].best_lap_time, Some(91.0));

        assert_eq!(stats.fastest_lap_time, Some(88.5));
        assert_eq!(stats.fastest_lap_driver.as_deref(), Some("A"));
        assert_eq!(stats.total_laps, 3);
        assert_eq!(stats.total_drivers, 2);

        let sectors = &stats.sector_statistics;
        assert_eq!(sectors.sector_count, 3);
        let fastest = sectors.fastest(0).unwrap();
        assert_eq!((fastest.time, fastest.driver_name.as_str()), (29.0, "A"));
        let slowest = sectors.slowest(0).unwrap();
        assert_eq!((slowest.time, slowest.driver_name.as_str()), (31.0, "B"));
        assert_eq!(sectors.personal_best("A", 2), Some(29.5));
        assert_eq!(sectors.lap_highlights.slowest_total, Some(91.0));
    }

    #[test]
    fn empty_session_has_empty_statistics() {
        let stats = StatisticsCalculator::from_laps(&[]).unwrap();
        assert_eq!(stats, SessionStatistics::default());
    }

    #[test]
    fn out_lap_only_driver_has_absent_times() {
        let stats = StatisticsCalculator::from_laps(&[lap(1, 0, "A", 0, 130.0, "[45.0,45.0,40.0]")]).unwrap();

        let a = &stats.driver_statistics["A"];
        assert_eq!(a.best_lap_time, None);
        assert_eq!(a.optimal_lap_time, None);
        assert_eq!(a.avg_lap_time, None);
        assert_eq!(a.consistency, None);
        assert_eq!(a.lap_count, 1);
        assert_eq!(a.racing_lap_count, 0);

        assert_eq!(stats.fastest_lap_time, None);
        assert_eq!(stats.fastest_lap_driver, None);
        assert!(stats.sector_statistics.sector_highlights.is_empty());
        assert_eq!(stats.chart_series.time_at("A", 0), Some(130.0));
    }

    #[test]
    fn shorter_sector_list_is_absent_not_zero() {
        let laps = vec![
            lap(1, 1, "A", 0, 90.0, "[30.0,30.0,30.0]"),
            lap(2, 2, "A", 0, 60.0, "[29.0,31.0]"),
        ];

        let stats = StatisticsCalculator::from_laps(&laps).unwrap();
        let sectors = &stats.sector_statistics;
        assert_eq!(sectors.sector_count, 3);
        assert_eq!(sectors.fastest(2).unwrap().time, 30.0);
        assert_eq!(sectors.slowest(2).unwrap().time, 30.0);
        assert_eq!(stats.driver_statistics["A"].optimal_lap_time, Some(89.0));
    }

    #[test]
    fn null_sector_entries_are_skipped() {
        let laps = vec![lap(1, 1, "A", 0, 90.0, "[30.0,null,30.0]"), lap(2, 2, "A", 0, 91.0, "")];

        let stats = StatisticsCalculator::from_laps(&laps).unwrap();
        assert_eq!(stats.sector_statistics.personal_best("A", 1), None);
        assert_eq!(stats.driver_statistics["A"].optimal_lap_time, Some(60.0));
        assert!(stats.sector_statistics.fastest(1).is_none());
    }

    #[test]
    fn unreadable_sectors_fail_the_calculation() {
        let laps = vec![lap(7, 1, "A", 0, 90.0, "not a list")];

        match StatisticsCalculator::from_laps(&laps) {
            Err(Error::MalformedLapData { lap_id, .. }) => assert_eq!(lap_id, 7),
            other => panic!("expected malformed lap data, got {:?}", other),
        }
    }

    #[test]
    fn chart_series_leaves_unrecorded_laps_absent() {
        let laps = vec![
            lap(1, 1, "A", 0, 90.0, "[]"),
            lap(2, 2, "A", 0, 89.0, "[]"),
            lap(3, 1, "B", 1, 91.0, "[]"),
        ];

        let chart = StatisticsCalculator::from_laps(&laps).unwrap().chart_series;
        assert_eq!(chart.lap_numbers, vec![1, 2]);
        assert_eq!(chart.time_at("B", 1), Some(91.0));
        assert_eq!(chart.time_at("B", 2), None);
        assert!(!chart.drivers["B"].contains_key(&2));
    }

    #[test]
    fn input_order_does_not_change_the_result() {
        let mut laps = vec![
            lap(1, 1, "A", 0, 90.0, "[30.0,30.0,30.0]"),
            lap(2, 2, "A", 0, 90.0, "[29.0,30.0,31.0]"),
            lap(3, 1, "B", 1, 90.0, "[29.0,30.0,30.0]"),
        ];
        let forward = StatisticsCalculator::from_laps(&laps).unwrap();
        laps.reverse();
        let backward = StatisticsCalculator::from_laps(&laps).unwrap();

        assert_eq!(forward, backward);
        // lap 1 comes before lap 2, so A's lap 1 holds the tied fastest total
        assert_eq!(forward.fastest_lap_driver.as_deref(), Some("A"));
        assert_eq!(forward.sector_statistics.fastest(0).unwrap().lap_number, 1);
    }
}
