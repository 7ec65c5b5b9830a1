use log::{error, info};
use serde::Serialize;

use crate::errors::CustomResult;
use crate::modules::models::general::DbConnection;
use crate::modules::models::session::Session;
use crate::modules::statistics::StatisticsCalculator;

/// which sessions a maintenance run looks at
#[derive(Serialize, PartialEq, Eq, Debug, Clone, Copy)]
pub enum RecalculationScope {
    All,
    /// sessions without fresh cached statistics
    OutdatedOnly,
    Session(i32),
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub enum SessionOutcome {
    Recalculated,
    /// dry run, `changed` tells whether the cached values differ from a fresh
    /// calculation
    WouldRecalculate { changed: bool },
    Failed { message: String },
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct SessionReport {
    pub session_id: i32,
    pub outcome: SessionOutcome,
}

#[derive(Serialize, PartialEq, Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub dry_run: bool,
    pub sessions: Vec<SessionReport>,
}

impl MaintenanceReport {
    pub fn recalculated(&self) -> usize {
        self.count(|outcome| matches!(outcome, SessionOutcome::Recalculated))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, SessionOutcome::Failed { .. }))
    }

    /// sessions a dry run found to have changed statistics
    pub fn changed(&self) -> usize {
        self.count(|outcome| matches!(outcome, SessionOutcome::WouldRecalculate { changed: true }))
    }

    fn count(&self, predicate: impl Fn(&SessionOutcome) -> bool) -> usize {
        self.sessions
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

/// the ids of the sessions in scope, ascending
pub fn select_sessions(conn: &mut DbConnection, scope: RecalculationScope) -> CustomResult<Vec<i32>> {
    let mut ids: Vec<i32> = match scope {
        RecalculationScope::All => Session::get_all(conn)?.iter().map(|s| s.id).collect(),
        RecalculationScope::OutdatedOnly => Session::get_outdated(conn)?.iter().map(|s| s.id).collect(),
        RecalculationScope::Session(id) => vec![Session::get_by_db_id(conn, id)?.id],
    };
    ids.sort_unstable();

    Ok(ids)
}

/// # recalculate statistics of many sessions
/// recalculate every session in scope, each in its own transaction. a
/// session that fails is reported and the run continues with the next one.
/// a dry run only calculates and compares against the cached values.
///
/// ## Arguments
/// * `conn` - the database connection
/// * `scope` - the sessions to recalculate
/// * `dry_run` - calculate without storing anything
///
/// ## Returns
/// * `MaintenanceReport` - the outcome per session
pub fn recalculate_all(
    conn: &mut DbConnection,
    scope: RecalculationScope,
    dry_run: bool,
) -> CustomResult<MaintenanceReport> {
    let ids = select_sessions(conn, scope)?;
    info!(
        target: "maintenance:recalculate_all",
        "{} {} sessions ({:?})",
        if dry_run { "checking" } else { "recalculating" },
        ids.len(),
        scope
    );

    let mut report = MaintenanceReport {
        dry_run,
        sessions: Vec::with_capacity(ids.len()),
    };

    for session_id in ids {
        let outcome = if dry_run {
            dry_run_session(conn, session_id)
        } else {
            Session::recalculate(conn, session_id).map(|_| SessionOutcome::Recalculated)
        };

        let outcome = outcome.unwrap_or_else(|e| {
            error!(target: "maintenance:recalculate_all", "session {} failed: {}", session_id, e);
            SessionOutcome::Failed { message: e.to_string() }
        });
        report.sessions.push(SessionReport { session_id, outcome });
    }

    info!(
        target: "maintenance:recalculate_all",
        "done: {} recalculated, {} changed, {} failed",
        report.recalculated(),
        report.changed(),
        report.failed()
    );
    Ok(report)
}

fn dry_run_session(conn: &mut DbConnection, session_id: i32) -> CustomResult<SessionOutcome> {
    let session = Session::get_by_db_id(conn, session_id)?;
    let calculated = StatisticsCalculator::calculate(conn, session_id)?;

    let changed = session.cached_statistics().as_ref() != Some(&calculated);
    Ok(SessionOutcome::WouldRecalculate { changed })
}
