//! Event correlation: pairs a dose instant with the history and log events
//! recorded for it and derives one status.
//!
//! Precedence is fixed: a history match always decides the status; a log match
//! only counts when no history event matches, and is otherwise carried along
//! as supplementary data.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::schedule::events::{DoseStatus, HistoryEvent, LogEvent};
use crate::schedule::expander::DoseInstant;

/// Slack, in seconds, when pairing a log event with an instant. Inclusive.
pub const LOG_TOLERANCE_SECS: i64 = 60;

/// The event that decided a dose's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum DoseSource {
    History(HistoryEvent),
    Log(LogEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconcileWarning {
    /// More than one history event claims the same instant. Upstream data
    /// has duplicate intakes; every id is listed so the caller can resolve it.
    AmbiguousHistory { history_ids: Vec<Uuid> },
}

/// A dose instant annotated with its derived status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledDose {
    pub instant: DoseInstant,
    pub status: DoseStatus,
    pub source: Option<DoseSource>,
    /// Log event matched alongside a history event. Never used for status.
    pub supplementary_log: Option<LogEvent>,
    pub warnings: Vec<ReconcileWarning>,
}

impl ReconciledDose {
    pub fn history(&self) -> Option<&HistoryEvent> {
        match &self.source {
            Some(DoseSource::History(h)) => Some(h),
            _ => None,
        }
    }

    /// Actual intake time: the history timestamp, or for a dose marked taken
    /// only through the log, the log's taken time.
    pub fn actual_taken_at(&self) -> Option<NaiveDateTime> {
        match &self.source {
            Some(DoseSource::History(h)) => Some(h.actual_taken_at),
            Some(DoseSource::Log(l)) if l.status == DoseStatus::Taken => l.taken_time,
            _ => None,
        }
    }

    /// Stored corrected flag of whichever event decided the status.
    pub fn stored_corrected(&self) -> Option<bool> {
        match &self.source {
            Some(DoseSource::History(h)) => Some(h.is_corrected),
            Some(DoseSource::Log(l)) => Some(l.is_time_corrected),
            None => None,
        }
    }
}

/// True when the history event was recorded against this exact instant.
pub fn history_matches(instant: &DoseInstant, event: &HistoryEvent) -> bool {
    event.prescription_id == instant.prescription_id
        && event.scheduled_date == instant.date()
        && truncate_subsec(event.scheduled_time) == truncate_subsec(instant.time_of_day())
}

fn log_distance_secs(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (a - b).num_seconds().abs()
}

fn truncate_subsec(t: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    t.with_nanosecond(0).unwrap_or(t)
}

/// Closest log event inside the window; ties go to the earlier scheduled
/// time, then the lower id.
pub fn closest_log<'a>(
    scheduled_at: NaiveDateTime,
    prescription_id: Uuid,
    logs: &'a [LogEvent],
) -> Option<&'a LogEvent> {
    logs.iter()
        .filter(|l| l.prescription_id == prescription_id)
        .filter(|l| log_distance_secs(scheduled_at, l.scheduled_time) <= LOG_TOLERANCE_SECS)
        .min_by_key(|l| {
            (
                log_distance_secs(scheduled_at, l.scheduled_time),
                l.scheduled_time,
                l.id,
            )
        })
}

/// Reconciles one instant against the supplied event snapshots.
pub fn reconcile(
    instant: &DoseInstant,
    logs: &[LogEvent],
    history: &[HistoryEvent],
) -> ReconciledDose {
    let mut history_hits: Vec<&HistoryEvent> = history
        .iter()
        .filter(|h| history_matches(instant, h))
        .collect();
    history_hits.sort_by_key(|h| (h.actual_taken_at, h.id));

    let log_hit = closest_log(instant.scheduled_at, instant.prescription_id, logs);

    let mut warnings = Vec::new();
    if history_hits.len() > 1 {
        let history_ids: Vec<Uuid> = history_hits.iter().map(|h| h.id).collect();
        warn!(
            "{} history events match prescription {} at {}: {:?}",
            history_ids.len(),
            instant.prescription_id,
            instant.scheduled_at,
            history_ids
        );
        warnings.push(ReconcileWarning::AmbiguousHistory { history_ids });
    }

    match history_hits.first() {
        Some(primary) => ReconciledDose {
            instant: instant.clone(),
            status: DoseStatus::Taken,
            source: Some(DoseSource::History((*primary).clone())),
            supplementary_log: log_hit.cloned(),
            warnings,
        },
        None => ReconciledDose {
            instant: instant.clone(),
            status: log_hit.map(|l| l.status).unwrap_or(DoseStatus::Pending),
            source: log_hit.cloned().map(DoseSource::Log),
            supplementary_log: None,
            warnings,
        },
    }
}

/// Reconciles every instant in order.
pub fn reconcile_all(
    instants: &[DoseInstant],
    logs: &[LogEvent],
    history: &[HistoryEvent],
) -> Vec<ReconciledDose> {
    instants
        .iter()
        .map(|instant| reconcile(instant, logs, history))
        .collect()
}
