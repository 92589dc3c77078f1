//! Runs the full pipeline over one consistent snapshot:
//! expand → reconcile → classify → aggregate.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::prescription::Prescription;
use crate::schedule::aggregate::{aggregate, AdherenceSummary, DoseFilter};
use crate::schedule::correlator::{reconcile_all, ReconciledDose};
use crate::schedule::events::{HistoryEvent, LogEvent};
use crate::schedule::expander::expand_range;
use crate::schedule::rule::RecurrenceRule;
use crate::schedule::timing::{classify_timing, TimingClassification};

/// Rules, logs and history as of the same logical read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
    pub rules: Vec<RecurrenceRule>,
    #[serde(default)]
    pub logs: Vec<LogEvent>,
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
}

impl Snapshot {
    /// Rules eligible for expansion. When prescriptions are supplied, rules
    /// belonging to inactive ones are dropped; rules for prescriptions not in
    /// the list are kept as-is.
    pub fn expandable_rules(&self) -> Vec<RecurrenceRule> {
        let inactive: Vec<Uuid> = self
            .prescriptions
            .iter()
            .filter(|p| !p.active)
            .map(|p| p.id)
            .collect();
        self.rules
            .iter()
            .filter(|r| !inactive.contains(&r.prescription_id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseView {
    #[serde(flatten)]
    pub dose: ReconciledDose,
    pub prescription_name: Option<String>,
    pub timing: Option<TimingClassification>,
    pub is_future: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub doses: Vec<DoseView>,
    pub summary: AdherenceSummary,
    pub warning_count: usize,
}

/// Builds the dose report for `from..=to`. `now` is only used for the
/// `is_future` display flag; it never changes a status.
pub fn build_report(
    snapshot: &Snapshot,
    from: NaiveDate,
    to: NaiveDate,
    filter: &DoseFilter,
    now: NaiveDateTime,
) -> DoseReport {
    let names: HashMap<Uuid, &str> = snapshot
        .prescriptions
        .iter()
        .map(|p| (p.id, p.name.as_str()))
        .collect();

    let instants = expand_range(&snapshot.expandable_rules(), from, to);
    let reconciled: Vec<ReconciledDose> = reconcile_all(&instants, &snapshot.logs, &snapshot.history)
        .into_iter()
        .filter(|d| filter.matches(d))
        .collect();

    let summary = aggregate(&reconciled);
    let warning_count = reconciled.iter().map(|d| d.warnings.len()).sum();

    let doses = reconciled
        .into_iter()
        .map(|dose| DoseView {
            prescription_name: names
                .get(&dose.instant.prescription_id)
                .map(|n| n.to_string()),
            timing: classify_timing(&dose),
            is_future: dose.instant.scheduled_at > now,
            dose,
        })
        .collect();

    DoseReport {
        from,
        to,
        doses,
        summary,
        warning_count,
    }
}
