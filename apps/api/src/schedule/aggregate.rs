use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::correlator::ReconciledDose;
use crate::schedule::events::DoseStatus;
use crate::schedule::timing::{classify_timing, TimingBucket};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdherenceSummary {
    pub total: usize,
    pub taken: usize,
    pub missed: usize,
    pub pending: usize,
    pub skipped: usize,
    /// Percentage of doses taken, 0 when there are none.
    pub adherence_rate: u32,
    /// Percentage of taken doses classified on time, 0 when none were taken.
    pub on_time_rate: u32,
}

/// Optional narrowing applied before aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoseFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub prescription_id: Option<Uuid>,
    pub status: Option<DoseStatus>,
}

impl DoseFilter {
    pub fn matches(&self, dose: &ReconciledDose) -> bool {
        let date = dose.instant.date();
        self.from.map_or(true, |from| date >= from)
            && self.to.map_or(true, |to| date <= to)
            && self
                .prescription_id
                .map_or(true, |id| dose.instant.prescription_id == id)
            && self.status.map_or(true, |s| dose.status == s)
    }
}

fn percent(numerator: usize, denominator: usize) -> u32 {
    if denominator == 0 {
        return 0;
    }
    (numerator as f64 * 100.0 / denominator as f64).round() as u32
}

/// Folds doses into counts and rates. Order of `doses` does not matter.
pub fn aggregate<'a, I>(doses: I) -> AdherenceSummary
where
    I: IntoIterator<Item = &'a ReconciledDose>,
{
    let mut summary = AdherenceSummary::default();
    let mut on_time = 0usize;

    for dose in doses {
        summary.total += 1;
        match dose.status {
            DoseStatus::Taken => {
                summary.taken += 1;
                if classify_timing(dose).is_some_and(|c| c.bucket == TimingBucket::OnTime) {
                    on_time += 1;
                }
            }
            DoseStatus::Missed => summary.missed += 1,
            DoseStatus::Pending => summary.pending += 1,
            DoseStatus::Skipped => summary.skipped += 1,
        }
    }

    summary.adherence_rate = percent(summary.taken, summary.total);
    summary.on_time_rate = percent(on_time, summary.taken);
    summary
}

/// Aggregates only the doses accepted by `filter`.
pub fn aggregate_filtered(doses: &[ReconciledDose], filter: &DoseFilter) -> AdherenceSummary {
    aggregate(doses.iter().filter(|d| filter.matches(d)))
}
