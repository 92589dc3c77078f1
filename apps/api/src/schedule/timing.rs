use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::schedule::correlator::ReconciledDose;

/// Largest absolute offset, in minutes, still considered on time.
pub const ON_TIME_MINUTES: i64 = 15;
/// Largest absolute offset, in minutes, classed as a moderate deviation.
pub const MODERATE_MINUTES: i64 = 60;
/// Offsets beyond this many minutes mean the recorded time was corrected.
/// Display uses this derived signal; the flag stored on the event is only
/// reported alongside it (`stored_corrected`, `flag_mismatch`).
pub const CORRECTION_MINUTES: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingBucket {
    OnTime,
    ModerateDeviation,
    LargeDeviation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingClassification {
    /// Signed; positive is late, negative early.
    pub offset_minutes: i64,
    pub bucket: TimingBucket,
    /// Derived from the offset. Authoritative for display.
    pub corrected: bool,
    /// Flag persisted on the event, kept for audit.
    pub stored_corrected: Option<bool>,
    /// Set when the persisted flag and the derived signal disagree.
    pub flag_mismatch: bool,
}

/// Signed difference between the actual and scheduled instants, rounded to
/// the nearest whole minute (halves away from zero).
pub fn offset_minutes(scheduled: NaiveDateTime, actual: NaiveDateTime) -> i64 {
    let secs = (actual - scheduled).num_seconds();
    (secs as f64 / 60.0).round() as i64
}

pub fn bucket_for(offset_minutes: i64) -> TimingBucket {
    match offset_minutes.abs() {
        m if m <= ON_TIME_MINUTES => TimingBucket::OnTime,
        m if m <= MODERATE_MINUTES => TimingBucket::ModerateDeviation,
        _ => TimingBucket::LargeDeviation,
    }
}

/// Pure classification of two timestamps.
pub fn classify(
    scheduled: NaiveDateTime,
    actual: NaiveDateTime,
    stored_corrected: Option<bool>,
) -> TimingClassification {
    let offset = offset_minutes(scheduled, actual);
    let corrected = offset.abs() > CORRECTION_MINUTES;
    TimingClassification {
        offset_minutes: offset,
        bucket: bucket_for(offset),
        corrected,
        stored_corrected,
        flag_mismatch: stored_corrected.is_some_and(|stored| stored != corrected),
    }
}

/// Classifies a reconciled dose. `None` when no actual intake time is known.
pub fn classify_timing(dose: &ReconciledDose) -> Option<TimingClassification> {
    let actual = dose.actual_taken_at()?;
    Some(classify(
        dose.instant.scheduled_at,
        actual,
        dose.stored_corrected(),
    ))
}
