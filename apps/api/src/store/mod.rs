//! Persistence seam. The engine only ever sees a `Snapshot`; stores decide how
//! to load one consistently and how to apply user writes.
//!
//! `AppState` holds an `Arc<dyn AdherenceStore>`: `PgStore` in production, the
//! in-memory store in tests.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::prescription::Prescription;
use crate::schedule::correlator::LOG_TOLERANCE_SECS;
use crate::schedule::events::{HistoryEdit, HistoryEvent};
use crate::schedule::recording::{DoseRecord, RecordingPlan};
use crate::schedule::report::Snapshot;

#[async_trait]
pub trait AdherenceStore: Send + Sync {
    /// Loads every prescription and rule owned by `user_id`, plus the log and
    /// history events that can correlate with instants in `from..=to`, as of
    /// one logical read.
    async fn load_snapshot(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Snapshot, AppError>;

    async fn set_prescription_active(
        &self,
        user_id: Uuid,
        prescription_id: Uuid,
        active: bool,
    ) -> Result<Prescription, AppError>;

    /// Plans and applies a dose recording atomically.
    async fn record_dose(
        &self,
        user_id: Uuid,
        record: &DoseRecord,
        now: NaiveDateTime,
    ) -> Result<RecordingPlan, AppError>;

    async fn edit_history(
        &self,
        user_id: Uuid,
        history_id: Uuid,
        edit: &HistoryEdit,
    ) -> Result<HistoryEvent, AppError>;

    async fn delete_history(&self, user_id: Uuid, history_id: Uuid) -> Result<(), AppError>;
}

/// Log window covering `from..=to` widened by the correlation tolerance, so
/// instants at the edges of the range still see their log rows.
pub fn log_window(from: NaiveDate, to: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let slack = Duration::seconds(LOG_TOLERANCE_SECS);
    let start = from.and_time(NaiveTime::default()) - slack;
    let end = to.and_time(NaiveTime::default()) + Duration::days(1) + slack;
    (start, end)
}

pub(crate) fn not_found(kind: &str, id: Uuid) -> AppError {
    AppError::NotFound(format!("{kind} {id} not found"))
}
