use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::prescription::Prescription;
use crate::schedule::correlator::{closest_log, history_matches};
use crate::schedule::events::{DoseStatus, HistoryEvent, LogEvent};
use crate::schedule::expander::DoseInstant;

/// User action against one scheduled dose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseRecord {
    pub prescription_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub status: DoseStatus,
    /// Defaults to "now" when a taken dose has no explicit time.
    pub taken_at: Option<NaiveDateTime>,
    pub quantity: Option<u32>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("a dose cannot be recorded as pending")]
    PendingNotRecordable,

    #[error("prescription {0} is inactive")]
    InactivePrescription(Uuid),

    #[error("quantity must be positive")]
    ZeroQuantity,

    #[error("dose already recorded as taken by history entry {0}")]
    AlreadyTaken(Uuid),

    #[error("dose is taken per history entry {0}; delete that entry before recording another status")]
    TakenDoseLocked(Uuid),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogWrite {
    Insert(LogEvent),
    Update(LogEvent),
}

/// Writes a store must perform for one record, in order: history first.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingPlan {
    pub history: Option<HistoryEvent>,
    pub log: LogWrite,
}

/// Decides which rows a recording produces. Taken doses append a history
/// event; every status upserts the log row found within the correlation
/// window, inserting one when none is close enough.
///
/// A dose with a history event is settled: history outranks the log, so any
/// further recording against it is refused instead of silently ignored.
pub fn plan_recording(
    prescription: &Prescription,
    record: &DoseRecord,
    existing_logs: &[LogEvent],
    existing_history: &[HistoryEvent],
    now: NaiveDateTime,
) -> Result<RecordingPlan, RecordError> {
    if record.status == DoseStatus::Pending {
        return Err(RecordError::PendingNotRecordable);
    }
    if !prescription.active {
        return Err(RecordError::InactivePrescription(prescription.id));
    }
    let quantity = match record.quantity {
        Some(0) => return Err(RecordError::ZeroQuantity),
        Some(q) => q,
        None => u32::try_from(prescription.units_per_dose.max(1)).unwrap_or(1),
    };

    let instant = DoseInstant {
        prescription_id: prescription.id,
        scheduled_at: record.scheduled_at,
        quantity,
    };
    if let Some(existing) = existing_history.iter().find(|h| history_matches(&instant, h)) {
        return Err(match record.status {
            DoseStatus::Taken => RecordError::AlreadyTaken(existing.id),
            _ => RecordError::TakenDoseLocked(existing.id),
        });
    }

    let taken_time = (record.status == DoseStatus::Taken).then(|| record.taken_at.unwrap_or(now));

    let history = taken_time.map(|actual| HistoryEvent {
        id: Uuid::new_v4(),
        prescription_id: prescription.id,
        prescription_name: prescription.name.clone(),
        dosage: prescription.dosage.clone(),
        scheduled_date: record.scheduled_at.date(),
        scheduled_time: record.scheduled_at.time(),
        actual_taken_at: actual,
        quantity_taken: quantity,
        is_corrected: false,
        notes: record.notes.clone(),
    });

    let log = match closest_log(record.scheduled_at, prescription.id, existing_logs) {
        Some(existing) => LogWrite::Update(LogEvent {
            status: record.status,
            taken_time,
            ..existing.clone()
        }),
        None => LogWrite::Insert(LogEvent {
            id: Uuid::new_v4(),
            prescription_id: prescription.id,
            scheduled_time: record.scheduled_at,
            status: record.status,
            taken_time,
            is_time_corrected: false,
        }),
    };

    Ok(RecordingPlan { history, log })
}
