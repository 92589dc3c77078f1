use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::schedule::events::{DoseStatus, HistoryEvent, LogEvent};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MedicationLogRow {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    pub status: String,
    pub taken_time: Option<NaiveDateTime>,
    pub is_time_corrected: bool,
}

impl TryFrom<MedicationLogRow> for LogEvent {
    type Error = anyhow::Error;

    fn try_from(row: MedicationLogRow) -> Result<Self> {
        Ok(LogEvent {
            id: row.id,
            prescription_id: row.prescription_id,
            scheduled_time: row.scheduled_time,
            status: row
                .status
                .parse::<DoseStatus>()
                .with_context(|| format!("medication_logs row {}", row.id))?,
            taken_time: row.taken_time,
            is_time_corrected: row.is_time_corrected,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MedicationHistoryRow {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub prescription_name: String,
    pub dosage: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub actual_taken_at: NaiveDateTime,
    pub quantity_taken: i32,
    pub is_corrected: bool,
    pub notes: String,
}

impl TryFrom<MedicationHistoryRow> for HistoryEvent {
    type Error = anyhow::Error;

    fn try_from(row: MedicationHistoryRow) -> Result<Self> {
        Ok(HistoryEvent {
            id: row.id,
            prescription_id: row.prescription_id,
            prescription_name: row.prescription_name,
            dosage: row.dosage,
            scheduled_date: row.scheduled_date,
            scheduled_time: row.scheduled_time,
            actual_taken_at: row.actual_taken_at,
            quantity_taken: u32::try_from(row.quantity_taken)
                .with_context(|| format!("medication_history row {} has negative quantity", row.id))?,
            is_corrected: row.is_corrected,
            notes: row.notes,
        })
    }
}
