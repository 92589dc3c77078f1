use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of dose states. Replaces free-form status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Pending,
    Taken,
    Missed,
    Skipped,
}

impl DoseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Taken => "taken",
            Self::Missed => "missed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "taken" => Ok(Self::Taken),
            "missed" => Ok(Self::Missed),
            "skipped" => Ok(Self::Skipped),
            other => Err(anyhow::anyhow!("unknown dose status: {other}")),
        }
    }
}

/// Legacy per-instance status record. Identity is (prescription, approximate
/// scheduled instant); nothing guarantees uniqueness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    pub status: DoseStatus,
    pub taken_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_time_corrected: bool,
}

/// Authoritative, append-only record of one completed intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: Uuid,
    pub prescription_id: Uuid,
    #[serde(default)]
    pub prescription_name: String,
    #[serde(default)]
    pub dosage: String,
    /// Intended schedule, possibly corrected; correlation matches on these two.
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub actual_taken_at: NaiveDateTime,
    pub quantity_taken: u32,
    #[serde(default)]
    pub is_corrected: bool,
    #[serde(default)]
    pub notes: String,
}

impl HistoryEvent {
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.scheduled_date.and_time(self.scheduled_time)
    }

    /// Applies a user edit. Changing the actual timestamp always sets the
    /// corrected flag; the flag is never cleared by an edit.
    /// Returns true when anything changed.
    pub fn apply_edit(&mut self, edit: &HistoryEdit) -> bool {
        let mut changed = false;
        if let Some(notes) = &edit.notes {
            if *notes != self.notes {
                self.notes = notes.clone();
                changed = true;
            }
        }
        if let Some(actual) = edit.actual_taken_at {
            if actual != self.actual_taken_at {
                self.actual_taken_at = actual;
                self.is_corrected = true;
                changed = true;
            }
        }
        changed
    }
}

/// User-supplied change to a history event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEdit {
    pub notes: Option<String>,
    pub actual_taken_at: Option<NaiveDateTime>,
}
