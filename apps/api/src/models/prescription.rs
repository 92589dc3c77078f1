use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::schedule::rule::{RecurrenceRule, RuleError, WeekdaySet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Prescription {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_units_per_dose")]
    pub units_per_dose: i32,
    pub active: bool,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

fn default_units_per_dose() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DoseScheduleRow {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub time_of_day: NaiveTime,
    pub quantity: i32,
    /// ISO day numbers, 1 = Monday ..= 7 = Sunday.
    pub weekdays: Vec<i16>,
    pub active: bool,
}

impl TryFrom<DoseScheduleRow> for RecurrenceRule {
    type Error = RuleError;

    fn try_from(row: DoseScheduleRow) -> Result<Self, Self::Error> {
        let weekdays = WeekdaySet::from_iso_days(row.weekdays.iter().map(|d| i64::from(*d)))?;
        let rule = RecurrenceRule::new(
            row.prescription_id,
            row.time_of_day,
            i64::from(row.quantity),
            weekdays,
        )?;
        Ok(if row.active { rule } else { rule.inactive() })
    }
}
