use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Rejections raised when a recurrence rule is constructed from raw input.
/// A rule that fails here never reaches the expander.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("weekday set must not be empty")]
    EmptyWeekdays,

    #[error("weekday {0} is outside 1 (Monday) ..= 7 (Sunday)")]
    InvalidWeekday(i64),

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),
}

/// Set of ISO weekdays, 1 = Monday ..= 7 = Sunday, stored as a bitmask.
///
/// Serialized as a sorted list of day numbers so the wire format matches the
/// stored `weekdays` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const DAILY: WeekdaySet = WeekdaySet(0b0111_1111);

    /// Builds a set from ISO day numbers (Monday = 1). Duplicates are folded.
    pub fn from_iso_days<I>(days: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut bits = 0u8;
        for day in days {
            if !(1..=7).contains(&day) {
                return Err(RuleError::InvalidWeekday(day));
            }
            bits |= 1 << (day - 1);
        }
        if bits == 0 {
            return Err(RuleError::EmptyWeekdays);
        }
        Ok(Self(bits))
    }

    /// Builds a set from day numbers in the 0 = Sunday convention used by
    /// browser clients, remapping Sunday to 7.
    pub fn from_sunday_based_days<I>(days: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = i64>,
    {
        let remapped: Vec<i64> = days
            .into_iter()
            .map(|day| match day {
                0 => Ok(7),
                1..=6 => Ok(day),
                other => Err(RuleError::InvalidWeekday(other)),
            })
            .collect::<Result<_, _>>()?;
        Self::from_iso_days(remapped)
    }

    pub fn contains_iso(&self, day: u32) -> bool {
        (1..=7).contains(&day) && self.0 & (1 << (day - 1)) != 0
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.contains_iso(weekday.number_from_monday())
    }

    pub fn matches_date(&self, date: NaiveDate) -> bool {
        self.contains(date.weekday())
    }

    pub fn iso_days(&self) -> Vec<i64> {
        (1..=7).filter(|d| self.contains_iso(*d as u32)).collect()
    }
}

impl TryFrom<Vec<i64>> for WeekdaySet {
    type Error = RuleError;

    fn try_from(days: Vec<i64>) -> Result<Self, Self::Error> {
        Self::from_iso_days(days)
    }
}

impl From<WeekdaySet> for Vec<i64> {
    fn from(set: WeekdaySet) -> Self {
        set.iso_days()
    }
}

/// A weekly recurring dose definition for one prescription.
///
/// Deserialization goes through [`RecurrenceRule::new`], so a decoded rule
/// holds the same invariants as a constructed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct RecurrenceRule {
    pub prescription_id: Uuid,
    /// Naive local wall-clock time; never converted to UTC.
    pub time_of_day: NaiveTime,
    pub quantity: u32,
    pub weekdays: WeekdaySet,
    pub active: bool,
}

#[derive(Deserialize)]
struct RawRule {
    prescription_id: Uuid,
    time_of_day: NaiveTime,
    quantity: i64,
    weekdays: WeekdaySet,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl TryFrom<RawRule> for RecurrenceRule {
    type Error = RuleError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let rule = Self::new(raw.prescription_id, raw.time_of_day, raw.quantity, raw.weekdays)?;
        Ok(if raw.active { rule } else { rule.inactive() })
    }
}

impl RecurrenceRule {
    pub fn new(
        prescription_id: Uuid,
        time_of_day: NaiveTime,
        quantity: i64,
        weekdays: WeekdaySet,
    ) -> Result<Self, RuleError> {
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or(RuleError::NonPositiveQuantity(quantity))?;
        Ok(Self {
            prescription_id,
            time_of_day,
            quantity,
            weekdays,
            active: true,
        })
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// True when this rule yields an instant on `date`.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.active && self.weekdays.matches_date(date)
    }
}
