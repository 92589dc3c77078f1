use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::schedule::rule::RecurrenceRule;

/// One concrete expected dose. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoseInstant {
    pub prescription_id: Uuid,
    /// Naive local date-time.
    pub scheduled_at: NaiveDateTime,
    pub quantity: u32,
}

impl DoseInstant {
    pub fn date(&self) -> NaiveDate {
        self.scheduled_at.date()
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.scheduled_at.time()
    }
}

/// Expands `rules` into the dose instants falling on `date`, ascending by time
/// of day. Rules at the same time keep their input order.
///
/// Overlapping rules yield duplicate instants; they are not merged.
pub fn expand_date(rules: &[RecurrenceRule], date: NaiveDate) -> Vec<DoseInstant> {
    let mut instants: Vec<DoseInstant> = rules
        .iter()
        .filter(|rule| rule.applies_on(date))
        .map(|rule| DoseInstant {
            prescription_id: rule.prescription_id,
            scheduled_at: date.and_time(rule.time_of_day),
            quantity: rule.quantity,
        })
        .collect();
    instants.sort_by_key(|i| i.scheduled_at.time());
    instants
}

/// Expands every calendar day in `from..=to` and concatenates the results.
/// An inverted range yields nothing.
pub fn expand_range(rules: &[RecurrenceRule], from: NaiveDate, to: NaiveDate) -> Vec<DoseInstant> {
    let instants: Vec<DoseInstant> = from
        .iter_days()
        .take_while(|day| *day <= to)
        .flat_map(|day| expand_date(rules, day))
        .collect();
    debug!(
        "Expanded {} rules over {from}..={to} into {} instants",
        rules.len(),
        instants.len()
    );
    instants
}
