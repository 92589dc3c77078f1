use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::prescription::Prescription;
use crate::schedule::events::{HistoryEdit, HistoryEvent, LogEvent};
use crate::schedule::recording::{plan_recording, DoseRecord, LogWrite, RecordingPlan};
use crate::schedule::report::Snapshot;
use crate::schedule::rule::RecurrenceRule;
use crate::store::{log_window, not_found, AdherenceStore};

/// Store backed by plain vectors behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new(
        prescriptions: Vec<Prescription>,
        rules: Vec<RecurrenceRule>,
        logs: Vec<LogEvent>,
        history: Vec<HistoryEvent>,
    ) -> Self {
        Self {
            data: Mutex::new(Snapshot {
                prescriptions,
                rules,
                logs,
                history,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Snapshot>, AppError> {
        self.data
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory store lock poisoned")))
    }

    pub fn history(&self) -> Vec<HistoryEvent> {
        self.data.lock().map(|d| d.history.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<LogEvent> {
        self.data.lock().map(|d| d.logs.clone()).unwrap_or_default()
    }
}

fn owned_ids(data: &Snapshot, user_id: Uuid) -> Vec<Uuid> {
    data.prescriptions
        .iter()
        .filter(|p| p.user_id == user_id)
        .map(|p| p.id)
        .collect()
}

#[async_trait]
impl AdherenceStore for MemoryStore {
    async fn load_snapshot(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Snapshot, AppError> {
        let data = self.lock()?;
        let owned = owned_ids(&data, user_id);
        let (log_start, log_end) = log_window(from, to);
        Ok(Snapshot {
            prescriptions: data
                .prescriptions
                .iter()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect(),
            rules: data
                .rules
                .iter()
                .filter(|r| owned.contains(&r.prescription_id))
                .cloned()
                .collect(),
            logs: data
                .logs
                .iter()
                .filter(|l| owned.contains(&l.prescription_id))
                .filter(|l| l.scheduled_time >= log_start && l.scheduled_time <= log_end)
                .cloned()
                .collect(),
            history: data
                .history
                .iter()
                .filter(|h| owned.contains(&h.prescription_id))
                .filter(|h| h.scheduled_date >= from && h.scheduled_date <= to)
                .cloned()
                .collect(),
        })
    }

    async fn set_prescription_active(
        &self,
        user_id: Uuid,
        prescription_id: Uuid,
        active: bool,
    ) -> Result<Prescription, AppError> {
        let mut data = self.lock()?;
        let prescription = data
            .prescriptions
            .iter_mut()
            .find(|p| p.id == prescription_id && p.user_id == user_id)
            .ok_or_else(|| not_found("Prescription", prescription_id))?;
        prescription.active = active;
        Ok(prescription.clone())
    }

    async fn record_dose(
        &self,
        user_id: Uuid,
        record: &DoseRecord,
        now: NaiveDateTime,
    ) -> Result<RecordingPlan, AppError> {
        let mut data = self.lock()?;
        let prescription = data
            .prescriptions
            .iter()
            .find(|p| p.id == record.prescription_id && p.user_id == user_id)
            .cloned()
            .ok_or_else(|| not_found("Prescription", record.prescription_id))?;

        let plan = plan_recording(&prescription, record, &data.logs, &data.history, now)?;
        if let Some(h) = &plan.history {
            data.history.push(h.clone());
        }
        match &plan.log {
            LogWrite::Insert(l) => data.logs.push(l.clone()),
            LogWrite::Update(l) => {
                if let Some(existing) = data.logs.iter_mut().find(|e| e.id == l.id) {
                    *existing = l.clone();
                }
            }
        }
        Ok(plan)
    }

    async fn edit_history(
        &self,
        user_id: Uuid,
        history_id: Uuid,
        edit: &HistoryEdit,
    ) -> Result<HistoryEvent, AppError> {
        let mut data = self.lock()?;
        let owned = owned_ids(&data, user_id);
        let event = data
            .history
            .iter_mut()
            .find(|h| h.id == history_id && owned.contains(&h.prescription_id))
            .ok_or_else(|| not_found("History entry", history_id))?;
        event.apply_edit(edit);
        Ok(event.clone())
    }

    async fn delete_history(&self, user_id: Uuid, history_id: Uuid) -> Result<(), AppError> {
        let mut data = self.lock()?;
        let owned = owned_ids(&data, user_id);
        let before = data.history.len();
        data.history
            .retain(|h| !(h.id == history_id && owned.contains(&h.prescription_id)));
        if data.history.len() == before {
            return Err(not_found("History entry", history_id));
        }
        Ok(())
    }
}
