use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::events::{MedicationHistoryRow, MedicationLogRow};
use crate::models::prescription::{DoseScheduleRow, Prescription};
use crate::schedule::events::{HistoryEdit, HistoryEvent, LogEvent};
use crate::schedule::recording::{plan_recording, DoseRecord, LogWrite, RecordingPlan};
use crate::schedule::report::Snapshot;
use crate::schedule::rule::RecurrenceRule;
use crate::store::{log_window, not_found, AdherenceStore};

/// Postgres-backed store. Snapshot reads run in one REPEATABLE READ
/// transaction so rules, logs and history agree with each other.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn fetch_owned_prescription(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    prescription_id: Uuid,
) -> Result<Prescription, AppError> {
    sqlx::query_as::<_, Prescription>(
        "SELECT * FROM prescriptions WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(prescription_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| not_found("Prescription", prescription_id))
}

async fn fetch_owned_history(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    history_id: Uuid,
) -> Result<MedicationHistoryRow, AppError> {
    sqlx::query_as::<_, MedicationHistoryRow>(
        r#"
        SELECT h.id, h.prescription_id, h.prescription_name, h.dosage, h.scheduled_date,
               h.scheduled_time, h.actual_taken_at, h.quantity_taken, h.is_corrected, h.notes
        FROM medication_history h
        JOIN prescriptions p ON p.id = h.prescription_id
        WHERE h.id = $1 AND p.user_id = $2
        FOR UPDATE OF h
        "#,
    )
    .bind(history_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| not_found("History entry", history_id))
}

/// Stored rules that fail validation are skipped rather than failing the read.
fn rules_from_rows(rows: Vec<DoseScheduleRow>) -> Vec<RecurrenceRule> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match RecurrenceRule::try_from(row) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!("Skipping malformed dose schedule {id}: {e}");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl AdherenceStore for PgStore {
    async fn load_snapshot(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Snapshot, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let prescriptions = sqlx::query_as::<_, Prescription>(
            "SELECT * FROM prescriptions WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let schedule_rows = sqlx::query_as::<_, DoseScheduleRow>(
            r#"
            SELECT s.id, s.prescription_id, s.time_of_day, s.quantity, s.weekdays, s.active
            FROM dose_schedules s
            JOIN prescriptions p ON p.id = s.prescription_id
            WHERE p.user_id = $1
            ORDER BY s.time_of_day, s.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let (log_start, log_end) = log_window(from, to);
        let log_rows = sqlx::query_as::<_, MedicationLogRow>(
            r#"
            SELECT l.id, l.prescription_id, l.scheduled_time, l.status, l.taken_time,
                   l.is_time_corrected
            FROM medication_logs l
            JOIN prescriptions p ON p.id = l.prescription_id
            WHERE p.user_id = $1 AND l.scheduled_time BETWEEN $2 AND $3
            "#,
        )
        .bind(user_id)
        .bind(log_start)
        .bind(log_end)
        .fetch_all(&mut *tx)
        .await?;

        let history_rows = sqlx::query_as::<_, MedicationHistoryRow>(
            r#"
            SELECT h.id, h.prescription_id, h.prescription_name, h.dosage, h.scheduled_date,
                   h.scheduled_time, h.actual_taken_at, h.quantity_taken, h.is_corrected, h.notes
            FROM medication_history h
            JOIN prescriptions p ON p.id = h.prescription_id
            WHERE p.user_id = $1 AND h.scheduled_date BETWEEN $2 AND $3
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let logs = log_rows
            .into_iter()
            .map(LogEvent::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let history = history_rows
            .into_iter()
            .map(HistoryEvent::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Snapshot {
            prescriptions,
            rules: rules_from_rows(schedule_rows),
            logs,
            history,
        })
    }

    async fn set_prescription_active(
        &self,
        user_id: Uuid,
        prescription_id: Uuid,
        active: bool,
    ) -> Result<Prescription, AppError> {
        let updated = sqlx::query_as::<_, Prescription>(
            "UPDATE prescriptions SET active = $1 WHERE id = $2 AND user_id = $3 RETURNING *",
        )
        .bind(active)
        .bind(prescription_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("Prescription", prescription_id))?;

        info!("Prescription {prescription_id} active={active} for user {user_id}");
        Ok(updated)
    }

    async fn record_dose(
        &self,
        user_id: Uuid,
        record: &DoseRecord,
        now: NaiveDateTime,
    ) -> Result<RecordingPlan, AppError> {
        let mut tx = self.pool.begin().await?;
        let prescription =
            fetch_owned_prescription(&mut tx, user_id, record.prescription_id).await?;

        let day = record.scheduled_at.date();
        let (window_start, window_end) = log_window(day, day);
        let nearby = sqlx::query_as::<_, MedicationLogRow>(
            r#"
            SELECT id, prescription_id, scheduled_time, status, taken_time, is_time_corrected
            FROM medication_logs
            WHERE prescription_id = $1 AND scheduled_time BETWEEN $2 AND $3
            "#,
        )
        .bind(prescription.id)
        .bind(window_start)
        .bind(window_end)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(LogEvent::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

        let recorded = sqlx::query_as::<_, MedicationHistoryRow>(
            r#"
            SELECT id, prescription_id, prescription_name, dosage, scheduled_date,
                   scheduled_time, actual_taken_at, quantity_taken, is_corrected, notes
            FROM medication_history
            WHERE prescription_id = $1 AND scheduled_date = $2
            "#,
        )
        .bind(prescription.id)
        .bind(day)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(HistoryEvent::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

        // The prescription row lock serializes concurrent recordings, so this
        // check and the insert below cannot interleave with another writer.
        let plan = plan_recording(&prescription, record, &nearby, &recorded, now)?;

        if let Some(h) = &plan.history {
            // Append-only: history rows are inserted, never overwritten by a recording.
            sqlx::query(
                r#"
                INSERT INTO medication_history
                    (id, prescription_id, prescription_name, dosage, scheduled_date,
                     scheduled_time, actual_taken_at, quantity_taken, is_corrected, notes)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(h.id)
            .bind(h.prescription_id)
            .bind(&h.prescription_name)
            .bind(&h.dosage)
            .bind(h.scheduled_date)
            .bind(h.scheduled_time)
            .bind(h.actual_taken_at)
            .bind(i32::try_from(h.quantity_taken).unwrap_or(i32::MAX))
            .bind(h.is_corrected)
            .bind(&h.notes)
            .execute(&mut *tx)
            .await?;
        }

        match &plan.log {
            LogWrite::Insert(l) => {
                sqlx::query(
                    r#"
                    INSERT INTO medication_logs
                        (id, prescription_id, scheduled_time, status, taken_time, is_time_corrected)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(l.id)
                .bind(l.prescription_id)
                .bind(l.scheduled_time)
                .bind(l.status.as_str())
                .bind(l.taken_time)
                .bind(l.is_time_corrected)
                .execute(&mut *tx)
                .await?;
            }
            LogWrite::Update(l) => {
                sqlx::query("UPDATE medication_logs SET status = $1, taken_time = $2 WHERE id = $3")
                    .bind(l.status.as_str())
                    .bind(l.taken_time)
                    .bind(l.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        info!(
            "Recorded {} for prescription {} at {} (user {user_id})",
            record.status, prescription.id, record.scheduled_at
        );
        Ok(plan)
    }

    async fn edit_history(
        &self,
        user_id: Uuid,
        history_id: Uuid,
        edit: &HistoryEdit,
    ) -> Result<HistoryEvent, AppError> {
        let mut tx = self.pool.begin().await?;
        let row = fetch_owned_history(&mut tx, user_id, history_id).await?;
        let mut event = HistoryEvent::try_from(row)?;

        if event.apply_edit(edit) {
            sqlx::query(
                "UPDATE medication_history SET notes = $1, actual_taken_at = $2, is_corrected = $3 WHERE id = $4",
            )
            .bind(&event.notes)
            .bind(event.actual_taken_at)
            .bind(event.is_corrected)
            .bind(event.id)
            .execute(&mut *tx)
            .await?;
            info!("Edited history entry {history_id} (corrected={})", event.is_corrected);
        }

        tx.commit().await?;
        Ok(event)
    }

    async fn delete_history(&self, user_id: Uuid, history_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM medication_history h
            USING prescriptions p
            WHERE h.id = $1 AND p.id = h.prescription_id AND p.user_id = $2
            "#,
        )
        .bind(history_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("History entry", history_id));
        }
        info!("Deleted history entry {history_id} for user {user_id}");
        Ok(())
    }
}
