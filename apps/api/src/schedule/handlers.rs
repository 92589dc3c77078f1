use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppJson};
use crate::models::prescription::Prescription;
use crate::schedule::aggregate::{AdherenceSummary, DoseFilter};
use crate::schedule::events::{DoseStatus, HistoryEdit, HistoryEvent, LogEvent};
use crate::schedule::expander::{expand_range, DoseInstant};
use crate::schedule::recording::{DoseRecord, LogWrite};
use crate::schedule::report::{build_report, DoseReport, Snapshot};
use crate::schedule::rule::RecurrenceRule;
use crate::state::AppState;

/// Longest range, in days, a single request may expand.
pub const MAX_RANGE_DAYS: i64 = 366;

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), AppError> {
    if to < from {
        return Err(AppError::Validation(format!(
            "range end {to} is before start {from}"
        )));
    }
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(AppError::Validation(format!(
            "range {from}..={to} exceeds {MAX_RANGE_DAYS} days"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct ExpandRequest {
    pub rules: Vec<RecurrenceRule>,
    pub from: NaiveDate,
    /// Single-day expansion when omitted.
    pub to: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize)]
pub struct ExpandResponse {
    pub instants: Vec<DoseInstant>,
}

/// POST /api/v1/schedule/expand
pub async fn handle_expand(
    AppJson(req): AppJson<ExpandRequest>,
) -> Result<Json<ExpandResponse>, AppError> {
    let to = req.to.unwrap_or(req.from);
    validate_range(req.from, to)?;
    Ok(Json(ExpandResponse {
        instants: expand_range(&req.rules, req.from, to),
    }))
}

#[derive(Deserialize)]
pub struct ReconcileRequest {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Reference time for `is_future`; server local time when omitted.
    pub now: Option<NaiveDateTime>,
    #[serde(default)]
    pub filter: DoseFilter,
}

/// POST /api/v1/doses/reconcile
/// Runs the engine over a caller-supplied snapshot; nothing is read or stored.
pub async fn handle_reconcile(
    AppJson(req): AppJson<ReconcileRequest>,
) -> Result<Json<DoseReport>, AppError> {
    validate_range(req.from, req.to)?;
    let now = req.now.unwrap_or_else(local_now);
    Ok(Json(build_report(
        &req.snapshot,
        req.from,
        req.to,
        &req.filter,
        now,
    )))
}

#[derive(Deserialize)]
pub struct DoseQuery {
    pub user_id: Uuid,
    /// Whose data to read; defaults to `user_id`.
    pub subject_id: Option<Uuid>,
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
    pub prescription_id: Option<Uuid>,
    pub status: Option<DoseStatus>,
}

impl DoseQuery {
    fn subject(&self) -> Uuid {
        self.subject_id.unwrap_or(self.user_id)
    }

    fn filter(&self) -> DoseFilter {
        DoseFilter {
            from: None,
            to: None,
            prescription_id: self.prescription_id,
            status: self.status,
        }
    }
}

async fn load_report(state: &AppState, query: &DoseQuery) -> Result<DoseReport, AppError> {
    let subject = query.subject();
    state.access.authorize_read(query.user_id, subject)?;

    let to = query.to.unwrap_or(query.from);
    validate_range(query.from, to)?;

    let snapshot = state.store.load_snapshot(subject, query.from, to).await?;
    Ok(build_report(
        &snapshot,
        query.from,
        to,
        &query.filter(),
        local_now(),
    ))
}

/// GET /api/v1/doses
pub async fn handle_list_doses(
    State(state): State<AppState>,
    Query(query): Query<DoseQuery>,
) -> Result<Json<DoseReport>, AppError> {
    Ok(Json(load_report(&state, &query).await?))
}

/// GET /api/v1/adherence
pub async fn handle_adherence(
    State(state): State<AppState>,
    Query(query): Query<DoseQuery>,
) -> Result<Json<AdherenceSummary>, AppError> {
    Ok(Json(load_report(&state, &query).await?.summary))
}

#[derive(Deserialize)]
pub struct RecordRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub record: DoseRecord,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Inserted,
    Updated,
}

#[derive(Serialize, Deserialize)]
pub struct RecordResponse {
    pub history: Option<HistoryEvent>,
    pub log: LogEvent,
    pub log_action: LogAction,
}

/// POST /api/v1/doses/record
pub async fn handle_record_dose(
    State(state): State<AppState>,
    AppJson(req): AppJson<RecordRequest>,
) -> Result<(StatusCode, Json<RecordResponse>), AppError> {
    let plan = state
        .store
        .record_dose(req.user_id, &req.record, local_now())
        .await?;
    let (log, log_action) = match plan.log {
        LogWrite::Insert(l) => (l, LogAction::Inserted),
        LogWrite::Update(l) => (l, LogAction::Updated),
    };
    Ok((
        StatusCode::CREATED,
        Json(RecordResponse {
            history: plan.history,
            log,
            log_action,
        }),
    ))
}

#[derive(Deserialize)]
pub struct HistoryEditRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub edit: HistoryEdit,
}

/// PATCH /api/v1/history/:id
pub async fn handle_edit_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(req): AppJson<HistoryEditRequest>,
) -> Result<Json<HistoryEvent>, AppError> {
    if req.edit.notes.is_none() && req.edit.actual_taken_at.is_none() {
        return Err(AppError::Validation(
            "edit must change notes or actual_taken_at".to_string(),
        ));
    }
    let event = state.store.edit_history(req.user_id, id, &req.edit).await?;
    Ok(Json(event))
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// DELETE /api/v1/history/:id
pub async fn handle_delete_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    state.store.delete_history(params.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ActiveToggle {
    pub user_id: Uuid,
    pub active: bool,
}

/// PATCH /api/v1/prescriptions/:id/active
/// Soft deactivation; history referencing the prescription is kept.
pub async fn handle_set_active(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(req): AppJson<ActiveToggle>,
) -> Result<Json<Prescription>, AppError> {
    let prescription = state
        .store
        .set_prescription_active(req.user_id, id, req.active)
        .await?;
    Ok(Json(prescription))
}
