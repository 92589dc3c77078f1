pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::schedule::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Stateless engine API: caller supplies the snapshot
        .route("/api/v1/schedule/expand", post(handlers::handle_expand))
        .route("/api/v1/doses/reconcile", post(handlers::handle_reconcile))
        // Stored data
        .route("/api/v1/doses", get(handlers::handle_list_doses))
        .route("/api/v1/doses/record", post(handlers::handle_record_dose))
        .route("/api/v1/adherence", get(handlers::handle_adherence))
        .route(
            "/api/v1/history/:id",
            patch(handlers::handle_edit_history).delete(handlers::handle_delete_history),
        )
        .route(
            "/api/v1/prescriptions/:id/active",
            patch(handlers::handle_set_active),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::{NaiveDate, NaiveTime, Utc};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::access::AccessPolicy;
    use crate::models::prescription::Prescription;
    use crate::schedule::events::HistoryEvent;
    use crate::schedule::rule::{RecurrenceRule, WeekdaySet};
    use crate::store::memory::MemoryStore;

    struct Fixture {
        router: Router,
        store: Arc<MemoryStore>,
        user: Uuid,
        admin: Uuid,
        prescription: Uuid,
        history: Uuid,
    }

    fn fixture() -> Fixture {
        let user = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let prescription = Prescription {
            id: Uuid::new_v4(),
            user_id: user,
            name: "Metformin".to_string(),
            dosage: "500mg".to_string(),
            unit: "tablet".to_string(),
            units_per_dose: 1,
            active: true,
            created_at: Utc::now(),
        };
        let rule = RecurrenceRule::new(
            prescription.id,
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            1,
            WeekdaySet::DAILY,
        )
        .unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let history = HistoryEvent {
            id: Uuid::new_v4(),
            prescription_id: prescription.id,
            prescription_name: prescription.name.clone(),
            dosage: prescription.dosage.clone(),
            scheduled_date: day,
            scheduled_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            actual_taken_at: day.and_hms_opt(8, 5, 0).unwrap(),
            quantity_taken: 1,
            is_corrected: false,
            notes: String::new(),
        };
        let ids = (prescription.id, history.id);
        let store = Arc::new(MemoryStore::new(
            vec![prescription],
            vec![rule],
            vec![],
            vec![history],
        ));
        let state = AppState {
            store: store.clone(),
            access: AccessPolicy::new([admin]),
        };
        Fixture {
            router: build_router(state),
            store,
            user,
            admin,
            prescription: ids.0,
            history: ids.1,
        }
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let f = fixture();
        let (status, body) = send(&f.router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_expand_week_of_daily_rule() {
        let f = fixture();
        let body = json!({
            "rules": [{
                "prescription_id": f.prescription,
                "time_of_day": "08:00:00",
                "quantity": 1,
                "weekdays": [1, 2, 3, 4, 5, 6, 7]
            }],
            "from": "2024-01-01",
            "to": "2024-01-07"
        });
        let (status, body) = send(&f.router, "POST", "/api/v1/schedule/expand", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        let instants = body["instants"].as_array().unwrap();
        assert_eq!(instants.len(), 7);
        assert_eq!(instants[0]["scheduled_at"], "2024-01-01T08:00:00");
    }

    #[tokio::test]
    async fn test_expand_rejects_inverted_range_and_empty_weekdays() {
        let f = fixture();
        let inverted = json!({ "rules": [], "from": "2024-01-07", "to": "2024-01-01" });
        let (status, body) = send(&f.router, "POST", "/api/v1/schedule/expand", Some(inverted)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let malformed = json!({
            "rules": [{
                "prescription_id": f.prescription,
                "time_of_day": "08:00:00",
                "quantity": 1,
                "weekdays": []
            }],
            "from": "2024-01-01"
        });
        let (status, body) =
            send(&f.router, "POST", "/api/v1/schedule/expand", Some(malformed)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_expand_and_reconcile_reject_zero_quantity_rule() {
        let f = fixture();
        let rule = json!({
            "prescription_id": f.prescription,
            "time_of_day": "08:00:00",
            "quantity": 0,
            "weekdays": [1, 2, 3, 4, 5, 6, 7]
        });
        let expand = json!({ "rules": [rule.clone()], "from": "2024-01-01" });
        let (status, body) = send(&f.router, "POST", "/api/v1/schedule/expand", Some(expand)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let reconcile = json!({ "rules": [rule], "from": "2024-01-01", "to": "2024-01-01" });
        let (status, body) =
            send(&f.router, "POST", "/api/v1/doses/reconcile", Some(reconcile)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_stateless_reconcile() {
        let f = fixture();
        let pid = f.prescription;
        let body = json!({
            "rules": [{
                "prescription_id": pid,
                "time_of_day": "08:00:00",
                "quantity": 1,
                "weekdays": [3]
            }],
            "logs": [{
                "id": Uuid::new_v4(),
                "prescription_id": pid,
                "scheduled_time": "2024-01-10T08:00:30",
                "status": "skipped",
                "taken_time": null
            }],
            "from": "2024-01-10",
            "to": "2024-01-10",
            "now": "2024-01-11T00:00:00"
        });
        let (status, body) = send(&f.router, "POST", "/api/v1/doses/reconcile", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["doses"][0]["status"], "skipped");
        assert_eq!(body["doses"][0]["source"]["kind"], "log");
        assert_eq!(body["summary"]["total"], 1);
    }

    #[tokio::test]
    async fn test_list_doses_from_store() {
        let f = fixture();
        let uri = format!("/api/v1/doses?user_id={}&from=2024-01-10&to=2024-01-11", f.user);
        let (status, body) = send(&f.router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let doses = body["doses"].as_array().unwrap();
        assert_eq!(doses.len(), 2);
        assert_eq!(doses[0]["status"], "taken");
        assert_eq!(doses[0]["timing"]["bucket"], "on_time");
        assert_eq!(doses[0]["timing"]["offset_minutes"], 5);
        assert_eq!(doses[1]["status"], "pending");
        assert_eq!(body["summary"]["adherence_rate"], 50);
    }

    #[tokio::test]
    async fn test_adherence_requires_capability_for_other_users() {
        let f = fixture();
        let stranger = Uuid::new_v4();
        let uri = format!(
            "/api/v1/adherence?user_id={stranger}&subject_id={}&from=2024-01-10",
            f.user
        );
        let (status, _) = send(&f.router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let uri = format!(
            "/api/v1/adherence?user_id={}&subject_id={}&from=2024-01-10",
            f.admin, f.user
        );
        let (status, body) = send(&f.router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["taken"], 1);
        assert_eq!(body["adherence_rate"], 100);
    }

    #[tokio::test]
    async fn test_record_taken_then_listed() {
        let f = fixture();
        let body = json!({
            "user_id": f.user,
            "prescription_id": f.prescription,
            "scheduled_at": "2024-01-11T08:00:00",
            "status": "taken",
            "taken_at": "2024-01-11T08:50:00"
        });
        let (status, body) = send(&f.router, "POST", "/api/v1/doses/record", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["log_action"], "inserted");
        assert_eq!(f.store.history().len(), 2);
        assert_eq!(f.store.logs().len(), 1);

        let uri = format!("/api/v1/doses?user_id={}&from=2024-01-11", f.user);
        let (_, body) = send(&f.router, "GET", &uri, None).await;
        assert_eq!(body["doses"][0]["status"], "taken");
        assert_eq!(body["doses"][0]["timing"]["bucket"], "moderate_deviation");
    }

    #[tokio::test]
    async fn test_record_taken_twice_conflicts() {
        let f = fixture();
        let body = json!({
            "user_id": f.user,
            "prescription_id": f.prescription,
            "scheduled_at": "2024-01-11T08:00:00",
            "status": "taken"
        });
        let (status, _) =
            send(&f.router, "POST", "/api/v1/doses/record", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&f.router, "POST", "/api/v1/doses/record", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert_eq!(f.store.history().len(), 2);

        let uri = format!("/api/v1/doses?user_id={}&from=2024-01-11", f.user);
        let (_, body) = send(&f.router, "GET", &uri, None).await;
        assert_eq!(body["warning_count"], 0);
    }

    #[tokio::test]
    async fn test_record_missed_over_taken_history_conflicts() {
        let f = fixture();
        let body = json!({
            "user_id": f.user,
            "prescription_id": f.prescription,
            "scheduled_at": "2024-01-10T08:00:00",
            "status": "missed"
        });
        let (status, body) = send(&f.router, "POST", "/api/v1/doses/record", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert!(f.store.logs().is_empty());

        // Once the history entry is removed the status can be recorded.
        let uri = format!("/api/v1/history/{}?user_id={}", f.history, f.user);
        let (status, _) = send(&f.router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let body = json!({
            "user_id": f.user,
            "prescription_id": f.prescription,
            "scheduled_at": "2024-01-10T08:00:00",
            "status": "missed"
        });
        let (status, _) = send(&f.router, "POST", "/api/v1/doses/record", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/v1/doses?user_id={}&from=2024-01-10", f.user);
        let (_, body) = send(&f.router, "GET", &uri, None).await;
        assert_eq!(body["doses"][0]["status"], "missed");
    }

    #[tokio::test]
    async fn test_record_pending_rejected() {
        let f = fixture();
        let body = json!({
            "user_id": f.user,
            "prescription_id": f.prescription,
            "scheduled_at": "2024-01-11T08:00:00",
            "status": "pending"
        });
        let (status, _) = send(&f.router, "POST", "/api/v1/doses/record", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_edit_history_time_marks_corrected() {
        let f = fixture();
        let uri = format!("/api/v1/history/{}", f.history);
        let body = json!({ "user_id": f.user, "actual_taken_at": "2024-01-10T09:30:00" });
        let (status, body) = send(&f.router, "PATCH", &uri, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_corrected"], true);
        assert_eq!(body["actual_taken_at"], "2024-01-10T09:30:00");
    }

    #[tokio::test]
    async fn test_edit_history_of_other_user_not_found() {
        let f = fixture();
        let uri = format!("/api/v1/history/{}", f.history);
        let body = json!({ "user_id": Uuid::new_v4(), "notes": "mine now" });
        let (status, _) = send(&f.router, "PATCH", &uri, Some(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_history_reverts_to_pending() {
        let f = fixture();
        let uri = format!("/api/v1/history/{}?user_id={}", f.history, f.user);
        let (status, _) = send(&f.router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&f.router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/api/v1/doses?user_id={}&from=2024-01-10", f.user);
        let (_, body) = send(&f.router, "GET", &uri, None).await;
        assert_eq!(body["doses"][0]["status"], "pending");
    }

    #[tokio::test]
    async fn test_deactivated_prescription_drops_out() {
        let f = fixture();
        let uri = format!("/api/v1/prescriptions/{}/active", f.prescription);
        let (status, body) = send(
            &f.router,
            "PATCH",
            &uri,
            Some(json!({ "user_id": f.user, "active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);

        let uri = format!("/api/v1/doses?user_id={}&from=2024-01-10", f.user);
        let (_, body) = send(&f.router, "GET", &uri, None).await;
        assert!(body["doses"].as_array().unwrap().is_empty());

        let record = json!({
            "user_id": f.user,
            "prescription_id": f.prescription,
            "scheduled_at": "2024-01-11T08:00:00",
            "status": "missed"
        });
        let (status, _) = send(&f.router, "POST", "/api/v1/doses/record", Some(record)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
