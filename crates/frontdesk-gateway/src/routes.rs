//! API route handlers for the gateway.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use frontdesk_core::error::FrontDeskError;
use frontdesk_core::store::{EntityKind, from_record};
use frontdesk_core::types::{Patient, Task, TaskStatus};
use frontdesk_queue::suggested::DEFAULT_TTL_HOURS;
use frontdesk_queue::tokens::{self, NotifyOutcome};
use frontdesk_queue::{AssignToken, BatchReport, NewSuggestion, NewTask, TokenPatch, visible_tasks};

use super::server::AppState;

/// Error half of every handler: status from the error kind, JSON body.
#[derive(Debug)]
pub struct ApiError(pub FrontDeskError);

impl From<FrontDeskError> for ApiError {
    fn from(e: FrontDeskError) -> Self {
        Self(e)
    }
}

/// HTTP status for each error kind.
pub fn status_for(e: &FrontDeskError) -> StatusCode {
    match e {
        FrontDeskError::Validation(_) => StatusCode::BAD_REQUEST,
        FrontDeskError::NotFound { .. } => StatusCode::NOT_FOUND,
        FrontDeskError::Conflict { .. } => StatusCode::CONFLICT,
        FrontDeskError::NoContact(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FrontDeskError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        FrontDeskError::Channel(_) => StatusCode::BAD_GATEWAY,
        FrontDeskError::Acknowledge { .. }
        | FrontDeskError::Config(_)
        | FrontDeskError::Store(_)
        | FrontDeskError::Io(_)
        | FrontDeskError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(e: &FrontDeskError) -> Value {
    json!({ "ok": false, "error": e.to_string(), "kind": e.kind() })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("❌ {status}: {}", self.0);
        }
        (status, Json(error_body(&self.0))).into_response()
    }
}

type ApiResult<T = Json<Value>> = Result<T, ApiError>;

fn required(value: &str, field: &str) -> Result<(), FrontDeskError> {
    if value.trim().is_empty() {
        return Err(FrontDeskError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "frontdesk",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "channel": state.channel_name,
        "poll_sessions": state.sessions.len(),
    }))
}

// ---- Tokens ----

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

/// A day's queue ordered by number, plus the suggested next number.
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DateQuery>,
) -> ApiResult {
    let date = q.date.unwrap_or_else(tokens::today);
    let list = state.tokens.list_tokens(date).await?;
    let next = state.tokens.next_token_number(date).await?;
    Ok(Json(json!({
        "ok": true,
        "date": date,
        "tokens": tokens::sorted_by_number(list),
        "next_token_number": next,
    })))
}

fn notification_json(outcome: &NotifyOutcome) -> Value {
    let mut v = serde_json::to_value(outcome).unwrap_or(Value::Null);
    if let Some(map) = v.as_object_mut() {
        map.insert("message".into(), Value::from(outcome.describe()));
    }
    v
}

/// Assign a token. The notification outcome is reported next to the token.
pub async fn assign_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssignToken>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let assignment = state.tokens.assign_token(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "token": assignment.token,
            "notification": notification_json(&assignment.notification),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTokenBody {
    #[serde(default)]
    pub id: String,
    /// Version the client last read; omitted means last-writer-wins.
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(flatten)]
    pub patch: TokenPatch,
}

pub async fn update_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateTokenBody>,
) -> ApiResult {
    required(&body.id, "id")?;
    let token = state
        .tokens
        .update_token(&body.id, body.patch, body.version)
        .await?;
    Ok(Json(json!({ "ok": true, "token": token })))
}

#[derive(Debug, Deserialize)]
pub struct IdBody {
    #[serde(default)]
    pub id: String,
}

pub async fn delete_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdBody>,
) -> ApiResult {
    required(&body.id, "id")?;
    state.tokens.delete_token(&body.id).await?;
    Ok(Json(json!({ "ok": true, "deleted": body.id })))
}

/// Send the "doctor is ready" message for a token.
pub async fn call_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdBody>,
) -> ApiResult {
    required(&body.id, "id")?;
    let token = state.tokens.get_token(&body.id).await?;
    let delivery = state.tokens.call_token(&token).await?;
    let message = if delivery.simulated {
        "message logged, not delivered"
    } else {
        "patient notified"
    };
    Ok(Json(json!({
        "ok": true,
        "delivered": delivery.delivered,
        "simulated": delivery.simulated,
        "message": message,
    })))
}

// ---- Tasks ----

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    #[serde(rename = "for")]
    pub assignee: Option<String>,
    /// Skip the retention filter.
    #[serde(default)]
    pub all: Option<bool>,
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TaskQuery>,
) -> ApiResult {
    let tasks = match q.assignee.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(assignee) => state.tasks.list_tasks_for(assignee).await?,
        None => state.tasks.list_all().await?,
    };
    let tasks = if q.all.unwrap_or(false) {
        tasks
    } else {
        visible_tasks(tasks, Utc::now())
    };
    Ok(Json(json!({ "ok": true, "tasks": tasks })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTasksBody {
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(flatten)]
    pub task: NewTask,
}

fn report_json(report: &BatchReport) -> Value {
    let failed: Vec<Value> = report
        .failed
        .iter()
        .map(|f| {
            json!({
                "recipient": f.recipient,
                "error": f.error.to_string(),
                "kind": f.error.kind(),
            })
        })
        .collect();
    json!({
        "ok": report.is_complete(),
        "created": report.created,
        "failed": failed,
    })
}

/// 201 when every recipient got a task, 207 on partial success,
/// 503/502 when nothing was created.
fn batch_status(report: &BatchReport) -> StatusCode {
    if report.is_complete() {
        StatusCode::CREATED
    } else if report.is_total_failure() {
        let retriable = report.failed.first().is_some_and(|f| f.error.is_retriable());
        if retriable {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_GATEWAY
        }
    } else {
        StatusCode::MULTI_STATUS
    }
}

pub async fn create_tasks(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTasksBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    required(&body.task.assigned_by, "assigned_by")?;
    let report = state.tasks.create_tasks(body.task, &body.recipients).await?;
    Ok((batch_status(&report), Json(report_json(&report))))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: TaskStatus,
}

pub async fn update_task_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult {
    let task = state.tasks.set_status(&id, body.status).await?;
    Ok(Json(json!({ "ok": true, "task": task })))
}

// ---- Notifications ----

const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(rename = "for", default)]
    pub assignee: String,
    #[serde(default)]
    pub session: Option<String>,
}

/// One poll tick for a client session.
pub async fn poll_notifications(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PollQuery>,
) -> ApiResult {
    required(&q.assignee, "for")?;
    let session_id = q.session.as_deref().unwrap_or(DEFAULT_SESSION);
    let session = state.sessions.session(q.assignee.trim(), session_id);
    let task = session.check_for_new().await;
    Ok(Json(json!({
        "ok": true,
        "has_new": task.is_some(),
        "task": task,
        "state": session.state(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct AckBody {
    #[serde(default, alias = "taskId")]
    pub task_id: String,
    /// Optional; defaults to the task's assignee.
    #[serde(rename = "for", default)]
    pub assignee: String,
    #[serde(default)]
    pub session: Option<String>,
}

/// Accept or queue a surfaced task. Without `for`, the session is the
/// task's own assignee's, and an unknown task is a 404.
pub async fn acknowledge_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AckBody>,
) -> ApiResult {
    required(&body.task_id, "task_id")?;
    let assignee = match body.assignee.trim() {
        "" => {
            let task: Task = from_record(state.store.get(EntityKind::Task, &body.task_id).await?)?;
            task.assigned_to
        }
        given => given.to_string(),
    };
    let session_id = body.session.as_deref().unwrap_or(DEFAULT_SESSION);
    let session = state.sessions.session(&assignee, session_id);
    let outcome = session.acknowledge(&body.task_id).await?;
    Ok(Json(json!({
        "ok": true,
        "task_id": body.task_id,
        "outcome": outcome,
        "state": session.state(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SessionBody {
    #[serde(rename = "for", default)]
    pub assignee: String,
    #[serde(default)]
    pub session: Option<String>,
}

/// End a poll session, e.g. on logout. Closing an unknown session is not an error.
pub async fn close_notification_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SessionBody>,
) -> ApiResult {
    required(&body.assignee, "for")?;
    let session_id = body.session.as_deref().unwrap_or(DEFAULT_SESSION);
    let removed = state.sessions.remove(body.assignee.trim(), session_id);
    Ok(Json(json!({ "ok": true, "removed": removed })))
}

// ---- Suggested tasks ----

pub async fn list_suggested(State(state): State<Arc<AppState>>) -> ApiResult {
    let now = Utc::now();
    let suggestions: Vec<Value> = state
        .suggestions
        .list_suggested()
        .await?
        .into_iter()
        .map(|s| {
            let expired = s.is_expired(now);
            let mut v = serde_json::to_value(&s).unwrap_or(Value::Null);
            if let Some(map) = v.as_object_mut() {
                map.insert("expired".into(), Value::Bool(expired));
            }
            v
        })
        .collect();
    Ok(Json(json!({ "ok": true, "suggestions": suggestions })))
}

#[derive(Debug, Deserialize)]
pub struct CreateSuggestionBody {
    #[serde(default)]
    pub hours: Option<i64>,
    #[serde(flatten)]
    pub suggestion: NewSuggestion,
}

pub async fn create_suggested(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSuggestionBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let hours = body.hours.unwrap_or(DEFAULT_TTL_HOURS);
    let suggestion = state.suggestions.create(body.suggestion, hours).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "suggestion": suggestion })),
    ))
}

pub async fn delete_suggested(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdBody>,
) -> ApiResult {
    required(&body.id, "id")?;
    state.suggestions.delete(&body.id).await?;
    Ok(Json(json!({ "ok": true, "deleted": body.id })))
}

#[derive(Debug, Deserialize)]
pub struct PatchSuggestionBody {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub hours: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Extend by hours, or set an explicit expiry.
pub async fn patch_suggested(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PatchSuggestionBody>,
) -> ApiResult {
    required(&body.id, "id")?;
    let suggestion = match (body.expires_at, body.hours) {
        (Some(at), _) => state.suggestions.set_expiry(&body.id, at).await?,
        (None, Some(hours)) => state.suggestions.extend(&body.id, hours).await?,
        (None, None) => {
            return Err(FrontDeskError::Validation("hours or expires_at is required".into()).into());
        }
    };
    Ok(Json(json!({ "ok": true, "suggestion": suggestion })))
}

#[derive(Debug, Deserialize)]
pub struct PromoteBody {
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub assigned_by: Option<String>,
}

/// 201 when the suggestion was fully promoted and removed, 207 when some
/// recipients failed and the suggestion was kept.
pub async fn promote_suggested(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PromoteBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let suggestion = state.suggestions.get(&id).await?;
    let promotion = state
        .suggestions
        .promote(&suggestion, &body.recipients, body.assigned_by.as_deref())
        .await?;

    let mut payload = report_json(&promotion.report);
    payload["suggestion_removed"] = Value::Bool(promotion.suggestion_removed);
    let status = if promotion.suggestion_removed {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(payload)))
}

// ---- Patients ----

#[derive(Debug, Deserialize)]
pub struct PatientBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PatientBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    required(&body.name, "name")?;
    let mut fields = json!({ "name": body.name.trim(), "phone": body.phone });
    if let Some(id) = body.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        fields["id"] = Value::from(id);
    }
    let patient: Patient = from_record(state.store.create(EntityKind::Patient, fields).await?)?;
    tracing::info!("🧑 Patient {} registered", patient.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "patient": patient })),
    ))
}

pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let patient: Patient = from_record(state.store.get(EntityKind::Patient, &id).await?)?;
    Ok(Json(json!({ "ok": true, "patient": patient })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use frontdesk_channels::WhatsAppChannel;
    use frontdesk_core::config::{FrontDeskConfig, WhatsAppConfig};
    use frontdesk_queue::MemoryStore;
    use tower::ServiceExt;

    fn test_state() -> State<Arc<AppState>> {
        let channel = WhatsAppChannel::new(WhatsAppConfig::default()).unwrap();
        State(Arc::new(AppState::new(
            FrontDeskConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(channel),
        )))
    }

    fn patient_body(id: &str, phone: Option<&str>) -> Json<PatientBody> {
        Json(PatientBody {
            id: Some(id.into()),
            name: format!("Patient {id}"),
            phone: phone.map(String::from),
        })
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.into(),
            assigned_by: "Dr. Rao".into(),
            ..NewTask::default()
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ---- Health ----

    #[tokio::test]
    async fn test_health_check() {
        let json = health_check(test_state()).await.0;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["channel"], "whatsapp");
    }

    // ---- Error mapping ----

    #[tokio::test]
    async fn test_error_status_mapping() {
        let cases = [
            (FrontDeskError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (FrontDeskError::not_found(EntityKind::Token, "t"), StatusCode::NOT_FOUND),
            (FrontDeskError::NoContact("p".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (FrontDeskError::TransientStore("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                FrontDeskError::Acknowledge { task_id: "t".into(), reason: "x".into() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (FrontDeskError::Channel("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status);
        }

        let response = ApiError(FrontDeskError::not_found(EntityKind::Task, "t9")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["ok"], false);
        assert_eq!(json["kind"], "not_found");
    }

    // ---- Tokens ----

    #[tokio::test]
    async fn test_token_flow_simulated_channel() {
        let state = test_state();
        create_patient(state.clone(), patient_body("p1", Some("9876543210")))
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let (status, Json(created)) = assign_token(
            state.clone(),
            Json(AssignToken {
                patient_id: "p1".into(),
                token_number: Some(1),
                date,
                status: Default::default(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["notification"]["status"], "simulated");
        assert_eq!(created["notification"]["message"], "message logged, not delivered");

        let listing = list_tokens(state.clone(), Query(DateQuery { date: Some(date) }))
            .await
            .unwrap()
            .0;
        assert_eq!(listing["tokens"].as_array().unwrap().len(), 1);
        assert_eq!(listing["next_token_number"], 2);

        let id = created["token"]["id"].as_str().unwrap().to_string();
        let called = call_token(state.clone(), Json(IdBody { id: id.clone() }))
            .await
            .unwrap()
            .0;
        assert_eq!(called["simulated"], true);
        assert_eq!(called["delivered"], false);

        delete_token(state.clone(), Json(IdBody { id: id.clone() })).await.unwrap();
        let err = delete_token(state, Json(IdBody { id })).await.unwrap_err();
        assert_eq!(status_for(&err.0), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_call_without_contact_is_422() {
        let state = test_state();
        create_patient(state.clone(), patient_body("p1", None)).await.unwrap();
        let (_, Json(created)) = assign_token(
            state.clone(),
            Json(AssignToken {
                patient_id: "p1".into(),
                token_number: Some(3),
                date: tokens::today(),
                status: Default::default(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(created["notification"]["status"], "no_contact");

        let id = created["token"]["id"].as_str().unwrap().to_string();
        let err = call_token(state, Json(IdBody { id })).await.unwrap_err();
        assert_eq!(status_for(&err.0), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_stale_token_update_is_409() {
        let state = test_state();
        create_patient(state.clone(), patient_body("p1", None)).await.unwrap();
        let (_, Json(created)) = assign_token(
            state.clone(),
            Json(AssignToken {
                patient_id: "p1".into(),
                token_number: Some(1),
                date: tokens::today(),
                status: Default::default(),
            }),
        )
        .await
        .unwrap();
        let id = created["token"]["id"].as_str().unwrap().to_string();

        let body: UpdateTokenBody =
            serde_json::from_value(json!({"id": id, "version": 1, "status": "in_progress"})).unwrap();
        let updated = update_token(state.clone(), Json(body)).await.unwrap().0;
        assert_eq!(updated["token"]["status"], "in_progress");

        let body: UpdateTokenBody =
            serde_json::from_value(json!({"id": id, "version": 1, "status": "completed"})).unwrap();
        let err = update_token(state, Json(body)).await.unwrap_err();
        assert_eq!(status_for(&err.0), StatusCode::CONFLICT);
    }

    // ---- Tasks & notifications ----

    #[tokio::test]
    async fn test_create_tasks_and_poll() {
        let state = test_state();
        let (status, Json(report)) = create_tasks(
            state.clone(),
            Json(CreateTasksBody {
                recipients: vec!["rec-1".into(), "rec-2".into()],
                task: new_task("Print discharge summary"),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["created"].as_array().unwrap().len(), 2);

        let poll = |state: State<Arc<AppState>>| {
            poll_notifications(
                state,
                Query(PollQuery {
                    assignee: "rec-1".into(),
                    session: Some("tab-1".into()),
                }),
            )
        };
        let first = poll(state.clone()).await.unwrap().0;
        assert_eq!(first["task"]["title"], "Print discharge summary");
        let task_id = first["task"]["id"].as_str().unwrap().to_string();

        assert_eq!(first["has_new"], true);

        let again = poll(state.clone()).await.unwrap().0;
        assert_eq!(again["has_new"], false);
        assert!(again["task"].is_null());

        let ack = acknowledge_notification(
            state.clone(),
            Json(AckBody {
                task_id: task_id.clone(),
                assignee: "rec-1".into(),
                session: Some("tab-1".into()),
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(ack["outcome"], "acknowledged");
        assert_eq!(ack["state"], "cooling_down");

        let tasks = list_tasks(
            state,
            Query(TaskQuery {
                assignee: Some("rec-1".into()),
                all: None,
            }),
        )
        .await
        .unwrap()
        .0;
        assert!(tasks["tasks"][0]["acknowledged_at"].is_string());
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_task_is_404() {
        let state = test_state();
        let err = acknowledge_notification(
            state,
            Json(AckBody {
                task_id: "ghost".into(),
                assignee: "rec-1".into(),
                session: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status_for(&err.0), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_acknowledge_without_assignee_uses_task_owner() {
        let state = test_state();
        let (_, Json(report)) = create_tasks(
            state.clone(),
            Json(CreateTasksBody {
                recipients: vec!["rec-1".into()],
                task: new_task("Refill printer"),
            }),
        )
        .await
        .unwrap();
        let task_id = report["created"][0]["id"].as_str().unwrap().to_string();

        let body: AckBody = serde_json::from_value(json!({ "taskId": task_id })).unwrap();
        let ack = acknowledge_notification(state.clone(), Json(body)).await.unwrap().0;
        assert_eq!(ack["outcome"], "acknowledged");
        assert!(state.sessions.session("rec-1", DEFAULT_SESSION).has_surfaced(&task_id));

        let body: AckBody = serde_json::from_value(json!({ "taskId": "ghost" })).unwrap();
        let err = acknowledge_notification(state, Json(body)).await.unwrap_err();
        assert_eq!(status_for(&err.0), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_close_session_forgets_it() {
        let state = test_state();
        poll_notifications(
            state.clone(),
            Query(PollQuery {
                assignee: "rec-1".into(),
                session: Some("tab-1".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(state.sessions.len(), 1);

        let close = || {
            close_notification_session(
                state.clone(),
                Json(SessionBody {
                    assignee: "rec-1".into(),
                    session: Some("tab-1".into()),
                }),
            )
        };
        assert_eq!(close().await.unwrap().0["removed"], true);
        assert_eq!(close().await.unwrap().0["removed"], false);
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_create_tasks_requires_recipients() {
        let err = create_tasks(
            test_state(),
            Json(CreateTasksBody {
                recipients: vec![],
                task: new_task("x"),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status_for(&err.0), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_complete_task() {
        let state = test_state();
        let (_, Json(report)) = create_tasks(
            state.clone(),
            Json(CreateTasksBody {
                recipients: vec!["rec-1".into()],
                task: new_task("Call pharmacy"),
            }),
        )
        .await
        .unwrap();
        let id = report["created"][0]["id"].as_str().unwrap().to_string();
        let done = update_task_status(
            state,
            Path(id),
            Json(StatusBody {
                status: TaskStatus::Completed,
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(done["task"]["status"], "completed");
    }

    // ---- Suggested ----

    #[tokio::test]
    async fn test_suggestion_lifecycle() {
        let state = test_state();
        let (status, Json(created)) = create_suggested(
            state.clone(),
            Json(CreateSuggestionBody {
                hours: Some(2),
                suggestion: NewSuggestion {
                    title: "Schedule follow-up".into(),
                    ..NewSuggestion::default()
                },
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        let id = created["suggestion"]["id"].as_str().unwrap().to_string();

        let listed = list_suggested(state.clone()).await.unwrap().0;
        assert_eq!(listed["suggestions"][0]["expired"], false);

        let err = patch_suggested(
            state.clone(),
            Json(PatchSuggestionBody {
                id: id.clone(),
                hours: Some(0),
                expires_at: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status_for(&err.0), StatusCode::BAD_REQUEST);

        patch_suggested(
            state.clone(),
            Json(PatchSuggestionBody {
                id: id.clone(),
                hours: Some(24),
                expires_at: None,
            }),
        )
        .await
        .unwrap();

        let (status, Json(promoted)) = promote_suggested(
            state.clone(),
            Path(id.clone()),
            Json(PromoteBody {
                recipients: vec!["rec-1".into()],
                assigned_by: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(promoted["suggestion_removed"], true);
        assert_eq!(promoted["created"][0]["assigned_by"], "system");

        let err = delete_suggested(state, Json(IdBody { id })).await.unwrap_err();
        assert_eq!(status_for(&err.0), StatusCode::NOT_FOUND);
    }

    // ---- Router ----

    #[tokio::test]
    async fn test_router_serves_health_and_404() {
        let app = crate::server::build_router_from_arc(test_state().0);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/patients/nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["kind"], "not_found");
    }
}
