//! HTTP surface for the approval workflow.
//!
//! Endpoints:
//! - `GET  /api/po/{id}/status`   — approval summary plus what the caller may do
//! - `POST /api/po/{id}/request`  — request approval (optional targeted approver)
//! - `POST /api/po/{id}/approve`  — approve the pending request
//! - `POST /api/po/{id}/reject`   — reject the pending request
//! - `GET  /api/pending`          — orders awaiting the caller's decision
//! - `GET  /api/pending/any`      — non-high-value pending work, any approver
//! - `GET  /api/users`            — selectable approvers, optionally scoped to an order
//!
//! Callers identify themselves with an `X-User-Id` header carrying a
//! directory user id; upstream authentication is assumed to have happened
//! at the proxy layer.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use signoff_core::{
    ApprovalStatusView, ApprovalWorkflow, DirectoryUser, NotificationDispatcher, OrderGateway,
    OrderId, PendingReview, UserDirectory, UserId, WorkflowError,
};

pub struct ApprovalsState<G, D, N> {
    workflow: Arc<ApprovalWorkflow<G, D, N>>,
    directory: Arc<dyn UserDirectory>,
}

impl<G, D, N> Clone for ApprovalsState<G, D, N> {
    fn clone(&self) -> Self {
        Self { workflow: self.workflow.clone(), directory: self.directory.clone() }
    }
}

pub fn router<G, D, N>(
    workflow: Arc<ApprovalWorkflow<G, D, N>>,
    directory: Arc<dyn UserDirectory>,
) -> Router
where
    G: OrderGateway + 'static,
    D: UserDirectory + 'static,
    N: NotificationDispatcher + 'static,
{
    Router::new()
        .route("/api/po/{id}/status", get(order_status::<G, D, N>))
        .route("/api/po/{id}/request", post(request_approval::<G, D, N>))
        .route("/api/po/{id}/approve", post(approve::<G, D, N>))
        .route("/api/po/{id}/reject", post(reject::<G, D, N>))
        .route("/api/pending", get(pending_for_caller::<G, D, N>))
        .route("/api/pending/any", get(pending_any::<G, D, N>))
        .route("/api/users", get(approver_users::<G, D, N>))
        .with_state(ApprovalsState { workflow, directory })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RequestBody {
    pub approver_id: Option<i64>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionBody {
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub success: bool,
    pub approval_level: u32,
    pub requested_approver: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub success: bool,
    pub approval_level: u32,
    pub status: String,
    pub decided_by: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub count: usize,
    pub results: Vec<T>,
}

impl<T> ListResponse<T> {
    fn new(results: Vec<T>) -> Self {
        Self { count: results.len(), results }
    }
}

#[derive(Debug, Serialize)]
pub struct ApproverUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
}

impl From<DirectoryUser> for ApproverUser {
    fn from(user: DirectoryUser) -> Self {
        Self {
            id: user.id.0,
            username: user.username,
            full_name: user.display_name,
            email: user.email,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    /// Scope the list to approvers eligible for this order.
    pub order: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(error: WorkflowError) -> Self {
        match &error {
            WorkflowError::OrderNotFound => Self::new(StatusCode::NOT_FOUND, error.to_string()),
            WorkflowError::IneligibleDecision(_) => {
                Self::new(StatusCode::FORBIDDEN, error.to_string())
            }
            WorkflowError::NoPendingRequest
            | WorkflowError::IneligibleRequest(_)
            | WorkflowError::InvalidApprover => {
                Self::new(StatusCode::BAD_REQUEST, error.to_string())
            }
            WorkflowError::Store(store) => {
                error!(error = %store, "storage failure while serving approval request");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal storage error")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn resolve_actor(
    directory: &Arc<dyn UserDirectory>,
    headers: &HeaderMap,
) -> Result<DirectoryUser, ApiError> {
    let id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required"))?;

    directory
        .find_user(UserId(id))
        .await
        .map_err(WorkflowError::from)?
        .filter(|user| user.active)
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Unknown user"))
}

async fn order_status<G, D, N>(
    State(state): State<ApprovalsState<G, D, N>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApprovalStatusView>, ApiError>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    let actor = resolve_actor(&state.directory, &headers).await?;
    let view = state.workflow.status(&OrderId(id), actor.id).await?;
    Ok(Json(view))
}

async fn request_approval<G, D, N>(
    State(state): State<ApprovalsState<G, D, N>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<RequestBody>>,
) -> Result<Json<RequestResponse>, ApiError>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    let actor = resolve_actor(&state.directory, &headers).await?;
    let Json(body) = body.unwrap_or_default();

    let entry = state
        .workflow
        .request(&OrderId(id), actor.as_ref(), body.approver_id.map(UserId), &body.notes)
        .await?;

    Ok(Json(RequestResponse {
        success: true,
        approval_level: entry.level,
        requested_approver: entry.requested_approver.map(|user| user.display_name),
        message: "Approval requested successfully".to_string(),
    }))
}

async fn approve<G, D, N>(
    state: State<ApprovalsState<G, D, N>>,
    path: Path<String>,
    headers: HeaderMap,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<DecisionResponse>, ApiError>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    decide(state, path, headers, body, true).await
}

async fn reject<G, D, N>(
    state: State<ApprovalsState<G, D, N>>,
    path: Path<String>,
    headers: HeaderMap,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<DecisionResponse>, ApiError>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    decide(state, path, headers, body, false).await
}

async fn decide<G, D, N>(
    State(state): State<ApprovalsState<G, D, N>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<DecisionBody>>,
    approved: bool,
) -> Result<Json<DecisionResponse>, ApiError>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    let actor = resolve_actor(&state.directory, &headers).await?;
    let Json(body) = body.unwrap_or_default();

    let entry =
        state.workflow.decide(&OrderId(id), actor.as_ref(), approved, &body.notes).await?;

    Ok(Json(DecisionResponse {
        success: true,
        approval_level: entry.level,
        status: entry.status.as_str().to_string(),
        decided_by: entry.actual_approver.map(|user| user.display_name),
        message: if approved {
            "Order approved".to_string()
        } else {
            "Order rejected".to_string()
        },
    }))
}

async fn pending_for_caller<G, D, N>(
    State(state): State<ApprovalsState<G, D, N>>,
    headers: HeaderMap,
) -> Result<Json<ListResponse<PendingReview>>, ApiError>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    let actor = resolve_actor(&state.directory, &headers).await?;
    let reviews = state.workflow.pending_for_actor(actor.id).await?;
    Ok(Json(ListResponse::new(reviews)))
}

async fn pending_any<G, D, N>(
    State(state): State<ApprovalsState<G, D, N>>,
    headers: HeaderMap,
) -> Result<Json<ListResponse<PendingReview>>, ApiError>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    resolve_actor(&state.directory, &headers).await?;
    let reviews = state.workflow.pending_any_approver().await?;
    Ok(Json(ListResponse::new(reviews)))
}

async fn approver_users<G, D, N>(
    State(state): State<ApprovalsState<G, D, N>>,
    headers: HeaderMap,
    Query(query): Query<UsersQuery>,
) -> Result<Json<ListResponse<ApproverUser>>, ApiError>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    let actor = resolve_actor(&state.directory, &headers).await?;

    let users = match query.order {
        Some(order) => state.workflow.eligible_approvers(&OrderId(order), actor.id).await?,
        None => {
            let mut users =
                state.directory.list_active_users().await.map_err(WorkflowError::from)?;
            users.retain(|user| user.id != actor.id);
            users
        }
    };

    Ok(Json(ListResponse::new(users.into_iter().map(ApproverUser::from).collect())))
}
