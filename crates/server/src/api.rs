//! JSON operation surface for the three caller apps (client, artisan,
//! admin).
//!
//! Actor identity arrives in `x-actor-id`/`x-actor-role` headers;
//! authenticating those headers is the gateway collaborator's job, this
//! layer only enforces the relationship rules the lifecycle engine defines.
//! Every response carries a stable machine-readable error kind and the
//! request's correlation id.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mendy_core::domain::actor::{Actor, ActorId, ActorRole};
use mendy_core::domain::audit::DisputeReason;
use mendy_core::domain::estimate::EstimateId;
use mendy_core::domain::request::RequestId;
use mendy_core::errors::{ApplicationError, InterfaceError};
use mendy_core::lifecycle::{DisputeGrounds, EstimateDecision, EstimateDraft, ValidationNotes};
use mendy_db::{LifecycleService, TransitionReceipt};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<LifecycleService>,
}

pub fn router(service: Arc<LifecycleService>) -> Router {
    Router::new()
        .route("/api/v1/requests", post(create_request))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/history", get(get_history))
        .route("/api/v1/requests/{id}/actions", get(get_actions))
        .route("/api/v1/requests/{id}/payment", post(record_down_payment))
        .route("/api/v1/requests/{id}/estimates", post(create_initial_estimate))
        .route("/api/v1/requests/{id}/revisions", post(create_revised_estimate))
        .route("/api/v1/requests/{id}/assignment/accept", post(accept_assignment))
        .route("/api/v1/requests/{id}/assignment/decline", post(decline_assignment))
        .route("/api/v1/requests/{id}/mission/start", post(start_mission))
        .route("/api/v1/requests/{id}/validation", post(validate))
        .route("/api/v1/requests/{id}/dispute", post(raise_dispute))
        .route("/api/v1/requests/{id}/dispute/resolution", post(resolve_dispute))
        .route("/api/v1/estimates/{id}/response", post(respond_to_estimate))
        .route("/api/v1/estimates/{id}/rejection", post(artisan_reject_estimate))
        .route("/api/v1/estimates/{id}/revision-response", post(respond_to_revision))
        .route("/api/v1/artisans/{id}/refusals", get(get_refusals))
        .with_state(ApiState { service })
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    #[serde(default)]
    pub down_payment_required: bool,
}

#[derive(Debug, Deserialize)]
pub struct EstimateBody {
    pub price: Decimal,
    pub description: String,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct EstimateResponseBody {
    pub decision: EstimateDecision,
    pub response: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectionBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RevisionResponseBody {
    pub decision: EstimateDecision,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidationBody {
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisputeBody {
    pub reason: DisputeReason,
    pub details: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolutionBody {
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub request_id: String,
    pub status: &'static str,
    pub history_id: Option<String>,
    pub action_id: Option<String>,
}

impl From<TransitionReceipt> for TransitionResponse {
    fn from(receipt: TransitionReceipt) -> Self {
        Self {
            request_id: receipt.request_id.0,
            status: receipt.status.as_str(),
            history_id: receipt.history_id.map(|id| id.0),
            action_id: receipt.action_id.map(|id| id.0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
    pub correlation_id: String,
    pub retriable: bool,
}

pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let correlation_id = match &self.0 {
            InterfaceError::BadRequest { correlation_id, .. }
            | InterfaceError::Forbidden { correlation_id, .. }
            | InterfaceError::Conflict { correlation_id, .. }
            | InterfaceError::NotFound { correlation_id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id, .. }
            | InterfaceError::Internal { correlation_id, .. } => correlation_id.clone(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.0.kind(),
                message: self.0.to_string(),
                correlation_id,
                retriable: self.0.retriable(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Actor & correlation extraction
// ---------------------------------------------------------------------------

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let correlation = correlation_id(headers);
    let id = headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            ApiError(InterfaceError::BadRequest {
                kind: "validation",
                message: "missing `x-actor-id` header".to_string(),
                correlation_id: correlation.clone(),
            })
        })?;
    let role_raw = headers
        .get("x-actor-role")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError(InterfaceError::BadRequest {
                kind: "validation",
                message: "missing `x-actor-role` header".to_string(),
                correlation_id: correlation.clone(),
            })
        })?;
    let role = ActorRole::parse(role_raw).ok_or_else(|| {
        ApiError(InterfaceError::BadRequest {
            kind: "validation",
            message: format!("unknown actor role `{role_raw}`"),
            correlation_id: correlation,
        })
    })?;

    Ok(Actor::new(id, role))
}

fn map_error(error: ApplicationError, headers: &HeaderMap) -> ApiError {
    ApiError(error.into_interface(correlation_id(headers)))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .create_request(&actor, body.down_payment_required)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<mendy_core::ServiceRequest>, ApiError> {
    let request = state
        .service
        .get_request(&RequestId(id))
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(request))
}

async fn get_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<mendy_core::StatusHistoryEntry>>, ApiError> {
    let history = state
        .service
        .history(&RequestId(id))
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(history))
}

async fn get_actions(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<mendy_core::ActionRecord>>, ApiError> {
    let actions = state
        .service
        .actions(&RequestId(id))
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(actions))
}

async fn get_refusals(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<mendy_core::ArtisanRefusal>>, ApiError> {
    let refusals = state
        .service
        .refusals_for_artisan(&ActorId(id))
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(refusals))
}

async fn record_down_payment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .record_down_payment(&RequestId(id), &actor)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn create_initial_estimate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EstimateBody>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let draft = EstimateDraft {
        price: body.price,
        description: body.description,
        valid_until: body.valid_until,
    };
    let receipt = state
        .service
        .create_initial_estimate(&RequestId(id), &actor, draft)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

async fn create_revised_estimate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EstimateBody>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let draft = EstimateDraft {
        price: body.price,
        description: body.description,
        valid_until: body.valid_until,
    };
    let receipt = state
        .service
        .create_revised_estimate(&RequestId(id), &actor, draft)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

async fn respond_to_estimate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EstimateResponseBody>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .respond_to_estimate(&EstimateId(id), &actor, body.decision, body.response)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn artisan_reject_estimate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RejectionBody>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .artisan_reject_estimate(&EstimateId(id), &actor, body.reason)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn respond_to_revision(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RevisionResponseBody>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .respond_to_revision(&EstimateId(id), &actor, body.decision)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn accept_assignment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .accept_assignment(&RequestId(id), &actor)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn decline_assignment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .decline_assignment(&RequestId(id), &actor)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn start_mission(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .start_mission(&RequestId(id), &actor)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn validate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ValidationBody>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let notes = ValidationNotes { notes: body.notes, photo_refs: body.photo_refs };
    let receipt = state
        .service
        .validate(&RequestId(id), &actor, notes)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn raise_dispute(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DisputeBody>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let grounds = DisputeGrounds { reason: body.reason, details: body.details };
    let receipt = state
        .service
        .raise_dispute(&RequestId(id), &actor, grounds)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}

async fn resolve_dispute(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ResolutionBody>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let receipt = state
        .service
        .resolve_dispute(&RequestId(id), &actor, body.resolution_notes)
        .await
        .map_err(|error| map_error(error, &headers))?;
    Ok(Json(receipt.into()))
}
