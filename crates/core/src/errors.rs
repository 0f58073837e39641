use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::actor::{ActorId, ActorRole};
use crate::domain::estimate::EstimateId;
use crate::domain::request::RequestStatus;

/// Errors raised by the lifecycle engine before any state is written.
///
/// `InvalidState` (and its expiry cousin) means the entity was not in a
/// state the operation accepts; callers must re-read state before deciding
/// whether the intended action still applies. `Authorization` and
/// `Validation` are safe to retry after correction.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("operation `{operation}` is not allowed while the request is `{status}`", status = .current.as_str())]
    InvalidState { operation: &'static str, current: RequestStatus },
    #[error("estimate `{id}` expired at {valid_until}", id = .estimate_id.0)]
    EstimateExpired { estimate_id: EstimateId, valid_until: DateTime<Utc> },
    #[error("invalid status transition from `{from_status}` to `{to_status}`", from_status = .from.as_str(), to_status = .to.as_str())]
    InvalidTransition { from: RequestStatus, to: RequestStatus },
    #[error("actor `{id}` ({role_name}) may not {operation}", id = .actor_id.0, role_name = .role.as_str())]
    Authorization { actor_id: ActorId, role: ActorRole, operation: &'static str },
    #[error("invalid payload: {0}")]
    Validation(String),
}

impl DomainError {
    /// Stable machine-readable kind surfaced to callers alongside the
    /// human-readable message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } | Self::InvalidTransition { .. } => "invalid_state",
            Self::EstimateExpired { .. } => "estimate_expired",
            Self::Authorization { .. } => "authorization",
            Self::Validation(_) => "validation",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{resource} `{id}` not found")]
    NotFound { resource: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Domain(domain) => domain.kind(),
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let kind = self.kind();
        let message = self.to_string();

        match self {
            ApplicationError::Domain(DomainError::Validation(_)) => {
                InterfaceError::BadRequest { kind, message, correlation_id }
            }
            ApplicationError::Domain(DomainError::Authorization { .. }) => {
                InterfaceError::Forbidden { kind, message, correlation_id }
            }
            ApplicationError::Domain(
                DomainError::InvalidState { .. }
                | DomainError::InvalidTransition { .. }
                | DomainError::EstimateExpired { .. },
            ) => InterfaceError::Conflict { kind, message, correlation_id },
            ApplicationError::NotFound { .. } => {
                InterfaceError::NotFound { kind, message, correlation_id }
            }
            ApplicationError::Persistence(_) => {
                InterfaceError::ServiceUnavailable { kind, message, correlation_id }
            }
            ApplicationError::Configuration(_) => {
                InterfaceError::Internal { kind, message, correlation_id }
            }
        }
    }
}

/// Error shape of the HTTP surface. Every rejected operation returns a
/// stable kind plus a human-readable reason; nothing silently no-ops.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { kind: &'static str, message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { kind: &'static str, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { kind: &'static str, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { kind: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { kind: &'static str, message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { kind: &'static str, message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { kind, .. }
            | Self::Forbidden { kind, .. }
            | Self::Conflict { kind, .. }
            | Self::NotFound { kind, .. }
            | Self::ServiceUnavailable { kind, .. }
            | Self::Internal { kind, .. } => kind,
        }
    }

    /// Whether the caller may retry the identical call without re-reading
    /// state first.
    pub fn retriable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}
