pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod notify;

pub use chrono;
pub use rust_decimal;

pub use domain::actor::{Actor, ActorId, ActorRole};
pub use domain::audit::{
    ActionRecord, ActionRecordId, ActionType, ArtisanRefusal, DisputeReason, HistoryEntryId,
    StatusHistoryEntry,
};
pub use domain::estimate::{
    revision_outcome, BillingEstimate, EstimateId, EstimateStatus, RevisionOutcome,
};
pub use domain::request::{RequestId, RequestStatus, ServiceRequest};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{
    DisputeGrounds, EstimateChange, EstimateDecision, EstimateDraft, LifecycleEngine,
    TransitionOutcome, ValidationNotes, MIN_REJECTION_REASON_CHARS,
};
pub use notify::{InMemoryNotifier, Notifier, NotifyError, StatusNotification, TracingNotifier};
