use async_trait::async_trait;
use thiserror::Error;

use mendy_core::domain::actor::ActorId;
use mendy_core::domain::audit::{ActionRecord, ArtisanRefusal, StatusHistoryEntry};
use mendy_core::domain::estimate::{BillingEstimate, EstimateId};
use mendy_core::domain::request::{RequestId, RequestStatus, ServiceRequest};

pub mod audit;
pub mod memory;
pub mod store;

pub use audit::SqlAuditLogRepository;
pub use memory::{InMemoryAuditLogRepository, InMemoryRequestStore};
pub use store::SqlRequestStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stale write rejected: {0}")]
    VersionConflict(String),
}

/// Persistence collaborator for the mutable half of the aggregate: the
/// request row and its estimates.
///
/// `commit_transition` is the serialized write path: every UPDATE carries
/// the version the caller read, all rows commit in one transaction, and a
/// missed version check surfaces as [`RepositoryError::VersionConflict`] so
/// the operation can be re-run against fresh state.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_request(&self, id: &RequestId)
        -> Result<Option<ServiceRequest>, RepositoryError>;

    async fn find_estimate(
        &self,
        id: &EstimateId,
    ) -> Result<Option<BillingEstimate>, RepositoryError>;

    async fn find_pending_estimate(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<BillingEstimate>, RepositoryError>;

    /// Highest revision for the request, whatever its status.
    async fn find_latest_estimate(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<BillingEstimate>, RepositoryError>;

    async fn insert_request(&self, request: &ServiceRequest) -> Result<(), RepositoryError>;

    async fn commit_transition(
        &self,
        request: Option<(&ServiceRequest, u32)>,
        estimate_update: Option<(&BillingEstimate, u32)>,
        estimate_insert: Option<&BillingEstimate>,
    ) -> Result<(), RepositoryError>;
}

/// Append-only audit tables. Rows are write-once and race-free by
/// construction; they are written after the status write they describe has
/// committed.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append_history(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError>;

    async fn append_action(&self, action: &ActionRecord) -> Result<(), RepositoryError>;

    async fn append_refusal(&self, refusal: &ArtisanRefusal) -> Result<(), RepositoryError>;

    async fn history_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError>;

    async fn actions_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ActionRecord>, RepositoryError>;

    /// Timeline scan: has this request ever been in `status`, regardless of
    /// what it is now.
    async fn has_passed_through(
        &self,
        request_id: &RequestId,
        status: RequestStatus,
    ) -> Result<bool, RepositoryError>;

    async fn has_refused(
        &self,
        artisan_id: &ActorId,
        request_id: &RequestId,
    ) -> Result<bool, RepositoryError>;

    async fn refusals_for_artisan(
        &self,
        artisan_id: &ActorId,
    ) -> Result<Vec<ArtisanRefusal>, RepositoryError>;
}
