use std::collections::HashMap;

use tokio::sync::RwLock;

use mendy_core::domain::actor::ActorId;
use mendy_core::domain::audit::{ActionRecord, ArtisanRefusal, StatusHistoryEntry};
use mendy_core::domain::estimate::{BillingEstimate, EstimateId, EstimateStatus};
use mendy_core::domain::request::{RequestId, RequestStatus, ServiceRequest};

use super::{AuditLogRepository, RepositoryError, RequestStore};

#[derive(Default)]
struct StoreInner {
    requests: HashMap<String, ServiceRequest>,
    estimates: HashMap<String, BillingEstimate>,
}

/// In-memory stand-in for the SQL store. A single lock covers requests and
/// estimates so `commit_transition` has the same all-or-nothing, version
/// checked semantics as the transactional implementation.
#[derive(Default)]
pub struct InMemoryRequestStore {
    inner: RwLock<StoreInner>,
}

#[async_trait::async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn find_request(
        &self,
        id: &RequestId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.requests.get(&id.0).cloned())
    }

    async fn find_estimate(
        &self,
        id: &EstimateId,
    ) -> Result<Option<BillingEstimate>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.estimates.get(&id.0).cloned())
    }

    async fn find_pending_estimate(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<BillingEstimate>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .estimates
            .values()
            .find(|estimate| {
                estimate.request_id == *request_id && estimate.status == EstimateStatus::Pending
            })
            .cloned())
    }

    async fn find_latest_estimate(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<BillingEstimate>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .estimates
            .values()
            .filter(|estimate| estimate.request_id == *request_id)
            .max_by_key(|estimate| estimate.revision_number)
            .cloned())
    }

    async fn insert_request(&self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn commit_transition(
        &self,
        request: Option<(&ServiceRequest, u32)>,
        estimate_update: Option<(&BillingEstimate, u32)>,
        estimate_insert: Option<&BillingEstimate>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;

        // Validate every version check before applying anything.
        if let Some((request, expected_version)) = request {
            let stored = inner.requests.get(&request.id.0).ok_or_else(|| {
                RepositoryError::VersionConflict(format!(
                    "service_request `{}` does not exist",
                    request.id.0,
                ))
            })?;
            if stored.state_version != expected_version {
                return Err(RepositoryError::VersionConflict(format!(
                    "service_request `{}` moved past version {expected_version}",
                    request.id.0,
                )));
            }
        }
        if let Some((estimate, expected_version)) = estimate_update {
            let stored = inner.estimates.get(&estimate.id.0).ok_or_else(|| {
                RepositoryError::VersionConflict(format!(
                    "billing_estimate `{}` does not exist",
                    estimate.id.0,
                ))
            })?;
            if stored.state_version != expected_version {
                return Err(RepositoryError::VersionConflict(format!(
                    "billing_estimate `{}` moved past version {expected_version}",
                    estimate.id.0,
                )));
            }
        }

        if let Some((request, _)) = request {
            inner.requests.insert(request.id.0.clone(), request.clone());
        }
        if let Some((estimate, _)) = estimate_update {
            inner.estimates.insert(estimate.id.0.clone(), estimate.clone());
        }
        if let Some(estimate) = estimate_insert {
            inner.estimates.insert(estimate.id.0.clone(), estimate.clone());
        }

        Ok(())
    }
}

#[derive(Default)]
struct AuditInner {
    history: Vec<StatusHistoryEntry>,
    actions: Vec<ActionRecord>,
    refusals: Vec<ArtisanRefusal>,
}

#[derive(Default)]
pub struct InMemoryAuditLogRepository {
    inner: RwLock<AuditInner>,
}

#[async_trait::async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append_history(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.history.push(entry.clone());
        Ok(())
    }

    async fn append_action(&self, action: &ActionRecord) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.actions.push(action.clone());
        Ok(())
    }

    async fn append_refusal(&self, refusal: &ArtisanRefusal) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        let duplicate = inner.refusals.iter().any(|existing| {
            existing.artisan_id == refusal.artisan_id && existing.request_id == refusal.request_id
        });
        if !duplicate {
            inner.refusals.push(refusal.clone());
        }
        Ok(())
    }

    async fn history_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .history
            .iter()
            .filter(|entry| entry.request_id == *request_id)
            .cloned()
            .collect())
    }

    async fn actions_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ActionRecord>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .actions
            .iter()
            .filter(|action| action.request_id == *request_id)
            .cloned()
            .collect())
    }

    async fn has_passed_through(
        &self,
        request_id: &RequestId,
        status: RequestStatus,
    ) -> Result<bool, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .history
            .iter()
            .any(|entry| entry.request_id == *request_id && entry.status == status))
    }

    async fn has_refused(
        &self,
        artisan_id: &ActorId,
        request_id: &RequestId,
    ) -> Result<bool, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.refusals.iter().any(|refusal| {
            refusal.artisan_id == *artisan_id && refusal.request_id == *request_id
        }))
    }

    async fn refusals_for_artisan(
        &self,
        artisan_id: &ActorId,
    ) -> Result<Vec<ArtisanRefusal>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .refusals
            .iter()
            .filter(|refusal| refusal.artisan_id == *artisan_id)
            .cloned()
            .collect())
    }
}
