//! Transactional application service for the request lifecycle.
//!
//! Each operation is a short-lived unit of work: load the aggregate, run
//! the pure engine, commit the status writes in one version-checked
//! transaction, then append audit rows and emit the notification. A version
//! conflict means a concurrent transition won the race; the operation is
//! re-run from the load step so its precondition is re-evaluated against
//! fresh state, never blindly reapplied.

use std::sync::Arc;

use tracing::warn;

use mendy_core::domain::actor::{Actor, ActorId};
use mendy_core::domain::audit::{
    ActionRecord, ActionRecordId, ArtisanRefusal, HistoryEntryId, StatusHistoryEntry,
};
use mendy_core::domain::estimate::{BillingEstimate, EstimateId};
use mendy_core::domain::request::{RequestId, RequestStatus, ServiceRequest};
use mendy_core::errors::{ApplicationError, DomainError};
use mendy_core::lifecycle::{
    DisputeGrounds, EstimateChange, EstimateDecision, EstimateDraft, LifecycleEngine,
    TransitionOutcome, ValidationNotes,
};
use mendy_core::notify::Notifier;

use crate::repositories::{AuditLogRepository, RepositoryError, RequestStore};

/// Bounded re-runs when an optimistic version check loses a race.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// What the caller gets back from a successful operation: the new status
/// plus the audit row ids the transition created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionReceipt {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub history_id: Option<HistoryEntryId>,
    pub action_id: Option<ActionRecordId>,
}

pub struct LifecycleService {
    store: Arc<dyn RequestStore>,
    audit: Arc<dyn AuditLogRepository>,
    notifier: Arc<dyn Notifier>,
    engine: LifecycleEngine,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        audit: Arc<dyn AuditLogRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { store, audit, notifier, engine: LifecycleEngine::new() }
    }

    // -----------------------------------------------------------------
    // Operation surface
    // -----------------------------------------------------------------

    pub async fn create_request(
        &self,
        client: &Actor,
        down_payment_required: bool,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let outcome = self.engine.create_request(client, down_payment_required)?;
        self.store.insert_request(&outcome.request).await.map_err(persistence)?;
        self.record_side_effects(outcome).await
    }

    pub async fn record_down_payment(
        &self,
        request_id: &RequestId,
        actor: &Actor,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_request_op(request_id, |request| self.engine.record_down_payment(request, actor))
            .await
    }

    pub async fn create_initial_estimate(
        &self,
        request_id: &RequestId,
        admin: &Actor,
        draft: EstimateDraft,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_request_op(request_id, |request| {
            self.engine.create_initial_estimate(request, admin, draft.clone())
        })
        .await
    }

    pub async fn respond_to_estimate(
        &self,
        estimate_id: &EstimateId,
        client: &Actor,
        decision: EstimateDecision,
        response: Option<String>,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_estimate_op(estimate_id, |request, estimate| {
            self.engine.respond_to_estimate(request, estimate, client, decision, response.clone())
        })
        .await
    }

    pub async fn artisan_reject_estimate(
        &self,
        estimate_id: &EstimateId,
        artisan: &Actor,
        reason: String,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_estimate_op(estimate_id, |request, estimate| {
            self.engine.artisan_reject_estimate(request, estimate, artisan, reason.clone())
        })
        .await
    }

    pub async fn create_revised_estimate(
        &self,
        request_id: &RequestId,
        admin: &Actor,
        draft: EstimateDraft,
    ) -> Result<TransitionReceipt, ApplicationError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let request = self.load_request(request_id).await?;
            let previous = self
                .store
                .find_latest_estimate(request_id)
                .await
                .map_err(persistence)?
                .ok_or_else(|| ApplicationError::NotFound {
                    resource: "billing estimate",
                    id: request_id.0.clone(),
                })?;
            let expected_request = request.state_version;

            let outcome =
                self.engine.create_revised_estimate(request, &previous, admin, draft.clone())?;
            match self.persist(&outcome, expected_request, None).await {
                Ok(()) => return self.record_side_effects(outcome).await,
                Err(RepositoryError::VersionConflict(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(
                        event_name = "lifecycle.commit_retry",
                        request_id = %request_id.0,
                        attempt,
                        reason = %reason,
                        "transition lost a version race, re-reading state"
                    );
                }
                Err(error) => return Err(persistence(error)),
            }
        }
        Err(contention(request_id))
    }

    pub async fn respond_to_revision(
        &self,
        estimate_id: &EstimateId,
        actor: &Actor,
        decision: EstimateDecision,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_estimate_op(estimate_id, |request, estimate| {
            self.engine.respond_to_revision(request, estimate, actor, decision)
        })
        .await
    }

    pub async fn accept_assignment(
        &self,
        request_id: &RequestId,
        artisan: &Actor,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let has_refused =
            self.audit.has_refused(&artisan.id, request_id).await.map_err(persistence)?;
        self.run_request_op(request_id, |request| {
            self.engine.accept_assignment(request, artisan, has_refused)
        })
        .await
    }

    pub async fn decline_assignment(
        &self,
        request_id: &RequestId,
        artisan: &Actor,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_request_op(request_id, |request| self.engine.decline_assignment(request, artisan))
            .await
    }

    pub async fn start_mission(
        &self,
        request_id: &RequestId,
        artisan: &Actor,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_request_op(request_id, |request| self.engine.start_mission(request, artisan))
            .await
    }

    pub async fn validate(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        notes: ValidationNotes,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_request_op(request_id, |request| {
            self.engine.validate(request, actor, notes.clone())
        })
        .await
    }

    pub async fn raise_dispute(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        grounds: DisputeGrounds,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_request_op(request_id, |request| {
            self.engine.raise_dispute(request, actor, grounds.clone())
        })
        .await
    }

    pub async fn resolve_dispute(
        &self,
        request_id: &RequestId,
        admin: &Actor,
        resolution_notes: Option<String>,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.run_request_op(request_id, |request| {
            self.engine.resolve_dispute(request, admin, resolution_notes.clone())
        })
        .await
    }

    // -----------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------

    pub async fn get_request(
        &self,
        request_id: &RequestId,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.load_request(request_id).await
    }

    pub async fn get_estimate(
        &self,
        estimate_id: &EstimateId,
    ) -> Result<BillingEstimate, ApplicationError> {
        self.store.find_estimate(estimate_id).await.map_err(persistence)?.ok_or_else(|| {
            ApplicationError::NotFound { resource: "billing estimate", id: estimate_id.0.clone() }
        })
    }

    pub async fn history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<StatusHistoryEntry>, ApplicationError> {
        self.load_request(request_id).await?;
        self.audit.history_for_request(request_id).await.map_err(persistence)
    }

    pub async fn actions(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ActionRecord>, ApplicationError> {
        self.load_request(request_id).await?;
        self.audit.actions_for_request(request_id).await.map_err(persistence)
    }

    pub async fn refusals_for_artisan(
        &self,
        artisan_id: &ActorId,
    ) -> Result<Vec<ArtisanRefusal>, ApplicationError> {
        self.audit.refusals_for_artisan(artisan_id).await.map_err(persistence)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn load_request(
        &self,
        request_id: &RequestId,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.store.find_request(request_id).await.map_err(persistence)?.ok_or_else(|| {
            ApplicationError::NotFound { resource: "service request", id: request_id.0.clone() }
        })
    }

    async fn run_request_op<F>(
        &self,
        request_id: &RequestId,
        op: F,
    ) -> Result<TransitionReceipt, ApplicationError>
    where
        F: Fn(ServiceRequest) -> Result<TransitionOutcome, DomainError>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let request = self.load_request(request_id).await?;
            let expected_request = request.state_version;

            let outcome = op(request)?;
            match self.persist(&outcome, expected_request, None).await {
                Ok(()) => return self.record_side_effects(outcome).await,
                Err(RepositoryError::VersionConflict(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(
                        event_name = "lifecycle.commit_retry",
                        request_id = %request_id.0,
                        attempt,
                        reason = %reason,
                        "transition lost a version race, re-reading state"
                    );
                }
                Err(error) => return Err(persistence(error)),
            }
        }
        Err(contention(request_id))
    }

    async fn run_estimate_op<F>(
        &self,
        estimate_id: &EstimateId,
        op: F,
    ) -> Result<TransitionReceipt, ApplicationError>
    where
        F: Fn(ServiceRequest, BillingEstimate) -> Result<TransitionOutcome, DomainError>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let estimate = self.get_estimate(estimate_id).await?;
            let request = self.load_request(&estimate.request_id).await?;
            let expected_request = request.state_version;
            let expected_estimate = estimate.state_version;

            let outcome = match op(request, estimate.clone()) {
                Ok(outcome) => outcome,
                Err(expiry @ DomainError::EstimateExpired { .. }) => {
                    self.persist_lazy_expiry(estimate, expected_estimate).await;
                    return Err(expiry.into());
                }
                Err(error) => return Err(error.into()),
            };
            match self.persist(&outcome, expected_request, Some(expected_estimate)).await {
                Ok(()) => return self.record_side_effects(outcome).await,
                Err(RepositoryError::VersionConflict(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(
                        event_name = "lifecycle.commit_retry",
                        estimate_id = %estimate_id.0,
                        attempt,
                        reason = %reason,
                        "transition lost a version race, re-reading state"
                    );
                }
                Err(error) => return Err(persistence(error)),
            }
        }
        Err(ApplicationError::Persistence(format!(
            "persistent write contention on estimate `{}`",
            estimate_id.0,
        )))
    }

    /// Writes the expired status observed on access. Losing this write to a
    /// concurrent transition is fine; the next read sees whatever won.
    async fn persist_lazy_expiry(&self, estimate: BillingEstimate, expected_version: u32) {
        let estimate_id = estimate.id.clone();
        let expired = self.engine.expire_estimate(estimate);
        if let Err(error) =
            self.store.commit_transition(None, Some((&expired, expected_version)), None).await
        {
            warn!(
                event_name = "lifecycle.expiry_write_skipped",
                estimate_id = %estimate_id.0,
                error = %error,
                "could not persist lazy estimate expiry"
            );
        }
    }

    async fn persist(
        &self,
        outcome: &TransitionOutcome,
        expected_request: u32,
        expected_estimate: Option<u32>,
    ) -> Result<(), RepositoryError> {
        let request_write = (outcome.request.state_version != expected_request)
            .then_some((&outcome.request, expected_request));

        let (estimate_update, estimate_insert) = match &outcome.estimate {
            EstimateChange::Unchanged => (None, None),
            EstimateChange::Insert(estimate) => (None, Some(estimate)),
            EstimateChange::Update(estimate) => {
                let expected = expected_estimate.unwrap_or(estimate.state_version - 1);
                (Some((estimate, expected)), None)
            }
        };

        if request_write.is_none() && estimate_update.is_none() && estimate_insert.is_none() {
            return Ok(());
        }
        self.store.commit_transition(request_write, estimate_update, estimate_insert).await
    }

    /// Audit rows are append-only and written after the status write has
    /// committed; notification delivery never fails the operation.
    async fn record_side_effects(
        &self,
        outcome: TransitionOutcome,
    ) -> Result<TransitionReceipt, ApplicationError> {
        if let Some(entry) = &outcome.history {
            self.audit.append_history(entry).await.map_err(persistence)?;
        }
        if let Some(action) = &outcome.action {
            self.audit.append_action(action).await.map_err(persistence)?;
        }
        if let Some(refusal) = &outcome.refusal {
            self.audit.append_refusal(refusal).await.map_err(persistence)?;
        }

        if let Err(error) = self.notifier.notify(&outcome.notification).await {
            warn!(
                event_name = "lifecycle.notification_failed",
                request_id = %outcome.request.id.0,
                status = outcome.request.status.as_str(),
                error = %error,
                "notification delivery failed; transition stands"
            );
        }

        Ok(TransitionReceipt {
            request_id: outcome.request.id,
            status: outcome.request.status,
            history_id: outcome.history.map(|entry| entry.id),
            action_id: outcome.action.map(|action| action.id),
        })
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn contention(request_id: &RequestId) -> ApplicationError {
    ApplicationError::Persistence(format!(
        "persistent write contention on request `{}`",
        request_id.0,
    ))
}
