//! The service-request lifecycle state machine.
//!
//! Every operation follows the same discipline: validate the payload,
//! authorize the actor, check the precondition set against the *current*
//! status, and only then produce the transition. Concurrent actors can race
//! a request into an unexpected state between read and write, so no
//! operation ever assumes the entity is in the state it "normally" would
//! be; persistence re-runs the whole sequence when its version check fails.
//!
//! The engine is pure with respect to storage: it takes the loaded
//! aggregate, returns a [`TransitionOutcome`] describing every row to
//! write, and never talks to a repository itself.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::actor::{Actor, ActorRole};
use crate::domain::audit::{
    ActionRecord, ActionRecordId, ActionType, ArtisanRefusal, HistoryEntryId, StatusHistoryEntry,
};
use crate::domain::estimate::{
    revision_outcome, BillingEstimate, EstimateId, EstimateStatus, RevisionOutcome,
};
use crate::domain::request::{RequestId, RequestStatus, ServiceRequest};
use crate::errors::DomainError;
use crate::lifecycle::commands::{
    DisputeGrounds, EstimateDecision, EstimateDraft, ValidationNotes,
};
use crate::notify::StatusNotification;

/// Minimum length of an artisan's justification for rejecting an accepted
/// estimate. Forces a substantive reason before pricing is reopened.
pub const MIN_REJECTION_REASON_CHARS: usize = 50;

/// Which party of the request a participant actor maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Party {
    Client,
    Artisan,
}

/// Estimate row change requested by a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum EstimateChange {
    Unchanged,
    Insert(BillingEstimate),
    Update(BillingEstimate),
}

impl EstimateChange {
    pub fn as_estimate(&self) -> Option<&BillingEstimate> {
        match self {
            Self::Unchanged => None,
            Self::Insert(estimate) | Self::Update(estimate) => Some(estimate),
        }
    }
}

/// Everything a successful operation produced. The caller persists the
/// request/estimate atomically, then appends the audit rows, then emits the
/// notification.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOutcome {
    pub request: ServiceRequest,
    pub estimate: EstimateChange,
    pub history: Option<StatusHistoryEntry>,
    pub action: Option<ActionRecord>,
    pub refusal: Option<ArtisanRefusal>,
    pub notification: StatusNotification,
}

#[derive(Clone, Debug, Default)]
pub struct LifecycleEngine;

impl LifecycleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Client intake: a new request enters at `AwaitingPayment` when a down
    /// payment gates it, `AwaitingEstimate` otherwise.
    pub fn create_request(
        &self,
        client: &Actor,
        down_payment_required: bool,
    ) -> Result<TransitionOutcome, DomainError> {
        require_role(client, ActorRole::Client, "create a service request")?;

        let now = Utc::now();
        let status = if down_payment_required {
            RequestStatus::AwaitingPayment
        } else {
            RequestStatus::AwaitingEstimate
        };
        let request = ServiceRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            client_id: client.id.clone(),
            assigned_artisan_id: None,
            status,
            estimated_price: None,
            state_version: 1,
            created_at: now,
            updated_at: now,
        };

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            notification: notification(&request, client.role),
            request,
            estimate: EstimateChange::Unchanged,
            action: None,
            refusal: None,
        })
    }

    /// The payment collaborator reports the down payment as captured.
    pub fn record_down_payment(
        &self,
        mut request: ServiceRequest,
        actor: &Actor,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "record a down payment";
        require_role(actor, ActorRole::Admin, OP)?;
        require_status(&request, &[RequestStatus::AwaitingPayment], OP)?;

        request.transition_to(RequestStatus::AwaitingEstimate, Utc::now())?;

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            notification: notification(&request, actor.role),
            request,
            estimate: EstimateChange::Unchanged,
            action: None,
            refusal: None,
        })
    }

    pub fn create_initial_estimate(
        &self,
        mut request: ServiceRequest,
        admin: &Actor,
        draft: EstimateDraft,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "create an initial estimate";
        require_role(admin, ActorRole::Admin, OP)?;
        validate_draft(&draft)?;
        require_status(&request, &[RequestStatus::AwaitingEstimate], OP)?;

        let now = Utc::now();
        let estimate = new_estimate(&request, admin, &draft, 1);
        request.transition_to(RequestStatus::AwaitingEstimateAcceptation, now)?;

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            notification: notification(&request, admin.role),
            request,
            estimate: EstimateChange::Insert(estimate),
            action: None,
            refusal: None,
        })
    }

    /// Client response to the original (revision 1) estimate.
    pub fn respond_to_estimate(
        &self,
        mut request: ServiceRequest,
        mut estimate: BillingEstimate,
        client: &Actor,
        decision: EstimateDecision,
        response: Option<String>,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "respond to the estimate";
        require_owner(&request, client, OP)?;
        require_estimate_of(&request, &estimate)?;

        let now = Utc::now();
        if estimate.is_expired_at(now) {
            return Err(DomainError::EstimateExpired {
                estimate_id: estimate.id.clone(),
                valid_until: estimate.valid_until,
            });
        }
        require_status(&request, &[RequestStatus::AwaitingEstimateAcceptation], OP)?;
        require_estimate_status(&request, &estimate, EstimateStatus::Pending, OP)?;
        if estimate.is_revision() {
            // Revisions go through the dual-acceptance protocol.
            return Err(DomainError::InvalidState { operation: OP, current: request.status });
        }

        estimate.client_accepted = Some(decision.is_accept());
        estimate.client_response_date = Some(now);
        estimate.client_response = response;
        let action_type = if decision.is_accept() {
            estimate.status = EstimateStatus::Accepted;
            request.estimated_price = Some(estimate.estimated_price);
            request.transition_to(RequestStatus::AwaitingAssignation, now)?;
            ActionType::EstimateAcceptance
        } else {
            estimate.status = EstimateStatus::Rejected;
            request.transition_to(RequestStatus::Cancelled, now)?;
            ActionType::EstimateRefusal
        };
        estimate.touch();

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            action: Some(action_record(&request, client, action_type)),
            notification: notification(&request, client.role),
            request,
            estimate: EstimateChange::Update(estimate),
            refusal: None,
        })
    }

    /// Mid-mission rejection of the accepted estimate by the assigned
    /// artisan, reopening pricing.
    pub fn artisan_reject_estimate(
        &self,
        mut request: ServiceRequest,
        mut estimate: BillingEstimate,
        artisan: &Actor,
        reason: String,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "reject the accepted estimate";
        require_assigned(&request, artisan, OP)?;
        require_estimate_of(&request, &estimate)?;

        if reason.trim().chars().count() < MIN_REJECTION_REASON_CHARS {
            return Err(DomainError::Validation(format!(
                "rejection reason must be at least {MIN_REJECTION_REASON_CHARS} characters",
            )));
        }
        require_status(&request, &[RequestStatus::InProgress], OP)?;
        require_estimate_status(&request, &estimate, EstimateStatus::Accepted, OP)?;
        if estimate.rejected_by_artisan_id.is_some() {
            return Err(DomainError::InvalidState { operation: OP, current: request.status });
        }

        let now = Utc::now();
        estimate.status = EstimateStatus::Rejected;
        estimate.artisan_rejection_reason = Some(reason);
        estimate.rejected_by_artisan_id = Some(artisan.id.clone());
        estimate.rejected_at = Some(now);
        estimate.touch();
        request.transition_to(RequestStatus::AwaitingEstimateRevision, now)?;

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            action: Some(action_record(&request, artisan, ActionType::EstimateRejection)),
            notification: notification(&request, artisan.role),
            request,
            estimate: EstimateChange::Update(estimate),
            refusal: None,
        })
    }

    pub fn create_revised_estimate(
        &self,
        mut request: ServiceRequest,
        previous: &BillingEstimate,
        admin: &Actor,
        draft: EstimateDraft,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "create a revised estimate";
        require_role(admin, ActorRole::Admin, OP)?;
        validate_draft(&draft)?;
        require_estimate_of(&request, previous)?;
        require_status(&request, &[RequestStatus::AwaitingEstimateRevision], OP)?;

        let estimate = new_estimate(&request, admin, &draft, previous.revision_number + 1);
        request.transition_to(RequestStatus::AwaitingDualAcceptance, Utc::now())?;

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            notification: notification(&request, admin.role),
            request,
            estimate: EstimateChange::Insert(estimate),
            action: None,
            refusal: None,
        })
    }

    /// One party's response to a revised estimate. The merge of the two
    /// independent flags decides the branch; the order the parties respond
    /// in determines the outcome exactly as the flags encode it.
    pub fn respond_to_revision(
        &self,
        mut request: ServiceRequest,
        mut estimate: BillingEstimate,
        actor: &Actor,
        decision: EstimateDecision,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "respond to the revised estimate";
        let party = require_participant(&request, actor, OP)?;
        require_estimate_of(&request, &estimate)?;

        let now = Utc::now();
        if estimate.is_expired_at(now) {
            return Err(DomainError::EstimateExpired {
                estimate_id: estimate.id.clone(),
                valid_until: estimate.valid_until,
            });
        }
        require_status(&request, &[RequestStatus::AwaitingDualAcceptance], OP)?;
        require_estimate_status(&request, &estimate, EstimateStatus::Pending, OP)?;
        if !estimate.is_revision() {
            return Err(DomainError::InvalidState { operation: OP, current: request.status });
        }

        let already_responded = match party {
            Party::Client => estimate.client_accepted.is_some(),
            Party::Artisan => estimate.artisan_accepted.is_some(),
        };
        if already_responded {
            return Err(DomainError::InvalidState { operation: OP, current: request.status });
        }

        match party {
            Party::Client => {
                estimate.client_accepted = Some(decision.is_accept());
                estimate.client_response_date = Some(now);
            }
            Party::Artisan => {
                estimate.artisan_accepted = Some(decision.is_accept());
                estimate.artisan_response_date = Some(now);
            }
        }
        estimate.touch();

        let action_type = if decision.is_accept() {
            ActionType::EstimateAcceptance
        } else {
            ActionType::EstimateRefusal
        };
        let merged = revision_outcome(estimate.client_accepted, estimate.artisan_accepted);
        let mut refusal = None;
        let history = match merged {
            Some(RevisionOutcome::BothAccepted) => {
                estimate.status = EstimateStatus::Accepted;
                request.estimated_price = Some(estimate.estimated_price);
                request.transition_to(RequestStatus::InProgress, now)?;
                true
            }
            Some(RevisionOutcome::AwaitingOther) => false,
            Some(RevisionOutcome::RefusedAfterAcceptance) => {
                estimate.status = EstimateStatus::Rejected;
                if party == Party::Artisan {
                    refusal = Some(ArtisanRefusal {
                        artisan_id: actor.id.clone(),
                        request_id: request.id.clone(),
                        recorded_at: now,
                    });
                }
                request.assigned_artisan_id = None;
                request.transition_to(RequestStatus::AwaitingAssignation, now)?;
                true
            }
            Some(RevisionOutcome::Refused) => {
                estimate.status = EstimateStatus::Rejected;
                request.transition_to(RequestStatus::Cancelled, now)?;
                true
            }
            // Unreachable: this party's flag was just set.
            None => false,
        };

        Ok(TransitionOutcome {
            history: history.then(|| history_entry(&request)),
            action: Some(action_record(&request, actor, action_type)),
            notification: notification(&request, actor.role),
            request,
            estimate: EstimateChange::Update(estimate),
            refusal,
        })
    }

    /// `has_refused` is the store's answer to "did this artisan already
    /// refuse this request"; a refused request is never re-offered.
    pub fn accept_assignment(
        &self,
        mut request: ServiceRequest,
        artisan: &Actor,
        has_refused: bool,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "accept the assignment";
        require_role(artisan, ActorRole::Professional, OP)?;
        if has_refused {
            return Err(DomainError::Authorization {
                actor_id: artisan.id.clone(),
                role: artisan.role,
                operation: "accept an assignment they previously refused",
            });
        }
        require_status(&request, &[RequestStatus::AwaitingAssignation], OP)?;
        if request.assigned_artisan_id.is_some() {
            return Err(DomainError::InvalidState { operation: OP, current: request.status });
        }

        request.assigned_artisan_id = Some(artisan.id.clone());
        request.transition_to(RequestStatus::InProgress, Utc::now())?;

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            action: Some(action_record(&request, artisan, ActionType::AssignmentAcceptance)),
            notification: notification(&request, artisan.role),
            request,
            estimate: EstimateChange::Unchanged,
            refusal: None,
        })
    }

    /// Declining leaves the request seeking; only the refusal bookkeeping
    /// changes.
    pub fn decline_assignment(
        &self,
        request: ServiceRequest,
        artisan: &Actor,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "decline the assignment";
        require_role(artisan, ActorRole::Professional, OP)?;
        require_status(&request, &[RequestStatus::AwaitingAssignation], OP)?;

        let now = Utc::now();
        Ok(TransitionOutcome {
            action: Some(action_record(&request, artisan, ActionType::AssignmentRefusal)),
            refusal: Some(ArtisanRefusal {
                artisan_id: artisan.id.clone(),
                request_id: request.id.clone(),
                recorded_at: now,
            }),
            notification: notification(&request, artisan.role),
            request,
            estimate: EstimateChange::Unchanged,
            history: None,
        })
    }

    /// Idempotent confirmation that work has begun; records intent without
    /// moving the status.
    pub fn start_mission(
        &self,
        request: ServiceRequest,
        artisan: &Actor,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "start the mission";
        require_assigned(&request, artisan, OP)?;
        require_status(&request, &[RequestStatus::InProgress], OP)?;

        Ok(TransitionOutcome {
            action: Some(action_record(&request, artisan, ActionType::MissionStart)),
            notification: notification(&request, artisan.role),
            request,
            estimate: EstimateChange::Unchanged,
            history: None,
            refusal: None,
        })
    }

    /// Dual validation: either party confirms completion independently; the
    /// second confirmation merges into `Completed`.
    pub fn validate(
        &self,
        mut request: ServiceRequest,
        actor: &Actor,
        notes: ValidationNotes,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "validate the work";
        let party = require_participant(&request, actor, OP)?;
        require_status(
            &request,
            &[
                RequestStatus::InProgress,
                RequestStatus::ClientValidated,
                RequestStatus::ArtisanValidated,
                RequestStatus::Resolved,
            ],
            OP,
        )?;

        let next = match party {
            // Re-validating one's own validation is rejected so a duplicate
            // call can never trigger a second completion merge.
            Party::Client if request.status == RequestStatus::ClientValidated => {
                return Err(DomainError::InvalidState { operation: OP, current: request.status });
            }
            Party::Artisan if request.status == RequestStatus::ArtisanValidated => {
                return Err(DomainError::InvalidState { operation: OP, current: request.status });
            }
            Party::Client if request.status == RequestStatus::ArtisanValidated => {
                RequestStatus::Completed
            }
            Party::Artisan if request.status == RequestStatus::ClientValidated => {
                RequestStatus::Completed
            }
            Party::Client => RequestStatus::ClientValidated,
            Party::Artisan => RequestStatus::ArtisanValidated,
        };
        request.transition_to(next, Utc::now())?;

        let attachments = if notes.photo_refs.is_empty() {
            None
        } else {
            Some(serde_json::json!(notes.photo_refs).to_string())
        };
        let mut action = action_record(&request, actor, ActionType::Validation);
        action.completion_notes = notes.notes;
        action.attachments_json = attachments;

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            action: Some(action),
            notification: notification(&request, actor.role),
            request,
            estimate: EstimateChange::Unchanged,
            refusal: None,
        })
    }

    pub fn raise_dispute(
        &self,
        mut request: ServiceRequest,
        actor: &Actor,
        grounds: DisputeGrounds,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "raise a dispute";
        let party = require_participant(&request, actor, OP)?;
        if grounds.details.trim().is_empty() {
            return Err(DomainError::Validation("dispute details must not be empty".to_string()));
        }
        if request.status.is_terminal() {
            return Err(DomainError::InvalidState { operation: OP, current: request.status });
        }

        let next = match (party, request.status) {
            (Party::Client, RequestStatus::DisputedByArtisan) => RequestStatus::DisputedByBoth,
            (Party::Artisan, RequestStatus::DisputedByClient) => RequestStatus::DisputedByBoth,
            (Party::Client, RequestStatus::DisputedByClient)
            | (Party::Artisan, RequestStatus::DisputedByArtisan)
            | (_, RequestStatus::DisputedByBoth) => {
                return Err(DomainError::InvalidState { operation: OP, current: request.status });
            }
            (Party::Client, _) => RequestStatus::DisputedByClient,
            (Party::Artisan, _) => RequestStatus::DisputedByArtisan,
        };
        request.transition_to(next, Utc::now())?;

        let mut action = action_record(&request, actor, ActionType::Dispute);
        action.dispute_reason = Some(grounds.reason);
        action.dispute_details = Some(grounds.details);

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            action: Some(action),
            notification: notification(&request, actor.role),
            request,
            estimate: EstimateChange::Unchanged,
            refusal: None,
        })
    }

    /// Resolution does not pick a winner; it returns the request to a state
    /// from which validation or further admin action can proceed.
    pub fn resolve_dispute(
        &self,
        mut request: ServiceRequest,
        admin: &Actor,
        resolution_notes: Option<String>,
    ) -> Result<TransitionOutcome, DomainError> {
        const OP: &str = "resolve the dispute";
        require_role(admin, ActorRole::Admin, OP)?;
        if !request.status.is_disputed() {
            return Err(DomainError::InvalidState { operation: OP, current: request.status });
        }

        request.transition_to(RequestStatus::Resolved, Utc::now())?;

        let mut action = action_record(&request, admin, ActionType::DisputeResolution);
        action.completion_notes = resolution_notes;

        Ok(TransitionOutcome {
            history: Some(history_entry(&request)),
            action: Some(action),
            notification: notification(&request, admin.role),
            request,
            estimate: EstimateChange::Unchanged,
            refusal: None,
        })
    }

    /// Lazy expiry write: invoked by the store layer when an operation
    /// observes a pending estimate past its validity window.
    pub fn expire_estimate(&self, mut estimate: BillingEstimate) -> BillingEstimate {
        estimate.status = EstimateStatus::Expired;
        estimate.touch();
        estimate
    }
}

fn validate_draft(draft: &EstimateDraft) -> Result<(), DomainError> {
    if draft.price <= rust_decimal::Decimal::ZERO {
        return Err(DomainError::Validation("estimate price must be positive".to_string()));
    }
    if draft.description.trim().is_empty() {
        return Err(DomainError::Validation("estimate description must not be empty".to_string()));
    }
    if draft.valid_until <= Utc::now() {
        return Err(DomainError::Validation("estimate validity must end in the future".to_string()));
    }
    Ok(())
}

fn new_estimate(
    request: &ServiceRequest,
    admin: &Actor,
    draft: &EstimateDraft,
    revision_number: u32,
) -> BillingEstimate {
    BillingEstimate {
        id: EstimateId(Uuid::new_v4().to_string()),
        request_id: request.id.clone(),
        author_id: admin.id.clone(),
        estimated_price: draft.price,
        description: draft.description.clone(),
        valid_until: draft.valid_until,
        status: EstimateStatus::Pending,
        revision_number,
        client_accepted: None,
        artisan_accepted: None,
        client_response_date: None,
        artisan_response_date: None,
        client_response: None,
        artisan_rejection_reason: None,
        rejected_by_artisan_id: None,
        rejected_at: None,
        state_version: 1,
        created_at: Utc::now(),
    }
}

fn history_entry(request: &ServiceRequest) -> StatusHistoryEntry {
    StatusHistoryEntry {
        id: HistoryEntryId(Uuid::new_v4().to_string()),
        request_id: request.id.clone(),
        status: request.status,
        recorded_at: request.updated_at,
    }
}

fn action_record(request: &ServiceRequest, actor: &Actor, action: ActionType) -> ActionRecord {
    ActionRecord {
        id: ActionRecordId(Uuid::new_v4().to_string()),
        request_id: request.id.clone(),
        actor_id: actor.id.clone(),
        actor_role: actor.role,
        action,
        resulting_status: request.status,
        dispute_reason: None,
        dispute_details: None,
        completion_notes: None,
        attachments_json: None,
        recorded_at: Utc::now(),
    }
}

fn notification(request: &ServiceRequest, actor_role: ActorRole) -> StatusNotification {
    StatusNotification { request_id: request.id.clone(), status: request.status, actor_role }
}

fn require_role(actor: &Actor, role: ActorRole, operation: &'static str) -> Result<(), DomainError> {
    if actor.role == role {
        return Ok(());
    }
    Err(DomainError::Authorization { actor_id: actor.id.clone(), role: actor.role, operation })
}

fn require_owner(
    request: &ServiceRequest,
    actor: &Actor,
    operation: &'static str,
) -> Result<(), DomainError> {
    if actor.role == ActorRole::Client && request.client_id == actor.id {
        return Ok(());
    }
    Err(DomainError::Authorization { actor_id: actor.id.clone(), role: actor.role, operation })
}

fn require_assigned(
    request: &ServiceRequest,
    actor: &Actor,
    operation: &'static str,
) -> Result<(), DomainError> {
    if actor.role == ActorRole::Professional
        && request.assigned_artisan_id.as_ref() == Some(&actor.id)
    {
        return Ok(());
    }
    Err(DomainError::Authorization { actor_id: actor.id.clone(), role: actor.role, operation })
}

fn require_participant(
    request: &ServiceRequest,
    actor: &Actor,
    operation: &'static str,
) -> Result<Party, DomainError> {
    match actor.role {
        ActorRole::Client if request.client_id == actor.id => Ok(Party::Client),
        ActorRole::Professional if request.assigned_artisan_id.as_ref() == Some(&actor.id) => {
            Ok(Party::Artisan)
        }
        _ => Err(DomainError::Authorization {
            actor_id: actor.id.clone(),
            role: actor.role,
            operation,
        }),
    }
}

fn require_status(
    request: &ServiceRequest,
    accepted: &[RequestStatus],
    operation: &'static str,
) -> Result<(), DomainError> {
    if accepted.contains(&request.status) {
        return Ok(());
    }
    Err(DomainError::InvalidState { operation, current: request.status })
}

fn require_estimate_of(
    request: &ServiceRequest,
    estimate: &BillingEstimate,
) -> Result<(), DomainError> {
    if estimate.request_id == request.id {
        return Ok(());
    }
    Err(DomainError::Validation(format!(
        "estimate `{}` does not belong to request `{}`",
        estimate.id.0, request.id.0,
    )))
}

fn require_estimate_status(
    request: &ServiceRequest,
    estimate: &BillingEstimate,
    expected: EstimateStatus,
    operation: &'static str,
) -> Result<(), DomainError> {
    if estimate.status == expected {
        return Ok(());
    }
    Err(DomainError::InvalidState { operation, current: request.status })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::actor::{Actor, ActorRole};
    use crate::domain::audit::{ActionType, DisputeReason};
    use crate::domain::estimate::{BillingEstimate, EstimateStatus};
    use crate::domain::request::{RequestId, RequestStatus, ServiceRequest};
    use crate::errors::DomainError;
    use crate::lifecycle::commands::{
        DisputeGrounds, EstimateDecision, EstimateDraft, ValidationNotes,
    };

    use super::{EstimateChange, LifecycleEngine, MIN_REJECTION_REASON_CHARS};

    fn client() -> Actor {
        Actor::new("client-1", ActorRole::Client)
    }

    fn artisan() -> Actor {
        Actor::new("artisan-1", ActorRole::Professional)
    }

    fn admin() -> Actor {
        Actor::new("admin-1", ActorRole::Admin)
    }

    fn request_in(status: RequestStatus) -> ServiceRequest {
        let now = Utc::now();
        ServiceRequest {
            id: RequestId("req-1".to_string()),
            client_id: client().id,
            assigned_artisan_id: None,
            status,
            estimated_price: None,
            state_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn assigned_request_in(status: RequestStatus) -> ServiceRequest {
        let mut request = request_in(status);
        request.assigned_artisan_id = Some(artisan().id);
        request
    }

    fn draft() -> EstimateDraft {
        EstimateDraft {
            price: Decimal::new(25_000, 2),
            description: "Replace the kitchen sink trap and re-seal the counter".to_string(),
            valid_until: Utc::now() + Duration::days(14),
        }
    }

    fn estimate_for(request: &ServiceRequest, revision_number: u32) -> BillingEstimate {
        let mut estimate = super::new_estimate(request, &admin(), &draft(), revision_number);
        if revision_number > 1 {
            estimate.id = crate::domain::estimate::EstimateId(format!("est-rev{revision_number}"));
        }
        estimate
    }

    fn accepted_estimate_for(request: &ServiceRequest) -> BillingEstimate {
        let mut estimate = estimate_for(request, 1);
        estimate.status = EstimateStatus::Accepted;
        estimate.client_accepted = Some(true);
        estimate.client_response_date = Some(Utc::now());
        estimate
    }

    #[test]
    fn create_request_enters_payment_or_estimate_state() {
        let engine = LifecycleEngine::new();

        let gated = engine.create_request(&client(), true).expect("create gated");
        assert_eq!(gated.request.status, RequestStatus::AwaitingPayment);

        let direct = engine.create_request(&client(), false).expect("create direct");
        assert_eq!(direct.request.status, RequestStatus::AwaitingEstimate);
        assert_eq!(direct.history.as_ref().map(|entry| entry.status), Some(direct.request.status));
    }

    #[test]
    fn down_payment_unlocks_estimation() {
        let engine = LifecycleEngine::new();
        let outcome = engine
            .record_down_payment(request_in(RequestStatus::AwaitingPayment), &admin())
            .expect("payment captured");

        assert_eq!(outcome.request.status, RequestStatus::AwaitingEstimate);
        assert!(outcome.history.is_some());
    }

    #[test]
    fn initial_estimate_moves_request_to_acceptation() {
        let engine = LifecycleEngine::new();
        let outcome = engine
            .create_initial_estimate(request_in(RequestStatus::AwaitingEstimate), &admin(), draft())
            .expect("create estimate");

        assert_eq!(outcome.request.status, RequestStatus::AwaitingEstimateAcceptation);
        let estimate = match &outcome.estimate {
            EstimateChange::Insert(estimate) => estimate,
            other => panic!("expected inserted estimate, got {other:?}"),
        };
        assert_eq!(estimate.revision_number, 1);
        assert_eq!(estimate.status, EstimateStatus::Pending);
    }

    #[test]
    fn initial_estimate_requires_admin() {
        let engine = LifecycleEngine::new();
        let error = engine
            .create_initial_estimate(request_in(RequestStatus::AwaitingEstimate), &client(), draft())
            .expect_err("client cannot price");
        assert!(matches!(error, DomainError::Authorization { .. }));
    }

    // Scenario A: client accepts the original estimate.
    #[test]
    fn client_acceptance_moves_request_to_assignation() {
        let engine = LifecycleEngine::new();
        let request = request_in(RequestStatus::AwaitingEstimateAcceptation);
        let estimate = estimate_for(&request, 1);

        let outcome = engine
            .respond_to_estimate(request, estimate, &client(), EstimateDecision::Accept, None)
            .expect("accept");

        assert_eq!(outcome.request.status, RequestStatus::AwaitingAssignation);
        assert_eq!(outcome.request.estimated_price, Some(Decimal::new(25_000, 2)));
        let estimate = outcome.estimate.as_estimate().expect("updated estimate");
        assert_eq!(estimate.status, EstimateStatus::Accepted);
        assert_eq!(estimate.client_accepted, Some(true));
        assert_eq!(
            outcome.action.as_ref().map(|action| action.action),
            Some(ActionType::EstimateAcceptance)
        );
    }

    #[test]
    fn client_rejection_cancels_the_request() {
        let engine = LifecycleEngine::new();
        let request = request_in(RequestStatus::AwaitingEstimateAcceptation);
        let estimate = estimate_for(&request, 1);

        let outcome = engine
            .respond_to_estimate(
                request,
                estimate,
                &client(),
                EstimateDecision::Refuse,
                Some("Too expensive for the described work".to_string()),
            )
            .expect("reject");

        assert_eq!(outcome.request.status, RequestStatus::Cancelled);
        assert_eq!(outcome.estimate.as_estimate().map(|e| e.status), Some(EstimateStatus::Rejected));
    }

    #[test]
    fn expired_estimate_is_rejected_on_access() {
        let engine = LifecycleEngine::new();
        let request = request_in(RequestStatus::AwaitingEstimateAcceptation);
        let mut estimate = estimate_for(&request, 1);
        estimate.valid_until = Utc::now() - Duration::days(1);

        let error = engine
            .respond_to_estimate(request, estimate, &client(), EstimateDecision::Accept, None)
            .expect_err("expired estimate must not be acceptable");
        assert!(matches!(error, DomainError::EstimateExpired { .. }));
    }

    // Scenario B: artisan rejects the accepted estimate with a substantive
    // reason.
    #[test]
    fn artisan_rejection_reopens_pricing() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::InProgress);
        let estimate = accepted_estimate_for(&request);
        let reason = "The corroded pipework behind the wall needs full replacement first".to_string();
        assert!(reason.chars().count() >= MIN_REJECTION_REASON_CHARS);

        let outcome = engine
            .artisan_reject_estimate(request, estimate, &artisan(), reason)
            .expect("reject accepted estimate");

        assert_eq!(outcome.request.status, RequestStatus::AwaitingEstimateRevision);
        let estimate = outcome.estimate.as_estimate().expect("updated estimate");
        assert_eq!(estimate.status, EstimateStatus::Rejected);
        assert_eq!(estimate.rejected_by_artisan_id, Some(artisan().id));
        assert!(estimate.rejected_at.is_some());
    }

    // Scenario F: a 30-character reason is rejected with no state change.
    #[test]
    fn short_rejection_reason_fails_validation() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::InProgress);
        let estimate = accepted_estimate_for(&request);
        let reason = "x".repeat(30);

        let error = engine
            .artisan_reject_estimate(request, estimate, &artisan(), reason)
            .expect_err("short reason must fail");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    // Scenario C: revision accepted by both parties, client first.
    #[test]
    fn dual_acceptance_resumes_the_mission() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::AwaitingEstimateRevision);
        let previous = accepted_estimate_for(&request);

        let revised = engine
            .create_revised_estimate(request, &previous, &admin(), draft())
            .expect("revise");
        assert_eq!(revised.request.status, RequestStatus::AwaitingDualAcceptance);
        let estimate = match revised.estimate {
            EstimateChange::Insert(estimate) => estimate,
            other => panic!("expected inserted revision, got {other:?}"),
        };
        assert_eq!(estimate.revision_number, 2);

        let after_client = engine
            .respond_to_revision(revised.request, estimate, &client(), EstimateDecision::Accept)
            .expect("client accepts");
        assert_eq!(after_client.request.status, RequestStatus::AwaitingDualAcceptance);
        assert!(after_client.history.is_none(), "single accept is informational only");

        let estimate = match after_client.estimate {
            EstimateChange::Update(estimate) => estimate,
            other => panic!("expected updated revision, got {other:?}"),
        };
        let after_artisan = engine
            .respond_to_revision(after_client.request, estimate, &artisan(), EstimateDecision::Accept)
            .expect("artisan accepts");

        assert_eq!(after_artisan.request.status, RequestStatus::InProgress);
        let estimate = after_artisan.estimate.as_estimate().expect("accepted revision");
        assert_eq!(estimate.status, EstimateStatus::Accepted);
        assert_eq!(estimate.client_accepted, Some(true));
        assert_eq!(estimate.artisan_accepted, Some(true));
    }

    // Both-accept is commutative: artisan first yields the same end state.
    #[test]
    fn dual_acceptance_is_order_independent() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::AwaitingDualAcceptance);
        let estimate = estimate_for(&request, 2);

        let after_artisan = engine
            .respond_to_revision(request, estimate, &artisan(), EstimateDecision::Accept)
            .expect("artisan accepts first");
        assert_eq!(after_artisan.request.status, RequestStatus::AwaitingDualAcceptance);

        let estimate = match after_artisan.estimate {
            EstimateChange::Update(estimate) => estimate,
            other => panic!("expected updated revision, got {other:?}"),
        };
        let after_client = engine
            .respond_to_revision(after_artisan.request, estimate, &client(), EstimateDecision::Accept)
            .expect("client accepts second");

        assert_eq!(after_client.request.status, RequestStatus::InProgress);
    }

    // Scenario D: artisan refuses after the client accepted.
    #[test]
    fn artisan_refusal_after_client_acceptance_reseeks_assignment() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::AwaitingDualAcceptance);
        let mut estimate = estimate_for(&request, 2);
        estimate.client_accepted = Some(true);
        estimate.client_response_date = Some(Utc::now());

        let outcome = engine
            .respond_to_revision(request, estimate, &artisan(), EstimateDecision::Refuse)
            .expect("artisan refuses");

        assert_eq!(outcome.request.status, RequestStatus::AwaitingAssignation);
        assert_eq!(outcome.request.assigned_artisan_id, None);
        let refusal = outcome.refusal.expect("refusal recorded");
        assert_eq!(refusal.artisan_id, artisan().id);
        assert_eq!(outcome.estimate.as_estimate().map(|e| e.status), Some(EstimateStatus::Rejected));
    }

    #[test]
    fn refusal_before_other_party_responds_cancels() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::AwaitingDualAcceptance);
        let estimate = estimate_for(&request, 2);

        let outcome = engine
            .respond_to_revision(request, estimate, &client(), EstimateDecision::Refuse)
            .expect("client refuses first");

        assert_eq!(outcome.request.status, RequestStatus::Cancelled);
        assert!(outcome.refusal.is_none(), "only artisan refusals feed the matcher");
    }

    #[test]
    fn double_response_to_revision_is_rejected() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::AwaitingDualAcceptance);
        let mut estimate = estimate_for(&request, 2);
        estimate.client_accepted = Some(true);
        estimate.client_response_date = Some(Utc::now());

        let error = engine
            .respond_to_revision(request, estimate, &client(), EstimateDecision::Accept)
            .expect_err("second client response must fail");
        assert!(matches!(error, DomainError::InvalidState { .. }));
    }

    #[test]
    fn assignment_acceptance_starts_the_mission() {
        let engine = LifecycleEngine::new();
        let outcome = engine
            .accept_assignment(request_in(RequestStatus::AwaitingAssignation), &artisan(), false)
            .expect("accept assignment");

        assert_eq!(outcome.request.status, RequestStatus::InProgress);
        assert_eq!(outcome.request.assigned_artisan_id, Some(artisan().id));
    }

    #[test]
    fn previously_refusing_artisan_cannot_take_the_request() {
        let engine = LifecycleEngine::new();
        let error = engine
            .accept_assignment(request_in(RequestStatus::AwaitingAssignation), &artisan(), true)
            .expect_err("refused artisan must not accept");
        assert!(matches!(error, DomainError::Authorization { .. }));
    }

    #[test]
    fn declining_keeps_the_request_seeking() {
        let engine = LifecycleEngine::new();
        let outcome = engine
            .decline_assignment(request_in(RequestStatus::AwaitingAssignation), &artisan())
            .expect("decline");

        assert_eq!(outcome.request.status, RequestStatus::AwaitingAssignation);
        assert!(outcome.history.is_none());
        assert!(outcome.refusal.is_some());
    }

    #[test]
    fn start_mission_is_idempotent_confirmation() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::InProgress);

        let first = engine.start_mission(request, &artisan()).expect("first start");
        assert_eq!(first.request.status, RequestStatus::InProgress);
        assert!(first.history.is_none());

        let second = engine.start_mission(first.request, &artisan()).expect("second start");
        assert_eq!(second.request.status, RequestStatus::InProgress);
    }

    // Scenario E: artisan validates, then client validates.
    #[test]
    fn dual_validation_merges_into_completed() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::InProgress);

        let after_artisan = engine
            .validate(request, &artisan(), ValidationNotes::default())
            .expect("artisan validates");
        assert_eq!(after_artisan.request.status, RequestStatus::ArtisanValidated);

        let after_client = engine
            .validate(
                after_artisan.request,
                &client(),
                ValidationNotes {
                    notes: Some("Everything works, thanks".to_string()),
                    photo_refs: vec!["photos/after-1.jpg".to_string()],
                },
            )
            .expect("client validates");

        assert_eq!(after_client.request.status, RequestStatus::Completed);
        let action = after_client.action.expect("validation action");
        assert_eq!(action.action, ActionType::Validation);
        assert_eq!(action.completion_notes.as_deref(), Some("Everything works, thanks"));
        assert!(action.attachments_json.unwrap().contains("photos/after-1.jpg"));
    }

    #[test]
    fn validate_is_idempotent_per_actor() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::InProgress);

        let once = engine
            .validate(request, &client(), ValidationNotes::default())
            .expect("first validation");
        assert_eq!(once.request.status, RequestStatus::ClientValidated);

        let error = engine
            .validate(once.request, &client(), ValidationNotes::default())
            .expect_err("second validation by the same actor must fail");
        assert!(matches!(error, DomainError::InvalidState { .. }));
    }

    #[test]
    fn validation_can_resume_after_resolution() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::Resolved);

        let outcome = engine
            .validate(request, &artisan(), ValidationNotes::default())
            .expect("post-resolution validation");
        assert_eq!(outcome.request.status, RequestStatus::ArtisanValidated);
    }

    fn grounds() -> DisputeGrounds {
        DisputeGrounds {
            reason: DisputeReason::QualityBelowAgreement,
            details: "The tiling is uneven across the whole bathroom floor".to_string(),
        }
    }

    #[test]
    fn first_dispute_marks_the_raising_party() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::InProgress);

        let outcome = engine.raise_dispute(request, &client(), grounds()).expect("dispute");
        assert_eq!(outcome.request.status, RequestStatus::DisputedByClient);
        let action = outcome.action.expect("dispute action");
        assert_eq!(action.dispute_reason, Some(DisputeReason::QualityBelowAgreement));
        assert!(action.dispute_details.is_some());
    }

    #[test]
    fn counter_dispute_escalates_to_both() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::DisputedByClient);

        let outcome = engine.raise_dispute(request, &artisan(), grounds()).expect("counter");
        assert_eq!(outcome.request.status, RequestStatus::DisputedByBoth);
    }

    #[test]
    fn same_party_cannot_dispute_twice() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::DisputedByClient);

        let error = engine
            .raise_dispute(request, &client(), grounds())
            .expect_err("duplicate dispute must fail");
        assert!(matches!(error, DomainError::InvalidState { .. }));
    }

    #[test]
    fn empty_dispute_details_fail_validation() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::InProgress);

        let error = engine
            .raise_dispute(
                request,
                &client(),
                DisputeGrounds { reason: DisputeReason::Other, details: "   ".to_string() },
            )
            .expect_err("empty details must fail");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn admin_resolution_returns_request_to_resolved() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::DisputedByBoth);

        let outcome = engine
            .resolve_dispute(request, &admin(), Some("Split the difference on the invoice".into()))
            .expect("resolve");
        assert_eq!(outcome.request.status, RequestStatus::Resolved);
        assert_eq!(
            outcome.action.as_ref().map(|action| action.action),
            Some(ActionType::DisputeResolution)
        );
    }

    #[test]
    fn terminal_states_reject_every_operation() {
        let engine = LifecycleEngine::new();

        for terminal in [RequestStatus::Completed, RequestStatus::Cancelled] {
            let request = assigned_request_in(terminal);
            let error = engine
                .validate(request.clone(), &client(), ValidationNotes::default())
                .expect_err("terminal state must reject validation");
            assert!(matches!(error, DomainError::InvalidState { .. }));

            let error = engine
                .raise_dispute(request, &client(), grounds())
                .expect_err("terminal state must reject disputes");
            assert!(matches!(error, DomainError::InvalidState { .. }));
        }

        // Resolved admits validation but never a new dispute.
        let error = engine
            .raise_dispute(assigned_request_in(RequestStatus::Resolved), &client(), grounds())
            .expect_err("resolved must reject new disputes");
        assert!(matches!(error, DomainError::InvalidState { .. }));
    }

    #[test]
    fn outsiders_are_rejected_before_state_is_touched() {
        let engine = LifecycleEngine::new();
        let request = assigned_request_in(RequestStatus::InProgress);
        let stranger = Actor::new("artisan-other", ActorRole::Professional);

        let error = engine
            .validate(request.clone(), &stranger, ValidationNotes::default())
            .expect_err("unassigned artisan must not validate");
        assert!(matches!(error, DomainError::Authorization { .. }));

        let other_client = Actor::new("client-other", ActorRole::Client);
        let error = engine
            .raise_dispute(request, &other_client, grounds())
            .expect_err("non-owner must not dispute");
        assert!(matches!(error, DomainError::Authorization { .. }));
    }

    #[test]
    fn version_is_bumped_exactly_once_per_transition() {
        let engine = LifecycleEngine::new();
        let request = request_in(RequestStatus::AwaitingAssignation);
        assert_eq!(request.state_version, 1);

        let outcome = engine.accept_assignment(request, &artisan(), false).expect("accept");
        assert_eq!(outcome.request.state_version, 2);
    }

    #[test]
    fn expire_estimate_marks_and_versions_the_row() {
        let engine = LifecycleEngine::new();
        let request = request_in(RequestStatus::AwaitingEstimateAcceptation);
        let estimate = estimate_for(&request, 1);
        let version = estimate.state_version;

        let expired = engine.expire_estimate(estimate);
        assert_eq!(expired.status, EstimateStatus::Expired);
        assert_eq!(expired.state_version, version + 1);
    }

    #[test]
    fn estimate_of_another_request_is_refused() {
        let engine = LifecycleEngine::new();
        let request = request_in(RequestStatus::AwaitingEstimateAcceptation);
        let mut estimate = estimate_for(&request, 1);
        estimate.request_id = RequestId("req-other".to_string());

        let error = engine
            .respond_to_estimate(request, estimate, &client(), EstimateDecision::Accept, None)
            .expect_err("foreign estimate must fail");
        assert!(matches!(error, DomainError::Validation(_)));
    }
}
