use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Lifecycle status of a service request.
///
/// `Completed`, `Cancelled` and `Resolved` are terminal. `Resolved` is a
/// special case: no new dispute may be raised from it, but either party may
/// still validate the work, which re-enters the validation states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    AwaitingPayment,
    AwaitingEstimate,
    AwaitingEstimateAcceptation,
    AwaitingEstimateRevision,
    AwaitingDualAcceptance,
    AwaitingAssignation,
    InProgress,
    ClientValidated,
    ArtisanValidated,
    Completed,
    DisputedByClient,
    DisputedByArtisan,
    DisputedByBoth,
    Resolved,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingPayment => "awaiting_payment",
            Self::AwaitingEstimate => "awaiting_estimate",
            Self::AwaitingEstimateAcceptation => "awaiting_estimate_acceptation",
            Self::AwaitingEstimateRevision => "awaiting_estimate_revision",
            Self::AwaitingDualAcceptance => "awaiting_dual_acceptance",
            Self::AwaitingAssignation => "awaiting_assignation",
            Self::InProgress => "in_progress",
            Self::ClientValidated => "client_validated",
            Self::ArtisanValidated => "artisan_validated",
            Self::Completed => "completed",
            Self::DisputedByClient => "disputed_by_client",
            Self::DisputedByArtisan => "disputed_by_artisan",
            Self::DisputedByBoth => "disputed_by_both",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "awaiting_payment" => Some(Self::AwaitingPayment),
            "awaiting_estimate" => Some(Self::AwaitingEstimate),
            "awaiting_estimate_acceptation" => Some(Self::AwaitingEstimateAcceptation),
            "awaiting_estimate_revision" => Some(Self::AwaitingEstimateRevision),
            "awaiting_dual_acceptance" => Some(Self::AwaitingDualAcceptance),
            "awaiting_assignation" => Some(Self::AwaitingAssignation),
            "in_progress" => Some(Self::InProgress),
            "client_validated" => Some(Self::ClientValidated),
            "artisan_validated" => Some(Self::ArtisanValidated),
            "completed" => Some(Self::Completed),
            "disputed_by_client" => Some(Self::DisputedByClient),
            "disputed_by_artisan" => Some(Self::DisputedByArtisan),
            "disputed_by_both" => Some(Self::DisputedByBoth),
            "resolved" => Some(Self::Resolved),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Resolved)
    }

    pub fn is_disputed(&self) -> bool {
        matches!(self, Self::DisputedByClient | Self::DisputedByArtisan | Self::DisputedByBoth)
    }
}

/// The aggregate root of the lifecycle core.
///
/// `state_version` is the optimistic-concurrency token: every mutation bumps
/// it, and persistence rejects a write whose expected version no longer
/// matches the stored row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub client_id: ActorId,
    pub assigned_artisan_id: Option<ActorId>,
    pub status: RequestStatus,
    pub estimated_price: Option<Decimal>,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// The complete set of legal status edges. Every transition the engine
    /// performs goes through [`ServiceRequest::transition_to`], so no call
    /// site can write an edge outside this table.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::{
            ArtisanValidated, AwaitingAssignation, AwaitingDualAcceptance, AwaitingEstimate,
            AwaitingEstimateAcceptation, AwaitingEstimateRevision, AwaitingPayment, Cancelled,
            ClientValidated, Completed, DisputedByArtisan, DisputedByBoth, DisputedByClient,
            InProgress, Resolved,
        };

        let fixed_edge = matches!(
            (&self.status, next),
            (AwaitingPayment, AwaitingEstimate)
                | (AwaitingEstimate, AwaitingEstimateAcceptation)
                | (AwaitingEstimateAcceptation, AwaitingAssignation)
                | (AwaitingEstimateAcceptation, Cancelled)
                | (AwaitingAssignation, InProgress)
                | (InProgress, AwaitingEstimateRevision)
                | (AwaitingEstimateRevision, AwaitingDualAcceptance)
                | (AwaitingDualAcceptance, InProgress)
                | (AwaitingDualAcceptance, AwaitingAssignation)
                | (AwaitingDualAcceptance, Cancelled)
                | (InProgress, ClientValidated)
                | (InProgress, ArtisanValidated)
                | (ClientValidated, Completed)
                | (ArtisanValidated, Completed)
                | (Resolved, ClientValidated)
                | (Resolved, ArtisanValidated)
                | (DisputedByClient, DisputedByBoth)
                | (DisputedByArtisan, DisputedByBoth)
                | (DisputedByClient, Resolved)
                | (DisputedByArtisan, Resolved)
                | (DisputedByBoth, Resolved)
        );

        // A fresh dispute may open from any non-terminal, not-yet-disputed
        // state. Resolved is terminal for dispute purposes.
        let dispute_entry = matches!(next, DisputedByClient | DisputedByArtisan)
            && !self.status.is_terminal()
            && !self.status.is_disputed();

        fixed_edge || dispute_entry
    }

    pub fn transition_to(
        &mut self,
        next: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidTransition { from: self.status, to: next });
        }

        self.status = next;
        self.state_version += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Marks a non-status mutation (assignment, cached price) so the
    /// optimistic version check still covers it.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.state_version += 1;
        self.updated_at = now;
    }
}
