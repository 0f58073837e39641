use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EstimateId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl EstimateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Merge result of the dual-acceptance protocol, computed as a pure function
/// of both parties' independent flags. Neither party's code path ever
/// branches on the other party's code path; they only meet here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevisionOutcome {
    /// One party accepted, the other has not responded yet.
    AwaitingOther,
    /// Both parties accepted independently.
    BothAccepted,
    /// A party refused after the other had already accepted.
    RefusedAfterAcceptance,
    /// A party refused before the other responded, or both refused.
    Refused,
}

pub fn revision_outcome(
    client_accepted: Option<bool>,
    artisan_accepted: Option<bool>,
) -> Option<RevisionOutcome> {
    match (client_accepted, artisan_accepted) {
        (None, None) => None,
        (Some(true), Some(true)) => Some(RevisionOutcome::BothAccepted),
        (Some(false), Some(true)) | (Some(true), Some(false)) => {
            Some(RevisionOutcome::RefusedAfterAcceptance)
        }
        (Some(false), None) | (None, Some(false)) | (Some(false), Some(false)) => {
            Some(RevisionOutcome::Refused)
        }
        (Some(true), None) | (None, Some(true)) => Some(RevisionOutcome::AwaitingOther),
    }
}

/// A priced proposal ("devis") tied to one service request.
///
/// Revision 1 is accepted by the client alone; revisions above 1 require the
/// dual-acceptance protocol. At most one estimate per request is `pending`
/// at any time (also enforced by a partial unique index in storage).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillingEstimate {
    pub id: EstimateId,
    pub request_id: RequestId,
    pub author_id: ActorId,
    pub estimated_price: Decimal,
    pub description: String,
    pub valid_until: DateTime<Utc>,
    pub status: EstimateStatus,
    pub revision_number: u32,
    pub client_accepted: Option<bool>,
    pub artisan_accepted: Option<bool>,
    pub client_response_date: Option<DateTime<Utc>>,
    pub artisan_response_date: Option<DateTime<Utc>>,
    pub client_response: Option<String>,
    pub artisan_rejection_reason: Option<String>,
    pub rejected_by_artisan_id: Option<ActorId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
}

impl BillingEstimate {
    pub fn is_revision(&self) -> bool {
        self.revision_number > 1
    }

    /// Lazy expiry: a pending estimate whose validity window has passed is
    /// expired on access, never by a background sweep.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == EstimateStatus::Pending && self.valid_until < now
    }

    pub fn touch(&mut self) {
        self.state_version += 1;
    }
}
