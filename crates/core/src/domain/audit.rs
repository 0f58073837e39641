use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{ActorId, ActorRole};
use crate::domain::request::{RequestId, RequestStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRecordId(pub String);

/// Immutable timeline row: one per status transition, never updated or
/// deleted. The request's `status` column is a cached projection of the most
/// recent entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: HistoryEntryId,
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    EstimateAcceptance,
    EstimateRefusal,
    EstimateRejection,
    AssignmentAcceptance,
    AssignmentRefusal,
    MissionStart,
    Validation,
    Dispute,
    DisputeResolution,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EstimateAcceptance => "estimate_acceptance",
            Self::EstimateRefusal => "estimate_refusal",
            Self::EstimateRejection => "estimate_rejection",
            Self::AssignmentAcceptance => "assignment_acceptance",
            Self::AssignmentRefusal => "assignment_refusal",
            Self::MissionStart => "mission_start",
            Self::Validation => "validation",
            Self::Dispute => "dispute",
            Self::DisputeResolution => "dispute_resolution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "estimate_acceptance" => Some(Self::EstimateAcceptance),
            "estimate_refusal" => Some(Self::EstimateRefusal),
            "estimate_rejection" => Some(Self::EstimateRejection),
            "assignment_acceptance" => Some(Self::AssignmentAcceptance),
            "assignment_refusal" => Some(Self::AssignmentRefusal),
            "mission_start" => Some(Self::MissionStart),
            "validation" => Some(Self::Validation),
            "dispute" => Some(Self::Dispute),
            "dispute_resolution" => Some(Self::DisputeResolution),
            _ => None,
        }
    }
}

/// Closed enumeration of grounds a party may dispute on. Free-form context
/// goes in `dispute_details`, never here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    WorkNotCompleted,
    QualityBelowAgreement,
    PriceDisagreement,
    ArtisanNoShow,
    ClientUnreachable,
    DamageCaused,
    Other,
}

impl DisputeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkNotCompleted => "work_not_completed",
            Self::QualityBelowAgreement => "quality_below_agreement",
            Self::PriceDisagreement => "price_disagreement",
            Self::ArtisanNoShow => "artisan_no_show",
            Self::ClientUnreachable => "client_unreachable",
            Self::DamageCaused => "damage_caused",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "work_not_completed" => Some(Self::WorkNotCompleted),
            "quality_below_agreement" => Some(Self::QualityBelowAgreement),
            "price_disagreement" => Some(Self::PriceDisagreement),
            "artisan_no_show" => Some(Self::ArtisanNoShow),
            "client_unreachable" => Some(Self::ClientUnreachable),
            "damage_caused" => Some(Self::DamageCaused),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Immutable actor-intent row consumed by admin review and dispute
/// adjudication. `attachments_json` carries photo references as an opaque
/// JSON blob; the core never interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ActionRecordId,
    pub request_id: RequestId,
    pub actor_id: ActorId,
    pub actor_role: ActorRole,
    pub action: ActionType,
    pub resulting_status: RequestStatus,
    pub dispute_reason: Option<DisputeReason>,
    pub dispute_details: Option<String>,
    pub completion_notes: Option<String>,
    pub attachments_json: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only pairing consulted by the assignment matcher so a request is
/// never re-offered to an artisan who already declined it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtisanRefusal {
    pub artisan_id: ActorId,
    pub request_id: RequestId,
    pub recorded_at: DateTime<Utc>,
}
