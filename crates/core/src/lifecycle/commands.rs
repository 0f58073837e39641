use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::audit::DisputeReason;

/// Payload for creating an estimate, original or revised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateDraft {
    pub price: Decimal,
    pub description: String,
    pub valid_until: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateDecision {
    Accept,
    Refuse,
}

impl EstimateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Free-text notes and photo references attached to a validation; the
/// durable evidence dispute adjudication relies on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationNotes {
    pub notes: Option<String>,
    pub photo_refs: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeGrounds {
    pub reason: DisputeReason,
    pub details: String,
}
