//! Deterministic demo dataset: one request per interesting lifecycle stage,
//! with fixed ids and timestamps so seeding is repeatable and smoke checks
//! can assert against it.

use mendy_core::chrono::{DateTime, Duration, Utc};
use mendy_core::rust_decimal::Decimal;

use mendy_core::domain::actor::ActorId;
use mendy_core::domain::audit::{HistoryEntryId, StatusHistoryEntry};
use mendy_core::domain::estimate::{BillingEstimate, EstimateId, EstimateStatus};
use mendy_core::domain::request::{RequestId, RequestStatus, ServiceRequest};

use crate::repositories::{
    AuditLogRepository, RepositoryError, RequestStore, SqlAuditLogRepository, SqlRequestStore,
};
use crate::DbPool;

pub const SEED_CLIENT_ID: &str = "seed-client-1";
pub const SEED_ARTISAN_ID: &str = "seed-artisan-1";
pub const SEED_ADMIN_ID: &str = "seed-admin-1";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub requests: usize,
    pub estimates: usize,
    pub history_entries: usize,
    pub already_seeded: bool,
}

fn seed_epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn request(
    id: &str,
    status: RequestStatus,
    assigned: bool,
    price: Option<Decimal>,
    version: u32,
) -> ServiceRequest {
    let epoch = seed_epoch();
    ServiceRequest {
        id: RequestId(id.to_string()),
        client_id: ActorId(SEED_CLIENT_ID.to_string()),
        assigned_artisan_id: assigned.then(|| ActorId(SEED_ARTISAN_ID.to_string())),
        status,
        estimated_price: price,
        state_version: version,
        created_at: epoch,
        updated_at: epoch + Duration::hours(version as i64),
    }
}

fn estimate(
    id: &str,
    request_id: &str,
    status: EstimateStatus,
    revision_number: u32,
) -> BillingEstimate {
    let epoch = seed_epoch();
    BillingEstimate {
        id: EstimateId(id.to_string()),
        request_id: RequestId(request_id.to_string()),
        author_id: ActorId(SEED_ADMIN_ID.to_string()),
        estimated_price: Decimal::new(48_500, 2),
        description: "Replace the bathroom mixer tap and check the supply lines".to_string(),
        valid_until: epoch + Duration::days(30),
        status,
        revision_number,
        client_accepted: matches!(status, EstimateStatus::Accepted).then_some(true),
        artisan_accepted: None,
        client_response_date: matches!(status, EstimateStatus::Accepted)
            .then(|| epoch + Duration::hours(2)),
        artisan_response_date: None,
        client_response: None,
        artisan_rejection_reason: None,
        rejected_by_artisan_id: None,
        rejected_at: None,
        state_version: 1,
        created_at: epoch + Duration::hours(1),
    }
}

/// Seeds the demo dataset, skipping entirely when it is already present.
pub async fn seed_demo_data(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let store = SqlRequestStore::new(pool.clone());
    let audit = SqlAuditLogRepository::new(pool.clone());

    let anchor = RequestId("seed-req-intake".to_string());
    if store.find_request(&anchor).await?.is_some() {
        return Ok(SeedResult { already_seeded: true, ..SeedResult::default() });
    }

    let requests = [
        request("seed-req-intake", RequestStatus::AwaitingEstimate, false, None, 1),
        request("seed-req-negotiating", RequestStatus::AwaitingEstimateAcceptation, false, None, 2),
        request(
            "seed-req-working",
            RequestStatus::InProgress,
            true,
            Some(Decimal::new(48_500, 2)),
            4,
        ),
        request(
            "seed-req-disputed",
            RequestStatus::DisputedByClient,
            true,
            Some(Decimal::new(48_500, 2)),
            5,
        ),
    ];
    let estimates = [
        estimate("seed-est-pending", "seed-req-negotiating", EstimateStatus::Pending, 1),
        estimate("seed-est-accepted", "seed-req-working", EstimateStatus::Accepted, 1),
        estimate("seed-est-disputed", "seed-req-disputed", EstimateStatus::Accepted, 1),
    ];

    let mut result = SeedResult::default();
    for request in &requests {
        store.insert_request(request).await?;
        result.requests += 1;
    }
    for estimate in &estimates {
        store.commit_transition(None, None, Some(estimate)).await?;
        result.estimates += 1;
    }

    // A plausible timeline for the in-progress request.
    let epoch = seed_epoch();
    let trail = [
        (RequestStatus::AwaitingEstimate, 0),
        (RequestStatus::AwaitingEstimateAcceptation, 1),
        (RequestStatus::AwaitingAssignation, 2),
        (RequestStatus::InProgress, 3),
    ];
    for (index, (status, hour)) in trail.into_iter().enumerate() {
        audit
            .append_history(&StatusHistoryEntry {
                id: HistoryEntryId(format!("seed-hist-working-{index}")),
                request_id: RequestId("seed-req-working".to_string()),
                status,
                recorded_at: epoch + Duration::hours(hour),
            })
            .await?;
        result.history_entries += 1;
    }

    Ok(result)
}
