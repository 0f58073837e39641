use mendy_core::chrono::{DateTime, Utc};
use mendy_core::rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use mendy_core::domain::actor::ActorId;
use mendy_core::domain::estimate::{BillingEstimate, EstimateId, EstimateStatus};
use mendy_core::domain::request::{RequestId, RequestStatus, ServiceRequest};

use super::{RepositoryError, RequestStore};
use crate::DbPool;

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const REQUEST_COLUMNS: &str = "id,
    client_id,
    assigned_artisan_id,
    status,
    estimated_price,
    state_version,
    created_at,
    updated_at";

const ESTIMATE_COLUMNS: &str = "id,
    request_id,
    author_id,
    estimated_price,
    description,
    valid_until,
    status,
    revision_number,
    client_accepted,
    artisan_accepted,
    client_response_date,
    artisan_response_date,
    client_response,
    artisan_rejection_reason,
    rejected_by_artisan_id,
    rejected_at,
    state_version,
    created_at";

#[async_trait::async_trait]
impl RequestStore for SqlRequestStore {
    async fn find_request(
        &self,
        id: &RequestId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM service_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(request_from_row).transpose()
    }

    async fn find_estimate(
        &self,
        id: &EstimateId,
    ) -> Result<Option<BillingEstimate>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ESTIMATE_COLUMNS} FROM billing_estimate WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(estimate_from_row).transpose()
    }

    async fn find_pending_estimate(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<BillingEstimate>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ESTIMATE_COLUMNS} FROM billing_estimate
             WHERE request_id = ? AND status = 'pending'"
        ))
        .bind(&request_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(estimate_from_row).transpose()
    }

    async fn find_latest_estimate(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<BillingEstimate>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ESTIMATE_COLUMNS} FROM billing_estimate
             WHERE request_id = ?
             ORDER BY revision_number DESC
             LIMIT 1"
        ))
        .bind(&request_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(estimate_from_row).transpose()
    }

    async fn insert_request(&self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO service_request (
                id,
                client_id,
                assigned_artisan_id,
                status,
                estimated_price,
                state_version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.client_id.0)
        .bind(request.assigned_artisan_id.as_ref().map(|id| id.0.as_str()))
        .bind(request.status.as_str())
        .bind(request.estimated_price.map(|price| price.to_string()))
        .bind(i64::from(request.state_version))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn commit_transition(
        &self,
        request: Option<(&ServiceRequest, u32)>,
        estimate_update: Option<(&BillingEstimate, u32)>,
        estimate_insert: Option<&BillingEstimate>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some((request, expected_version)) = request {
            let result = sqlx::query(
                "UPDATE service_request SET
                    assigned_artisan_id = ?,
                    status = ?,
                    estimated_price = ?,
                    state_version = ?,
                    updated_at = ?
                 WHERE id = ? AND state_version = ?",
            )
            .bind(request.assigned_artisan_id.as_ref().map(|id| id.0.as_str()))
            .bind(request.status.as_str())
            .bind(request.estimated_price.map(|price| price.to_string()))
            .bind(i64::from(request.state_version))
            .bind(request.updated_at.to_rfc3339())
            .bind(&request.id.0)
            .bind(i64::from(expected_version))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(RepositoryError::VersionConflict(format!(
                    "service_request `{}` moved past version {expected_version}",
                    request.id.0,
                )));
            }
        }

        if let Some((estimate, expected_version)) = estimate_update {
            let result = sqlx::query(
                "UPDATE billing_estimate SET
                    status = ?,
                    client_accepted = ?,
                    artisan_accepted = ?,
                    client_response_date = ?,
                    artisan_response_date = ?,
                    client_response = ?,
                    artisan_rejection_reason = ?,
                    rejected_by_artisan_id = ?,
                    rejected_at = ?,
                    state_version = ?
                 WHERE id = ? AND state_version = ?",
            )
            .bind(estimate.status.as_str())
            .bind(estimate.client_accepted)
            .bind(estimate.artisan_accepted)
            .bind(estimate.client_response_date.map(|value| value.to_rfc3339()))
            .bind(estimate.artisan_response_date.map(|value| value.to_rfc3339()))
            .bind(estimate.client_response.as_deref())
            .bind(estimate.artisan_rejection_reason.as_deref())
            .bind(estimate.rejected_by_artisan_id.as_ref().map(|id| id.0.as_str()))
            .bind(estimate.rejected_at.map(|value| value.to_rfc3339()))
            .bind(i64::from(estimate.state_version))
            .bind(&estimate.id.0)
            .bind(i64::from(expected_version))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(RepositoryError::VersionConflict(format!(
                    "billing_estimate `{}` moved past version {expected_version}",
                    estimate.id.0,
                )));
            }
        }

        if let Some(estimate) = estimate_insert {
            sqlx::query(&format!(
                "INSERT INTO billing_estimate ({ESTIMATE_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&estimate.id.0)
            .bind(&estimate.request_id.0)
            .bind(&estimate.author_id.0)
            .bind(estimate.estimated_price.to_string())
            .bind(&estimate.description)
            .bind(estimate.valid_until.to_rfc3339())
            .bind(estimate.status.as_str())
            .bind(i64::from(estimate.revision_number))
            .bind(estimate.client_accepted)
            .bind(estimate.artisan_accepted)
            .bind(estimate.client_response_date.map(|value| value.to_rfc3339()))
            .bind(estimate.artisan_response_date.map(|value| value.to_rfc3339()))
            .bind(estimate.client_response.as_deref())
            .bind(estimate.artisan_rejection_reason.as_deref())
            .bind(estimate.rejected_by_artisan_id.as_ref().map(|id| id.0.as_str()))
            .bind(estimate.rejected_at.map(|value| value.to_rfc3339()))
            .bind(i64::from(estimate.state_version))
            .bind(estimate.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn request_from_row(row: SqliteRow) -> Result<ServiceRequest, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown service request status `{status_raw}`"))
    })?;

    Ok(ServiceRequest {
        id: RequestId(row.try_get("id")?),
        client_id: ActorId(row.try_get("client_id")?),
        assigned_artisan_id: row
            .try_get::<Option<String>, _>("assigned_artisan_id")?
            .map(ActorId),
        status,
        estimated_price: parse_optional_decimal(
            "estimated_price",
            row.try_get("estimated_price")?,
        )?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn estimate_from_row(row: SqliteRow) -> Result<BillingEstimate, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = EstimateStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown estimate status `{status_raw}`"))
    })?;

    Ok(BillingEstimate {
        id: EstimateId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        author_id: ActorId(row.try_get("author_id")?),
        estimated_price: parse_decimal("estimated_price", row.try_get("estimated_price")?)?,
        description: row.try_get("description")?,
        valid_until: parse_timestamp("valid_until", row.try_get("valid_until")?)?,
        status,
        revision_number: parse_u32("revision_number", row.try_get("revision_number")?)?,
        client_accepted: row.try_get("client_accepted")?,
        artisan_accepted: row.try_get("artisan_accepted")?,
        client_response_date: parse_optional_timestamp(
            "client_response_date",
            row.try_get("client_response_date")?,
        )?,
        artisan_response_date: parse_optional_timestamp(
            "artisan_response_date",
            row.try_get("artisan_response_date")?,
        )?,
        client_response: row.try_get("client_response")?,
        artisan_rejection_reason: row.try_get("artisan_rejection_reason")?,
        rejected_by_artisan_id: row
            .try_get::<Option<String>, _>("rejected_by_artisan_id")?
            .map(ActorId),
        rejected_at: parse_optional_timestamp("rejected_at", row.try_get("rejected_at")?)?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|decimal| parse_decimal(column, decimal)).transpose()
}
