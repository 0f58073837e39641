use sqlx::{sqlite::SqliteRow, Row};

use mendy_core::domain::actor::{ActorId, ActorRole};
use mendy_core::domain::audit::{
    ActionRecord, ActionRecordId, ActionType, ArtisanRefusal, DisputeReason, HistoryEntryId,
    StatusHistoryEntry,
};
use mendy_core::domain::request::{RequestId, RequestStatus};

use super::store::parse_timestamp;
use super::{AuditLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditLogRepository {
    pool: DbPool,
}

impl SqlAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditLogRepository for SqlAuditLogRepository {
    async fn append_history(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO status_history (id, request_id, status, recorded_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.request_id.0)
        .bind(entry.status.as_str())
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_action(&self, action: &ActionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO action_record (
                id,
                request_id,
                actor_id,
                actor_role,
                action,
                resulting_status,
                dispute_reason,
                dispute_details,
                completion_notes,
                attachments_json,
                recorded_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&action.id.0)
        .bind(&action.request_id.0)
        .bind(&action.actor_id.0)
        .bind(action.actor_role.as_str())
        .bind(action.action.as_str())
        .bind(action.resulting_status.as_str())
        .bind(action.dispute_reason.map(|reason| reason.as_str()))
        .bind(action.dispute_details.as_deref())
        .bind(action.completion_notes.as_deref())
        .bind(action.attachments_json.as_deref())
        .bind(action.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_refusal(&self, refusal: &ArtisanRefusal) -> Result<(), RepositoryError> {
        // A second decline of the same request by the same artisan is a
        // no-op; the pairing is what matters.
        sqlx::query(
            "INSERT OR IGNORE INTO artisan_refusal (artisan_id, request_id, recorded_at)
             VALUES (?, ?, ?)",
        )
        .bind(&refusal.artisan_id.0)
        .bind(&refusal.request_id.0)
        .bind(refusal.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn history_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, status, recorded_at
             FROM status_history
             WHERE request_id = ?
             ORDER BY recorded_at ASC, id ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(history_from_row).collect()
    }

    async fn actions_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ActionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                request_id,
                actor_id,
                actor_role,
                action,
                resulting_status,
                dispute_reason,
                dispute_details,
                completion_notes,
                attachments_json,
                recorded_at
             FROM action_record
             WHERE request_id = ?
             ORDER BY recorded_at ASC, id ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(action_from_row).collect()
    }

    async fn has_passed_through(
        &self,
        request_id: &RequestId,
        status: RequestStatus,
    ) -> Result<bool, RepositoryError> {
        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM status_history
             WHERE request_id = ? AND status = ?",
        )
        .bind(&request_id.0)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?
        .try_get::<i64, _>("count")?;

        Ok(count > 0)
    }

    async fn has_refused(
        &self,
        artisan_id: &ActorId,
        request_id: &RequestId,
    ) -> Result<bool, RepositoryError> {
        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM artisan_refusal
             WHERE artisan_id = ? AND request_id = ?",
        )
        .bind(&artisan_id.0)
        .bind(&request_id.0)
        .fetch_one(&self.pool)
        .await?
        .try_get::<i64, _>("count")?;

        Ok(count > 0)
    }

    async fn refusals_for_artisan(
        &self,
        artisan_id: &ActorId,
    ) -> Result<Vec<ArtisanRefusal>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT artisan_id, request_id, recorded_at
             FROM artisan_refusal
             WHERE artisan_id = ?
             ORDER BY recorded_at ASC",
        )
        .bind(&artisan_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(refusal_from_row).collect()
    }
}

fn history_from_row(row: SqliteRow) -> Result<StatusHistoryEntry, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown status in history `{status_raw}`"))
    })?;

    Ok(StatusHistoryEntry {
        id: HistoryEntryId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        status,
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

fn action_from_row(row: SqliteRow) -> Result<ActionRecord, RepositoryError> {
    let role_raw = row.try_get::<String, _>("actor_role")?;
    let actor_role = ActorRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown actor role `{role_raw}`")))?;

    let action_raw = row.try_get::<String, _>("action")?;
    let action = ActionType::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action type `{action_raw}`")))?;

    let status_raw = row.try_get::<String, _>("resulting_status")?;
    let resulting_status = RequestStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown resulting status `{status_raw}`"))
    })?;

    let dispute_reason = row
        .try_get::<Option<String>, _>("dispute_reason")?
        .map(|raw| {
            DisputeReason::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown dispute reason `{raw}`")))
        })
        .transpose()?;

    Ok(ActionRecord {
        id: ActionRecordId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        actor_id: ActorId(row.try_get("actor_id")?),
        actor_role,
        action,
        resulting_status,
        dispute_reason,
        dispute_details: row.try_get("dispute_details")?,
        completion_notes: row.try_get("completion_notes")?,
        attachments_json: row.try_get("attachments_json")?,
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

fn refusal_from_row(row: SqliteRow) -> Result<ArtisanRefusal, RepositoryError> {
    Ok(ArtisanRefusal {
        artisan_id: ActorId(row.try_get("artisan_id")?),
        request_id: RequestId(row.try_get("request_id")?),
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use mendy_core::chrono::{DateTime, Utc};

    use mendy_core::domain::actor::{ActorId, ActorRole};
    use mendy_core::domain::audit::{
        ActionRecord, ActionRecordId, ActionType, ArtisanRefusal, DisputeReason, HistoryEntryId,
        StatusHistoryEntry,
    };
    use mendy_core::domain::request::{RequestId, RequestStatus};

    use super::SqlAuditLogRepository;
    use crate::migrations;
    use crate::repositories::AuditLogRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_request(pool: &DbPool, request_id: &RequestId) {
        sqlx::query(
            "INSERT INTO service_request
                 (id, client_id, status, state_version, created_at, updated_at)
             VALUES (?, 'client-1', 'awaiting_estimate', 1,
                     '2026-03-01T10:00:00Z', '2026-03-01T10:00:00Z')",
        )
        .bind(&request_id.0)
        .execute(pool)
        .await
        .expect("insert request");
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    #[tokio::test]
    async fn history_round_trips_and_answers_timeline_queries() {
        let pool = setup_pool().await;
        let request_id = RequestId("req-audit-1".to_string());
        insert_request(&pool, &request_id).await;

        let repo = SqlAuditLogRepository::new(pool.clone());
        let entries = [
            ("h-1", RequestStatus::AwaitingEstimate, "2026-03-01T10:00:00Z"),
            ("h-2", RequestStatus::AwaitingEstimateAcceptation, "2026-03-01T11:00:00Z"),
            ("h-3", RequestStatus::AwaitingAssignation, "2026-03-01T12:00:00Z"),
        ];
        for (id, status, at) in entries {
            repo.append_history(&StatusHistoryEntry {
                id: HistoryEntryId(id.to_string()),
                request_id: request_id.clone(),
                status,
                recorded_at: parse_ts(at),
            })
            .await
            .expect("append history");
        }

        let history = repo.history_for_request(&request_id).await.expect("list history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].status, RequestStatus::AwaitingEstimate);
        assert_eq!(history[2].status, RequestStatus::AwaitingAssignation);

        assert!(repo
            .has_passed_through(&request_id, RequestStatus::AwaitingEstimateAcceptation)
            .await
            .expect("passed-through query"));
        assert!(!repo
            .has_passed_through(&request_id, RequestStatus::InProgress)
            .await
            .expect("passed-through query"));

        pool.close().await;
    }

    #[tokio::test]
    async fn action_record_round_trips_with_dispute_fields() {
        let pool = setup_pool().await;
        let request_id = RequestId("req-audit-2".to_string());
        insert_request(&pool, &request_id).await;

        let repo = SqlAuditLogRepository::new(pool.clone());
        let action = ActionRecord {
            id: ActionRecordId("act-1".to_string()),
            request_id: request_id.clone(),
            actor_id: ActorId("client-1".to_string()),
            actor_role: ActorRole::Client,
            action: ActionType::Dispute,
            resulting_status: RequestStatus::DisputedByClient,
            dispute_reason: Some(DisputeReason::WorkNotCompleted),
            dispute_details: Some("Half the fence is still missing".to_string()),
            completion_notes: None,
            attachments_json: Some(r#"["photos/fence-1.jpg"]"#.to_string()),
            recorded_at: parse_ts("2026-03-02T09:30:00Z"),
        };

        repo.append_action(&action).await.expect("append action");

        let actions = repo.actions_for_request(&request_id).await.expect("list actions");
        assert_eq!(actions, vec![action]);

        pool.close().await;
    }

    #[tokio::test]
    async fn refusals_are_deduplicated_per_artisan_and_request() {
        let pool = setup_pool().await;
        let request_id = RequestId("req-audit-3".to_string());
        insert_request(&pool, &request_id).await;

        let repo = SqlAuditLogRepository::new(pool.clone());
        let artisan_id = ActorId("artisan-1".to_string());
        let refusal = ArtisanRefusal {
            artisan_id: artisan_id.clone(),
            request_id: request_id.clone(),
            recorded_at: parse_ts("2026-03-02T08:00:00Z"),
        };

        repo.append_refusal(&refusal).await.expect("first refusal");
        repo.append_refusal(&refusal).await.expect("duplicate refusal is a no-op");

        assert!(repo.has_refused(&artisan_id, &request_id).await.expect("has refused"));
        let refusals = repo.refusals_for_artisan(&artisan_id).await.expect("list refusals");
        assert_eq!(refusals.len(), 1);

        assert!(!repo
            .has_refused(&ActorId("artisan-2".to_string()), &request_id)
            .await
            .expect("other artisan not refused"));

        pool.close().await;
    }
}
