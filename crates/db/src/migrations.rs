use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, MIGRATOR};
    use crate::connect_with_settings;

    const BASELINE_TABLES: &[&str] = &[
        "service_request",
        "billing_estimate",
        "status_history",
        "action_record",
        "artisan_refusal",
    ];

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in BASELINE_TABLES {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|_| panic!("check {table} table"))
            .get::<i64, _>("count");

            assert_eq!(count, 1, "table `{table}` should exist after migration");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master
             WHERE type = 'table' AND name = 'service_request'",
        )
        .fetch_one(&pool)
        .await
        .expect("check service_request removed")
        .get::<i64, _>("count");

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn pending_estimate_uniqueness_is_enforced_by_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO service_request
                 (id, client_id, status, state_version, created_at, updated_at)
             VALUES ('req-1', 'client-1', 'awaiting_estimate', 1,
                     '2026-03-01T10:00:00Z', '2026-03-01T10:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert request");

        let insert_estimate = |id: &'static str| {
            let pool = pool.clone();
            async move {
                sqlx::query(
                    "INSERT INTO billing_estimate
                         (id, request_id, author_id, estimated_price, description,
                          valid_until, status, revision_number, state_version, created_at)
                     VALUES (?, 'req-1', 'admin-1', '250.00', 'baseline work',
                             '2026-04-01T10:00:00Z', 'pending', 1, 1, '2026-03-01T10:00:00Z')",
                )
                .bind(id)
                .execute(&pool)
                .await
            }
        };

        insert_estimate("est-1").await.expect("first pending estimate");
        let error = insert_estimate("est-2").await.expect_err("second pending must violate index");
        assert!(error.to_string().to_lowercase().contains("unique"));

        pool.close().await;
    }
}
