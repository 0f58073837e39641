use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use mendy_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentCheck {
    pub component: &'static str,
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checks: Vec<ComponentCheck>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Liveness endpoint on its own port so load balancers keep probing even
/// when the API listener is saturated.
pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = vec![ComponentCheck {
        component: "runtime",
        status: "ok",
        detail: "mendy-server runtime initialized".to_string(),
    }];
    checks.push(database_check(&state.db_pool).await);

    let ready = checks.iter().all(|check| check.status == "ok");
    let payload = HealthResponse {
        status: if ready { "ok" } else { "degraded" },
        checks,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> ComponentCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => ComponentCheck {
            component: "database",
            status: "ok",
            detail: "probe query succeeded".to_string(),
        },
        Err(error) => ComponentCheck {
            component: "database",
            status: "degraded",
            detail: format!("probe query failed: {error}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use mendy_db::connect_with_settings;

    use super::{health, HealthState};

    #[tokio::test]
    async fn health_reports_ok_when_database_answers() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ok");
        assert!(payload.checks.iter().all(|check| check.status == "ok"));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_degrades_when_database_is_unreachable() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        let database = payload
            .checks
            .iter()
            .find(|check| check.component == "database")
            .expect("database check present");
        assert_eq!(database.status, "degraded");
    }
}
