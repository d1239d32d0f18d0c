use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use railsql_db::{DbPool, Warehouse};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    warehouse: Warehouse,
}

impl HealthState {
    pub fn new(db_pool: DbPool, warehouse: Warehouse) -> Self {
        Self { db_pool, warehouse }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub warehouse: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let warehouse = warehouse_check(&state.warehouse).await;
    let ready = database.status == "ready" && warehouse.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "railsql-server runtime initialized".to_string(),
        },
        database,
        warehouse,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn warehouse_check(warehouse: &Warehouse) -> HealthCheck {
    match warehouse.ping().await {
        Ok(()) => HealthCheck {
            status: "ready",
            detail: format!("{} warehouse reachable", warehouse.kind_name()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("warehouse ping failed: {error}") }
        }
    }
}
