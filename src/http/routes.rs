use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Redirect},
    routing::get,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthcheckBody {
    pub message: &'static str,
    pub endpoints: Vec<&'static str>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthcheck", get(healthcheck))
        .route("/test-pgsql", get(test_pgsql))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Redirect {
    Redirect::temporary("/healthcheck")
}

/// Liveness plus a listing of the diagnostic routes.
async fn healthcheck() -> Json<HealthcheckBody> {
    Json(HealthcheckBody {
        message: "Managed Identity Test API",
        endpoints: vec!["GET /test-pgsql - Test PostgreSQL access"],
    })
}

/// Runs one staged connectivity probe against the configured server.
async fn test_pgsql(State(state): State<AppState>) -> impl IntoResponse {
    tracing::info!("Starting PostgreSQL connection test");
    let outcome = state.probe.run(&state.request).await;
    tracing::info!(
        success = outcome.is_success(),
        attempted_stages = outcome.timings().attempted().count(),
        total_ms = outcome.total().as_millis() as u64,
        "PostgreSQL connection test finished"
    );
    outcome
}
