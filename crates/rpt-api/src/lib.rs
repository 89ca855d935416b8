//! RPT API /v1: REST endpoints
//!
//! | Route | |
//! |---|---|
//! | `GET /v1/health` | status and version |
//! | `GET /v1/reports` | configured reports |
//! | `GET /v1/reports/{name}/parameters` | declared parameters |
//! | `POST /v1/reports/{name}/export` | runs a report, returns the artifact |
//! | `POST /v1/workflows/{code}/execute` | runs a workflow |
//! | `GET /action/{guid}` | redeems an action token |
//! | `GET /metrics` | prometheus exposition |

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};

pub use config::ServiceConfig;
pub use error::ApiError;
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/reports", get(handlers::list_reports))
        .route("/v1/reports/{name}/parameters", get(handlers::report_parameters))
        .route("/v1/reports/{name}/export", post(handlers::export_report))
        .route("/v1/workflows/{code}/execute", post(handlers::execute_workflow))
        .route("/action/{guid}", get(handlers::redeem_action))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::cors())
        .layer(middleware::trace())
}

pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;

    tracing::info!("RPT API listening on {}", config.listen);
    axum::serve(listener, app).await?;
    Ok(())
}
