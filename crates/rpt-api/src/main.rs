//! Binary entrypoint for the RPT API server.
use rpt_api::{run, ServiceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Config path comes from RPT_CONFIG; RPT_ADDR and RPT_APP_PATH override it
    let config = ServiceConfig::load()?;
    run(config).await
}
