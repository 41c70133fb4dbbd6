use std::sync::Arc;

use reqwest::Client;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identity_probe::config::{DEFAULT_LOG_FILTER, load_config, setup_resolver, setup_tls_connector};
use identity_probe::http::{AppState, start_server};
use identity_probe::identity::ManagedIdentityCredential;
use identity_probe::identity::managed::IdentitySource;
use identity_probe::pg_probe::{PgConnector, PgProbe};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;

    tracing::info!(
        host = config.postgres.host.as_deref().unwrap_or("not set"),
        database = config.postgres.database.as_deref().unwrap_or("not set"),
        user = config.postgres.user.as_deref().unwrap_or("not set"),
        port = config.postgres.port,
        "PostgreSQL probe target"
    );
    tracing::info!("Using DNS hosts: {:?}", config.dns_hosts);

    let http_client = Client::builder()
        .user_agent(concat!("identity-probe/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let source = IdentitySource::detect(
        config.identity.endpoint.clone(),
        config.identity.header.clone(),
    );
    tracing::info!(source = %source_kind(&source), "Managed identity endpoint selected");
    let credential =
        ManagedIdentityCredential::new(http_client, source, config.identity.client_id.clone());

    let resolver = setup_resolver(&config.dns_hosts)?;
    let connector = PgConnector::new(setup_tls_connector()?);

    let probe = PgProbe::new(Arc::new(credential), Arc::new(resolver), Arc::new(connector));
    let state = AppState::new(probe, config.postgres.clone());

    start_server(&config.http, state).await
}

fn source_kind(source: &IdentitySource) -> &'static str {
    match source {
        IdentitySource::AppService { .. } => "app-service",
        IdentitySource::Imds { .. } => "imds",
    }
}
