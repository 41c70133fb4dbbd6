//! HTTP surface of the diagnostic service.
//!
//! Serves the health check and the PostgreSQL probe route, and shuts down
//! gracefully on SIGTERM/SIGINT.

mod response;
mod routes;
mod shutdown;

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::sync::Arc;

pub use routes::create_router;
pub use shutdown::shutdown_signal;

use crate::config::HttpConfig;
use crate::pg_probe::{PgProbe, ProbeRequest};

/// Shared state for handlers. Holds no mutable data, so concurrent probe
/// runs cannot observe each other.
#[derive(Clone)]
pub struct AppState {
    pub probe: PgProbe,
    pub request: Arc<ProbeRequest>,
}

impl AppState {
    pub fn new(probe: PgProbe, request: ProbeRequest) -> Self {
        Self {
            probe,
            request: Arc::new(request),
        }
    }
}

/// Socket address for `HOST`/`PORT`. Accepts IPv6 hosts such as `::`.
pub fn listen_addr(http: &HttpConfig) -> Result<SocketAddr, AddrParseError> {
    let ip: IpAddr = http.host.parse()?;
    Ok(SocketAddr::from((ip, http.port)))
}

/// Binds the listener and serves until a shutdown signal has drained all
/// connections.
pub async fn start_server(
    http: &HttpConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listen_addr(http)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Managed Identity Test API listening on http://{}", addr);
    tracing::info!("Health check: http://localhost:{}/healthcheck", http.port);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server closed");
    Ok(())
}
