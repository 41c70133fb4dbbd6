use std::time::Duration;

use async_trait::async_trait;
use postgres_native_tls::MakeTlsConnector;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;

use super::report;
use super::result::ServerInfo;

pub const DIAGNOSTIC_QUERY: &str =
    "SELECT version(), current_user, current_database(), inet_server_addr()::text";

const APPLICATION_NAME: &str = "identity-probe";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to open one authenticated session.
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub statement_timeout: Duration,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password_len", &self.password.len())
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    /// SQLSTATE, when the server answered with an error.
    pub code: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }
}

impl From<tokio_postgres::Error> for DriverError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self {
            message: report(&err),
            code: err.code().map(|state| state.code().to_string()),
        }
    }
}

/// Opens database sessions.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DatabaseSession>, DriverError>;
}

/// One open session, owned by a single probe run.
#[async_trait]
pub trait DatabaseSession: Send {
    async fn server_info(&mut self) -> Result<ServerInfo, DriverError>;

    /// Ends the session. Consumes it so it cannot be closed twice.
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// PostgreSQL over TLS without certificate validation; the private network
/// path is what is trusted here.
#[derive(Clone)]
pub struct PgConnector {
    tls: MakeTlsConnector,
}

impl PgConnector {
    pub fn new(tls: native_tls::TlsConnector) -> Self {
        Self {
            tls: MakeTlsConnector::new(tls),
        }
    }
}

#[async_trait]
impl DatabaseConnector for PgConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&params.host)
            .port(params.port)
            .dbname(&params.database)
            .user(&params.user)
            .password(&params.password)
            .application_name(APPLICATION_NAME)
            .ssl_mode(SslMode::Require)
            .keepalives(true)
            .options(&format!(
                "-c statement_timeout={}",
                params.statement_timeout.as_millis()
            ));

        let (client, connection) = config.connect(self.tls.clone()).await?;

        let driver = tokio::spawn(async move {
            let result = connection.await;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "PostgreSQL connection ended with error");
            }
            result
        });

        Ok(Box::new(PgSession { client, driver }))
    }
}

struct PgSession {
    client: tokio_postgres::Client,
    driver: JoinHandle<Result<(), tokio_postgres::Error>>,
}

#[async_trait]
impl DatabaseSession for PgSession {
    async fn server_info(&mut self) -> Result<ServerInfo, DriverError> {
        let row = self.client.query_one(DIAGNOSTIC_QUERY, &[]).await?;
        Ok(ServerInfo {
            version: row.try_get(0)?,
            current_user: row.try_get(1)?,
            current_database: row.try_get(2)?,
            server_address: row.try_get(3)?,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        let PgSession { client, mut driver } = *self;
        // Dropping the client sends Terminate and lets the driver task finish.
        drop(client);

        match tokio::time::timeout(CLOSE_TIMEOUT, &mut driver).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e.into()),
            Ok(Err(join)) => Err(DriverError::new(format!("connection task failed: {join}"))),
            Err(_) => {
                driver.abort();
                Err(DriverError::new(format!(
                    "connection did not close within {}s",
                    CLOSE_TIMEOUT.as_secs()
                )))
            }
        }
    }
}
