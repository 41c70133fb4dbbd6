use serde::Deserialize;

/// Contents of the optional YAML configuration file.
/// Every section may be omitted; environment variables take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub http: HttpFileConfig,

    pub postgres: PostgresFileConfig,

    /// Nameservers used for the diagnostic DNS lookup.
    /// When empty the system resolver configuration is used.
    pub dns_hosts: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// The PostgreSQL server to probe.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresFileConfig {
    pub host: Option<String>,
    pub database: Option<String>,

    /// The managed identity's principal name as known to the server.
    pub user: Option<String>,

    pub port: u16,

    pub timeouts: TimeoutsFileConfig,
}

impl Default for PostgresFileConfig {
    fn default() -> Self {
        Self {
            host: None,
            database: None,
            user: None,
            port: default_postgres_port(),
            timeouts: TimeoutsFileConfig::default(),
        }
    }
}

/// Stage budgets in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsFileConfig {
    pub token_ms: u64,
    pub connect_ms: u64,
    pub query_ms: u64,
}

impl Default for TimeoutsFileConfig {
    fn default() -> Self {
        Self {
            token_ms: 30_000,
            connect_ms: 30_000,
            query_ms: 15_000,
        }
    }
}

fn default_postgres_port() -> u16 {
    5432
}
