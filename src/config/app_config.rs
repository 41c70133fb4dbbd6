use std::env;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts},
};

use super::probe_config::FileConfig;
use crate::pg_probe::{ProbeRequest, ProbeTimeouts};

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";
pub const DEFAULT_LOG_FILTER: &str = "identity_probe=info,tower_http=info";
const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in config file")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

/// Managed identity endpoint settings injected by the hosting platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySettings {
    pub endpoint: Option<String>,
    pub header: Option<String>,
    /// Client id of a user-assigned identity.
    pub client_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub postgres: ProbeRequest,
    pub dns_hosts: Vec<String>,
    pub identity: IdentitySettings,
}

/// Load the application configuration from `.env`, a YAML file and environment variables.
/// The file location comes from `CONFIG_FILE` and may be absent; environment
/// variables override whatever the file says.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "Failed to load .env file");
        }
    }

    let config_file_location =
        env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let file = read_file_config(Path::new(&config_file_location))?;

    AppConfig::from_sources(file, |name| env::var(name).ok())
}

/// Reads and parses the YAML file. A missing file yields the defaults.
pub fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No config file found, using environment only");
        return Ok(FileConfig::default());
    }

    let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_yaml::from_str(&config_str)?)
}

impl AppConfig {
    /// Merges file values with variables looked up through `env`.
    /// Blank variables count as unset.
    pub fn from_sources<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => file.http.port.unwrap_or(DEFAULT_HTTP_PORT),
        };
        let http = HttpConfig {
            host: var("HOST")
                .or(file.http.host)
                .unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string()),
            port,
        };

        let pg = file.postgres;
        let postgres = ProbeRequest {
            host: var("POSTGRES_HOST").or(pg.host),
            database: var("POSTGRES_DB").or(pg.database),
            user: var("POSTGRES_USERNAME")
                .or_else(|| var("APP_SERVICE_BACKEND_NAME"))
                .or(pg.user)
                .or_else(|| var("WEBSITE_SITE_NAME")),
            port: pg.port,
            timeouts: ProbeTimeouts {
                token: budget("postgres.timeouts.token_ms", pg.timeouts.token_ms)?,
                connect: budget("postgres.timeouts.connect_ms", pg.timeouts.connect_ms)?,
                query: budget("postgres.timeouts.query_ms", pg.timeouts.query_ms)?,
            },
        };

        let dns_hosts = match var("DNS_HOSTS") {
            Some(hosts) => hosts
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => file.dns_hosts,
        };

        let identity = IdentitySettings {
            endpoint: var("IDENTITY_ENDPOINT"),
            header: var("IDENTITY_HEADER"),
            client_id: var("AZURE_CLIENT_ID"),
        };

        Ok(AppConfig {
            http,
            postgres,
            dns_hosts,
            identity,
        })
    }
}

/// A stage budget of zero would fail every run and disable `statement_timeout`.
fn budget(name: &'static str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: ms.to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

/// Setup a TLS connector that accepts invalid certificates and host names
pub fn setup_tls_connector() -> Result<native_tls::TlsConnector, native_tls::Error> {
    let mut builder = native_tls::TlsConnector::builder();
    builder.danger_accept_invalid_certs(true);
    builder.danger_accept_invalid_hostnames(true);
    builder.build()
}

/// Setup a DNS resolver for the diagnostic lookup.
/// With explicit DNS hosts the resolver queries those over TCP with 2 attempts, a
/// 100 millisecond timeout and a cache of 1024 entries. Without any it follows the
/// system configuration, which is what resolves private DNS zones.
///
/// # Arguments
/// * `dns_hosts` - A slice of strings representing DNS host IPs (e.g., "168.63.129.16")
///
/// # Returns
/// A `Result` containing a `TokioAsyncResolver` if successful, or an error if the setup fails.
pub fn setup_resolver(
    dns_hosts: &[String],
) -> Result<TokioAsyncResolver, Box<dyn std::error::Error>> {
    if dns_hosts.is_empty() {
        return Ok(TokioAsyncResolver::tokio_from_system_conf()?);
    }

    let mut opts = ResolverOpts::default();
    opts.attempts = 2;
    opts.timeout = Duration::from_millis(100);
    opts.cache_size = 1024;

    let mut name_servers = NameServerConfigGroup::new();

    for host in dns_hosts {
        let ip: IpAddr = host.parse()?;
        name_servers.push(NameServerConfig {
            socket_addr: (ip, 53).into(),
            protocol: Protocol::Tcp,
            tls_dns_name: None,
            trust_negative_responses: false,
            bind_addr: None,
        });
    }

    let resolver_config = ResolverConfig::from_parts(None, vec![], name_servers);
    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}
