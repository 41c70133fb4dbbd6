pub mod app_config;
pub mod probe_config;

pub use app_config::{
    AppConfig, ConfigError, DEFAULT_LOG_FILTER, HttpConfig, IdentitySettings, load_config,
    setup_resolver, setup_tls_connector,
};
