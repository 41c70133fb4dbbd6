use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::identity::{POSTGRES_TOKEN_SCOPE, TokenProvider};

use super::driver::{ConnectParams, DatabaseConnector, DatabaseSession};
use super::error::ProbeError;
use super::report;
use super::resolve::HostResolver;
use super::result::{ProbeFailure, ProbeOutcome, ProbeSuccess, ServerInfo, Stage, StageTimings};
use super::timeout::{TimeoutError, with_timeout};

pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Principal used when configuration names none.
pub const DEFAULT_USER: &str = "postgres";

/// Time budget of the three guarded stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub token: Duration,
    pub connect: Duration,
    /// Also applied to the session as `statement_timeout`.
    pub query: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            token: Duration::from_millis(30_000),
            connect: Duration::from_millis(30_000),
            query: Duration::from_millis(15_000),
        }
    }
}

/// Connection parameters for one run, as configured. Missing values are
/// reported by the validation stage rather than rejected up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub host: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub port: u16,
    pub timeouts: ProbeTimeouts,
}

struct Target {
    host: String,
    database: String,
    user: String,
}

struct Completed {
    target: Target,
    resolved_ip: String,
    server: ServerInfo,
}

/// Runs staged connectivity probes. Holds only shared, immutable
/// collaborators; every run opens and closes its own session.
#[derive(Clone)]
pub struct PgProbe {
    credential: Arc<dyn TokenProvider>,
    resolver: Arc<dyn HostResolver>,
    connector: Arc<dyn DatabaseConnector>,
}

impl PgProbe {
    pub fn new(
        credential: Arc<dyn TokenProvider>,
        resolver: Arc<dyn HostResolver>,
        connector: Arc<dyn DatabaseConnector>,
    ) -> Self {
        Self {
            credential,
            resolver,
            connector,
        }
    }

    /// Performs one probe run and always produces exactly one outcome. An
    /// opened session is closed before this returns.
    pub async fn run(&self, request: &ProbeRequest) -> ProbeOutcome {
        let started = Instant::now();
        let mut timings = StageTimings::new();
        let mut session: Option<Box<dyn DatabaseSession>> = None;

        let result = self.run_stages(request, &mut timings, &mut session).await;

        let close_error = match session.take() {
            Some(session) => match session.close().await {
                Ok(()) => {
                    tracing::debug!("Database connection closed");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error closing database connection");
                    Some(e.message)
                }
            },
            None => None,
        };
        let total = started.elapsed();

        match result {
            Ok(completed) => {
                tracing::info!(
                    host = %completed.target.host,
                    resolved_ip = %completed.resolved_ip,
                    total_ms = total.as_millis() as u64,
                    "PostgreSQL probe succeeded"
                );
                ProbeOutcome::Success(ProbeSuccess {
                    host: completed.target.host,
                    database: completed.target.database,
                    user: completed.target.user,
                    resolved_ip: completed.resolved_ip,
                    server: completed.server,
                    timings,
                    total,
                    close_error,
                })
            }
            Err(err) => {
                tracing::error!(
                    stage = %err.stage(),
                    error = %err,
                    timeout = err.is_timeout(),
                    failed_after_ms = total.as_millis() as u64,
                    "PostgreSQL probe failed"
                );
                ProbeOutcome::Failure(ProbeFailure {
                    stage: err.stage(),
                    code: err.code().map(str::to_string),
                    message: err.to_string(),
                    timings,
                    total,
                    close_error,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        request: &ProbeRequest,
        timings: &mut StageTimings,
        session: &mut Option<Box<dyn DatabaseSession>>,
    ) -> Result<Completed, ProbeError> {
        let stage_start = Instant::now();
        let target = validate(request)?;
        timings.record(Stage::EnvironmentValidation, stage_start.elapsed());
        tracing::info!(
            host = %target.host,
            database = %target.database,
            user = %target.user,
            "Environment validated"
        );

        let stage_start = Instant::now();
        let token = with_timeout(
            request.timeouts.token,
            self.credential.get_token(POSTGRES_TOKEN_SCOPE),
        )
        .await
        .map_err(|e| match e {
            TimeoutError::Elapsed(limit) => ProbeError::TokenTimeout(limit),
            TimeoutError::Inner(e) => ProbeError::TokenRejected(report(&e)),
        })?;
        let elapsed = stage_start.elapsed();
        timings.record(Stage::TokenAcquisition, elapsed);
        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            token_len = token.token.len(),
            "Token acquired"
        );
        if token.is_blank() {
            return Err(ProbeError::MissingToken);
        }

        let stage_start = Instant::now();
        let resolved_ip = match self.resolver.lookup(&target.host).await {
            Ok(ip) => ip.to_string(),
            Err(e) => {
                tracing::warn!(host = %target.host, error = %e, "DNS resolution failed, continuing");
                UNKNOWN_ADDRESS.to_string()
            }
        };
        let elapsed = stage_start.elapsed();
        timings.record(Stage::DnsResolution, elapsed);
        tracing::info!(
            host = %target.host,
            resolved_ip = %resolved_ip,
            elapsed_ms = elapsed.as_millis() as u64,
            "DNS resolution finished"
        );

        let params = ConnectParams {
            host: target.host.clone(),
            port: request.port,
            database: target.database.clone(),
            user: target.user.clone(),
            password: token.token,
            statement_timeout: request.timeouts.query,
        };
        let stage_start = Instant::now();
        let opened = with_timeout(request.timeouts.connect, self.connector.connect(&params))
            .await
            .map_err(|e| match e {
                TimeoutError::Elapsed(limit) => ProbeError::ConnectTimeout(limit),
                TimeoutError::Inner(e) => ProbeError::Connect {
                    message: e.message,
                    code: e.code,
                },
            })?;
        let elapsed = stage_start.elapsed();
        timings.record(Stage::Connection, elapsed);
        tracing::info!(
            host = %params.host,
            port = params.port,
            elapsed_ms = elapsed.as_millis() as u64,
            "Connected"
        );
        let active = session.insert(opened);

        let stage_start = Instant::now();
        let server = with_timeout(request.timeouts.query, active.server_info())
            .await
            .map_err(|e| match e {
                TimeoutError::Elapsed(limit) => ProbeError::QueryTimeout(limit),
                TimeoutError::Inner(e) => ProbeError::Query {
                    message: e.message,
                    code: e.code,
                },
            })?;
        let elapsed = stage_start.elapsed();
        timings.record(Stage::Query, elapsed);
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Diagnostic query completed");

        Ok(Completed {
            target,
            resolved_ip,
            server,
        })
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate(request: &ProbeRequest) -> Result<Target, ProbeError> {
    let host = present(&request.host);
    let database = present(&request.database);

    match (host, database) {
        (Some(host), Some(database)) => {
            let user = present(&request.user).unwrap_or_else(|| {
                tracing::warn!(user = DEFAULT_USER, "No database user configured, using default");
                DEFAULT_USER.to_string()
            });
            Ok(Target {
                host,
                database,
                user,
            })
        }
        (host, database) => Err(ProbeError::MissingParameters(format!(
            "POSTGRES_HOST={}, POSTGRES_DB={}",
            host.is_some(),
            database.is_some()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::pg_probe::testing::{
        ConnectBehavior, FakeConnector, FakeResolver, FakeTokens, QueryBehavior, healthy_request,
    };

    fn probe(tokens: FakeTokens, resolver: FakeResolver, connector: FakeConnector) -> PgProbe {
        PgProbe::new(Arc::new(tokens), Arc::new(resolver), Arc::new(connector))
    }

    fn expect_failure(outcome: ProbeOutcome) -> ProbeFailure {
        match outcome {
            ProbeOutcome::Failure(failure) => failure,
            ProbeOutcome::Success(success) => panic!("expected failure, got {success:?}"),
        }
    }

    fn expect_success(outcome: ProbeOutcome) -> ProbeSuccess {
        match outcome {
            ProbeOutcome::Success(success) => success,
            ProbeOutcome::Failure(failure) => panic!("expected success, got {failure:?}"),
        }
    }

    #[tokio::test]
    async fn test_healthy_run_succeeds() {
        let tokens = FakeTokens::issuing("token-abc");
        let connector = FakeConnector::healthy();
        let stats = connector.stats.clone();
        let probe = probe(tokens, FakeResolver::resolving("10.1.2.3"), connector);

        let success = expect_success(probe.run(&healthy_request()).await);

        assert_eq!(success.server.current_database, "appdb");
        assert_eq!(success.resolved_ip, "10.1.2.3");
        assert_eq!(success.host, "db.example.internal");
        for stage in Stage::ALL {
            assert!(success.timings.get(stage).is_some(), "{stage} not timed");
        }
        assert!(success.close_error.is_none());
        assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.last_password(), Some("token-abc".to_string()));
    }

    #[tokio::test]
    async fn test_missing_host_or_database_fails_validation() {
        for (host, database) in [
            (None, Some("appdb")),
            (Some("db.example.internal"), None),
            (Some("  "), Some("appdb")),
            (None, None),
        ] {
            let tokens = FakeTokens::issuing("token");
            let token_calls = tokens.calls.clone();
            let connector = FakeConnector::healthy();
            let stats = connector.stats.clone();
            let probe = probe(tokens, FakeResolver::resolving("10.1.2.3"), connector);

            let mut request = healthy_request();
            request.host = host.map(str::to_string);
            request.database = database.map(str::to_string);

            let failure = expect_failure(probe.run(&request).await);
            assert_eq!(failure.stage, Stage::EnvironmentValidation);
            assert!(failure.message.starts_with("Missing environment variables"));
            assert!(!failure.message.contains("POSTGRES_USERNAME"));
            assert_eq!(failure.timings.attempted().count(), 0);
            assert_eq!(token_calls.load(Ordering::SeqCst), 0);
            assert_eq!(stats.opened.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_missing_user_falls_back_to_default() {
        let tokens = FakeTokens::issuing("token");
        let token_calls = tokens.calls.clone();
        let probe = probe(tokens, FakeResolver::resolving("10.1.2.3"), FakeConnector::healthy());

        let mut request = healthy_request();
        request.user = None;

        let success = expect_success(probe.run(&request).await);
        assert_eq!(success.user, DEFAULT_USER);
        assert_eq!(success.server.current_database, "appdb");
        assert_eq!(token_calls.load(Ordering::SeqCst), 1);
        assert!(success.timings.get(Stage::TokenAcquisition).is_some());
    }

    #[tokio::test]
    async fn test_dns_failure_is_not_fatal() {
        let probe = probe(
            FakeTokens::issuing("token"),
            FakeResolver::failing(),
            FakeConnector::healthy(),
        );

        let success = expect_success(probe.run(&healthy_request()).await);
        assert_eq!(success.resolved_ip, UNKNOWN_ADDRESS);
        assert!(success.timings.get(Stage::DnsResolution).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_timeout_is_distinct_from_rejection() {
        let connector = FakeConnector::healthy();
        let stats = connector.stats.clone();
        let timed_out = expect_failure(
            probe(FakeTokens::hanging(), FakeResolver::resolving("10.1.2.3"), connector)
                .run(&healthy_request())
                .await,
        );
        let rejected = expect_failure(
            probe(
                FakeTokens::rejecting(),
                FakeResolver::resolving("10.1.2.3"),
                FakeConnector::healthy(),
            )
            .run(&healthy_request())
            .await,
        );

        assert_eq!(timed_out.stage, Stage::TokenAcquisition);
        assert_eq!(timed_out.message, "Token acquisition timeout after 30s");
        assert_eq!(rejected.stage, Stage::TokenAcquisition);
        assert_ne!(timed_out.message, rejected.message);
        assert!(rejected.message.contains("400"));
        assert_eq!(timed_out.timings.get(Stage::TokenAcquisition), None);
        assert_eq!(timed_out.timings.get(Stage::DnsResolution), None);
        assert_eq!(stats.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_token_fails_token_stage() {
        let connector = FakeConnector::healthy();
        let stats = connector.stats.clone();
        let probe = probe(FakeTokens::issuing(""), FakeResolver::resolving("10.1.2.3"), connector);

        let failure = expect_failure(probe.run(&healthy_request()).await);
        assert_eq!(failure.stage, Stage::TokenAcquisition);
        assert_eq!(failure.message, "Failed to obtain access token");
        assert_eq!(failure.timings.get(Stage::DnsResolution), None);
        assert_eq!(stats.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_leaves_query_not_attempted() {
        let connector = FakeConnector::with(ConnectBehavior::Hang, QueryBehavior::Healthy);
        let stats = connector.stats.clone();
        let probe = probe(
            FakeTokens::issuing("token"),
            FakeResolver::resolving("10.1.2.3"),
            connector,
        );

        let failure = expect_failure(probe.run(&healthy_request()).await);
        assert_eq!(failure.stage, Stage::Connection);
        assert_eq!(failure.message, "Database connection timeout after 30s");
        assert!(failure.timings.get(Stage::DnsResolution).is_some());
        assert_eq!(failure.timings.get(Stage::Connection), None);
        assert_eq!(failure.timings.get(Stage::Query), None);
        assert!(failure.total >= Duration::from_secs(30));
        assert_eq!(stats.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connect_error_keeps_sqlstate() {
        let probe = probe(
            FakeTokens::issuing("token"),
            FakeResolver::resolving("10.1.2.3"),
            FakeConnector::with(ConnectBehavior::Refuse, QueryBehavior::Healthy),
        );

        let failure = expect_failure(probe.run(&healthy_request()).await);
        assert_eq!(failure.stage, Stage::Connection);
        assert_eq!(failure.code.as_deref(), Some("28000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_timeout_still_closes_session() {
        let connector = FakeConnector::with(ConnectBehavior::Open, QueryBehavior::Hang);
        let stats = connector.stats.clone();
        let probe = probe(
            FakeTokens::issuing("token"),
            FakeResolver::resolving("10.1.2.3"),
            connector,
        );

        let failure = expect_failure(probe.run(&healthy_request()).await);
        assert_eq!(failure.stage, Stage::Query);
        assert_eq!(failure.message, "Query timeout after 15s");
        assert!(failure.timings.get(Stage::Connection).is_some());
        assert_eq!(failure.timings.get(Stage::Query), None);
        assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_error_is_query_stage() {
        let connector = FakeConnector::with(ConnectBehavior::Open, QueryBehavior::Fail);
        let stats = connector.stats.clone();
        let probe = probe(
            FakeTokens::issuing("token"),
            FakeResolver::resolving("10.1.2.3"),
            connector,
        );

        let failure = expect_failure(probe.run(&healthy_request()).await);
        assert_eq!(failure.stage, Stage::Query);
        assert_eq!(failure.code.as_deref(), Some("42501"));
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_error_does_not_change_outcome() {
        let connector = FakeConnector::healthy().failing_close();
        let stats = connector.stats.clone();
        let probe = probe(
            FakeTokens::issuing("token"),
            FakeResolver::resolving("10.1.2.3"),
            connector,
        );

        let success = expect_success(probe.run(&healthy_request()).await);
        assert_eq!(success.close_error.as_deref(), Some("connection reset during close"));
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_independent() {
        let connector = FakeConnector::healthy();
        let stats = connector.stats.clone();
        let probe = probe(
            FakeTokens::issuing("token"),
            FakeResolver::resolving("10.1.2.3"),
            connector,
        );
        let request = healthy_request();

        let first = expect_success(probe.run(&request).await);
        let second = expect_success(probe.run(&request).await);

        assert_eq!(first.server, second.server);
        assert_eq!(stats.opened.load(Ordering::SeqCst), 2);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 2);
    }
}
