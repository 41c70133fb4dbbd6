use std::fmt;
use std::time::Duration;

/// One bounded step of a connectivity probe, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    EnvironmentValidation,
    TokenAcquisition,
    DnsResolution,
    Connection,
    Query,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::EnvironmentValidation,
        Stage::TokenAcquisition,
        Stage::DnsResolution,
        Stage::Connection,
        Stage::Query,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::EnvironmentValidation => "environment validation",
            Stage::TokenAcquisition => "token acquisition",
            Stage::DnsResolution => "dns resolution",
            Stage::Connection => "connection",
            Stage::Query => "query",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elapsed time per stage for a single probe run.
///
/// A stage that was never reached has no entry, which is not the same thing
/// as a stage that completed in 0ms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTimings {
    slots: [Option<Duration>; 5],
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the elapsed time of `stage`. The first measurement wins.
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let slot = &mut self.slots[stage.index()];
        if slot.is_some() {
            tracing::warn!(stage = %stage, "Stage timing already recorded, ignoring");
            return;
        }
        *slot = Some(elapsed);
    }

    pub fn get(&self, stage: Stage) -> Option<Duration> {
        self.slots[stage.index()]
    }

    pub fn attempted(&self) -> impl Iterator<Item = (Stage, Duration)> + '_ {
        Stage::ALL
            .into_iter()
            .filter_map(|stage| self.get(stage).map(|elapsed| (stage, elapsed)))
    }
}

/// Row returned by the diagnostic query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub version: String,
    pub current_user: String,
    pub current_database: String,
    /// `None` when the server reports no address (e.g. Unix socket sessions).
    pub server_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSuccess {
    pub host: String,
    pub database: String,
    pub user: String,
    /// Address the host resolved to, or `"unknown"` when resolution failed.
    pub resolved_ip: String,
    pub server: ServerInfo,
    pub timings: StageTimings,
    pub total: Duration,
    pub close_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub stage: Stage,
    pub message: String,
    /// SQLSTATE reported by the server, if any.
    pub code: Option<String>,
    pub timings: StageTimings,
    pub total: Duration,
    pub close_error: Option<String>,
}

/// The single result of one probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success(ProbeSuccess),
    Failure(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }

    pub fn timings(&self) -> &StageTimings {
        match self {
            ProbeOutcome::Success(success) => &success.timings,
            ProbeOutcome::Failure(failure) => &failure.timings,
        }
    }

    pub fn total(&self) -> Duration {
        match self {
            ProbeOutcome::Success(success) => success.total,
            ProbeOutcome::Failure(failure) => failure.total,
        }
    }
}
