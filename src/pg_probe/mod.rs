//! Staged PostgreSQL connectivity probe.
//!
//! A run walks through environment validation, token acquisition, DNS
//! resolution, connection and a diagnostic query, timing each stage and
//! stopping at the first fatal failure. DNS resolution is the one stage whose
//! failure is only reported, never fatal.

pub mod driver;
pub mod error;
pub mod probe;
pub mod resolve;
pub mod result;
pub mod timeout;

#[cfg(test)]
pub mod testing;

use std::fmt::Write;

pub use driver::{ConnectParams, DatabaseConnector, DatabaseSession, DriverError, PgConnector};
pub use error::ProbeError;
pub use probe::{PgProbe, ProbeRequest, ProbeTimeouts};
pub use resolve::HostResolver;
pub use result::{ProbeFailure, ProbeOutcome, ProbeSuccess, ServerInfo, Stage, StageTimings};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Renders an error together with its chain of sources.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": {}", src);
        err = src;
    }
    s
}
