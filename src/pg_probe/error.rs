use std::time::Duration;

use super::result::Stage;

/// Fatal stage failures. The first one raised ends the run.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Missing environment variables: {0}")]
    MissingParameters(String),

    #[error("Token acquisition timeout after {}", budget(.0))]
    TokenTimeout(Duration),

    #[error("Token acquisition failed: {0}")]
    TokenRejected(String),

    #[error("Failed to obtain access token")]
    MissingToken,

    #[error("Database connection timeout after {}", budget(.0))]
    ConnectTimeout(Duration),

    #[error("{message}")]
    Connect {
        message: String,
        code: Option<String>,
    },

    #[error("Query timeout after {}", budget(.0))]
    QueryTimeout(Duration),

    #[error("{message}")]
    Query {
        message: String,
        code: Option<String>,
    },
}

impl ProbeError {
    pub fn stage(&self) -> Stage {
        match self {
            ProbeError::MissingParameters(_) => Stage::EnvironmentValidation,
            ProbeError::TokenTimeout(_) | ProbeError::TokenRejected(_) | ProbeError::MissingToken => {
                Stage::TokenAcquisition
            }
            ProbeError::ConnectTimeout(_) | ProbeError::Connect { .. } => Stage::Connection,
            ProbeError::QueryTimeout(_) | ProbeError::Query { .. } => Stage::Query,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ProbeError::Connect { code, .. } | ProbeError::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProbeError::TokenTimeout(_) | ProbeError::ConnectTimeout(_) | ProbeError::QueryTimeout(_)
        )
    }
}

/// Whole seconds render as `30s`; anything finer keeps its milliseconds.
fn budget(limit: &Duration) -> String {
    if limit.subsec_nanos() == 0 {
        format!("{}s", limit.as_secs())
    } else {
        format!("{}ms", limit.as_millis())
    }
}
