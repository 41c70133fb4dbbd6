use std::fmt;

use async_trait::async_trait;

pub mod managed;

pub use managed::ManagedIdentityCredential;

/// Audience of Azure Database for PostgreSQL Entra ID tokens.
pub const POSTGRES_TOKEN_SCOPE: &str = "https://ossrdbms-aad.database.windows.net/.default";

/// A bearer credential. The secret never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// True when the provider answered without a token worth presenting.
    pub fn is_blank(&self) -> bool {
        self.token.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("len", &self.token.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity endpoint request failed")]
    Http(#[from] reqwest::Error),

    #[error("identity endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid identity endpoint")]
    Endpoint(#[from] url::ParseError),
}

/// Source of bearer credentials for a given audience scope.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, IdentityError>;
}
