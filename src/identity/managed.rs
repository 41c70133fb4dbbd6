use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{AccessToken, IdentityError, TokenProvider};

pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Where the managed identity token is requested from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// App Service / Functions local identity endpoint.
    AppService { endpoint: String, header: String },
    /// Instance metadata service of a VM or container host.
    Imds { endpoint: String },
}

impl IdentitySource {
    /// App Service when both the endpoint and its secret header are known,
    /// IMDS otherwise.
    pub fn detect(endpoint: Option<String>, header: Option<String>) -> Self {
        match (endpoint, header) {
            (Some(endpoint), Some(header)) => IdentitySource::AppService { endpoint, header },
            _ => IdentitySource::Imds {
                endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

/// Token provider backed by the platform's managed identity endpoint.
#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    client: Client,
    source: IdentitySource,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn new(client: Client, source: IdentitySource, client_id: Option<String>) -> Self {
        Self {
            client,
            source,
            client_id,
        }
    }

    fn token_url(&self, resource: &str) -> Result<Url, IdentityError> {
        let (endpoint, api_version) = match &self.source {
            IdentitySource::AppService { endpoint, .. } => (endpoint, APP_SERVICE_API_VERSION),
            IdentitySource::Imds { endpoint } => (endpoint, IMDS_API_VERSION),
        };

        let mut url = Url::parse(endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            query.append_pair("resource", resource);
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }
        Ok(url)
    }
}

/// Managed identity endpoints take a resource, not a `/.default` scope.
pub fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

#[async_trait]
impl TokenProvider for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, IdentityError> {
        let url = self.token_url(scope_to_resource(scope))?;

        let request = match &self.source {
            IdentitySource::AppService { header, .. } => {
                self.client.get(url).header("X-IDENTITY-HEADER", header)
            }
            IdentitySource::Imds { .. } => self.client.get(url).header("Metadata", "true"),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, "Managed identity endpoint rejected token request");
            return Err(IdentityError::Rejected { status, body });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(token_len = token.access_token.len(), "Managed identity token received");
        Ok(AccessToken::new(token.access_token))
    }
}
