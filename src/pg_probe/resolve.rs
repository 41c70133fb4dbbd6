use std::net::IpAddr;

use async_trait::async_trait;
use trust_dns_resolver::TokioAsyncResolver;

use super::BoxError;

/// Diagnostic host lookup. Only the first address is of interest.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<IpAddr, BoxError>;
}

#[async_trait]
impl HostResolver for TokioAsyncResolver {
    async fn lookup(&self, host: &str) -> Result<IpAddr, BoxError> {
        let ips = self.lookup_ip(host).await?;
        ips.iter()
            .next()
            .ok_or_else(|| format!("no addresses returned for {host}").into())
    }
}
