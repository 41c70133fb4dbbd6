//! Fake collaborators for probe and route tests.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::identity::{AccessToken, IdentityError, TokenProvider};

use super::BoxError;
use super::driver::{ConnectParams, DatabaseConnector, DatabaseSession, DriverError};
use super::probe::{ProbeRequest, ProbeTimeouts};
use super::resolve::HostResolver;
use super::result::ServerInfo;

pub fn healthy_request() -> ProbeRequest {
    ProbeRequest {
        host: Some("db.example.internal".to_string()),
        database: Some("appdb".to_string()),
        user: Some("backend-app".to_string()),
        port: 5432,
        timeouts: ProbeTimeouts::default(),
    }
}

pub fn server_info() -> ServerInfo {
    ServerInfo {
        version: "PostgreSQL 16.4 on x86_64-pc-linux-gnu".to_string(),
        current_user: "backend-app".to_string(),
        current_database: "appdb".to_string(),
        server_address: Some("10.1.2.3/32".to_string()),
    }
}

enum TokenBehavior {
    Issue(String),
    Reject,
    Hang,
}

pub struct FakeTokens {
    behavior: TokenBehavior,
    pub calls: Arc<AtomicUsize>,
}

impl FakeTokens {
    fn new(behavior: TokenBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn issuing(token: &str) -> Self {
        Self::new(TokenBehavior::Issue(token.to_string()))
    }

    pub fn rejecting() -> Self {
        Self::new(TokenBehavior::Reject)
    }

    pub fn hanging() -> Self {
        Self::new(TokenBehavior::Hang)
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            TokenBehavior::Issue(token) => Ok(AccessToken::new(token.clone())),
            TokenBehavior::Reject => Err(IdentityError::Rejected {
                status: 400,
                body: "identity not found".to_string(),
            }),
            TokenBehavior::Hang => std::future::pending().await,
        }
    }
}

pub struct FakeResolver {
    address: Option<IpAddr>,
}

impl FakeResolver {
    pub fn resolving(ip: &str) -> Self {
        Self {
            address: ip.parse().ok(),
        }
    }

    pub fn failing() -> Self {
        Self { address: None }
    }
}

#[async_trait]
impl HostResolver for FakeResolver {
    async fn lookup(&self, host: &str) -> Result<IpAddr, BoxError> {
        self.address
            .ok_or_else(|| format!("no record found for {host}").into())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConnectBehavior {
    Open,
    Refuse,
    Hang,
}

#[derive(Debug, Clone, Copy)]
pub enum QueryBehavior {
    Healthy,
    Fail,
    Hang,
}

#[derive(Debug, Default)]
pub struct SessionStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    passwords: Mutex<Vec<String>>,
}

impl SessionStats {
    pub fn last_password(&self) -> Option<String> {
        self.passwords.lock().ok()?.last().cloned()
    }
}

pub struct FakeConnector {
    connect: ConnectBehavior,
    query: QueryBehavior,
    close_fails: bool,
    pub stats: Arc<SessionStats>,
}

impl FakeConnector {
    pub fn with(connect: ConnectBehavior, query: QueryBehavior) -> Self {
        Self {
            connect,
            query,
            close_fails: false,
            stats: Arc::new(SessionStats::default()),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ConnectBehavior::Open, QueryBehavior::Healthy)
    }

    pub fn failing_close(mut self) -> Self {
        self.close_fails = true;
        self
    }
}

#[async_trait]
impl DatabaseConnector for FakeConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DatabaseSession>, DriverError> {
        if let Ok(mut passwords) = self.stats.passwords.lock() {
            passwords.push(params.password.clone());
        }
        match self.connect {
            ConnectBehavior::Open => {
                self.stats.opened.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FakeSession {
                    query: self.query,
                    close_fails: self.close_fails,
                    stats: self.stats.clone(),
                }))
            }
            ConnectBehavior::Refuse => Err(DriverError {
                message: format!("password authentication failed for user \"{}\"", params.user),
                code: Some("28000".to_string()),
            }),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }
}

struct FakeSession {
    query: QueryBehavior,
    close_fails: bool,
    stats: Arc<SessionStats>,
}

#[async_trait]
impl DatabaseSession for FakeSession {
    async fn server_info(&mut self) -> Result<ServerInfo, DriverError> {
        match self.query {
            QueryBehavior::Healthy => Ok(server_info()),
            QueryBehavior::Fail => Err(DriverError {
                message: "permission denied for function inet_server_addr".to_string(),
                code: Some("42501".to_string()),
            }),
            QueryBehavior::Hang => std::future::pending().await,
        }
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            Err(DriverError::new("connection reset during close"))
        } else {
            Ok(())
        }
    }
}
