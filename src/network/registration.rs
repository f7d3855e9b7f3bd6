//! Master Registry Presence
//!
//! Registers the server with an external master list and keeps the entry
//! alive with a heartbeat. Every failure here is logged and retried on the
//! next beat; the game keeps running without the registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{info, warn};

/// Time between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP timeout for registry calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Registry answered with an unexpected status
    #[error("Unexpected status {0}")]
    Status(u16),

    /// Heartbeat sent before a successful registration
    #[error("Not registered")]
    NotRegistered,
}

/// What the registry lists about this server.
#[derive(Debug, Clone)]
pub struct RegistrationInfo {
    /// Registry base URL
    pub master_url: String,
    /// Display name
    pub name: String,
    /// Address clients should dial
    pub address: String,
    /// Server version
    pub version: String,
    /// Region tag
    pub region: String,
    /// Player cap
    pub max_players: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    name: &'a str,
    address: &'a str,
    players: usize,
    max_players: usize,
    version: &'a str,
    region: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    id: &'a str,
    players: usize,
}

/// Registry client for one server.
pub struct Registration {
    info: RegistrationInfo,
    client: Client,
    server_id: Option<String>,
    players: Arc<AtomicUsize>,
}

impl Registration {
    /// Create a registration. `players` is the live player count.
    pub fn new(info: RegistrationInfo, players: Arc<AtomicUsize>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            info,
            client,
            server_id: None,
            players,
        }
    }

    /// Id assigned by the registry.
    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.info.master_url.trim_end_matches('/'), path)
    }

    /// Register with the master. Expects `201 Created` with `{"id": ...}`.
    pub async fn register(&mut self) -> Result<(), RegistrationError> {
        let body = RegisterRequest {
            name: &self.info.name,
            address: &self.info.address,
            players: self.players.load(Ordering::Relaxed),
            max_players: self.info.max_players,
            version: &self.info.version,
            region: &self.info.region,
        };

        let response = self
            .client
            .post(self.url("/servers/register"))
            .json(&body)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(RegistrationError::Status(response.status().as_u16()));
        }

        let result: RegisterResponse = response.json().await?;
        info!(id = %result.id, "Registered with master");
        self.server_id = Some(result.id);
        Ok(())
    }

    /// Send one heartbeat; re-registers if the master forgot us.
    pub async fn heartbeat(&mut self) -> Result<(), RegistrationError> {
        let Some(id) = self.server_id.clone() else {
            return Err(RegistrationError::NotRegistered);
        };

        let response = self
            .client
            .post(self.url("/servers/heartbeat"))
            .json(&HeartbeatRequest {
                id: &id,
                players: self.players.load(Ordering::Relaxed),
            })
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                info!("Master lost our registration, re-registering");
                self.register().await
            }
            status => Err(RegistrationError::Status(status.as_u16())),
        }
    }

    /// Register, then heartbeat until shutdown.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        if let Err(e) = self.register().await {
            warn!("Initial registration failed: {}", e);
        }

        let mut ticker = interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = if self.server_id.is_some() {
                        self.heartbeat().await
                    } else {
                        self.register().await
                    };
                    if let Err(e) = result {
                        warn!("Heartbeat failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(url: &str) -> RegistrationInfo {
        RegistrationInfo {
            master_url: url.to_string(),
            name: "test".into(),
            address: "127.0.0.1:7373".into(),
            version: "0.1.0".into(),
            region: "local".into(),
            max_players: 8,
        }
    }

    #[test]
    fn test_register_body_is_camel_case() {
        let body = RegisterRequest {
            name: "n",
            address: "a",
            players: 2,
            max_players: 8,
            version: "v",
            region: "r",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""maxPlayers":8"#));
    }

    #[test]
    fn test_url_join() {
        let reg = Registration::new(info("http://master:9000/"), Arc::new(AtomicUsize::new(0)));
        assert_eq!(reg.url("/servers/register"), "http://master:9000/servers/register");
    }

    #[tokio::test]
    async fn test_heartbeat_requires_registration() {
        let mut reg = Registration::new(info("http://127.0.0.1:9"), Arc::new(AtomicUsize::new(0)));
        assert!(matches!(reg.heartbeat().await, Err(RegistrationError::NotRegistered)));
    }

    #[tokio::test]
    async fn test_unreachable_master_is_an_error() {
        let mut reg = Registration::new(info("http://127.0.0.1:9"), Arc::new(AtomicUsize::new(0)));
        assert!(reg.register().await.is_err());
        assert!(reg.server_id().is_none());
    }
}
