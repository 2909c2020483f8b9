//! HTTP relay between classification clients and the model provider.
//! Stateless: every request is validated locally and forwarded exactly once.

mod error;
mod handlers;
mod router;
mod upstream;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

pub use error::RelayError;
pub use router::{build_router, CLASSIFY_PATH};
pub use upstream::{UpstreamClient, DEFAULT_UPSTREAM_URL};

pub const SERVER_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Where the relay takes the provider key from, as selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KeySourcing {
    /// Each request carries the caller's key in `apiKey`.
    Caller,
    /// The relay uses its own key from the environment and ignores `apiKey`.
    Server,
}

#[derive(Clone)]
pub enum KeyPolicy {
    CallerSupplied,
    /// `None` when the environment had no key at startup.
    ServerHeld(Option<String>),
}

impl std::fmt::Debug for KeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPolicy::CallerSupplied => write!(f, "CallerSupplied"),
            KeyPolicy::ServerHeld(key) => write!(f, "ServerHeld(configured: {})", key.is_some()),
        }
    }
}

fn non_blank(key: Option<&str>) -> Option<&str> {
    key.map(str::trim).filter(|key| !key.is_empty())
}

impl KeyPolicy {
    /// Pick the key for one request according to the policy.
    pub fn resolve<'a>(&'a self, caller_key: Option<&'a str>) -> Result<&'a str, RelayError> {
        match self {
            KeyPolicy::CallerSupplied => non_blank(caller_key)
                .ok_or_else(|| RelayError::BadRequest("API key is required".to_string())),
            KeyPolicy::ServerHeld(key) => {
                if caller_key.is_some() {
                    tracing::debug!("Ignoring caller-supplied key; relay holds its own");
                }
                non_blank(key.as_deref()).ok_or(RelayError::MissingServerKey)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub upstream_url: String,
    pub key_policy: KeyPolicy,
}

impl RelayConfig {
    pub fn new(upstream_url: impl Into<String>, key_policy: KeyPolicy) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            key_policy,
        }
    }

    /// Build the config once at startup; the server key is read here and nowhere else.
    pub fn from_env_policy(sourcing: KeySourcing, upstream_url: impl Into<String>) -> Self {
        let key_policy = match sourcing {
            KeySourcing::Caller => KeyPolicy::CallerSupplied,
            KeySourcing::Server => KeyPolicy::ServerHeld(std::env::var(SERVER_KEY_ENV).ok()),
        };
        Self::new(upstream_url, key_policy)
    }

    fn log_policy(&self) {
        match &self.key_policy {
            KeyPolicy::CallerSupplied => warn!(
                "Key policy: caller-supplied. Provider keys sent by clients transit this relay"
            ),
            KeyPolicy::ServerHeld(Some(_)) => {
                info!("Key policy: server-held key from {}", SERVER_KEY_ENV)
            }
            KeyPolicy::ServerHeld(None) => warn!(
                "Key policy: server-held, but {} is not set; requests will fail with 500",
                SERVER_KEY_ENV
            ),
        }
    }
}

/// Shared state accessible by all handlers via axum's State extractor.
pub struct AppState {
    pub upstream: UpstreamClient,
    pub key_policy: KeyPolicy,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            upstream: UpstreamClient::new(config.upstream_url),
            key_policy: config.key_policy,
        }
    }
}

/// Bind `addr` and serve the relay until Ctrl-C.
pub async fn serve(addr: &str, config: RelayConfig) -> Result<()> {
    config.log_policy();
    info!("Forwarding to {}", config.upstream_url);

    let app = build_router(Arc::new(AppState::new(config)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind relay to {}", addr))?;

    info!(
        "Relay listening on http://{}{}",
        listener.local_addr().context("Failed to read bound address")?,
        CLASSIFY_PATH
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(tokio::signal::ctrl_c()))
        .await
        .context("Relay server failed")?;

    Ok(())
}

/// Resolve once `signal` fires. If the signal handler cannot be installed the
/// relay keeps running instead of stopping immediately.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
