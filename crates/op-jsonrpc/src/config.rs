//! Client configuration
//!
//! Where the OVSDB server listens and how long to wait for it. Read from
//! the environment:
//!
//! - `OVSDB_REMOTE`: `unix:/path/to/db.sock` or `tcp:host:port`
//! - `OVSDB_TIMEOUT_SECS`: per-call timeout in seconds
//!
//! Without `OVSDB_REMOTE` the first existing standard socket is used.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const REMOTE_ENV: &str = "OVSDB_REMOTE";
pub const TIMEOUT_ENV: &str = "OVSDB_TIMEOUT_SECS";

/// Socket paths checked in order when no remote is configured
pub const DEFAULT_SOCKET_PATHS: &[&str] = &[
    "/var/run/openvswitch/db.sock",
    "/run/openvswitch/db.sock",
];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OVSDB server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    /// First existing standard socket, or the first candidate when none
    /// exists yet
    pub fn default_socket() -> Self {
        let path = DEFAULT_SOCKET_PATHS
            .iter()
            .find(|p| Path::new(p).exists())
            .unwrap_or(&DEFAULT_SOCKET_PATHS[0]);
        debug!("Using OVSDB socket {}", path);
        Endpoint::Unix(PathBuf::from(path))
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some(("unix", path)) if !path.is_empty() => Ok(Endpoint::Unix(PathBuf::from(path))),
            Some(("tcp", addr)) if addr.rsplit_once(':').is_some() => {
                Ok(Endpoint::Tcp(addr.to_string()))
            }
            _ => bail!("Invalid OVSDB remote '{}', expected unix:PATH or tcp:HOST:PORT", s),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default_socket(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load from `OVSDB_REMOTE` / `OVSDB_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let endpoint = match lookup(REMOTE_ENV) {
            Some(remote) => remote
                .parse()
                .with_context(|| format!("Failed to parse {}", REMOTE_ENV))?,
            None => Endpoint::default_socket(),
        };
        let timeout = match lookup(TIMEOUT_ENV) {
            Some(secs) => Duration::from_secs(
                secs.trim()
                    .parse()
                    .with_context(|| format!("Failed to parse {}={}", TIMEOUT_ENV, secs))?,
            ),
            None => DEFAULT_TIMEOUT,
        };
        Ok(Self { endpoint, timeout })
    }
}
