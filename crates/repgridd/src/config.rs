//! repgridd.toml configuration.
//!
//! ```toml
//! [etcd]
//! endpoint = "http://127.0.0.1:4001"
//!
//! [api]
//! server = "http://127.0.0.1:8080"
//! prefix = "/api/v1beta1"
//! timeout = "10s"
//!
//! [sync]
//! period = "10s"
//! ```
//!
//! Every field is optional.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub etcd: EtcdConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub server: String,
    pub prefix: String,
    /// Per-request timeout, e.g. "10s".
    pub timeout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between full passes and between watch restarts.
    pub period: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:4001".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:8080".to_string(),
            prefix: repgrid_client::DEFAULT_API_PREFIX.to_string(),
            timeout: "10s".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period: "10s".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given, else the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn sync_period(&self) -> anyhow::Result<Duration> {
        let period = parse_duration(&self.sync.period).context("sync.period")?;
        if period.is_zero() {
            bail!("sync.period must be greater than zero");
        }
        Ok(period)
    }

    pub fn api_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.api.timeout).context("api.timeout")
    }
}

/// Parse a duration string like "500ms", "30s", "2m" or "1h". A bare
/// number is seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => s.split_at(i),
        None => (s, "s"),
    };
    if digits.is_empty() {
        bail!("invalid duration {s:?}");
    }
    let n: u64 = digits
        .parse()
        .with_context(|| format!("invalid duration {s:?}"))?;
    let (n, scale) = match unit {
        "ms" => return Ok(Duration::from_millis(n)),
        "s" => (n, 1),
        "m" => (n, 60),
        "h" => (n, 3600),
        other => bail!("unknown duration unit {other:?} in {s:?}"),
    };
    let secs = n
        .checked_mul(scale)
        .with_context(|| format!("duration {s:?} is too large"))?;
    Ok(Duration::from_secs(secs))
}
