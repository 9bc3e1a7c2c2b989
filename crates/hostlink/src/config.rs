//! Bridge configuration.
//!
//! Assembled once, before the bridge is created. Values can come from code,
//! from a JSON document, or from `HOSTLINK_*` environment variables.

use std::time::Duration;

use serde::Deserialize;

pub const ENV_HANDSHAKE_TIMEOUT_MS: &str = "HOSTLINK_HANDSHAKE_TIMEOUT_MS";

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub enum Error {
    Parse(serde_json::Error),
    Invalid { key: &'static str, reason: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "Config parse error: {}", e),
            Self::Invalid { key, reason } => write!(f, "Invalid value for {}: {}", key, reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// How long an open attempt waits for the host's `accept`.
    pub handshake_timeout: Duration,
}

/// On-disk shape. Every field is optional and falls back to the default.
#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    handshake_timeout_ms: Option<u64>,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Parses a JSON document such as `{"handshake_timeout_ms": 500}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;
        let mut config = Self::new();
        if let Some(ms) = raw.handshake_timeout_ms {
            config.handshake_timeout = Duration::from_millis(ms);
        }
        config.validate()
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::new().with_env(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_HANDSHAKE_TIMEOUT_MS) {
            let ms = parse_number::<u64>(ENV_HANDSHAKE_TIMEOUT_MS, &raw)?;
            self.handshake_timeout = Duration::from_millis(ms);
        }
        self.validate()
    }

    /// Rejects values the bridge cannot run with.
    pub fn validate(self) -> Result<Self> {
        if self.handshake_timeout.is_zero() {
            return Err(Error::Invalid {
                key: "handshake_timeout",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(self)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| Error::Invalid {
        key,
        reason: format!("{:?}: {}", raw, e),
    })
}
