//! # Transport Abstraction
//!
//! The narrow pipe between the web view and the native host. Everything
//! above it (handles, channels, typed commands) is built from strings.
//!
//! ## Philosophy
//!
//! - **String-Oriented**: The Transport knows nothing about handles, commands or
//!   channels. It moves opaque JSON strings.
//! - **Post and Listen**: Sending is fire-and-forget; correlation of replies is
//!   built on top of this, not defined here.

use std::fmt;

#[derive(Debug, Clone)]
pub enum Error {
    /// The host end of the pipe is gone.
    ConnectionLost(String),
    /// The pipe failed to carry a message.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Host connection lost: {}", msg),
            Self::Io(msg) => write!(f, "Transport failure: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A duplex message pipe to the host.
///
/// Object-safe; the bridge holds it as `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Posts one serialized message to the host.
    ///
    /// One message per call, delivered as-is. Retries and batching are the
    /// caller's business.
    async fn send(&self, message: String) -> Result<()>;

    /// Waits for the next message from the host.
    ///
    /// Returns `Ok(None)` once the host side has hung up.
    async fn recv(&self) -> Result<Option<String>>;
}
