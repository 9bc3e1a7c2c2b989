//! # hostlink
//!
//! Client side of a web view to native host bridge. A single transport moves
//! one JSON string per message; on top of it this crate builds:
//!
//! - request/response correlation through pairs of numeric handles
//!   ([`handle::Registry`], [`bridge::Bridge::call`]), and
//! - host-initiated streaming channels identified by host-issued ids
//!   ([`channel::Channel`]), fed by a shared multicast event feed.
//!
//! ```ignore
//! let bridge = Bridge::new(BridgeConfig::from_env()?);
//! bridge.attach(Box::new(transport))?;
//!
//! let host = HostApi::new(bridge.clone());
//! let words = host.get_wordlist().await?;
//!
//! let mut window = host.window_events();
//! while let Some(event) = window.recv().await {
//!     println!("{:?}", event?);
//! }
//! ```

pub mod bridge;
pub mod channel;
pub mod commands;
pub mod config;
pub mod envelope;
pub mod event;
pub mod feed;
pub mod handle;
pub mod mock_transport;
pub mod transport;

pub use bridge::Bridge;
pub use channel::Channel;
pub use channel::ChannelState;
pub use channel::Subscription;
pub use commands::HostApi;
pub use config::BridgeConfig;
pub use event::ChannelId;
pub use event::HostEvent;
pub use transport::Transport;
