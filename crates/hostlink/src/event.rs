//! # Host Events
//!
//! Push notifications the host broadcasts on the shared event feed. Only the
//! channel protocol lives here: `accept`, `message` and `close`.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Client-generated correlation token for one open attempt.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub u32);

impl Token {
    /// Draws a fresh random token.
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token-{}", self.0)
    }
}

/// Host-assigned channel identifier.
///
/// Opaque to the client: it is a structured value (a 16-byte id laid out as
/// nested arrays by the host) compared by content, never interpreted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub Value);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-issued reference a message asks to be acknowledged with.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolverRef(pub u64);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostEvent {
    /// The host bound a channel to the open attempt carrying `token`.
    Accept {
        token: Token,
        #[serde(rename = "acceptId")]
        accept_id: ChannelId,
    },
    /// A value pushed on an open channel.
    Message {
        #[serde(rename = "channelId")]
        channel_id: ChannelId,
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolver: Option<ResolverRef>,
    },
    /// The host closed the channel.
    Close {
        #[serde(rename = "channelId")]
        channel_id: ChannelId,
    },
}

impl HostEvent {
    /// The channel this event addresses, if it is bound to one.
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::Accept { .. } => None,
            Self::Message { channel_id, .. } | Self::Close { channel_id } => Some(channel_id),
        }
    }
}
