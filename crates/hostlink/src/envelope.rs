//! # Wire Envelopes
//!
//! The transport moves one JSON string per message and has no framing of its
//! own. Outgoing commands are wrapped in a `CommandEnvelope`; everything the
//! host sends back arrives as an `Inbound` frame.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::event::HostEvent;
use crate::handle::Handle;
use crate::handle::HandlePair;

/// `{callback, error, command, inner}`: one host command and its positional arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub callback: Handle,
    pub error: Handle,
    pub command: String,
    pub inner: Vec<Value>,
}

impl CommandEnvelope {
    pub fn new(handles: HandlePair, command: impl Into<String>, inner: Vec<Value>) -> Self {
        Self {
            callback: handles.callback,
            error: handles.error,
            command: command.into(),
            inner,
        }
    }

    pub fn handles(&self) -> HandlePair {
        HandlePair {
            callback: self.callback,
            error: self.error,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(message: &str) -> serde_json::Result<Self> {
        serde_json::from_str(message)
    }
}

/// A frame delivered by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Inbound {
    /// Terminal outcome for the command that was given `handle`.
    Dispatch { handle: Handle, payload: Value },
    /// A push notification for the shared event feed.
    Event { event: HostEvent },
}
