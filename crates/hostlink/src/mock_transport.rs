//! In-memory host connection for testing.
//!
//! `MockHost::connect` returns the client end, a `MockTransport` to hand to
//! `Bridge::attach`, and a `MockHost` that plays the native host: it decodes
//! command envelopes and answers with dispatch and event frames.

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::envelope::CommandEnvelope;
use crate::envelope::Inbound;
use crate::event::HostEvent;
use crate::handle::Handle;
use crate::transport;
use crate::transport::Transport;

/// Client end of a `MockHost` connection.
pub struct MockTransport {
    to_host: mpsc::UnboundedSender<String>,
    from_host: Mutex<mpsc::UnboundedReceiver<String>>,
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: String) -> transport::Result<()> {
        self.to_host
            .send(message)
            .map_err(|_| transport::Error::ConnectionLost("mock host dropped".into()))
    }

    async fn recv(&self) -> transport::Result<Option<String>> {
        Ok(self.from_host.lock().await.recv().await)
    }
}

/// Scripted stand-in for the native host.
///
/// Dropping it hangs up the connection.
pub struct MockHost {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockHost {
    /// Returns the client-side transport and the host that answers it.
    pub fn connect() -> (MockTransport, MockHost) {
        let (to_host, from_client) = mpsc::unbounded_channel();
        let (to_client, from_host) = mpsc::unbounded_channel();

        let client = MockTransport {
            to_host,
            from_host: Mutex::new(from_host),
        };
        let host = MockHost { to_client, from_client };
        (client, host)
    }

    /// Waits for the next command the client sent.
    ///
    /// Returns `None` once the client transport is gone.
    ///
    /// # Panics
    /// If the client sent something that is not a command envelope.
    pub async fn next_envelope(&mut self) -> Option<CommandEnvelope> {
        let message = self.from_client.recv().await?;
        Some(decode(&message))
    }

    /// Returns the next command if one is already queued.
    pub fn try_next_envelope(&mut self) -> Option<CommandEnvelope> {
        let message = self.from_client.try_recv().ok()?;
        Some(decode(&message))
    }

    /// Waits for the next command named `command`, skipping any other.
    pub async fn expect_command(&mut self, command: &str) -> Option<CommandEnvelope> {
        loop {
            let envelope = self.next_envelope().await?;
            if envelope.command == command {
                return Some(envelope);
            }
        }
    }

    /// Fires the callback handle of `envelope`.
    pub fn resolve(&self, envelope: &CommandEnvelope, payload: Value) {
        self.dispatch(envelope.callback, payload);
    }

    /// Fires the error handle of `envelope`.
    pub fn reject(&self, envelope: &CommandEnvelope, payload: Value) {
        self.dispatch(envelope.error, payload);
    }

    pub fn dispatch(&self, handle: Handle, payload: Value) {
        self.send_frame(&Inbound::Dispatch { handle, payload });
    }

    /// Pushes `event` onto the client's event feed.
    pub fn emit(&self, event: HostEvent) {
        self.send_frame(&Inbound::Event { event });
    }

    /// Sends a frame verbatim, for exercising malformed input.
    pub fn send_raw(&self, frame: String) {
        // A closed client is not an error for a scripted host.
        let _ = self.to_client.send(frame);
    }

    fn send_frame(&self, frame: &Inbound) {
        match serde_json::to_string(frame) {
            Ok(frame) => self.send_raw(frame),
            Err(e) => panic!("mock host failed to encode frame: {}", e),
        }
    }
}

fn decode(message: &str) -> CommandEnvelope {
    CommandEnvelope::from_json(message)
        .unwrap_or_else(|e| panic!("client sent a malformed envelope {:?}: {}", message, e))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::handle::HandlePair;

    #[tokio::test]
    async fn test_dropping_host_hangs_up() {
        let (client, host) = MockHost::connect();
        host.send_raw("last".into());
        drop(host);

        assert_eq!(client.recv().await.unwrap().as_deref(), Some("last"));
        assert_eq!(client.recv().await.unwrap(), None);
        assert!(matches!(
            client.send("lost".into()).await,
            Err(transport::Error::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_host_round_trip() {
        let (client, mut host) = MockHost::connect();
        let pair = HandlePair { callback: Handle(8), error: Handle(9) };
        let envelope = CommandEnvelope::new(pair, "getWordlist", vec![]);
        client.send(envelope.to_json().unwrap()).await.unwrap();

        let received = host.next_envelope().await.unwrap();
        assert_eq!(received, envelope);

        host.reject(&received, json!("no"));
        let frame = client.recv().await.unwrap().unwrap();
        let inbound: Inbound = serde_json::from_str(&frame).unwrap();
        assert_eq!(inbound, Inbound::Dispatch { handle: Handle(9), payload: json!("no") });
    }
}
