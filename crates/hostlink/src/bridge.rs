//! # Host Bridge
//!
//! The single chokepoint every host command flows through, and the pump that
//! routes everything the host sends back.
//!
//! A `Bridge` starts out not ready. Attaching a transport installs it exactly
//! once, spawns the inbound pump and opens the readiness gate; `call` before
//! that point fails immediately with `Error::NotReady`.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::channel::Channel;
use crate::config::BridgeConfig;
use crate::envelope::CommandEnvelope;
use crate::envelope::Inbound;
use crate::event::HostEvent;
use crate::feed::EventFeed;
use crate::feed::FeedSubscription;
use crate::handle::Handle;
use crate::handle::Registry;
use crate::transport;
use crate::transport::Transport;

#[derive(Debug)]
pub enum Error {
    /// No transport has been attached yet.
    NotReady,
    /// A transport was already attached to this bridge.
    AlreadyAttached,
    /// The command envelope could not be serialized.
    Encode(serde_json::Error),
    /// The transport refused the message.
    Transport(transport::Error),
    /// The host dispatched the error handle with this payload.
    Remote(Value),
    /// The transport closed before the host answered.
    Disconnected,
    /// The host's answer did not have the expected shape.
    Decode(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "Host interface is not ready; attach a transport first"),
            Self::AlreadyAttached => write!(f, "A transport is already attached"),
            Self::Encode(e) => write!(f, "Encode error: {}", e),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Remote(payload) => write!(f, "Host rejected command: {}", payload),
            Self::Disconnected => write!(f, "Host disconnected before answering"),
            Self::Decode(e) => write!(f, "Decode error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) | Self::Decode(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type Outcome = std::result::Result<Value, Value>;

struct Inner {
    config: BridgeConfig,
    registry: Registry,
    feed: EventFeed,
    transport: OnceLock<Arc<dyn Transport>>,
    ready: watch::Sender<bool>,
    disconnected: AtomicBool,
}

impl Inner {
    /// Routes one raw frame from the host.
    fn route(&self, frame: &str) {
        match serde_json::from_str::<Inbound>(frame) {
            Ok(Inbound::Dispatch { handle, payload }) => self.registry.dispatch(handle, payload),
            Ok(Inbound::Event { event }) => {
                self.feed.publish(event);
            }
            Err(e) => warn!(error = %e, "undecodable frame from host skipped"),
        }
    }
}

/// Cheaply cloneable handle to one host connection.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    /// Creates a bridge that is not yet attached to a transport.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Registry::new(),
                feed: EventFeed::new(),
                transport: OnceLock::new(),
                ready: watch::Sender::new(false),
                disconnected: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Installs the transport, spawns the inbound pump and opens the readiness gate.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(&self, transport: Box<dyn Transport>) -> Result<()> {
        let transport: Arc<dyn Transport> = Arc::from(transport);
        self.inner
            .transport
            .set(transport.clone())
            .map_err(|_| Error::AlreadyAttached)?;

        tokio::spawn(Self::pump(transport, Arc::downgrade(&self.inner)));

        self.inner.ready.send_replace(true);
        debug!("host bridge attached");
        Ok(())
    }

    /// Whether a transport has been attached.
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Waits until a transport has been attached.
    pub async fn ready(&self) {
        let mut rx = self.inner.ready.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Reads frames until the transport ends, then fails every pending call
    /// and ends every channel.
    async fn pump(transport: Arc<dyn Transport>, inner: Weak<Inner>) {
        loop {
            let frame = match transport.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("host transport closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "host transport failed");
                    break;
                }
            };

            let Some(inner) = inner.upgrade() else { return };
            inner.route(&frame);
        }

        if let Some(inner) = inner.upgrade() {
            inner.disconnected.store(true, Ordering::Release);
            inner.registry.clear();
            inner.feed.close();
        }
    }

    fn transport(&self) -> Result<&Arc<dyn Transport>> {
        if self.inner.disconnected.load(Ordering::Acquire) {
            return Err(Error::Disconnected);
        }
        self.inner.transport.get().ok_or(Error::NotReady)
    }

    /// Issues `command` with positional arguments `inner` and waits for the
    /// host to dispatch one of its handles.
    ///
    /// There is no timeout: if the host never answers, neither does this.
    pub async fn call(&self, command: &str, inner: Vec<Value>) -> Result<Value> {
        let transport = self.transport()?;

        let (tx, rx) = oneshot::channel::<Outcome>();
        let resolve_slot = Arc::new(Mutex::new(Some(tx)));
        let reject_slot = resolve_slot.clone();

        let pair = self.inner.registry.register(
            move |value| settle(&resolve_slot, Ok(value)),
            move |value| settle(&reject_slot, Err(value)),
        );

        let envelope = CommandEnvelope::new(pair, command, inner);
        let message = match envelope.to_json() {
            Ok(message) => message,
            Err(e) => {
                self.inner.registry.discard(pair);
                return Err(Error::Encode(e));
            }
        };

        if let Err(e) = transport.send(message).await {
            self.inner.registry.discard(pair);
            return Err(e.into());
        }
        trace!(command, callback = %pair.callback, "command sent");

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(Error::Remote(payload)),
            Err(_) => Err(Error::Disconnected),
        }
    }

    /// Like `call`, decoding the result into `R`.
    pub async fn call_as<R: DeserializeOwned>(&self, command: &str, inner: Vec<Value>) -> Result<R> {
        let value = self.call(command, inner).await?;
        serde_json::from_value(value).map_err(Error::Decode)
    }

    /// Sends `command` without waiting for, or surfacing, the host's answer.
    pub async fn notify(&self, command: &str, inner: Vec<Value>) -> Result<()> {
        let transport = self.transport()?;
        let pair = self.inner.registry.register(|_| {}, |_| {});

        let envelope = CommandEnvelope::new(pair, command, inner);
        let sent = match envelope.to_json() {
            Ok(message) => transport.send(message).await.map_err(Error::from),
            Err(e) => Err(Error::Encode(e)),
        };
        if sent.is_err() {
            self.inner.registry.discard(pair);
        }
        sent
    }

    /// Entry point for hosts that deliver outcomes in-process.
    pub fn dispatch(&self, handle: Handle, payload: Value) {
        self.inner.registry.dispatch(handle, payload);
    }

    /// Entry point for hosts that push events in-process.
    pub fn publish(&self, event: HostEvent) -> usize {
        self.inner.feed.publish(event)
    }

    pub fn subscribe_events(&self) -> FeedSubscription {
        self.inner.feed.subscribe()
    }

    /// Describes the named host channel. Nothing is sent until it is subscribed.
    pub fn establish_channel(&self, name: impl Into<String>) -> Channel {
        Channel::new(self.clone(), name)
    }

    #[cfg(test)]
    pub(crate) fn live_handles(&self) -> usize {
        self.inner.registry.live_handles()
    }
}

fn settle(slot: &Mutex<Option<oneshot::Sender<Outcome>>>, outcome: Outcome) {
    let tx = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(tx) = tx {
        // The caller may have stopped waiting.
        let _ = tx.send(outcome);
    }
}
