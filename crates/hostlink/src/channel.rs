//! # Host Channels
//!
//! Long-lived, host-initiated push streams multiplexed over the command
//! transport.
//!
//! A `Channel` is a cold description: nothing happens until it is subscribed.
//! Every `subscribe` runs a fresh open handshake with a new token:
//!
//! ```text
//! Opening --accept(token)--> Open --close(id)--> Closed
//!    |                        |
//!    +--timeout / rejected--> Closed <--unsubscribe (sends closeChannel)
//!    |                        |
//!    +-----host hung up-----> Closed
//! ```
//!
//! While `Open`, `message` events carrying the bound id are forwarded in
//! delivery order. Events for other ids or tokens are ignored.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use futures::Stream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::bridge;
use crate::bridge::Bridge;
use crate::event::ChannelId;
use crate::event::HostEvent;
use crate::event::ResolverRef;
use crate::event::Token;
use crate::feed::FeedSubscription;

pub const ESTABLISH_CHANNEL: &str = "establishChannel";
pub const CLOSE_CHANNEL: &str = "closeChannel";
pub const RESOLVE: &str = "resolve";

/// Channel the host pushes window state changes on.
pub const WINDOW_EVENTS: &str = "window-events";
/// Channel the host pushes the requested open location on.
pub const UI_EVENTS: &str = "ui-events";

#[derive(Debug)]
pub enum Error {
    /// No matching `accept` arrived in time.
    Timeout(Duration),
    /// The `establishChannel` command failed.
    Bridge(bridge::Error),
    /// A pushed value did not have the subscriber's expected shape.
    Decode(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(after) => write!(f, "Channel was not accepted within {:?}", after),
            Self::Bridge(e) => write!(f, "Channel could not be established: {}", e),
            Self::Decode(e) => write!(f, "Channel message decode error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout(_) => None,
            Self::Bridge(e) => Some(e),
            Self::Decode(e) => Some(e),
        }
    }
}

impl From<bridge::Error> for Error {
    fn from(e: bridge::Error) -> Self {
        Self::Bridge(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub enum ChannelState {
    /// Token issued, waiting for the host to accept.
    Opening,
    /// Bound to a host channel id.
    Open(ChannelId),
    /// Terminal.
    Closed,
}

/// A named host channel that has not been subscribed to yet.
#[derive(Clone)]
pub struct Channel {
    bridge: Bridge,
    name: String,
}

impl Channel {
    pub fn new(bridge: Bridge, name: impl Into<String>) -> Self {
        Self {
            bridge,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts an open handshake and returns the stream it feeds.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self) -> Subscription {
        let token = Token::random();
        let deadline = Instant::now() + self.bridge.config().handshake_timeout;
        // Listen before asking, so an immediate accept cannot be missed.
        let events = self.bridge.subscribe_events();
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Opening);

        let driver = Driver {
            bridge: self.bridge.clone(),
            name: self.name.clone(),
            token,
            deadline,
            events,
            tx,
            state: state_tx,
        };
        tokio::spawn(driver.run());

        Subscription {
            name: self.name.clone(),
            token,
            rx,
            state: state_rx,
        }
    }
}

/// Runs one subscription's state machine.
struct Driver {
    bridge: Bridge,
    name: String,
    token: Token,
    deadline: Instant,
    events: FeedSubscription,
    tx: mpsc::UnboundedSender<Result<Value>>,
    state: watch::Sender<ChannelState>,
}

impl Driver {
    async fn run(mut self) {
        if let Some(channel_id) = self.open().await {
            self.state.send_replace(ChannelState::Open(channel_id.clone()));
            debug!(channel = %self.name, id = %channel_id, "channel open");
            self.forward(channel_id).await;
        }
        self.state.send_replace(ChannelState::Closed);
    }

    /// Waits for the accept carrying our token.
    async fn open(&mut self) -> Option<ChannelId> {
        debug!(channel = %self.name, token = %self.token, "opening channel");
        let token = self.token;
        let accepts_token = move |e: &HostEvent| matches!(e, HostEvent::Accept { token: t, .. } if *t == token);

        let bridge = self.bridge.clone();
        let establish = bridge.call(ESTABLISH_CHANNEL, vec![json!(self.name), json!(self.token)]);
        tokio::pin!(establish);
        let mut established = false;

        let deadline = tokio::time::sleep_until(self.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = self.tx.closed() => {
                    debug!(channel = %self.name, "unsubscribed while opening");
                    return None;
                }
                event = self.events.recv_matching(accepts_token) => {
                    let Some(HostEvent::Accept { accept_id, .. }) = event else {
                        self.hang_up();
                        return None;
                    };
                    return Some(accept_id);
                }
                result = &mut establish, if !established => {
                    established = true;
                    if let Err(e) = result {
                        warn!(channel = %self.name, error = %e, "establishChannel failed");
                        let _ = self.tx.send(Err(Error::Bridge(e)));
                        return None;
                    }
                }
                _ = &mut deadline => {
                    let after = self.bridge.config().handshake_timeout;
                    warn!(channel = %self.name, token = %self.token, ?after, "channel handshake timed out");
                    let _ = self.tx.send(Err(Error::Timeout(after)));
                    return None;
                }
            }
        }
    }

    /// Forwards messages for `channel_id` until either side closes.
    async fn forward(&mut self, channel_id: ChannelId) {
        loop {
            tokio::select! {
                biased;

                _ = self.tx.closed() => {
                    self.close_remote(&channel_id).await;
                    return;
                }
                event = self.events.recv_matching(|e| e.channel_id() == Some(&channel_id)) => match event {
                    Some(HostEvent::Message { data, resolver, .. }) => {
                        if self.tx.send(Ok(data)).is_err() {
                            self.close_remote(&channel_id).await;
                            return;
                        }
                        if let Some(resolver) = resolver {
                            self.acknowledge(resolver).await;
                        }
                    }
                    Some(HostEvent::Close { .. }) => {
                        debug!(channel = %self.name, id = %channel_id, "channel closed by host");
                        return;
                    }
                    Some(_) => {}
                    None => {
                        self.hang_up();
                        return;
                    }
                },
            }
        }
    }

    /// The feed only ends when the host connection is gone.
    fn hang_up(&self) {
        debug!(channel = %self.name, "host disconnected, ending channel");
        let _ = self.tx.send(Err(Error::Bridge(bridge::Error::Disconnected)));
    }

    async fn acknowledge(&self, resolver: ResolverRef) {
        if let Err(e) = self.bridge.notify(RESOLVE, vec![json!(resolver), json!(true)]).await {
            debug!(channel = %self.name, error = %e, "acknowledgment not delivered");
        }
    }

    async fn close_remote(&self, channel_id: &ChannelId) {
        debug!(channel = %self.name, id = %channel_id, "unsubscribed, closing channel");
        if let Err(e) = self.bridge.notify(CLOSE_CHANNEL, vec![json!(channel_id)]).await {
            debug!(channel = %self.name, error = %e, "closeChannel not delivered");
        }
    }
}

/// The caller's end of one open attempt.
///
/// Yields `Ok(data)` per message, at most one `Err` (after which it ends),
/// and ends normally when the host closes the channel. If the host hangs up
/// the last item is `Err(Error::Bridge(Disconnected))`. Dropping it
/// unsubscribes; if a channel id was bound the host is told with `closeChannel`.
pub struct Subscription {
    name: String,
    token: Token,
    rx: mpsc::UnboundedReceiver<Result<Value>>,
    state: watch::Receiver<ChannelState>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        match &*self.state.borrow() {
            ChannelState::Open(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Waits until the handshake finishes; returns the bound id if it succeeded.
    pub async fn opened(&mut self) -> Option<ChannelId> {
        let state = self
            .state
            .wait_for(|s| !matches!(s, ChannelState::Opening))
            .await
            .ok()?;
        match &*state {
            ChannelState::Open(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Next item, or `None` once the stream has completed.
    pub async fn recv(&mut self) -> Option<Result<Value>> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}

    /// Decodes every message into `T`.
    pub fn typed<T: DeserializeOwned>(self) -> Typed<T> {
        Typed {
            inner: Some(self),
            _marker: PhantomData,
        }
    }
}

impl Stream for Subscription {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A `Subscription` whose messages are decoded into `T`.
///
/// A message that fails to decode is yielded as `Error::Decode` and ends the
/// stream, unsubscribing from the host.
pub struct Typed<T> {
    inner: Option<Subscription>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Typed<T> {
    pub fn state(&self) -> ChannelState {
        self.inner.as_ref().map_or(ChannelState::Closed, Subscription::state)
    }

    pub async fn opened(&mut self) -> Option<ChannelId> {
        self.inner.as_mut()?.opened().await
    }

    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.next().await
    }
}

impl<T: DeserializeOwned> Stream for Typed<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };

        let value = match inner.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(value))) => value,
            Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => return Poll::Pending,
        };

        match serde_json::from_value(value) {
            Ok(item) => Poll::Ready(Some(Ok(item))),
            Err(e) => {
                self.inner = None;
                Poll::Ready(Some(Err(Error::Decode(e))))
            }
        }
    }
}
