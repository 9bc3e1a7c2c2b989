//! # Event Feed
//!
//! Multicast source for host-pushed events. Every open attempt and every open
//! channel holds its own subscription and filters the same stream; receiving
//! never consumes an event on behalf of another subscriber.
//!
//! Each subscriber owns an unbounded queue, so a burst is never dropped, only
//! queued. Subscribers that went away are pruned on the next publish. Closing
//! the feed ends every subscription, present and future.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::trace;

use crate::event::HostEvent;

/// `None` once the feed is closed.
type Observers = Option<Vec<mpsc::UnboundedSender<HostEvent>>>;

/// Observer list fan-out of `HostEvent`s.
pub struct EventFeed {
    observers: Mutex<Observers>,
}

impl EventFeed {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Some(Vec::new())),
        }
    }

    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers `event` to every live subscriber and returns how many there were.
    pub fn publish(&self, event: HostEvent) -> usize {
        let mut observers = self.observers();
        let Some(list) = observers.as_mut() else {
            trace!("host event dropped, feed closed");
            return 0;
        };

        let before = list.len();
        list.retain(|tx| tx.send(event.clone()).is_ok());
        if list.len() < before {
            trace!(pruned = before - list.len(), "dropped feed subscribers pruned");
        }
        trace!(receivers = list.len(), "host event published");
        list.len()
    }

    /// Attaches a new subscriber. Only events published afterwards are seen.
    ///
    /// Subscribing to a closed feed yields a subscription that has already ended.
    pub fn subscribe(&self) -> FeedSubscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        if let Some(list) = self.observers().as_mut() {
            list.push(tx);
        }
        FeedSubscription { receiver }
    }

    /// Ends every subscription once its queued events are drained.
    pub fn close(&self) {
        if let Some(list) = self.observers().take() {
            debug!(subscribers = list.len(), "event feed closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.observers().is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers()
            .as_mut()
            .map_or(0, |list| {
                list.retain(|tx| !tx.is_closed());
                list.len()
            })
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of the feed.
pub struct FeedSubscription {
    receiver: mpsc::UnboundedReceiver<HostEvent>,
}

impl FeedSubscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the feed is closed and everything queued was read.
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<HostEvent> {
        self.receiver.recv().await
    }

    /// Receives the next event accepted by `predicate`, skipping the rest.
    ///
    /// Cancel safe: dropping the future loses only events already rejected.
    pub async fn recv_matching<F>(&mut self, mut predicate: F) -> Option<HostEvent>
    where
        F: FnMut(&HostEvent) -> bool,
    {
        loop {
            let event = self.recv().await?;
            if predicate(&event) {
                return Some(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::*;
    use crate::event::ChannelId;
    use crate::event::Token;

    fn close(id: u32) -> HostEvent {
        HostEvent::Close { channel_id: ChannelId(json!([id])) }
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_event() {
        let feed = EventFeed::new();
        let mut a = feed.subscribe();
        let mut b = feed.subscribe();

        assert_eq!(feed.publish(close(1)), 2);
        assert_eq!(feed.publish(close(2)), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await, Some(close(1)));
            assert_eq!(sub.recv().await, Some(close(2)));
        }
    }

    #[tokio::test]
    async fn test_burst_is_queued_not_dropped() {
        let feed = EventFeed::new();
        let mut slow = feed.subscribe();

        for n in 0..5000 {
            feed.publish(close(n));
        }
        for n in 0..5000 {
            assert_eq!(slow.recv().await, Some(close(n)));
        }
    }

    #[tokio::test]
    async fn test_filtering_does_not_consume_for_others() {
        let feed = EventFeed::new();
        let mut picky = feed.subscribe();
        let mut everything = feed.subscribe();

        feed.publish(close(1));
        feed.publish(HostEvent::Accept { token: Token(5), accept_id: ChannelId(json!([5])) });

        let accepted = picky
            .recv_matching(|e| matches!(e, HostEvent::Accept { token: Token(5), .. }))
            .await;
        assert!(matches!(accepted, Some(HostEvent::Accept { .. })));

        assert_eq!(everything.recv().await, Some(close(1)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let feed = EventFeed::new();
        assert_eq!(feed.publish(close(1)), 0);
        assert_eq!(feed.subscriber_count(), 0);

        let mut late = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        let nothing = timeout(Duration::from_millis(20), late.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let feed = EventFeed::new();
        let keep = feed.subscribe();
        drop(feed.subscribe());

        assert_eq!(feed.publish(close(1)), 1);
        assert_eq!(feed.subscriber_count(), 1);
        drop(keep);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let feed = EventFeed::new();
        let mut sub = feed.subscribe();
        feed.publish(close(1));
        feed.close();

        assert!(feed.is_closed());
        assert_eq!(feed.publish(close(2)), 0);
        assert_eq!(sub.recv().await, Some(close(1)));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscribe_after_close_has_ended() {
        let feed = EventFeed::new();
        feed.close();
        let mut late = feed.subscribe();
        assert_eq!(late.recv().await, None);
    }
}
