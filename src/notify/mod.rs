//! Notification fan-out.
//!
//! Delivery is best-effort: callers publish after their state write has
//! committed and a failed publish is logged and counted, never returned.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::models::notification::Notification;
use crate::observability::metrics::Metrics;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification sink rejected event: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Publishes each event in order, logging and counting failures.
pub async fn fan_out(sink: &dyn NotificationSink, metrics: &Metrics, events: Vec<Notification>) {
    for event in events {
        let recipient_id = event.recipient_id;
        let kind = event.kind;
        if let Err(err) = sink.publish(event).await {
            metrics.notification_failures_total.inc();
            warn!(
                recipient_id = %recipient_id,
                kind = ?kind,
                error = %err,
                "notification dropped"
            );
        }
    }
}

/// Keeps a bounded feed per recipient and mirrors every event to live subscribers.
pub struct NotificationHub {
    feeds: DashMap<Uuid, Vec<Notification>>,
    feed_limit: usize,
    events_tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(feed_limit: usize, event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        Self {
            feeds: DashMap::new(),
            feed_limit: feed_limit.max(1),
            events_tx,
        }
    }

    /// Retained notifications for `recipient_id`, oldest first.
    pub fn feed(&self, recipient_id: Uuid) -> Vec<Notification> {
        self.feeds
            .get(&recipient_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events_tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for NotificationHub {
    async fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        {
            let mut feed = self.feeds.entry(notification.recipient_id).or_default();
            feed.push(notification.clone());
            let overflow = feed.len().saturating_sub(self.feed_limit);
            if overflow > 0 {
                feed.drain(..overflow);
            }
        }

        // No live subscribers is not a failure; the feed already holds the event.
        let _ = self.events_tx.send(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::{NotificationHub, NotificationSink, NotifyError, fan_out};
    use crate::models::notification::{Notification, NotificationKind, NotificationMetadata};
    use crate::observability::metrics::Metrics;

    fn event(recipient: Uuid, title: &str) -> Notification {
        Notification::new(
            recipient,
            NotificationKind::PickupConfirmed,
            title,
            "body",
            NotificationMetadata {
                order_id: Uuid::new_v4(),
                ..NotificationMetadata::default()
            },
        )
    }

    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NotificationSink for Flaky {
        async fn publish(&self, _notification: Notification) -> Result<(), NotifyError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(NotifyError::Rejected("first call fails".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn feed_keeps_most_recent_events() {
        let hub = NotificationHub::new(2, 16);
        let rider = Uuid::new_v4();

        for title in ["one", "two", "three"] {
            hub.publish(event(rider, title)).await.unwrap();
        }

        let titles: Vec<String> = hub.feed(rider).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["two", "three"]);
        assert!(hub.feed(Uuid::new_v4()).is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = NotificationHub::new(10, 16);
        let mut rx = hub.subscribe();
        let vendor = Uuid::new_v4();

        hub.publish(event(vendor, "hello")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.recipient_id, vendor);
        assert_eq!(received.title, "hello");
    }

    #[tokio::test]
    async fn fan_out_continues_past_failures() {
        let sink = Flaky {
            calls: AtomicUsize::new(0),
        };
        let metrics = Metrics::new();
        let rider = Uuid::new_v4();

        fan_out(&sink, &metrics, vec![event(rider, "a"), event(rider, "b")]).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.notification_failures_total.get(), 1);
    }
}
