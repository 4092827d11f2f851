//! Mock push transport for testing
//!
//! Provides an in-memory [`EventTransport`] so the synchronizer can be
//! exercised without a real push service. Tests publish frames, drop the
//! connection, and script connect failures.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use engage_core::{MockTransport, Topic, EntityId};
//!
//! let transport = MockTransport::new();
//! let mut frames = transport.connect().await?;
//! transport.subscribe(&Topic::Post(EntityId::new("p1"))).await?;
//!
//! transport.publish_json("post-p1", "POST-DELETED", serde_json::json!({ "id": "p1" }));
//! let frame = frames.recv().await.unwrap();
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::topic::Topic;
use crate::transport::{EventTransport, TransportFrame};

/// An in-memory push transport
///
/// Frames published on a topic are delivered only while connected and
/// subscribed to that topic. Dropping the connection clears all
/// subscriptions, like a real push service does.
pub struct MockTransport {
    /// Sender half of the live connection, if any
    connection: Mutex<Option<mpsc::Sender<TransportFrame>>>,
    /// Topic names subscribed on the live connection
    subscribed: DashSet<String>,
    /// Number of upcoming `connect` calls that should fail
    pending_failures: AtomicU32,
    /// Total successful connects
    connects: AtomicU32,
    /// Channel buffer size per connection
    buffer_size: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a disconnected mock transport
    pub fn new() -> Self {
        Self::with_buffer_size(1024)
    }

    /// Create a mock transport with a specific per-connection buffer size
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            connection: Mutex::new(None),
            subscribed: DashSet::new(),
            pending_failures: AtomicU32::new(0),
            connects: AtomicU32::new(0),
            buffer_size,
        }
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<TransportFrame>>> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `count` connect attempts fail
    pub fn fail_next_connects(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.connection()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Whether the live connection is subscribed to a topic
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.subscribed.contains(&topic.name())
    }

    /// All subscribed topic names, sorted
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscribed.iter().map(|t| t.key().clone()).collect();
        topics.sort();
        topics
    }

    /// Simulate the server closing the connection
    pub fn drop_connection(&self) {
        self.connection().take();
        self.subscribed.clear();
    }

    /// Publish a frame; returns whether it was delivered
    pub fn publish(&self, frame: TransportFrame) -> bool {
        if !self.subscribed.contains(&frame.topic) {
            return false;
        }
        match self.connection().as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Publish a JSON payload on a topic name
    pub fn publish_json(&self, topic: &str, event: &str, payload: serde_json::Value) -> bool {
        self.publish(TransportFrame::json(topic, event, payload))
    }
}

#[async_trait]
impl EventTransport for MockTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<TransportFrame>, TransportError> {
        let failures = self.pending_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.pending_failures.store(failures - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectionFailed("scripted failure".into()));
        }

        let (tx, rx) = mpsc::channel(self.buffer_size);
        *self.connection() = Some(tx);
        self.subscribed.clear();
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn subscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.subscribed.insert(topic.name());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        self.subscribed.remove(&topic.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityId;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_requires_subscription() {
        let transport = MockTransport::new();
        let mut frames = transport.connect().await.unwrap();
        let topic = Topic::Post(EntityId::new("p1"));

        assert!(!transport.publish_json("post-p1", "POST-DELETED", json!({ "id": "p1" })));

        transport.subscribe(&topic).await.unwrap();
        assert!(transport.publish_json("post-p1", "POST-DELETED", json!({ "id": "p1" })));

        let frame = frames.recv().await.unwrap();
        assert_eq!(frame.topic, "post-p1");
        assert_eq!(frame.event, "POST-DELETED");
    }

    #[tokio::test]
    async fn test_drop_connection_ends_stream() {
        let transport = MockTransport::new();
        let mut frames = transport.connect().await.unwrap();
        transport
            .subscribe(&Topic::Post(EntityId::new("p1")))
            .await
            .unwrap();

        transport.drop_connection();
        assert!(frames.recv().await.is_none());
        assert!(!transport.is_connected());
        assert!(transport.subscribed_topics().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_connect_failures() {
        let transport = MockTransport::new();
        transport.fail_next_connects(2);

        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let transport = MockTransport::new();
        let result = transport.subscribe(&Topic::Post(EntityId::new("p1"))).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
