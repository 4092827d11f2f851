//! Topic subscriptions derived from the visible content set
//!
//! The UI hands over an immutable [`VisibleSet`] whenever the feed or the
//! open thread changes. The manager diffs consecutive sets into topic
//! operations and entity evictions, and tracks the connection lifecycle:
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected
//! ```
//!
//! Topic operations are only produced while connected. On (re)connect the
//! full desired set is subscribed again, and after a gap every visible
//! entity is scheduled for a forced refresh.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use engage_core::{EntityId, EntityKind, Topic, UserId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// The comment thread currently open in the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenThread {
    pub post_id: EntityId,
    pub comments: BTreeSet<EntityId>,
}

/// Everything currently on screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleSet {
    pub feed: BTreeSet<EntityId>,
    pub thread: Option<OpenThread>,
}

impl VisibleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set showing these feed posts and no thread
    pub fn feed<I, T>(posts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityId>,
    {
        Self {
            feed: posts.into_iter().map(Into::into).collect(),
            thread: None,
        }
    }

    /// Open a comment thread alongside the feed
    pub fn with_thread<I, T>(mut self, post_id: impl Into<EntityId>, comments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityId>,
    {
        self.thread = Some(OpenThread {
            post_id: post_id.into(),
            comments: comments.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// All visible entities with their kinds
    pub fn entities(&self) -> BTreeMap<EntityId, EntityKind> {
        let mut entities: BTreeMap<EntityId, EntityKind> = self
            .feed
            .iter()
            .map(|id| (id.clone(), EntityKind::Post))
            .collect();
        if let Some(thread) = &self.thread {
            entities.insert(thread.post_id.clone(), EntityKind::Post);
            for comment in &thread.comments {
                entities.insert(comment.clone(), EntityKind::Comment);
            }
        }
        entities
    }

    /// Topics needed to keep this set live for a user
    pub fn topics(&self, local_user: &UserId) -> BTreeSet<Topic> {
        let mut topics: BTreeSet<Topic> = self.feed.iter().cloned().map(Topic::Post).collect();
        if let Some(thread) = &self.thread {
            topics.insert(Topic::Post(thread.post_id.clone()));
            topics.insert(Topic::Thread(thread.post_id.clone()));
        }
        topics.insert(Topic::User(local_user.clone()));
        topics
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty() && self.thread.is_none()
    }
}

/// Transport lifecycle as seen by the manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Connectivity signal published to observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ConnectivityState {
    /// No transport, or the engine stopped
    #[default]
    Offline,
    /// First connection attempt in progress
    Connecting,
    Online,
    /// Lost the connection, retrying
    Reconnecting { attempt: u32 },
    /// Repeated connect failures; local actions keep working
    Degraded { attempt: u32 },
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

/// Result of handing over a new visible set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    pub subscribe: Vec<Topic>,
    pub unsubscribe: Vec<Topic>,
    /// Newly visible entities, to be initialized from a snapshot
    pub added: Vec<(EntityId, EntityKind)>,
    /// Entities no longer visible, to be dropped from the store
    pub evicted: Vec<EntityId>,
}

impl SubscriptionDelta {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty()
            && self.unsubscribe.is_empty()
            && self.added.is_empty()
            && self.evicted.is_empty()
    }
}

/// Work to do once a connection is established
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncPlan {
    pub subscribe: Vec<Topic>,
    /// Entities needing a forced snapshot refresh
    pub refresh: Vec<(EntityId, EntityKind)>,
    /// Whether this connection follows a gap in the event stream
    pub after_gap: bool,
}

/// Tracks desired and active topics across connection cycles
#[derive(Debug)]
pub struct SubscriptionManager {
    local_user: UserId,
    visible: VisibleSet,
    /// Entities of `visible`, kept alongside it
    entities: BTreeMap<EntityId, EntityKind>,
    state: ConnectionState,
    subscribed: BTreeSet<Topic>,
    /// Events may have been missed since the last connection
    gap: bool,
    failures: u32,
    degraded_after: u32,
}

impl SubscriptionManager {
    pub fn new(local_user: UserId, degraded_after: u32) -> Self {
        Self {
            local_user,
            visible: VisibleSet::default(),
            entities: BTreeMap::new(),
            state: ConnectionState::Disconnected,
            subscribed: BTreeSet::new(),
            gap: false,
            failures: 0,
            degraded_after: degraded_after.max(1),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn visible(&self) -> &VisibleSet {
        &self.visible
    }

    pub fn is_visible(&self, entity_id: &EntityId) -> bool {
        self.entities.contains_key(entity_id)
    }

    /// Visible entities with their kinds
    pub fn visible_entities(&self) -> Vec<(EntityId, EntityKind)> {
        self.entities
            .iter()
            .map(|(id, kind)| (id.clone(), *kind))
            .collect()
    }

    /// Topics the current visible set needs
    pub fn desired_topics(&self) -> BTreeSet<Topic> {
        self.visible.topics(&self.local_user)
    }

    /// Topics currently subscribed on the live connection
    pub fn subscribed_topics(&self) -> &BTreeSet<Topic> {
        &self.subscribed
    }

    /// Replace the visible set and diff it against the previous one
    pub fn set_visible(&mut self, next: VisibleSet) -> SubscriptionDelta {
        let after = next.entities();
        let before = std::mem::replace(&mut self.entities, after.clone());
        self.visible = next;

        let added = after
            .iter()
            .filter(|(id, _)| !before.contains_key(*id))
            .map(|(id, kind)| (id.clone(), *kind))
            .collect();
        let evicted = before
            .keys()
            .filter(|id| !after.contains_key(*id))
            .cloned()
            .collect();

        let mut delta = SubscriptionDelta {
            added,
            evicted,
            ..Default::default()
        };

        if self.state == ConnectionState::Connected {
            let desired = self.desired_topics();
            delta.subscribe = desired.difference(&self.subscribed).cloned().collect();
            delta.unsubscribe = self.subscribed.difference(&desired).cloned().collect();
            self.subscribed = desired;
        }

        debug!(
            added = delta.added.len(),
            evicted = delta.evicted.len(),
            subscribe = delta.subscribe.len(),
            unsubscribe = delta.unsubscribe.len(),
            "visible set updated"
        );
        delta
    }

    /// A connect attempt is starting
    pub fn on_connecting(&mut self) -> ConnectivityState {
        self.state = ConnectionState::Connecting;
        self.connectivity()
    }

    /// The transport connected; subscribe everything again
    pub fn on_connected(&mut self) -> ResyncPlan {
        let after_gap = self.gap || self.failures > 0;
        self.state = ConnectionState::Connected;
        self.failures = 0;
        self.gap = false;
        self.subscribed = self.desired_topics();

        let refresh = if after_gap {
            self.visible_entities()
        } else {
            Vec::new()
        };
        info!(
            topics = self.subscribed.len(),
            after_gap,
            refresh = refresh.len(),
            "connected"
        );

        ResyncPlan {
            subscribe: self.subscribed.iter().cloned().collect(),
            refresh,
            after_gap,
        }
    }

    /// The connection dropped
    pub fn on_disconnected(&mut self) -> ConnectivityState {
        if self.state == ConnectionState::Connected {
            self.gap = true;
        }
        self.state = ConnectionState::Disconnected;
        self.subscribed.clear();
        self.connectivity()
    }

    /// A connect attempt failed
    pub fn on_connect_failed(&mut self) -> ConnectivityState {
        self.failures = self.failures.saturating_add(1);
        self.state = ConnectionState::Disconnected;
        self.subscribed.clear();
        let state = self.connectivity();
        if matches!(state, ConnectivityState::Degraded { .. }) {
            warn!(attempt = self.failures, "connectivity degraded");
        }
        state
    }

    /// Current connectivity signal
    pub fn connectivity(&self) -> ConnectivityState {
        match self.state {
            ConnectionState::Connected => ConnectivityState::Online,
            _ if self.failures >= self.degraded_after => ConnectivityState::Degraded {
                attempt: self.failures,
            },
            _ if self.gap || self.failures > 0 => ConnectivityState::Reconnecting {
                attempt: self.failures + 1,
            },
            ConnectionState::Connecting => ConnectivityState::Connecting,
            ConnectionState::Disconnected => ConnectivityState::Offline,
        }
    }
}

/// Exponential reconnect backoff with a cap and random jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay before the next attempt: `base * 2^failures`, capped
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.failures.min(16));
        let mut delay = self.base.saturating_mul(factor).min(self.max);
        if self.jitter > 0.0 {
            let extra = rand::rng().random_range(0.0..=self.jitter);
            delay = delay.mul_f64(1.0 + extra).min(self.max);
        }
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
