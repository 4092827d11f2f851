//! The engagement engine: a single writer task and its handle
//!
//! All engagement state (store, optimistic tracker, subscription state) is
//! owned by one writer task. Everything else talks to it by enqueueing a
//! command: UI actions through [`EngagementEngine`], decoded push events
//! from the connection driver, and results of snapshot fetches, mutation
//! requests and confirmation timers from short-lived spawned tasks. The
//! writer never awaits I/O itself.

use std::sync::Arc;

use engage_core::{
    EngagementEvent, EngagementRecord, EntityId, EntityKind, EventKind, EventTransport,
    MutationEndpoint, MutationError, MutationRequest, RecordChange, SnapshotError,
    SnapshotProvider, TransportError, UserId,
};
use engage_logging::UserContextGuard;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::EngineConfig;
use crate::connection::{ConnectionDriver, DriverCommand};
use crate::error::{SyncError, SyncResult};
use crate::notification::{Notification, NotificationDispatcher};
use crate::optimistic::{
    BeginOutcome, MutationId, MutationOutcome, OptimisticMutationTracker, ResponseAction,
    TimeoutAction,
};
use crate::reconciler::{EventReconciler, Snapshot, SnapshotEntry};
use crate::store::EngagementStore;
use crate::subscription::{Backoff, ConnectivityState, SubscriptionManager, VisibleSet};

/// Connection lifecycle reported by the driver
#[derive(Debug)]
pub(crate) enum ConnectionSignal {
    Connecting,
    Connected,
    ConnectFailed(TransportError),
    Disconnected,
}

/// Messages processed by the writer, in arrival order
pub(crate) enum Command {
    SetLiked {
        entity_id: EntityId,
        kind: EntityKind,
        /// `None` toggles the current membership
        liked: Option<bool>,
        reply: oneshot::Sender<SyncResult<MutationTicket>>,
    },
    ToggleBookmark {
        entity_id: EntityId,
        kind: EntityKind,
        reply: oneshot::Sender<EngagementRecord>,
    },
    Record {
        entity_id: EntityId,
        reply: oneshot::Sender<Option<EngagementRecord>>,
    },
    SetVisible(VisibleSet),
    Refresh,
    Event(EngagementEvent),
    SnapshotLoaded(Snapshot),
    SnapshotFailed {
        error: SnapshotError,
        requested: usize,
    },
    MutationResponse {
        id: MutationId,
        result: Result<(), MutationError>,
    },
    ConfirmTimeout {
        id: MutationId,
    },
    Connection(ConnectionSignal),
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// External collaborators of the engine
#[derive(Clone)]
pub struct Collaborators {
    /// Push transport; without one the engine runs offline
    pub transport: Option<Arc<dyn EventTransport>>,
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub mutations: Arc<dyn MutationEndpoint>,
}

impl Collaborators {
    pub fn new(snapshots: Arc<dyn SnapshotProvider>, mutations: Arc<dyn MutationEndpoint>) -> Self {
        Self {
            transport: None,
            snapshots,
            mutations,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

/// Handle to an optimistic like/unlike issued through the engine
#[derive(Debug)]
pub struct MutationTicket {
    pub id: MutationId,
    /// Record right after the optimistic apply
    pub record: EngagementRecord,
    outcome: oneshot::Receiver<MutationOutcome>,
}

impl MutationTicket {
    /// Wait for the mutation to settle
    pub async fn outcome(self) -> SyncResult<MutationOutcome> {
        Ok(self.outcome.await?)
    }
}

/// Cloneable handle to a running engine
#[derive(Clone)]
pub struct EngagementEngine {
    local_user: UserId,
    commands: mpsc::UnboundedSender<Command>,
    changes: broadcast::Sender<RecordChange>,
    notifications: broadcast::Sender<Notification>,
    connectivity: watch::Receiver<ConnectivityState>,
}

impl EngagementEngine {
    /// Start the writer task (and the connection driver, if a transport is given)
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: EngineConfig, local_user: UserId, collaborators: Collaborators) -> Self {
        // Task spans are created here and pick up the user context
        let _context = UserContextGuard::new(&local_user);
        let (commands, receiver) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(config.change_capacity.max(1));
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        let (connectivity_tx, connectivity) = watch::channel(ConnectivityState::Offline);

        let driver = collaborators.transport.map(|transport| {
            let (driver_tx, driver_rx) = mpsc::unbounded_channel();
            let backoff = Backoff::new(config.backoff_base, config.backoff_max, config.backoff_jitter);
            let driver = ConnectionDriver::new(transport, commands.downgrade(), driver_rx, backoff);
            tokio::spawn(driver.run());
            driver_tx
        });

        let writer = Writer {
            store: EngagementStore::with_sender(changes.clone()),
            tracker: OptimisticMutationTracker::new(local_user.clone(), config.confirm_window),
            reconciler: EventReconciler::new(local_user.clone()),
            dispatcher: NotificationDispatcher::new(local_user.clone()),
            subscriptions: SubscriptionManager::new(local_user.clone(), config.degraded_after),
            commands: receiver,
            loopback: commands.downgrade(),
            driver,
            snapshots: collaborators.snapshots,
            mutations: collaborators.mutations,
            notifications: notifications.clone(),
            connectivity: connectivity_tx,
            config,
        };
        tokio::spawn(writer.run());

        Self {
            local_user,
            commands,
            changes,
            notifications,
            connectivity,
        }
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Flip the like membership of an entity
    ///
    /// The optimistic change is applied before this returns.
    pub async fn toggle_like(&self, entity_id: impl Into<EntityId>, kind: EntityKind) -> SyncResult<MutationTicket> {
        self.like_action(entity_id.into(), kind, None).await
    }

    /// Move the like membership of an entity to `liked`
    pub async fn set_liked(
        &self,
        entity_id: impl Into<EntityId>,
        kind: EntityKind,
        liked: bool,
    ) -> SyncResult<MutationTicket> {
        self.like_action(entity_id.into(), kind, Some(liked)).await
    }

    async fn like_action(&self, entity_id: EntityId, kind: EntityKind, liked: Option<bool>) -> SyncResult<MutationTicket> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::SetLiked {
            entity_id,
            kind,
            liked,
            reply,
        })?;
        rx.await?
    }

    /// Flip the local bookmark flag; never touches the network
    pub async fn toggle_bookmark(&self, entity_id: impl Into<EntityId>, kind: EntityKind) -> SyncResult<EngagementRecord> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::ToggleBookmark {
            entity_id: entity_id.into(),
            kind,
            reply,
        })?;
        Ok(rx.await?)
    }

    /// Current record for an entity
    ///
    /// Replies after every command enqueued before it has been processed.
    pub async fn record(&self, entity_id: impl Into<EntityId>) -> SyncResult<Option<EngagementRecord>> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Record {
            entity_id: entity_id.into(),
            reply,
        })?;
        Ok(rx.await?)
    }

    /// Hand over the set of entities currently on screen
    pub fn set_visible(&self, visible: VisibleSet) -> SyncResult<()> {
        Ok(self.commands.send(Command::SetVisible(visible))?)
    }

    /// Force a snapshot refresh of every visible entity
    pub fn refresh(&self) -> SyncResult<()> {
        Ok(self.commands.send(Command::Refresh)?)
    }

    /// Feed a push event received outside the engine's own transport
    pub fn ingest_event(&self, event: EngagementEvent) -> SyncResult<()> {
        Ok(self.commands.send(Command::Event(event))?)
    }

    /// Subscribe to record changes
    pub fn changes(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }

    /// Subscribe to user-facing notifications
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Watch the connectivity signal
    pub fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.connectivity.clone()
    }

    /// Stop the writer and the connection driver
    pub async fn shutdown(&self) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Shutdown { reply })?;
        Ok(rx.await?)
    }
}

/// Owner of all engagement state
struct Writer {
    config: EngineConfig,
    store: EngagementStore,
    tracker: OptimisticMutationTracker,
    reconciler: EventReconciler,
    dispatcher: NotificationDispatcher,
    subscriptions: SubscriptionManager,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Sender for spawned tasks; does not keep the engine alive
    loopback: mpsc::WeakUnboundedSender<Command>,
    driver: Option<mpsc::UnboundedSender<DriverCommand>>,
    snapshots: Arc<dyn SnapshotProvider>,
    mutations: Arc<dyn MutationEndpoint>,
    notifications: broadcast::Sender<Notification>,
    connectivity: watch::Sender<ConnectivityState>,
}

impl Writer {
    #[instrument(name = "engagement_writer", skip_all)]
    async fn run(mut self) {
        info!(
            user = %self.reconciler.local_user(),
            preset = ?self.config.preset,
            "engagement engine started"
        );
        let mut shutdown_reply = None;

        while let Some(command) = self.commands.recv().await {
            if let Command::Shutdown { reply } = command {
                shutdown_reply = Some(reply);
                break;
            }
            self.handle(command);
        }

        if let Some(driver) = self.driver.take() {
            let _ = driver.send(DriverCommand::Shutdown);
        }
        self.connectivity.send_replace(ConnectivityState::Offline);
        info!(records = self.store.len(), "engagement engine stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetLiked {
                entity_id,
                kind,
                liked,
                reply,
            } => {
                let _ = reply.send(self.like_action(entity_id, kind, liked));
            }
            Command::ToggleBookmark { entity_id, kind, reply } => {
                let record = self
                    .store
                    .upsert(&entity_id, kind, |r| r.bookmarked_by_me = !r.bookmarked_by_me);
                debug!(entity = %entity_id.short_id(), bookmarked = record.bookmarked_by_me, "bookmark toggled");
                let _ = reply.send(record);
            }
            Command::Record { entity_id, reply } => {
                let _ = reply.send(self.store.get(&entity_id).cloned());
            }
            Command::SetVisible(visible) => self.set_visible(visible),
            Command::Refresh => {
                let entities = self.subscriptions.visible_entities();
                self.request_snapshot(entities, true);
            }
            Command::Event(event) => self.handle_event(event),
            Command::SnapshotLoaded(mut snapshot) => {
                snapshot
                    .entries
                    .retain(|entry| self.is_tracked(&entry.entity_id));
                self.reconciler
                    .apply_snapshot(&mut self.store, &self.tracker, &snapshot);
            }
            Command::SnapshotFailed { error, requested } => {
                warn!(%error, requested, "snapshot fetch failed");
            }
            Command::MutationResponse { id, result } => self.handle_response(id, result),
            Command::ConfirmTimeout { id } => {
                if let TimeoutAction::Compensate { id, request } =
                    self.tracker.on_timeout(&mut self.store, id, Instant::now())
                {
                    self.send_mutation(id, request);
                }
            }
            Command::Connection(signal) => self.handle_connection(signal),
            // Handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn like_action(&mut self, entity_id: EntityId, kind: EntityKind, liked: Option<bool>) -> SyncResult<MutationTicket> {
        let current = self.store.get(&entity_id);
        let kind = current.map_or(kind, |r| r.kind);
        let want = liked.unwrap_or_else(|| !current.is_some_and(|r| r.liked_by_me));

        let (waiter, outcome) = oneshot::channel();
        let id = match self.tracker.begin(&mut self.store, &entity_id, kind, want) {
            BeginOutcome::Issued { id, request } => {
                self.tracker.attach_waiter(id, waiter);
                self.send_mutation(id, request);
                id
            }
            BeginOutcome::Revived { id } => {
                self.tracker.attach_waiter(id, waiter);
                id
            }
            BeginOutcome::Coalesced { id, compensate } => {
                let _ = waiter.send(MutationOutcome::Coalesced);
                if let Some((compensation, request)) = compensate {
                    self.send_mutation(compensation, request);
                }
                id
            }
            BeginOutcome::Rejected(reason) => {
                debug!(entity = %entity_id.short_id(), %reason, "like action rejected");
                return Err(SyncError::Rejected {
                    entity_id: entity_id.to_string(),
                    reason,
                });
            }
        };

        let record = self
            .store
            .get(&entity_id)
            .cloned()
            .unwrap_or_else(|| EngagementRecord::new(entity_id.clone(), kind));
        Ok(MutationTicket { id, record, outcome })
    }

    fn handle_response(&mut self, id: MutationId, result: Result<(), MutationError>) {
        match self.tracker.on_response(&mut self.store, id, result) {
            ResponseAction::Acknowledged { id } => self.schedule_timeout(id),
            ResponseAction::Compensate { id, request } => self.send_mutation(id, request),
            ResponseAction::Reverted { error } => {
                debug!(%id, %error, retryable = error.is_retryable(), "mutation reverted");
            }
            ResponseAction::None => {}
        }
    }

    fn handle_event(&mut self, event: EngagementEvent) {
        if let Some(notification) = self.dispatcher.dispatch(&event) {
            debug!(entity = %event.entity_id.short_id(), kind = ?notification.kind, "notification");
            let _ = self.notifications.send(notification);
        }

        // The store holds only on-screen or locally touched entities, so it stays bounded
        if event.kind != EventKind::EntityDeleted && !self.is_tracked(&event.entity_id) {
            trace!(entity = %event.entity_id.short_id(), kind = %event.kind, "event for entity not on screen");
            return;
        }
        self.reconciler
            .apply_event(&mut self.store, &mut self.tracker, &event);
    }

    fn set_visible(&mut self, visible: VisibleSet) {
        let delta = self.subscriptions.set_visible(visible);

        for entity_id in &delta.evicted {
            self.tracker.discard(entity_id);
            self.store.remove(entity_id);
        }
        self.drive(DriverCommand::Unsubscribe(delta.unsubscribe));
        self.drive(DriverCommand::Subscribe(delta.subscribe));
        self.request_snapshot(delta.added, false);
    }

    fn handle_connection(&mut self, signal: ConnectionSignal) {
        let state = match signal {
            ConnectionSignal::Connecting => self.subscriptions.on_connecting(),
            ConnectionSignal::Connected => {
                let plan = self.subscriptions.on_connected();
                self.drive(DriverCommand::Subscribe(plan.subscribe));
                if plan.after_gap {
                    self.request_snapshot(plan.refresh, true);
                }
                ConnectivityState::Online
            }
            ConnectionSignal::ConnectFailed(error) => {
                trace!(%error, "connect failure reported");
                self.subscriptions.on_connect_failed()
            }
            ConnectionSignal::Disconnected => self.subscriptions.on_disconnected(),
        };
        self.connectivity.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Visible now, or held because of a local action
    fn is_tracked(&self, entity_id: &EntityId) -> bool {
        self.subscriptions.is_visible(entity_id) || self.store.contains(entity_id)
    }

    fn drive(&self, command: DriverCommand) {
        let empty = match &command {
            DriverCommand::Subscribe(topics) | DriverCommand::Unsubscribe(topics) => topics.is_empty(),
            DriverCommand::Shutdown => false,
        };
        if empty {
            return;
        }
        if let Some(driver) = &self.driver {
            let _ = driver.send(command);
        }
    }

    fn send_mutation(&self, id: MutationId, request: MutationRequest) {
        debug!(%id, entity = %request.entity_id.short_id(), action = ?request.action, "sending mutation");
        let endpoint = self.mutations.clone();
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let result = endpoint.send_mutation(request).await;
            if let Some(writer) = loopback.upgrade() {
                let _ = writer.send(Command::MutationResponse { id, result });
            }
        });
        self.schedule_timeout(id);
    }

    fn schedule_timeout(&self, id: MutationId) {
        let window = self.tracker.confirm_window();
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(writer) = loopback.upgrade() {
                let _ = writer.send(Command::ConfirmTimeout { id });
            }
        });
    }

    /// Fetch counts for entities, remembering the generation each was asked at
    fn request_snapshot(&self, entities: Vec<(EntityId, EntityKind)>, refresh: bool) {
        if entities.is_empty() {
            return;
        }
        let basis: Vec<(EntityId, EntityKind, u64)> = entities
            .into_iter()
            .map(|(id, kind)| {
                let generation = self.store.generation(&id);
                (id, kind, generation)
            })
            .collect();
        debug!(entities = basis.len(), refresh, "requesting snapshot");

        let provider = self.snapshots.clone();
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let ids: Vec<EntityId> = basis.iter().map(|(id, _, _)| id.clone()).collect();
            let command = match provider.fetch_snapshot(&ids).await {
                Ok(mut counts) => {
                    let entries = basis
                        .into_iter()
                        .filter_map(|(entity_id, entity_kind, basis_generation)| {
                            counts.remove(&entity_id).map(|counts| SnapshotEntry {
                                entity_id,
                                entity_kind,
                                basis_generation,
                                counts,
                            })
                        })
                        .collect();
                    Command::SnapshotLoaded(Snapshot { entries, refresh })
                }
                Err(error) => Command::SnapshotFailed {
                    error,
                    requested: ids.len(),
                },
            };
            if let Some(writer) = loopback.upgrade() {
                let _ = writer.send(command);
            }
        });
    }
}
