//! Optimistic like/unlike mutations awaiting confirmation
//!
//! A user action is applied to the store immediately and recorded here until
//! one of the following settles it:
//!
//! - the server echoes it back as a self-origin push event (confirmed)
//! - the mutation request fails (exact revert)
//! - the user toggles back before confirmation (coalesced, no new request)
//! - the confirmation window elapses (kept as-is, never silently reverted)
//!
//! There is at most one slot per entity; the like action is the only
//! network-backed engagement action.

use std::collections::HashMap;
use std::time::Duration;

use engage_core::{
    EntityId, EntityKind, MutationAction, MutationError, MutationRequest, UserId,
};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::RejectReason;
use crate::store::EngagementStore;

/// Identity of one optimistic mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(pub u64);

impl std::fmt::Display for MutationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Final result of a mutation, as seen by the caller that issued it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server echoed the mutation back
    Confirmed,
    /// The server accepted it but no echo arrived within the window
    Acknowledged,
    /// Neither a response nor an echo arrived within the window
    Unconfirmed,
    /// The user toggled back before confirmation
    Coalesced,
    /// The request failed and local state was reverted
    Failed(MutationError),
    /// The entity was deleted or evicted while pending
    Discarded,
}

/// Lifecycle of a pending slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Request sent, no response yet
    InFlight,
    /// Server accepted, waiting for the echo
    Acknowledged,
    /// Toggled back locally while the request is still in flight
    Cancelled,
}

/// A mutation applied locally and not yet settled
#[derive(Debug)]
pub struct PendingMutation {
    pub id: MutationId,
    pub entity_id: EntityId,
    pub entity_kind: EntityKind,
    /// Membership this mutation moves to
    pub intent: bool,
    /// Like-count delta actually applied to the store
    pub delta: i64,
    /// Membership before the mutation was applied
    pub prior_liked: bool,
    /// Record generation right after the optimistic apply
    pub generation_at_apply: u64,
    pub state: MutationState,
    /// Reverse request undoing a cancelled mutation the server accepted
    pub compensating: bool,
    issued_at: Instant,
    acknowledged_at: Option<Instant>,
    waiter: Option<oneshot::Sender<MutationOutcome>>,
}

impl PendingMutation {
    pub fn action(&self) -> MutationAction {
        MutationAction::toward(self.intent)
    }

    fn resolve(&mut self, outcome: MutationOutcome) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(outcome);
        }
    }
}

/// Result of starting a user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Applied locally; the request must be sent now
    Issued {
        id: MutationId,
        request: MutationRequest,
    },
    /// Re-applied a cancelled mutation whose request is still in flight
    Revived { id: MutationId },
    /// Cancelled the opposite pending mutation locally
    ///
    /// `compensate` is set when the server had already accepted the
    /// cancelled mutation and a reverse request must be sent.
    Coalesced {
        id: MutationId,
        compensate: Option<(MutationId, MutationRequest)>,
    },
    /// Nothing changed
    Rejected(RejectReason),
}

/// What the caller must do after a mutation response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseAction {
    /// Nothing (late or duplicate response)
    None,
    /// Accepted; start the echo window
    Acknowledged { id: MutationId },
    /// Send this reverse request
    Compensate {
        id: MutationId,
        request: MutationRequest,
    },
    /// The mutation was reverted
    Reverted { error: MutationError },
}

/// What the caller must do after a confirmation window elapses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Nothing (already settled, or still inside the window)
    None,
    /// Settled without revert
    Settled(MutationOutcome),
    /// A cancelled mutation is treated as accepted: send this reverse request
    Compensate {
        id: MutationId,
        request: MutationRequest,
    },
}

/// How a self-origin like/unlike event relates to local pending state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMatch {
    /// Echo of the pending mutation; `delta` was already applied locally
    Matched { delta: i64 },
    /// Stale echo contradicting a newer local intent
    Absorbed,
    /// No pending mutation, e.g. the action came from another device
    Unmatched,
}

/// Tracks in-flight optimistic mutations for the local user
pub struct OptimisticMutationTracker {
    local_user: UserId,
    confirm_window: Duration,
    pending: HashMap<EntityId, PendingMutation>,
    next_id: u64,
}

impl OptimisticMutationTracker {
    pub fn new(local_user: UserId, confirm_window: Duration) -> Self {
        Self {
            local_user,
            confirm_window,
            pending: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn confirm_window(&self) -> Duration {
        self.confirm_window
    }

    /// Whether any mutation slot is held for an entity
    pub fn is_pending(&self, entity_id: &EntityId) -> bool {
        self.pending.contains_key(entity_id)
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<&PendingMutation> {
        self.pending.get(entity_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Attach the caller's outcome channel to a mutation
    pub fn attach_waiter(&mut self, id: MutationId, waiter: oneshot::Sender<MutationOutcome>) {
        match self.pending.values_mut().find(|slot| slot.id == id) {
            Some(slot) => slot.waiter = Some(waiter),
            None => {
                let _ = waiter.send(MutationOutcome::Discarded);
            }
        }
    }

    /// Start a like (`want = true`) or unlike (`want = false`) action
    pub fn begin(
        &mut self,
        store: &mut EngagementStore,
        entity_id: &EntityId,
        kind: EntityKind,
        want: bool,
    ) -> BeginOutcome {
        if let Some(slot) = self.pending.get_mut(entity_id) {
            return match slot.state {
                MutationState::Cancelled if slot.intent == want => {
                    let (delta, generation) = apply_intent(store, entity_id, slot.entity_kind, want);
                    slot.delta = delta;
                    slot.prior_liked = !want;
                    slot.generation_at_apply = generation;
                    slot.state = MutationState::InFlight;
                    debug!(entity = %entity_id.short_id(), id = %slot.id, "revived cancelled mutation");
                    BeginOutcome::Revived { id: slot.id }
                }
                MutationState::Cancelled => BeginOutcome::Rejected(RejectReason::AlreadyApplied),
                _ if slot.compensating => BeginOutcome::Rejected(RejectReason::CompensationInFlight),
                _ if slot.intent == want => BeginOutcome::Rejected(RejectReason::DuplicatePending),
                MutationState::InFlight => {
                    revert(store, slot);
                    slot.state = MutationState::Cancelled;
                    slot.resolve(MutationOutcome::Coalesced);
                    debug!(entity = %entity_id.short_id(), id = %slot.id, "coalesced toggle-back");
                    BeginOutcome::Coalesced {
                        id: slot.id,
                        compensate: None,
                    }
                }
                MutationState::Acknowledged => {
                    // Server already applied it: undo with a reverse request
                    let cancelled_id = slot.id;
                    let cancelled_intent = slot.intent;
                    let entity_kind = slot.entity_kind;
                    revert(store, slot);
                    slot.resolve(MutationOutcome::Coalesced);
                    self.pending.remove(entity_id);
                    let compensation =
                        self.start_compensation(store, entity_id, entity_kind, !cancelled_intent);
                    BeginOutcome::Coalesced {
                        id: cancelled_id,
                        compensate: Some(compensation),
                    }
                }
            };
        }

        let current = store.get(entity_id).is_some_and(|r| r.liked_by_me);
        if current == want {
            return BeginOutcome::Rejected(RejectReason::AlreadyApplied);
        }

        let (delta, generation) = apply_intent(store, entity_id, kind, want);
        let id = self.allocate_id();
        self.pending.insert(
            entity_id.clone(),
            PendingMutation {
                id,
                entity_id: entity_id.clone(),
                entity_kind: kind,
                intent: want,
                delta,
                prior_liked: current,
                generation_at_apply: generation,
                state: MutationState::InFlight,
                compensating: false,
                issued_at: Instant::now(),
                acknowledged_at: None,
                waiter: None,
            },
        );
        debug!(entity = %entity_id.short_id(), %id, liked = want, "optimistic mutation applied");

        BeginOutcome::Issued {
            id,
            request: self.request(entity_id, kind, want),
        }
    }

    /// Handle the mutation endpoint's response
    pub fn on_response(
        &mut self,
        store: &mut EngagementStore,
        id: MutationId,
        result: Result<(), MutationError>,
    ) -> ResponseAction {
        let Some(entity_id) = self.entity_of(id) else {
            debug!(%id, "response for settled mutation ignored");
            return ResponseAction::None;
        };
        let Some(slot) = self.pending.get_mut(&entity_id) else {
            return ResponseAction::None;
        };

        match (result, slot.state) {
            (Ok(()), MutationState::InFlight) => {
                slot.state = MutationState::Acknowledged;
                slot.acknowledged_at = Some(Instant::now());
                ResponseAction::Acknowledged { id }
            }
            (Ok(()), MutationState::Acknowledged) => ResponseAction::None,
            (Ok(()), MutationState::Cancelled) => {
                let intent = slot.intent;
                let entity_kind = slot.entity_kind;
                self.pending.remove(&entity_id);
                let (id, request) = self.start_compensation(store, &entity_id, entity_kind, !intent);
                ResponseAction::Compensate { id, request }
            }
            (Err(error), MutationState::InFlight | MutationState::Acknowledged) => {
                if let Some(mut slot) = self.pending.remove(&entity_id) {
                    revert(store, &slot);
                    if slot.compensating {
                        warn!(
                            entity = %entity_id.short_id(),
                            error = %error,
                            "compensating request failed, counts stale until next snapshot"
                        );
                    }
                    slot.resolve(MutationOutcome::Failed(error.clone()));
                }
                ResponseAction::Reverted { error }
            }
            (Err(_), MutationState::Cancelled) => {
                self.pending.remove(&entity_id);
                ResponseAction::None
            }
        }
    }

    /// Match a self-origin like/unlike event against pending state
    pub fn match_echo(&mut self, entity_id: &EntityId, liked: bool) -> EchoMatch {
        let Some(slot) = self.pending.get(entity_id) else {
            return EchoMatch::Unmatched;
        };
        if slot.state == MutationState::Cancelled || slot.intent != liked {
            return EchoMatch::Absorbed;
        }
        match self.pending.remove(entity_id) {
            Some(mut slot) => {
                slot.resolve(MutationOutcome::Confirmed);
                EchoMatch::Matched { delta: slot.delta }
            }
            None => EchoMatch::Unmatched,
        }
    }

    /// Settle a mutation whose confirmation window has elapsed
    ///
    /// The optimistic count is kept; only the pending delta is cleared. A
    /// cancelled mutation that never got a response is assumed accepted and
    /// undone with a compensating request.
    pub fn on_timeout(&mut self, store: &mut EngagementStore, id: MutationId, now: Instant) -> TimeoutAction {
        let Some(entity_id) = self.entity_of(id) else {
            return TimeoutAction::None;
        };
        let Some(slot) = self.pending.get(&entity_id) else {
            return TimeoutAction::None;
        };
        let started = match slot.state {
            MutationState::Acknowledged => slot.acknowledged_at.unwrap_or(slot.issued_at),
            MutationState::InFlight | MutationState::Cancelled => slot.issued_at,
        };
        if now < started + self.confirm_window {
            return TimeoutAction::None;
        }

        let Some(mut slot) = self.pending.remove(&entity_id) else {
            return TimeoutAction::None;
        };
        if slot.state == MutationState::Cancelled {
            debug!(entity = %entity_id.short_id(), %id, "cancelled mutation expired, compensating");
            let (id, request) = self.start_compensation(store, &entity_id, slot.entity_kind, !slot.intent);
            return TimeoutAction::Compensate { id, request };
        }

        let delta = slot.delta;
        store.upsert(&entity_id, slot.entity_kind, |r| r.pending_self_delta -= delta);
        let outcome = if slot.state == MutationState::Acknowledged {
            MutationOutcome::Acknowledged
        } else {
            MutationOutcome::Unconfirmed
        };
        debug!(entity = %entity_id.short_id(), %id, ?outcome, "mutation settled without echo");
        slot.resolve(outcome.clone());
        TimeoutAction::Settled(outcome)
    }

    /// Drop the slot for a deleted or evicted entity without reverting
    pub fn discard(&mut self, entity_id: &EntityId) -> bool {
        match self.pending.remove(entity_id) {
            Some(mut slot) => {
                slot.resolve(MutationOutcome::Discarded);
                true
            }
            None => false,
        }
    }

    fn start_compensation(
        &mut self,
        store: &EngagementStore,
        entity_id: &EntityId,
        kind: EntityKind,
        intent: bool,
    ) -> (MutationId, MutationRequest) {
        let id = self.allocate_id();
        let record = store.get(entity_id);
        self.pending.insert(
            entity_id.clone(),
            PendingMutation {
                id,
                entity_id: entity_id.clone(),
                entity_kind: kind,
                intent,
                delta: 0,
                prior_liked: record.is_some_and(|r| r.liked_by_me),
                generation_at_apply: record.map_or(0, |r| r.generation),
                state: MutationState::InFlight,
                compensating: true,
                issued_at: Instant::now(),
                acknowledged_at: None,
                waiter: None,
            },
        );
        debug!(entity = %entity_id.short_id(), %id, liked = intent, "compensating request queued");
        (id, self.request(entity_id, kind, intent))
    }

    fn request(&self, entity_id: &EntityId, kind: EntityKind, liked: bool) -> MutationRequest {
        MutationRequest {
            action: MutationAction::toward(liked),
            entity_id: entity_id.clone(),
            entity_kind: kind,
            user_id: self.local_user.clone(),
        }
    }

    fn entity_of(&self, id: MutationId) -> Option<EntityId> {
        self.pending
            .values()
            .find(|slot| slot.id == id)
            .map(|slot| slot.entity_id.clone())
    }

    fn allocate_id(&mut self) -> MutationId {
        self.next_id += 1;
        MutationId(self.next_id)
    }
}

/// Flip membership and apply the like delta; returns (applied delta, generation)
fn apply_intent(
    store: &mut EngagementStore,
    entity_id: &EntityId,
    kind: EntityKind,
    want: bool,
) -> (i64, u64) {
    let delta = MutationAction::toward(want).delta();
    let mut applied = 0;
    let record = store.upsert(entity_id, kind, |r| {
        let before = r.like_count;
        r.apply_like_delta(delta);
        applied = r.like_count as i64 - before as i64;
        r.pending_self_delta += applied;
        r.liked_by_me = want;
    });
    (applied, record.generation)
}

/// Undo exactly what a slot applied
fn revert(store: &mut EngagementStore, slot: &PendingMutation) {
    let delta = slot.delta;
    let prior = slot.prior_liked;
    store.upsert(&slot.entity_id, slot.entity_kind, |r| {
        r.apply_like_delta(-delta);
        r.pending_self_delta -= delta;
        r.liked_by_me = prior;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(likes: u64, liked: bool) -> (EngagementStore, OptimisticMutationTracker, EntityId) {
        let mut store = EngagementStore::new();
        let id = EntityId::new("p1");
        store.upsert(&id, EntityKind::Post, |r| {
            r.like_count = likes;
            r.liked_by_me = liked;
        });
        let tracker = OptimisticMutationTracker::new(UserId::new("me"), Duration::from_secs(5));
        (store, tracker, id)
    }

    fn issued_id(outcome: BeginOutcome) -> MutationId {
        match outcome {
            BeginOutcome::Issued { id, .. } => id,
            other => panic!("expected Issued, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_begin_applies_immediately() {
        let (mut store, mut tracker, id) = setup(3, false);

        let outcome = tracker.begin(&mut store, &id, EntityKind::Post, true);
        match outcome {
            BeginOutcome::Issued { request, .. } => {
                assert_eq!(request.action, MutationAction::Like);
                assert_eq!(request.user_id, UserId::new("me"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 4);
        assert!(record.liked_by_me);
        assert_eq!(record.pending_self_delta, 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected() {
        let (mut store, mut tracker, id) = setup(3, false);
        tracker.begin(&mut store, &id, EntityKind::Post, true);

        let again = tracker.begin(&mut store, &id, EntityKind::Post, true);
        assert_eq!(again, BeginOutcome::Rejected(RejectReason::DuplicatePending));
        assert_eq!(store.get(&id).unwrap().like_count, 4);
    }

    #[tokio::test]
    async fn test_already_liked_is_rejected() {
        let (mut store, mut tracker, id) = setup(3, true);
        let outcome = tracker.begin(&mut store, &id, EntityKind::Post, true);
        assert_eq!(outcome, BeginOutcome::Rejected(RejectReason::AlreadyApplied));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_reverts_exactly() {
        let (mut store, mut tracker, id) = setup(3, false);
        let before = store.get(&id).unwrap().clone();

        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));
        let (tx, mut rx) = oneshot::channel();
        tracker.attach_waiter(mid, tx);

        let err = MutationError::Network("offline".into());
        let action = tracker.on_response(&mut store, mid, Err(err.clone()));
        assert_eq!(action, ResponseAction::Reverted { error: err.clone() });

        let after = store.get(&id).unwrap();
        assert!(before.same_state(after));
        assert_eq!(rx.try_recv().unwrap(), MutationOutcome::Failed(err));
    }

    #[tokio::test]
    async fn test_unlike_at_zero_reverts_exactly() {
        let (mut store, mut tracker, id) = setup(0, true);
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, false));
        assert_eq!(store.get(&id).unwrap().like_count, 0);
        assert_eq!(store.get(&id).unwrap().pending_self_delta, 0);

        tracker.on_response(&mut store, mid, Err(MutationError::Network("x".into())));
        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 0);
        assert!(record.liked_by_me);
    }

    #[tokio::test]
    async fn test_toggle_back_coalesces_without_request() {
        let (mut store, mut tracker, id) = setup(3, false);
        let before = store.get(&id).unwrap().clone();
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));

        let outcome = tracker.begin(&mut store, &id, EntityKind::Post, false);
        assert_eq!(
            outcome,
            BeginOutcome::Coalesced {
                id: mid,
                compensate: None
            }
        );
        assert!(before.same_state(store.get(&id).unwrap()));

        // The original request fails: nothing left to revert
        let action = tracker.on_response(&mut store, mid, Err(MutationError::Network("x".into())));
        assert_eq!(action, ResponseAction::None);
        assert!(before.same_state(store.get(&id).unwrap()));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_then_accepted_sends_compensation() {
        let (mut store, mut tracker, id) = setup(3, false);
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));
        tracker.begin(&mut store, &id, EntityKind::Post, false);

        match tracker.on_response(&mut store, mid, Ok(())) {
            ResponseAction::Compensate { request, .. } => {
                assert_eq!(request.action, MutationAction::Unlike);
            }
            other => panic!("expected compensation, got {:?}", other),
        }
        let slot = tracker.get(&id).unwrap();
        assert!(slot.compensating);
        assert_eq!(slot.delta, 0);

        // User cannot act again until the compensation settles
        assert_eq!(
            tracker.begin(&mut store, &id, EntityKind::Post, true),
            BeginOutcome::Rejected(RejectReason::CompensationInFlight)
        );
    }

    #[tokio::test]
    async fn test_revive_cancelled_mutation() {
        let (mut store, mut tracker, id) = setup(3, false);
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));
        tracker.begin(&mut store, &id, EntityKind::Post, false);

        let outcome = tracker.begin(&mut store, &id, EntityKind::Post, true);
        assert_eq!(outcome, BeginOutcome::Revived { id: mid });
        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 4);
        assert_eq!(record.pending_self_delta, 1);
    }

    #[tokio::test]
    async fn test_toggle_back_after_ack_compensates_immediately() {
        let (mut store, mut tracker, id) = setup(3, false);
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));
        tracker.on_response(&mut store, mid, Ok(()));

        match tracker.begin(&mut store, &id, EntityKind::Post, false) {
            BeginOutcome::Coalesced {
                compensate: Some((_, request)),
                ..
            } => assert_eq!(request.action, MutationAction::Unlike),
            other => panic!("unexpected: {:?}", other),
        }
        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 3);
        assert!(!record.liked_by_me);
        assert_eq!(record.pending_self_delta, 0);
    }

    #[tokio::test]
    async fn test_echo_matching() {
        let (mut store, mut tracker, id) = setup(3, false);
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));
        let (tx, mut rx) = oneshot::channel();
        tracker.attach_waiter(mid, tx);

        assert_eq!(tracker.match_echo(&id, false), EchoMatch::Absorbed);
        assert_eq!(tracker.match_echo(&id, true), EchoMatch::Matched { delta: 1 });
        assert_eq!(tracker.match_echo(&id, true), EchoMatch::Unmatched);
        assert_eq!(rx.try_recv().unwrap(), MutationOutcome::Confirmed);
    }

    #[tokio::test]
    async fn test_timeout_keeps_optimistic_count() {
        let (mut store, mut tracker, id) = setup(3, false);
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));

        // Too early
        assert_eq!(tracker.on_timeout(&mut store, mid, Instant::now()), TimeoutAction::None);

        let later = Instant::now() + Duration::from_secs(6);
        assert_eq!(
            tracker.on_timeout(&mut store, mid, later),
            TimeoutAction::Settled(MutationOutcome::Unconfirmed)
        );
        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 4);
        assert!(record.liked_by_me);
        assert_eq!(record.pending_self_delta, 0);

        // A late failure no longer reverts
        let action = tracker.on_response(&mut store, mid, Err(MutationError::Network("x".into())));
        assert_eq!(action, ResponseAction::None);
        assert_eq!(store.get(&id).unwrap().like_count, 4);
    }

    #[tokio::test]
    async fn test_expired_cancelled_mutation_compensates() {
        let (mut store, mut tracker, id) = setup(3, false);
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));
        tracker.begin(&mut store, &id, EntityKind::Post, false);

        let later = Instant::now() + Duration::from_secs(6);
        let compensation = match tracker.on_timeout(&mut store, mid, later) {
            TimeoutAction::Compensate { id, request } => {
                assert_eq!(request.action, MutationAction::Unlike);
                id
            }
            other => panic!("expected compensation, got {:?}", other),
        };
        assert!(tracker.get(&id).unwrap().compensating);

        // The original response arriving late changes nothing
        assert_eq!(tracker.on_response(&mut store, mid, Ok(())), ResponseAction::None);
        assert_eq!(
            tracker.on_response(&mut store, compensation, Ok(())),
            ResponseAction::Acknowledged { id: compensation }
        );

        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 3);
        assert!(!record.liked_by_me);
        assert_eq!(record.pending_self_delta, 0);
    }

    #[tokio::test]
    async fn test_discard_resolves_waiter() {
        let (mut store, mut tracker, id) = setup(3, false);
        let mid = issued_id(tracker.begin(&mut store, &id, EntityKind::Post, true));
        let (tx, mut rx) = oneshot::channel();
        tracker.attach_waiter(mid, tx);

        assert!(tracker.discard(&id));
        assert!(!tracker.discard(&id));
        assert_eq!(rx.try_recv().unwrap(), MutationOutcome::Discarded);
    }
}
