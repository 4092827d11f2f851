//! Merging snapshots and push events into the store
//!
//! The reconciler holds no state of its own. It decides, per input, which
//! store write (if any) the input turns into, consulting the optimistic
//! tracker for events caused by the local user.

use engage_core::{EngagementEvent, EngagementRecord, EntityId, EntityKind, EntitySnapshot, EventKind, UserId};
use tracing::{debug, trace};

use crate::optimistic::{EchoMatch, OptimisticMutationTracker};
use crate::store::EngagementStore;

/// One entity's authoritative counts plus the generation they were requested at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub entity_id: EntityId,
    pub entity_kind: EntityKind,
    /// Record generation when the fetch was issued
    pub basis_generation: u64,
    pub counts: EntitySnapshot,
}

/// A batch of authoritative counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
    /// Overwrite records that were already initialized
    pub refresh: bool,
}

/// What an input did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The record was written
    Updated(EngagementRecord),
    /// The record was removed
    Removed,
    /// The input was accepted but changed nothing
    Unchanged,
    /// The input was rejected as stale
    Stale,
}

/// Counts of what a snapshot did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub applied: usize,
    pub stale: usize,
    pub skipped: usize,
}

/// Applies events and snapshots on behalf of the local user
#[derive(Debug, Clone)]
pub struct EventReconciler {
    local_user: UserId,
}

impl EventReconciler {
    pub fn new(local_user: UserId) -> Self {
        Self { local_user }
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Apply a snapshot batch
    ///
    /// An entry requested before the record's last server write is dropped.
    /// Entries only overwrite baselined records when the batch is a refresh.
    /// While a like mutation is pending, the like fields of a baselined record
    /// are left alone; an unbaselined one takes the server count plus the
    /// pending delta.
    pub fn apply_snapshot(
        &self,
        store: &mut EngagementStore,
        tracker: &OptimisticMutationTracker,
        snapshot: &Snapshot,
    ) -> SnapshotSummary {
        let mut summary = SnapshotSummary::default();
        for entry in &snapshot.entries {
            match self.apply_entry(store, tracker, entry, snapshot.refresh) {
                Applied::Updated(_) => summary.applied += 1,
                Applied::Stale => summary.stale += 1,
                Applied::Unchanged | Applied::Removed => summary.skipped += 1,
            }
        }
        debug!(
            applied = summary.applied,
            stale = summary.stale,
            skipped = summary.skipped,
            refresh = snapshot.refresh,
            "snapshot applied"
        );
        summary
    }

    fn apply_entry(
        &self,
        store: &mut EngagementStore,
        tracker: &OptimisticMutationTracker,
        entry: &SnapshotEntry,
        refresh: bool,
    ) -> Applied {
        let record = store.get(&entry.entity_id);
        let synced = record.map_or(0, |r| r.synced_generation);
        if entry.basis_generation < synced {
            trace!(
                entity = %entry.entity_id.short_id(),
                basis = entry.basis_generation,
                synced,
                "stale snapshot entry dropped"
            );
            return Applied::Stale;
        }
        let baselined = synced > 0;
        if baselined && !refresh {
            return Applied::Unchanged;
        }

        let counts = entry.counts;
        let like_pending = tracker.is_pending(&entry.entity_id);
        let before = record.map_or(0, |r| r.generation);
        let record = store.sync(&entry.entity_id, entry.entity_kind, |r| {
            r.comment_count = counts.comment_count;
            if !like_pending {
                r.like_count = counts.like_count;
                if let Some(liked) = counts.liked_by_me {
                    r.liked_by_me = liked;
                }
            } else if !baselined {
                // First baseline under a local like: keep the optimistic delta on top
                r.like_count = counts.like_count;
                r.apply_like_delta(r.pending_self_delta);
            }
        });
        changed(before, record)
    }

    /// Apply one push event
    pub fn apply_event(
        &self,
        store: &mut EngagementStore,
        tracker: &mut OptimisticMutationTracker,
        event: &EngagementEvent,
    ) -> Applied {
        let entity_id = &event.entity_id;
        let before = store.generation(entity_id);
        // Sign-only deltas on a record without a baseline are not server state
        let synced = event.count.is_some() || store.get(entity_id).is_some_and(EngagementRecord::is_baselined);

        match event.kind {
            EventKind::EntityDeleted => {
                tracker.discard(entity_id);
                match store.remove(entity_id) {
                    Some(_) => Applied::Removed,
                    None => Applied::Unchanged,
                }
            }
            EventKind::Like | EventKind::Unlike if event.is_self_origin(&self.local_user) => {
                changed(before, self.apply_self_like(store, tracker, event, synced))
            }
            EventKind::Like | EventKind::Unlike => {
                let delta = event.kind.implied_delta();
                let count = event.count;
                let record = write(store, synced, entity_id, event.entity_kind, |r| match count {
                    Some(count) => r.like_count = count,
                    None => r.apply_like_delta(delta),
                });
                changed(before, record)
            }
            EventKind::CommentAdd | EventKind::CommentRemove => {
                let delta = event.kind.implied_delta();
                let count = event.count;
                let record = write(store, synced, entity_id, event.entity_kind, |r| match count {
                    Some(count) => r.comment_count = count,
                    None => r.apply_comment_delta(delta),
                });
                changed(before, record)
            }
        }
    }

    fn apply_self_like(
        &self,
        store: &mut EngagementStore,
        tracker: &mut OptimisticMutationTracker,
        event: &EngagementEvent,
        synced: bool,
    ) -> EngagementRecord {
        let entity_id = &event.entity_id;
        let liked = event.kind == EventKind::Like;
        let count = event.count;

        match tracker.match_echo(entity_id, liked) {
            EchoMatch::Matched { delta } => {
                trace!(entity = %entity_id.short_id(), delta, "self echo matched");
                write(store, synced, entity_id, event.entity_kind, |r| {
                    r.pending_self_delta -= delta;
                    r.liked_by_me = liked;
                    if let Some(count) = count {
                        r.like_count = count;
                    }
                })
            }
            EchoMatch::Absorbed => {
                trace!(entity = %entity_id.short_id(), "stale self echo absorbed");
                write(store, synced, entity_id, event.entity_kind, |r| {
                    if let Some(count) = count {
                        r.like_count = count;
                    }
                })
            }
            EchoMatch::Unmatched => write(store, synced, entity_id, event.entity_kind, |r| {
                let flipped = r.liked_by_me != liked;
                r.liked_by_me = liked;
                match count {
                    Some(count) => r.like_count = count,
                    None if flipped => r.apply_like_delta(event.kind.implied_delta()),
                    None => {}
                }
            }),
        }
    }
}

fn write<F>(store: &mut EngagementStore, synced: bool, entity_id: &EntityId, kind: EntityKind, mutator: F) -> EngagementRecord
where
    F: FnOnce(&mut EngagementRecord),
{
    if synced {
        store.sync(entity_id, kind, mutator)
    } else {
        store.upsert(entity_id, kind, mutator)
    }
}

fn changed(before: u64, record: EngagementRecord) -> Applied {
    if record.generation == before {
        Applied::Unchanged
    } else {
        Applied::Updated(record)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::optimistic::BeginOutcome;

    fn me() -> UserId {
        UserId::new("me")
    }

    fn fixture() -> (EngagementStore, OptimisticMutationTracker, EventReconciler) {
        (
            EngagementStore::new(),
            OptimisticMutationTracker::new(me(), Duration::from_secs(5)),
            EventReconciler::new(me()),
        )
    }

    fn entry(id: &str, basis: u64, likes: u64, comments: u64, liked: Option<bool>) -> SnapshotEntry {
        SnapshotEntry {
            entity_id: EntityId::new(id),
            entity_kind: EntityKind::Post,
            basis_generation: basis,
            counts: EntitySnapshot {
                like_count: likes,
                comment_count: comments,
                liked_by_me: liked,
            },
        }
    }

    fn snapshot(entries: Vec<SnapshotEntry>, refresh: bool) -> Snapshot {
        Snapshot { entries, refresh }
    }

    #[tokio::test]
    async fn test_snapshot_initializes_record() {
        let (mut store, tracker, reconciler) = fixture();
        let summary = reconciler.apply_snapshot(
            &mut store,
            &tracker,
            &snapshot(vec![entry("p1", 0, 3, 2, Some(false))], false),
        );
        assert_eq!(summary.applied, 1);

        let record = store.get(&EntityId::new("p1")).unwrap();
        assert_eq!(record.like_count, 3);
        assert_eq!(record.comment_count, 2);
        assert_eq!(record.generation, 1);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_dropped() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");

        // Fetch issued at generation 0, then a push event lands first
        let event = EngagementEvent::like(id.clone(), EntityKind::Post, UserId::new("u2")).with_count(7);
        reconciler.apply_event(&mut store, &mut tracker, &event);

        let summary = reconciler.apply_snapshot(
            &mut store,
            &tracker,
            &snapshot(vec![entry("p1", 0, 3, 0, None)], true),
        );
        assert_eq!(summary.stale, 1);
        assert_eq!(store.get(&id).unwrap().like_count, 7);
    }

    #[tokio::test]
    async fn test_non_refresh_snapshot_keeps_initialized_record() {
        let (mut store, tracker, reconciler) = fixture();
        reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 0, 3, 0, None)], false));

        let summary =
            reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 1, 9, 0, None)], false));
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.get(&EntityId::new("p1")).unwrap().like_count, 3);

        reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 1, 9, 0, None)], true));
        assert_eq!(store.get(&EntityId::new("p1")).unwrap().like_count, 9);
    }

    #[tokio::test]
    async fn test_snapshot_leaves_pending_like_fields() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 0, 3, 1, Some(false))], false));
        assert!(matches!(
            tracker.begin(&mut store, &id, EntityKind::Post, true),
            BeginOutcome::Issued { .. }
        ));

        let basis = store.generation(&id);
        reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", basis, 3, 4, Some(false))], true));

        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 4);
        assert!(record.liked_by_me);
        assert_eq!(record.comment_count, 4);
    }

    #[tokio::test]
    async fn test_first_snapshot_after_local_like_keeps_delta() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");

        // Fetch issued at generation 0; the user likes before it lands
        tracker.begin(&mut store, &id, EntityKind::Post, true);
        assert_eq!(store.generation(&id), 1);

        let summary = reconciler.apply_snapshot(
            &mut store,
            &tracker,
            &snapshot(vec![entry("p1", 0, 100, 7, Some(false))], false),
        );
        assert_eq!(summary.applied, 1);

        let record = store.get(&id).unwrap();
        assert_eq!((record.like_count, record.comment_count), (101, 7));
        assert!(record.liked_by_me);
        assert_eq!(record.pending_self_delta, 1);
        assert!(record.is_baselined());

        let echo = EngagementEvent::like(id.clone(), EntityKind::Post, me()).with_count(101);
        reconciler.apply_event(&mut store, &mut tracker, &echo);
        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 101);
        assert_eq!(record.pending_self_delta, 0);
    }

    #[tokio::test]
    async fn test_local_writes_do_not_make_snapshot_stale() {
        let (mut store, tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        store.upsert(&id, EntityKind::Post, |r| r.bookmarked_by_me = true);

        reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 0, 5, 1, None)], false));
        let record = store.get(&id).unwrap();
        assert_eq!((record.like_count, record.comment_count), (5, 1));
        assert!(record.bookmarked_by_me);
    }

    #[tokio::test]
    async fn test_sign_only_event_does_not_baseline() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        reconciler.apply_event(&mut store, &mut tracker, &EngagementEvent::comment_add(id.clone(), UserId::new("u2")));
        assert!(!store.get(&id).unwrap().is_baselined());

        let summary =
            reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 0, 4, 9, None)], false));
        assert_eq!(summary.applied, 1);
        assert_eq!(store.get(&id).unwrap().comment_count, 9);
    }

    #[tokio::test]
    async fn test_absolute_events_are_idempotent() {
        let (mut store, mut tracker, reconciler) = fixture();
        let event = EngagementEvent::like(EntityId::new("p1"), EntityKind::Post, UserId::new("u2")).with_count(5);

        let first = reconciler.apply_event(&mut store, &mut tracker, &event);
        let state = store.get(&EntityId::new("p1")).unwrap().clone();
        let second = reconciler.apply_event(&mut store, &mut tracker, &event);

        assert!(matches!(first, Applied::Updated(_)));
        assert_eq!(second, Applied::Unchanged);
        assert_eq!(store.get(&EntityId::new("p1")).unwrap(), &state);
    }

    #[tokio::test]
    async fn test_sign_only_events_never_go_negative() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        let other = UserId::new("u2");

        for _ in 0..3 {
            reconciler.apply_event(&mut store, &mut tracker, &EngagementEvent::unlike(id.clone(), EntityKind::Post, other.clone()));
            reconciler.apply_event(&mut store, &mut tracker, &EngagementEvent::comment_remove(id.clone()));
        }
        reconciler.apply_event(&mut store, &mut tracker, &EngagementEvent::like(id.clone(), EntityKind::Post, other));

        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 1);
        assert_eq!(record.comment_count, 0);
    }

    #[tokio::test]
    async fn test_self_echo_adds_once() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 0, 3, 0, Some(false))], false));
        tracker.begin(&mut store, &id, EntityKind::Post, true);

        let echo = EngagementEvent::like(id.clone(), EntityKind::Post, me());
        reconciler.apply_event(&mut store, &mut tracker, &echo);

        let record = store.get(&id).unwrap();
        assert_eq!(record.like_count, 4);
        assert_eq!(record.pending_self_delta, 0);
        assert!(!tracker.is_pending(&id));
    }

    #[tokio::test]
    async fn test_self_like_from_other_device() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 0, 3, 0, Some(false))], false));

        let event = EngagementEvent::like(id.clone(), EntityKind::Post, me());
        reconciler.apply_event(&mut store, &mut tracker, &event);
        assert_eq!(store.get(&id).unwrap().like_count, 4);
        assert!(store.get(&id).unwrap().liked_by_me);

        // Membership already reflected: a repeat does not move the count
        let again = reconciler.apply_event(&mut store, &mut tracker, &event);
        assert_eq!(again, Applied::Unchanged);
        assert_eq!(store.get(&id).unwrap().like_count, 4);
    }

    #[tokio::test]
    async fn test_stale_self_echo_is_absorbed() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        reconciler.apply_snapshot(&mut store, &tracker, &snapshot(vec![entry("p1", 0, 3, 0, Some(false))], false));
        tracker.begin(&mut store, &id, EntityKind::Post, true);
        tracker.begin(&mut store, &id, EntityKind::Post, false);

        // Echo of the like the user already took back
        let echo = EngagementEvent::like(id.clone(), EntityKind::Post, me()).with_count(4);
        reconciler.apply_event(&mut store, &mut tracker, &echo);

        let record = store.get(&id).unwrap();
        assert!(!record.liked_by_me);
        assert_eq!(record.like_count, 4);
    }

    #[tokio::test]
    async fn test_remote_comment_events() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        let add = EngagementEvent::comment_add(id.clone(), UserId::new("u2"));

        reconciler.apply_event(&mut store, &mut tracker, &add);
        reconciler.apply_event(&mut store, &mut tracker, &add);
        assert_eq!(store.get(&id).unwrap().comment_count, 2);

        reconciler.apply_event(&mut store, &mut tracker, &EngagementEvent::comment_remove(id.clone()).with_count(10));
        assert_eq!(store.get(&id).unwrap().comment_count, 10);
    }

    #[tokio::test]
    async fn test_delete_discards_pending() {
        let (mut store, mut tracker, reconciler) = fixture();
        let id = EntityId::new("p1");
        tracker.begin(&mut store, &id, EntityKind::Post, true);

        let outcome = reconciler.apply_event(&mut store, &mut tracker, &EngagementEvent::deleted(id.clone(), EntityKind::Post));
        assert_eq!(outcome, Applied::Removed);
        assert!(store.get(&id).is_none());
        assert!(!tracker.is_pending(&id));
    }
}
