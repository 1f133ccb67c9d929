// Fire history - debounce state and audit trail of action fires

//! # Fire History
//!
//! Two concerns share this store:
//!
//! - **Debounce**: [`FireHistoryStore::try_acquire`] is an atomic
//!   check-and-set on `(action, issue group)`. Exactly one caller wins per
//!   window, even when several events for the same group are processed
//!   concurrently. Losing is a normal outcome, not an error.
//! - **Audit**: [`FireHistoryStore::record`] appends one
//!   [`FireHistoryEntry`] per fired action, whether or not it was actually
//!   dispatched.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ActionId, DetectorId, GroupId, WorkflowId};
use crate::Result;

/// One fired action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireHistoryEntry {
    pub workflow_id: WorkflowId,
    pub action_id: ActionId,
    pub group_id: GroupId,
    pub detector_id: DetectorId,
    pub event_id: Option<Uuid>,
    pub activity_id: Option<i64>,
    pub fired_at: DateTime<Utc>,
    /// `false` when dispatch was suppressed (kill switch or dry run)
    pub dispatched: bool,
}

#[async_trait]
pub trait FireHistoryStore: Send + Sync {
    /// Claim the right to fire `action_id` for `group_id` at `now`
    ///
    /// Returns `true` and records `now` as the last fire if the previous fire
    /// is older than `window` (or there is none). Returns `false` otherwise.
    /// Must be atomic per `(action_id, group_id)`.
    async fn try_acquire(
        &self,
        action_id: ActionId,
        group_id: GroupId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool>;

    /// Give back a claim made by `try_acquire` at `acquired_at`
    ///
    /// Used when the claimed action was never dispatched, so a redelivery of
    /// the event can fire it. A claim made by a later caller is left alone.
    async fn release(
        &self,
        action_id: ActionId,
        group_id: GroupId,
        acquired_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn record(&self, entries: Vec<FireHistoryEntry>) -> Result<()>;

    async fn entries_for_action(&self, action_id: ActionId) -> Result<Vec<FireHistoryEntry>>;
}

/// In-process fire history
///
/// ## Rust Learning Notes:
///
/// ### Atomic check-and-set with the Entry API
/// `DashMap::entry` holds the shard's write lock until the returned entry is
/// dropped, so reading the last fire time and writing the new one happen as
/// one step. A separate `get` followed by `insert` would let two tasks both
/// see a stale value and both fire.
#[derive(Debug, Default)]
pub struct InMemoryFireHistory {
    last_fired: DashMap<(ActionId, GroupId), DateTime<Utc>>,
    entries: DashMap<ActionId, Vec<FireHistoryEntry>>,
}

impl InMemoryFireHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded entry, ordered by fire time then action id
    pub fn all_entries(&self) -> Vec<FireHistoryEntry> {
        let mut entries: Vec<FireHistoryEntry> = self
            .entries
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| a.fired_at.cmp(&b.fired_at).then(a.action_id.cmp(&b.action_id)));
        entries
    }
}

#[async_trait]
impl FireHistoryStore for InMemoryFireHistory {
    async fn try_acquire(
        &self,
        action_id: ActionId,
        group_id: GroupId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool> {
        let acquired = match self.last_fired.entry((action_id, group_id)) {
            Entry::Occupied(mut last) => {
                if now - *last.get() < window {
                    false
                } else {
                    last.insert(now);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        };
        Ok(acquired)
    }

    async fn release(
        &self,
        action_id: ActionId,
        group_id: GroupId,
        acquired_at: DateTime<Utc>,
    ) -> Result<()> {
        self.last_fired
            .remove_if(&(action_id, group_id), |_, last| *last == acquired_at);
        Ok(())
    }

    async fn record(&self, entries: Vec<FireHistoryEntry>) -> Result<()> {
        for entry in entries {
            self.entries.entry(entry.action_id).or_default().push(entry);
        }
        Ok(())
    }

    async fn entries_for_action(&self, action_id: ActionId) -> Result<Vec<FireHistoryEntry>> {
        Ok(self
            .entries
            .get(&action_id)
            .map(|entries| entries.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::at;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_window_suppresses_repeat_fires() {
        let history = InMemoryFireHistory::new();
        let (action, group) = (ActionId(1), GroupId(7));
        let window = Duration::minutes(30);

        assert!(history.try_acquire(action, group, at(2024, 5, 1, 12, 0), window).await.unwrap());
        assert!(!history.try_acquire(action, group, at(2024, 5, 1, 12, 29), window).await.unwrap());
        assert!(history.try_acquire(action, group, at(2024, 5, 1, 12, 30), window).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_is_per_action_and_group() {
        let history = InMemoryFireHistory::new();
        let now = at(2024, 5, 1, 12, 0);
        let window = Duration::minutes(30);

        assert!(history.try_acquire(ActionId(1), GroupId(7), now, window).await.unwrap());
        assert!(history.try_acquire(ActionId(1), GroupId(8), now, window).await.unwrap());
        assert!(history.try_acquire(ActionId(2), GroupId(7), now, window).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_reopens_only_the_matching_claim() {
        let history = InMemoryFireHistory::new();
        let (action, group) = (ActionId(1), GroupId(7));
        let window = Duration::minutes(30);
        let claimed = at(2024, 5, 1, 12, 0);

        assert!(history.try_acquire(action, group, claimed, window).await.unwrap());

        // Someone else's claim time does not match and stays in place
        history.release(action, group, at(2024, 5, 1, 11, 0)).await.unwrap();
        assert!(!history.try_acquire(action, group, at(2024, 5, 1, 12, 1), window).await.unwrap());

        history.release(action, group, claimed).await.unwrap();
        assert!(history.try_acquire(action, group, at(2024, 5, 1, 12, 1), window).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_has_exactly_one_winner() {
        let history = Arc::new(InMemoryFireHistory::new());
        let now = at(2024, 5, 1, 12, 0);

        let attempts = (0..32).map(|_| {
            let history = Arc::clone(&history);
            tokio::spawn(async move {
                history
                    .try_acquire(ActionId(1), GroupId(7), now, Duration::minutes(30))
                    .await
                    .unwrap()
            })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results.into_iter().filter(|won| *won.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_record_appends_entries() {
        let history = InMemoryFireHistory::new();
        let entry = FireHistoryEntry {
            workflow_id: WorkflowId(1),
            action_id: ActionId(3),
            group_id: GroupId(7),
            detector_id: DetectorId(1),
            event_id: Some(Uuid::nil()),
            activity_id: None,
            fired_at: at(2024, 5, 1, 12, 0),
            dispatched: false,
        };

        history.record(vec![entry.clone(), entry.clone()]).await.unwrap();

        assert_eq!(history.entries_for_action(ActionId(3)).await.unwrap().len(), 2);
        assert!(history.entries_for_action(ActionId(4)).await.unwrap().is_empty());
        assert_eq!(history.all_entries(), vec![entry.clone(), entry]);
    }
}
