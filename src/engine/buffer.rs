// Delayed-processing buffer - where slow conditions wait for the batch pass

//! # Delayed Workflow Buffer
//!
//! Slow conditions are never evaluated inline. Instead the pipeline writes a
//! [`DelayedWorkflowItem`](crate::models::DelayedWorkflowItem) per deferred
//! (workflow, issue group, source) into a hash keyed by project, and marks the
//! project as pending in one sorted set scored by time. A batch processor
//! later drains the sorted set, reads each project's hash and evaluates the
//! slow conditions with real aggregate values.
//!
//! ```text
//! sorted set  workflow_engine_delayed_processing_buffer: {project_id -> score}
//! hash        project_id: {buffer_key -> buffer_value}
//! ```
//!
//! The write side ([`push_to_hash_bulk`](DelayedWorkflowBuffer::push_to_hash_bulk),
//! [`push_to_sorted_set`](DelayedWorkflowBuffer::push_to_sorted_set)) is what
//! this crate uses. The read side is the contract a consumer relies on.
//!
//! Writes merge per key: a later write for the same buffer key replaces the
//! earlier value, and re-adding a project updates its score.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::ProjectId;
use crate::Result;

/// Storage backend for deferred work
#[async_trait]
pub trait DelayedWorkflowBuffer: Send + Sync {
    /// Merge `data` into the hash of `project_id`
    async fn push_to_hash_bulk(
        &self,
        project_id: ProjectId,
        data: HashMap<String, String>,
    ) -> Result<()>;

    /// Add (or re-score) projects in the sorted set `key`
    async fn push_to_sorted_set(
        &self,
        key: &str,
        project_ids: &[ProjectId],
        score: DateTime<Utc>,
    ) -> Result<()>;

    /// Entire hash of a project; empty if nothing is pending
    async fn get_hash(&self, project_id: ProjectId) -> Result<HashMap<String, String>>;

    /// Members of `key` scored at or before `max`, oldest first
    async fn get_sorted_set(
        &self,
        key: &str,
        max: DateTime<Utc>,
    ) -> Result<Vec<(ProjectId, DateTime<Utc>)>>;

    async fn delete_hash_keys(&self, project_id: ProjectId, keys: &[String]) -> Result<()>;

    async fn remove_from_sorted_set(&self, key: &str, project_ids: &[ProjectId]) -> Result<()>;
}

/// In-process buffer backed by `DashMap`
///
/// ## Rust Learning Notes:
///
/// ### DashMap
/// `DashMap` is a sharded concurrent hash map. Each method locks only the
/// shard holding the key, so writers for different projects never contend
/// and no `RwLock` around the whole map is needed.
#[derive(Debug, Default)]
pub struct InMemoryBuffer {
    hashes: DashMap<ProjectId, HashMap<String, String>>,
    sorted_sets: DashMap<String, HashMap<ProjectId, DateTime<Utc>>>,
}

impl InMemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered entries across every project
    pub fn pending_entries(&self) -> usize {
        self.hashes.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl DelayedWorkflowBuffer for InMemoryBuffer {
    async fn push_to_hash_bulk(
        &self,
        project_id: ProjectId,
        data: HashMap<String, String>,
    ) -> Result<()> {
        self.hashes.entry(project_id).or_default().extend(data);
        Ok(())
    }

    async fn push_to_sorted_set(
        &self,
        key: &str,
        project_ids: &[ProjectId],
        score: DateTime<Utc>,
    ) -> Result<()> {
        let mut set = self.sorted_sets.entry(key.to_string()).or_default();
        for project_id in project_ids {
            set.insert(*project_id, score);
        }
        Ok(())
    }

    async fn get_hash(&self, project_id: ProjectId) -> Result<HashMap<String, String>> {
        Ok(self
            .hashes
            .get(&project_id)
            .map(|hash| hash.value().clone())
            .unwrap_or_default())
    }

    async fn get_sorted_set(
        &self,
        key: &str,
        max: DateTime<Utc>,
    ) -> Result<Vec<(ProjectId, DateTime<Utc>)>> {
        let mut members: Vec<(ProjectId, DateTime<Utc>)> = self
            .sorted_sets
            .get(key)
            .map(|set| {
                set.iter()
                    .filter(|(_, score)| **score <= max)
                    .map(|(project_id, score)| (*project_id, *score))
                    .collect()
            })
            .unwrap_or_default();

        members.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn delete_hash_keys(&self, project_id: ProjectId, keys: &[String]) -> Result<()> {
        if let Some(mut hash) = self.hashes.get_mut(&project_id) {
            for key in keys {
                hash.remove(key);
            }
        }
        self.hashes.remove_if(&project_id, |_, hash| hash.is_empty());
        Ok(())
    }

    async fn remove_from_sorted_set(&self, key: &str, project_ids: &[ProjectId]) -> Result<()> {
        if let Some(mut set) = self.sorted_sets.get_mut(key) {
            for project_id in project_ids {
                set.remove(project_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::at;

    const KEY: &str = "workflow_engine_delayed_processing_buffer";

    #[tokio::test]
    async fn test_hash_writes_merge_per_key() {
        let buffer = InMemoryBuffer::new();
        let project = ProjectId(1);

        buffer
            .push_to_hash_bulk(project, HashMap::from([("a".to_string(), "1".to_string())]))
            .await
            .unwrap();
        buffer
            .push_to_hash_bulk(
                project,
                HashMap::from([
                    ("a".to_string(), "2".to_string()),
                    ("b".to_string(), "3".to_string()),
                ]),
            )
            .await
            .unwrap();

        let hash = buffer.get_hash(project).await.unwrap();
        assert_eq!(hash.len(), 2);
        assert_eq!(hash["a"], "2");
        assert_eq!(buffer.pending_entries(), 2);
    }

    #[tokio::test]
    async fn test_sorted_set_orders_by_score_and_honours_max() {
        let buffer = InMemoryBuffer::new();
        buffer
            .push_to_sorted_set(KEY, &[ProjectId(2)], at(2024, 5, 1, 12, 5))
            .await
            .unwrap();
        buffer
            .push_to_sorted_set(KEY, &[ProjectId(1), ProjectId(3)], at(2024, 5, 1, 12, 0))
            .await
            .unwrap();

        let members = buffer.get_sorted_set(KEY, at(2024, 5, 1, 12, 10)).await.unwrap();
        let ids: Vec<i64> = members.iter().map(|(id, _)| id.get()).collect();
        assert_eq!(ids, vec![1, 3, 2]);

        let early = buffer.get_sorted_set(KEY, at(2024, 5, 1, 12, 1)).await.unwrap();
        assert_eq!(early.len(), 2);
    }

    #[tokio::test]
    async fn test_consumer_cleanup() {
        let buffer = InMemoryBuffer::new();
        let project = ProjectId(4);
        buffer
            .push_to_hash_bulk(project, HashMap::from([("k".to_string(), "v".to_string())]))
            .await
            .unwrap();
        buffer
            .push_to_sorted_set(KEY, &[project], at(2024, 5, 1, 12, 0))
            .await
            .unwrap();

        buffer.delete_hash_keys(project, &["k".to_string()]).await.unwrap();
        buffer.remove_from_sorted_set(KEY, &[project]).await.unwrap();

        assert!(buffer.get_hash(project).await.unwrap().is_empty());
        assert!(buffer
            .get_sorted_set(KEY, at(2024, 5, 2, 0, 0))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(buffer.pending_entries(), 0);
    }
}
