//! `StateManager`: the only code path that mutates `ProjectState`.
//!
//! The current state is published through a `watch` channel as an
//! `Arc<ProjectState>`. Writers build the next state on a private clone and
//! swap it in whole, so readers only ever see complete snapshots. Writes are
//! serialized by an async mutex.
//!
//! Persistence happens after the writer lock is released, on the blocking
//! pool. A second lock taken before the writer lock is dropped keeps disk
//! writes in version order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex as AsyncMutex, MutexGuard};

use syncd_core::{ChangeEvent, ProjectState, StateConfig, TargetStamp};

use crate::applier::{ApplyOutcome, ChangeApplier};
use crate::checksum;
use crate::conflict::{self, ConflictCheck};
use crate::error::{ApplyError, StateError};
use crate::mutate::{self, Mutation};
use crate::persist::{self, PersistedState};
use crate::snapshot::{SnapshotHistory, StateSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateMetrics {
    pub total_files: usize,
    pub total_dependencies: usize,
    pub version: u64,
    pub last_update: DateTime<Utc>,
    pub conflicts: u64,
    pub rollbacks: u64,
    pub snapshots: usize,
}

struct WriterState {
    history: SnapshotHistory,
    conflicts: u64,
    rollbacks: u64,
}

pub struct StateManager {
    config: StateConfig,
    writer: AsyncMutex<WriterState>,
    /// Held across a disk write; holds the last version written.
    disk: AsyncMutex<u64>,
    published: watch::Sender<Arc<ProjectState>>,
    pending: Mutex<HashMap<String, usize>>,
}

impl StateManager {
    /// In-memory manager starting from the empty state. Never touches disk,
    /// whatever `config.persist_state` says, until [`StateManager::open`] is used.
    pub fn new(config: StateConfig) -> Self {
        Self::from_parts(config, ProjectState::empty(), Vec::new())
    }

    /// Build a manager, loading persisted state when `persist_state` is set.
    /// A missing state file yields the empty state.
    pub fn open(config: StateConfig) -> Result<Self, StateError> {
        if !config.persist_state {
            return Ok(Self::new(config));
        }
        let path = config.state_path();
        match persist::load_at(&path)? {
            Some(persisted) => {
                tracing::info!(
                    path = %path.display(),
                    version = persisted.state.version,
                    "loaded persisted state",
                );
                Ok(Self::from_parts(config, persisted.state, persisted.history))
            }
            None => Ok(Self::new(config)),
        }
    }

    fn from_parts(config: StateConfig, mut state: ProjectState, history: Vec<StateSnapshot>) -> Self {
        if state.checksum.is_empty() {
            state.checksum = checksum::compute(&state).unwrap_or_default();
        }
        let (published, _) = watch::channel(Arc::new(state));
        Self {
            writer: AsyncMutex::new(WriterState {
                history: SnapshotHistory::from_entries(config.max_version_history, history),
                conflicts: 0,
                rollbacks: 0,
            }),
            config,
            disk: AsyncMutex::new(0),
            published,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Immutable snapshot of the current state.
    pub fn get_state(&self) -> Arc<ProjectState> {
        self.published.borrow().clone()
    }

    /// Receiver notified after every successful application or rollback.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ProjectState>> {
        self.published.subscribe()
    }

    /// Apply one change. Remote changes are checked for conflicts first and
    /// are not applied when one is found.
    pub async fn apply_change(&self, event: &ChangeEvent) -> Result<ApplyOutcome, StateError> {
        let mut writer = self.writer.lock().await;
        let current = self.get_state();

        if event.is_remote() {
            let pending = self.pending_for(event);
            if let ConflictCheck::Conflict(reason) = conflict::check(event, &current, pending) {
                writer.conflicts += 1;
                tracing::warn!(
                    event_id = %event.id,
                    target = %event.target,
                    reason = %reason,
                    "remote change conflicts with local state",
                );
                return Ok(ApplyOutcome::Conflict {
                    reason,
                    state: current,
                });
            }
        }

        let now = Utc::now();
        let mut next = (*current).clone();
        if mutate::apply(&mut next, event, now) == Mutation::Ignored {
            tracing::debug!(
                event_id = %event.id,
                change_type = %event.change_type(),
                operation = %event.operation,
                "operation left state payload unchanged",
            );
        }
        next.version = current.version + 1;
        next.last_update = now;
        next.targets.insert(
            ProjectState::target_key(event.change_type(), &event.target),
            TargetStamp {
                version: next.version,
                updated_at: now,
            },
        );
        next.checksum = checksum::compute(&next)?;
        if self.config.validate_state {
            validate(&next)?;
        }

        writer.history.push(StateSnapshot::capture(
            &current,
            format!("applied {} change: {}", event.change_type(), event.operation),
        ));
        let version = next.version;
        self.published.send_replace(Arc::new(next));
        self.persist_best_effort(writer).await;

        tracing::debug!(
            event_id = %event.id,
            operation = %event.operation,
            target = %event.target,
            version,
            "applied change",
        );
        Ok(ApplyOutcome::Applied { version })
    }

    /// Restore the snapshot taken at `version`. The restored state gets a new,
    /// higher version; versions never repeat.
    pub async fn rollback_to_version(&self, version: u64) -> Result<Arc<ProjectState>, StateError> {
        let mut writer = self.writer.lock().await;
        let snapshot = writer
            .history
            .find(version)
            .cloned()
            .ok_or(StateError::UnknownVersion(version))?;
        let current = self.get_state();

        let mut restored = snapshot.state;
        restored.version = current.version + 1;
        restored.last_update = Utc::now();
        restored.checksum = checksum::compute(&restored)?;

        writer.history.push(StateSnapshot::capture(
            &current,
            format!("rollback to version {version}"),
        ));
        writer.rollbacks += 1;
        let restored = Arc::new(restored);
        self.published.send_replace(restored.clone());
        self.persist_best_effort(writer).await;

        tracing::info!(from = current.version, to = version, "rolled back state");
        Ok(restored)
    }

    pub async fn history(&self) -> Vec<StateSnapshot> {
        self.writer.lock().await.history.to_vec()
    }

    pub async fn metrics(&self) -> StateMetrics {
        let writer = self.writer.lock().await;
        let state = self.get_state();
        StateMetrics {
            total_files: state.files.len(),
            total_dependencies: state.dependencies.len(),
            version: state.version,
            last_update: state.last_update,
            conflicts: writer.conflicts,
            rollbacks: writer.rollbacks,
            snapshots: writer.history.len(),
        }
    }

    /// Pretty JSON export of the current state.
    pub fn export_state(&self) -> Result<String, StateError> {
        let state = self.get_state();
        let doc = json!({
            "state": &*state,
            "metadata": {
                "exported": Utc::now(),
                "version": state.version,
            },
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Persist (when enabled) and release nothing else; safe to call twice.
    pub async fn shutdown(&self) -> Result<(), StateError> {
        if !self.config.persist_state {
            return Ok(());
        }
        let writer = self.writer.lock().await;
        self.persist(writer).await?;
        tracing::info!("state manager shutdown complete");
        Ok(())
    }

    /// Capture the current state and history, release the writer lock, then
    /// write on the blocking pool. A write older than the last one on disk
    /// is skipped.
    async fn persist(&self, writer: MutexGuard<'_, WriterState>) -> Result<(), StateError> {
        let persisted = PersistedState {
            saved_at: Utc::now(),
            state: (*self.get_state()).clone(),
            history: writer.history.to_vec(),
        };
        let mut written = self.disk.lock().await;
        drop(writer);

        let version = persisted.state.version;
        if version < *written {
            return Ok(());
        }
        let path = self.config.state_path();
        tokio::task::spawn_blocking(move || persist::save_at(&path, &persisted))
            .await
            .map_err(|err| StateError::Task(err.to_string()))??;
        *written = version;
        Ok(())
    }

    async fn persist_best_effort(&self, writer: MutexGuard<'_, WriterState>) {
        if !self.config.persist_state {
            return;
        }
        if let Err(err) = self.persist(writer).await {
            tracing::error!(error = %err, "failed to persist state");
        }
    }

    fn pending_for(&self, event: &ChangeEvent) -> usize {
        let key = ProjectState::target_key(event.change_type(), &event.target);
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.get(&key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChangeApplier for StateManager {
    async fn apply(&self, event: &ChangeEvent) -> Result<ApplyOutcome, ApplyError> {
        self.apply_change(event).await.map_err(ApplyError::from)
    }

    fn mark_pending(&self, event: &ChangeEvent) {
        if event.is_remote() {
            return;
        }
        let key = ProjectState::target_key(event.change_type(), &event.target);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending.entry(key).or_insert(0) += 1;
    }

    fn clear_pending(&self, event: &ChangeEvent) {
        if event.is_remote() {
            return;
        }
        let key = ProjectState::target_key(event.change_type(), &event.target);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = pending.get_mut(&key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                pending.remove(&key);
            }
        }
    }
}

fn validate(state: &ProjectState) -> Result<(), StateError> {
    if state.version == 0 {
        return Err(StateError::Validation("version must be positive".into()));
    }
    if state.last_update > Utc::now() {
        return Err(StateError::Validation("last_update is in the future".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncd_core::{ChangePayload, FileMetadata};

    fn file_event(op: &str, target: &str) -> ChangeEvent {
        ChangeEvent::new(
            ChangePayload::File(FileMetadata::default()),
            op,
            target,
            "file-watcher",
        )
    }

    #[tokio::test]
    async fn every_application_bumps_version() {
        let manager = StateManager::new(StateConfig::default());
        let mut last = manager.get_state().version;
        for i in 0..5 {
            let outcome = manager
                .apply_change(&file_event("created", &format!("f{i}.rs")))
                .await
                .expect("apply");
            let ApplyOutcome::Applied { version } = outcome else {
                panic!("unexpected conflict");
            };
            assert!(version > last);
            last = version;
        }
        assert_eq!(manager.get_state().files.len(), 5);
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot() {
        let manager = StateManager::new(StateConfig::default());
        let before = manager.get_state();
        manager
            .apply_change(&file_event("created", "a.rs"))
            .await
            .expect("apply");
        assert!(before.files.is_empty(), "earlier snapshot must not change");
        assert_eq!(manager.get_state().files.len(), 1);
    }

    #[tokio::test]
    async fn pending_local_change_blocks_remote() {
        let manager = StateManager::new(StateConfig::default());
        let local = file_event("modified", "a.rs");
        manager.mark_pending(&local);

        let remote = file_event("modified", "a.rs").remote(Some(1));
        let outcome = manager.apply_change(&remote).await.expect("apply");
        assert!(matches!(outcome, ApplyOutcome::Conflict { .. }));

        manager.clear_pending(&local);
        let outcome = manager.apply_change(&remote).await.expect("apply");
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn rollback_restores_content_with_new_version() {
        let manager = StateManager::new(StateConfig::default());
        manager
            .apply_change(&file_event("created", "a.rs"))
            .await
            .expect("apply");
        let v2 = manager.get_state().version;
        manager
            .apply_change(&file_event("created", "b.rs"))
            .await
            .expect("apply");

        let restored = manager.rollback_to_version(v2).await.expect("rollback");
        assert_eq!(restored.files.len(), 1);
        assert!(restored.version > v2 + 1);
        assert_eq!(manager.metrics().await.rollbacks, 1);

        assert!(matches!(
            manager.rollback_to_version(999).await,
            Err(StateError::UnknownVersion(999))
        ));
    }
}
