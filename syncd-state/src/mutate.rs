//! Per-type state mutations.
//!
//! Pure functions over a `ProjectState` value; the manager owns versioning,
//! checksums and publication. Unknown operations leave the payload untouched
//! and report [`Mutation::Ignored`].

use chrono::{DateTime, Utc};
use syncd_core::priority::infer_file_kind;
use syncd_core::{
    BuildMetadata, BuildStatus, ChangeEvent, ChangePayload, DependencyMetadata, DependencyState,
    FileMetadata, FileState, GitMetadata, GitStatus, ProjectState, ServerMetadata, ServerStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Changed,
    Ignored,
}

/// Apply `event` to `state` as observed at `now`.
pub fn apply(state: &mut ProjectState, event: &ChangeEvent, now: DateTime<Utc>) -> Mutation {
    let op = event.operation.as_str();
    let target = event.target.as_str();
    match &event.payload {
        ChangePayload::File(meta) => apply_file(state, op, target, meta, now),
        ChangePayload::Git(meta) => apply_git(state, op, meta, now),
        ChangePayload::Dependency(meta) => apply_dependency(state, op, target, meta, now),
        ChangePayload::Build(meta) => apply_build(state, op, meta, now),
        ChangePayload::Server(meta) => apply_server(state, op, meta, now),
    }
}

fn apply_file(
    state: &mut ProjectState,
    op: &str,
    target: &str,
    meta: &FileMetadata,
    now: DateTime<Utc>,
) -> Mutation {
    match op {
        "created" | "modified" => {
            state.files.insert(
                target.to_string(),
                FileState {
                    path: target.to_string(),
                    size: meta.size.unwrap_or(0),
                    modified: meta.modified.unwrap_or(now),
                    file_type: meta.file_type.unwrap_or_else(|| infer_file_kind(target)),
                    hash: meta.hash.clone().unwrap_or_default(),
                    is_tracked: true,
                    encoding: meta.encoding.clone(),
                    last_scanned: now,
                },
            );
            Mutation::Changed
        }
        "deleted" => {
            state.files.remove(target);
            Mutation::Changed
        }
        "moved" => {
            let Some(old_path) = meta.old_path.as_deref() else {
                return Mutation::Ignored;
            };
            match state.files.remove(old_path) {
                Some(previous) => {
                    state.files.insert(
                        target.to_string(),
                        FileState {
                            path: target.to_string(),
                            last_scanned: now,
                            ..previous
                        },
                    );
                    Mutation::Changed
                }
                None => Mutation::Ignored,
            }
        }
        _ => Mutation::Ignored,
    }
}

fn apply_git(
    state: &mut ProjectState,
    op: &str,
    meta: &GitMetadata,
    now: DateTime<Utc>,
) -> Mutation {
    let git = &mut state.git;
    let mutation = match op {
        "commit" => {
            git.head = meta.commit.clone().unwrap_or_default();
            Mutation::Changed
        }
        "branch" => {
            git.branch = meta.branch.clone().unwrap_or_default();
            Mutation::Changed
        }
        "conflict" => {
            git.status = GitStatus::Conflict;
            Mutation::Changed
        }
        "resolve" => {
            git.status = GitStatus::Clean;
            Mutation::Changed
        }
        "status" => Mutation::Changed,
        _ => Mutation::Ignored,
    };

    if let Some(staged) = &meta.staged {
        git.staged = staged.clone();
    }
    if let Some(unstaged) = &meta.unstaged {
        git.unstaged = unstaged.clone();
    }
    if let Some(untracked) = &meta.untracked {
        git.untracked = untracked.clone();
    }
    if let Some(ahead) = meta.ahead {
        git.ahead = ahead;
    }
    if let Some(behind) = meta.behind {
        git.behind = behind;
    }
    if let Some(remote_changes) = meta.remote_changes {
        git.remote_changes = remote_changes;
    }

    if git.status != GitStatus::Conflict {
        git.status = if git.staged.is_empty() && git.unstaged.is_empty() {
            GitStatus::Clean
        } else {
            GitStatus::Dirty
        };
    }
    git.last_checked = Some(now);
    mutation
}

fn apply_dependency(
    state: &mut ProjectState,
    op: &str,
    target: &str,
    meta: &DependencyMetadata,
    now: DateTime<Utc>,
) -> Mutation {
    let fresh = || DependencyState {
        name: target.to_string(),
        version: meta.new_version.clone().unwrap_or_default(),
        kind: meta.dependency_type,
        workspace: meta.workspace.clone(),
        installed: true,
        vulnerabilities: 0,
        last_updated: now,
    };

    match op {
        "added" => {
            state.dependencies.insert(target.to_string(), fresh());
            Mutation::Changed
        }
        "updated" => {
            let dep = state
                .dependencies
                .entry(target.to_string())
                .or_insert_with(fresh);
            if let Some(version) = &meta.new_version {
                dep.version = version.clone();
            }
            dep.last_updated = now;
            Mutation::Changed
        }
        "removed" => {
            state.dependencies.remove(target);
            Mutation::Changed
        }
        "vulnerability" => match state.dependencies.get_mut(target) {
            Some(dep) => {
                dep.vulnerabilities = if meta.vulnerabilities.is_empty() {
                    usize::from(meta.severity.is_some())
                } else {
                    meta.vulnerabilities.len()
                };
                dep.last_updated = now;
                Mutation::Changed
            }
            None => Mutation::Ignored,
        },
        _ => Mutation::Ignored,
    }
}

fn apply_build(
    state: &mut ProjectState,
    op: &str,
    meta: &BuildMetadata,
    now: DateTime<Utc>,
) -> Mutation {
    let build = &mut state.build;
    match op {
        "started" => {
            build.status = BuildStatus::Building;
            build.last_build = Some(now);
            build.errors.clear();
            build.warnings.clear();
            Mutation::Changed
        }
        "success" => {
            build.status = BuildStatus::Success;
            build.duration_ms = Some(meta.duration_ms.unwrap_or(0));
            build.assets = meta.assets.clone();
            build.performance = meta.performance.clone();
            Mutation::Changed
        }
        "failed" => {
            build.status = BuildStatus::Failed;
            build.errors = meta.errors.clone();
            build.warnings = meta.warnings.clone();
            Mutation::Changed
        }
        _ => Mutation::Ignored,
    }
}

fn apply_server(
    state: &mut ProjectState,
    op: &str,
    meta: &ServerMetadata,
    now: DateTime<Utc>,
) -> Mutation {
    let server = &mut state.server;
    match op {
        "started" => {
            server.status = ServerStatus::Running;
            server.port = meta.port;
            server.pid = meta.pid;
            server.start_time = Some(now);
            server.uptime_ms = Some(0);
            server.requests = 0;
            server.errors = 0;
            Mutation::Changed
        }
        "stopped" => {
            server.status = ServerStatus::Stopped;
            server.uptime_ms = Some(
                server
                    .start_time
                    .map(|start| (now - start).num_milliseconds().max(0) as u64)
                    .unwrap_or(0),
            );
            Mutation::Changed
        }
        "error" => {
            server.status = ServerStatus::Error;
            server.errors += 1;
            Mutation::Changed
        }
        _ => Mutation::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncd_core::{DependencyKind, FileKind, Severity};

    fn event(payload: ChangePayload, op: &str, target: &str) -> ChangeEvent {
        ChangeEvent::new(payload, op, target, "test")
    }

    #[test]
    fn file_lifecycle_create_move_delete() {
        let mut state = ProjectState::empty();
        let now = Utc::now();
        let created = event(
            ChangePayload::File(FileMetadata {
                size: Some(12),
                hash: Some("abc".into()),
                ..Default::default()
            }),
            "created",
            "src/a.rs",
        );
        assert_eq!(apply(&mut state, &created, now), Mutation::Changed);
        let file = &state.files["src/a.rs"];
        assert_eq!(file.size, 12);
        assert_eq!(file.file_type, FileKind::Source);
        assert!(file.is_tracked);

        let moved = event(
            ChangePayload::File(FileMetadata {
                old_path: Some("src/a.rs".into()),
                ..Default::default()
            }),
            "moved",
            "src/b.rs",
        );
        assert_eq!(apply(&mut state, &moved, now), Mutation::Changed);
        assert!(!state.files.contains_key("src/a.rs"));
        assert_eq!(state.files["src/b.rs"].hash, "abc");

        let deleted = event(ChangePayload::File(FileMetadata::default()), "deleted", "src/b.rs");
        apply(&mut state, &deleted, now);
        assert!(state.files.is_empty());
    }

    #[test]
    fn git_status_follows_working_tree() {
        let mut state = ProjectState::empty();
        let now = Utc::now();
        let status = event(
            ChangePayload::Git(GitMetadata {
                unstaged: Some(vec!["src/a.rs".into()]),
                ..Default::default()
            }),
            "status",
            "main",
        );
        apply(&mut state, &status, now);
        assert_eq!(state.git.status, GitStatus::Dirty);

        let conflict = event(ChangePayload::Git(GitMetadata::default()), "conflict", "main");
        apply(&mut state, &conflict, now);
        assert_eq!(state.git.status, GitStatus::Conflict);

        let resolve = event(
            ChangePayload::Git(GitMetadata {
                unstaged: Some(vec![]),
                ..Default::default()
            }),
            "resolve",
            "main",
        );
        apply(&mut state, &resolve, now);
        assert_eq!(state.git.status, GitStatus::Clean);
        assert_eq!(state.git.last_checked, Some(now));
    }

    #[test]
    fn dependency_vulnerability_counts_entries() {
        let mut state = ProjectState::empty();
        let now = Utc::now();
        let added = event(
            ChangePayload::Dependency(DependencyMetadata {
                new_version: Some("4.17.20".into()),
                dependency_type: DependencyKind::Dependency,
                ..Default::default()
            }),
            "added",
            "lodash",
        );
        apply(&mut state, &added, now);

        let vuln = event(
            ChangePayload::Dependency(DependencyMetadata {
                severity: Some(Severity::Critical),
                ..Default::default()
            }),
            "vulnerability",
            "lodash",
        );
        assert_eq!(apply(&mut state, &vuln, now), Mutation::Changed);
        assert_eq!(state.dependencies["lodash"].vulnerabilities, 1);

        let unknown = event(
            ChangePayload::Dependency(DependencyMetadata::default()),
            "vulnerability",
            "not-installed",
        );
        assert_eq!(apply(&mut state, &unknown, now), Mutation::Ignored);
    }

    #[test]
    fn server_error_increments_counter() {
        let mut state = ProjectState::empty();
        let now = Utc::now();
        let started = event(
            ChangePayload::Server(ServerMetadata {
                port: Some(3000),
                ..Default::default()
            }),
            "started",
            "dev",
        );
        apply(&mut state, &started, now);
        let error = event(ChangePayload::Server(ServerMetadata::default()), "error", "dev");
        apply(&mut state, &error, now);
        assert_eq!(state.server.status, ServerStatus::Error);
        assert_eq!(state.server.errors, 1);
        assert_eq!(state.server.port, Some(3000));
    }

    #[test]
    fn unknown_operation_is_ignored() {
        let mut state = ProjectState::empty();
        let before = state.clone();
        let odd = event(ChangePayload::Build(BuildMetadata::default()), "exploded", "web");
        assert_eq!(apply(&mut state, &odd, Utc::now()), Mutation::Ignored);
        assert_eq!(state, before);
    }
}
