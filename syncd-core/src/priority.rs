//! Producer-side priority heuristics.
//!
//! Watchers assign the initial priority of every event they emit. The rules
//! live here so that all producers (and tests) agree on them:
//!
//! | type | rule | priority |
//! |---|---|---|
//! | dependency | vulnerability, severity critical/high | critical |
//! | dependency | vulnerability, severity moderate | high |
//! | dependency | vulnerability, other | medium |
//! | dependency | major update | high |
//! | dependency | production dependency | medium |
//! | file | lockfile or `package.json` | critical |
//! | file | config, `.env*`, `*.config*` | high |
//! | file | source | medium |
//! | git | conflict | critical |
//! | git | commit, branch | high |
//! | build | failed | high |
//! | server | error | critical |
//!
//! Anything else is `low` (file, dependency, build, server) or `medium` (git).

use std::path::Path;

use crate::types::{
    ChangePayload, DependencyKind, DependencyMetadata, FileKind, Priority, SemverType, Severity,
};

const LOCKFILES: [&str; 6] = [
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "Cargo.toml",
];

/// Suggest a priority for a freshly observed change.
pub fn suggest(payload: &ChangePayload, operation: &str, target: &str) -> Priority {
    match payload {
        ChangePayload::File(meta) => {
            file_priority(target, meta.file_type.unwrap_or_else(|| infer_file_kind(target)))
        }
        ChangePayload::Dependency(meta) => dependency_priority(operation, meta),
        ChangePayload::Git(_) => match operation {
            "conflict" => Priority::Critical,
            "commit" | "branch" => Priority::High,
            _ => Priority::Medium,
        },
        ChangePayload::Build(_) => match operation {
            "failed" => Priority::High,
            _ => Priority::Low,
        },
        ChangePayload::Server(_) => match operation {
            "error" => Priority::Critical,
            _ => Priority::Low,
        },
    }
}

fn file_priority(target: &str, kind: FileKind) -> Priority {
    let name = Path::new(target)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(target);

    if LOCKFILES.contains(&name) {
        return Priority::Critical;
    }
    if kind == FileKind::Config || name.contains(".env") || name.contains(".config") {
        return Priority::High;
    }
    if kind == FileKind::Source {
        return Priority::Medium;
    }
    Priority::Low
}

fn dependency_priority(operation: &str, meta: &DependencyMetadata) -> Priority {
    if operation == "vulnerability" {
        return match meta.effective_severity() {
            Some(Severity::Critical) | Some(Severity::High) => Priority::Critical,
            Some(Severity::Moderate) => Priority::High,
            _ => Priority::Medium,
        };
    }
    if operation == "updated" && meta.semver_type == Some(SemverType::Major) {
        return Priority::High;
    }
    if meta.dependency_type == DependencyKind::Dependency {
        return Priority::Medium;
    }
    Priority::Low
}

/// Classify a path by extension when the producer did not.
pub fn infer_file_kind(target: &str) -> FileKind {
    let path = Path::new(target);
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.contains(".test.") || name.contains(".spec.") || name.ends_with("_test.rs") {
        return FileKind::Test;
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" | "yaml" | "yml" | "toml" | "env" | "ini" => FileKind::Config,
        "rs" | "ts" | "tsx" | "js" | "jsx" | "mjs" | "py" | "go" | "java" | "kt" | "css"
        | "scss" => FileKind::Source,
        "md" | "mdx" | "txt" | "rst" => FileKind::Documentation,
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "ico" | "webp" | "woff" | "woff2" => {
            FileKind::Asset
        }
        _ => FileKind::Other,
    }
}
