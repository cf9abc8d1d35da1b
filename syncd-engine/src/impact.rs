//! Change impact classification.
//!
//! Rules are evaluated in table order and a later match overrides the
//! category set by an earlier one:
//!
//! | type | condition | category | recovery | users |
//! |---|---|---|---|---|
//! | file | config file | moderate | simple | 0 |
//! | file | source file | significant | simple | 100 |
//! | git | `conflict` | critical | complex | 1000 |
//! | dependency | `vulnerability` | critical | moderate | 1000 |
//! | dependency | major semver delta | significant | moderate | 0 |
//! | build | `failed` | significant | simple | 50 |
//! | server | `error` | critical | complex | 1000 |
//!
//! Rollback is possible for everything but `critical`.

use std::fmt;

use serde::Serialize;
use syncd_core::{ChangeEvent, ChangePayload, FileKind, SemverType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactCategory {
    Minor,
    Moderate,
    Significant,
    Critical,
}

impl fmt::Display for ImpactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImpactCategory::Minor => "minor",
            ImpactCategory::Moderate => "moderate",
            ImpactCategory::Significant => "significant",
            ImpactCategory::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryComplexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeImpact {
    pub category: ImpactCategory,
    pub affected_systems: Vec<&'static str>,
    pub estimated_users: u32,
    pub recovery_complexity: RecoveryComplexity,
    pub rollback_possible: bool,
    pub description: String,
}

/// Classify the blast radius of `event`. Pure.
pub fn analyze(event: &ChangeEvent) -> ChangeImpact {
    let mut category = ImpactCategory::Minor;
    let mut systems: Vec<&'static str> = Vec::new();
    let mut users = 0;
    let mut recovery = RecoveryComplexity::Simple;
    let op = event.operation.as_str();

    match &event.payload {
        ChangePayload::File(meta) => {
            systems.push("file-system");
            match meta.file_type {
                Some(FileKind::Config) => {
                    category = ImpactCategory::Moderate;
                    systems.push("configuration");
                }
                Some(FileKind::Source) => {
                    category = ImpactCategory::Significant;
                    systems.push("application");
                    users = 100;
                }
                _ => {}
            }
        }
        ChangePayload::Git(_) => {
            systems.push("version-control");
            if op == "conflict" {
                category = ImpactCategory::Critical;
                recovery = RecoveryComplexity::Complex;
                users = 1000;
            }
        }
        ChangePayload::Dependency(meta) => {
            systems.extend(["package-management", "application"]);
            if op == "vulnerability" {
                category = ImpactCategory::Critical;
                recovery = RecoveryComplexity::Moderate;
                users = 1000;
            }
            if meta.semver_type == Some(SemverType::Major) {
                category = ImpactCategory::Significant;
                recovery = RecoveryComplexity::Moderate;
            }
        }
        ChangePayload::Build(_) => {
            systems.push("build-system");
            if op == "failed" {
                category = ImpactCategory::Significant;
                users = 50;
            }
        }
        ChangePayload::Server(_) => {
            systems.push("runtime");
            if op == "error" {
                category = ImpactCategory::Critical;
                recovery = RecoveryComplexity::Complex;
                users = 1000;
            }
        }
    }

    ChangeImpact {
        category,
        affected_systems: systems,
        estimated_users: users,
        recovery_complexity: recovery,
        rollback_possible: category != ImpactCategory::Critical,
        description: format!("{} {} on {}", event.change_type(), op, event.target),
    }
}
