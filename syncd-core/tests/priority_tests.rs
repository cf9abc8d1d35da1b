use rstest::rstest;

use syncd_core::priority::suggest;
use syncd_core::{
    BuildMetadata, ChangeEvent, ChangePayload, DependencyKind, DependencyMetadata, FileKind,
    FileMetadata, Priority, SemverType, ServerMetadata, Severity, Vulnerability,
};

fn dependency(severity: Option<Severity>, semver: Option<SemverType>, kind: DependencyKind) -> ChangePayload {
    ChangePayload::Dependency(DependencyMetadata {
        severity,
        semver_type: semver,
        dependency_type: kind,
        ..Default::default()
    })
}

#[rstest]
#[case("vulnerability", Some(Severity::Critical), None, DependencyKind::Dependency, Priority::Critical)]
#[case("vulnerability", Some(Severity::High), None, DependencyKind::DevDependency, Priority::Critical)]
#[case("vulnerability", Some(Severity::Moderate), None, DependencyKind::Dependency, Priority::High)]
#[case("vulnerability", Some(Severity::Low), None, DependencyKind::Dependency, Priority::Medium)]
#[case("updated", None, Some(SemverType::Major), DependencyKind::DevDependency, Priority::High)]
#[case("updated", None, Some(SemverType::Minor), DependencyKind::Dependency, Priority::Medium)]
#[case("added", None, None, DependencyKind::DevDependency, Priority::Low)]
fn dependency_priorities(
    #[case] operation: &str,
    #[case] severity: Option<Severity>,
    #[case] semver: Option<SemverType>,
    #[case] kind: DependencyKind,
    #[case] expected: Priority,
) {
    let payload = dependency(severity, semver, kind);
    assert_eq!(suggest(&payload, operation, "left-pad"), expected);
}

#[rstest]
#[case("Cargo.lock", None, Priority::Critical)]
#[case("app/.env.local", None, Priority::High)]
#[case("src/server.ts", Some(FileKind::Source), Priority::Medium)]
#[case("src/server.ts", None, Priority::Medium)]
#[case("docs/guide.md", None, Priority::Low)]
fn file_priorities(
    #[case] target: &str,
    #[case] kind: Option<FileKind>,
    #[case] expected: Priority,
) {
    let payload = ChangePayload::File(FileMetadata {
        file_type: kind,
        ..Default::default()
    });
    assert_eq!(suggest(&payload, "modified", target), expected);
}

#[test]
fn vulnerability_listed_only_in_entries_still_escalates() {
    let payload = ChangePayload::Dependency(DependencyMetadata {
        vulnerabilities: vec![Vulnerability {
            id: "RUSTSEC-2024-0001".to_string(),
            severity: Severity::High,
            title: "memory corruption".to_string(),
        }],
        ..Default::default()
    });
    assert_eq!(suggest(&payload, "vulnerability", "openssl"), Priority::Critical);
}

#[test]
fn new_event_resolves_critical_vulnerability_priority() {
    let event = ChangeEvent::new(
        dependency(Some(Severity::Critical), None, DependencyKind::Dependency),
        "vulnerability",
        "lodash",
        "dependency-tracker",
    );
    assert_eq!(event.priority, Priority::Critical);
    assert_eq!(event.attempts, 0);
    assert!(!event.is_remote());
}

#[test]
fn build_and_server_priorities() {
    let build = ChangePayload::Build(BuildMetadata::default());
    assert_eq!(suggest(&build, "failed", "web"), Priority::High);
    assert_eq!(suggest(&build, "success", "web"), Priority::Low);

    let server = ChangePayload::Server(ServerMetadata::default());
    assert_eq!(suggest(&server, "error", "dev"), Priority::Critical);
}
