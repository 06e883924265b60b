//! Integration tests for the enumeration orchestrator: access probe, target
//! selection and failure isolation.

mod common;

use common::*;
use dirscout_aad::{
    AadError, BackfillTargets, EnumerationOrchestrator, EnumerationOutcome, EnumerationReport,
    JsonLinesSink, MemorySink,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

/// Mounts a small tenant: two users, no groups, one application with an
/// owner, one first-party principal and one role with a member.
async fn mount_tenant(server: &MockDirectoryServer) {
    server.mock_probe_ok().await;
    server
        .mock_get(
            "users",
            collection(vec![create_user("u1"), create_user("u2")], None),
        )
        .await;
    server.mock_get("groups", collection(vec![], None)).await;
    server
        .mock_get("applications", collection(vec![create_application("a1")], None))
        .await;
    server
        .mock_get("applications/a1/owners", collection(vec![create_user("u1")], None))
        .await;
    server
        .mock_get(
            "servicePrincipals",
            collection(vec![create_service_principal("sp1", true)], None),
        )
        .await;
    server
        .mock_get("directoryRoles", collection(vec![create_role("r1")], None))
        .await;
    server
        .mock_get("directoryRoles/r1/members", collection(vec![create_user("u2")], None))
        .await;
}

async fn run_full(server: &MockDirectoryServer) -> (EnumerationReport, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let orchestrator =
        EnumerationOrchestrator::new(server.config(), StaticTokenProvider::new(), sink.clone());

    match orchestrator.run(None).await.unwrap() {
        EnumerationOutcome::Completed(report) => (report, sink),
        EnumerationOutcome::NoAccess => panic!("probe unexpectedly failed"),
    }
}

/// A probe error means no crawler runs and nothing is written.
#[tokio::test]
async fn test_probe_error_is_no_access() {
    let server = MockDirectoryServer::new().await;
    server
        .mock_probe(
            200,
            odata_error(
                "Authorization_RequestDenied",
                "Insufficient privileges to complete the operation.",
            ),
        )
        .await;
    server
        .mock_get_expect("groups", collection(vec![create_group("g1")], None), 0)
        .await;

    let sink = Arc::new(MemorySink::new());
    let provider = StaticTokenProvider::new();
    let orchestrator =
        EnumerationOrchestrator::new(server.config(), provider.clone(), sink.clone());

    let outcome = orchestrator.run(None).await.unwrap();

    assert_eq!(outcome, EnumerationOutcome::NoAccess);
    assert!(sink.is_empty());
    assert!(orchestrator.coverage().is_empty());
    assert_eq!(provider.calls(), 1);
    assert_eq!(
        server.received_targets().await,
        vec!["/contoso/users?$top=1"]
    );
}

/// A probe rejected with an HTTP status is also a no-access outcome.
#[tokio::test]
async fn test_probe_forbidden_status_is_no_access() {
    let server = MockDirectoryServer::new().await;
    server
        .mock_probe(
            403,
            odata_error("Authentication_MissingOrMalformed", "Access Token missing or malformed."),
        )
        .await;

    let orchestrator = EnumerationOrchestrator::new(
        server.config(),
        StaticTokenProvider::new(),
        Arc::new(MemorySink::new()),
    );

    assert_eq!(
        orchestrator.run(None).await.unwrap(),
        EnumerationOutcome::NoAccess
    );
}

/// A provider failure during the probe is an authentication error.
#[tokio::test]
async fn test_probe_token_failure_propagates() {
    let server = MockDirectoryServer::new().await;
    let orchestrator = EnumerationOrchestrator::new(
        server.config(),
        StaticTokenProvider::failing(),
        Arc::new(MemorySink::new()),
    );

    let err = orchestrator.run(None).await.unwrap_err();

    assert!(err.is_auth_error());
    assert!(server.received_targets().await.is_empty());
}

/// Full enumeration launches one crawler per type, each with its own token.
#[tokio::test]
async fn test_full_enumeration() {
    let server = MockDirectoryServer::new().await;
    mount_tenant(&server).await;

    let sink = Arc::new(MemorySink::new());
    let provider = StaticTokenProvider::new();
    let orchestrator =
        EnumerationOrchestrator::new(server.config(), provider.clone(), sink.clone());

    let report = match orchestrator.run(None).await.unwrap() {
        EnumerationOutcome::Completed(report) => report,
        EnumerationOutcome::NoAccess => panic!("probe unexpectedly failed"),
    };

    assert_eq!(report.crawlers, 5);
    assert_eq!(report.records, 5);
    assert_eq!(
        report.coverage,
        vec!["AADApplication", "AADRole", "AADServicePrincipal", "AADUser"]
    );
    // Probe plus one refresher per crawler.
    assert_eq!(provider.calls(), 6);

    assert_eq!(sink.records("AADApplication")[0].get("owners"), Some(&json!(["u1"])));
    assert_eq!(sink.records("AADServicePrincipal")[0].get("owners"), Some(&json!([])));
    assert_eq!(sink.records("AADRole")[0].get("members"), Some(&json!(["u2"])));
}

/// Coverage is the same across repeated runs over the same data.
#[tokio::test]
async fn test_coverage_is_deterministic() {
    let server = MockDirectoryServer::new().await;
    mount_tenant(&server).await;

    let (first, _) = run_full(&server).await;
    let (second, _) = run_full(&server).await;

    assert_eq!(first.coverage, second.coverage);
    assert_eq!(first.records, second.records);
}

/// Backfill launches one crawler per listed id of the eligible types only.
#[tokio::test]
async fn test_backfill_launches_only_listed_targets() {
    let server = MockDirectoryServer::new().await;
    server.mock_probe_ok().await;
    server
        .mock_get_expect("users/u1", create_user("u1"), 1)
        .await;
    server
        .mock_get_expect("servicePrincipals/sp1", create_service_principal("sp1", false), 1)
        .await;
    server
        .mock_get_expect(
            "servicePrincipals/sp1/owners",
            collection(vec![create_user("u7")], None),
            1,
        )
        .await;

    let targets = BackfillTargets::new()
        .with("User", ["u1"])
        .with("Group", Vec::<String>::new())
        .with("ServicePrincipal", ["sp1"]);

    let sink = Arc::new(MemorySink::new());
    let orchestrator =
        EnumerationOrchestrator::new(server.config(), StaticTokenProvider::new(), sink.clone());

    let report = match orchestrator.run(Some(&targets)).await.unwrap() {
        EnumerationOutcome::Completed(report) => report,
        EnumerationOutcome::NoAccess => panic!("probe unexpectedly failed"),
    };

    assert_eq!(report.crawlers, 2);
    assert_eq!(report.records, 2);
    assert_eq!(report.coverage, vec!["AADServicePrincipal", "AADUser"]);
    assert_eq!(
        sink.records("AADServicePrincipal")[0].get("owners"),
        Some(&json!(["u7"]))
    );

    let mut targets = server.received_targets().await;
    targets.sort();
    assert_eq!(
        targets,
        vec![
            "/contoso/servicePrincipals/sp1",
            "/contoso/servicePrincipals/sp1/owners",
            "/contoso/users/u1",
            "/contoso/users?$top=1",
        ]
    );
}

/// One failing crawler does not stop the others; its error is surfaced.
#[tokio::test]
async fn test_crawler_failure_is_isolated() {
    let server = MockDirectoryServer::new().await;
    mount_tenant(&server).await;
    Mock::given(method("GET"))
        .and(path("/contoso/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(odata_error(
            "Request_UnsupportedQuery",
            "Unsupported query.",
        )))
        .with_priority(1)
        .mount(&server.server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let orchestrator =
        EnumerationOrchestrator::new(server.config(), StaticTokenProvider::new(), sink.clone());

    let err = orchestrator.run(None).await.unwrap_err();

    match err {
        AadError::DirectoryApi { code, .. } => assert_eq!(code, "Request_UnsupportedQuery"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(sink.records("AADUser").len(), 2);
    assert_eq!(sink.records("AADRole").len(), 1);
    assert!(orchestrator.coverage().contains("AADApplication"));
}

/// Records land in one JSON-lines file per type.
#[tokio::test]
async fn test_jsonl_output() {
    let server = MockDirectoryServer::new().await;
    mount_tenant(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let sink = Arc::new(JsonLinesSink::create(dir.path()).await.unwrap());
    let orchestrator =
        EnumerationOrchestrator::new(server.config(), StaticTokenProvider::new(), sink.clone());
    orchestrator.run(None).await.unwrap();

    let users = std::fs::read_to_string(sink.path_for("AADUser")).unwrap();
    let ids: Vec<String> = users
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["objectId"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids, vec!["u1", "u2"]);

    assert!(sink.path_for("AADRole").exists());
    assert!(!sink.path_for("AADGroup").exists());
}
