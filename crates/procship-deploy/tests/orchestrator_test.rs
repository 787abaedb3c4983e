// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deploy, undeploy and migration workflows against the in-memory execution server.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use procship_deploy::{
    ArtifactPublisher, DeployError, DeploymentOrchestrator, DeploymentPlan, PublishTarget,
    RemoteRepository, Step, UndeployPolicy,
};
use procship_package::{
    ArtifactPackager, Handler, LocalRepository, ProcessBuilder, ProcessDeclaration, Release,
};
use procship_sdk::{
    ContainerLifecycleClient, Coordinates, InMemoryExecutionServer, ProcessInstanceState,
};
use serde_json::Map;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLASS: &[u8] = b"\xCA\xFE\xBA\xBE\x00\x00\x00\x41";
const LOCAL_SERVER: &str = "http://127.0.0.1:8080/kie-server";

struct Approval;

impl ProcessDeclaration for Approval {
    fn name(&self) -> &str {
        "Approval"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn process_id(&self) -> &str {
        "demo.approval"
    }

    fn build_model(&self, b: &mut ProcessBuilder) -> procship_package::Result<()> {
        let start = b.start("Start");
        let email = b.work_item("Notify", "Email");
        let end = b.end("End");
        b.connect(start, email).connect(email, end);
        Ok(())
    }
}

fn plan() -> Arc<DeploymentPlan> {
    Arc::new(
        DeploymentPlan::new()
            .with_process(Approval)
            .with_handler(Handler::new("Email", "1.0", "com.acme.EmailHandler")),
    )
}

struct Fixture {
    dir: TempDir,
    repository: LocalRepository,
    server: InMemoryExecutionServer,
    release: Release,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes/com/acme");
        fs::create_dir_all(&classes).unwrap();
        fs::write(classes.join("EmailHandler.class"), CLASS).unwrap();

        let repository = LocalRepository::new(dir.path().join("repo"));
        let server = InMemoryExecutionServer::with_repository(dir.path().join("repo"));
        let release = Release::new(Coordinates::new("com.acme", "demo", "1.0.0"), "demo");
        Self {
            dir,
            repository,
            server,
            release,
        }
    }

    fn orchestrator_with_target(&self, release: &Release, target: PublishTarget) -> DeploymentOrchestrator {
        let packager = ArtifactPackager::new(self.repository.clone())
            .with_classpath([self.dir.path().join("classes").display().to_string()]);
        let publisher = ArtifactPublisher::new(self.repository.clone()).unwrap();
        let containers =
            ContainerLifecycleClient::new(Arc::new(self.server.clone())).with_page_size(50);
        DeploymentOrchestrator::new(release.clone(), packager, publisher, containers, target)
            .with_undeploy_policy(UndeployPolicy::default().with_retry_delay(Duration::ZERO))
    }

    fn orchestrator(&self, release: &Release) -> DeploymentOrchestrator {
        self.orchestrator_with_target(release, PublishTarget::new(Url::parse(LOCAL_SERVER).unwrap()))
    }

    async fn start(&self, container_id: &str, process_id: &str) -> i64 {
        ContainerLifecycleClient::new(Arc::new(self.server.clone()))
            .start_process(container_id, process_id, &Map::new())
            .await
            .unwrap()
    }
}

// ============================================================================
// Deploy
// ============================================================================

#[tokio::test]
async fn test_fresh_deploy() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);

    assert!(orchestrator.deploy(&plan(), false).await);

    let container = fx.server.container("demo_1.0.0").await.unwrap();
    assert_eq!(container.release_id, Coordinates::new("com.acme", "demo", "1.0.0"));
    assert_eq!(container.container_alias.as_deref(), Some("demo"));
    assert!(
        fx.repository
            .artifact_path(fx.release.coordinates(), "jar")
            .is_file()
    );
    assert_eq!(fx.repository.lookup_paths().len(), 1);
}

#[tokio::test]
async fn test_redeploy_requires_overwrite() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);
    assert!(orchestrator.deploy(&plan(), false).await);
    let running = fx.start("demo_1.0.0", "demo.approval").await;

    let err = orchestrator.try_deploy(&plan(), false).await.unwrap_err();
    assert_eq!(err.failed_step(), Some(Step::Create));

    assert!(orchestrator.deploy(&plan(), true).await);
    assert!(fx.server.container("demo_1.0.0").await.is_some());
    assert!(fx.server.instance(running).await.is_none());
}

#[tokio::test]
async fn test_publish_failure_stops_before_create() {
    let fx = Fixture::new();
    let repository = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&repository)
        .await;

    let target = PublishTarget::new(Url::parse("http://10.255.255.1:8080/kie-server").unwrap())
        .with_remote(RemoteRepository {
            url: Url::parse(&format!("{}/repository/releases", repository.uri())).unwrap(),
            username: "ci".to_string(),
            password: "token".to_string(),
        });
    let orchestrator = fx.orchestrator_with_target(&fx.release, target);

    let err = orchestrator.try_deploy(&plan(), false).await.unwrap_err();
    assert_eq!(err.failed_step(), Some(Step::Publish));
    assert!(err.to_string().contains("transitive dependencies"));

    assert!(!orchestrator.deploy(&plan(), false).await);
    assert_eq!(fx.server.calls().await.create, 0);
    let containers = orchestrator.containers().list_containers().await.unwrap();
    assert!(containers.iter().all(|c| c.container_id != "demo_1.0.0"));
}

#[tokio::test]
async fn test_deploy_from_spawned_task() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);
    let plan = plan();

    let handle = tokio::spawn(async move { orchestrator.try_deploy(&plan, false).await });
    let container = handle.await.unwrap().unwrap();

    assert_eq!(container.container_id, "demo_1.0.0");
    assert!(fx.server.container("demo_1.0.0").await.is_some());
}

#[tokio::test]
async fn test_packaging_failure_is_reported_as_package_step() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);
    let plan = Arc::new(
        DeploymentPlan::new().with_handler(Handler::new("Sms", "1.0", "com.acme.SmsHandler")),
    );

    let err = orchestrator.try_deploy(&plan, false).await.unwrap_err();
    assert_eq!(err.failed_step(), Some(Step::Package));
    assert_eq!(fx.server.calls().await.create, 0);
}

// ============================================================================
// Undeploy
// ============================================================================

#[tokio::test]
async fn test_undeploy_is_idempotent() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);
    assert!(orchestrator.deploy(&plan(), false).await);
    fx.start("demo_1.0.0", "demo.approval").await;

    assert!(orchestrator.undeploy("demo_1.0.0", true).await.unwrap());
    assert!(fx.server.container("demo_1.0.0").await.is_none());

    let before = fx.server.calls().await.mutating();
    assert!(orchestrator.undeploy("demo_1.0.0", true).await.unwrap());
    assert_eq!(fx.server.calls().await.mutating(), before);
}

#[tokio::test]
async fn test_undeploy_unknown_container() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);

    assert!(orchestrator.undeploy("never_deployed", true).await.unwrap());
    assert_eq!(fx.server.calls().await.mutating(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_undeploy_retries_transient_abort_failures() {
    let fx = Fixture::new();
    let orchestrator = fx
        .orchestrator(&fx.release)
        .with_undeploy_policy(UndeployPolicy::default());
    assert!(orchestrator.deploy(&plan(), false).await);

    let parent = fx.start("demo_1.0.0", "demo.approval").await;
    let child = fx.server.start_child(parent, "demo.approval").await.unwrap();
    fx.server
        .fail_next_aborts(&format!("Process instance {} is already aborted", child), 3)
        .await;

    assert!(orchestrator.undeploy("demo_1.0.0", true).await.unwrap());

    let calls = fx.server.calls().await;
    assert_eq!(calls.abort, 4);
    assert_eq!(calls.list_instances, 4);
    assert_eq!(calls.dispose, 1);
    assert!(fx.server.container("demo_1.0.0").await.is_none());
}

#[tokio::test]
async fn test_undeploy_fails_fast_on_other_abort_errors() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);
    assert!(orchestrator.deploy(&plan(), false).await);
    let running = fx.start("demo_1.0.0", "demo.approval").await;
    fx.server
        .fail_next_aborts("User deployer is not authorized", 1)
        .await;

    let err = orchestrator.undeploy("demo_1.0.0", true).await.unwrap_err();
    assert_eq!(err.failed_step(), Some(Step::Abort));

    let calls = fx.server.calls().await;
    assert_eq!(calls.abort, 1);
    assert_eq!(calls.dispose, 0);
    let instance = fx.server.instance(running).await.unwrap();
    assert_eq!(instance.state, ProcessInstanceState::Active);
}

#[tokio::test]
async fn test_undeploy_gives_up_after_max_passes() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release).with_undeploy_policy(
        UndeployPolicy::default()
            .with_max_abort_passes(3)
            .with_retry_delay(Duration::ZERO),
    );
    assert!(orchestrator.deploy(&plan(), false).await);
    fx.start("demo_1.0.0", "demo.approval").await;
    fx.server
        .fail_next_aborts("Could not find process instance with id 99", 5)
        .await;

    let err = orchestrator.undeploy("demo_1.0.0", true).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::AbortRetriesExhausted { ref container_id, attempts: 3 } if container_id == "demo_1.0.0"
    ));
    assert_eq!(fx.server.calls().await.abort, 3);
    assert!(fx.server.container("demo_1.0.0").await.is_some());
}

#[tokio::test]
async fn test_undeploy_without_cancel_skips_aborts() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);
    assert!(orchestrator.deploy(&plan(), false).await);
    fx.start("demo_1.0.0", "demo.approval").await;

    assert!(orchestrator.undeploy("demo_1.0.0", false).await.unwrap());
    let calls = fx.server.calls().await;
    assert_eq!(calls.abort, 0);
    assert_eq!(calls.list_instances, 0);
}

#[tokio::test]
async fn test_undeploy_fails_when_container_lookup_fails() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);
    assert!(orchestrator.deploy(&plan(), false).await);
    fx.server.fail_next_get("<html>Unauthorized</html>").await;

    let err = orchestrator.undeploy("demo_1.0.0", true).await.unwrap_err();
    assert_eq!(err.failed_step(), Some(Step::Inspect));
    assert!(err.to_string().contains("Unauthorized"));

    let calls = fx.server.calls().await;
    assert_eq!(calls.dispose, 0);
    assert!(fx.server.container("demo_1.0.0").await.is_some());
}

#[tokio::test]
async fn test_undeploy_reports_refused_dispose() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&fx.release);
    assert!(orchestrator.deploy(&plan(), false).await);
    fx.server
        .fail_next_dispose("Container demo_1.0.0 is in use")
        .await;

    assert!(!orchestrator.undeploy("demo_1.0.0", false).await.unwrap());
    assert_eq!(fx.server.calls().await.dispose, 1);
    assert!(fx.server.container("demo_1.0.0").await.is_some());

    assert!(orchestrator.undeploy("demo_1.0.0", false).await.unwrap());
    assert!(fx.server.container("demo_1.0.0").await.is_none());
}

// ============================================================================
// Migration
// ============================================================================

#[tokio::test]
async fn test_deploy_with_migration_moves_declared_processes() {
    let fx = Fixture::new();
    fx.server
        .define_process("demo_1.0.0", "demo.approval", "Approval", "1.0")
        .await;
    fx.server
        .define_process("demo_1.0.0", "demo.other", "Other", "1.0")
        .await;
    fx.server
        .define_process("demo_1.0.1", "demo.approval", "Approval", "2.0")
        .await;

    let v1 = fx.orchestrator(&fx.release);
    assert!(v1.deploy(&plan(), false).await);
    let first = fx.start("demo_1.0.0", "demo.approval").await;
    let second = fx.start("demo_1.0.0", "demo.approval").await;
    let other = fx.start("demo_1.0.0", "demo.other").await;

    let v2 = fx.orchestrator(&fx.release.with_version("1.0.1"));
    let outcome = v2.deploy_with_migration(&plan(), "demo_1.0.0").await;

    assert!(outcome.deployed);
    assert!(outcome.all_succeeded());
    let mut migrated: Vec<i64> = outcome
        .reports
        .iter()
        .map(|r| r.process_instance_id)
        .collect();
    migrated.sort();
    assert_eq!(migrated, vec![first, second]);

    let instance = fx.server.instance(first).await.unwrap();
    assert_eq!(instance.container_id, "demo_1.0.1");
    assert_eq!(instance.process_version, "2.0");
    assert_eq!(instance.state, ProcessInstanceState::Active);
    let listed = v2
        .containers()
        .list_active_instances("demo_1.0.1")
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    assert!(v2.containers().get_info("demo_1.0.0").await.unwrap().is_none());
    assert!(fx.server.container("demo_1.0.0").await.is_none());
    assert!(fx.server.instance(other).await.is_none());
    assert_eq!(fx.server.calls().await.migrate, 1);
}

#[tokio::test]
async fn test_deploy_with_migration_stops_when_deploy_fails() {
    let fx = Fixture::new();
    let v1 = fx.orchestrator(&fx.release);
    assert!(v1.deploy(&plan(), false).await);
    let running = fx.start("demo_1.0.0", "demo.approval").await;

    fx.server.fail_next_create("Failed to create container").await;
    let v2 = fx.orchestrator(&fx.release.with_version("1.0.1"));
    let outcome = v2.deploy_with_migration(&plan(), "demo_1.0.0").await;

    assert!(!outcome.deployed);
    assert!(outcome.reports.is_empty());
    assert!(fx.server.container("demo_1.0.0").await.is_some());
    assert!(fx.server.instance(running).await.is_some());
    assert_eq!(fx.server.calls().await.migrate, 0);
}

#[tokio::test]
async fn test_migrate_with_node_mapping() {
    let fx = Fixture::new();
    let v1 = fx.orchestrator(&fx.release);
    assert!(v1.deploy(&plan(), false).await);
    let running = fx.start("demo_1.0.0", "demo.approval").await;

    let v2 = fx.orchestrator(&fx.release.with_version("1.0.1"));
    assert!(v2.deploy(&plan(), false).await);

    let mapping = [("_jbpm-unique-2".to_string(), "_jbpm-unique-2".to_string())]
        .into_iter()
        .collect();
    let reports = v2
        .migrate_with_node_mapping("demo_1.0.0", "demo.approval", &[running, 999], mapping)
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().any(|r| r.process_instance_id == running && r.success));
    assert!(reports.iter().any(|r| r.process_instance_id == 999 && !r.success));
}
