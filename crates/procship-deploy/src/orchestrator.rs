// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment orchestration.
//!
//! Sequences packaging, publishing and container lifecycle calls into the three
//! workflows operators run: deploy, undeploy and deploy-with-migration.
//! Every step is awaited before the next one starts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use procship_package::{
    ArtifactPackager, DependencyDeclaration, HandlerDeclaration, LocalRepository,
    ProcessDeclaration, Release, ServiceDeclaration,
};
use procship_sdk::{
    ContainerInfo, ContainerLifecycleClient, KieServerClient, MigrationReport,
    MigrationRequest, ProcessInstance, SdkError,
};
use tracing::{error, info, instrument, warn};

use crate::config::DeployConfig;
use crate::error::{DeployError, Result, Step};
use crate::publisher::{ArtifactPublisher, PublishTarget};

// ============================================================================
// Plan and outcomes
// ============================================================================

/// Declarations that make up one deployment.
///
/// The orchestrator takes plans behind an `Arc` so packaging can run on the
/// blocking thread pool.
#[derive(Default)]
pub struct DeploymentPlan {
    pub dependencies: Vec<DependencyDeclaration>,
    pub processes: Vec<Box<dyn ProcessDeclaration>>,
    pub handlers: Vec<Box<dyn HandlerDeclaration>>,
    pub services: Vec<Box<dyn ServiceDeclaration>>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependency(mut self, dependency: DependencyDeclaration) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_process(mut self, process: impl ProcessDeclaration + 'static) -> Self {
        self.processes.push(Box::new(process));
        self
    }

    pub fn with_handler(mut self, handler: impl HandlerDeclaration + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_service(mut self, service: impl ServiceDeclaration + 'static) -> Self {
        self.services.push(Box::new(service));
        self
    }
}

/// Result of [`DeploymentOrchestrator::deploy_with_migration`].
#[derive(Debug, Clone, Default)]
pub struct MigrationOutcome {
    /// Whether the new container was deployed. Nothing else runs when it was not.
    pub deployed: bool,
    /// One report per instance a migration was attempted for.
    pub reports: Vec<MigrationReport>,
}

impl MigrationOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.deployed && self.reports.iter().all(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &MigrationReport> {
        self.reports.iter().filter(|r| !r.success)
    }
}

/// Bounds on the abort passes run by undeploy.
///
/// Aborting a parent instance aborts its children, so a later abort of a child
/// can fail with a message that only means "already gone". Such failures are
/// retried with a fresh listing after `retry_delay`.
#[derive(Debug, Clone)]
pub struct UndeployPolicy {
    pub max_abort_passes: u32,
    pub retry_delay: Duration,
}

impl Default for UndeployPolicy {
    fn default() -> Self {
        Self {
            max_abort_passes: 10,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl UndeployPolicy {
    pub fn with_max_abort_passes(mut self, passes: u32) -> Self {
        self.max_abort_passes = passes.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Whether an abort failure should trigger another pass.
    pub fn is_transient(&self, err: &SdkError) -> bool {
        err.is_already_aborted()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs deploy, undeploy and migration workflows for one release.
pub struct DeploymentOrchestrator {
    release: Release,
    packager: ArtifactPackager,
    publisher: ArtifactPublisher,
    containers: ContainerLifecycleClient,
    target: PublishTarget,
    policy: UndeployPolicy,
}

impl DeploymentOrchestrator {
    pub fn new(
        release: Release,
        packager: ArtifactPackager,
        publisher: ArtifactPublisher,
        containers: ContainerLifecycleClient,
        target: PublishTarget,
    ) -> Self {
        Self {
            release,
            packager,
            publisher,
            containers,
            target,
            policy: UndeployPolicy::default(),
        }
    }

    /// Wire an orchestrator against the HTTP execution server described by `config`.
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let server =
            KieServerClient::new(config.sdk.clone()).map_err(|e| DeployError::Config(e.to_string()))?;
        let containers =
            ContainerLifecycleClient::new(Arc::new(server)).with_page_size(config.sdk.page_size);

        let repository = LocalRepository::new(&config.local_repository);
        let packager = ArtifactPackager::new(repository.clone())
            .with_classpath(config.classpath.iter().cloned())
            .with_platform_listeners(config.platform_listeners);
        let publisher =
            ArtifactPublisher::new(repository).map_err(|e| DeployError::Config(e.to_string()))?;

        let mut target = PublishTarget::new(config.sdk.server_url.clone());
        if let Some(remote) = &config.remote_repository {
            target = target.with_remote(remote.clone());
        }

        Ok(Self::new(config.release.clone(), packager, publisher, containers, target)
            .with_undeploy_policy(config.undeploy.clone()))
    }

    pub fn with_undeploy_policy(mut self, policy: UndeployPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    pub fn containers(&self) -> &ContainerLifecycleClient {
        &self.containers
    }

    // ------------------------------------------------------------------------
    // Deploy
    // ------------------------------------------------------------------------

    /// Package, publish and start the release's container.
    ///
    /// Returns `false` when any step fails; the failure is logged.
    pub async fn deploy(&self, plan: &Arc<DeploymentPlan>, overwrite: bool) -> bool {
        match self.try_deploy(plan, overwrite).await {
            Ok(_) => true,
            Err(e) => {
                error!(container_id = %self.release.container_id(), error = %e, "Deployment failed");
                false
            }
        }
    }

    /// Like [`deploy`](Self::deploy), returning the failed step.
    #[instrument(skip(self, plan), fields(container_id = %self.release.container_id()))]
    pub async fn try_deploy(
        &self,
        plan: &Arc<DeploymentPlan>,
        overwrite: bool,
    ) -> Result<ContainerInfo> {
        let container_id = self.release.container_id();

        if overwrite && !self.undeploy(&container_id, true).await? {
            warn!("Existing container could not be disposed, create will likely fail");
        }

        // Packaging does file and zip I/O, keep it off the async workers
        let packager = self.packager.clone();
        let release = self.release.clone();
        let declarations = Arc::clone(plan);
        let artifact = tokio::task::spawn_blocking(move || {
            packager.build_artifact(
                &declarations.dependencies,
                &declarations.processes,
                &declarations.handlers,
                &declarations.services,
                &release,
            )
        })
        .await
        .map_err(|e| DeployError::step(Step::Package, &container_id, e))?
        .map_err(|e| DeployError::step(Step::Package, &container_id, e))?;

        let published = self
            .publisher
            .publish(&artifact, &self.release, &self.target)
            .await
            .map_err(|e| DeployError::step(Step::Publish, self.release.coordinates().to_string(), e))?;
        info!(?published, checksum = %artifact.checksum(), "Artifact published");

        let container = self
            .containers
            .create(
                &container_id,
                self.release.container_alias(),
                self.release.coordinates(),
            )
            .await
            .map_err(|e| DeployError::step(Step::Create, &container_id, e))?;

        info!(status = ?container.status, "Container deployed");
        Ok(container)
    }

    // ------------------------------------------------------------------------
    // Undeploy
    // ------------------------------------------------------------------------

    /// Dispose a container, optionally aborting its active instances first.
    ///
    /// Returns `Ok(true)` when the container is gone (including when it never
    /// existed) and `Ok(false)` when the server refused to dispose it. A failed
    /// lookup is an `Err` at [`Step::Inspect`].
    #[instrument(skip(self))]
    pub async fn undeploy(&self, container_id: &str, cancel_all_running: bool) -> Result<bool> {
        let existing = self
            .containers
            .get_info(container_id)
            .await
            .map_err(|e| DeployError::step(Step::Inspect, container_id, e))?;
        if existing.is_none() {
            info!("Container is not deployed, nothing to undeploy");
            return Ok(true);
        }

        if cancel_all_running {
            self.abort_active_instances(container_id).await?;
        }

        match self.containers.dispose(container_id).await {
            Ok(()) => {
                warn!(
                    "Container disposed; its artifact stays in the repository and redeploying the same coordinates may resolve a stale copy"
                );
                Ok(true)
            }
            Err(e) => {
                let err = DeployError::step(Step::Dispose, container_id, e);
                error!(step = %Step::Dispose, error = %err, "Container could not be disposed");
                Ok(false)
            }
        }
    }

    async fn abort_active_instances(&self, container_id: &str) -> Result<()> {
        for pass in 1..=self.policy.max_abort_passes {
            let active = self
                .containers
                .list_active_instances(container_id)
                .await
                .map_err(|e| DeployError::step(Step::ListInstances, container_id, e))?;
            if active.is_empty() {
                return Ok(());
            }

            let ids: Vec<i64> = active.iter().map(|i| i.instance_id).collect();
            match self.containers.abort_instances(container_id, &ids).await {
                Ok(()) => {
                    info!(pass, aborted = ids.len(), "Aborted active instances");
                    return Ok(());
                }
                Err(e) if self.policy.is_transient(&e) => {
                    warn!(pass, error = %e, "Abort raced with parent cancellation, retrying");
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(e) => return Err(DeployError::step(Step::Abort, container_id, e)),
            }
        }

        Err(DeployError::AbortRetriesExhausted {
            container_id: container_id.to_string(),
            attempts: self.policy.max_abort_passes,
        })
    }

    // ------------------------------------------------------------------------
    // Migration
    // ------------------------------------------------------------------------

    /// Deploy the release, move running instances of the declared processes out of
    /// `old_container_id`, then dispose the old container.
    ///
    /// Instances whose process name matches no declaration are not migrated and
    /// go away with the old container.
    #[instrument(skip(self, plan), fields(target = %self.release.container_id()))]
    pub async fn deploy_with_migration(
        &self,
        plan: &Arc<DeploymentPlan>,
        old_container_id: &str,
    ) -> MigrationOutcome {
        if !self.deploy(plan, false).await {
            return MigrationOutcome::default();
        }

        let active = match self.containers.list_active_instances(old_container_id).await {
            Ok(active) => active,
            Err(e) => {
                error!(error = %e, "Could not list instances to migrate, old container kept");
                return MigrationOutcome {
                    deployed: true,
                    reports: Vec::new(),
                };
            }
        };

        let mut reports = Vec::new();
        for process in &plan.processes {
            let ids = matching_instances(&active, process.name());
            if ids.is_empty() {
                continue;
            }
            let request = MigrationRequest {
                source_container_id: old_container_id.to_string(),
                instance_ids: ids.clone(),
                target_container_id: self.release.container_id(),
                target_process_id: process.process_id().to_string(),
                node_mapping: BTreeMap::new(),
            };
            match self.containers.migrate_instances(&request).await {
                Ok(batch) => reports.extend(batch),
                Err(e) => {
                    error!(process = process.name(), error = %e, "Migration request failed");
                    reports.extend(ids.iter().map(|&id| failed_report(id, &e)));
                }
            }
        }

        let failed = reports.iter().filter(|r| !r.success).count();
        info!(migrated = reports.len() - failed, failed, "Migration finished");
        for report in reports.iter().filter(|r| !r.success) {
            warn!(instance_id = report.process_instance_id, logs = %report.logs, "Instance not migrated");
        }

        match self.undeploy(old_container_id, false).await {
            Ok(true) => {}
            Ok(false) => warn!(old_container_id, "Old container was not disposed"),
            Err(e) => error!(old_container_id, error = %e, "Old container was not disposed"),
        }

        MigrationOutcome {
            deployed: true,
            reports,
        }
    }

    /// Migrate selected instances into the release's container with an explicit
    /// node mapping (old unique id to new unique id).
    #[instrument(skip(self, node_mapping))]
    pub async fn migrate_with_node_mapping(
        &self,
        old_container_id: &str,
        process_id: &str,
        instance_ids: &[i64],
        node_mapping: BTreeMap<String, String>,
    ) -> Result<Vec<MigrationReport>> {
        let request = MigrationRequest {
            source_container_id: old_container_id.to_string(),
            instance_ids: instance_ids.to_vec(),
            target_container_id: self.release.container_id(),
            target_process_id: process_id.to_string(),
            node_mapping,
        };
        self.containers
            .migrate_instances(&request)
            .await
            .map_err(|e| DeployError::step(Step::Migrate, old_container_id, e))
    }
}

fn matching_instances(active: &[ProcessInstance], process_name: &str) -> Vec<i64> {
    active
        .iter()
        .filter(|i| i.process_name == process_name)
        .map(|i| i.instance_id)
        .collect()
}

fn failed_report(instance_id: i64, err: &SdkError) -> MigrationReport {
    MigrationReport {
        process_instance_id: instance_id,
        success: false,
        logs: format!("Migration request failed: {}", err),
        started_at: None,
        finished_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procship_sdk::ProcessInstanceState;

    fn instance(id: i64, name: &str) -> ProcessInstance {
        ProcessInstance {
            instance_id: id,
            container_id: "demo_1.0.0".to_string(),
            process_id: format!("demo.{}", name.to_lowercase()),
            process_name: name.to_string(),
            process_version: "1.0".to_string(),
            state: ProcessInstanceState::Active,
            parent_instance_id: -1,
        }
    }

    #[test]
    fn test_matching_instances_by_name() {
        let active = vec![
            instance(1, "Approval"),
            instance(2, "Intake"),
            instance(3, "Approval"),
        ];
        assert_eq!(matching_instances(&active, "Approval"), vec![1, 3]);
        assert!(matching_instances(&active, "approval").is_empty());
    }

    #[test]
    fn test_policy_transient_markers() {
        let policy = UndeployPolicy::default();
        let server = |message: &str| SdkError::Server {
            code: "ABORT_INSTANCES".to_string(),
            message: message.to_string(),
        };

        assert!(policy.is_transient(&server("Process instance 7 is already aborted")));
        assert!(policy.is_transient(&server("Could not find process instance with id 7")));
        assert!(!policy.is_transient(&server("User is not authorized")));
        assert!(!policy.is_transient(&SdkError::Timeout(500)));
    }

    #[test]
    fn test_policy_builders_clamp() {
        let policy = UndeployPolicy::default()
            .with_max_abort_passes(0)
            .with_retry_delay(Duration::ZERO);
        assert_eq!(policy.max_abort_passes, 1);
        assert_eq!(policy.retry_delay, Duration::ZERO);
    }
}
