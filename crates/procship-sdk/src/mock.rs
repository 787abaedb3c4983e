// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory execution server.
//!
//! Simulates containers, process instances, migration and tasks without a network.
//! Used by the orchestrator tests and for dry runs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::server::ExecutionServer;
use crate::types::{
    ContainerInfo, ContainerSpec, ContainerStatus, MigrationReport, MigrationRequest,
    ProcessInstance, ProcessInstanceState, ServiceResponse, TaskStatus, TaskSummary,
};

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `create_container` calls.
    pub create: u32,
    /// `get_container` calls.
    pub get: u32,
    /// `dispose_container` calls.
    pub dispose: u32,
    /// `list_process_instances` calls.
    pub list_instances: u32,
    /// `abort_process_instances` calls.
    pub abort: u32,
    /// `migrate_process_instances` calls.
    pub migrate: u32,
}

impl CallCounts {
    /// Calls that change server state.
    pub fn mutating(&self) -> u32 {
        self.create + self.dispose + self.abort + self.migrate
    }
}

#[derive(Debug, Clone)]
struct Definition {
    name: String,
    version: String,
}

#[derive(Default)]
struct State {
    containers: BTreeMap<String, ContainerInfo>,
    instances: BTreeMap<i64, ProcessInstance>,
    definitions: HashMap<(String, String), Definition>,
    tasks: BTreeMap<i64, TaskSummary>,
    next_instance_id: i64,
    next_task_id: i64,
    abort_failures: VecDeque<String>,
    create_failure: Option<String>,
    get_failure: Option<String>,
    dispose_failure: Option<String>,
    calls: CallCounts,
}

/// In-memory execution server.
#[derive(Clone, Default)]
pub struct InMemoryExecutionServer {
    state: Arc<Mutex<State>>,
    /// When set, containers only start if their artifact exists in this repository.
    repository: Option<PathBuf>,
}

impl InMemoryExecutionServer {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a server that resolves artifacts from a local repository directory.
    pub fn with_repository(repository: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::default(),
            repository: Some(repository.into()),
        }
    }

    /// Register the name and version of a process definition deployed in a container.
    pub async fn define_process(
        &self,
        container_id: &str,
        process_id: &str,
        name: &str,
        version: &str,
    ) {
        let mut state = self.state.lock().await;
        state.definitions.insert(
            (container_id.to_string(), process_id.to_string()),
            Definition {
                name: name.to_string(),
                version: version.to_string(),
            },
        );
    }

    /// Make the next `times` abort calls fail with `message`.
    pub async fn fail_next_aborts(&self, message: &str, times: usize) {
        let mut state = self.state.lock().await;
        state
            .abort_failures
            .extend(std::iter::repeat_n(message.to_string(), times));
    }

    /// Make the next container creation fail with `message`.
    pub async fn fail_next_create(&self, message: &str) {
        self.state.lock().await.create_failure = Some(message.to_string());
    }

    /// Make the next container lookup fail with `message`.
    pub async fn fail_next_get(&self, message: &str) {
        self.state.lock().await.get_failure = Some(message.to_string());
    }

    /// Make the next container disposal fail with `message`.
    pub async fn fail_next_dispose(&self, message: &str) {
        self.state.lock().await.dispose_failure = Some(message.to_string());
    }

    /// Start a child instance under `parent_id` (same container and process).
    pub async fn start_child(&self, parent_id: i64, process_id: &str) -> Option<i64> {
        let mut state = self.state.lock().await;
        let container_id = state.instances.get(&parent_id)?.container_id.clone();
        let id = state.new_instance(&container_id, process_id);
        if let Some(child) = state.instances.get_mut(&id) {
            child.parent_instance_id = parent_id;
        }
        Some(id)
    }

    /// Add a ready human task to a process instance.
    pub async fn add_task(&self, process_instance_id: i64, name: &str) -> Option<i64> {
        let mut state = self.state.lock().await;
        let container_id = state.instances.get(&process_instance_id)?.container_id.clone();
        state.next_task_id += 1;
        let task_id = state.next_task_id;
        state.tasks.insert(
            task_id,
            TaskSummary {
                task_id,
                name: name.to_string(),
                status: TaskStatus::Ready,
                process_instance_id,
                container_id,
                actual_owner: None,
            },
        );
        Some(task_id)
    }

    /// Calls received so far.
    pub async fn calls(&self) -> CallCounts {
        self.state.lock().await.calls
    }

    /// Snapshot of a process instance.
    pub async fn instance(&self, instance_id: i64) -> Option<ProcessInstance> {
        self.state.lock().await.instances.get(&instance_id).cloned()
    }

    /// Snapshot of a container.
    pub async fn container(&self, container_id: &str) -> Option<ContainerInfo> {
        self.state.lock().await.containers.get(container_id).cloned()
    }

    fn artifact_resolvable(&self, spec: &ContainerSpec) -> bool {
        match &self.repository {
            Some(root) => root.join(spec.release_id.repository_path("jar")).is_file(),
            None => true,
        }
    }
}

impl State {
    fn new_instance(&mut self, container_id: &str, process_id: &str) -> i64 {
        self.next_instance_id += 1;
        let id = self.next_instance_id;
        let definition = self
            .definitions
            .get(&(container_id.to_string(), process_id.to_string()))
            .cloned()
            .unwrap_or_else(|| Definition {
                name: process_id.to_string(),
                version: "1.0".to_string(),
            });
        self.instances.insert(
            id,
            ProcessInstance {
                instance_id: id,
                container_id: container_id.to_string(),
                process_id: process_id.to_string(),
                process_name: definition.name,
                process_version: definition.version,
                state: ProcessInstanceState::Active,
                parent_instance_id: -1,
            },
        );
        id
    }

    fn abort_with_children(&mut self, id: i64) {
        let children: Vec<i64> = self
            .instances
            .values()
            .filter(|i| i.parent_instance_id == id && i.state.is_active())
            .map(|i| i.instance_id)
            .collect();
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.state = ProcessInstanceState::Aborted;
        }
        for child in children {
            self.abort_with_children(child);
        }
    }
}

#[async_trait]
impl ExecutionServer for InMemoryExecutionServer {
    async fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<ServiceResponse<ContainerInfo>> {
        let resolvable = self.artifact_resolvable(spec);
        let mut state = self.state.lock().await;
        state.calls.create += 1;

        if let Some(message) = state.create_failure.take() {
            return Ok(ServiceResponse::failure(message));
        }
        if state.containers.contains_key(&spec.container_id) {
            return Ok(ServiceResponse::failure(format!(
                "Container {} already exists.",
                spec.container_id
            )));
        }
        if !resolvable {
            return Ok(ServiceResponse::failure(format!(
                "Failed to create container {} with module {}: artifact not found",
                spec.container_id, spec.release_id
            )));
        }

        let info = ContainerInfo {
            container_id: spec.container_id.clone(),
            release_id: spec.release_id.clone(),
            resolved_release_id: Some(spec.release_id.clone()),
            status: ContainerStatus::Started,
            container_alias: Some(spec.container_alias.clone()),
            messages: Vec::new(),
        };
        state.containers.insert(spec.container_id.clone(), info.clone());
        Ok(ServiceResponse::success(
            format!(
                "Container {} successfully deployed with module {}.",
                spec.container_id, spec.release_id
            ),
            info,
        ))
    }

    async fn get_container(&self, container_id: &str) -> Result<ServiceResponse<ContainerInfo>> {
        let mut state = self.state.lock().await;
        state.calls.get += 1;
        if let Some(message) = state.get_failure.take() {
            return Ok(ServiceResponse::failure(message));
        }
        Ok(match state.containers.get(container_id) {
            Some(info) => ServiceResponse::success(
                format!("Info for container {}", container_id),
                info.clone(),
            ),
            None => ServiceResponse::failure(format!(
                "Container {} is not instantiated.",
                container_id
            )),
        })
    }

    async fn dispose_container(&self, container_id: &str) -> Result<ServiceResponse<()>> {
        let mut state = self.state.lock().await;
        state.calls.dispose += 1;
        if let Some(message) = state.dispose_failure.take() {
            return Ok(ServiceResponse::failure(message));
        }
        if state.containers.remove(container_id).is_none() {
            return Ok(ServiceResponse::success(
                format!("Container {} was not instantiated.", container_id),
                (),
            ));
        }
        state.instances.retain(|_, i| i.container_id != container_id);
        state.tasks.retain(|_, t| t.container_id != container_id);
        Ok(ServiceResponse::success(
            format!("Container {} successfully disposed.", container_id),
            (),
        ))
    }

    async fn list_containers(&self) -> Result<ServiceResponse<Vec<ContainerInfo>>> {
        let state = self.state.lock().await;
        Ok(ServiceResponse::success(
            "List of created containers",
            state.containers.values().cloned().collect(),
        ))
    }

    async fn start_process(
        &self,
        container_id: &str,
        process_id: &str,
        _variables: &Map<String, Value>,
    ) -> Result<ServiceResponse<i64>> {
        let mut state = self.state.lock().await;
        if !state.containers.contains_key(container_id) {
            return Ok(ServiceResponse::failure(format!(
                "Container {} is not instantiated.",
                container_id
            )));
        }
        let id = state.new_instance(container_id, process_id);
        Ok(ServiceResponse::success("", id))
    }

    async fn list_process_instances(
        &self,
        container_id: &str,
        states: &[ProcessInstanceState],
        page: u32,
        page_size: u32,
    ) -> Result<ServiceResponse<Vec<ProcessInstance>>> {
        let mut state = self.state.lock().await;
        state.calls.list_instances += 1;
        let items = state
            .instances
            .values()
            .filter(|i| i.container_id == container_id)
            .filter(|i| states.is_empty() || states.contains(&i.state))
            .skip((page * page_size) as usize)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(ServiceResponse::success("", items))
    }

    async fn abort_process_instances(
        &self,
        container_id: &str,
        instance_ids: &[i64],
    ) -> Result<ServiceResponse<()>> {
        let mut state = self.state.lock().await;
        state.calls.abort += 1;

        if let Some(message) = state.abort_failures.pop_front() {
            return Ok(ServiceResponse::failure(message));
        }

        for id in instance_ids {
            let found = state
                .instances
                .get(id)
                .is_some_and(|i| i.container_id == container_id && i.state.is_active());
            if !found {
                return Ok(ServiceResponse::failure(format!(
                    "Could not find process instance with id {}",
                    id
                )));
            }
        }
        for id in instance_ids {
            state.abort_with_children(*id);
        }
        Ok(ServiceResponse::success("", ()))
    }

    async fn migrate_process_instances(
        &self,
        request: &MigrationRequest,
    ) -> Result<ServiceResponse<Vec<MigrationReport>>> {
        let mut state = self.state.lock().await;
        state.calls.migrate += 1;

        if !state.containers.contains_key(&request.target_container_id) {
            return Ok(ServiceResponse::failure(format!(
                "Container {} is not instantiated.",
                request.target_container_id
            )));
        }

        let target_definition = state
            .definitions
            .get(&(
                request.target_container_id.clone(),
                request.target_process_id.clone(),
            ))
            .cloned();

        let mut reports = Vec::with_capacity(request.instance_ids.len());
        for id in &request.instance_ids {
            let started_at = Utc::now();
            let migrated = match state.instances.get_mut(id) {
                Some(instance)
                    if instance.container_id == request.source_container_id
                        && instance.state.is_active() =>
                {
                    instance.container_id = request.target_container_id.clone();
                    instance.process_id = request.target_process_id.clone();
                    if let Some(definition) = &target_definition {
                        instance.process_name = definition.name.clone();
                        instance.process_version = definition.version.clone();
                    }
                    true
                }
                _ => false,
            };
            let logs = if migrated {
                format!(
                    "Migration of process instance ({}) started\nMigration of process instance ({}) completed successfully to process {}",
                    id, id, request.target_process_id
                )
            } else {
                format!(
                    "Migration of process instance ({}) failed: no active instance in container {}",
                    id, request.source_container_id
                )
            };
            reports.push(MigrationReport {
                process_instance_id: *id,
                success: migrated,
                logs,
                started_at: Some(started_at),
                finished_at: Some(Utc::now()),
            });
        }
        Ok(ServiceResponse::success("", reports))
    }

    async fn list_tasks(
        &self,
        user: &str,
        statuses: &[TaskStatus],
        page: u32,
        page_size: u32,
    ) -> Result<ServiceResponse<Vec<TaskSummary>>> {
        let state = self.state.lock().await;
        let items = state
            .tasks
            .values()
            .filter(|t| statuses.is_empty() || statuses.contains(&t.status))
            .filter(|t| t.actual_owner.as_deref().is_none_or(|owner| owner == user))
            .skip((page * page_size) as usize)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(ServiceResponse::success("", items))
    }

    async fn claim_task(
        &self,
        _container_id: &str,
        task_id: i64,
        user: &str,
    ) -> Result<ServiceResponse<()>> {
        let mut state = self.state.lock().await;
        Ok(match state.tasks.get_mut(&task_id) {
            Some(task) if task.status == TaskStatus::Ready => {
                task.status = TaskStatus::Reserved;
                task.actual_owner = Some(user.to_string());
                ServiceResponse::success("", ())
            }
            Some(task) => ServiceResponse::failure(format!(
                "Task {} cannot be claimed in status {}",
                task_id,
                task.status.as_str()
            )),
            None => ServiceResponse::failure(format!("Task with id {} was not found", task_id)),
        })
    }

    async fn complete_task(
        &self,
        _container_id: &str,
        task_id: i64,
        user: &str,
        _variables: &Map<String, Value>,
    ) -> Result<ServiceResponse<()>> {
        let mut state = self.state.lock().await;
        Ok(match state.tasks.get_mut(&task_id) {
            Some(task) if task.actual_owner.as_deref() == Some(user) => {
                task.status = TaskStatus::Completed;
                ServiceResponse::success("", ())
            }
            Some(_) => ServiceResponse::failure(format!(
                "User '{}' does not have permissions to execute operation 'Complete' on task id {}",
                user, task_id
            )),
            None => ServiceResponse::failure(format!("Task with id {} was not found", task_id)),
        })
    }
}
