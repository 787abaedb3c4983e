// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution server interface.
//!
//! Defines the request/response surface the deployment tooling consumes. Transport
//! failures are `Err`; everything the server itself answered is a [`ServiceResponse`].

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::{
    ContainerInfo, ContainerSpec, MigrationReport, MigrationRequest, ProcessInstance,
    ProcessInstanceState, ServiceResponse, TaskStatus, TaskSummary,
};

/// Trait for process execution servers.
///
/// Implementations are pure transports: they perform no retries and keep no state
/// about the caller's deployment.
#[async_trait]
pub trait ExecutionServer: Send + Sync {
    /// Create a container resolving `spec.release_id`.
    async fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<ServiceResponse<ContainerInfo>>;

    /// Get container details. Unknown containers answer with a failure response.
    async fn get_container(&self, container_id: &str) -> Result<ServiceResponse<ContainerInfo>>;

    /// Dispose a container.
    async fn dispose_container(&self, container_id: &str) -> Result<ServiceResponse<()>>;

    /// List all containers.
    async fn list_containers(&self) -> Result<ServiceResponse<Vec<ContainerInfo>>>;

    /// Start a process instance, returning its id.
    async fn start_process(
        &self,
        container_id: &str,
        process_id: &str,
        variables: &Map<String, Value>,
    ) -> Result<ServiceResponse<i64>>;

    /// List one page of process instances in a container filtered by state.
    async fn list_process_instances(
        &self,
        container_id: &str,
        states: &[ProcessInstanceState],
        page: u32,
        page_size: u32,
    ) -> Result<ServiceResponse<Vec<ProcessInstance>>>;

    /// Abort process instances.
    async fn abort_process_instances(
        &self,
        container_id: &str,
        instance_ids: &[i64],
    ) -> Result<ServiceResponse<()>>;

    /// Migrate process instances, returning one report per instance.
    async fn migrate_process_instances(
        &self,
        request: &MigrationRequest,
    ) -> Result<ServiceResponse<Vec<MigrationReport>>>;

    /// List tasks the given user is a potential owner of.
    async fn list_tasks(
        &self,
        user: &str,
        statuses: &[TaskStatus],
        page: u32,
        page_size: u32,
    ) -> Result<ServiceResponse<Vec<TaskSummary>>>;

    /// Claim a task for `user`.
    async fn claim_task(
        &self,
        container_id: &str,
        task_id: i64,
        user: &str,
    ) -> Result<ServiceResponse<()>>;

    /// Complete a task as `user` with output variables.
    async fn complete_task(
        &self,
        container_id: &str,
        task_id: i64,
        user: &str,
        variables: &Map<String, Value>,
    ) -> Result<ServiceResponse<()>>;
}
