// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container lifecycle commands.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::{Result, SdkError};
use crate::server::ExecutionServer;
use crate::types::{
    ContainerInfo, ContainerSpec, Coordinates, MigrationReport, MigrationRequest,
    ProcessInstance, ProcessInstanceState,
};

const DEFAULT_PAGE_SIZE: u32 = 100;

/// Thin command layer over an [`ExecutionServer`].
///
/// Maps every failure response to [`SdkError::Server`] with the server's message and
/// otherwise passes calls through. Owns no state and never retries.
#[derive(Clone)]
pub struct ContainerLifecycleClient {
    server: Arc<dyn ExecutionServer>,
    page_size: u32,
}

impl ContainerLifecycleClient {
    /// Wrap an execution server.
    pub fn new(server: Arc<dyn ExecutionServer>) -> Self {
        Self {
            server,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the page size used by instance listings.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The underlying server.
    pub fn server(&self) -> &Arc<dyn ExecutionServer> {
        &self.server
    }

    /// Create a container for `coordinates`.
    #[instrument(skip(self, coordinates), fields(release_id = %coordinates))]
    pub async fn create(
        &self,
        container_id: &str,
        alias: &str,
        coordinates: &Coordinates,
    ) -> Result<ContainerInfo> {
        let spec = ContainerSpec {
            container_id: container_id.to_string(),
            container_alias: alias.to_string(),
            release_id: coordinates.clone(),
        };
        self.server
            .create_container(&spec)
            .await?
            .into_result("CREATE_CONTAINER")?
            .ok_or_else(|| {
                SdkError::UnexpectedResponse(format!(
                    "create of container {} returned no container",
                    container_id
                ))
            })
    }

    /// Container details, or `None` when the server reports the container as not
    /// instantiated. Any other failure (authentication, server error) is an error.
    #[instrument(skip(self))]
    pub async fn get_info(&self, container_id: &str) -> Result<Option<ContainerInfo>> {
        match self
            .server
            .get_container(container_id)
            .await?
            .into_result("GET_CONTAINER")
        {
            Ok(info) => Ok(info),
            Err(e) if e.is_container_absent() => {
                debug!(error = %e, "Container not instantiated");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Dispose a container.
    #[instrument(skip(self))]
    pub async fn dispose(&self, container_id: &str) -> Result<()> {
        self.server
            .dispose_container(container_id)
            .await?
            .into_result("DISPOSE_CONTAINER")?;
        Ok(())
    }

    /// List all containers.
    #[instrument(skip(self))]
    pub async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        Ok(self
            .server
            .list_containers()
            .await?
            .into_result("LIST_CONTAINERS")?
            .unwrap_or_default())
    }

    /// All active process instances in a container, across pages.
    #[instrument(skip(self))]
    pub async fn list_active_instances(&self, container_id: &str) -> Result<Vec<ProcessInstance>> {
        let mut instances = Vec::new();
        let mut page = 0;
        loop {
            let batch = self
                .server
                .list_process_instances(
                    container_id,
                    &[ProcessInstanceState::Active],
                    page,
                    self.page_size,
                )
                .await?
                .into_result("LIST_INSTANCES")?
                .unwrap_or_default();
            let last_page = (batch.len() as u32) < self.page_size;
            instances.extend(batch);
            if last_page {
                break;
            }
            page += 1;
        }
        debug!(count = instances.len(), "Listed active instances");
        Ok(instances)
    }

    /// Abort process instances.
    #[instrument(skip(self))]
    pub async fn abort_instances(&self, container_id: &str, instance_ids: &[i64]) -> Result<()> {
        self.server
            .abort_process_instances(container_id, instance_ids)
            .await?
            .into_result("ABORT_INSTANCES")?;
        Ok(())
    }

    /// Migrate process instances, returning the server's per-instance reports.
    #[instrument(skip(self, request), fields(source = %request.source_container_id))]
    pub async fn migrate_instances(&self, request: &MigrationRequest) -> Result<Vec<MigrationReport>> {
        Ok(self
            .server
            .migrate_process_instances(request)
            .await?
            .into_result("MIGRATE_INSTANCES")?
            .unwrap_or_default())
    }

    /// Start a process instance.
    #[instrument(skip(self, variables))]
    pub async fn start_process(
        &self,
        container_id: &str,
        process_id: &str,
        variables: &Map<String, Value>,
    ) -> Result<i64> {
        self.server
            .start_process(container_id, process_id, variables)
            .await?
            .into_result("START_PROCESS")?
            .ok_or_else(|| {
                SdkError::UnexpectedResponse("start process returned no instance id".to_string())
            })
    }
}
