// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Types exchanged with the execution server.
//!
//! Field names follow the server's JSON marshalling (`container-id`, `release-id`, ...)
//! so the same structs serve the HTTP client and the in-memory server.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// Group/artifact/version triple identifying a deployable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    /// Group id (dotted).
    #[serde(rename = "group-id")]
    pub group_id: String,
    /// Artifact id.
    #[serde(rename = "artifact-id")]
    pub artifact_id: String,
    /// Version string.
    pub version: String,
}

impl Coordinates {
    /// Create coordinates from their parts.
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    /// Group id with dots replaced by path separators.
    pub fn group_path(&self) -> String {
        self.group_id.replace('.', "/")
    }

    /// File name of the artifact with the given extension (`artifact-version.ext`).
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}-{}.{}", self.artifact_id, self.version, extension)
    }

    /// Directory of this artifact inside a repository (`group/path/artifact/version`).
    pub fn repository_dir(&self) -> String {
        format!(
            "{}/{}/{}",
            self.group_path(),
            self.artifact_id,
            self.version
        )
    }

    /// Path of the artifact file inside a repository.
    pub fn repository_path(&self, extension: &str) -> String {
        format!("{}/{}", self.repository_dir(), self.file_name(extension))
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Discriminant carried by every server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    /// Operation succeeded.
    Success,
    /// Operation failed; `msg` explains why.
    Failure,
    /// Server produced no response.
    NoResponse,
}

/// Envelope for a server response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    /// Success/failure discriminant.
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    /// Human-readable message.
    #[serde(default)]
    pub msg: String,
    /// Result payload (usually absent on failure).
    #[serde(default = "Option::default")]
    pub result: Option<T>,
}

impl<T> ServiceResponse<T> {
    /// Successful response with a payload.
    pub fn success(msg: impl Into<String>, result: T) -> Self {
        Self {
            response_type: ResponseType::Success,
            msg: msg.into(),
            result: Some(result),
        }
    }

    /// Failure response with a message.
    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Failure,
            msg: msg.into(),
            result: None,
        }
    }

    /// Whether the server reported success.
    pub fn is_success(&self) -> bool {
        self.response_type == ResponseType::Success
    }

    /// Convert the payload type, keeping discriminant and message.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ServiceResponse<U> {
        ServiceResponse {
            response_type: self.response_type,
            msg: self.msg,
            result: self.result.map(f),
        }
    }

    /// Turn a failure into `SdkError::Server` tagged with `code`.
    pub fn into_result(self, code: &str) -> Result<Option<T>> {
        match self.response_type {
            ResponseType::Success => Ok(self.result),
            ResponseType::Failure | ResponseType::NoResponse => Err(SdkError::Server {
                code: code.to_string(),
                message: self.msg,
            }),
        }
    }
}

/// Container status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    /// Container is being created.
    Creating,
    /// Container is running.
    Started,
    /// Container creation failed.
    Failed,
    /// Container is being disposed.
    Disposing,
    /// Container is stopped.
    Stopped,
    /// Container is deactivated (no new instances).
    Deactivated,
    /// Status not understood by this client.
    #[serde(other)]
    Unknown,
}

/// Message attached to a container by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Severity (INFO, WARN, ERROR).
    pub severity: String,
    /// Message lines.
    #[serde(default)]
    pub content: Vec<String>,
}

/// Container details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container identifier.
    #[serde(rename = "container-id")]
    pub container_id: String,
    /// Coordinates the container was created from.
    #[serde(rename = "release-id")]
    pub release_id: Coordinates,
    /// Coordinates actually resolved by the server.
    #[serde(
        rename = "resolved-release-id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub resolved_release_id: Option<Coordinates>,
    /// Current status.
    pub status: ContainerStatus,
    /// Alias shared across versions of the same project.
    #[serde(
        rename = "container-alias",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub container_alias: Option<String>,
    /// Messages attached by the server (deployment warnings, errors).
    #[serde(default)]
    pub messages: Vec<ServerMessage>,
}

/// Request body for creating a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container identifier.
    #[serde(rename = "container-id")]
    pub container_id: String,
    /// Container alias.
    #[serde(rename = "container-alias")]
    pub container_alias: String,
    /// Coordinates to resolve.
    #[serde(rename = "release-id")]
    pub release_id: Coordinates,
}

/// Process instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ProcessInstanceState {
    /// Created, not started.
    Pending,
    /// Running.
    Active,
    /// Finished normally.
    Completed,
    /// Aborted.
    Aborted,
    /// Suspended.
    Suspended,
    /// Unknown state code.
    Unknown,
}

impl ProcessInstanceState {
    /// Whether the instance is still executing.
    pub fn is_active(&self) -> bool {
        matches!(self, ProcessInstanceState::Active)
    }
}

impl From<i32> for ProcessInstanceState {
    fn from(value: i32) -> Self {
        match value {
            0 => ProcessInstanceState::Pending,
            1 => ProcessInstanceState::Active,
            2 => ProcessInstanceState::Completed,
            3 => ProcessInstanceState::Aborted,
            4 => ProcessInstanceState::Suspended,
            _ => ProcessInstanceState::Unknown,
        }
    }
}

impl From<ProcessInstanceState> for i32 {
    fn from(state: ProcessInstanceState) -> Self {
        match state {
            ProcessInstanceState::Pending => 0,
            ProcessInstanceState::Active => 1,
            ProcessInstanceState::Completed => 2,
            ProcessInstanceState::Aborted => 3,
            ProcessInstanceState::Suspended => 4,
            ProcessInstanceState::Unknown => -1,
        }
    }
}

fn no_parent() -> i64 {
    -1
}

/// A process instance living in a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    /// Instance id, unique per server.
    #[serde(rename = "process-instance-id")]
    pub instance_id: i64,
    /// Container hosting the instance.
    #[serde(rename = "container-id")]
    pub container_id: String,
    /// Process definition id.
    #[serde(rename = "process-id")]
    pub process_id: String,
    /// Process definition name.
    #[serde(rename = "process-name", default)]
    pub process_name: String,
    /// Process definition version.
    #[serde(rename = "process-version", default)]
    pub process_version: String,
    /// Current state.
    #[serde(rename = "process-instance-state")]
    pub state: ProcessInstanceState,
    /// Parent instance id, `-1` for top-level instances.
    #[serde(rename = "parent-instance-id", default = "no_parent")]
    pub parent_instance_id: i64,
}

impl ProcessInstance {
    /// Parent instance, if this is a sub-process.
    pub fn parent(&self) -> Option<i64> {
        (self.parent_instance_id >= 0).then_some(self.parent_instance_id)
    }
}

/// Request to move process instances into another container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    /// Container currently hosting the instances.
    pub source_container_id: String,
    /// Instances to migrate.
    pub instance_ids: Vec<i64>,
    /// Container receiving the instances.
    pub target_container_id: String,
    /// Process definition id in the target container.
    pub target_process_id: String,
    /// Explicit old-node to new-node mapping (unique ids). Empty for automatic mapping.
    pub node_mapping: BTreeMap<String, String>,
}

/// Outcome of migrating a single process instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Migrated instance.
    pub process_instance_id: i64,
    /// Whether the migration succeeded.
    pub success: bool,
    /// Log lines produced by the server, newline separated.
    pub logs: String,
    /// When the migration started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the migration ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Human task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Created, not yet available.
    Created,
    /// Available to potential owners.
    Ready,
    /// Claimed by a user.
    Reserved,
    /// Work started.
    InProgress,
    /// Suspended.
    Suspended,
    /// Completed.
    Completed,
    /// Failed.
    Failed,
    /// Exited (instance aborted).
    Exited,
    /// Status not understood by this client.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "Created",
            TaskStatus::Ready => "Ready",
            TaskStatus::Reserved => "Reserved",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Suspended => "Suspended",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Exited => "Exited",
            TaskStatus::Unknown => "Unknown",
        }
    }
}

/// Summary of a human task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Task id.
    #[serde(rename = "task-id")]
    pub task_id: i64,
    /// Task name.
    #[serde(rename = "task-name", default)]
    pub name: String,
    /// Task status.
    #[serde(rename = "task-status")]
    pub status: TaskStatus,
    /// Owning process instance.
    #[serde(rename = "task-proc-inst-id")]
    pub process_instance_id: i64,
    /// Owning container.
    #[serde(rename = "task-container-id")]
    pub container_id: String,
    /// Current owner, if claimed.
    #[serde(
        rename = "task-actual-owner",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub actual_owner: Option<String>,
}
