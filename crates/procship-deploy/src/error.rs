// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for procship-deploy.

use std::fmt;

use procship_package::PackagingError;
use procship_sdk::SdkError;
use thiserror::Error;

/// Result type using DeployError.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors that can occur while publishing an artifact.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The remote repository answered with a non-2xx status.
    #[error(
        "repository rejected {path} with HTTP {status}; missing transitive dependencies of the artifact are a likely cause"
    )]
    Rejected { status: u16, path: String },

    /// The upload could not be sent.
    #[error("upload failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local install failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The publish target cannot be used.
    #[error("invalid publish target: {0}")]
    InvalidTarget(String),
}

/// Orchestration step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Package,
    Publish,
    Create,
    Inspect,
    ListInstances,
    Abort,
    Dispose,
    Migrate,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Package => "package",
            Step::Publish => "publish",
            Step::Create => "create",
            Step::Inspect => "inspect",
            Step::ListInstances => "list_instances",
            Step::Abort => "abort",
            Step::Dispose => "dispose",
            Step::Migrate => "migrate",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cause of a failed step.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Server(#[from] SdkError),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors that can occur during deployment orchestration.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A step failed; `target` names the container or artifact it acted on.
    #[error("{step} failed for {target}: {source}")]
    Step {
        step: Step,
        target: String,
        #[source]
        source: StepFailure,
    },

    /// Active instances kept racing with their parents' cancellation.
    #[error("container {container_id} still has active instances after {attempts} abort passes")]
    AbortRetriesExhausted { container_id: String, attempts: u32 },

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DeployError {
    pub(crate) fn step(step: Step, target: impl Into<String>, source: impl Into<StepFailure>) -> Self {
        DeployError::Step {
            step,
            target: target.into(),
            source: source.into(),
        }
    }

    /// The failed step, if this is a step failure.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            DeployError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}
