// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON deployment manifest read by the CLI.
//!
//! ```json
//! {
//!   "processes": ["processes/approval.bpmn2"],
//!   "handlers": [{ "name": "Email", "class_name": "com.acme.EmailHandler" }],
//!   "services": [{ "class_name": "com.acme.OrderService" }],
//!   "dependencies": [{ "group-id": "org.acme", "artifact-id": "util", "version": "2.0" }]
//! }
//! ```
//!
//! Process paths are resolved relative to the manifest file.

use std::fs;
use std::path::{Path, PathBuf};

use procship_package::{DependencyDeclaration, FileProcess, Handler, Service};
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};
use crate::orchestrator::DeploymentPlan;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub processes: Vec<PathBuf>,
    #[serde(default)]
    pub handlers: Vec<Handler>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub dependencies: Vec<DependencyDeclaration>,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| DeployError::Config(format!("cannot read manifest {}: {}", path.display(), e)))?;
        Self::parse(&text)
            .map_err(|e| DeployError::Config(format!("invalid manifest {}: {}", path.display(), e)))
    }

    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Open every process document and assemble the plan.
    pub fn into_plan(self, base_dir: &Path) -> Result<DeploymentPlan> {
        let mut plan = DeploymentPlan::new();
        for process in &self.processes {
            let path = base_dir.join(process);
            let declaration = FileProcess::open(&path).map_err(|e| {
                DeployError::Config(format!("cannot open process {}: {}", path.display(), e))
            })?;
            plan = plan.with_process(declaration);
        }
        for handler in self.handlers {
            plan = plan.with_handler(handler);
        }
        for service in self.services {
            plan = plan.with_service(service);
        }
        plan.dependencies = self.dependencies;
        Ok(plan)
    }
}
