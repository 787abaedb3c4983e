// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Procship deployment
//!
//! Publishes packaged artifacts and drives the execution server through deploy,
//! undeploy and deploy-with-migration.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use procship_deploy::{DeployConfig, DeploymentOrchestrator, DeploymentPlan};
//! use procship_package::Handler;
//!
//! # async fn example() -> procship_deploy::Result<()> {
//! let config = DeployConfig::from_env()?;
//! let orchestrator = DeploymentOrchestrator::from_config(&config)?;
//!
//! let plan = Arc::new(
//!     DeploymentPlan::new().with_handler(Handler::new("Email", "1.0", "com.acme.EmailHandler")),
//! );
//! let outcome = orchestrator.deploy_with_migration(&plan, "demo_1.0.0").await;
//! println!("deployed: {}, migrated: {}", outcome.deployed, outcome.reports.len());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod manifest;
pub mod orchestrator;
pub mod publisher;

pub use config::DeployConfig;
pub use error::{DeployError, PublishError, Result, Step, StepFailure};
pub use manifest::Manifest;
pub use orchestrator::{DeploymentOrchestrator, DeploymentPlan, MigrationOutcome, UndeployPolicy};
pub use publisher::{ArtifactPublisher, PublishOutcome, PublishTarget, RemoteRepository};
