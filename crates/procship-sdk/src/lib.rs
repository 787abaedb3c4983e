// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Procship SDK
//!
//! Client-side view of a process execution server (KIE Server compatible).
//!
//! The crate is split into three layers:
//! - [`ExecutionServer`]: the raw request/response interface. Every call returns a
//!   [`ServiceResponse`] carrying the server's success/failure discriminant.
//! - [`KieServerClient`]: the HTTP implementation of that interface.
//! - [`ContainerLifecycleClient`]: a thin command layer that turns failure responses
//!   into [`SdkError::Server`] and pages through instance listings.
//!
//! [`InMemoryExecutionServer`] implements the same interface without a network and is
//! what the orchestrator tests run against.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use procship_sdk::{ContainerLifecycleClient, Coordinates, KieServerClient, SdkConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = KieServerClient::new(SdkConfig::from_env()?)?;
//! let containers = ContainerLifecycleClient::new(Arc::new(server));
//!
//! let coordinates = Coordinates::new("com.acme", "orders", "1.0.0");
//! containers.create("orders_1.0.0", "orders", &coordinates).await?;
//!
//! for instance in containers.list_active_instances("orders_1.0.0").await? {
//!     println!("{} {}", instance.instance_id, instance.process_name);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod lifecycle;
pub mod mock;
mod server;
mod types;

pub use client::KieServerClient;
pub use config::SdkConfig;
pub use error::{ALREADY_ABORTED_MARKERS, CONTAINER_ABSENT_MARKERS, Result, SdkError};
pub use lifecycle::ContainerLifecycleClient;
pub use mock::InMemoryExecutionServer;
pub use server::ExecutionServer;
pub use types::{
    ContainerInfo, ContainerSpec, ContainerStatus, Coordinates, MigrationReport,
    MigrationRequest, ProcessInstance, ProcessInstanceState, ResponseType, ServerMessage,
    ServiceResponse, TaskStatus, TaskSummary,
};
