// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Procship packaging
//!
//! Turns process, handler, service and dependency declarations into a single
//! deployable archive (KJAR layout) for one [`Release`].
//!
//! ```no_run
//! use procship_package::{
//!     ArtifactPackager, Handler, HandlerDeclaration, LocalRepository, Release,
//! };
//! use procship_sdk::Coordinates;
//!
//! # fn example() -> procship_package::Result<()> {
//! let release = Release::new(Coordinates::new("com.acme", "demo", "1.0.0"), "demo");
//! let packager = ArtifactPackager::new(LocalRepository::new("/var/lib/m2"))
//!     .with_classpath(["target/classes"]);
//!
//! let handlers: Vec<Box<dyn HandlerDeclaration>> =
//!     vec![Box::new(Handler::new("Email", "1.0", "com.acme.EmailHandler"))];
//! let artifact = packager.build_artifact(&[], &[], &handlers, &[], &release)?;
//! println!("{} {}", artifact.jar_path().display(), artifact.checksum());
//! # Ok(())
//! # }
//! ```

pub mod classpath;
pub mod declaration;
pub mod descriptor;
mod error;
pub mod packager;
pub mod process;
mod release;
pub mod validation;

pub use classpath::{ArchiveLocation, LocalRepository};
pub use declaration::{
    DependencyDeclaration, FileProcess, Handler, HandlerDeclaration, ProcessDeclaration,
    ProcessResource, Service, ServiceDeclaration,
};
pub use error::{PackagingError, Result};
pub use packager::{
    ArtifactPackager, BuiltArtifact, SCAFFOLD_COORDINATE_PREFIX, SCAFFOLD_SOURCE_PREFIX,
};
pub use process::{GatewayDirection, NodeRef, ProcessBuilder, ProcessModel};
pub use release::Release;
