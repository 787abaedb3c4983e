// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployable declarations.
//!
//! The caller describes what goes into a package through these traits. The packager
//! only reads them; it never constructs a declaration itself.

use std::fs;
use std::path::{Path, PathBuf};

use procship_sdk::Coordinates;
use serde::{Deserialize, Serialize};

use crate::error::{PackagingError, Result};
use crate::process::ProcessBuilder;

/// A finished process document and the path it must have inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResource {
    pub source_path: String,
    pub bytes: Vec<u8>,
}

impl ProcessResource {
    pub fn new(source_path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source_path: source_path.into(),
            bytes,
        }
    }
}

/// A process definition to package.
///
/// Either [`resource`](Self::resource) returns a finished document, or the packager
/// hands a fresh [`ProcessBuilder`] to [`build_model`](Self::build_model) and
/// serializes the result.
pub trait ProcessDeclaration: Send + Sync {
    /// Process name. Running instances are matched to the declaration by this name.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn process_id(&self) -> &str;

    fn resource(&self) -> Result<Option<ProcessResource>> {
        Ok(None)
    }

    fn build_model(&self, _builder: &mut ProcessBuilder) -> Result<()> {
        Ok(())
    }
}

/// A task handler whose class is bundled and registered under [`name`](Self::name).
pub trait HandlerDeclaration: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    /// Fully-qualified class name.
    fn class_name(&self) -> &str;
}

/// A class bundled into the package without registration.
pub trait ServiceDeclaration: Send + Sync {
    fn class_name(&self) -> &str;
}

/// A third-party archive whose class files are merged into the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyDeclaration(pub Coordinates);

impl DependencyDeclaration {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self(Coordinates::new(group_id, artifact_id, version))
    }

    pub fn coordinates(&self) -> &Coordinates {
        &self.0
    }
}

// ============================================================================
// Plain declarations
// ============================================================================

/// Handler declared by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub class_name: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Handler {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            class_name: class_name.into(),
        }
    }
}

impl HandlerDeclaration for Handler {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// Service class declared by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub class_name: String,
}

impl Service {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }
}

impl ServiceDeclaration for Service {
    fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// Process declaration backed by an existing `.bpmn2` document.
///
/// The process id, name and version are read from the document's `process`
/// element when it is opened.
#[derive(Debug, Clone)]
pub struct FileProcess {
    path: PathBuf,
    process_id: String,
    name: String,
    version: String,
}

const DROOLS_NS: &str = "http://www.jboss.org/drools";

impl FileProcess {
    /// Open a process document and read its identity.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let doc = roxmltree::Document::parse(&text).map_err(|e| {
            PackagingError::process(&path.display().to_string(), format!("invalid XML: {}", e))
        })?;
        let process = doc
            .descendants()
            .find(|n| n.has_tag_name("process"))
            .ok_or_else(|| {
                PackagingError::process(&path.display().to_string(), "no process element")
            })?;
        let process_id = process
            .attribute("id")
            .ok_or_else(|| {
                PackagingError::process(&path.display().to_string(), "process has no id")
            })?
            .to_string();
        let name = process.attribute("name").unwrap_or(&process_id).to_string();
        let version = process
            .attribute((DROOLS_NS, "version"))
            .unwrap_or("1.0")
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            process_id,
            name,
            version,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProcessDeclaration for FileProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn process_id(&self) -> &str {
        &self.process_id
    }

    fn resource(&self) -> Result<Option<ProcessResource>> {
        let bytes = fs::read(&self.path)?;
        Ok(Some(ProcessResource::new(
            format!("{}.bpmn2", self.process_id),
            bytes,
        )))
    }
}
