// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Artifact packaging.
//!
//! Flow of [`ArtifactPackager::build_artifact`]:
//! 1. Resolve class files for handlers, services and dependencies
//! 2. Render descriptors and obtain process documents
//! 3. Run the module build step (validation + archive with scaffold folders)
//! 4. Re-pack the archive without the scaffold folders
//! 5. Write jar and pom into the artifact's scratch directory

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use procship_sdk::Coordinates;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::classpath::{ClassResolver, LocalRepository, Scratch, dependency_classes};
use crate::declaration::{
    DependencyDeclaration, HandlerDeclaration, ProcessDeclaration, ProcessResource,
    ServiceDeclaration,
};
use crate::descriptor::{ProcessEntry, render_descriptors, render_pom};
use crate::error::{PackagingError, Result};
use crate::process::ProcessBuilder;
use crate::release::Release;
use crate::validation::{self, Level, ValidationMessage};

/// Default coordinate folder written by the module build step.
pub const SCAFFOLD_COORDINATE_PREFIX: &str = "META-INF/maven/org.default/";
/// Default source folder written by the module build step.
pub const SCAFFOLD_SOURCE_PREFIX: &str = "src/main/resources/";

const PACKAGE: &str = "<package>";

fn is_scaffold(path: &str) -> bool {
    path.starts_with(SCAFFOLD_COORDINATE_PREFIX) || path.starts_with(SCAFFOLD_SOURCE_PREFIX)
}

// ============================================================================
// Built artifact
// ============================================================================

/// A packaged, deployable artifact.
///
/// The jar and pom live in a scratch directory that is removed when the artifact
/// is dropped.
#[derive(Debug)]
pub struct BuiltArtifact {
    coordinates: Coordinates,
    bytes: Vec<u8>,
    pom: String,
    checksum: String,
    entries: Vec<String>,
    jar_path: PathBuf,
    pom_path: PathBuf,
    scratch_dir: TempDir,
}

impl BuiltArtifact {
    pub fn coordinates(&self) -> &Coordinates {
        &self.coordinates
    }

    /// Package archive bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Coordinate document (`pom.xml`) text.
    pub fn pom(&self) -> &str {
        &self.pom
    }

    /// Lowercase hex SHA-256 of the package.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Entry paths in archive order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e == path)
    }

    /// Read one entry from the package.
    pub fn read_entry(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))
            .map_err(|e| PackagingError::archive(PACKAGE, e))?;
        let mut entry = match archive.by_name(path) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(PackagingError::archive(PACKAGE, e)),
        };
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        Ok(Some(buf))
    }

    pub fn jar_path(&self) -> &Path {
        &self.jar_path
    }

    pub fn pom_path(&self) -> &Path {
        &self.pom_path
    }

    /// Directory containing the jar and pom.
    pub fn directory(&self) -> &Path {
        self.jar_path.parent().unwrap_or(self.scratch_dir.path())
    }
}

// ============================================================================
// Module build step
// ============================================================================

/// Stages resources and classes, validates them together and writes the raw
/// archive including the scaffold folders.
struct ModuleBuild<'a> {
    release: &'a Release,
    resources: BTreeMap<String, Vec<u8>>,
    classes: BTreeMap<String, Vec<u8>>,
    duplicates: Vec<String>,
}

impl<'a> ModuleBuild<'a> {
    fn new(release: &'a Release) -> Self {
        Self {
            release,
            resources: BTreeMap::new(),
            classes: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    fn add_resource(&mut self, path: String, bytes: Vec<u8>) {
        if self.resources.contains_key(&path) {
            self.duplicates.push(path);
        } else {
            self.resources.insert(path, bytes);
        }
    }

    fn add_class(&mut self, path: String, bytes: Vec<u8>) {
        self.classes.entry(path).or_insert(bytes);
    }

    fn build(self) -> Result<Vec<u8>> {
        let mut staged = self.resources.clone();
        staged.extend(self.classes.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut report = validation::validate(&staged);
        report
            .messages
            .extend(self.duplicates.iter().map(|path| ValidationMessage {
                level: Level::Error,
                path: path.clone(),
                text: "resource is declared more than once".to_string(),
            }));

        for warning in report.warnings() {
            warn!(message = %warning, "Package validation warning");
        }
        if report.has_errors() {
            return Err(PackagingError::Validation {
                messages: report.lines(),
            });
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut put = |path: &str, bytes: &[u8]| -> Result<()> {
            writer
                .start_file(path, options)
                .map_err(|e| PackagingError::archive(PACKAGE, e))?;
            writer.write_all(bytes)?;
            Ok(())
        };

        for (path, bytes) in &self.resources {
            put(&format!("{}{}", SCAFFOLD_SOURCE_PREFIX, path), bytes.as_slice())?;
        }
        for (path, bytes) in &staged {
            put(path.as_str(), bytes.as_slice())?;
        }
        let default_pom = format!(
            "groupId=org.default\nartifactId={}\nversion=1.0\n",
            self.release.artifact_id()
        );
        put(
            &format!(
                "{}{}/pom.properties",
                SCAFFOLD_COORDINATE_PREFIX,
                self.release.artifact_id()
            ),
            default_pom.as_bytes(),
        )?;

        let cursor = writer
            .finish()
            .map_err(|e| PackagingError::archive(PACKAGE, e))?;
        Ok(cursor.into_inner())
    }
}

/// Copy every non-scaffold entry into a new archive without recompressing.
fn strip_scaffold(raw: &[u8]) -> Result<(Vec<u8>, Vec<String>)> {
    let mut archive =
        ZipArchive::new(Cursor::new(raw)).map_err(|e| PackagingError::archive(PACKAGE, e))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| PackagingError::archive(PACKAGE, e))?;
        if is_scaffold(entry.name()) {
            continue;
        }
        entries.push(entry.name().to_string());
        writer
            .raw_copy_file(entry)
            .map_err(|e| PackagingError::archive(PACKAGE, e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| PackagingError::archive(PACKAGE, e))?;
    Ok((cursor.into_inner(), entries))
}

fn process_resource(process: &dyn ProcessDeclaration) -> Result<ProcessResource> {
    if let Some(resource) = process.resource()? {
        if resource.source_path.trim().is_empty() {
            return Err(PackagingError::process(
                process.process_id(),
                "process resource has no source path",
            ));
        }
        return Ok(resource);
    }
    let mut builder = ProcessBuilder::new(process.process_id(), process.name(), process.version());
    process.build_model(&mut builder)?;
    builder.build()?.to_resource()
}

// ============================================================================
// Packager
// ============================================================================

/// Builds deployable artifacts from declarations.
#[derive(Debug, Clone)]
pub struct ArtifactPackager {
    repository: LocalRepository,
    classpath: Vec<String>,
    platform_listeners: bool,
}

impl ArtifactPackager {
    pub fn new(repository: LocalRepository) -> Self {
        Self {
            repository,
            classpath: Vec::new(),
            platform_listeners: false,
        }
    }

    /// Classpath entries searched for handler and service classes.
    pub fn with_classpath<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classpath = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Append platform listener registrations to the deployment descriptor.
    pub fn with_platform_listeners(mut self, enabled: bool) -> Self {
        self.platform_listeners = enabled;
        self
    }

    pub fn repository(&self) -> &LocalRepository {
        &self.repository
    }

    /// Build the deployable artifact for `release`.
    #[instrument(skip_all, fields(container_id = %release.container_id()))]
    pub fn build_artifact(
        &self,
        dependencies: &[DependencyDeclaration],
        processes: &[Box<dyn ProcessDeclaration>],
        handlers: &[Box<dyn HandlerDeclaration>],
        services: &[Box<dyn ServiceDeclaration>],
        release: &Release,
    ) -> Result<BuiltArtifact> {
        let start = Instant::now();
        let scratch_dir = tempfile::Builder::new().prefix("procship-").tempdir()?;
        let mut scratch = Scratch::new(scratch_dir.path().join("work"));

        // Class files
        let resolver = ClassResolver::open(&self.classpath, &mut scratch)?;
        let mut module = ModuleBuild::new(release);
        let class_names = handlers
            .iter()
            .map(|h| h.class_name())
            .chain(services.iter().map(|s| s.class_name()));
        for class_name in class_names {
            for file in resolver.resolve(class_name)? {
                module.add_class(file.path, file.bytes);
            }
        }
        for dependency in dependencies {
            let files = dependency_classes(&self.repository, dependency.coordinates(), &mut scratch)?;
            debug!(dependency = %dependency.coordinates(), classes = files.len(), "Merged dependency");
            for file in files {
                module.add_class(file.path, file.bytes);
            }
        }

        // Processes and descriptors
        let mut process_entries = Vec::with_capacity(processes.len());
        for process in processes {
            let resource = process_resource(process.as_ref())?;
            process_entries.push(ProcessEntry {
                id: process.process_id().to_string(),
                name: process.name().to_string(),
                version: process.version().to_string(),
                path: resource.source_path.clone(),
            });
            module.add_resource(resource.source_path, resource.bytes);
        }
        for document in render_descriptors(release, handlers, &process_entries, self.platform_listeners)? {
            module.add_resource(document.path, document.content.into_bytes());
        }

        let raw = module.build()?;
        let (bytes, entries) = strip_scaffold(&raw)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let checksum = format!("{:x}", hasher.finalize());

        let coordinates = release.coordinates().clone();
        let pom = render_pom(release)?;
        let dist = scratch_dir.path().join("dist");
        fs::create_dir_all(&dist)?;
        let jar_path = dist.join(coordinates.file_name("jar"));
        let pom_path = dist.join(coordinates.file_name("pom"));
        fs::write(&jar_path, &bytes)?;
        fs::write(&pom_path, &pom)?;

        info!(
            coordinates = %coordinates,
            entries = entries.len(),
            size_bytes = bytes.len(),
            checksum = %checksum,
            duration_ms = start.elapsed().as_millis() as u64,
            "Built artifact"
        );

        Ok(BuiltArtifact {
            coordinates,
            bytes,
            pom,
            checksum,
            entries,
            jar_path,
            pom_path,
            scratch_dir,
        })
    }
}
