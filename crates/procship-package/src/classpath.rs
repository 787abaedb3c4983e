// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Classpath and repository resolution.
//!
//! Classpath entries are loose directories, archives, or locations inside nested
//! archives written as `outer.jar!/BOOT-INF/lib/inner.jar!/`. Archives are unpacked
//! into a per-call scratch directory and lookups then run against plain directories.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use procship_sdk::Coordinates;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{PackagingError, Result};

/// Separator between an archive and a path inside it.
pub const ARCHIVE_SEPARATOR: &str = "!/";

/// A class file and its path inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

// ============================================================================
// Scratch space
// ============================================================================

/// Numbered unpack directories under one scratch root.
#[derive(Debug)]
pub struct Scratch {
    root: PathBuf,
    next: usize,
}

impl Scratch {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next: 0,
        }
    }

    /// Create and return a fresh, empty directory.
    pub fn next_dir(&mut self) -> Result<PathBuf> {
        self.next += 1;
        let dir = self.root.join(format!("unpack-{}", self.next));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Extract every entry of a zip archive into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(|e| PackagingError::archive(archive.display(), e))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| PackagingError::archive(archive.display(), e))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(archive = %archive.display(), entry = entry.name(), "Skipping entry with unsafe path");
            continue;
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

// ============================================================================
// Archive locations
// ============================================================================

/// A classpath location, possibly inside nested archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLocation {
    root: PathBuf,
    nested: Vec<String>,
}

impl ArchiveLocation {
    /// Parse `path[!/inner[!/...]]`.
    pub fn parse(location: &str) -> Self {
        let mut segments = location.split(ARCHIVE_SEPARATOR);
        let root = PathBuf::from(segments.next().unwrap_or_default());
        Self {
            root,
            nested: segments.map(|s| s.trim_matches('/').to_string()).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths inside the archive chain; the last one may be a directory or empty.
    pub fn nested(&self) -> &[String] {
        &self.nested
    }

    pub fn is_nested(&self) -> bool {
        !self.nested.is_empty()
    }

    /// Unpack through every archive boundary and return the resulting directory.
    pub fn unpack(&self, scratch: &mut Scratch) -> Result<PathBuf> {
        let mut location = self.root.clone();
        for segment in &self.nested {
            let dir = scratch.next_dir()?;
            extract_archive(&location, &dir)?;
            debug!(archive = %location.display(), into = %dir.display(), "Unpacked archive");
            location = if segment.is_empty() {
                dir
            } else {
                dir.join(segment)
            };
        }
        if location.is_file() {
            let dir = scratch.next_dir()?;
            extract_archive(&location, &dir)?;
            location = dir;
        }
        Ok(location)
    }
}

// ============================================================================
// Local repository
// ============================================================================

/// Handle to the local artifact repository.
///
/// Clones share the same list of additional lookup paths, so a path registered by
/// the publisher is visible to the packager.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
    lookup_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lookup_paths: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register an additional directory to search. Registrations are never removed.
    pub fn add_lookup_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut paths = self
            .lookup_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !paths.contains(&path) {
            debug!(path = %path.display(), "Registered repository lookup path");
            paths.push(path);
        }
    }

    pub fn lookup_paths(&self) -> Vec<PathBuf> {
        self.lookup_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Where an artifact lives (or would live) under the repository root.
    pub fn artifact_path(&self, coordinates: &Coordinates, extension: &str) -> PathBuf {
        self.root.join(coordinates.repository_path(extension))
    }

    /// Find an artifact in the repository root or any lookup path.
    ///
    /// Lookup paths are searched both with the repository layout and flat.
    pub fn locate(&self, coordinates: &Coordinates, extension: &str) -> Option<PathBuf> {
        let in_root = self.artifact_path(coordinates, extension);
        if in_root.is_file() {
            return Some(in_root);
        }
        self.lookup_paths().into_iter().find_map(|dir| {
            [
                dir.join(coordinates.repository_path(extension)),
                dir.join(coordinates.file_name(extension)),
            ]
            .into_iter()
            .find(|p| p.is_file())
        })
    }

    /// Copy a jar and its pom into the repository layout. Returns the installed jar.
    pub fn install(&self, coordinates: &Coordinates, jar: &Path, pom: &Path) -> io::Result<PathBuf> {
        let dir = self.root.join(coordinates.repository_dir());
        fs::create_dir_all(&dir)?;
        let jar_target = dir.join(coordinates.file_name("jar"));
        fs::copy(jar, &jar_target)?;
        fs::copy(pom, dir.join(coordinates.file_name("pom")))?;
        Ok(jar_target)
    }

    fn searched(&self) -> String {
        std::iter::once(self.root.clone())
            .chain(self.lookup_paths())
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ============================================================================
// Class resolution
// ============================================================================

/// Resolves class files against unpacked classpath roots.
#[derive(Debug, Default)]
pub struct ClassResolver {
    roots: Vec<PathBuf>,
}

impl ClassResolver {
    /// Unpack every classpath entry and collect the resulting directories.
    pub fn open(entries: &[String], scratch: &mut Scratch) -> Result<Self> {
        let mut roots = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| !e.trim().is_empty()) {
            let location = ArchiveLocation::parse(entry);
            let root = location.unpack(scratch)?;
            debug!(entry = %entry, root = %root.display(), "Resolved classpath entry");
            roots.push(root);
        }
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// A class file and its nested `Name$*.class` files.
    pub fn resolve(&self, class_name: &str) -> Result<Vec<ClassFile>> {
        let relative = format!("{}.class", class_name.replace('.', "/"));
        for root in &self.roots {
            let candidate = root.join(&relative);
            if !candidate.is_file() {
                continue;
            }

            let mut files = vec![ClassFile {
                path: relative.clone(),
                bytes: fs::read(&candidate)?,
            }];

            let simple = class_name.rsplit('.').next().unwrap_or(class_name);
            let nested_prefix = format!("{}$", simple);
            let package_dir = relative.rsplit_once('/').map(|(dir, _)| dir);
            if let Some(parent) = candidate.parent() {
                let mut nested: Vec<_> = fs::read_dir(parent)?
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .filter(|n| n.starts_with(&nested_prefix) && n.ends_with(".class"))
                    .collect();
                nested.sort();
                for name in nested {
                    let path = match package_dir {
                        Some(dir) => format!("{}/{}", dir, name),
                        None => name.clone(),
                    };
                    files.push(ClassFile {
                        bytes: fs::read(parent.join(&name))?,
                        path,
                    });
                }
            }
            return Ok(files);
        }
        Err(PackagingError::UnresolvedClass(class_name.to_string()))
    }
}

/// Class files of a dependency archive located through the repository.
pub fn dependency_classes(
    repository: &LocalRepository,
    coordinates: &Coordinates,
    scratch: &mut Scratch,
) -> Result<Vec<ClassFile>> {
    let archive = repository.locate(coordinates, "jar").ok_or_else(|| {
        PackagingError::UnresolvedDependency {
            coordinates: coordinates.to_string(),
            searched: repository.searched(),
        }
    })?;
    let dir = scratch.next_dir()?;
    extract_archive(&archive, &dir)?;
    class_files_in(&dir)
}

/// Every `.class` file under `dir`, outside `META-INF/`, in path order.
pub fn class_files_in(dir: &Path) -> Result<Vec<ClassFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            PackagingError::Io(e.into_io_error().unwrap_or_else(|| {
                io::Error::other(format!("failed to walk {}", dir.display()))
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !path.ends_with(".class") || path.starts_with("META-INF/") {
            continue;
        }
        files.push(ClassFile {
            path,
            bytes: fs::read(entry.path())?,
        });
    }
    Ok(files)
}
