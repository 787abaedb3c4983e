// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for procship-package.

use thiserror::Error;

/// Result type using PackagingError.
pub type Result<T> = std::result::Result<T, PackagingError>;

/// Errors that can occur while building a deployable artifact.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// Missing or invalid release configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A handler or service class was not found on the classpath.
    #[error("class not found on classpath: {0}")]
    UnresolvedClass(String),

    /// A dependency archive was not found in any repository lookup path.
    #[error("dependency {coordinates} not found (looked in {searched})")]
    UnresolvedDependency {
        coordinates: String,
        searched: String,
    },

    /// A zip archive could not be read or written.
    #[error("archive error in {path}: {source}")]
    Archive {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor template failed to render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The module build step reported error-level messages.
    #[error("package validation failed: {}", messages.join("; "))]
    Validation { messages: Vec<String> },

    /// A process model could not be produced.
    #[error("process {process_id}: {message}")]
    Process {
        process_id: String,
        message: String,
    },
}

impl PackagingError {
    pub(crate) fn archive(path: impl std::fmt::Display, source: zip::result::ZipError) -> Self {
        PackagingError::Archive {
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn process(process_id: &str, message: impl Into<String>) -> Self {
        PackagingError::Process {
            process_id: process_id.to_string(),
            message: message.into(),
        }
    }
}
