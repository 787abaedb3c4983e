// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Release identity.

use std::fmt;

use procship_sdk::Coordinates;

use crate::error::{PackagingError, Result};

/// Identity of one deployable version of a project.
///
/// The container id (`<project_name>_<version>`) is the join key between the
/// artifact that gets published and the container the server runs it in. The alias
/// is shared by every version of the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    coordinates: Coordinates,
    project_name: String,
}

impl Release {
    /// Create a release.
    pub fn new(coordinates: Coordinates, project_name: impl Into<String>) -> Self {
        Self {
            coordinates,
            project_name: project_name.into(),
        }
    }

    /// Read the release from environment variables.
    ///
    /// - `PROCSHIP_GROUP_ID` (required)
    /// - `PROCSHIP_ARTIFACT_ID` (required)
    /// - `PROCSHIP_VERSION` (required)
    /// - `PROCSHIP_PROJECT_NAME` (default: the artifact id)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the release from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PackagingError::Config(format!("{} is not set", key)))
        };

        let group_id = required("PROCSHIP_GROUP_ID")?;
        let artifact_id = required("PROCSHIP_ARTIFACT_ID")?;
        let version = required("PROCSHIP_VERSION")?;
        let project_name = lookup("PROCSHIP_PROJECT_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| artifact_id.clone());

        Ok(Self::new(
            Coordinates::new(group_id, artifact_id, version),
            project_name,
        ))
    }

    /// Same project and coordinates with a different version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        let mut coordinates = self.coordinates.clone();
        coordinates.version = version.into();
        Self {
            coordinates,
            project_name: self.project_name.clone(),
        }
    }

    pub fn coordinates(&self) -> &Coordinates {
        &self.coordinates
    }

    pub fn group_id(&self) -> &str {
        &self.coordinates.group_id
    }

    pub fn artifact_id(&self) -> &str {
        &self.coordinates.artifact_id
    }

    pub fn version(&self) -> &str {
        &self.coordinates.version
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Container id for this version (`<project_name>_<version>`).
    pub fn container_id(&self) -> String {
        format!("{}_{}", self.project_name, self.coordinates.version)
    }

    /// Alias shared by all versions of the project.
    pub fn container_alias(&self) -> &str {
        &self.project_name
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.container_id(), self.coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_container_id_and_alias() {
        let release = Release::new(Coordinates::new("com.acme", "demo", "1.0.0"), "demo");
        assert_eq!(release.container_id(), "demo_1.0.0");
        assert_eq!(release.container_alias(), "demo");
    }

    #[test]
    fn test_with_version_keeps_project() {
        let release = Release::new(Coordinates::new("com.acme", "demo", "1.0.0"), "demo");
        let next = release.with_version("1.0.1");
        assert_eq!(next.container_id(), "demo_1.0.1");
        assert_eq!(next.group_id(), "com.acme");
        assert_eq!(release.version(), "1.0.0");
    }

    #[test]
    fn test_from_lookup_defaults_project_name() {
        let release = Release::from_lookup(lookup_from(&[
            ("PROCSHIP_GROUP_ID", "com.acme"),
            ("PROCSHIP_ARTIFACT_ID", "orders"),
            ("PROCSHIP_VERSION", "2.1.0"),
        ]))
        .unwrap();
        assert_eq!(release.project_name(), "orders");
        assert_eq!(release.container_id(), "orders_2.1.0");
    }

    #[test]
    fn test_from_lookup_missing_version() {
        let err = Release::from_lookup(lookup_from(&[
            ("PROCSHIP_GROUP_ID", "com.acme"),
            ("PROCSHIP_ARTIFACT_ID", "orders"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PROCSHIP_VERSION"));
    }
}
