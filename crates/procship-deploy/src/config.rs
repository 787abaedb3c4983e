// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for procship deployments.

use std::path::PathBuf;
use std::time::Duration;

use procship_package::Release;
use procship_sdk::SdkConfig;
use url::Url;

use crate::error::{DeployError, Result};
use crate::orchestrator::UndeployPolicy;
use crate::publisher::RemoteRepository;

/// Deployment configuration.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Execution server connection.
    pub sdk: SdkConfig,
    /// Release being deployed.
    pub release: Release,
    /// Local artifact repository root.
    pub local_repository: PathBuf,
    /// Remote artifact repository, used when the server is not on this host.
    pub remote_repository: Option<RemoteRepository>,
    /// Classpath entries searched for handler and service classes.
    pub classpath: Vec<String>,
    /// Append platform listener registrations to the deployment descriptor.
    pub platform_listeners: bool,
    /// Abort retry policy for undeploy.
    pub undeploy: UndeployPolicy,
}

impl DeployConfig {
    /// Load configuration from environment variables.
    ///
    /// Server and release variables are read by [`SdkConfig::from_env`] and
    /// [`Release::from_env`]. On top of those:
    /// - `PROCSHIP_LOCAL_REPOSITORY`: Local repository root (default: "$HOME/.m2/repository")
    /// - `PROCSHIP_REPOSITORY_URL`: Remote repository URL (optional)
    /// - `PROCSHIP_REPOSITORY_USER` / `PROCSHIP_REPOSITORY_PASSWORD`: Remote repository credentials
    /// - `PROCSHIP_CLASSPATH`: Colon separated classpath entries (default: empty)
    /// - `PROCSHIP_PLATFORM_LISTENERS`: Register platform listeners (default: false)
    /// - `PROCSHIP_MAX_ABORT_PASSES`: Abort passes before giving up (default: 10)
    /// - `PROCSHIP_ABORT_RETRY_DELAY_MS`: Delay between abort passes (default: 500)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let sdk = SdkConfig::from_lookup(&lookup).map_err(|e| DeployError::Config(e.to_string()))?;
        let release =
            Release::from_lookup(&lookup).map_err(|e| DeployError::Config(e.to_string()))?;

        let local_repository = match lookup("PROCSHIP_LOCAL_REPOSITORY") {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => lookup("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".m2")
                .join("repository"),
        };

        let remote_repository = match lookup("PROCSHIP_REPOSITORY_URL") {
            Some(url) if !url.trim().is_empty() => {
                let url = Url::parse(url.trim()).map_err(|e| {
                    DeployError::Config(format!("invalid PROCSHIP_REPOSITORY_URL: {}", e))
                })?;
                Some(RemoteRepository {
                    url,
                    username: lookup("PROCSHIP_REPOSITORY_USER").unwrap_or_default(),
                    password: lookup("PROCSHIP_REPOSITORY_PASSWORD").unwrap_or_default(),
                })
            }
            _ => None,
        };

        let classpath = lookup("PROCSHIP_CLASSPATH")
            .map(|v| {
                v.split(':')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let platform_listeners = lookup("PROCSHIP_PLATFORM_LISTENERS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let defaults = UndeployPolicy::default();
        let max_abort_passes: u32 = match lookup("PROCSHIP_MAX_ABORT_PASSES") {
            Some(v) => v
                .parse()
                .map_err(|e| DeployError::Config(format!("invalid PROCSHIP_MAX_ABORT_PASSES: {}", e)))?,
            None => defaults.max_abort_passes,
        };
        if max_abort_passes == 0 {
            return Err(DeployError::Config(
                "PROCSHIP_MAX_ABORT_PASSES must be greater than zero".to_string(),
            ));
        }
        let retry_delay = match lookup("PROCSHIP_ABORT_RETRY_DELAY_MS") {
            Some(v) => Duration::from_millis(v.parse().map_err(|e| {
                DeployError::Config(format!("invalid PROCSHIP_ABORT_RETRY_DELAY_MS: {}", e))
            })?),
            None => defaults.retry_delay,
        };

        Ok(Self {
            sdk,
            release,
            local_repository,
            remote_repository,
            classpath,
            platform_listeners,
            undeploy: defaults
                .with_max_abort_passes(max_abort_passes)
                .with_retry_delay(retry_delay),
        })
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

    const RELEASE: &[(&str, &str)] = &[
        ("PROCSHIP_GROUP_ID", "com.acme"),
        ("PROCSHIP_ARTIFACT_ID", "demo"),
        ("PROCSHIP_VERSION", "1.0.0"),
        ("HOME", "/home/deployer"),
    ];

    #[test]
    fn test_defaults() {
        let config = DeployConfig::from_lookup(lookup_from(RELEASE)).unwrap();

        assert_eq!(config.release.container_id(), "demo_1.0.0");
        assert_eq!(
            config.local_repository,
            PathBuf::from("/home/deployer/.m2/repository")
        );
        assert!(config.remote_repository.is_none());
        assert!(config.classpath.is_empty());
        assert!(!config.platform_listeners);
        assert_eq!(config.undeploy.max_abort_passes, 10);
        assert_eq!(config.undeploy.retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = RELEASE.to_vec();
        pairs.extend([
            ("PROCSHIP_LOCAL_REPOSITORY", "/srv/m2"),
            ("PROCSHIP_REPOSITORY_URL", "https://nexus.acme.test/repository/releases"),
            ("PROCSHIP_REPOSITORY_USER", "ci"),
            ("PROCSHIP_REPOSITORY_PASSWORD", "token"),
            ("PROCSHIP_CLASSPATH", "target/classes: lib/handlers.jar:"),
            ("PROCSHIP_PLATFORM_LISTENERS", "1"),
            ("PROCSHIP_MAX_ABORT_PASSES", "3"),
            ("PROCSHIP_ABORT_RETRY_DELAY_MS", "50"),
        ]);
        let config = DeployConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.local_repository, PathBuf::from("/srv/m2"));
        let remote = config.remote_repository.unwrap();
        assert_eq!(remote.url.host_str(), Some("nexus.acme.test"));
        assert_eq!(remote.username, "ci");
        assert_eq!(config.classpath, vec!["target/classes", "lib/handlers.jar"]);
        assert!(config.platform_listeners);
        assert_eq!(config.undeploy.max_abort_passes, 3);
        assert_eq!(config.undeploy.retry_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_missing_release_is_config_error() {
        let err = DeployConfig::from_lookup(lookup_from(&[("PROCSHIP_GROUP_ID", "com.acme")]))
            .unwrap_err();
        assert!(matches!(err, DeployError::Config(ref m) if m.contains("PROCSHIP_ARTIFACT_ID")));
    }

    #[test]
    fn test_zero_abort_passes_rejected() {
        let mut pairs = RELEASE.to_vec();
        pairs.push(("PROCSHIP_MAX_ABORT_PASSES", "0"));
        assert!(DeployConfig::from_lookup(lookup_from(&pairs)).is_err());
    }
}
