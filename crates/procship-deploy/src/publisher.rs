// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Artifact publishing.
//!
//! A built artifact must be resolvable by the execution server before a container
//! can be created from it. When the server runs on this host it reads the local
//! repository directly; otherwise the artifact is uploaded to a remote repository.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use procship_package::{BuiltArtifact, LocalRepository, Release};
use reqwest::multipart::{Form, Part};
use tracing::{debug, info, instrument};
use url::{Host, Url};

use crate::error::PublishError;

const JAR_MIME: &str = "application/java-archive";

/// Remote artifact repository accepting multipart uploads.
#[derive(Debug, Clone)]
pub struct RemoteRepository {
    pub url: Url,
    pub username: String,
    pub password: String,
}

/// Where an artifact must be published so that a server can resolve it.
#[derive(Debug, Clone)]
pub struct PublishTarget {
    /// Execution server that will create the container.
    pub server_url: Url,
    /// Remote repository for servers on other hosts.
    pub remote: Option<RemoteRepository>,
}

impl PublishTarget {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: RemoteRepository) -> Self {
        self.remote = Some(remote);
        self
    }
}

/// How an artifact was published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Installed into the local repository.
    Installed { jar: PathBuf },
    /// Uploaded to a remote repository.
    Uploaded { url: Url },
}

/// Makes built artifacts resolvable by the execution server.
#[derive(Debug, Clone)]
pub struct ArtifactPublisher {
    repository: LocalRepository,
    http: reqwest::Client,
}

impl ArtifactPublisher {
    pub fn new(repository: LocalRepository) -> Result<Self, PublishError> {
        Self::with_timeout(repository, Duration::from_secs(120))
    }

    /// Publisher whose uploads give up after `timeout`.
    pub fn with_timeout(repository: LocalRepository, timeout: Duration) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { repository, http })
    }

    pub fn repository(&self) -> &LocalRepository {
        &self.repository
    }

    /// Publish `artifact` under the coordinates of `release`.
    #[instrument(skip_all, fields(coordinates = %release.coordinates(), server = %target.server_url))]
    pub async fn publish(
        &self,
        artifact: &BuiltArtifact,
        release: &Release,
        target: &PublishTarget,
    ) -> Result<PublishOutcome, PublishError> {
        if is_local_server(&target.server_url).await? {
            self.install_local(artifact, release)
        } else {
            let remote = target.remote.as_ref().ok_or_else(|| {
                PublishError::InvalidTarget(format!(
                    "server {} is remote and no repository URL is configured",
                    target.server_url
                ))
            })?;
            self.upload(artifact, release, remote).await
        }
    }

    fn install_local(
        &self,
        artifact: &BuiltArtifact,
        release: &Release,
    ) -> Result<PublishOutcome, PublishError> {
        self.repository.add_lookup_path(artifact.directory());
        let jar = self.repository.install(
            release.coordinates(),
            artifact.jar_path(),
            artifact.pom_path(),
        )?;
        info!(jar = %jar.display(), "Installed artifact into local repository");
        Ok(PublishOutcome::Installed { jar })
    }

    async fn upload(
        &self,
        artifact: &BuiltArtifact,
        release: &Release,
        remote: &RemoteRepository,
    ) -> Result<PublishOutcome, PublishError> {
        let coordinates = release.coordinates();
        let path = coordinates.repository_path("jar");
        let url = artifact_url(&remote.url, &path)?;

        let part = Part::bytes(artifact.bytes().to_vec())
            .file_name(coordinates.file_name("jar"))
            .mime_str(JAR_MIME)?;
        let form = Form::new().part("file", part);

        debug!(url = %url, bytes = artifact.bytes().len(), "Uploading artifact");
        let response = self
            .http
            .post(url.clone())
            .basic_auth(&remote.username, Some(&remote.password))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                path,
            });
        }
        info!(url = %url, status = status.as_u16(), "Uploaded artifact");
        Ok(PublishOutcome::Uploaded { url })
    }
}

/// Repository base URL extended with the artifact's layout path.
fn artifact_url(base: &Url, path: &str) -> Result<Url, PublishError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| PublishError::InvalidTarget(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(path.split('/'));
    Ok(url)
}

/// Whether the server URL's host resolves to a loopback address.
async fn is_local_server(server_url: &Url) -> Result<bool, PublishError> {
    match server_url.host() {
        Some(Host::Ipv4(ip)) => Ok(ip.is_loopback()),
        Some(Host::Ipv6(ip)) => Ok(ip.is_loopback()),
        Some(Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Ok(true);
            }
            let port = server_url.port_or_known_default().unwrap_or(80);
            let mut addresses = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| {
                    PublishError::InvalidTarget(format!("cannot resolve {}: {}", domain, e))
                })?;
            Ok(addresses.any(|a| is_loopback(a.ip())))
        }
        None => Err(PublishError::InvalidTarget(format!(
            "server URL {} has no host",
            server_url
        ))),
    }
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}
