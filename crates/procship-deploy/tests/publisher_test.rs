// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Publishing built artifacts locally and to a remote repository.

use procship_deploy::{ArtifactPublisher, PublishError, PublishOutcome, PublishTarget, RemoteRepository};
use procship_package::{ArtifactPackager, BuiltArtifact, LocalRepository, Release};
use procship_sdk::Coordinates;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{basic_auth, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTIFACT_PATH: &str = "/repository/releases/com/acme/demo/1.0.0/demo-1.0.0.jar";

fn release() -> Release {
    Release::new(Coordinates::new("com.acme", "demo", "1.0.0"), "demo")
}

fn build(dir: &TempDir) -> (LocalRepository, BuiltArtifact) {
    let repository = LocalRepository::new(dir.path().join("repo"));
    let artifact = ArtifactPackager::new(repository.clone())
        .build_artifact(&[], &[], &[], &[], &release())
        .unwrap();
    (repository, artifact)
}

fn remote_target(server: &MockServer) -> PublishTarget {
    PublishTarget::new(Url::parse("http://10.255.255.1:8080/kie-server").unwrap()).with_remote(
        RemoteRepository {
            url: Url::parse(&format!("{}/repository/releases", server.uri())).unwrap(),
            username: "ci".to_string(),
            password: "token".to_string(),
        },
    )
}

#[tokio::test]
async fn test_local_server_installs_into_repository() {
    let dir = tempfile::tempdir().unwrap();
    let (repository, artifact) = build(&dir);
    let publisher = ArtifactPublisher::new(repository.clone()).unwrap();
    let target = PublishTarget::new(Url::parse("http://localhost:8080/kie-server").unwrap());

    let outcome = publisher.publish(&artifact, &release(), &target).await.unwrap();

    let expected = repository.artifact_path(release().coordinates(), "jar");
    assert_eq!(outcome, PublishOutcome::Installed { jar: expected.clone() });
    assert_eq!(std::fs::read(&expected).unwrap(), artifact.bytes());
    assert!(
        repository
            .artifact_path(release().coordinates(), "pom")
            .is_file()
    );
    assert_eq!(repository.lookup_paths(), vec![artifact.directory().to_path_buf()]);
}

#[tokio::test]
async fn test_remote_server_uploads_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (repository, artifact) = build(&dir);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ARTIFACT_PATH))
        .and(basic_auth("ci", "token"))
        .and(body_string_contains("demo-1.0.0.jar"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = ArtifactPublisher::new(repository.clone()).unwrap();
    let outcome = publisher
        .publish(&artifact, &release(), &remote_target(&server))
        .await
        .unwrap();

    match outcome {
        PublishOutcome::Uploaded { url } => assert_eq!(url.path(), ARTIFACT_PATH),
        other => panic!("expected upload, got {:?}", other),
    }
    assert!(
        !repository
            .artifact_path(release().coordinates(), "jar")
            .exists()
    );
}

#[tokio::test]
async fn test_rejected_upload() {
    let dir = tempfile::tempdir().unwrap();
    let (repository, artifact) = build(&dir);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ARTIFACT_PATH))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let publisher = ArtifactPublisher::new(repository).unwrap();
    let err = publisher
        .publish(&artifact, &release(), &remote_target(&server))
        .await
        .unwrap_err();

    match err {
        PublishError::Rejected { status, path } => {
            assert_eq!(status, 409);
            assert_eq!(path, "com/acme/demo/1.0.0/demo-1.0.0.jar");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_remote_server_without_repository() {
    let dir = tempfile::tempdir().unwrap();
    let (repository, artifact) = build(&dir);
    let publisher = ArtifactPublisher::new(repository).unwrap();
    let target = PublishTarget::new(Url::parse("http://10.255.255.1:8080/kie-server").unwrap());

    let err = publisher
        .publish(&artifact, &release(), &target)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::InvalidTarget(_)));
}
