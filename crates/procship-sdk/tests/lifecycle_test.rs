// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle client tests against the in-memory execution server.

use std::sync::Arc;

use procship_sdk::{
    ContainerLifecycleClient, Coordinates, InMemoryExecutionServer, MigrationRequest, SdkError,
};
use serde_json::Map;

async fn setup() -> (InMemoryExecutionServer, ContainerLifecycleClient) {
    let server = InMemoryExecutionServer::new();
    let client = ContainerLifecycleClient::new(Arc::new(server.clone())).with_page_size(2);
    (server, client)
}

#[tokio::test]
async fn test_create_then_get_info() {
    let (_server, client) = setup().await;
    let coords = Coordinates::new("com.acme", "demo", "1.0.0");

    assert!(client.get_info("demo_1.0.0").await.unwrap().is_none());

    client.create("demo_1.0.0", "demo", &coords).await.unwrap();
    let info = client.get_info("demo_1.0.0").await.unwrap().unwrap();
    assert_eq!(info.release_id, coords);
}

#[tokio::test]
async fn test_create_duplicate_surfaces_server_message() {
    let (_server, client) = setup().await;
    let coords = Coordinates::new("com.acme", "demo", "1.0.0");
    client.create("demo_1.0.0", "demo", &coords).await.unwrap();

    let err = client.create("demo_1.0.0", "demo", &coords).await.unwrap_err();
    match err {
        SdkError::Server { code, message } => {
            assert_eq!(code, "CREATE_CONTAINER");
            assert!(message.contains("already exists"));
        }
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_list_active_instances_pages_through_results() {
    let (server, client) = setup().await;
    let coords = Coordinates::new("com.acme", "demo", "1.0.0");
    client.create("demo_1.0.0", "demo", &coords).await.unwrap();

    for _ in 0..5 {
        client
            .start_process("demo_1.0.0", "demo.approval", &Map::new())
            .await
            .unwrap();
    }

    let instances = client.list_active_instances("demo_1.0.0").await.unwrap();
    assert_eq!(instances.len(), 5);
    // 2 + 2 + 1
    assert_eq!(server.calls().await.list_instances, 3);
}

#[tokio::test]
async fn test_abort_unknown_instance_is_already_aborted() {
    let (_server, client) = setup().await;
    let coords = Coordinates::new("com.acme", "demo", "1.0.0");
    client.create("demo_1.0.0", "demo", &coords).await.unwrap();

    let err = client.abort_instances("demo_1.0.0", &[999]).await.unwrap_err();
    assert!(err.is_already_aborted());
}

#[tokio::test]
async fn test_migrate_instances_moves_to_target() {
    let (server, client) = setup().await;
    client
        .create("demo_1.0.0", "demo", &Coordinates::new("com.acme", "demo", "1.0.0"))
        .await
        .unwrap();
    client
        .create("demo_1.0.1", "demo", &Coordinates::new("com.acme", "demo", "1.0.1"))
        .await
        .unwrap();
    server
        .define_process("demo_1.0.1", "demo.approval", "Approval", "2.0")
        .await;

    let id = client
        .start_process("demo_1.0.0", "demo.approval", &Map::new())
        .await
        .unwrap();

    let reports = client
        .migrate_instances(&MigrationRequest {
            source_container_id: "demo_1.0.0".to_string(),
            instance_ids: vec![id],
            target_container_id: "demo_1.0.1".to_string(),
            target_process_id: "demo.approval".to_string(),
            node_mapping: Default::default(),
        })
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert!(reports[0].success);
    let moved = server.instance(id).await.unwrap();
    assert_eq!(moved.container_id, "demo_1.0.1");
    assert_eq!(moved.process_version, "2.0");
}

#[tokio::test]
async fn test_dispose_drops_container_instances() {
    let (server, client) = setup().await;
    client
        .create("demo_1.0.0", "demo", &Coordinates::new("com.acme", "demo", "1.0.0"))
        .await
        .unwrap();
    let id = client
        .start_process("demo_1.0.0", "demo.approval", &Map::new())
        .await
        .unwrap();

    client.dispose("demo_1.0.0").await.unwrap();

    assert!(server.container("demo_1.0.0").await.is_none());
    assert!(server.instance(id).await.is_none());
    assert!(client.list_containers().await.unwrap().is_empty());
}
