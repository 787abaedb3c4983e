// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error type tests for procship-sdk.

use procship_sdk::SdkError;

#[test]
fn test_timeout_error_display() {
    let err = SdkError::Timeout(5000);
    assert!(err.to_string().contains("timed out"));
    assert!(err.to_string().contains("5000"));
}

#[test]
fn test_server_error_display() {
    let err = SdkError::Server {
        code: "CREATE_CONTAINER".to_string(),
        message: "Container demo_1.0.0 already exists.".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("server error"));
    assert!(display.contains("CREATE_CONTAINER"));
    assert!(display.contains("already exists"));
}

#[test]
fn test_already_aborted_markers() {
    let parent_race = SdkError::Server {
        code: "ABORT_INSTANCES".to_string(),
        message: "Process instance 12 is already aborted".to_string(),
    };
    assert!(parent_race.is_already_aborted());

    let vanished = SdkError::Server {
        code: "ABORT_INSTANCES".to_string(),
        message: "Could not find process instance with id 13".to_string(),
    };
    assert!(vanished.is_already_aborted());

    let denied = SdkError::Server {
        code: "ABORT_INSTANCES".to_string(),
        message: "User 'ops' is not authorized".to_string(),
    };
    assert!(!denied.is_already_aborted());
}

#[test]
fn test_transport_errors_are_never_already_aborted() {
    let err = SdkError::Connection("Could not find process instance".to_string());
    assert!(err.server_message().is_none());
    assert!(!err.is_already_aborted());
}

#[test]
fn test_container_absent_markers() {
    let absent = |message: &str| SdkError::Server {
        code: "GET_CONTAINER".to_string(),
        message: message.to_string(),
    };
    assert!(absent("Container demo_1.0.0 is not instantiated.").is_container_absent());
    assert!(absent("Container demo_1.0.0 does not exist").is_container_absent());
    assert!(!absent("<html>Unauthorized</html>").is_container_absent());
    assert!(!absent("HTTP 500 Internal Server Error").is_container_absent());
    assert!(!SdkError::Timeout(500).is_container_absent());
}

#[test]
fn test_serde_error_conversion() {
    let err: SdkError = serde_json::from_str::<u32>("not json").unwrap_err().into();
    assert!(matches!(err, SdkError::Serialization(_)));
}
