// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for procship-sdk.

use thiserror::Error;

/// Result type using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Message fragments the server reports when an abort targets an instance that was
/// already aborted as a side effect of its parent's cancellation.
pub const ALREADY_ABORTED_MARKERS: &[&str] = &[
    "already aborted",
    "Could not find process instance",
];

/// Message fragments the server reports when a container it was asked about does not
/// exist.
pub const CONTAINER_ABSENT_MARKERS: &[&str] = &["is not instantiated", "does not exist"];

/// Errors that can occur when talking to the execution server.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to the execution server failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Request timed out.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// Server answered with a failure response.
    #[error("server error [{code}]: {message}")]
    Server { code: String, message: String },

    /// Unexpected response from server.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SdkError {
    /// Message text reported by the server, if this is a server failure.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            SdkError::Server { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether the server rejected an abort because the instance was already aborted
    /// by its parent.
    pub fn is_already_aborted(&self) -> bool {
        self.server_message()
            .is_some_and(|message| ALREADY_ABORTED_MARKERS.iter().any(|m| message.contains(m)))
    }

    /// Whether the server reported that the container does not exist.
    pub fn is_container_absent(&self) -> bool {
        self.server_message()
            .is_some_and(|message| CONTAINER_ABSENT_MARKERS.iter().any(|m| message.contains(m)))
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SdkError {
    fn from(err: url::ParseError) -> Self {
        SdkError::Config(err.to_string())
    }
}
