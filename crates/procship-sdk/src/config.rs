// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the execution server client.

use std::time::Duration;

use url::Url;

use crate::error::{Result, SdkError};

const DEFAULT_SERVER_URL: &str = "http://localhost:8080/kie-server";

/// Configuration for the KieServerClient.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Base URL of the execution server (without `/services/rest/server`).
    pub server_url: Url,
    /// User for HTTP Basic authentication.
    pub username: String,
    /// Password for HTTP Basic authentication.
    pub password: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout, applied to every server call.
    pub request_timeout: Duration,
    /// Page size used when listing process instances.
    pub page_size: u32,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            server_url: Url::parse(DEFAULT_SERVER_URL).unwrap(),
            username: "kieserver".to_string(),
            password: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            page_size: 100,
        }
    }
}

impl SdkConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PROCSHIP_SERVER_URL`: Server base URL (default: "http://localhost:8080/kie-server")
    /// - `PROCSHIP_SERVER_USER`: Basic auth user (default: "kieserver")
    /// - `PROCSHIP_SERVER_PASSWORD`: Basic auth password (default: empty)
    /// - `PROCSHIP_CONNECT_TIMEOUT_MS`: Connection timeout in milliseconds (default: 10000)
    /// - `PROCSHIP_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    /// - `PROCSHIP_PAGE_SIZE`: Instance listing page size (default: 100)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server_url = lookup("PROCSHIP_SERVER_URL")
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = Url::parse(&server_url)
            .map_err(|e| SdkError::Config(format!("invalid PROCSHIP_SERVER_URL: {}", e)))?;

        let username = lookup("PROCSHIP_SERVER_USER").unwrap_or_else(|| "kieserver".to_string());
        let password = lookup("PROCSHIP_SERVER_PASSWORD").unwrap_or_default();

        let connect_timeout_ms: u64 = lookup("PROCSHIP_CONNECT_TIMEOUT_MS")
            .unwrap_or_else(|| "10000".to_string())
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid PROCSHIP_CONNECT_TIMEOUT_MS: {}", e)))?;

        let request_timeout_ms: u64 = lookup("PROCSHIP_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|| "30000".to_string())
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid PROCSHIP_REQUEST_TIMEOUT_MS: {}", e)))?;

        let page_size: u32 = lookup("PROCSHIP_PAGE_SIZE")
            .unwrap_or_else(|| "100".to_string())
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid PROCSHIP_PAGE_SIZE: {}", e)))?;
        if page_size == 0 {
            return Err(SdkError::Config(
                "PROCSHIP_PAGE_SIZE must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            server_url,
            username,
            password,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            page_size,
        })
    }

    /// Set the server URL.
    pub fn with_server_url(mut self, url: Url) -> Self {
        self.server_url = url;
        self
    }

    /// Set the Basic auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the page size for instance listings.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Host part of the server URL.
    pub fn server_host(&self) -> Option<&str> {
        self.server_url.host_str()
    }
}
