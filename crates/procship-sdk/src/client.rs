// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! KieServerClient: HTTP implementation of [`ExecutionServer`].

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::server::ExecutionServer;
use crate::types::{
    ContainerInfo, ContainerSpec, MigrationReport, MigrationRequest, ProcessInstance,
    ProcessInstanceState, ServiceResponse, TaskStatus, TaskSummary,
};

/// Client for a KIE Server compatible REST API.
///
/// Every request carries HTTP Basic credentials and honors the configured request
/// timeout. The client never retries; a failure response is returned as-is so the
/// caller can decide what it means.
pub struct KieServerClient {
    http: reqwest::Client,
    config: SdkConfig,
}

impl KieServerClient {
    /// Create a new client with the given configuration.
    pub fn new(config: SdkConfig) -> Result<Self> {
        if config.server_url.cannot_be_a_base() {
            return Err(SdkError::Config(format!(
                "server URL cannot be used as a base: {}",
                config.server_url
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SdkError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(SdkConfig::from_env()?)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Build `<server_url>/services/rest/server/<segments...>`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.config.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| SdkError::Config("server URL cannot be used as a base".to_string()))?
            .pop_if_empty()
            .extend(["services", "rest", "server"])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-KIE-ContentType", "JSON")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> SdkError {
        if err.is_timeout() {
            SdkError::Timeout(self.config.request_timeout.as_millis() as u64)
        } else {
            SdkError::Connection(err.to_string())
        }
    }

    async fn body_text(&self, response: Response) -> Result<(StatusCode, String)> {
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        Ok((status, body))
    }

    /// Read an endpoint that answers with a `ServiceResponse` envelope.
    async fn read_envelope<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<ServiceResponse<T>> {
        let (status, body) = self.body_text(response).await?;
        match serde_json::from_str::<ServiceResponse<T>>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => {
                Ok(ServiceResponse::failure(failure_message(status, &body)))
            }
            Err(e) => Err(SdkError::UnexpectedResponse(format!(
                "invalid service response ({}): {}",
                status, e
            ))),
        }
    }

    /// Read an endpoint that answers with a bare payload on success.
    async fn read_payload<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<ServiceResponse<T>> {
        let (status, body) = self.body_text(response).await?;
        if !status.is_success() {
            return Ok(ServiceResponse::failure(failure_message(status, &body)));
        }
        let payload = serde_json::from_str(&body)?;
        Ok(ServiceResponse::success("", payload))
    }

    /// Read an endpoint that answers with no content on success.
    async fn read_empty(&self, response: Response) -> Result<ServiceResponse<()>> {
        let (status, body) = self.body_text(response).await?;
        if status.is_success() {
            Ok(ServiceResponse::success("", ()))
        } else {
            Ok(ServiceResponse::failure(failure_message(status, &body)))
        }
    }
}

/// Failure message for non-2xx responses: the server's text, or the status line.
fn failure_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if let Ok(envelope) = serde_json::from_str::<ServiceResponse<Value>>(body)
        && !envelope.msg.is_empty()
    {
        return envelope.msg;
    }
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        body.trim_matches('"').to_string()
    }
}

// =============================================================================
// Wire envelopes
// =============================================================================

#[derive(Deserialize)]
struct ContainerEnvelope {
    #[serde(rename = "kie-container")]
    container: ContainerInfo,
}

#[derive(Deserialize)]
struct ContainerListEnvelope {
    #[serde(rename = "kie-containers")]
    containers: ContainerList,
}

#[derive(Deserialize)]
struct ContainerList {
    #[serde(rename = "kie-container", default)]
    items: Vec<ContainerInfo>,
}

#[derive(Deserialize)]
struct ProcessInstanceList {
    #[serde(rename = "process-instance", default)]
    items: Vec<ProcessInstance>,
}

#[derive(Deserialize)]
struct TaskSummaryList {
    #[serde(rename = "task-summary", default)]
    items: Vec<TaskSummary>,
}

#[derive(Deserialize)]
struct MigrationReportList {
    #[serde(rename = "migration-report-instance", default)]
    items: Vec<WireMigrationReport>,
}

#[derive(Deserialize)]
struct WireMigrationReport {
    #[serde(rename = "migration-successful")]
    successful: bool,
    #[serde(rename = "migration-process-instance")]
    process_instance_id: i64,
    #[serde(rename = "migration-logs", default)]
    logs: Vec<String>,
    #[serde(rename = "migration-start", default)]
    start: Option<JavaDate>,
    #[serde(rename = "migration-end", default)]
    end: Option<JavaDate>,
}

#[derive(Deserialize)]
struct JavaDate {
    #[serde(rename = "java.util.Date")]
    millis: i64,
}

impl From<WireMigrationReport> for MigrationReport {
    fn from(wire: WireMigrationReport) -> Self {
        MigrationReport {
            process_instance_id: wire.process_instance_id,
            success: wire.successful,
            logs: wire.logs.join("\n"),
            started_at: wire
                .start
                .and_then(|d| Utc.timestamp_millis_opt(d.millis).single()),
            finished_at: wire
                .end
                .and_then(|d| Utc.timestamp_millis_opt(d.millis).single()),
        }
    }
}

#[async_trait]
impl ExecutionServer for KieServerClient {
    // =========================================================================
    // Containers
    // =========================================================================

    #[instrument(skip(self, spec), fields(container_id = %spec.container_id))]
    async fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<ServiceResponse<ContainerInfo>> {
        info!(release_id = %spec.release_id, "Creating container");

        let url = self.endpoint(&["containers", &spec.container_id])?;
        let response = self.send(self.request(Method::PUT, url).json(spec)).await?;
        let envelope: ServiceResponse<ContainerEnvelope> = self.read_envelope(response).await?;
        Ok(envelope.map(|e| e.container))
    }

    #[instrument(skip(self))]
    async fn get_container(&self, container_id: &str) -> Result<ServiceResponse<ContainerInfo>> {
        debug!("Getting container info");

        let url = self.endpoint(&["containers", container_id])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            let (_, body) = self.body_text(response).await?;
            return Ok(
                match serde_json::from_str::<ServiceResponse<ContainerEnvelope>>(&body) {
                    Ok(envelope) => envelope.map(|e| e.container),
                    Err(_) => ServiceResponse::failure(format!(
                        "Container {} is not instantiated.",
                        container_id
                    )),
                },
            );
        }
        let envelope: ServiceResponse<ContainerEnvelope> = self.read_envelope(response).await?;
        Ok(envelope.map(|e| e.container))
    }

    #[instrument(skip(self))]
    async fn dispose_container(&self, container_id: &str) -> Result<ServiceResponse<()>> {
        info!("Disposing container");

        let url = self.endpoint(&["containers", container_id])?;
        let response = self.send(self.request(Method::DELETE, url)).await?;
        let envelope: ServiceResponse<Value> = self.read_envelope(response).await?;
        Ok(envelope.map(|_| ()))
    }

    #[instrument(skip(self))]
    async fn list_containers(&self) -> Result<ServiceResponse<Vec<ContainerInfo>>> {
        debug!("Listing containers");

        let url = self.endpoint(&["containers"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let envelope: ServiceResponse<ContainerListEnvelope> =
            self.read_envelope(response).await?;
        Ok(envelope.map(|e| e.containers.items))
    }

    // =========================================================================
    // Process instances
    // =========================================================================

    #[instrument(skip(self, variables))]
    async fn start_process(
        &self,
        container_id: &str,
        process_id: &str,
        variables: &Map<String, Value>,
    ) -> Result<ServiceResponse<i64>> {
        info!("Starting process instance");

        let url = self.endpoint(&["containers", container_id, "processes", process_id, "instances"])?;
        let response = self
            .send(self.request(Method::POST, url).json(variables))
            .await?;
        self.read_payload(response).await
    }

    #[instrument(skip(self, states))]
    async fn list_process_instances(
        &self,
        container_id: &str,
        states: &[ProcessInstanceState],
        page: u32,
        page_size: u32,
    ) -> Result<ServiceResponse<Vec<ProcessInstance>>> {
        debug!("Listing process instances");

        let mut query: Vec<(&str, String)> = states
            .iter()
            .map(|s| ("status", i32::from(*s).to_string()))
            .collect();
        query.push(("page", page.to_string()));
        query.push(("pageSize", page_size.to_string()));

        let url = self.endpoint(&["queries", "containers", container_id, "process", "instances"])?;
        let response = self
            .send(self.request(Method::GET, url).query(&query))
            .await?;
        let list: ServiceResponse<ProcessInstanceList> = self.read_payload(response).await?;
        Ok(list.map(|l| l.items))
    }

    #[instrument(skip(self), fields(count = instance_ids.len()))]
    async fn abort_process_instances(
        &self,
        container_id: &str,
        instance_ids: &[i64],
    ) -> Result<ServiceResponse<()>> {
        info!(?instance_ids, "Aborting process instances");

        let query: Vec<(&str, String)> = instance_ids
            .iter()
            .map(|id| ("instanceId", id.to_string()))
            .collect();
        let url = self.endpoint(&["containers", container_id, "processes", "instances"])?;
        let response = self
            .send(self.request(Method::DELETE, url).query(&query))
            .await?;
        self.read_empty(response).await
    }

    #[instrument(skip(self, request), fields(
        source = %request.source_container_id,
        target = %request.target_container_id,
        count = request.instance_ids.len()
    ))]
    async fn migrate_process_instances(
        &self,
        request: &MigrationRequest,
    ) -> Result<ServiceResponse<Vec<MigrationReport>>> {
        info!(target_process_id = %request.target_process_id, "Migrating process instances");

        let mut query: Vec<(&str, String)> = vec![
            ("targetContainerId", request.target_container_id.clone()),
            ("targetProcessId", request.target_process_id.clone()),
        ];
        query.extend(
            request
                .instance_ids
                .iter()
                .map(|id| ("pInstanceId", id.to_string())),
        );

        let url = self.endpoint(&[
            "admin",
            "containers",
            &request.source_container_id,
            "processes",
            "instances",
            "migration",
        ])?;
        let response = self
            .send(
                self.request(Method::PUT, url)
                    .query(&query)
                    .json(&request.node_mapping),
            )
            .await?;
        let list: ServiceResponse<MigrationReportList> = self.read_payload(response).await?;
        Ok(list.map(|l| l.items.into_iter().map(MigrationReport::from).collect()))
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    #[instrument(skip(self, statuses))]
    async fn list_tasks(
        &self,
        user: &str,
        statuses: &[TaskStatus],
        page: u32,
        page_size: u32,
    ) -> Result<ServiceResponse<Vec<TaskSummary>>> {
        debug!("Listing tasks");

        let mut query: Vec<(&str, String)> = statuses
            .iter()
            .map(|s| ("status", s.as_str().to_string()))
            .collect();
        query.push(("user", user.to_string()));
        query.push(("page", page.to_string()));
        query.push(("pageSize", page_size.to_string()));

        let url = self.endpoint(&["queries", "tasks", "instances", "pot-owners"])?;
        let response = self
            .send(self.request(Method::GET, url).query(&query))
            .await?;
        let list: ServiceResponse<TaskSummaryList> = self.read_payload(response).await?;
        Ok(list.map(|l| l.items))
    }

    #[instrument(skip(self))]
    async fn claim_task(
        &self,
        container_id: &str,
        task_id: i64,
        user: &str,
    ) -> Result<ServiceResponse<()>> {
        info!("Claiming task");

        let task = task_id.to_string();
        let url = self.endpoint(&["containers", container_id, "tasks", &task, "states", "claimed"])?;
        let response = self
            .send(self.request(Method::PUT, url).query(&[("user", user)]))
            .await?;
        self.read_empty(response).await
    }

    #[instrument(skip(self, variables))]
    async fn complete_task(
        &self,
        container_id: &str,
        task_id: i64,
        user: &str,
        variables: &Map<String, Value>,
    ) -> Result<ServiceResponse<()>> {
        info!("Completing task");

        let task = task_id.to_string();
        let url = self.endpoint(&["containers", container_id, "tasks", &task, "states", "completed"])?;
        let response = self
            .send(
                self.request(Method::PUT, url)
                    .query(&[("user", user), ("auto-progress", "true")])
                    .json(variables),
            )
            .await?;
        self.read_empty(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_rest_prefix() {
        let config = SdkConfig::new()
            .with_server_url(Url::parse("http://kie.local:8080/kie-server/").unwrap());
        let client = KieServerClient::new(config).unwrap();

        let url = client.endpoint(&["containers", "orders_1.0.0"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://kie.local:8080/kie-server/services/rest/server/containers/orders_1.0.0"
        );
    }

    #[test]
    fn test_failure_message_prefers_envelope_msg() {
        let body = r#"{"type":"FAILURE","msg":"Container c1 is not instantiated."}"#;
        assert_eq!(
            failure_message(reqwest::StatusCode::NOT_FOUND, body),
            "Container c1 is not instantiated."
        );
        assert_eq!(
            failure_message(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "\"boom\""),
            "boom"
        );
        assert_eq!(
            failure_message(reqwest::StatusCode::BAD_GATEWAY, ""),
            "HTTP 502 Bad Gateway"
        );
    }

    #[test]
    fn test_wire_migration_report_conversion() {
        let wire: WireMigrationReport = serde_json::from_value(serde_json::json!({
            "migration-id": 3,
            "migration-successful": false,
            "migration-start": {"java.util.Date": 1700000000000i64},
            "migration-end": {"java.util.Date": 1700000000500i64},
            "migration-logs": ["Migration of process instance (7) started", "node not found"],
            "migration-process-instance": 7,
            "migration-container-id": "orders_1.0.0"
        }))
        .unwrap();

        let report = MigrationReport::from(wire);
        assert_eq!(report.process_instance_id, 7);
        assert!(!report.success);
        assert_eq!(report.logs.lines().count(), 2);
        assert!(report.started_at.is_some());
        assert!(report.finished_at.unwrap() > report.started_at.unwrap());
    }
}
