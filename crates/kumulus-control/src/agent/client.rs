//! HTTP client for the provisioning agent API.

use async_trait::async_trait;
use kumulus_proto::{
    CreateAppRequest, CreateAppResponse, CreateVmRequest, CreateVmResponse,
    DeploymentControlRequest, DeploymentControlResponse, ErrorBody, LifecycleOp,
    VmControlRequest, VmControlResponse,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AgentClientConfig;
use crate::error::{ControlError, ControlResult};

use super::ProvisioningAgent;

/// Talks to agents over HTTP at `http://<address>:<port>`.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: Client,
    port: u16,
    timeout_secs: u64,
}

impl HttpAgentClient {
    /// Create a client from configuration.
    pub fn new(config: &AgentClientConfig) -> ControlResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(ControlError::Http)?;

        Ok(Self {
            client,
            port: config.port,
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn url(&self, address: &str, path: &str) -> String {
        format!("http://{address}:{}{path}", self.port)
    }

    fn send_error(&self, address: &str, err: &reqwest::Error) -> ControlError {
        if err.is_timeout() {
            return ControlError::AgentTimeout(self.timeout_secs);
        }
        ControlError::agent(format!("agent at {address} unreachable: {err}"))
    }

    async fn post<B, R>(&self, address: &str, path: &str, body: &B) -> ControlResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(address, path);
        debug!(%url, "calling agent");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(address, &e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| self.send_error(address, &e));
        }

        let text = response.text().await.unwrap_or_default();
        let Ok(body) = serde_json::from_str::<ErrorBody>(&text) else {
            // A 404 or 400 without an agent error body came from something
            // other than the agent handler, such as a proxy or a wrong port.
            warn!(%url, %status, body = %text, "agent call failed with untyped body");
            return Err(ControlError::agent(format!("agent returned {status}: {text}")));
        };
        warn!(%url, %status, error = %body.error, "agent call failed");

        Err(match status {
            StatusCode::NOT_FOUND => ControlError::NotFound(body.error),
            StatusCode::BAD_REQUEST => ControlError::Validation(body.error),
            _ => ControlError::AgentFailure {
                message: body.error,
                details: body.details,
            },
        })
    }
}

#[async_trait]
impl ProvisioningAgent for HttpAgentClient {
    async fn create_vm(
        &self,
        address: &str,
        request: &CreateVmRequest,
    ) -> ControlResult<CreateVmResponse> {
        self.post(address, "/create-vm", request).await
    }

    async fn control_vm(
        &self,
        address: &str,
        op: LifecycleOp,
        request: &VmControlRequest,
    ) -> ControlResult<VmControlResponse> {
        self.post(address, op.vm_path(), request).await
    }

    async fn create_app(
        &self,
        address: &str,
        request: &CreateAppRequest,
    ) -> ControlResult<CreateAppResponse> {
        self.post(address, "/create-app", request).await
    }

    async fn control_deployment(
        &self,
        address: &str,
        op: LifecycleOp,
        request: &DeploymentControlRequest,
    ) -> ControlResult<DeploymentControlResponse> {
        self.post(address, op.deployment_path(), request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use kumulus_proto::ContainerStatus;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    async fn spawn_agent(router: Router, timeout_secs: u64) -> HttpAgentClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        HttpAgentClient::new(&AgentClientConfig {
            port,
            request_timeout_secs: timeout_secs,
        })
        .unwrap()
    }

    fn vm_request(id: &str) -> VmControlRequest {
        VmControlRequest {
            vm_id: id.to_owned(),
        }
    }

    #[tokio::test]
    async fn success_decodes_response() {
        let router = Router::new().route(
            "/stop-vm",
            post(|Json(body): Json<Value>| async move {
                Json(json!({ "vmId": body["vmId"], "status": "stopped" }))
            }),
        );
        let client = spawn_agent(router, 5).await;

        let response = client
            .control_vm("127.0.0.1", LifecycleOp::Stop, &vm_request("vm-1"))
            .await
            .unwrap();
        assert_eq!(response.vm_id, "vm-1");
        assert_eq!(response.status, ContainerStatus::Stopped);
    }

    #[tokio::test]
    async fn not_found_maps_to_not_found() {
        let router = Router::new().route(
            "/start-vm",
            post(|| async {
                (
                    AxumStatus::NOT_FOUND,
                    Json(json!({ "error": "VM vm-1 not found" })),
                )
            }),
        );
        let client = spawn_agent(router, 5).await;

        let err = client
            .control_vm("127.0.0.1", LifecycleOp::Start, &vm_request("vm-1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "VM vm-1 not found");
    }

    #[tokio::test]
    async fn failure_keeps_details() {
        let router = Router::new().route(
            "/delete-vm",
            post(|| async {
                (
                    AxumStatus::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "docker rm failed",
                        "details": { "stdout": "", "stderr": "device busy" }
                    })),
                )
            }),
        );
        let client = spawn_agent(router, 5).await;

        match client
            .control_vm("127.0.0.1", LifecycleOp::Delete, &vm_request("vm-1"))
            .await
        {
            Err(ControlError::AgentFailure { message, details }) => {
                assert_eq!(message, "docker rm failed");
                assert_eq!(details.unwrap()["stderr"], "device busy");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_request_maps_to_validation() {
        let router = Router::new().route(
            "/stop-vm",
            post(|| async {
                (
                    AxumStatus::BAD_REQUEST,
                    Json(json!({ "error": "invalid username" })),
                )
            }),
        );
        let client = spawn_agent(router, 5).await;

        let err = client
            .control_vm("127.0.0.1", LifecycleOp::Stop, &vm_request("vm-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
    }

    #[tokio::test]
    async fn untyped_not_found_is_agent_failure() {
        let router = Router::new().route(
            "/start-vm",
            post(|| async { (AxumStatus::NOT_FOUND, "404 page not found") }),
        );
        let client = spawn_agent(router, 5).await;

        let err = client
            .control_vm("127.0.0.1", LifecycleOp::Start, &vm_request("vm-1"))
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        match err {
            ControlError::AgentFailure { message, details } => {
                assert!(message.contains("404 page not found"));
                assert!(details.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_route_is_agent_failure() {
        let client = spawn_agent(Router::new(), 5).await;

        let err = client
            .control_vm("127.0.0.1", LifecycleOp::Delete, &vm_request("vm-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::AgentFailure { .. }));
    }

    #[tokio::test]
    async fn untyped_bad_request_is_agent_failure() {
        let router = Router::new().route(
            "/stop-vm",
            post(|| async { (AxumStatus::BAD_REQUEST, "not json") }),
        );
        let client = spawn_agent(router, 5).await;

        let err = client
            .control_vm("127.0.0.1", LifecycleOp::Stop, &vm_request("vm-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::AgentFailure { .. }));
    }

    #[tokio::test]
    async fn slow_agent_times_out() {
        let router = Router::new().route(
            "/stop-vm",
            post(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                Json(json!({ "vmId": "vm-1", "status": "stopped" }))
            }),
        );
        let client = spawn_agent(router, 1).await;

        let err = client
            .control_vm("127.0.0.1", LifecycleOp::Stop, &vm_request("vm-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::AgentTimeout(1)));
    }

    #[tokio::test]
    async fn unreachable_agent_is_agent_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpAgentClient::new(&AgentClientConfig {
            port,
            request_timeout_secs: 5,
        })
        .unwrap();
        let err = client
            .control_vm("127.0.0.1", LifecycleOp::Stop, &vm_request("vm-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::AgentFailure { .. }));
    }
}
