//! HTTP client for the Kubernetes API server, used for health probing.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::K8sClient;
use crate::domain::entities::{NodeIdentity, NodeRole};
use crate::error::{AppError, Result};

/// Talks to the kube-apiserver behind the VIP over HTTPS.
///
/// The API servers in a duokube cluster run with self-signed certificates,
/// so certificate verification is relaxed for the probe client.
pub struct HttpK8sClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<NodeItem>,
}

#[derive(Deserialize)]
struct NodeItem {
    metadata: NodeMetadata,
    #[serde(default)]
    status: NodeItemStatus,
}

#[derive(Deserialize)]
struct NodeMetadata {
    name: String,
}

#[derive(Deserialize, Default)]
struct NodeItemStatus {
    #[serde(default)]
    addresses: Vec<NodeAddress>,
}

#[derive(Deserialize)]
struct NodeAddress {
    #[serde(rename = "type")]
    kind: String,
    address: String,
}

impl HttpK8sClient {
    pub fn new(api_server: &str, bearer_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::KubernetesError(format!("failed to build http client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: api_server.trim_end_matches('/').to_string(),
            bearer_token,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl K8sClient for HttpK8sClient {
    async fn get_nodes(&self) -> Result<Vec<NodeIdentity>> {
        let response = self.request("/api/v1/nodes").send().await.map_err(|e| {
            AppError::KubernetesError(format!("failed to list nodes: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(AppError::KubernetesError(format!(
                "node list returned {}",
                response.status()
            )));
        }

        let list: NodeList = response.json().await.map_err(|e| {
            AppError::KubernetesError(format!("failed to decode node list: {}", e))
        })?;

        let nodes = list
            .items
            .into_iter()
            .map(|item| {
                let ip = item
                    .status
                    .addresses
                    .iter()
                    .find(|a| a.kind == "InternalIP")
                    .map(|a| a.address.clone())
                    .unwrap_or_default();
                NodeIdentity::new(&item.metadata.name, &ip, NodeRole::Unknown)
            })
            .collect();
        Ok(nodes)
    }

    async fn check_api_health(&self) -> Result<bool> {
        let response = self.request("/healthz").send().await.map_err(|e| {
            AppError::KubernetesError(format!("healthz probe failed: {}", e))
        })?;

        debug!(status = %response.status(), "healthz probe");
        Ok(response.status().is_success())
    }
}
