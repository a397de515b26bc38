//! Transport and reachability collaborators
//!
//! The sync client talks to the server only through these two traits, so
//! tests and embedders can swap the network out.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use shared::sync::{SyncBatchRequest, SyncBatchResponse};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::ClientConfig;
use crate::draft::RemoteOrder;
use crate::error::{ClientError, ClientResult};

/// Header naming the operator in the server's sync audit
pub const OPERATOR_HEADER: &str = "X-Operator-Id";

/// Sends batches and fetches authoritative orders
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Submit one batch; the whole call either yields a structurally valid
    /// response or fails
    async fn push_batch(&self, request: &SyncBatchRequest) -> ClientResult<SyncBatchResponse>;

    /// Fetch an order (by remote or local id) for editing
    async fn fetch_order(&self, id: &str) -> ClientResult<RemoteOrder>;
}

/// Answers "is the server reachable right now?"
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Error body returned by the server
#[derive(serde::Deserialize)]
struct ApiErrorResponse {
    code: u16,
    message: String,
}

/// Success envelope of the read endpoints
#[derive(serde::Deserialize)]
struct ApiEnvelope<T> {
    data: Option<T>,
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
    operator: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.normalized_base_url().to_string(),
            token: config.token.clone(),
            operator: config.operator.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(auth) = self.auth_header() {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        if let Some(operator) = &self.operator {
            req = req.header(OPERATOR_HEADER, operator);
        }
        req
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ClientResult<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            if let Ok(api_err) = serde_json::from_str::<ApiErrorResponse>(&text) {
                return Err(ClientError::Api {
                    code: api_err.code,
                    message: api_err.message,
                });
            }
            return Err(match status {
                StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                    ClientError::NetworkUnavailable
                }
                _ => ClientError::InvalidResponse(format!("HTTP {status}: {text}")),
            });
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::InvalidResponse(format!("Malformed body: {e}")))
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn push_batch(&self, request: &SyncBatchRequest) -> ClientResult<SyncBatchResponse> {
        let response = self
            .request(reqwest::Method::POST, "/api/sync/batch")
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn fetch_order(&self, id: &str) -> ClientResult<RemoteOrder> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/orders/{id}"))
            .send()
            .await?;
        let envelope: ApiEnvelope<RemoteOrder> = self.handle_response(response).await?;
        envelope
            .data
            .ok_or_else(|| ClientError::InvalidResponse("Order response without data".into()))
    }
}

/// Probes `GET /health` with a short timeout
#[derive(Debug, Clone)]
pub struct HttpReachability {
    client: Client,
    url: String,
}

impl HttpReachability {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(config.probe_duration())
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/health", config.normalized_base_url()),
        })
    }
}

#[async_trait]
impl Reachability for HttpReachability {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %self.url, "Reachability probe failed: {e}");
                false
            }
        }
    }
}

/// Fixed answer, switchable at runtime
#[derive(Debug)]
pub struct StaticReachability {
    reachable: AtomicBool,
}

impl StaticReachability {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Reachability for StaticReachability {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
