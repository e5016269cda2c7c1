//! HTTP Execution Backend
//!
//! REST adapter for the wallet execution service. Routes are grouped by
//! chain family (`/solana/...`, `/evm/...`) and every response uses the
//! `{status, data?, message?}` envelope.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    ExecutionBackend, RecentOperation, RemoteEnvelope, StatusResponse, StatusTarget, SubmitKind,
    SubmitRequest, extract_reference,
};
use crate::config::BackendConfig;
use crate::execution::error::TransportError;
use crate::execution::types::EngineContext;

/// Execution backend reached over HTTP(S)
pub struct HttpBackend {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend client from config
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        info!(
            base_url = %config.base_url,
            timeout_ms = config.request_timeout_ms,
            "Initializing HTTP execution backend"
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TransportError::Connect(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::Connect(format!("Invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Connect(format!(
                "Invalid base URL: {}",
                config.base_url
            )));
        }

        Ok(Self { base_url, client })
    }

    /// `{base}/{chain}/wallets/{wallet_id}/{segments..}/`, each segment
    /// percent-encoded on its own.
    fn wallet_url(&self, ctx: &EngineContext, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Connect(format!("Invalid base URL: {}", self.base_url)))?
            .pop_if_empty()
            .push(ctx.chain.path_segment())
            .push("wallets")
            .push(&ctx.wallet_id)
            .extend(segments)
            .push("");
        Ok(url)
    }

    /// Send a request and decode the envelope.
    ///
    /// 4xx bodies that parse as an envelope are returned as responses (the
    /// backend uses them for business-rule rejections). 5xx and anything
    /// unparseable are transport errors: the request may have executed.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<RemoteEnvelope, TransportError> {
        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        if status.is_server_error() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        match serde_json::from_str::<RemoteEnvelope>(&body) {
            Ok(envelope) if status.is_success() || envelope.is_error() => Ok(envelope),
            Ok(_) => Err(TransportError::Http {
                status: status.as_u16(),
                body: truncate(&body),
            }),
            Err(e) if status == StatusCode::OK => Err(TransportError::Decode(e.to_string())),
            Err(_) => Err(TransportError::Http {
                status: status.as_u16(),
                body: truncate(&body),
            }),
        }
    }
}

#[async_trait]
impl ExecutionBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn submit(
        &self,
        ctx: &EngineContext,
        request: &SubmitRequest,
    ) -> Result<RemoteEnvelope, TransportError> {
        let url = match request.kind {
            SubmitKind::Transfer => self.wallet_url(ctx, &["send"])?,
            SubmitKind::Swap => self.wallet_url(ctx, &["swap", "execute"])?,
        };
        debug!(url = %url, key = %request.idempotency_key, "POST submission");

        self.send(
            self.client
                .post(url)
                .header("Idempotency-Key", &request.idempotency_key)
                .json(request),
        )
        .await
    }

    async fn status(
        &self,
        ctx: &EngineContext,
        target: &StatusTarget,
    ) -> Result<StatusResponse, TransportError> {
        let request = match target {
            StatusTarget::Reference(reference) => self
                .client
                .get(self.wallet_url(ctx, &["transactions", reference, "status"])?)
                .query(&[("device_id", ctx.device_id.as_str())]),
            StatusTarget::Account(key) => {
                let key = key.to_string();
                self.client
                    .get(self.wallet_url(ctx, &["transactions", "status"])?)
                    .query(&[
                        ("device_id", ctx.device_id.as_str()),
                        ("idempotency_key", key.as_str()),
                    ])
            }
        };

        let envelope = self.send(request).await?;
        Ok(status_from_envelope(envelope))
    }

    async fn recent_operations(
        &self,
        ctx: &EngineContext,
        limit: usize,
    ) -> Result<Vec<RecentOperation>, TransportError> {
        let page_size = limit.to_string();
        let envelope = self
            .send(
                self.client
                    .get(self.wallet_url(ctx, &["token-transfers"])?)
                    .query(&[
                        ("device_id", ctx.device_id.as_str()),
                        ("page", "1"),
                        ("page_size", page_size.as_str()),
                    ]),
            )
            .await?;

        if !envelope.is_success() {
            warn!(
                message = envelope.message.as_deref().unwrap_or_default(),
                "Recent operations query refused"
            );
            return Ok(Vec::new());
        }
        Ok(envelope
            .data
            .as_ref()
            .map(recent_from_data)
            .unwrap_or_default())
    }
}

/// Interpret a status envelope.
///
/// The operation status lives in `data.status`. An envelope-level error
/// without it means the *query* failed (e.g. not indexed yet), which says
/// nothing about the operation, so the status is left unknown.
fn status_from_envelope(envelope: RemoteEnvelope) -> StatusResponse {
    let data = envelope.data.as_ref();
    let status = data
        .and_then(|d| d.get("status"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = data
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(envelope.message.clone());
    let reference = data.and_then(extract_reference);

    StatusResponse {
        status,
        message,
        reference,
    }
}

/// Accepts either a bare array or a paginated `{results: [...]}` object
fn recent_from_data(data: &Value) -> Vec<RecentOperation> {
    let items = data
        .as_array()
        .or_else(|| data.get("results").and_then(Value::as_array))
        .or_else(|| data.get("items").and_then(Value::as_array));

    items
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let reference = extract_reference(item)?;
                    Some(RecentOperation {
                        reference,
                        idempotency_key: item
                            .get("idempotency_key")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_decode() {
        TransportError::Decode(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
