//! Thin client for the seller dashboard's API routes. The dashboard itself
//! signs and forwards calls to the marketplace; this side only speaks its
//! JSON envelope (`success`, `data`, `error`, `message`).

use super::types::{Artifact, ClientError, ItemRejection};
use crate::config::Config;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub failed_items: Vec<FailedModel>,
}

impl ApiEnvelope {
    /// Routes that forward a marketplace payload verbatim omit `success`;
    /// those count as successful unless they carry an `error`.
    pub fn is_success(&self) -> bool {
        self.success
            .unwrap_or_else(|| self.error.as_ref().is_none_or(Value::is_null))
    }

    pub fn reason(&self) -> String {
        if let Some(m) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return m.to_string();
        }
        match &self.error {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Null) | None => "request refused".to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Item-level rejections, wherever the route put them.
    pub fn failed_models(&self) -> Vec<FailedModel> {
        let mut out = self.failed_items.clone();
        if let Some(list) = self.data.get("failed_items") {
            if let Ok(more) = serde_json::from_value::<Vec<FailedModel>>(list.clone()) {
                out.extend(more);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedModel {
    pub item_id: u64,
    #[serde(default)]
    pub model_id: u64,
    #[serde(default, alias = "fail_message", alias = "message")]
    pub err_msg: Option<String>,
    #[serde(default, alias = "fail_reason")]
    pub err_code: Option<Value>,
}

impl FailedModel {
    pub fn key(&self) -> String {
        model_key(self.item_id, self.model_id)
    }

    pub fn into_rejection(self) -> ItemRejection {
        let reason = match (&self.err_msg, &self.err_code) {
            (Some(m), _) if !m.is_empty() => m.clone(),
            (_, Some(code)) => format!("rejected ({code})"),
            _ => "rejected by marketplace".to_string(),
        };
        ItemRejection::new(self.key(), reason)
    }
}

/// Identifier of a flash-sale model within a flash sale.
pub fn model_key(item_id: u64, model_id: u64) -> String {
    format!("{item_id}-{model_id}")
}

/// Either a refusal reason or the parsed envelope of a successful call.
pub enum Reply {
    Refused(String),
    Accepted(ApiEnvelope),
}

#[derive(Clone)]
pub struct DashboardApi {
    http: reqwest::Client,
    base_url: String,
}

impl DashboardApi {
    pub fn new(cfg: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.api.user_agent.clone())
            .build()?;
        Ok(Self::with_client(http, &cfg.api.base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    pub async fn health(&self) -> Result<Value, ClientError> {
        let resp = self.request(Method::GET, "/api/health").send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Send a request whose answer is the JSON envelope. Non-2xx answers and
    /// `success: false` both come back as [`Reply::Refused`]; transport and
    /// decoding problems are errors.
    pub async fn call(&self, req: RequestBuilder) -> Result<Reply, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!("dashboard reply status={} bytes={}", status, bytes.len());

        let env = match parse_envelope(status, &bytes) {
            Ok(env) => env,
            Err(err) if status.is_success() => return Err(err),
            Err(_) => {
                return Ok(Reply::Refused(status_reason(status, &bytes)));
            }
        };

        if !status.is_success() || !env.is_success() {
            return Ok(Reply::Refused(env.reason()));
        }
        Ok(Reply::Accepted(env))
    }

    /// Fetch a binary document. JSON answers are refusals.
    pub async fn download(&self, req: RequestBuilder) -> Result<Result<Artifact, String>, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = resp.bytes().await?;

        if status.is_success() && !content_type.contains("json") && !bytes.is_empty() {
            return Ok(Ok(Artifact {
                content_type,
                bytes: bytes.to_vec(),
            }));
        }

        let reason = match parse_envelope(status, &bytes) {
            Ok(env) => env.reason(),
            Err(_) => status_reason(status, &bytes),
        };
        Ok(Err(reason))
    }
}

fn parse_envelope(status: StatusCode, bytes: &[u8]) -> Result<ApiEnvelope, ClientError> {
    if bytes.is_empty() {
        return Ok(ApiEnvelope::default());
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ClientError::Decode(format!("status {}: {}", status.as_u16(), e)))
}

fn status_reason(status: StatusCode, bytes: &[u8]) -> String {
    let body = String::from_utf8_lossy(bytes);
    let body = body.trim();
    if body.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        let short: String = body.chars().take(200).collect();
        format!("status {}: {}", status.as_u16(), short)
    }
}
