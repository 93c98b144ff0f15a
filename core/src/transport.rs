use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::header::IF_MATCH;
use reqwest::header::RETRY_AFTER;
use thiserror::Error;
use tracing::debug;
use trolley_protocol::Cart;
use trolley_protocol::ValidationErrors;
use uuid::Uuid;

/// Idempotency token header, stable across every retry of one logical
/// mutation.
pub const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Patch,
    Delete,
}

/// One outbound request as the retry engine sees it.
///
/// The precondition is re-stamped from the store before every attempt; the
/// idempotency key is stamped exactly once per logical mutation and never
/// changes afterwards. `replayable` marks bodies that are safe to send again
/// verbatim (everything here is a buffered JSON body; a streaming upload
/// would not be).
#[derive(Debug, Clone)]
pub struct CartRequest {
    pub method: RequestMethod,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub precondition: Option<u64>,
    pub idempotency_key: Option<Uuid>,
    pub replayable: bool,
}

impl CartRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: RequestMethod::Get,
            path: path.into(),
            body: None,
            precondition: None,
            idempotency_key: None,
            replayable: true,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: RequestMethod::Post,
            path: path.into(),
            body: Some(body),
            precondition: None,
            idempotency_key: None,
            replayable: true,
        }
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: RequestMethod::Patch,
            path: path.into(),
            body: Some(body),
            precondition: None,
            idempotency_key: None,
            replayable: true,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: RequestMethod::Delete,
            path: path.into(),
            body: None,
            precondition: None,
            idempotency_key: None,
            replayable: true,
        }
    }

    pub fn with_idempotency_key(mut self, key: Uuid) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn with_precondition(mut self, version: Option<u64>) -> Self {
        self.precondition = version;
        self
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self.method, RequestMethod::Get)
    }
}

/// Raw transport outcome, before the single classification point in the
/// retry engine turns it into a policy decision. `Clone` so a shared
/// in-flight read can hand the same failure to every coalesced caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("server answered {status}")]
    Status {
        status: u16,
        validation: Option<ValidationErrors>,
        retry_after_secs: Option<u64>,
    },
    #[error("network failure: {0}")]
    Network(String),
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            validation: None,
            retry_after_secs: None,
        }
    }
}

/// Transport seam. Production uses [`HttpTransport`]; tests script an
/// in-memory implementation.
#[async_trait]
pub trait CartTransport: Send + Sync {
    async fn execute(&self, request: CartRequest) -> Result<Cart, TransportError>;
}

/// reqwest-backed transport. Owns nothing beyond the HTTP client; versioning,
/// retries and idempotency live above this layer, which only stamps the
/// headers it is handed.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn headers(request: &CartRequest) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(version) = request.precondition {
            let value = HeaderValue::from_str(&version.to_string())
                .map_err(|err| TransportError::Decode(err.to_string()))?;
            headers.insert(IF_MATCH, value);
        }
        if let Some(key) = request.idempotency_key {
            let value = HeaderValue::from_str(&key.to_string())
                .map_err(|err| TransportError::Decode(err.to_string()))?;
            headers.insert(IDEMPOTENCY_KEY, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl CartTransport for HttpTransport {
    async fn execute(&self, request: CartRequest) -> Result<Cart, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            RequestMethod::Get => self.client.get(&url),
            RequestMethod::Post => self.client.post(&url),
            RequestMethod::Patch => self.client.patch(&url),
            RequestMethod::Delete => self.client.delete(&url),
        };
        builder = builder.headers(Self::headers(&request)?);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Cart>()
                .await
                .map_err(|err| TransportError::Decode(err.to_string()));
        }
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let validation = if status.as_u16() == 422 {
            response.json::<ValidationErrors>().await.ok()
        } else {
            None
        };
        debug!(status = status.as_u16(), path = %request.path, "cart request failed");
        Err(TransportError::Status {
            status: status.as_u16(),
            validation,
            retry_after_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builders_leave_version_and_key_unset() {
        let request = CartRequest::post("/api/cart/items", serde_json::json!({"quantity": 1}));
        assert_eq!(request.precondition, None);
        assert_eq!(request.idempotency_key, None);
        assert!(request.replayable);
        assert!(request.is_mutation());
    }

    #[test]
    fn get_is_not_a_mutation() {
        assert!(!CartRequest::get("/api/cart").is_mutation());
    }

    #[test]
    fn precondition_can_be_restamped() {
        let request = CartRequest::delete("/api/cart/items/line-1")
            .with_precondition(Some(4))
            .with_precondition(Some(7));
        assert_eq!(request.precondition, Some(7));
    }

    #[test]
    fn header_map_carries_version_and_key() {
        let key = Uuid::new_v4();
        let request = CartRequest::patch("/api/cart/items/line-1", serde_json::json!({}))
            .with_precondition(Some(12))
            .with_idempotency_key(key);
        let headers = HttpTransport::headers(&request).expect("headers");
        assert_eq!(headers.get(IF_MATCH).and_then(|v| v.to_str().ok()), Some("12"));
        assert_eq!(
            headers.get(IDEMPOTENCY_KEY).and_then(|v| v.to_str().ok()),
            Some(key.to_string().as_str())
        );
    }
}
