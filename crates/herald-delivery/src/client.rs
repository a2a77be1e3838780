//! HTTP client shared by channel adapters and the webhook dispatcher.
//!
//! Handles request construction, response capture, and error
//! categorization. Non-success statuses are returned to the caller as
//! data rather than errors; each dispatch path decides what a given
//! status means for its own retry accounting.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};

/// Configuration for the outbound HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout applied to every request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Herald-Delivery/1.0".to_string(),
            max_redirects: 3,
            verify_tls: true,
        }
    }
}

/// Body variants the dispatch paths need.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// JSON-encoded body.
    Json(serde_json::Value),
    /// URL-encoded form body.
    Form(Vec<(String, String)>),
    /// Pre-serialized bytes with an explicit content type.
    Raw {
        /// Content type header value.
        content_type: String,
        /// Body bytes, sent verbatim.
        bytes: Bytes,
    },
}

/// An outbound POST request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Destination URL.
    pub url: String,
    /// Extra headers to attach.
    pub headers: Vec<(String, String)>,
    /// Basic-auth credentials, if the receiver requires them.
    pub basic_auth: Option<(String, String)>,
    /// Request body.
    pub body: RequestBody,
}

impl HttpRequest {
    /// Creates a request with no extra headers or credentials.
    pub fn new(url: impl Into<String>, body: RequestBody) -> Self {
        Self { url: url.into(), headers: Vec::new(), basic_auth: None, body }
    }
}

/// Captured response from a delivery attempt.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated to a bounded size.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the status was 2xx.
    pub is_success: bool,
}

/// Pooled HTTP client used for all outbound delivery.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DispatchError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Sends a POST request and captures the response.
    ///
    /// Network failures and timeouts become errors; any HTTP status,
    /// success or not, comes back as an [`HttpResponse`].
    pub async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let start_time = std::time::Instant::now();

        let mut http_request = self.client.post(&request.url);
        http_request = match request.body {
            RequestBody::Json(value) => http_request.json(&value),
            RequestBody::Form(pairs) => http_request.form(&pairs),
            RequestBody::Raw { content_type, bytes } => {
                http_request.header("content-type", content_type).body(bytes)
            },
        };
        for (key, value) in &request.headers {
            http_request = http_request.header(key, value);
        }
        if let Some((user, password)) = request.basic_auth {
            http_request = http_request.basic_auth(user, Some(password));
        }

        let response = match http_request.send().await {
            Ok(response) => response,
            Err(e) => {
                let duration = start_time.elapsed();
                warn!(url = %request.url, duration_ms = duration.as_millis(), "request failed: {e}");

                if e.is_timeout() {
                    return Err(DispatchError::timeout(self.config.timeout.as_secs()));
                }
                if e.is_connect() {
                    return Err(DispatchError::network(format!("connection failed: {e}")));
                }
                return Err(DispatchError::network(e.to_string()));
            },
        };

        let duration = start_time.elapsed();
        let status_code = response.status().as_u16();
        let is_success = response.status().is_success();
        debug!(
            url = %request.url,
            status = status_code,
            duration_ms = duration.as_millis(),
            "received response"
        );

        let body = match response.bytes().await {
            Ok(bytes) => truncate_body(&bytes),
            Err(e) => format!("[failed to read response body: {e}]"),
        };

        Ok(HttpResponse { status_code, body, duration, is_success })
    }
}

// Bound kept small so attempt records stay cheap to store and log.
const MAX_BODY_CAPTURE: usize = 1024;

fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() > MAX_BODY_CAPTURE {
        let suffix = "... (truncated)";
        let truncated = String::from_utf8_lossy(&bytes[..MAX_BODY_CAPTURE - suffix.len()]);
        format!("{truncated}{suffix}")
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}
