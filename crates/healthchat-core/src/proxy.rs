//! Upstream forwarding engine behind the `/api/proxy/{*path}` route.
//!
//! Stateless: one inbound request becomes exactly one upstream request. No
//! retries, no timeout override, no streaming.

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;

use crate::error::{HealthchatError, Result};

/// Local route prefix the proxy is mounted under.
pub const PROXY_PREFIX: &str = "/api/proxy/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl ProxyMethod {
    pub fn from_method(method: &Method) -> Option<Self> {
        [Self::Get, Self::Post, Self::Patch, Self::Delete]
            .into_iter()
            .find(|m| m.as_method() == *method)
    }

    pub fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    /// Fixed message returned with a local 500 when forwarding fails.
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Get => "Failed to fetch data",
            Self::Post => "Failed to post data",
            Self::Patch => "Failed to update data",
            Self::Delete => "Failed to delete data",
        }
    }

    /// Whether the inbound body is forwarded upstream.
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Patch)
    }
}

impl std::fmt::Display for ProxyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

/// What the proxy hands back to the caller: a status and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Parse a JSON body, substituting `{}` for empty or invalid input.
pub fn tolerant_json(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return empty_object();
    }
    serde_json::from_slice(bytes).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "body is not valid JSON, using empty object");
        empty_object()
    })
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    base_url: Url,
}

impl UpstreamProxy {
    /// `base_url` must be an http(s) URL; a trailing slash is added if missing.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut raw = base_url.to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let parsed = Url::parse(&raw)
            .map_err(|e| HealthchatError::Config(format!("invalid upstream URL '{base_url}': {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(HealthchatError::Config(format!(
                "upstream URL must be http(s), got '{base_url}'"
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Upstream base + path segments + trailing `/`.
    ///
    /// `path` arrives percent-decoded. Empty, `.` and `..` segments are
    /// dropped so the target never leaves the base, and every kept segment is
    /// re-encoded, so a decoded `?`, `#` or `/` stays inside its segment.
    pub fn target_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        // http(s) URLs always have a path, so this never fails.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(
                path.split('/')
                    .filter(|s| !s.is_empty() && *s != "." && *s != ".."),
            );
            segments.push("");
        }
        url
    }

    /// Forward one request upstream and relay the answer.
    ///
    /// Any upstream status counts as success and an empty or unparsable
    /// upstream body becomes `{}`. Only a transport failure (the request never
    /// got an answer) is an error; callers report it as a local 500.
    pub async fn forward(
        &self,
        method: ProxyMethod,
        path: &str,
        authorization: Option<&HeaderValue>,
        body: &[u8],
    ) -> Result<ProxyResponse> {
        let url = self.target_url(path);
        let auth = if authorization.is_some() {
            "present"
        } else {
            "missing"
        };
        tracing::info!(%method, %url, auth, "proxying request");

        let mut request = self
            .client
            .request(method.as_method(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value.clone());
        }
        if method.carries_body() {
            request = request.body(tolerant_json(body).to_string());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(%method, %url, error = %e, "upstream request failed");
            HealthchatError::Http(e)
        })?;

        let status = response.status();
        let body = match response.bytes().await {
            Ok(bytes) => tolerant_json(&bytes),
            Err(e) => {
                tracing::warn!(%method, %url, error = %e, "failed to read upstream body");
                empty_object()
            }
        };
        tracing::info!(%method, %url, status = status.as_u16(), "upstream responded");

        Ok(ProxyResponse { status, body })
    }
}
