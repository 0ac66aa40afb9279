use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::Result;

/// Header carrying the shared aggregator secret.
pub const SECRET_HEADER: &str = "X-Golbat-Secret";

/// One call to the aggregator.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteRequest {
    /// HTTP method.
    pub method: Method,
    /// Path below the endpoint, starting with `/`.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl RemoteRequest {
    /// `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    /// `POST` request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// HTTP client for the remote aggregator.
#[derive(Clone, Debug)]
pub struct RemoteClient {
    http: Client,
    endpoint: String,
    query_debug: bool,
}

impl RemoteClient {
    /// Builds a client with the configured timeout and secret header.
    pub fn new(config: &RemoteConfig, query_debug: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(secret) = &config.secret {
            match HeaderValue::from_str(secret) {
                Ok(value) => {
                    headers.insert(SECRET_HEADER, value);
                }
                Err(_) => warn!("remote secret is not a valid header value; sending none"),
            }
        }
        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            query_debug,
        })
    }

    /// Sends `request` and returns the decoded body. Transport errors,
    /// non-success statuses and undecodable bodies are logged and yield
    /// `Value::Null`.
    pub async fn send(&self, request: &RemoteRequest) -> Value {
        let url = format!("{}{}", self.endpoint, request.path);
        if self.query_debug {
            debug!(method = %request.method, %url, body = ?request.body, "remote query");
        }
        let mut builder = self.http.request(request.method.clone(), &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%url, error = %err, "remote request failed");
                return Value::Null;
            }
        };
        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "remote request rejected");
            return Value::Null;
        }
        match response.json::<Value>().await {
            Ok(body) => body,
            Err(err) => {
                warn!(%url, error = %err, "remote response is not JSON");
                Value::Null
            }
        }
    }
}
