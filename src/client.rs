use anyhow::{Context, Result};
use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

use crate::builder::PreparedRequest;
use crate::catalog::HttpMethod;
use crate::error::ConsoleError;

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a fully prepared request and hands back the undecoded response.
pub trait Transport {
    fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, ConsoleError>;
}

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout_secs: Option<u64>) -> Result<Self> {
        let mut builder = Client::builder().user_agent("api-console/0.1.0");
        if let Some(seconds) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let client = builder.build().context("build http client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpClient {
    fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, ConsoleError> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        };

        let mut req = self.client.request(method, &request.url);
        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        log::debug!("request {} {}", request.method, request.url);
        let resp = req
            .send()
            .map_err(|err| ConsoleError::Transport(err.to_string()))?;
        let status = resp.status();
        log::debug!("response {} for {}", status, request.url);

        let body = resp
            .text()
            .map_err(|err| ConsoleError::Transport(err.to_string()))?;

        Ok(RawResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

/// Maps a raw response onto a JSON value or one of the surfaced error kinds.
///
/// Non-2xx bodies carrying a string `detail` yield that text verbatim.
pub fn decode_response(resp: &RawResponse) -> Result<Value, ConsoleError> {
    if !resp.is_success() {
        let detail = serde_json::from_str::<Value>(&resp.body)
            .ok()
            .and_then(|body| {
                body.get("detail")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
        return Err(match detail {
            Some(message) => ConsoleError::Api {
                status: resp.status,
                message,
            },
            None => ConsoleError::api_fallback(resp.status, &resp.status_text),
        });
    }

    if resp.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&resp.body).map_err(|err| {
        log::debug!("undecodable response body: {err}");
        ConsoleError::Decode
    })
}
