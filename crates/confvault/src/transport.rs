//! Raw HTTP transport
//!
//! The only place that talks to the network. Everything above it works in terms of
//! [`Request`] and [`Response`], which keeps the protocol logic testable against an
//! in-process backend.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{Certificate, Identity};
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Result, StoreError};
use crate::path::WirePath;

/// Header carrying the auth token on every request
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// API version segment prepended to every wire path
const API_ROOT: &str = "v1";

/// Operation kind of a raw request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    /// Directory listing, sent as `GET ?list=true`
    List,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::List => "LIST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A raw request against a wire path
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: WirePath,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: WirePath) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A raw response: status plus undecoded body
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues raw requests against the secret store.
///
/// Implementations only fail for requests that produced no response at all. Any HTTP
/// status, including 4xx and 5xx, comes back as a [`Response`].
pub trait Transport: Send + Sync {
    fn execute(&self, request: &Request) -> Result<Response>;
}

/// Blocking HTTP transport over `reqwest`
pub struct HttpTransport {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpTransport {
    /// Build the transport from a client configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let address = config
            .address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| StoreError::BadInput("No secret store address configured".to_string()))?;

        let base = Url::parse(address)
            .map_err(|e| StoreError::BadInput(format!("Invalid address {}: {}", address, e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::BadInput(format!("Invalid address: {}", address)));
        }

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));

        if let Some(ca_cert) = &config.ca_cert {
            let pem = read_pem(ca_cert)?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                StoreError::BadInput(format!("Invalid CA certificate {:?}: {}", ca_cert, e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        match (&config.client_cert, &config.client_key) {
            (Some(cert), Some(key)) => {
                let mut pem = read_pem(cert)?;
                pem.push(b'\n');
                pem.extend(read_pem(key)?);
                let identity = Identity::from_pem(&pem).map_err(|e| {
                    StoreError::BadInput(format!("Invalid client certificate {:?}: {}", cert, e))
                })?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(StoreError::BadInput(
                    "Client certificate and key must be configured together".to_string(),
                ))
            }
        }

        let client = builder
            .build()
            .map_err(|e| StoreError::BadInput(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            token: config.token.clone(),
        })
    }

    /// Full URL for a wire path
    fn url(&self, request: &Request) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StoreError::BadInput(format!("Invalid address: {}", self.base))
            })?;
            segments.pop_if_empty().push(API_ROOT);
            segments.extend(request.path.as_str().split('/').filter(|s| !s.is_empty()));
        }

        if request.method == Method::List {
            url.query_pairs_mut().append_pair("list", "true");
        }
        for (key, value) in &request.query {
            url.query_pairs_mut().append_pair(key, value);
        }

        Ok(url)
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &Request) -> Result<Response> {
        let url = self.url(request)?;
        let path = request.path.as_str();

        let mut builder = match request.method {
            Method::Get | Method::List => self.client.get(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };

        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .map_err(|e| StoreError::transport(path, e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| StoreError::transport(path, Some(status), e.to_string()))?;

        Ok(Response { status, body })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .map_err(|e| StoreError::BadInput(format!("Failed to read {:?}: {}", path, e)))
}
