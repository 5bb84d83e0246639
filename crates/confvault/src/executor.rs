//! Request executor
//!
//! Turns raw responses into secrets or typed errors. The interesting case is 404:
//! the backend answers 404 both for "nothing here" (empty body or `{"errors":[]}`)
//! and for soft-deleted v2 versions, where the body still carries warnings or
//! version metadata worth handing back.

use serde::Deserialize;
use serde_json::Value;

use crate::codec::{Envelope, Secret};
use crate::error::{Result, StoreError};
use crate::observer::{ClientEvent, Observer};
use crate::path::WirePath;
use crate::transport::{Method, Request, Response, Transport};

const NOT_FOUND: u16 = 404;

/// Error body returned by the backend
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Executes raw operations for one client call
pub struct RequestExecutor<'a> {
    transport: &'a dyn Transport,
    observer: &'a dyn Observer,
}

impl<'a> RequestExecutor<'a> {
    pub fn new(transport: &'a dyn Transport, observer: &'a dyn Observer) -> Self {
        Self {
            transport,
            observer,
        }
    }

    /// Read a secret
    pub fn read(&self, path: &WirePath, query: &[(&str, String)]) -> Result<Secret> {
        let mut request = Request::new(Method::Get, path.clone());
        for (key, value) in query {
            request = request.with_query(key, value);
        }
        self.read_request(&request)
    }

    /// Write an envelope, returning the response secret when the backend sent one
    pub fn write(&self, path: &WirePath, envelope: Envelope) -> Result<Option<Secret>> {
        let request = Request::new(Method::Put, path.clone()).with_body(envelope.into_body());
        let response = self.send(&request)?;

        if !response.is_success() {
            return Err(failure(path, &response));
        }
        // The write is applied; a body that does not parse carries nothing to return
        Ok(serde_json::from_str(&response.body).ok())
    }

    /// Delete a path; an absent path is not an error
    pub fn delete(&self, path: &WirePath) -> Result<()> {
        let response = self.send(&Request::new(Method::Delete, path.clone()))?;

        if response.is_success() || response.status == NOT_FOUND {
            Ok(())
        } else {
            Err(failure(path, &response))
        }
    }

    /// Raw listing response; a nonexistent directory is an empty listing
    pub fn list_secret(&self, path: &WirePath) -> Result<Secret> {
        match self.read_request(&Request::new(Method::List, path.clone())) {
            Ok(secret) => Ok(secret),
            Err(StoreError::NotFound(_)) => Ok(Secret::listing(Vec::new())),
            Err(e) => Err(e),
        }
    }

    /// Entry names of a directory, in the order the backend returned them
    pub fn list(&self, path: &WirePath) -> Result<Vec<String>> {
        let secret = self.list_secret(path)?;

        match secret.keys() {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(keys)) => keys
                .iter()
                .map(|key| match key {
                    Value::String(name) => Ok(name.clone()),
                    other => Err(StoreError::decode(
                        path.as_str(),
                        format!("listing entry is not a string: {}", other),
                    )),
                })
                .collect(),
            Some(other) => Err(StoreError::decode(
                path.as_str(),
                format!("listing keys is not an array: {}", other),
            )),
        }
    }

    fn read_request(&self, request: &Request) -> Result<Secret> {
        let path = &request.path;
        let response = self.send(request)?;

        if response.is_success() {
            if response.body.trim().is_empty() {
                return Err(StoreError::NotFound(path.to_string()));
            }
            return parse_secret(path, &response.body);
        }

        if response.status == NOT_FOUND {
            return match serde_json::from_str::<Secret>(&response.body) {
                Ok(secret) if secret.has_content() => Ok(secret),
                _ => Err(StoreError::NotFound(path.to_string())),
            };
        }

        Err(failure(path, &response))
    }

    fn send(&self, request: &Request) -> Result<Response> {
        let path = request.path.as_str();
        self.observer.on_event(&ClientEvent::Request {
            method: request.method,
            path,
        });

        let response = self.transport.execute(request)?;

        self.observer.on_event(&ClientEvent::Response {
            method: request.method,
            path,
            status: response.status,
        });
        Ok(response)
    }
}

fn parse_secret(path: &WirePath, body: &str) -> Result<Secret> {
    serde_json::from_str(body)
        .map_err(|e| StoreError::decode(path.as_str(), format!("invalid response body: {}", e)))
}

/// Transport error for a non-success response, using the backend's messages when present
fn failure(path: &WirePath, response: &Response) -> StoreError {
    let errors = serde_json::from_str::<ErrorBody>(&response.body)
        .map(|b| b.errors)
        .unwrap_or_default();

    let message = if !errors.is_empty() {
        errors.join("; ")
    } else if !response.body.trim().is_empty() {
        response.body.trim().to_string()
    } else {
        format!("HTTP status {}", response.status)
    };

    StoreError::transport(path.as_str(), Some(response.status), message)
}
