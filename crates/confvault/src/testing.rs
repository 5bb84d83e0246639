//! In-process secret store for tests
//!
//! Speaks the same wire protocol as the real backend: mount introspection, v1 flat
//! storage, v2 versioned storage with soft deletes and check-and-set, listings, and
//! the 404 shapes each of those produce.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use crate::error::{Result, StoreError};
use crate::mount::{KvVersion, MOUNT_PROBE_ROUTE};
use crate::observer::{ClientEvent, Observer};
use crate::transport::{Method, Request, Response, Transport};

const CREATED: &str = "2024-01-01T00:00:00Z";
const DELETED: &str = "2024-01-02T00:00:00Z";

#[derive(Debug, Clone)]
struct Version {
    data: Map<String, Value>,
    deleted: bool,
}

#[derive(Default)]
struct State {
    v1: BTreeMap<String, Map<String, Value>>,
    v2: BTreeMap<String, Vec<Version>>,
    requests: Vec<Request>,
}

/// Fake backend implementing [`Transport`]
pub struct FakeVault {
    mounts: Vec<(String, KvVersion)>,
    introspection: bool,
    reachable: bool,
    overrides: HashMap<String, (u16, String)>,
    state: Mutex<State>,
}

impl FakeVault {
    pub fn new() -> Self {
        Self {
            mounts: Vec::new(),
            introspection: true,
            reachable: true,
            overrides: HashMap::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Add a mount; `path` ends with a separator like the real backend reports
    pub fn with_mount(mut self, path: &str, version: KvVersion) -> Self {
        let path = format!("{}/", path.trim_end_matches('/'));
        self.mounts.push((path, version));
        // Longest prefix first
        self.mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Behave like a backend that predates mount introspection
    pub fn without_introspection(mut self) -> Self {
        self.introspection = false;
        self
    }

    /// Every request fails before reaching the backend
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Answer any request for `wire_path` with a canned response
    pub fn with_response(mut self, wire_path: &str, status: u16, body: &str) -> Self {
        self.overrides
            .insert(wire_path.to_string(), (status, body.to_string()));
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<Request> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    /// Wire paths of non-probe requests, with their method
    pub fn operations(&self) -> Vec<(Method, String)> {
        self.requests()
            .into_iter()
            .filter(|r| !r.path.as_str().starts_with(MOUNT_PROBE_ROUTE))
            .map(|r| (r.method, r.path.to_string()))
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path.as_str().starts_with(MOUNT_PROBE_ROUTE))
            .count()
    }

    /// Stored versions of a v2 key (mount-relative wire key, e.g. `secret/app`)
    pub fn version_count(&self, mount: &str, key: &str) -> usize {
        let id = format!("{}/{}", mount.trim_end_matches('/'), key);
        self.state
            .lock()
            .map(|s| s.v2.get(&id).map_or(0, Vec::len))
            .unwrap_or_default()
    }

    fn mount_for(&self, path: &str) -> Option<(&str, KvVersion)> {
        self.mounts
            .iter()
            .find(|(mount, _)| format!("{}/", path).starts_with(mount.as_str()))
            .map(|(mount, version)| (mount.as_str(), *version))
    }

    fn handle(&self, state: &mut State, request: &Request) -> (u16, Value) {
        let path = request.path.as_str();

        if let Some(rest) = path.strip_prefix(MOUNT_PROBE_ROUTE) {
            return self.probe(rest.trim_start_matches('/'));
        }

        match self.mount_for(path) {
            None => (404, json!({"errors": ["no handler for route"]})),
            Some((mount, KvVersion::V1)) => handle_v1(state, request, path, mount),
            Some((mount, KvVersion::V2)) => {
                let rest = &path[mount.len().min(path.len())..];
                handle_v2(state, request, mount, rest)
            }
        }
    }

    fn probe(&self, path: &str) -> (u16, Value) {
        if !self.introspection {
            return (404, json!({"errors": []}));
        }

        match self.mount_for(path) {
            Some((mount, version)) => {
                let options = match version {
                    KvVersion::V1 => Value::Null,
                    KvVersion::V2 => json!({"version": "2"}),
                };
                (
                    200,
                    json!({"data": {"path": mount, "type": "kv", "options": options}}),
                )
            }
            None => (
                403,
                json!({"errors": ["preflight capability check returned 403"]}),
            ),
        }
    }
}

impl Default for FakeVault {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for FakeVault {
    fn execute(&self, request: &Request) -> Result<Response> {
        if !self.reachable {
            return Err(StoreError::transport(
                request.path.as_str(),
                None,
                "connection refused",
            ));
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::transport(request.path.as_str(), None, "poisoned"))?;
        state.requests.push(request.clone());

        if let Some((status, body)) = self.overrides.get(request.path.as_str()) {
            return Ok(Response {
                status: *status,
                body: body.clone(),
            });
        }

        let (status, body) = self.handle(&mut state, request);
        let body = if body.is_null() {
            String::new()
        } else {
            body.to_string()
        };
        Ok(Response { status, body })
    }
}

fn handle_v1(state: &mut State, request: &Request, path: &str, mount: &str) -> (u16, Value) {
    match request.method {
        Method::Get => match state.v1.get(path) {
            Some(data) => (200, json!({"data": data, "lease_duration": 2764800})),
            None => (404, json!({"errors": []})),
        },
        Method::List => {
            let keys = children(state.v1.keys().map(String::as_str), path);
            if keys.is_empty() {
                (404, json!({"errors": []}))
            } else {
                (200, json!({"data": {"keys": keys}}))
            }
        }
        Method::Put => match &request.body {
            Some(Value::Object(data)) if format!("{}/", path) != mount => {
                state.v1.insert(path.to_string(), data.clone());
                (204, Value::Null)
            }
            _ => (400, json!({"errors": ["missing data"]})),
        },
        Method::Delete => {
            state.v1.remove(path);
            (204, Value::Null)
        }
    }
}

fn handle_v2(state: &mut State, request: &Request, mount: &str, rest: &str) -> (u16, Value) {
    let (resource, key) = match rest.split_once('/') {
        Some((resource, key)) => (resource, key),
        None => (rest, ""),
    };
    let id = format!("{}{}", mount, key);

    match (request.method, resource) {
        (Method::Get, "data") => {
            let Some(versions) = state.v2.get(&id) else {
                return (404, json!({"errors": []}));
            };
            let wanted = request
                .query
                .iter()
                .find(|(k, _)| k == "version")
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(versions.len());
            let Some(version) = wanted.checked_sub(1).and_then(|i| versions.get(i)) else {
                return (404, json!({"errors": []}));
            };

            if version.deleted {
                (
                    404,
                    json!({"data": {"data": null, "metadata": metadata(wanted, true)}}),
                )
            } else {
                (
                    200,
                    json!({"data": {"data": version.data, "metadata": metadata(wanted, false)}}),
                )
            }
        }
        (Method::Put, "data") => {
            let Some(Value::Object(body)) = &request.body else {
                return (400, json!({"errors": ["no data provided"]}));
            };
            let Some(Value::Object(data)) = body.get("data") else {
                return (400, json!({"errors": ["no data provided"]}));
            };

            let current = state.v2.get(&id).map_or(0, Vec::len);
            if let Some(cas) = body
                .get("options")
                .and_then(|o| o.get("cas"))
                .and_then(Value::as_u64)
            {
                if cas as usize != current {
                    return (
                        400,
                        json!({"errors": ["check-and-set parameter did not match the current version"]}),
                    );
                }
            }

            let versions = state.v2.entry(id).or_default();
            versions.push(Version {
                data: data.clone(),
                deleted: false,
            });
            (200, json!({"data": metadata(versions.len(), false)}))
        }
        (Method::Delete, "data") => {
            if let Some(latest) = state.v2.get_mut(&id).and_then(|v| v.last_mut()) {
                latest.deleted = true;
            }
            (204, Value::Null)
        }
        (Method::List, "metadata") => {
            let dir = id.trim_end_matches('/').to_string();
            let keys = children(state.v2.keys().map(String::as_str), &dir);
            if keys.is_empty() {
                (404, json!({"errors": []}))
            } else {
                (200, json!({"data": {"keys": keys}}))
            }
        }
        (Method::Delete, "metadata") => {
            state.v2.remove(&id);
            (204, Value::Null)
        }
        _ => (
            405,
            json!({"errors": [format!("unsupported path {}{}", mount, rest)]}),
        ),
    }
}

fn metadata(version: usize, deleted: bool) -> Value {
    let deletion_time = if deleted { DELETED } else { "" };
    json!({
        "version": version,
        "created_time": CREATED,
        "deletion_time": deletion_time,
        "destroyed": false,
        "custom_metadata": null,
    })
}

/// Immediate children of `dir` among `keys`; subdirectories end with a separator
fn children<'a>(keys: impl Iterator<Item = &'a str>, dir: &str) -> Vec<String> {
    let prefix = format!("{}/", dir);
    keys.filter_map(|key| key.strip_prefix(prefix.as_str()))
        .map(|rest| match rest.split_once('/') {
            Some((child, _)) => format!("{}/", child),
            None => rest.to_string(),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Observer that keeps a line per event
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &ClientEvent<'_>) {
        let line = match event {
            ClientEvent::MountResolved {
                path,
                mount,
                cached,
            } => format!(
                "mount {} -> {} v{}{}",
                path,
                mount.path,
                mount.version,
                if *cached { " (cached)" } else { "" }
            ),
            ClientEvent::MountFallback { path, mount } => {
                format!("fallback {} -> '{}' v{}", path, mount.path, mount.version)
            }
            ClientEvent::Request { method, path } => format!("{} {}", method, path),
            ClientEvent::Response {
                method,
                path,
                status,
            } => format!("{} {} -> {}", method, path, status),
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(line);
        }
    }
}
