//! Mount and engine version detection
//!
//! Before every operation the backend is asked which mount owns the path and which
//! KV engine version that mount runs. Backends that predate the introspection route
//! answer 404, which is taken to mean a plain v1 store with no mount prefix.
//!
//! Results are not cached unless the client was built with `cache_mount_info`. Mounts
//! can be remounted or upgraded between two invocations, and a stale answer writes v1
//! payloads into a v2 engine (or the reverse).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::error::{Result, StoreError};
use crate::executor::RequestExecutor;
use crate::observer::{ClientEvent, Observer};
use crate::path::{LogicalPath, WirePath};

/// Fixed introspection route answering "which mount owns this path"
pub const MOUNT_PROBE_ROUTE: &str = "sys/internal/ui/mounts";

/// KV engine version of a mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum KvVersion {
    /// Flat key-value engine
    V1,
    /// Versioned engine with data/metadata sub-resources
    V2,
}

impl Default for KvVersion {
    fn default() -> Self {
        KvVersion::V1
    }
}

impl TryFrom<u8> for KvVersion {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(KvVersion::V1),
            2 => Ok(KvVersion::V2),
            other => Err(format!("Unsupported KV version: {}", other)),
        }
    }
}

impl From<KvVersion> for u8 {
    fn from(version: KvVersion) -> Self {
        match version {
            KvVersion::V1 => 1,
            KvVersion::V2 => 2,
        }
    }
}

impl FromStr for KvVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().trim_start_matches(['v', 'V']) {
            "1" => Ok(KvVersion::V1),
            "2" => Ok(KvVersion::V2),
            other => Err(format!("Unsupported KV version: {}", other)),
        }
    }
}

impl fmt::Display for KvVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Mount owning a path, and the engine version behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    /// Mount prefix, possibly with a trailing separator; empty for the 404 fallback
    pub path: String,
    pub version: KvVersion,
}

impl MountInfo {
    pub fn is_v2(&self) -> bool {
        self.version == KvVersion::V2
    }
}

/// Resolves [`MountInfo`] for logical paths
pub struct MountResolver {
    forced: Option<KvVersion>,
    fallback: KvVersion,
    cache: Option<RwLock<HashMap<LogicalPath, MountInfo>>>,
}

impl MountResolver {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            forced: config.kv_version,
            fallback: config.fallback_version,
            cache: config
                .cache_mount_info
                .then(|| RwLock::new(HashMap::new())),
        }
    }

    /// Find the mount for `path`, probing the backend unless a cached answer exists
    pub fn resolve(
        &self,
        executor: &RequestExecutor<'_>,
        observer: &dyn Observer,
        path: &LogicalPath,
    ) -> Result<MountInfo> {
        if let Some(mount) = self.cached(path) {
            observer.on_event(&ClientEvent::MountResolved {
                path: path.as_str(),
                mount: &mount,
                cached: true,
            });
            return Ok(mount);
        }

        let probe_path = WirePath::from(format!("{}/{}", MOUNT_PROBE_ROUTE, path).as_str());

        let mount = match executor.read(&probe_path, &[]) {
            Ok(secret) => match secret.data {
                Some(data) => {
                    let mount = self.parse_probe(&probe_path, &data)?;
                    observer.on_event(&ClientEvent::MountResolved {
                        path: path.as_str(),
                        mount: &mount,
                        cached: false,
                    });
                    mount
                }
                None => self.fallback_mount(observer, path),
            },
            Err(StoreError::NotFound(_)) => self.fallback_mount(observer, path),
            Err(e) => return Err(e),
        };

        self.store(path, &mount);
        Ok(mount)
    }

    /// Drop every cached answer
    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            if let Ok(mut entries) = cache.write() {
                entries.clear();
            }
        }
    }

    fn cached(&self, path: &LogicalPath) -> Option<MountInfo> {
        let cache = self.cache.as_ref()?;
        let entries = cache.read().ok()?;
        entries.get(path).cloned()
    }

    fn store(&self, path: &LogicalPath, mount: &MountInfo) {
        if let Some(cache) = &self.cache {
            if let Ok(mut entries) = cache.write() {
                entries.insert(path.clone(), mount.clone());
            }
        }
    }

    fn parse_probe(&self, probe_path: &WirePath, data: &Map<String, Value>) -> Result<MountInfo> {
        let path = match data.get("path") {
            Some(Value::String(path)) => path.clone(),
            None | Some(Value::Null) => String::new(),
            Some(other) => {
                return Err(StoreError::decode(
                    probe_path.as_str(),
                    format!("mount path is not a string: {}", other),
                ))
            }
        };

        let reported = match data.get("options").and_then(|o| o.get("version")) {
            None | Some(Value::Null) => KvVersion::V1,
            Some(Value::String(v)) if v.is_empty() => KvVersion::V1,
            Some(Value::String(v)) => v.parse().map_err(|e: String| {
                StoreError::decode(probe_path.as_str(), e)
            })?,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| format!("Unsupported KV version: {}", n))
                .and_then(KvVersion::try_from)
                .map_err(|e| StoreError::decode(probe_path.as_str(), e))?,
            Some(other) => {
                return Err(StoreError::decode(
                    probe_path.as_str(),
                    format!("mount version is not a string: {}", other),
                ))
            }
        };

        Ok(MountInfo {
            path,
            version: self.forced.unwrap_or(reported),
        })
    }

    fn fallback_mount(&self, observer: &dyn Observer, path: &LogicalPath) -> MountInfo {
        let version = self.forced.unwrap_or(self.fallback);
        // A v2 wire path needs a mount to insert the sub-resource after
        let mount_path = match version {
            KvVersion::V1 => String::new(),
            KvVersion::V2 => path.first_segment().to_string(),
        };

        let mount = MountInfo {
            path: mount_path,
            version,
        };
        observer.on_event(&ClientEvent::MountFallback {
            path: path.as_str(),
            mount: &mount,
        });
        mount
    }
}
