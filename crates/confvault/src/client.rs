//! KV client facade
//!
//! Every call runs the same sequence: normalize the path, resolve its mount,
//! translate to a wire path, encode, execute, decode. Nothing carries over from one
//! call to the next except the optional mount cache.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::codec::{self, Secret, VersionMetadata};
use crate::config::ClientConfig;
use crate::error::{Result, StoreError};
use crate::executor::RequestExecutor;
use crate::mount::{KvVersion, MountInfo, MountResolver};
use crate::observer::{Observer, TracingObserver};
use crate::path::{self, LogicalPath, WirePath, DATA_PREFIX, METADATA_PREFIX};
use crate::transport::{HttpTransport, Transport};

/// Field holding the value of plain string secrets
pub const VALUE_FIELD: &str = "value";

/// String-valued key-value store, the interface the rest of the system depends on
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<String>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
    fn exists(&self, key: &str) -> Result<bool>;
}

/// A resolved call target
struct Target {
    mount: MountInfo,
    wire: WirePath,
}

/// Client for v1 and v2 KV mounts
pub struct KvClient<T: Transport = HttpTransport> {
    transport: T,
    resolver: MountResolver,
    observer: Arc<dyn Observer>,
}

impl<T: Transport> fmt::Debug for KvClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvClient").finish_non_exhaustive()
    }
}

impl KvClient<HttpTransport> {
    /// Connect over HTTP using `config`
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new(config)?, config))
    }
}

impl<T: Transport> KvClient<T> {
    /// Build a client over an arbitrary transport
    pub fn with_transport(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            resolver: MountResolver::new(config),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the observer receiving client events
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Drop cached mount answers; a no-op unless caching is enabled
    pub fn invalidate_mounts(&self) {
        self.resolver.invalidate();
    }

    /// Mount and engine version owning `path`
    pub fn mount_info(&self, path: &str) -> Result<MountInfo> {
        let path = LogicalPath::parse(path)?;
        self.resolver
            .resolve(&self.executor(), self.observer.as_ref(), &path)
    }

    /// Read the string stored under `value`
    pub fn get(&self, path: &str) -> Result<String> {
        let (target, mut data) = self.read_data(path, 0)?;
        match data.remove(VALUE_FIELD) {
            Some(Value::String(value)) => Ok(value),
            Some(other) => Err(StoreError::decode(
                target.wire.as_str(),
                format!("{} is not a string: {}", VALUE_FIELD, other),
            )),
            None => Err(StoreError::decode(
                target.wire.as_str(),
                format!("secret has no {} field", VALUE_FIELD),
            )),
        }
    }

    /// Whether a string secret exists at `path`; anything `get` rejects other than
    /// `NotFound` is an error here too
    pub fn exists(&self, path: &str) -> Result<bool> {
        match self.get(path) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Store `value` under the `value` field, without check-and-set
    pub fn put(&self, path: &str, value: &str) -> Result<()> {
        let mut data = Map::new();
        data.insert(VALUE_FIELD.to_string(), Value::String(value.to_string()));
        self.put_data(path, data, -1)
    }

    /// Delete `path`. On v2 mounts this soft-deletes the latest version.
    pub fn delete(&self, path: &str) -> Result<()> {
        let target = self.target(path, DATA_PREFIX)?;
        self.executor().delete(&target.wire)
    }

    /// Entry names directly under `path`; subdirectories end with a separator
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let target = self.target(path, METADATA_PREFIX)?;
        self.executor().list(&target.wire)
    }

    /// Read the full payload map.
    ///
    /// `version` pins a v2 version; 0 reads the latest. v1 mounts have no versions
    /// and ignore it. Negative versions are rejected.
    pub fn get_data(&self, path: &str, version: i64) -> Result<Map<String, Value>> {
        self.read_data(path, version).map(|(_, data)| data)
    }

    /// Write a full payload map.
    ///
    /// `cas >= 0` makes a v2 write conditional on that being the current version
    /// (0: the key must not exist). Negative means unconditional.
    pub fn put_data(&self, path: &str, data: Map<String, Value>, cas: i64) -> Result<()> {
        let target = self.target(path, DATA_PREFIX)?;
        let envelope = codec::encode(data, target.mount.version, cas);
        self.executor().write(&target.wire, envelope)?;
        Ok(())
    }

    /// Raw listing response for `path`
    pub fn list_data(&self, path: &str) -> Result<Secret> {
        let target = self.target(path, METADATA_PREFIX)?;
        self.executor().list_secret(&target.wire)
    }

    /// Version metadata of a v2 secret; `None` on v1 mounts.
    ///
    /// Soft-deleted versions still have metadata, so this succeeds where `get_data`
    /// reports `NotFound`.
    pub fn get_metadata(&self, path: &str, version: i64) -> Result<Option<VersionMetadata>> {
        let version = check_version(version)?;
        let target = self.target(path, DATA_PREFIX)?;
        if target.mount.version == KvVersion::V1 {
            return Ok(None);
        }

        let secret = self.read(&target, version)?;
        codec::decode_metadata(&secret, target.wire.as_str())
    }

    fn executor(&self) -> RequestExecutor<'_> {
        RequestExecutor::new(&self.transport, self.observer.as_ref())
    }

    fn target(&self, raw: &str, api_prefix: &str) -> Result<Target> {
        let path = LogicalPath::parse(raw)?;
        let mount = self
            .resolver
            .resolve(&self.executor(), self.observer.as_ref(), &path)?;

        let api_prefix = match mount.version {
            KvVersion::V1 => "",
            KvVersion::V2 => api_prefix,
        };
        let wire = path::translate(&path, &mount, api_prefix);

        Ok(Target { mount, wire })
    }

    fn read_data(&self, path: &str, version: i64) -> Result<(Target, Map<String, Value>)> {
        let version = check_version(version)?;
        let target = self.target(path, DATA_PREFIX)?;
        let secret = self.read(&target, version)?;
        let data = codec::decode(Some(secret), target.mount.version, target.wire.as_str())?;
        Ok((target, data))
    }

    fn read(&self, target: &Target, version: u64) -> Result<Secret> {
        let mut query = Vec::new();
        if target.mount.is_v2() && version > 0 {
            query.push(("version", version.to_string()));
        }
        self.executor().read(&target.wire, &query)
    }
}

impl<T: Transport> KeyValueStore for KvClient<T> {
    fn get(&self, key: &str) -> Result<String> {
        KvClient::get(self, key)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        KvClient::put(self, key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        KvClient::delete(self, key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        KvClient::list(self, prefix)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        KvClient::exists(self, key)
    }
}

fn check_version(version: i64) -> Result<u64> {
    u64::try_from(version)
        .map_err(|_| StoreError::BadInput(format!("Invalid secret version: {}", version)))
}
