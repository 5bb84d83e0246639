//! confvault - Configuration manager backed by a KV secret store
//!
//! "One interface, whichever engine is behind the mount."
//!
//! Organizations, environments, policies and release plans all end up as secrets in
//! a Vault-compatible KV store. Mounts can run the flat v1 engine or the versioned
//! v2 engine, which disagree on wire paths and payload envelopes. The client here
//! detects the engine per call and hides the difference behind `get`, `put`,
//! `delete`, `list` and `exists`.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod mount;
pub mod observer;
pub mod path;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{KeyValueStore, KvClient};
pub use codec::{Envelope, Secret, VersionMetadata};
pub use config::ClientConfig;
pub use error::{Result, StoreError};
pub use mount::{KvVersion, MountInfo};
pub use observer::{ClientEvent, NoopObserver, Observer, TracingObserver};
pub use path::{normalize, LogicalPath};
pub use transport::{HttpTransport, Transport};
