//! Client observers
//!
//! The client reports what it does through an [`Observer`] handed to it at
//! construction. The default forwards to `tracing`; whether anything is printed is
//! up to the subscriber the binary installs.

use crate::mount::MountInfo;
use crate::transport::Method;

/// Something the client did
#[derive(Debug)]
pub enum ClientEvent<'a> {
    /// Introspection answered, or a cached answer was reused
    MountResolved {
        path: &'a str,
        mount: &'a MountInfo,
        cached: bool,
    },
    /// Introspection unavailable, fallback mount assumed
    MountFallback { path: &'a str, mount: &'a MountInfo },
    Request { method: Method, path: &'a str },
    Response {
        method: Method,
        path: &'a str,
        status: u16,
    },
}

/// Receives client events
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &ClientEvent<'_>);
}

/// Forwards events to `tracing` at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &ClientEvent<'_>) {
        match event {
            ClientEvent::MountResolved {
                path,
                mount,
                cached,
            } => {
                tracing::debug!(
                    path,
                    mount = %mount.path,
                    version = %mount.version,
                    cached,
                    "resolved mount"
                );
            }
            ClientEvent::MountFallback { path, mount } => {
                tracing::debug!(
                    path,
                    mount = %mount.path,
                    version = %mount.version,
                    "mount introspection unavailable, using fallback"
                );
            }
            ClientEvent::Request { method, path } => {
                tracing::debug!(%method, path, "request");
            }
            ClientEvent::Response {
                method,
                path,
                status,
            } => {
                if *status >= 500 {
                    tracing::warn!(%method, path, status, "server error");
                } else {
                    tracing::debug!(%method, path, status, "response");
                }
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &ClientEvent<'_>) {}
}
