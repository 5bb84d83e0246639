//! Logical and wire paths
//!
//! Callers address secrets with logical paths such as `secret/app/config`. The
//! backend wants something different depending on the engine version of the mount
//! that owns the path: v1 takes the logical path as-is, v2 inserts a sub-resource
//! segment right after the mount (`secret/data/app/config`, `secret/metadata/app`).

use std::fmt;

use crate::error::{Result, StoreError};
use crate::mount::MountInfo;

/// Sub-resource used by v2 data operations
pub const DATA_PREFIX: &str = "data";

/// Sub-resource used by v2 list and metadata operations
pub const METADATA_PREFIX: &str = "metadata";

/// A normalized secret path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LogicalPath(String);

impl LogicalPath {
    /// Normalize a raw path
    pub fn new(raw: &str) -> Self {
        LogicalPath(normalize(raw))
    }

    /// Normalize and reject paths that can never address a secret
    pub fn parse(raw: &str) -> Result<Self> {
        let path = Self::new(raw);
        path.validate()?;
        Ok(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First segment, or the whole path when it has only one
    pub fn first_segment(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(StoreError::BadInput("Path cannot be empty".to_string()));
        }

        if self.0.split('/').any(|segment| segment == ".." || segment == ".") {
            return Err(StoreError::BadInput(format!(
                "Relative segment in path: {}",
                self.0
            )));
        }

        Ok(())
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The concrete path sent over HTTP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePath(String);

impl WirePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WirePath {
    fn from(path: &str) -> Self {
        WirePath(path.to_string())
    }
}

impl fmt::Display for WirePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim whitespace and separators from both ends and drop empty segments.
///
/// `"//a/b//"` becomes `"a/b"`, `"a//b"` becomes `"a/b"`, empty stays empty.
pub fn normalize(path: &str) -> String {
    path.trim_matches(|c: char| c == '/' || c.is_whitespace())
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Rewrite a logical path into the wire path for `mount` and `api_prefix`.
///
/// v1 callers pass an empty prefix, which leaves the path unchanged.
pub fn translate(path: &LogicalPath, mount: &MountInfo, api_prefix: &str) -> WirePath {
    let mount_path = mount.path.trim_end_matches('/');
    let path = path.as_str();

    let remainder = if path == mount_path {
        ""
    } else if mount_path.is_empty() {
        path
    } else {
        path.strip_prefix(mount_path)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(path)
    };

    WirePath(join(&[mount_path, api_prefix, remainder]))
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::KvVersion;

    fn mount(path: &str, version: KvVersion) -> MountInfo {
        MountInfo {
            path: path.to_string(),
            version,
        }
    }

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize("//a/b//"), "a/b");
        assert_eq!(normalize("  secret/app/config/ "), "secret/app/config");
        assert_eq!(normalize("a//b"), "a/b");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" / "), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "",
            "/",
            "a",
            "//a/b//",
            " / a/",
            "a/ /b",
            "\tsecret//data/x \n",
            "/ /x/ /",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        assert!(matches!(
            LogicalPath::parse(" // "),
            Err(StoreError::BadInput(_))
        ));
        assert!(matches!(
            LogicalPath::parse("secret/../sys"),
            Err(StoreError::BadInput(_))
        ));
        assert_eq!(LogicalPath::parse("/kv/a/").unwrap().as_str(), "kv/a");
    }

    #[test]
    fn test_translate_v1_is_identity() {
        let cases = [
            ("kv1/foo", "kv1/"),
            ("kv1/foo", ""),
            ("kv1", "kv1/"),
            ("kv1", ""),
            ("a/b/c/d", "a"),
            ("a/b/c/d", "a/b/"),
            ("a/b/c/d", ""),
        ];
        for (raw, mount_path) in cases {
            let path = LogicalPath::new(raw);
            let wire = translate(&path, &mount(mount_path, KvVersion::V1), "");
            assert_eq!(wire.as_str(), path.as_str(), "{} under {:?}", raw, mount_path);
        }
    }

    #[test]
    fn test_translate_v2_inserts_prefix() {
        let m = mount("secret/", KvVersion::V2);
        let path = LogicalPath::new("secret/app/config");
        assert_eq!(
            translate(&path, &m, DATA_PREFIX).as_str(),
            "secret/data/app/config"
        );
        assert_eq!(
            translate(&path, &m, METADATA_PREFIX).as_str(),
            "secret/metadata/app/config"
        );
    }

    #[test]
    fn test_translate_mount_root() {
        let m = mount("secret/", KvVersion::V2);
        assert_eq!(
            translate(&LogicalPath::new("secret"), &m, METADATA_PREFIX).as_str(),
            "secret/metadata"
        );
        assert_eq!(
            translate(&LogicalPath::new("secret/"), &m, DATA_PREFIX).as_str(),
            "secret/data"
        );
    }

    #[test]
    fn test_translate_nested_mount() {
        let m = mount("team/kv/", KvVersion::V2);
        let path = LogicalPath::new("team/kv/db/password");
        assert_eq!(
            translate(&path, &m, DATA_PREFIX).as_str(),
            "team/kv/data/db/password"
        );
    }

    #[test]
    fn test_translate_respects_segment_boundary() {
        let m = mount("secret", KvVersion::V2);
        let path = LogicalPath::new("secretive/x");
        assert_eq!(
            translate(&path, &m, DATA_PREFIX).as_str(),
            "secret/data/secretive/x"
        );
    }

    #[test]
    fn test_first_segment() {
        assert_eq!(LogicalPath::new("kv/app/x").first_segment(), "kv");
        assert_eq!(LogicalPath::new("kv").first_segment(), "kv");
    }
}
