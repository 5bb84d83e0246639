//! Secret codec
//!
//! v1 mounts store the caller's map as the request body and return it under `data`.
//! v2 mounts wrap writes in `{data, options}` and nest reads one level deeper:
//! `{data: {data: payload, metadata: {...}}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::mount::KvVersion;

/// A decoded server response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lease_id: String,

    #[serde(default)]
    pub lease_duration: u64,

    #[serde(default)]
    pub renewable: bool,

    #[serde(default)]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl Secret {
    /// A response carrying only `data`
    pub fn from_data(data: Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// A directory listing response
    pub fn listing(keys: Vec<String>) -> Self {
        let mut data = Map::new();
        data.insert(
            "keys".to_string(),
            Value::Array(keys.into_iter().map(Value::String).collect()),
        );
        Self::from_data(data)
    }

    /// Whether the body said anything at all
    pub fn has_content(&self) -> bool {
        let has_warnings = self.warnings.as_ref().is_some_and(|w| !w.is_empty());
        let has_data = self.data.as_ref().is_some_and(|d| !d.is_empty());
        has_warnings || has_data
    }

    /// Entry names of a listing, `None` when this is not a listing
    pub fn keys(&self) -> Option<&Value> {
        self.data.as_ref()?.get("keys")
    }
}

/// Write options of a v2 envelope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Expected current version; `Some(0)` demands that the key does not exist
    pub cas: Option<u64>,
}

/// A payload as it travels to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    V1(Map<String, Value>),
    V2 {
        data: Map<String, Value>,
        options: WriteOptions,
    },
}

impl Envelope {
    /// JSON request body
    pub fn into_body(self) -> Value {
        match self {
            Envelope::V1(payload) => Value::Object(payload),
            Envelope::V2 { data, options } => {
                let mut opts = Map::new();
                if let Some(cas) = options.cas {
                    opts.insert("cas".to_string(), Value::from(cas));
                }

                let mut body = Map::new();
                body.insert("data".to_string(), Value::Object(data));
                body.insert("options".to_string(), Value::Object(opts));
                Value::Object(body)
            }
        }
    }
}

/// Wrap `payload` for a mount of `version`.
///
/// A negative `cas` means no compare-and-swap. v1 mounts have no CAS and ignore it.
pub fn encode(payload: Map<String, Value>, version: KvVersion, cas: i64) -> Envelope {
    match version {
        KvVersion::V1 => Envelope::V1(payload),
        KvVersion::V2 => Envelope::V2 {
            data: payload,
            options: WriteOptions {
                cas: u64::try_from(cas).ok(),
            },
        },
    }
}

/// Extract the caller's payload from a read response.
///
/// A missing response, missing `data`, or (for v2) a missing inner `data` is
/// `NotFound`; v2 answers the latter for deleted or destroyed versions.
pub fn decode(response: Option<Secret>, version: KvVersion, path: &str) -> Result<Map<String, Value>> {
    let not_found = || StoreError::NotFound(path.to_string());

    let data = response.and_then(|s| s.data).ok_or_else(not_found)?;

    match version {
        KvVersion::V1 => Ok(data),
        KvVersion::V2 => match data.get("data") {
            None | Some(Value::Null) => Err(not_found()),
            Some(Value::Object(payload)) => Ok(payload.clone()),
            Some(other) => Err(StoreError::decode(
                path,
                format!("expected an object under data.data, got {}", kind(other)),
            )),
        },
    }
}

/// Metadata of one version of a v2 secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub version: u64,
    pub created_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "optional_time")]
    pub deletion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destroyed: bool,
}

impl VersionMetadata {
    /// Soft-deleted or destroyed
    pub fn is_deleted(&self) -> bool {
        self.destroyed || self.deletion_time.is_some()
    }
}

/// Version metadata of a v2 read response, `None` when the response has none
pub fn decode_metadata(response: &Secret, path: &str) -> Result<Option<VersionMetadata>> {
    let metadata = response.data.as_ref().and_then(|d| d.get("metadata"));

    match metadata {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| StoreError::decode(path, format!("invalid version metadata: {}", e))),
    }
}

/// Empty strings mean "not set"
fn optional_time<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
