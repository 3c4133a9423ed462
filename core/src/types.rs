//! Domain DTOs for the Akhet API.
//!
//! # Design
//! Request types model every parameter as an `Option` and skip `None` when
//! serializing, so an unset option never reaches the server as `null`.
//! Responses other than instance creation are passed through as raw JSON;
//! the server owns their shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{AkhetError, AkhetResult};

/// Options accepted when creating an instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Username in the Akhet system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Network profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Resource flavor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_cuda: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    /// Keep the instance alive without a timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notimeout: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gids: Option<Vec<u32>>,
    /// Storage directories to mount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_ws: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_http: Option<Vec<Value>>,
    /// Display name shown for the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_label: Option<String>,
}

impl InstanceConfig {
    /// Keys the server accepts when creating an instance.
    pub const KEYS: [&'static str; 14] = [
        "user",
        "image",
        "network",
        "resource",
        "enable_cuda",
        "env",
        "notimeout",
        "shared",
        "uid",
        "gids",
        "storages",
        "additional_ws",
        "additional_http",
        "user_label",
    ];

    /// `options` restricted to `KEYS`, values untouched. Unknown keys are
    /// dropped with a warning.
    pub fn known_options(options: Map<String, Value>) -> Map<String, Value> {
        options
            .into_iter()
            .filter(|(key, _)| {
                let allowed = Self::KEYS.contains(&key.as_str());
                if !allowed {
                    warn!(option = %key, "dropping unknown instance option");
                }
                allowed
            })
            .collect()
    }

    /// Build a typed config from a loosely typed map.
    ///
    /// Keys outside `KEYS` are dropped with a warning and nulls count as
    /// unset. Unlike `known_options`, a known key whose value does not fit
    /// the typed field (`"uid": "1000"`, `"env": ["A=B"]`) is a
    /// `Serialization` error.
    pub fn from_sparse(options: Map<String, Value>) -> AkhetResult<Self> {
        serde_json::from_value(Value::Object(Self::known_options(options)))
            .map_err(|e| AkhetError::Serialization(format!("instance options: {e}")))
    }
}

/// `data` of a successful instance creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedInstance {
    pub token: String,
}

/// Parameters for changing an instance's display resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionRequest {
    pub token: String,
    pub width: u32,
    pub height: u32,
}
