//! Immutable per-method request templates.
//!
//! # Design
//! A `MethodDescriptor` is built once by the manifest from a raw
//! `MethodConfig` and then shared behind an `Arc` by every `Request` made
//! against that method. Nothing about it changes after construction; all
//! per-call state lives in the `Request`.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const DEFAULT_METHOD: &str = "get";
pub const DEFAULT_BODY_ATTR: &str = "body";
pub const DEFAULT_HEADERS_ATTR: &str = "headers";
pub const DEFAULT_AUTH_ATTR: &str = "auth";
pub const DEFAULT_TIMEOUT_ATTR: &str = "timeout";

/// Raw method configuration as it appears in a manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodConfig {
    pub path: Option<String>,
    pub method: Option<String>,
    pub headers: Option<Map<String, Value>>,
    pub params: Option<Map<String, Value>>,
    pub body_attr: Option<String>,
    pub headers_attr: Option<String>,
    pub auth_attr: Option<String>,
    pub timeout_attr: Option<String>,
}

impl MethodConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// Resolved, immutable template for one resource operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub host: String,
    pub path: String,
    pub method: String,
    pub headers: Map<String, Value>,
    pub params: Map<String, Value>,
    pub body_attr: String,
    pub headers_attr: String,
    pub auth_attr: String,
    pub timeout_attr: String,
}

impl MethodDescriptor {
    /// Builds a descriptor for `resource.method`, validating the path.
    pub fn from_config(host: &str, resource: &str, method: &str, config: &MethodConfig) -> Result<Self> {
        let path = match config.path.as_deref() {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => {
                return Err(Error::MissingPath {
                    resource: resource.to_string(),
                    method: method.to_string(),
                })
            }
        };

        let descriptor = Self {
            host: host.to_string(),
            path,
            method: config.method.clone().unwrap_or_else(|| DEFAULT_METHOD.to_string()),
            headers: config.headers.clone().unwrap_or_default(),
            params: config.params.clone().unwrap_or_default(),
            body_attr: attr_or(&config.body_attr, DEFAULT_BODY_ATTR),
            headers_attr: attr_or(&config.headers_attr, DEFAULT_HEADERS_ATTR),
            auth_attr: attr_or(&config.auth_attr, DEFAULT_AUTH_ATTR),
            timeout_attr: attr_or(&config.timeout_attr, DEFAULT_TIMEOUT_ATTR),
        };

        if let Some(placeholder) = descriptor
            .placeholders()
            .into_iter()
            .find(|name| descriptor.is_reserved(name))
        {
            return Err(Error::ReservedPlaceholder {
                resource: resource.to_string(),
                method: method.to_string(),
                placeholder,
            });
        }

        Ok(descriptor)
    }

    /// True if `key` names one of the four reserved attributes.
    pub fn is_reserved(&self, key: &str) -> bool {
        key == self.body_attr || key == self.headers_attr || key == self.auth_attr || key == self.timeout_attr
    }

    /// Names of every `{placeholder}` in the path template, in order.
    pub fn placeholders(&self) -> Vec<String> {
        placeholders(&self.path)
    }
}

fn attr_or(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

pub(crate) fn placeholders(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if end > 0 => {
                names.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            Some(end) => rest = &after[end + 1..],
            None => break,
        }
    }
    names
}
