//! Declarative resource tables.
//!
//! # Design
//! `ManifestDefinition` is the raw input, deserializable from JSON in the
//! `{ host, resources, gatewayConfigs }` shape. `Manifest` is the validated
//! form: every method config has been turned into a shared
//! `MethodDescriptor` up front, so a bad path fails when the client is built
//! rather than on first use. Middleware factories are code, not data, and are
//! supplied alongside the definition.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{GatewayConfigs, PartialGatewayConfigs};
use crate::descriptor::{MethodConfig, MethodDescriptor};
use crate::error::{Error, Result};
use crate::middleware::{Chain, MiddlewareContext, MiddlewareFactory};

/// Raw manifest input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDefinition {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub resources: BTreeMap<String, BTreeMap<String, MethodConfig>>,
    #[serde(default)]
    pub gateway_configs: PartialGatewayConfigs,
}

impl ManifestDefinition {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidManifest(value.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Adds (or replaces) `resource.method`.
    pub fn resource(mut self, resource: &str, method: &str, config: MethodConfig) -> Self {
        self.resources
            .entry(resource.to_string())
            .or_default()
            .insert(method.to_string(), config);
        self
    }
}

/// Validated manifest: descriptors, middlewares and gateway configs.
pub struct Manifest {
    host: String,
    resources: BTreeMap<String, BTreeMap<String, Arc<MethodDescriptor>>>,
    middlewares: Vec<MiddlewareFactory>,
    gateway_configs: GatewayConfigs,
}

impl Manifest {
    /// Builds every descriptor, failing on the first invalid method config.
    ///
    /// The definition's gateway configs are merged over `defaults`.
    pub fn new(
        definition: ManifestDefinition,
        middlewares: Vec<MiddlewareFactory>,
        defaults: &GatewayConfigs,
    ) -> Result<Self> {
        let mut resources = BTreeMap::new();
        for (resource, methods) in &definition.resources {
            let mut descriptors = BTreeMap::new();
            for (method, config) in methods {
                let descriptor = MethodDescriptor::from_config(&definition.host, resource, method, config)?;
                descriptors.insert(method.clone(), Arc::new(descriptor));
            }
            resources.insert(resource.clone(), descriptors);
        }
        debug!(host = %definition.host, resources = resources.len(), "manifest built");

        Ok(Self {
            gateway_configs: definition.gateway_configs.apply(defaults),
            host: definition.host,
            resources,
            middlewares,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn gateway_configs(&self) -> &GatewayConfigs {
        &self.gateway_configs
    }

    pub fn middlewares(&self) -> &[MiddlewareFactory] {
        &self.middlewares
    }

    /// Resource names, in order.
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Each resource with its method descriptors.
    pub fn each_resource(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Arc<MethodDescriptor>>)> {
        self.resources.iter().map(|(name, methods)| (name.as_str(), methods))
    }

    pub fn descriptor(&self, resource: &str, method: &str) -> Option<&Arc<MethodDescriptor>> {
        self.resources.get(resource)?.get(method)
    }

    /// Fresh middleware instances for one call.
    pub(crate) fn create_middlewares(&self, context: &MiddlewareContext) -> Chain {
        Chain::instantiate(&self.middlewares, context)
    }
}

impl fmt::Debug for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manifest")
            .field("host", &self.host)
            .field("resources", &self.resources)
            .field("middlewares", &self.middlewares.len())
            .field("gateway_configs", &self.gateway_configs)
            .finish()
    }
}
