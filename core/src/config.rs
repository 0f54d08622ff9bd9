//! Gateway configuration and the process-wide defaults.
//!
//! # Design
//! The pipeline only ever sees configuration passed to it explicitly:
//! `ClientBuilder` takes a `Configs` value or a gateway resolver. The global
//! `configs()` exists for the top-level `forge` entry point; it is read when
//! a forged client is built and again on every call, never anywhere else.

use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use serde::Deserialize;

use crate::gateway::{GatewayFactory, HttpTransport, TransportGateway};

/// Knobs every gateway receives with each request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfigs {
    /// Send PUT, PATCH and DELETE as POST with a method override.
    #[serde(rename = "emulateHTTP", alias = "emulateHttp")]
    pub emulate_http: bool,
    #[serde(rename = "HTTP")]
    pub http: HttpConfigs,
}

/// Settings for `HttpTransport`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfigs {
    pub user_agent: Option<String>,
    pub max_redirects: Option<u32>,
}

/// Per-manifest overrides, shallow-merged over the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialGatewayConfigs {
    #[serde(rename = "emulateHTTP", alias = "emulateHttp")]
    pub emulate_http: Option<bool>,
    #[serde(rename = "HTTP")]
    pub http: Option<HttpConfigs>,
}

impl PartialGatewayConfigs {
    pub fn apply(&self, base: &GatewayConfigs) -> GatewayConfigs {
        GatewayConfigs {
            emulate_http: self.emulate_http.unwrap_or(base.emulate_http),
            http: self.http.clone().unwrap_or_else(|| base.http.clone()),
        }
    }
}

/// Gateway selection plus the configs handed to it.
#[derive(Clone)]
pub struct Configs {
    pub gateway: Option<Arc<dyn GatewayFactory>>,
    pub gateway_configs: GatewayConfigs,
}

impl Default for Configs {
    fn default() -> Self {
        Self {
            gateway: Some(TransportGateway::shared(HttpTransport)),
            gateway_configs: GatewayConfigs::default(),
        }
    }
}

impl fmt::Debug for Configs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configs")
            .field("gateway", &self.gateway.as_ref().map(|_| "<gateway>"))
            .field("gateway_configs", &self.gateway_configs)
            .finish()
    }
}

static CONFIGS: LazyLock<RwLock<Configs>> = LazyLock::new(|| RwLock::new(Configs::default()));

/// A snapshot of the process-wide defaults.
pub fn configs() -> Configs {
    CONFIGS.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Replaces the default gateway; `None` leaves forged clients without one.
pub fn set_gateway(gateway: Option<Arc<dyn GatewayFactory>>) {
    CONFIGS.write().unwrap_or_else(PoisonError::into_inner).gateway = gateway;
}

pub fn set_gateway_configs(gateway_configs: GatewayConfigs) {
    CONFIGS.write().unwrap_or_else(PoisonError::into_inner).gateway_configs = gateway_configs;
}
