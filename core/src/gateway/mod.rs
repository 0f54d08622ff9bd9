//! Gateway contract and the executor shared by every transport.
//!
//! # Design
//! A gateway turns one resolved `Request` into a settled `CallResult`. The
//! behaviour every gateway must honour (emulated verbs, body preparation,
//! basic auth, the timeout race, elapsed time, failure shaping) lives once in
//! `Executor`. Concrete transports only implement `Transport`, a single wire
//! exchange of `WireRequest` for `WireResponse`, and get the rest by
//! composition through `TransportGateway`.
//!
//! Anything else that can build a `Gateway` from a request and its configs
//! may implement `GatewayFactory` directly.

mod http;
mod mock;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use futures::FutureExt;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::GatewayConfigs;
use crate::middleware::{CallResult, ResponseFuture};
use crate::query::{scalar_text, to_query_string};
use crate::request::Request;
use crate::response::Response;

pub use http::HttpTransport;
pub use mock::{MockReply, MockTransport};

/// Status used for failures that never produced a server response.
pub const CLIENT_ERROR_STATUS: u16 = 400;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=utf-8";
pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// Field injected into object bodies when verbs are emulated.
pub const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Builds one `Gateway` per call.
pub trait GatewayFactory: Send + Sync {
    fn construct(&self, request: Request, configs: GatewayConfigs) -> Box<dyn Gateway>;
}

/// Executes one request.
///
/// The returned future resolves to `Ok` for successful responses and `Err`
/// for everything else, always carrying a `Response`.
pub trait Gateway: Send {
    fn call(self: Box<Self>) -> ResponseFuture;
}

/// A request in the form a transport puts on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

/// What a transport got back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl WireResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// A JSON body with the matching content-type.
    pub fn json(self, body: &Value) -> Self {
        self.header("content-type", "application/json").body(body.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Timeout ({}ms)", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Network(String),
}

/// Set once a call has timed out.
///
/// The executor stops waiting as soon as it cancels, but work a transport
/// handed off elsewhere (a blocking thread, a socket) keeps running. Such a
/// transport checks the flag and drops whatever completes afterwards.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single wire exchange.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn perform(
        &self,
        request: WireRequest,
        configs: &GatewayConfigs,
        cancel: CancelFlag,
    ) -> Result<WireResponse, TransportError>;
}

/// `GatewayFactory` running every call through an `Executor` over `T`.
#[derive(Debug)]
pub struct TransportGateway<T> {
    transport: Arc<T>,
}

impl<T: Transport> TransportGateway<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn shared(transport: T) -> Arc<dyn GatewayFactory> {
        Arc::new(Self::new(transport))
    }
}

impl<T: Transport> GatewayFactory for TransportGateway<T> {
    fn construct(&self, request: Request, configs: GatewayConfigs) -> Box<dyn Gateway> {
        Box::new(Executor::new(request, configs, Arc::clone(&self.transport)))
    }
}

/// Call logic shared by all transports.
pub struct Executor<T> {
    request: Request,
    configs: GatewayConfigs,
    transport: Arc<T>,
    canceled: CancelFlag,
}

impl<T: Transport> Executor<T> {
    pub fn new(request: Request, configs: GatewayConfigs, transport: Arc<T>) -> Self {
        Self {
            request,
            configs,
            transport,
            canceled: CancelFlag::default(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn options(&self) -> &GatewayConfigs {
        &self.configs
    }

    /// Whether this call's verb must travel as POST.
    pub fn should_emulate_http(&self) -> bool {
        self.configs.emulate_http && matches!(self.request.method().as_str(), "delete" | "put" | "patch")
    }

    /// Encodes the body for the wire, adding any headers the encoding needs.
    ///
    /// Object bodies are form-encoded; strings pass through unchanged; other
    /// JSON values travel as their JSON text. Empty results send no body.
    pub fn prepare_body(&self, method: &str, headers: &mut BTreeMap<String, String>) -> Option<String> {
        let mut body = self.request.body().cloned();
        if self.should_emulate_http() {
            let mut emulated = body.unwrap_or_else(|| Value::Object(Map::new()));
            if let Value::Object(map) = &mut emulated {
                map.insert(METHOD_OVERRIDE_FIELD.to_string(), Value::String(method.to_string()));
            }
            body = Some(emulated);
            headers.insert(METHOD_OVERRIDE_HEADER.to_string(), method.to_string());
        }

        let encoded = match body? {
            Value::Object(map) => {
                let encoded = to_query_string(&map);
                if !encoded.is_empty() {
                    headers.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
                }
                encoded
            }
            Value::String(raw) => raw,
            other => other.to_string(),
        };
        (!encoded.is_empty()).then_some(encoded)
    }

    /// `Basic` credentials from the auth argument, if one was given.
    pub fn authorization(&self) -> Option<String> {
        let auth = self.request.auth()?;
        let field = |name: &str| auth.get(name).map(scalar_text).unwrap_or_default();
        let credentials = format!("{}:{}", field("username"), field("password"));
        Some(format!("Basic {}", BASE64_STANDARD.encode(credentials)))
    }

    /// Resolves the request into what goes on the wire.
    pub fn wire_request(&self) -> crate::Result<WireRequest> {
        let method = self.request.method();
        let url = self.request.url()?;

        let mut headers = BTreeMap::new();
        if let Some(authorization) = self.authorization() {
            headers.insert("authorization".to_string(), authorization);
        }
        let body = self.prepare_body(&method, &mut headers);
        headers.extend(self.request.headers());

        Ok(WireRequest {
            method: if self.should_emulate_http() { "post".to_string() } else { method },
            url,
            headers,
            body,
            timeout: self.request.timeout(),
        })
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.is_canceled()
    }

    /// Resolves successful responses, rejects the rest.
    pub fn dispatch_response(&self, wire: WireResponse) -> CallResult {
        let response = Response::new(self.request.clone(), wire.status, wire.body, wire.headers);
        if response.success() {
            Ok(response)
        } else {
            Err(response)
        }
    }

    /// A synthetic failure carrying `message` as its body.
    pub fn dispatch_client_error(&self, message: impl Into<String>) -> CallResult {
        Err(Response::new(
            self.request.clone(),
            CLIENT_ERROR_STATUS,
            Some(message.into()),
            BTreeMap::new(),
        ))
    }

    /// Runs the exchange, racing it against the request timeout.
    pub async fn execute(self) -> CallResult {
        let started = Instant::now();
        let result = self.settle().await;
        let elapsed = started.elapsed();
        match result {
            Ok(response) => Ok(response.with_time_elapsed(elapsed)),
            Err(response) => Err(response.with_time_elapsed(elapsed)),
        }
    }

    async fn settle(&self) -> CallResult {
        let wire = match self.wire_request() {
            Ok(wire) => wire,
            Err(err) => {
                warn!(error = %err, "request could not be resolved");
                return self.dispatch_client_error(err.to_string());
            }
        };
        debug!(method = %wire.method, url = %wire.url, "dispatching request");

        let timeout = wire.timeout;
        let exchange = self.transport.perform(wire, &self.configs, self.canceled.clone());
        let outcome = match timeout {
            // The transport may enforce the timeout natively; this manual
            // timer fires 1ms later in case it does not. Losing the race drops
            // `exchange`, so a late completion never reaches dispatch.
            Some(limit) => match tokio::time::timeout(limit + Duration::from_millis(1), exchange).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout(limit)),
            },
            None => exchange.await,
        };

        match outcome {
            Err(err @ TransportError::Timeout(_)) => {
                self.canceled.cancel();
                warn!(error = %err, "request timed out");
                self.dispatch_client_error(err.to_string())
            }
            Err(err) => {
                warn!(error = %err, "network error");
                self.dispatch_client_error(err.to_string())
            }
            Ok(wire) => {
                debug!(status = wire.status, "response received");
                self.dispatch_response(wire)
            }
        }
    }
}

impl<T: Transport> Gateway for Executor<T> {
    fn call(self: Box<Self>) -> ResponseFuture {
        (*self).execute().boxed()
    }
}
