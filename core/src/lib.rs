//! Manifest-driven HTTP clients with a middleware pipeline.
//!
//! # Overview
//! A manifest describes remote resources declaratively: a host, and for each
//! resource a table of methods with a path template, a verb and defaults.
//! `ClientBuilder` turns it into a `Client` whose methods build a `Request`
//! from caller arguments, pass it through the registered middlewares, and
//! hand it to a gateway that performs the I/O.
//!
//! # Design
//! - `Request` and `Response` are values; middlewares change them through
//!   `enhance`, which always returns a new value.
//! - Request hooks run in registration order; response hooks wrap the
//!   gateway in reverse order, so the first middleware registered is the
//!   outermost.
//! - Every call settles to `Result<Response, Response>`: transport failures
//!   and timeouts become synthetic 400 responses rather than bare errors.
//! - Gateways share one `Executor`; a transport only implements a single
//!   wire exchange.
//!
//! ```no_run
//! # async fn demo() -> restmap_core::Result<()> {
//! use restmap_core::{forge, ManifestDefinition};
//! use serde_json::json;
//!
//! let manifest = ManifestDefinition::from_value(json!({
//!     "host": "http://api.example.org",
//!     "resources": { "User": { "byId": { "path": "/users/{id}" } } },
//! }))?;
//! let client = forge(manifest, Vec::new())?;
//! match client.call("User", "byId", json!({ "id": 7 }))?.await {
//!     Ok(response) => println!("{}", response.data()),
//!     Err(failed) => eprintln!("{}: {:?}", failed.status(), failed.raw_data()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod manifest;
pub mod middleware;
pub mod query;
pub mod request;
pub mod response;

pub use client::{Client, ClientBuilder, Resource, ResourceMethod};
pub use config::{Configs, GatewayConfigs, HttpConfigs};
pub use descriptor::{MethodConfig, MethodDescriptor};
pub use error::{Error, Result};
pub use gateway::{
    CancelFlag, Executor, Gateway, GatewayFactory, HttpTransport, MockReply, MockTransport, Transport, TransportError,
    TransportGateway, WireRequest, WireResponse,
};
pub use manifest::{Manifest, ManifestDefinition};
pub use middleware::{CallResult, Middleware, MiddlewareContext, MiddlewareFactory, Next, ResponseFuture};
pub use query::to_query_string;
pub use request::{Request, RequestOverrides};
pub use response::{Response, ResponseOverrides};

/// Builds a client against the process-wide defaults in [`config`].
///
/// The default gateway is looked up again on every call, so
/// [`config::set_gateway`] also affects clients forged earlier.
pub fn forge(definition: ManifestDefinition, middlewares: Vec<MiddlewareFactory>) -> Result<Client> {
    ClientBuilder::new(definition)
        .middlewares(middlewares)
        .configs(config::configs())
        .gateway_resolver(|| config::configs().gateway)
        .build()
}
