//! Client builder and the generated call surface.
//!
//! # Design
//! `ClientBuilder` validates the manifest and produces a `Client`: one
//! `Resource` per manifest resource, one `ResourceMethod` per method. Calling
//! a method builds a `Request`, instantiates the middleware chain for that
//! resource/method, runs the request phase, resolves the gateway factory
//! (at call time, so it can be swapped after the client is built), then runs
//! the gateway inside the response-phase wrappers.
//!
//! Configuration is explicit: the builder never reads the process-wide
//! defaults unless handed a resolver that does, as `forge` is.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{info_span, warn, Instrument};

use crate::config::Configs;
use crate::descriptor::MethodDescriptor;
use crate::error::{Error, Result};
use crate::gateway::{GatewayFactory, CLIENT_ERROR_STATUS};
use crate::manifest::{Manifest, ManifestDefinition};
use crate::middleware::{MiddlewareContext, MiddlewareFactory, Next, ResponseFuture};
use crate::request::Request;
use crate::response::Response;

/// Yields the gateway factory to use for the next call.
pub type GatewayResolver = Arc<dyn Fn() -> Option<Arc<dyn GatewayFactory>> + Send + Sync>;

pub struct ClientBuilder {
    definition: ManifestDefinition,
    middlewares: Vec<MiddlewareFactory>,
    configs: Configs,
    resolver: Option<GatewayResolver>,
}

impl ClientBuilder {
    /// Starts from `Configs::default()`, which selects `HttpTransport`.
    pub fn new(definition: ManifestDefinition) -> Self {
        Self {
            definition,
            middlewares: Vec::new(),
            configs: Configs::default(),
            resolver: None,
        }
    }

    /// Appends a middleware; registration order is significant.
    pub fn middleware(mut self, middleware: MiddlewareFactory) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn middlewares(mut self, middlewares: impl IntoIterator<Item = MiddlewareFactory>) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    pub fn configs(mut self, configs: Configs) -> Self {
        self.configs = configs;
        self
    }

    /// Uses `gateway` for every call.
    pub fn gateway(mut self, gateway: Arc<dyn GatewayFactory>) -> Self {
        self.configs.gateway = Some(gateway);
        self
    }

    /// Resolves the gateway afresh on every call instead of fixing one.
    pub fn gateway_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn() -> Option<Arc<dyn GatewayFactory>> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn build(self) -> Result<Client> {
        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => {
                let gateway = self.configs.gateway.clone();
                Arc::new(move || gateway.clone()) as GatewayResolver
            }
        };
        if resolver().is_none() {
            return Err(Error::GatewayNotConfigured);
        }

        let manifest = Manifest::new(self.definition, self.middlewares, &self.configs.gateway_configs)?;
        let inner = Arc::new(Inner { manifest, resolver });

        let resources = inner
            .manifest
            .each_resource()
            .map(|(resource, descriptors)| {
                let methods = descriptors
                    .iter()
                    .map(|(method, descriptor)| {
                        let entry = ResourceMethod {
                            inner: Arc::clone(&inner),
                            resource: resource.to_string(),
                            method: method.clone(),
                            descriptor: Arc::clone(descriptor),
                        };
                        (method.clone(), entry)
                    })
                    .collect();
                let entry = Resource {
                    name: resource.to_string(),
                    methods,
                };
                (resource.to_string(), entry)
            })
            .collect();

        Ok(Client { inner, resources })
    }
}

struct Inner {
    manifest: Manifest,
    resolver: GatewayResolver,
}

impl Inner {
    fn invoke(&self, resource: &str, method: &str, request: Request) -> ResponseFuture {
        let context = MiddlewareContext {
            resource_name: resource.to_string(),
            resource_method: method.to_string(),
        };
        let span = info_span!("call", resource = %resource, method = %method);

        let mut chain = self.manifest.create_middlewares(&context);
        let request = span.in_scope(|| chain.run_request_phase(request));

        let gateway: Next = match (self.resolver)() {
            Some(factory) => {
                let gateway = factory.construct(request, self.manifest.gateway_configs().clone());
                Box::new(move || gateway.call())
            }
            None => {
                warn!(resource, method, "no gateway configured at call time");
                Box::new(move || -> ResponseFuture {
                    let failed = Response::new(
                        request,
                        CLIENT_ERROR_STATUS,
                        Some(Error::GatewayNotConfigured.to_string()),
                        BTreeMap::new(),
                    );
                    futures::future::ready(Err::<Response, Response>(failed)).boxed()
                })
            }
        };

        chain.wrap_response_phase(gateway)().instrument(span).boxed()
    }
}

/// The generated client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
    resources: BTreeMap<String, Resource>,
}

impl Client {
    /// The manifest this client was built from.
    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    pub fn resource(&self, name: &str) -> Result<&Resource> {
        self.resources
            .get(name)
            .ok_or_else(|| Error::UnknownResource(name.to_string()))
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Shorthand for `resource(resource)?.method(method)?.call(args)`.
    pub fn call(&self, resource: &str, method: &str, args: Value) -> Result<ResponseFuture> {
        Ok(self.resource(resource)?.method(method)?.call(args))
    }
}

/// A named group of methods.
#[derive(Clone)]
pub struct Resource {
    name: String,
    methods: BTreeMap<String, ResourceMethod>,
}

impl Resource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Result<&ResourceMethod> {
        self.methods.get(name).ok_or_else(|| Error::UnknownMethod {
            resource: self.name.clone(),
            method: name.to_string(),
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &ResourceMethod> {
        self.methods.values()
    }
}

/// A callable entry point for one manifest method.
#[derive(Clone)]
pub struct ResourceMethod {
    inner: Arc<Inner>,
    resource: String,
    method: String,
    descriptor: Arc<MethodDescriptor>,
}

impl ResourceMethod {
    pub fn name(&self) -> &str {
        &self.method
    }

    pub fn resource_name(&self) -> &str {
        &self.resource
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Runs one call with `args` (a JSON object; anything else counts as no
    /// arguments).
    pub fn call(&self, args: Value) -> ResponseFuture {
        let request = Request::from_value(Arc::clone(&self.descriptor), args);
        self.inner.invoke(&self.resource, &self.method, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use crate::gateway::{MockReply, MockTransport, TransportGateway, WireResponse, METHOD_OVERRIDE_HEADER};
    use crate::middleware::{factory, Middleware};
    use crate::request::RequestOverrides;

    fn definition() -> ManifestDefinition {
        ManifestDefinition::from_value(json!({
            "host": "http://api.example.org",
            "resources": {
                "User": {
                    "byId": { "path": "/users/{id}" },
                    "remove": { "path": "/users/{id}", "method": "delete" },
                },
            },
        }))
        .unwrap()
    }

    fn client_with(mock: &MockTransport, definition: ManifestDefinition) -> Client {
        ClientBuilder::new(definition)
            .gateway(TransportGateway::shared(mock.clone()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn resolves_url_and_method() {
        let mock = MockTransport::new();
        mock.respond("get", "http://api.example.org/users/7", WireResponse::new(200).json(&json!({ "id": 7 })));
        let client = client_with(&mock, definition());

        let response = client.call("User", "byId", json!({ "id": 7 })).unwrap().await.unwrap();
        assert_eq!(response.data(), json!({ "id": 7 }));
        assert_eq!(response.request().url().unwrap(), "http://api.example.org/users/7");
        assert_eq!(response.request().method(), "get");

        let sent = mock.requests();
        assert_eq!(sent[0].method, "get");
        assert_eq!(sent[0].url, "http://api.example.org/users/7");
    }

    #[tokio::test]
    async fn emulate_http_sends_delete_as_post() {
        let mock = MockTransport::new();
        mock.respond("post", "http://api.example.org/users/7", WireResponse::new(204));
        let mut definition = definition();
        definition.gateway_configs.emulate_http = Some(true);
        let client = client_with(&mock, definition);

        client.call("User", "remove", json!({ "id": 7 })).unwrap().await.unwrap();
        let sent = &mock.requests()[0];
        assert_eq!(sent.method, "post");
        assert_eq!(sent.headers[METHOD_OVERRIDE_HEADER], "delete");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rejects_with_client_error() {
        let mock = MockTransport::new();
        mock.mock(None, "http://api.example.org", MockReply::Hang);
        let client = client_with(&mock, definition());

        let failed = client
            .call("User", "byId", json!({ "id": 1, "timeout": 50 }))
            .unwrap()
            .await
            .unwrap_err();
        assert!((400..500).contains(&failed.status()));
        assert!(failed.raw_data().unwrap().contains("Timeout"));
        let elapsed = failed.time_elapsed().unwrap();
        assert!(elapsed >= Duration::from_millis(50) && elapsed <= Duration::from_millis(51), "{elapsed:?}");
    }

    #[tokio::test]
    async fn network_failure_rejects_with_400() {
        let mock = MockTransport::new();
        mock.mock(None, "http://api.example.org", MockReply::Fail("connection refused".to_string()));
        let client = client_with(&mock, definition());

        let failed = client.call("User", "byId", json!({ "id": 1 })).unwrap().await.unwrap_err();
        assert_eq!(failed.status(), 400);
        assert_eq!(failed.raw_data(), Some("connection refused"));
        assert!(failed.time_elapsed().is_some());
    }

    #[tokio::test]
    async fn error_status_rejects_with_response() {
        let mock = MockTransport::new();
        mock.respond("get", "http://api.example.org/users/404", WireResponse::new(404).body("not found"));
        let client = client_with(&mock, definition());

        let failed = client.call("User", "byId", json!({ "id": 404 })).unwrap().await.unwrap_err();
        assert_eq!(failed.status(), 404);
        assert_eq!(failed.data(), json!("not found"));
    }

    #[tokio::test]
    async fn missing_path_parameter_rejects_naming_it() {
        let mock = MockTransport::new();
        let client = client_with(&mock, definition());

        let failed = client.call("User", "byId", json!({})).unwrap().await.unwrap_err();
        assert_eq!(failed.status(), 400);
        assert!(failed.raw_data().unwrap().contains("(id)"));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn middlewares_are_instantiated_per_call_with_context() {
        struct Counting {
            calls: usize,
        }
        impl Middleware for Counting {
            fn request(&mut self, request: Request) -> Request {
                self.calls += 1;
                request.enhance(RequestOverrides::default().header("x-calls", self.calls as u64))
            }
        }

        let created = Arc::new(AtomicUsize::new(0));
        let contexts: Arc<Mutex<Vec<MiddlewareContext>>> = Arc::default();
        let (created_in, contexts_in) = (Arc::clone(&created), Arc::clone(&contexts));

        let mock = MockTransport::new();
        mock.mock(None, "http://api.example.org", MockReply::Respond(WireResponse::new(200)));
        let client = ClientBuilder::new(definition())
            .gateway(TransportGateway::shared(mock.clone()))
            .middleware(factory(move |context: &MiddlewareContext| {
                created_in.fetch_add(1, Ordering::SeqCst);
                contexts_in.lock().unwrap().push(context.clone());
                Counting { calls: 0 }
            }))
            .build()
            .unwrap();

        client.call("User", "byId", json!({ "id": 1 })).unwrap().await.unwrap();
        client.call("User", "remove", json!({ "id": 1 })).unwrap().await.unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 2);
        for sent in mock.requests() {
            assert_eq!(sent.headers["x-calls"], "1");
        }
        let contexts = contexts.lock().unwrap();
        assert_eq!(contexts[0].resource_name, "User");
        assert_eq!(contexts[0].resource_method, "byId");
        assert_eq!(contexts[1].resource_method, "remove");
    }

    #[tokio::test]
    async fn gateway_is_resolved_at_call_time() {
        let first = MockTransport::new();
        first.mock(None, "http://", MockReply::Respond(WireResponse::new(200).body("first")));
        let second = MockTransport::new();
        second.mock(None, "http://", MockReply::Respond(WireResponse::new(200).body("second")));

        let current: Arc<Mutex<Arc<dyn GatewayFactory>>> =
            Arc::new(Mutex::new(TransportGateway::shared(first)));
        let slot = Arc::clone(&current);
        let client = ClientBuilder::new(definition())
            .gateway_resolver(move || Some(Arc::clone(&slot.lock().unwrap())))
            .build()
            .unwrap();

        let response = client.call("User", "byId", json!({ "id": 1 })).unwrap().await.unwrap();
        assert_eq!(response.raw_data(), Some("first"));

        *current.lock().unwrap() = TransportGateway::shared(second);
        let response = client.call("User", "byId", json!({ "id": 1 })).unwrap().await.unwrap();
        assert_eq!(response.raw_data(), Some("second"));
    }

    #[test]
    fn build_fails_without_gateway() {
        let configs = Configs {
            gateway: None,
            ..Configs::default()
        };
        let err = ClientBuilder::new(definition()).configs(configs).build().err().unwrap();
        assert!(matches!(err, Error::GatewayNotConfigured));
    }

    #[test]
    fn build_fails_on_missing_path() {
        let definition = ManifestDefinition::from_value(json!({
            "host": "http://api.example.org",
            "resources": { "User": { "all": { "method": "get" } } },
        }))
        .unwrap();
        let err = client_result(definition).err().unwrap();
        assert!(matches!(err, Error::MissingPath { .. }));
    }

    fn client_result(definition: ManifestDefinition) -> Result<Client> {
        ClientBuilder::new(definition)
            .gateway(TransportGateway::shared(MockTransport::new()))
            .build()
    }

    #[test]
    fn unknown_names_are_reported() {
        let client = client_result(definition()).unwrap();
        assert!(matches!(client.resource("Post"), Err(Error::UnknownResource(_))));
        assert!(matches!(
            client.resource("User").unwrap().method("update"),
            Err(Error::UnknownMethod { .. })
        ));
        assert_eq!(client.manifest().host(), "http://api.example.org");
        let names: Vec<_> = client.resource("User").unwrap().methods().map(ResourceMethod::name).collect();
        assert_eq!(names, vec!["byId", "remove"]);
    }
}
