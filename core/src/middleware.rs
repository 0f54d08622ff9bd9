//! Request/response interceptors.
//!
//! # Design
//! A `Middleware` is instantiated fresh for every call from a
//! `MiddlewareFactory`, so it may keep per-call state in `self` without
//! leaking it into other calls. Both hooks have pass-through defaults.
//!
//! Ordering: request hooks run in registration order. Response hooks wrap
//! the gateway call in reverse registration order, which makes the first
//! registered middleware the outermost layer: its response hook runs last
//! and sees what every later middleware has already done to the outcome.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::request::Request;
use crate::response::Response;

/// Outcome of a call: `Ok` for successful responses, `Err` for failures.
pub type CallResult = Result<Response, Response>;

pub type ResponseFuture = BoxFuture<'static, CallResult>;

/// Producer of the inner layers' outcome.
pub type Next = Box<dyn FnOnce() -> ResponseFuture + Send>;

/// Which generated method a middleware instance was created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareContext {
    pub resource_name: String,
    pub resource_method: String,
}

pub trait Middleware: Send {
    /// Rewrites the outgoing request.
    fn request(&mut self, request: Request) -> Request {
        request
    }

    /// Wraps the inner layers; `next` yields their outcome.
    fn response(self: Box<Self>, next: Next) -> ResponseFuture {
        next()
    }
}

pub type MiddlewareFactory = Arc<dyn Fn(&MiddlewareContext) -> Box<dyn Middleware> + Send + Sync>;

/// Wraps a constructor closure as a factory.
pub fn factory<M, F>(build: F) -> MiddlewareFactory
where
    M: Middleware + 'static,
    F: Fn(&MiddlewareContext) -> M + Send + Sync + 'static,
{
    Arc::new(move |context: &MiddlewareContext| Box::new(build(context)) as Box<dyn Middleware>)
}

struct RequestFn<F>(F);

impl<F> Middleware for RequestFn<F>
where
    F: Fn(Request) -> Request + Send,
{
    fn request(&mut self, request: Request) -> Request {
        (self.0)(request)
    }
}

/// A middleware that only rewrites requests.
pub fn request_fn<F>(hook: F) -> MiddlewareFactory
where
    F: Fn(Request) -> Request + Clone + Send + Sync + 'static,
{
    factory(move |_: &MiddlewareContext| RequestFn(hook.clone()))
}

struct ResponseFn<F>(F);

impl<F> Middleware for ResponseFn<F>
where
    F: FnOnce(Next) -> ResponseFuture + Send,
{
    fn response(self: Box<Self>, next: Next) -> ResponseFuture {
        (self.0)(next)
    }
}

/// A middleware that only wraps responses.
pub fn response_fn<F>(hook: F) -> MiddlewareFactory
where
    F: Fn(Next) -> ResponseFuture + Clone + Send + Sync + 'static,
{
    factory(move |_: &MiddlewareContext| ResponseFn(hook.clone()))
}

/// One call's worth of middleware instances.
pub(crate) struct Chain {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl Chain {
    pub(crate) fn instantiate(factories: &[MiddlewareFactory], context: &MiddlewareContext) -> Self {
        Self {
            middlewares: factories.iter().map(|factory| factory(context)).collect(),
        }
    }

    /// Runs the request hooks in registration order.
    pub(crate) fn run_request_phase(&mut self, request: Request) -> Request {
        self.middlewares
            .iter_mut()
            .fold(request, |request, middleware| middleware.request(request))
    }

    /// Wraps `gateway` in the response hooks and returns the outermost producer.
    pub(crate) fn wrap_response_phase(self, gateway: Next) -> Next {
        self.middlewares.into_iter().rev().fold(gateway, |next, middleware| {
            Box::new(move || middleware.response(next)) as Next
        })
    }
}
