//! In-memory transport for tests.
//!
//! Replies are matched by method and URL prefix in registration order.
//! Clones share routes and the request log, so a test can keep one handle
//! and give another to the client.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{CancelFlag, Transport, TransportError, WireRequest, WireResponse};
use crate::config::GatewayConfigs;

#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(WireResponse),
    /// Fails as a network error with this message.
    Fail(String),
    /// Never completes.
    Hang,
}

#[derive(Debug, Clone)]
struct Route {
    method: Option<String>,
    url_prefix: String,
    reply: MockReply,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<WireRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `reply` for requests whose URL starts with `url_prefix`.
    /// `method` of `None` matches any method.
    pub fn mock(&self, method: Option<&str>, url_prefix: impl Into<String>, reply: MockReply) -> &Self {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).push(Route {
            method: method.map(str::to_lowercase),
            url_prefix: url_prefix.into(),
            reply,
        });
        self
    }

    pub fn respond(&self, method: &str, url_prefix: impl Into<String>, response: WireResponse) -> &Self {
        self.mock(Some(method), url_prefix, MockReply::Respond(response))
    }

    /// Every request seen so far, oldest first.
    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn find(&self, request: &WireRequest) -> Option<MockReply> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|route| {
                route.method.as_deref().map_or(true, |method| method == request.method)
                    && request.url.starts_with(&route.url_prefix)
            })
            .map(|route| route.reply.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(
        &self,
        request: WireRequest,
        _configs: &GatewayConfigs,
        _cancel: CancelFlag,
    ) -> Result<WireResponse, TransportError> {
        let reply = self.find(&request);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(message)) => Err(TransportError::Network(message)),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Ok(WireResponse::new(404).body(format!("no mock for {} {}", request.method, request.url))),
        }
    }
}
