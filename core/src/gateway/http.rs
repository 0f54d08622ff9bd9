//! Server-style transport over `ureq`.
//!
//! `ureq` is blocking, so each exchange runs on the blocking thread pool.
//! Status codes are returned as data, never as errors; the executor decides
//! what counts as success. Bodies are read as bytes and decoded lossily, so
//! a payload that is not UTF-8 still arrives as a response.
//!
//! A blocking exchange cannot be interrupted once started. When the executor
//! cancels first, the thread skips the exchange if it has not begun and
//! discards the outcome if it has.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use ureq::{Agent, RequestBuilder};

use super::{CancelFlag, Transport, TransportError, WireRequest, WireResponse};
use crate::config::{GatewayConfigs, HttpConfigs};

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(
        &self,
        request: WireRequest,
        configs: &GatewayConfigs,
        cancel: CancelFlag,
    ) -> Result<WireResponse, TransportError> {
        let configs = configs.http.clone();
        tokio::task::spawn_blocking(move || {
            let canceled = || TransportError::Timeout(request.timeout.unwrap_or_default());
            if cancel.is_canceled() {
                return Err(canceled());
            }
            let outcome = exchange(&request, &configs);
            if cancel.is_canceled() {
                debug!(url = %request.url, "discarding completion after cancellation");
                return Err(canceled());
            }
            outcome
        })
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?
    }
}

fn agent(timeout: Option<Duration>, configs: &HttpConfigs) -> Agent {
    let mut builder = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(timeout);
    if let Some(max_redirects) = configs.max_redirects {
        builder = builder.max_redirects(max_redirects);
    }
    builder.build().new_agent()
}

fn with_headers<B>(mut builder: RequestBuilder<B>, request: &WireRequest, configs: &HttpConfigs) -> RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(user_agent) = &configs.user_agent {
        if !request.headers.contains_key("user-agent") {
            builder = builder.header("user-agent", user_agent.as_str());
        }
    }
    builder
}

fn exchange(request: &WireRequest, configs: &HttpConfigs) -> Result<WireResponse, TransportError> {
    let agent = agent(request.timeout, configs);
    let url = request.url.as_str();
    let body = request.body.as_deref().unwrap_or_default().as_bytes();

    let result = match request.method.as_str() {
        "get" => with_headers(agent.get(url), request, configs).call(),
        "head" => with_headers(agent.head(url), request, configs).call(),
        "delete" if request.body.is_some() => with_headers(agent.delete(url), request, configs)
            .force_send_body()
            .send(body),
        "delete" => with_headers(agent.delete(url), request, configs).call(),
        "post" => with_headers(agent.post(url), request, configs).send(body),
        "put" => with_headers(agent.put(url), request, configs).send(body),
        "patch" => with_headers(agent.patch(url), request, configs).send(body),
        other => return Err(TransportError::Network(format!("unsupported method \"{other}\""))),
    };

    let mut response = result.map_err(|e| match e {
        ureq::Error::Timeout(_) => TransportError::Timeout(request.timeout.unwrap_or_default()),
        other => TransportError::Network(other.to_string()),
    })?;

    let status = response.status().as_u16();
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match headers.get_mut(name.as_str()) {
            Some(joined) => {
                joined.push_str(", ");
                joined.push_str(&value);
            }
            None => {
                headers.insert(name.as_str().to_string(), value);
            }
        }
    }
    let bytes = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| TransportError::Network(e.to_string()))?;

    Ok(WireResponse {
        status,
        headers,
        body: (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned()),
    })
}
