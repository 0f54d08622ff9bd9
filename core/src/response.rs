//! Transport-agnostic response wrapper.
//!
//! # Design
//! Every gateway, whatever its transport, reports its outcome as a
//! `Response`: the originating `Request`, a numeric status, the raw body and
//! the headers as received. Normalization (status quirks, header case, JSON
//! decoding) happens in the accessors, never at construction, so an enhanced
//! copy always reflects the values it was built from.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::request::Request;

/// Status some legacy user agents report in place of 204.
const NO_CONTENT_QUIRK: u16 = 1223;

#[derive(Debug, Clone)]
pub struct Response {
    request: Request,
    status: u16,
    data: Option<String>,
    headers: BTreeMap<String, String>,
    time_elapsed: Option<Duration>,
}

impl Response {
    pub fn new(request: Request, status: u16, data: Option<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            request,
            status,
            data,
            headers,
            time_elapsed: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn status(&self) -> u16 {
        if self.status == NO_CONTENT_QUIRK {
            204
        } else {
            self.status
        }
    }

    pub fn success(&self) -> bool {
        (200..400).contains(&self.status())
    }

    /// Headers with lower-cased names, rebuilt on every call.
    pub fn headers(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers().remove(&name.to_lowercase())
    }

    pub fn raw_data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// The body decoded as JSON when the content-type says so.
    ///
    /// Falls back to the raw body as a string when it does not parse, and to
    /// `Value::Null` when there is no body.
    pub fn data(&self) -> Value {
        let Some(raw) = self.data.as_deref() else {
            return Value::Null;
        };
        if self.is_content_type_json() {
            if let Ok(parsed) = serde_json::from_str(raw) {
                return parsed;
            }
        }
        Value::String(raw.to_string())
    }

    fn is_content_type_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|content_type| content_type.contains("application/json"))
    }

    /// Wall-clock time of the round trip, set by the executor that ran it.
    pub fn time_elapsed(&self) -> Option<Duration> {
        self.time_elapsed
    }

    pub(crate) fn with_time_elapsed(mut self, elapsed: Duration) -> Self {
        self.time_elapsed = Some(elapsed);
        self
    }

    /// Returns a new response with `overrides` applied.
    ///
    /// The originating request is kept; status and body are replaced only if
    /// supplied; headers are merged.
    pub fn enhance(&self, overrides: ResponseOverrides) -> Response {
        let mut headers = self.headers();
        for (name, value) in overrides.headers {
            headers.insert(name.to_lowercase(), value);
        }
        Response {
            request: self.request.clone(),
            status: overrides.status.unwrap_or_else(|| self.status()),
            data: overrides.raw_data.or_else(|| self.data.clone()),
            headers,
            time_elapsed: self.time_elapsed,
        }
    }
}

/// Changes a middleware wants layered onto a response.
#[derive(Debug, Clone, Default)]
pub struct ResponseOverrides {
    pub status: Option<u16>,
    pub raw_data: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl ResponseOverrides {
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn raw_data(mut self, data: impl Into<String>) -> Self {
        self.raw_data = Some(data.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
