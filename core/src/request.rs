//! A method descriptor bound to concrete call arguments.
//!
//! # Design
//! `Request` stores only the shared descriptor and the caller's arguments.
//! Params, path, URL and headers are derived on every access, so a request
//! produced by `enhance` never observes stale values. `enhance` always builds
//! a new value; the original is left untouched so middlewares can layer
//! changes without aliasing each other.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::descriptor::MethodDescriptor;
use crate::error::{Error, Result};
use crate::query::{scalar_text, to_query_string};

/// A resolvable call: descriptor plus arguments.
#[derive(Debug, Clone)]
pub struct Request {
    descriptor: Arc<MethodDescriptor>,
    args: Map<String, Value>,
}

impl Request {
    pub fn new(descriptor: Arc<MethodDescriptor>, args: Map<String, Value>) -> Self {
        Self { descriptor, args }
    }

    /// Builds a request from any JSON value; non-objects count as no arguments.
    pub fn from_value(descriptor: Arc<MethodDescriptor>, args: Value) -> Self {
        match args {
            Value::Object(map) => Self::new(descriptor, map),
            _ => Self::new(descriptor, Map::new()),
        }
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// The raw caller arguments, reserved attributes included.
    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// Descriptor default params overlaid with caller args, minus reserved keys.
    pub fn params(&self) -> Map<String, Value> {
        let mut params = self.descriptor.params.clone();
        for (key, value) in &self.args {
            params.insert(key.clone(), value.clone());
        }
        params.retain(|key, _| !self.descriptor.is_reserved(key));
        params
    }

    pub fn method(&self) -> String {
        self.descriptor.method.to_lowercase()
    }

    pub fn host(&self) -> &str {
        let host = &self.descriptor.host;
        host.strip_suffix('/').unwrap_or(host)
    }

    /// Resolves the path template and appends unconsumed params as a query.
    ///
    /// Placeholder values go into the path verbatim, unlike query params.
    /// Callers that route on free text must escape it themselves; a value
    /// such as `"a b"` yields a path no transport will accept.
    pub fn path(&self) -> Result<String> {
        let mut path = if self.descriptor.path.starts_with('/') {
            self.descriptor.path.clone()
        } else {
            format!("/{}", self.descriptor.path)
        };

        let mut params = self.params();
        let consumed: Vec<String> = params
            .iter()
            .filter(|(_, value)| !value.is_null())
            .filter_map(|(key, value)| {
                let placeholder = format!("{{{key}}}");
                path.contains(&placeholder).then(|| {
                    path = path.replace(&placeholder, &scalar_text(value));
                    key.clone()
                })
            })
            .collect();
        for key in &consumed {
            params.shift_remove(key);
        }

        if let Some(name) = crate::descriptor::placeholders(&path).into_iter().next() {
            return Err(Error::MissingParameter { name, path });
        }

        let query = to_query_string(&params);
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query);
        }
        Ok(path)
    }

    pub fn url(&self) -> Result<String> {
        Ok(format!("{}{}", self.host(), self.path()?))
    }

    /// Descriptor headers overlaid with the caller's header argument, with
    /// every name lower-cased.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        let caller = self
            .args
            .get(&self.descriptor.headers_attr)
            .and_then(Value::as_object);
        for source in std::iter::once(&self.descriptor.headers).chain(caller) {
            for (name, value) in source {
                if !value.is_null() {
                    headers.insert(name.to_lowercase(), scalar_text(value));
                }
            }
        }
        headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.reserved(&self.descriptor.body_attr)
    }

    pub fn auth(&self) -> Option<&Value> {
        self.reserved(&self.descriptor.auth_attr)
    }

    /// The timeout argument, read as whole milliseconds.
    pub fn timeout(&self) -> Option<Duration> {
        self.reserved(&self.descriptor.timeout_attr)
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    fn reserved(&self, attr: &str) -> Option<&Value> {
        self.args.get(attr).filter(|value| !value.is_null())
    }

    /// Returns a new request with `overrides` merged in.
    ///
    /// Params and headers are merged; body, auth and timeout are replaced only
    /// by truthy values.
    pub fn enhance(&self, overrides: RequestOverrides) -> Request {
        let descriptor = &self.descriptor;
        let mut args = self.args.clone();
        for (key, value) in overrides.params {
            args.insert(key, value);
        }

        let mut headers = self
            .args
            .get(&descriptor.headers_attr)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (key, value) in overrides.headers {
            headers.insert(key, value);
        }
        args.insert(descriptor.headers_attr.clone(), Value::Object(headers));

        let replacements = [
            (&descriptor.body_attr, overrides.body),
            (&descriptor.auth_attr, overrides.auth),
            (&descriptor.timeout_attr, overrides.timeout),
        ];
        for (attr, value) in replacements {
            if let Some(value) = value.filter(is_truthy) {
                args.insert(attr.clone(), value);
            }
        }

        Request::new(Arc::clone(&self.descriptor), args)
    }
}

/// Changes a middleware wants layered onto a request.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    pub params: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub body: Option<Value>,
    pub auth: Option<Value>,
    pub timeout: Option<Value>,
}

impl RequestOverrides {
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn auth(mut self, auth: impl Into<Value>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    pub fn timeout(mut self, timeout: impl Into<Value>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
