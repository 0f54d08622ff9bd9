//! Error types for manifest building and request resolution.
//!
//! # Design
//! `Error` only covers configuration mistakes: a manifest that cannot be
//! built, a path template that cannot be resolved, a gateway that was never
//! configured. Everything that goes wrong while a call is in flight is
//! reported as a `Response` instead, so middleware response hooks can inspect
//! failures the same way they inspect successes.

use thiserror::Error;

/// Configuration and resolution errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The manifest input could not be interpreted.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A method config has no `path`, or an empty one.
    #[error("path is undefined for resource \"{resource}\" method \"{method}\"")]
    MissingPath { resource: String, method: String },

    /// A path placeholder shares its name with a reserved attribute, so it
    /// could never be routed.
    #[error(
        "placeholder {{{placeholder}}} in resource \"{resource}\" method \"{method}\" collides with a reserved attribute"
    )]
    ReservedPlaceholder {
        resource: String,
        method: String,
        placeholder: String,
    },

    /// A `{placeholder}` in the path template had no matching parameter.
    #[error("required parameter missing ({name}), \"{path}\" cannot be resolved")]
    MissingParameter { name: String, path: String },

    /// No gateway factory was available when the client was built.
    #[error("gateway not configured")]
    GatewayNotConfigured,

    #[error("unknown resource \"{0}\"")]
    UnknownResource(String),

    #[error("unknown method \"{method}\" for resource \"{resource}\"")]
    UnknownMethod { resource: String, method: String },

    /// The manifest JSON did not match the expected shape.
    #[error("manifest deserialization failed: {0}")]
    Deserialize(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
