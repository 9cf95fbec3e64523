//! Error types for the admission gate.
//!
//! Two disjoint channels:
//!
//! - [`ConfigError`]: raised while *building* a generation.  It aborts
//!   `configure`/`reconfigure` and never reaches a request.
//! - [`ValidationError`]: raised by a scheme for *one request*.  The gate
//!   always converts it into a [`Rejected`](crate::Outcome::Rejected)
//!   outcome; it is never propagated to the caller as a failure.
//!
//! [`GateError`] is what the gate's lifecycle operations return.

use thiserror::Error;

use crate::spec::Scheme;

/// Construction-time error: the configuration cannot produce a generation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// None of the five scheme sections is present.
    #[error("none of the validations are defined")]
    Empty,

    /// A scheme section is structurally invalid.
    #[error("{scheme} spec is invalid: {reason}")]
    InvalidSpec { scheme: Scheme, reason: String },

    /// A header regular expression does not compile.
    #[error("header '{header}' has an invalid regexp: {source}")]
    InvalidPattern {
        header: String,
        #[source]
        source: regex::Error,
    },

    /// Key material (secret, public key) could not be decoded.
    #[error("{scheme} key material is invalid: {reason}")]
    InvalidKey { scheme: Scheme, reason: String },

    /// The OAuth2 introspection endpoint is not a usable URL.
    #[error("oauth2 introspection endpoint '{endpoint}' is invalid: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The basic-auth credential file could not be loaded.
    #[error("credential file '{path}' cannot be loaded: {reason}")]
    CredentialStore { path: String, reason: String },

    /// The credential-file watcher could not be started.
    #[error("file watcher failed: {0}")]
    Watcher(#[from] notify::Error),

    /// The configuration file could not be read or parsed.
    #[error(transparent)]
    Load(#[from] vigil_kernel::config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(scheme: Scheme, reason: impl Into<String>) -> Self {
        ConfigError::InvalidSpec {
            scheme,
            reason: reason.into(),
        }
    }

    pub(crate) fn key(scheme: Scheme, reason: impl Into<String>) -> Self {
        ConfigError::InvalidKey {
            scheme,
            reason: reason.into(),
        }
    }
}

/// Request-time rejection reason produced by a single scheme.
///
/// The `Display` text ends up in the diagnostic tag; it must be safe to log
/// and is never written to the response body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The credential or field the scheme needs is absent.
    #[error("{0}")]
    Missing(String),

    /// The credential is present but wrong.
    #[error("{0}")]
    Invalid(String),

    /// The credential was valid once but is no longer.
    #[error("{0}")]
    Expired(String),

    /// A collaborator the scheme depends on could not be reached.
    #[error("{0}")]
    Unavailable(String),

    /// The per-request deadline cancelled the scheme call.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The scheme failed unexpectedly; the request is rejected (fail-closed).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ValidationError {
    pub(crate) fn missing(reason: impl Into<String>) -> Self {
        ValidationError::Missing(reason.into())
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ValidationError::Invalid(reason.into())
    }
}

/// Error returned by the gate's lifecycle operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GateError {
    /// Building the requested generation failed; the live one is unchanged.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The gate has been released and no longer serves or accepts
    /// configuration.
    #[error("validator gate has been released")]
    Released,
}

/// Result alias for construction-time operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
