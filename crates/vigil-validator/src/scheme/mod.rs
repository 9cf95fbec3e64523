//! Scheme validators.
//!
//! Each scheme is an independent check that knows nothing about the others.
//! The gate builds one validator per enabled scheme through a
//! [`SchemeFactory`] and calls them in precedence order.
//!
//! | Section     | Validator               | Checks                                  |
//! |-------------|-------------------------|-----------------------------------------|
//! | `headers`   | [`HeaderValidator`]     | presence / allowed values / regexp      |
//! | `jwt`       | [`JwtValidator`]        | JWT signature and registered claims     |
//! | `signature` | [`SignatureValidator`]  | HMAC-SHA256 request signature           |
//! | `oauth2`    | [`OAuth2Validator`]     | token introspection or self-encoded JWT |
//! | `basicAuth` | [`BasicAuthValidator`]  | credential file, reloaded on change     |

mod basic_auth;
mod header;
mod jwt;
mod oauth2;
mod signature;

pub use basic_auth::{BasicAuthSpec, BasicAuthValidator};
pub use header::{HeaderSpec, HeaderValidator, ValueValidator};
pub use jwt::{JwtSpec, JwtValidator};
pub use oauth2::{OAuth2JwtSpec, OAuth2Spec, OAuth2Validator, TokenIntrospectSpec};
pub use signature::{SignatureSpec, SignatureValidator, Signer};

use async_trait::async_trait;
use vigil_kernel::gateway::GatewayRequest;

use crate::error::{ConfigResult, ValidationError};
use crate::spec::{Scheme, SchemeSpec};

/// A single validation scheme.
///
/// `validate` reports *why this request* is rejected; it has no other failure
/// channel.  Implementations are shared by every concurrent evaluation and
/// synchronize any internal caches themselves.
#[async_trait]
pub trait SchemeValidator: Send + Sync {
    /// The scheme this validator implements.
    fn scheme(&self) -> Scheme;

    /// Check one request.
    async fn validate(&self, request: &GatewayRequest) -> Result<(), ValidationError>;

    /// Release background resources.  Must be idempotent.
    fn release(&self) {}
}

/// Builds scheme validators from their settings.
pub trait SchemeFactory: Send + Sync {
    /// Construct the validator for `spec`.
    fn build(&self, spec: &SchemeSpec) -> ConfigResult<Box<dyn SchemeValidator>>;
}

/// Factory for the five built-in schemes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSchemes;

impl SchemeFactory for BuiltinSchemes {
    fn build(&self, spec: &SchemeSpec) -> ConfigResult<Box<dyn SchemeValidator>> {
        Ok(match spec {
            SchemeSpec::Headers(s) => Box::new(HeaderValidator::new(s)?),
            SchemeSpec::Jwt(s) => Box::new(JwtValidator::new(s)?),
            SchemeSpec::Signature(s) => Box::new(SignatureValidator::new(s)?),
            SchemeSpec::OAuth2(s) => Box::new(OAuth2Validator::new(s)?),
            SchemeSpec::BasicAuth(s) => Box::new(BasicAuthValidator::new(s)?),
        })
    }
}
