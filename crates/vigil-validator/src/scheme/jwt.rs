//! JWT validation.
//!
//! The token is read from the cookie named `cookieName` when configured,
//! otherwise from `Authorization: Bearer <token>`.  Signature, algorithm,
//! `exp`/`nbf` (when present) and the configured issuer/audience are
//! verified.
//!
//! # Key material
//!
//! - `HS256`/`HS384`/`HS512`: `secret`, hex encoded
//! - `RS*`/`PS*`/`ES*`/`EdDSA`: `publicKey`, PEM encoded

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use vigil_kernel::gateway::GatewayRequest;

use super::SchemeValidator;
use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::spec::Scheme;

/// Default clock-skew allowance for `exp`/`nbf`.
const DEFAULT_LEEWAY_SECS: u64 = 60;

/// `jwt` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JwtSpec {
    /// Signing algorithm, e.g. `HS256`, `RS256`, `ES256`, `EdDSA`.
    pub algorithm: String,

    /// PEM public key for asymmetric algorithms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Hex-encoded secret for HMAC algorithms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Cookie carrying the token; falls back to the `Authorization` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_name: Option<String>,

    /// Required `iss` claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Required `aud` claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// Leeway in seconds for `exp`/`nbf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leeway_secs: Option<u64>,
}

impl JwtSpec {
    /// HMAC-signed tokens with a hex-encoded secret.
    pub fn hmac(algorithm: impl Into<String>, secret_hex: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            public_key: None,
            secret: Some(secret_hex.into()),
            cookie_name: None,
            issuer: None,
            audience: None,
            leeway_secs: None,
        }
    }

    /// Asymmetrically signed tokens verified with a PEM public key.
    pub fn public_key(algorithm: impl Into<String>, pem: impl Into<String>) -> Self {
        Self {
            public_key: Some(pem.into()),
            secret: None,
            ..Self::hmac(algorithm, String::new())
        }
    }

    /// Builder: read the token from this cookie first.
    pub fn with_cookie(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    /// Builder: require this issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Builder: require this audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TokenVerifier (also used by the OAuth2 self-encoded mode)
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

pub(crate) struct VerifierParams<'a> {
    pub algorithm: &'a str,
    pub secret: Option<&'a str>,
    pub public_key: Option<&'a str>,
    pub issuer: Option<&'a str>,
    pub audience: Option<&'a str>,
    pub leeway_secs: u64,
}

impl TokenVerifier {
    pub(crate) fn new(scheme: Scheme, params: VerifierParams<'_>) -> ConfigResult<Self> {
        let algorithm: Algorithm = params.algorithm.parse().map_err(|_| {
            ConfigError::invalid(
                scheme,
                format!("unsupported algorithm '{}'", params.algorithm),
            )
        })?;

        let key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = params
                    .secret
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ConfigError::key(scheme, "HMAC algorithms need a secret"))?;
                let bytes = hex::decode(secret)
                    .map_err(|e| ConfigError::key(scheme, format!("secret is not hex: {e}")))?;
                DecodingKey::from_secret(&bytes)
            }
            Algorithm::ES256 | Algorithm::ES384 => {
                DecodingKey::from_ec_pem(public_pem(scheme, params.public_key)?)
                    .map_err(|e| ConfigError::key(scheme, e.to_string()))?
            }
            Algorithm::EdDSA => DecodingKey::from_ed_pem(public_pem(scheme, params.public_key)?)
                .map_err(|e| ConfigError::key(scheme, e.to_string()))?,
            _ => DecodingKey::from_rsa_pem(public_pem(scheme, params.public_key)?)
                .map_err(|e| ConfigError::key(scheme, e.to_string()))?,
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = params.leeway_secs;
        // `exp`/`nbf` are checked when present but not mandatory.
        validation.required_spec_claims.clear();
        validation.validate_nbf = true;
        if let Some(iss) = params.issuer {
            validation.set_issuer(&[iss]);
        }
        match params.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        Ok(Self { key, validation })
    }

    pub(crate) fn verify(&self, token: &str) -> Result<(), ValidationError> {
        decode::<serde_json::Value>(token, &self.key, &self.validation)
            .map(|_| ())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ValidationError::Expired("token has expired".into()),
                ErrorKind::ImmatureSignature => {
                    ValidationError::invalid("token is not valid yet")
                }
                _ => ValidationError::invalid(format!("invalid token: {e}")),
            })
    }
}

fn public_pem<'a>(scheme: Scheme, pem: Option<&'a str>) -> ConfigResult<&'a [u8]> {
    pem.filter(|p| !p.trim().is_empty())
        .map(str::as_bytes)
        .ok_or_else(|| ConfigError::key(scheme, "asymmetric algorithms need a publicKey"))
}

// ─────────────────────────────────────────────────────────────────────────────
// JwtValidator
// ─────────────────────────────────────────────────────────────────────────────

/// Validator for the `jwt` section.
pub struct JwtValidator {
    verifier: TokenVerifier,
    cookie_name: Option<String>,
}

impl JwtValidator {
    pub fn new(spec: &JwtSpec) -> ConfigResult<Self> {
        let verifier = TokenVerifier::new(
            Scheme::Jwt,
            VerifierParams {
                algorithm: &spec.algorithm,
                secret: spec.secret.as_deref(),
                public_key: spec.public_key.as_deref(),
                issuer: spec.issuer.as_deref(),
                audience: spec.audience.as_deref(),
                leeway_secs: spec.leeway_secs.unwrap_or(DEFAULT_LEEWAY_SECS),
            },
        )?;

        Ok(Self {
            verifier,
            cookie_name: spec.cookie_name.clone().filter(|c| !c.is_empty()),
        })
    }

    fn extract_token<'r>(&self, request: &'r GatewayRequest) -> Option<&'r str> {
        self.cookie_name
            .as_deref()
            .and_then(|name| request.cookie(name))
            .filter(|t| !t.is_empty())
            .or_else(|| request.bearer_token())
    }
}

#[async_trait]
impl SchemeValidator for JwtValidator {
    fn scheme(&self) -> Scheme {
        Scheme::Jwt
    }

    async fn validate(&self, request: &GatewayRequest) -> Result<(), ValidationError> {
        let token = self.extract_token(request).ok_or_else(|| {
            ValidationError::missing("no token found in cookie or authorization header")
        })?;
        self.verifier.verify(token)
    }
}
