//! Gate configuration.
//!
//! [`ValidatorSpec`] is the serde surface: five optional sections named
//! `headers`, `jwt`, `signature`, `oauth2` and `basicAuth`.  It is converted
//! into a [`GateConfig`], a mapping of enabled [`Scheme`]s that cannot be
//! empty: the only way to obtain one is with a first entry, or by a
//! `TryFrom<ValidatorSpec>` that fails with [`ConfigError::Empty`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::scheme::{BasicAuthSpec, HeaderSpec, JwtSpec, OAuth2Spec, SignatureSpec};

// ─────────────────────────────────────────────────────────────────────────────
// Scheme
// ─────────────────────────────────────────────────────────────────────────────

/// One independent validation scheme.
///
/// The declaration order *is* the evaluation order: cheap stateless checks
/// first, then cryptographic ones, then checks that need an external round
/// trip or a credential store.  `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Headers,
    Jwt,
    Signature,
    OAuth2,
    BasicAuth,
}

impl Scheme {
    /// All schemes in evaluation order.
    pub const PRECEDENCE: [Scheme; 5] = [
        Scheme::Headers,
        Scheme::Jwt,
        Scheme::Signature,
        Scheme::OAuth2,
        Scheme::BasicAuth,
    ];

    /// HTTP status used when this scheme rejects a request.
    ///
    /// Header failures are a request-shape problem (400); every other scheme
    /// failed to establish an identity (401).
    pub fn status_code(self) -> u16 {
        match self {
            Scheme::Headers => 400,
            Scheme::Jwt | Scheme::Signature | Scheme::OAuth2 | Scheme::BasicAuth => 401,
        }
    }

    /// Label used in diagnostic tags: `"<label> validator: <reason>"`.
    pub fn label(self) -> &'static str {
        match self {
            Scheme::Headers => "header",
            Scheme::Jwt => "JWT",
            Scheme::Signature => "signature",
            Scheme::OAuth2 => "oauth2",
            Scheme::BasicAuth => "http basic",
        }
    }

    /// Name of the configuration section enabling this scheme.
    pub fn section(self) -> &'static str {
        match self {
            Scheme::Headers => "headers",
            Scheme::Jwt => "jwt",
            Scheme::Signature => "signature",
            Scheme::OAuth2 => "oauth2",
            Scheme::BasicAuth => "basicAuth",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SchemeSpec
// ─────────────────────────────────────────────────────────────────────────────

/// Settings of one enabled scheme.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemeSpec {
    Headers(HeaderSpec),
    Jwt(JwtSpec),
    Signature(SignatureSpec),
    OAuth2(OAuth2Spec),
    BasicAuth(BasicAuthSpec),
}

impl SchemeSpec {
    /// The scheme these settings enable.
    pub fn scheme(&self) -> Scheme {
        match self {
            SchemeSpec::Headers(_) => Scheme::Headers,
            SchemeSpec::Jwt(_) => Scheme::Jwt,
            SchemeSpec::Signature(_) => Scheme::Signature,
            SchemeSpec::OAuth2(_) => Scheme::OAuth2,
            SchemeSpec::BasicAuth(_) => Scheme::BasicAuth,
        }
    }
}

impl From<HeaderSpec> for SchemeSpec {
    fn from(spec: HeaderSpec) -> Self {
        SchemeSpec::Headers(spec)
    }
}

impl From<JwtSpec> for SchemeSpec {
    fn from(spec: JwtSpec) -> Self {
        SchemeSpec::Jwt(spec)
    }
}

impl From<SignatureSpec> for SchemeSpec {
    fn from(spec: SignatureSpec) -> Self {
        SchemeSpec::Signature(spec)
    }
}

impl From<OAuth2Spec> for SchemeSpec {
    fn from(spec: OAuth2Spec) -> Self {
        SchemeSpec::OAuth2(spec)
    }
}

impl From<BasicAuthSpec> for SchemeSpec {
    fn from(spec: BasicAuthSpec) -> Self {
        SchemeSpec::BasicAuth(spec)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GateConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable, non-empty set of enabled schemes.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    schemes: BTreeMap<Scheme, SchemeSpec>,
}

impl GateConfig {
    /// Start a configuration with its first scheme.
    pub fn new(first: impl Into<SchemeSpec>) -> Self {
        let first = first.into();
        let mut schemes = BTreeMap::new();
        schemes.insert(first.scheme(), first);
        Self { schemes }
    }

    /// Builder: enable another scheme, replacing earlier settings for it.
    pub fn with(mut self, spec: impl Into<SchemeSpec>) -> Self {
        let spec = spec.into();
        self.schemes.insert(spec.scheme(), spec);
        self
    }

    /// Enabled scheme settings in evaluation order.
    pub fn specs(&self) -> impl Iterator<Item = &SchemeSpec> + '_ {
        self.schemes.values()
    }

    /// Enabled schemes in evaluation order.
    pub fn schemes(&self) -> impl Iterator<Item = Scheme> + '_ {
        self.schemes.keys().copied()
    }

    /// Settings of `scheme`, if enabled.
    pub fn get(&self, scheme: Scheme) -> Option<&SchemeSpec> {
        self.schemes.get(&scheme)
    }

    /// Number of enabled schemes (always at least one).
    pub fn scheme_count(&self) -> usize {
        self.schemes.len()
    }
}

impl TryFrom<ValidatorSpec> for GateConfig {
    type Error = ConfigError;

    fn try_from(spec: ValidatorSpec) -> Result<Self, Self::Error> {
        let ValidatorSpec {
            headers,
            jwt,
            signature,
            oauth2,
            basic_auth,
        } = spec;

        let mut schemes = BTreeMap::new();
        let sections = [
            headers.map(SchemeSpec::Headers),
            jwt.map(SchemeSpec::Jwt),
            signature.map(SchemeSpec::Signature),
            oauth2.map(SchemeSpec::OAuth2),
            basic_auth.map(SchemeSpec::BasicAuth),
        ];
        for spec in sections.into_iter().flatten() {
            schemes.insert(spec.scheme(), spec);
        }

        if schemes.is_empty() {
            return Err(ConfigError::Empty);
        }
        Ok(Self { schemes })
    }
}

impl From<GateConfig> for ValidatorSpec {
    fn from(config: GateConfig) -> Self {
        let mut spec = ValidatorSpec::default();
        for scheme_spec in config.schemes.into_values() {
            match scheme_spec {
                SchemeSpec::Headers(s) => spec.headers = Some(s),
                SchemeSpec::Jwt(s) => spec.jwt = Some(s),
                SchemeSpec::Signature(s) => spec.signature = Some(s),
                SchemeSpec::OAuth2(s) => spec.oauth2 = Some(s),
                SchemeSpec::BasicAuth(s) => spec.basic_auth = Some(s),
            }
        }
        spec
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ValidatorSpec
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration surface of the gate.
///
/// ```yaml
/// headers:
///   X-Api-Key:
///     regexp: "^[a-z0-9]{32}$"
/// jwt:
///   algorithm: HS256
///   secret: "6d792d736563726574"
/// basicAuth:
///   userFile: /etc/vigil/users
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValidatorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<OAuth2Spec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthSpec>,
}

impl ValidatorSpec {
    /// Whether no section is present.
    pub fn is_empty(&self) -> bool {
        self.headers.is_none()
            && self.jwt.is_none()
            && self.signature.is_none()
            && self.oauth2.is_none()
            && self.basic_auth.is_none()
    }

    /// Verify that at least one of the validations is defined.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.is_empty() {
            return Err(ConfigError::Empty);
        }
        Ok(())
    }

    /// Load a spec from a YAML, JSON or TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Ok(vigil_kernel::config::load_config(path)?)
    }
}
