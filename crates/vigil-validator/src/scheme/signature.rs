//! HMAC-SHA256 request signatures.
//!
//! A signed request carries
//!
//! ```text
//! x-vgl-date: 20250102T030405Z
//! Authorization: VGL-HMAC-SHA256 Credential=<keyId>/<yyyymmdd>/<scope>,
//!                SignedHeaders=host;x-vgl-date, Signature=<hex>
//! ```
//!
//! The signature covers a canonical form of the request:
//!
//! ```text
//! canonical request = METHOD \n path \n sorted query \n
//!                     name:value\n for each signed header \n
//!                     signed;headers \n hex(sha256(body)) | UNSIGNED-PAYLOAD
//! string to sign    = VGL-HMAC-SHA256 \n date \n yyyymmdd/scope \n
//!                     hex(sha256(canonical request))
//! signing key       = HMAC(HMAC("VGL" + secret, yyyymmdd), scope)
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;
use vigil_kernel::gateway::GatewayRequest;

use super::SchemeValidator;
use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::spec::Scheme;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "VGL-HMAC-SHA256";
const DATE_HEADER: &str = "x-vgl-date";
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";
const SIGNING_KEY_PREFIX: &str = "VGL";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const DEFAULT_SCOPE_SUFFIX: &str = "vigil_request";
const DEFAULT_TTL_SECS: u64 = 900;

/// `signature` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignatureSpec {
    /// Access key id → secret.
    pub access_keys: BTreeMap<String, String>,

    /// Maximum distance between the signed date and now, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,

    /// Last component of the credential scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_suffix: Option<String>,

    /// Sign `UNSIGNED-PAYLOAD` instead of the body hash.
    #[serde(default)]
    pub exclude_body: bool,

    /// Headers every request must sign in addition to `x-vgl-date`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_headers: Vec<String>,
}

impl SignatureSpec {
    /// Spec with a single access key.
    pub fn with_key(key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        let mut access_keys = BTreeMap::new();
        access_keys.insert(key_id.into(), secret.into());
        Self {
            access_keys,
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Canonical form
// ─────────────────────────────────────────────────────────────────────────────

fn compute_hmac(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn canonical_query(query: Option<&str>) -> String {
    let mut pairs: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty())
        .collect();
    pairs.sort_unstable();
    pairs.join("&")
}

fn payload_hash(request: &GatewayRequest, exclude_body: bool) -> String {
    if exclude_body {
        UNSIGNED_PAYLOAD.to_string()
    } else {
        hex::encode(Sha256::digest(&request.body))
    }
}

struct Canonical<'a> {
    request: &'a GatewayRequest,
    signed_headers: &'a [String],
    date: &'a str,
    scope_date: &'a str,
    scope_suffix: &'a str,
    exclude_body: bool,
}

impl Canonical<'_> {
    fn string_to_sign(&self) -> String {
        let mut headers = String::new();
        for name in self.signed_headers {
            let value = self.request.header(name).unwrap_or_default().trim();
            headers.push_str(name);
            headers.push(':');
            headers.push_str(value);
            headers.push('\n');
        }

        let canonical_request = [
            self.request.method.as_str().to_string(),
            self.request.path.clone(),
            canonical_query(self.request.query.as_deref()),
            headers,
            self.signed_headers.join(";"),
            payload_hash(self.request, self.exclude_body),
        ]
        .join("\n");

        [
            ALGORITHM.to_string(),
            self.date.to_string(),
            format!("{}/{}", self.scope_date, self.scope_suffix),
            hex::encode(Sha256::digest(canonical_request.as_bytes())),
        ]
        .join("\n")
    }

    fn signature(&self, secret: &str) -> Result<Vec<u8>, hmac::digest::InvalidLength> {
        let date_key = compute_hmac(
            format!("{SIGNING_KEY_PREFIX}{secret}").as_bytes(),
            self.scope_date.as_bytes(),
        )?;
        let signing_key = compute_hmac(&date_key, self.scope_suffix.as_bytes())?;
        compute_hmac(&signing_key, self.string_to_sign().as_bytes())
    }
}

struct Authorization<'a> {
    key_id: &'a str,
    scope_date: &'a str,
    scope_suffix: &'a str,
    signed_headers: Vec<String>,
    signature: &'a str,
}

fn parse_authorization(value: &str) -> Result<Authorization<'_>, ValidationError> {
    let rest = value
        .strip_prefix(ALGORITHM)
        .and_then(|r| r.strip_prefix(' '))
        .ok_or_else(|| ValidationError::invalid("unsupported signing algorithm"))?;

    let (mut credential, mut signed_headers, mut signature) = (None, None, None);
    for part in rest.split(',') {
        let Some((key, val)) = part.trim().split_once('=') else {
            return Err(ValidationError::invalid("malformed authorization header"));
        };
        match key {
            "Credential" => credential = Some(val),
            "SignedHeaders" => signed_headers = Some(val),
            "Signature" => signature = Some(val),
            _ => {}
        }
    }

    let credential =
        credential.ok_or_else(|| ValidationError::invalid("credential not found"))?;
    let mut scope = credential.splitn(3, '/');
    let (Some(key_id), Some(scope_date), Some(scope_suffix)) =
        (scope.next(), scope.next(), scope.next())
    else {
        return Err(ValidationError::invalid("malformed credential"));
    };

    Ok(Authorization {
        key_id,
        scope_date,
        scope_suffix,
        signed_headers: signed_headers
            .ok_or_else(|| ValidationError::invalid("signed headers not found"))?
            .split(';')
            .filter(|h| !h.is_empty())
            .map(str::to_lowercase)
            .collect(),
        signature: signature.ok_or_else(|| ValidationError::invalid("signature not found"))?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// SignatureValidator
// ─────────────────────────────────────────────────────────────────────────────

/// Validator for the `signature` section.
pub struct SignatureValidator {
    access_keys: BTreeMap<String, String>,
    ttl: chrono::Duration,
    scope_suffix: String,
    exclude_body: bool,
    required_headers: Vec<String>,
}

impl SignatureValidator {
    pub fn new(spec: &SignatureSpec) -> ConfigResult<Self> {
        if spec.access_keys.is_empty() {
            return Err(ConfigError::invalid(
                Scheme::Signature,
                "at least one access key must be specified",
            ));
        }
        if let Some((id, _)) = spec
            .access_keys
            .iter()
            .find(|(id, secret)| id.is_empty() || secret.is_empty())
        {
            return Err(ConfigError::key(
                Scheme::Signature,
                format!("access key '{id}' has an empty id or secret"),
            ));
        }

        let ttl_secs = spec.ttl_secs.unwrap_or(DEFAULT_TTL_SECS);
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| ConfigError::invalid(Scheme::Signature, "ttlSecs is out of range"))?;

        let scope_suffix = spec
            .scope_suffix
            .clone()
            .unwrap_or_else(|| DEFAULT_SCOPE_SUFFIX.to_string());
        if scope_suffix.contains('/') {
            return Err(ConfigError::invalid(
                Scheme::Signature,
                "scopeSuffix must not contain '/'",
            ));
        }

        Ok(Self {
            access_keys: spec.access_keys.clone(),
            ttl,
            scope_suffix,
            exclude_body: spec.exclude_body,
            required_headers: spec
                .required_headers
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
        })
    }

    fn verify_at(&self, request: &GatewayRequest, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let header = request
            .header("authorization")
            .ok_or_else(|| ValidationError::missing("authorization header not found"))?;
        let auth = parse_authorization(header)?;

        let secret = self
            .access_keys
            .get(auth.key_id)
            .ok_or_else(|| ValidationError::invalid("unknown access key"))?;

        let date = request
            .header(DATE_HEADER)
            .ok_or_else(|| ValidationError::missing(format!("{DATE_HEADER} header not found")))?;
        let signed_at = NaiveDateTime::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| ValidationError::invalid(format!("malformed {DATE_HEADER} header")))?
            .and_utc();
        if (now - signed_at).abs() > self.ttl {
            return Err(ValidationError::Expired("signature has expired".into()));
        }

        if auth.scope_date != signed_at.format(SCOPE_DATE_FORMAT).to_string()
            || auth.scope_suffix != self.scope_suffix
        {
            return Err(ValidationError::invalid("credential scope mismatch"));
        }

        for required in std::iter::once(DATE_HEADER).chain(self.required_headers.iter().map(String::as_str)) {
            if !auth.signed_headers.iter().any(|h| h == required) {
                return Err(ValidationError::invalid(format!(
                    "header {required} must be signed"
                )));
            }
        }
        if let Some(absent) = auth
            .signed_headers
            .iter()
            .find(|h| request.header(h).is_none())
        {
            return Err(ValidationError::invalid(format!(
                "signed header {absent} not found"
            )));
        }

        let provided = hex::decode(auth.signature)
            .map_err(|_| ValidationError::invalid("malformed signature"))?;
        let expected = Canonical {
            request,
            signed_headers: &auth.signed_headers,
            date,
            scope_date: auth.scope_date,
            scope_suffix: &self.scope_suffix,
            exclude_body: self.exclude_body,
        }
        .signature(secret)
        .map_err(|e| ValidationError::Internal(format!("signing key: {e}")))?;

        if expected.len() != provided.len() || !bool::from(expected.ct_eq(provided.as_slice())) {
            return Err(ValidationError::invalid("signature mismatch"));
        }
        Ok(())
    }
}

#[async_trait]
impl SchemeValidator for SignatureValidator {
    fn scheme(&self) -> Scheme {
        Scheme::Signature
    }

    async fn validate(&self, request: &GatewayRequest) -> Result<(), ValidationError> {
        self.verify_at(request, Utc::now())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signer
// ─────────────────────────────────────────────────────────────────────────────

/// Client-side counterpart of [`SignatureValidator`].
#[derive(Debug, Clone)]
pub struct Signer {
    key_id: String,
    secret: String,
    scope_suffix: String,
    exclude_body: bool,
    headers: Vec<String>,
}

impl Signer {
    pub fn new(key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret: secret.into(),
            scope_suffix: DEFAULT_SCOPE_SUFFIX.to_string(),
            exclude_body: false,
            headers: vec!["host".to_string()],
        }
    }

    /// Builder: use a non-default credential scope.
    pub fn with_scope_suffix(mut self, scope: impl Into<String>) -> Self {
        self.scope_suffix = scope.into();
        self
    }

    /// Builder: sign `UNSIGNED-PAYLOAD` instead of the body.
    pub fn with_excluded_body(mut self, exclude: bool) -> Self {
        self.exclude_body = exclude;
        self
    }

    /// Builder: also sign `header` when the request carries it.
    pub fn with_signed_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into().to_lowercase());
        self
    }

    /// Add the date and authorization headers for a request signed at `at`.
    pub fn sign(
        &self,
        request: GatewayRequest,
        at: DateTime<Utc>,
    ) -> Result<GatewayRequest, hmac::digest::InvalidLength> {
        let date = at.format(DATE_FORMAT).to_string();
        let scope_date = at.format(SCOPE_DATE_FORMAT).to_string();
        let request = request.with_header(DATE_HEADER, date.clone());

        let mut signed_headers: Vec<String> = self
            .headers
            .iter()
            .filter(|h| request.header(h).is_some())
            .cloned()
            .chain(std::iter::once(DATE_HEADER.to_string()))
            .collect();
        signed_headers.sort_unstable();
        signed_headers.dedup();

        let signature = Canonical {
            request: &request,
            signed_headers: &signed_headers,
            date: &date,
            scope_date: &scope_date,
            scope_suffix: &self.scope_suffix,
            exclude_body: self.exclude_body,
        }
        .signature(&self.secret)?;

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope_date}/{}, SignedHeaders={}, Signature={}",
            self.key_id,
            self.scope_suffix,
            signed_headers.join(";"),
            hex::encode(signature),
        );
        Ok(request.with_header("authorization", authorization))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_kernel::gateway::HttpMethod;

    fn validator() -> SignatureValidator {
        SignatureValidator::new(&SignatureSpec::with_key("AK1", "s3cr3t")).unwrap()
    }

    fn request() -> GatewayRequest {
        GatewayRequest::new("req-1", "/v1/orders", HttpMethod::Post)
            .with_query("b=2&a=1")
            .with_header("Host", "api.example.com")
            .with_body(br#"{"qty":1}"#.to_vec())
    }

    fn signed(at: DateTime<Utc>) -> GatewayRequest {
        Signer::new("AK1", "s3cr3t").sign(request(), at).unwrap()
    }

    #[test]
    fn signed_request_verifies() {
        let now = Utc::now();
        assert!(validator().verify_at(&signed(now), now).is_ok());
    }

    #[tokio::test]
    async fn validate_uses_current_time() {
        assert!(validator().validate(&signed(Utc::now())).await.is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let now = Utc::now();
        let req = signed(now).with_body(br#"{"qty":100}"#.to_vec());
        assert_eq!(
            validator().verify_at(&req, now),
            Err(ValidationError::Invalid("signature mismatch".to_string()))
        );
    }

    #[test]
    fn excluded_body_ignores_body_changes() {
        let spec = SignatureSpec {
            exclude_body: true,
            ..SignatureSpec::with_key("AK1", "s3cr3t")
        };
        let validator = SignatureValidator::new(&spec).unwrap();
        let now = Utc::now();
        let req = Signer::new("AK1", "s3cr3t")
            .with_excluded_body(true)
            .sign(request(), now)
            .unwrap()
            .with_body(b"other".to_vec());
        assert!(validator.verify_at(&req, now).is_ok());
    }

    #[test]
    fn query_order_does_not_matter() {
        let now = Utc::now();
        let mut req = signed(now);
        req.query = Some("a=1&b=2".to_string());
        assert!(validator().verify_at(&req, now).is_ok());
    }

    #[test]
    fn stale_signature_is_expired() {
        let signed_at = Utc::now();
        let later = signed_at + chrono::Duration::seconds(DEFAULT_TTL_SECS as i64 + 1);
        assert!(matches!(
            validator().verify_at(&signed(signed_at), later),
            Err(ValidationError::Expired(_))
        ));
    }

    #[test]
    fn unknown_key_and_wrong_secret_are_rejected() {
        let now = Utc::now();
        let req = Signer::new("AK2", "s3cr3t").sign(request(), now).unwrap();
        assert_eq!(
            validator().verify_at(&req, now),
            Err(ValidationError::Invalid("unknown access key".to_string()))
        );

        let req = Signer::new("AK1", "wrong").sign(request(), now).unwrap();
        assert!(validator().verify_at(&req, now).is_err());
    }

    #[test]
    fn required_headers_must_be_signed() {
        let spec = SignatureSpec {
            required_headers: vec!["X-Tenant".to_string()],
            ..SignatureSpec::with_key("AK1", "s3cr3t")
        };
        let validator = SignatureValidator::new(&spec).unwrap();
        let now = Utc::now();

        let req = signed(now).with_header("X-Tenant", "acme");
        assert!(matches!(
            validator.verify_at(&req, now),
            Err(ValidationError::Invalid(reason)) if reason.contains("x-tenant")
        ));

        let req = Signer::new("AK1", "s3cr3t")
            .with_signed_header("X-Tenant")
            .sign(request().with_header("X-Tenant", "acme"), now)
            .unwrap();
        assert!(validator.verify_at(&req, now).is_ok());
    }

    #[test]
    fn unsigned_request_is_missing() {
        assert!(matches!(
            validator().verify_at(&request(), Utc::now()),
            Err(ValidationError::Missing(_))
        ));
    }

    #[test]
    fn empty_key_set_is_a_config_error() {
        assert!(SignatureValidator::new(&SignatureSpec::default()).is_err());
        assert!(SignatureValidator::new(&SignatureSpec::with_key("AK1", "")).is_err());
    }
}
