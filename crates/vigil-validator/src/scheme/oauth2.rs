//! OAuth2 bearer token validation.
//!
//! Two modes, exactly one of which is configured:
//!
//! - `tokenIntrospect`: the token is posted to an RFC 7662 introspection
//!   endpoint and accepted when the response says `"active": true`.
//! - `jwt`: the token is a self-encoded HMAC-signed JWT verified locally.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_kernel::gateway::GatewayRequest;

use super::SchemeValidator;
use super::jwt::{TokenVerifier, VerifierParams};
use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::spec::Scheme;

const DEFAULT_INTROSPECT_TIMEOUT_MS: u64 = 5_000;

/// Remote token introspection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TokenIntrospectSpec {
    /// Introspection endpoint URL.
    pub endpoint: String,

    /// Pre-encoded `user:password` in base64, sent as HTTP basic auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<String>,

    /// Client credentials, used when `basicAuth` is not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure_tls: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Self-encoded access token settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OAuth2JwtSpec {
    pub algorithm: String,
    /// Hex-encoded HMAC secret.
    pub secret: String,
}

/// `oauth2` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OAuth2Spec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_introspect: Option<TokenIntrospectSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<OAuth2JwtSpec>,
}

impl OAuth2Spec {
    pub fn introspect(endpoint: impl Into<String>) -> Self {
        Self {
            token_introspect: Some(TokenIntrospectSpec {
                endpoint: endpoint.into(),
                ..Default::default()
            }),
            jwt: None,
        }
    }

    pub fn self_encoded(algorithm: impl Into<String>, secret_hex: impl Into<String>) -> Self {
        Self {
            token_introspect: None,
            jwt: Some(OAuth2JwtSpec {
                algorithm: algorithm.into(),
                secret: secret_hex.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
}

struct Introspector {
    client: reqwest::Client,
    endpoint: Url,
    authorization: Option<HeaderValue>,
}

impl Introspector {
    fn new(spec: &TokenIntrospectSpec) -> ConfigResult<Self> {
        let raw = spec.endpoint.trim();
        let invalid_endpoint = |reason: &str| ConfigError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: reason.to_string(),
        };

        let endpoint = Url::parse(raw).map_err(|e| invalid_endpoint(&e.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(invalid_endpoint("scheme must be http or https"));
        }
        if endpoint.host().is_none() {
            return Err(invalid_endpoint("missing host"));
        }

        let credentials = match (&spec.basic_auth, &spec.client_id, &spec.client_secret) {
            (Some(encoded), _, _) => Some(encoded.clone()),
            (None, Some(id), Some(secret)) => Some(STANDARD.encode(format!("{id}:{secret}"))),
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(ConfigError::invalid(
                    Scheme::OAuth2,
                    "clientId and clientSecret must be set together",
                ));
            }
            (None, None, None) => None,
        };
        let authorization = credentials
            .map(|c| HeaderValue::from_str(&format!("Basic {c}")))
            .transpose()
            .map_err(|_| ConfigError::invalid(Scheme::OAuth2, "invalid client credential characters"))?;

        let timeout = Duration::from_millis(spec.timeout_ms.unwrap_or(DEFAULT_INTROSPECT_TIMEOUT_MS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(spec.insecure_tls)
            .build()
            .map_err(|e| invalid_endpoint(&format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            authorization,
        })
    }

    async fn introspect(&self, token: &str) -> Result<(), ValidationError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .form(&[("token", token), ("token_type_hint", "access_token")]);
        if let Some(auth) = &self.authorization {
            request = request.header(AUTHORIZATION, auth.clone());
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ValidationError::Unavailable("token introspection timed out".into())
            } else {
                ValidationError::Unavailable(format!("token introspection failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(ValidationError::Unavailable(format!(
                "token introspection returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(ValidationError::invalid(format!(
                "token introspection returned {status}"
            )));
        }

        let body: IntrospectionResponse = resp.json().await.map_err(|e| {
            ValidationError::Unavailable(format!("malformed introspection response: {e}"))
        })?;
        if !body.active {
            return Err(ValidationError::invalid("token is not active"));
        }
        Ok(())
    }
}

enum Mode {
    Introspect(Introspector),
    SelfEncoded(TokenVerifier),
}

/// Validator for the `oauth2` section.
pub struct OAuth2Validator {
    mode: Mode,
}

impl OAuth2Validator {
    pub fn new(spec: &OAuth2Spec) -> ConfigResult<Self> {
        let mode = match (&spec.token_introspect, &spec.jwt) {
            (Some(introspect), None) => Mode::Introspect(Introspector::new(introspect)?),
            (None, Some(jwt)) => {
                if !jwt.algorithm.starts_with("HS") {
                    return Err(ConfigError::invalid(
                        Scheme::OAuth2,
                        format!("self-encoded tokens must use HMAC, got '{}'", jwt.algorithm),
                    ));
                }
                Mode::SelfEncoded(TokenVerifier::new(
                    Scheme::OAuth2,
                    VerifierParams {
                        algorithm: &jwt.algorithm,
                        secret: Some(&jwt.secret),
                        public_key: None,
                        issuer: None,
                        audience: None,
                        leeway_secs: 0,
                    },
                )?)
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::invalid(
                    Scheme::OAuth2,
                    "only one of tokenIntrospect and jwt may be specified",
                ));
            }
            (None, None) => {
                return Err(ConfigError::invalid(
                    Scheme::OAuth2,
                    "one of tokenIntrospect and jwt must be specified",
                ));
            }
        };
        Ok(Self { mode })
    }
}

#[async_trait]
impl SchemeValidator for OAuth2Validator {
    fn scheme(&self) -> Scheme {
        Scheme::OAuth2
    }

    async fn validate(&self, request: &GatewayRequest) -> Result<(), ValidationError> {
        let token = request
            .bearer_token()
            .ok_or_else(|| ValidationError::missing("bearer token not found"))?;

        match &self.mode {
            Mode::Introspect(introspector) => introspector.introspect(token).await,
            Mode::SelfEncoded(verifier) => verifier.verify(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::{Form, Json, Router, routing::post};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use std::collections::HashMap;
    use vigil_kernel::gateway::HttpMethod;

    fn bearer(token: &str) -> GatewayRequest {
        GatewayRequest::new("req-1", "/", HttpMethod::Get)
            .with_header("Authorization", format!("Bearer {token}"))
    }

    /// Accepts token `good` when called with the `client:secret` credential.
    async fn spawn_introspection_server() -> String {
        async fn introspect(
            headers: HeaderMap,
            Form(form): Form<HashMap<String, String>>,
        ) -> Json<serde_json::Value> {
            let expected = format!("Basic {}", STANDARD.encode("client:secret"));
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == expected);
            let active = authorized
                && form.get("token").map(String::as_str) == Some("good")
                && form.get("token_type_hint").map(String::as_str) == Some("access_token");
            Json(json!({ "active": active }))
        }

        let app = Router::new().route("/introspect", post(introspect));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/introspect")
    }

    #[tokio::test]
    async fn introspection_accepts_active_tokens() {
        let endpoint = spawn_introspection_server().await;
        let mut spec = OAuth2Spec::introspect(endpoint);
        if let Some(introspect) = spec.token_introspect.as_mut() {
            introspect.client_id = Some("client".into());
            introspect.client_secret = Some("secret".into());
        }
        let validator = OAuth2Validator::new(&spec).unwrap();

        assert!(validator.validate(&bearer("good")).await.is_ok());
        assert_eq!(
            validator.validate(&bearer("revoked")).await,
            Err(ValidationError::Invalid("token is not active".to_string()))
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        // nothing listens on port 9 (discard) on the loopback
        let spec = OAuth2Spec::introspect("http://127.0.0.1:9/introspect");
        let validator = OAuth2Validator::new(&spec).unwrap();
        assert!(matches!(
            validator.validate(&bearer("good")).await,
            Err(ValidationError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn self_encoded_tokens_are_verified_locally() {
        let validator =
            OAuth2Validator::new(&OAuth2Spec::self_encoded("HS256", hex::encode("k3y"))).unwrap();
        let token = encode(
            &Header::default(),
            &json!({ "sub": "svc" }),
            &EncodingKey::from_secret(b"k3y"),
        )
        .unwrap();

        assert!(validator.validate(&bearer(&token)).await.is_ok());
        assert!(validator.validate(&bearer("garbage")).await.is_err());
    }

    #[tokio::test]
    async fn missing_bearer_token() {
        let validator =
            OAuth2Validator::new(&OAuth2Spec::self_encoded("HS256", hex::encode("k3y"))).unwrap();
        let req = GatewayRequest::new("req-1", "/", HttpMethod::Get);
        assert!(matches!(
            validator.validate(&req).await,
            Err(ValidationError::Missing(_))
        ));
    }

    #[test]
    fn exactly_one_mode_is_required() {
        assert!(OAuth2Validator::new(&OAuth2Spec::default()).is_err());

        let both = OAuth2Spec {
            jwt: OAuth2Spec::self_encoded("HS256", "00").jwt,
            ..OAuth2Spec::introspect("https://idp.example.com/introspect")
        };
        assert!(OAuth2Validator::new(&both).is_err());
    }

    #[test]
    fn endpoint_must_be_http_url() {
        for endpoint in [
            "idp.example.com",
            "ftp://idp.example.com",
            "https://",
            "http://exa mple.com/introspect",
            "http://:/x",
            "https://[bad/introspect",
        ] {
            assert!(
                matches!(
                    OAuth2Validator::new(&OAuth2Spec::introspect(endpoint)),
                    Err(ConfigError::InvalidEndpoint { .. })
                ),
                "{endpoint} should be rejected"
            );
        }
    }

    #[test]
    fn asymmetric_self_encoded_tokens_are_rejected() {
        assert!(OAuth2Validator::new(&OAuth2Spec::self_encoded("RS256", "00")).is_err());
    }
}
