//! Header shape validation.
//!
//! Every configured header must be present and carry either one of the
//! listed values or a value matching the regular expression.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vigil_kernel::gateway::GatewayRequest;

use super::SchemeValidator;
use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::spec::Scheme;

/// Accepted values for one header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValueValidator {
    /// Exact values accepted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    /// Regular expression a value may match instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,
}

impl ValueValidator {
    /// Accept any of `values`.
    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            regexp: None,
        }
    }

    /// Accept values matching `pattern`.
    pub fn regexp(pattern: impl Into<String>) -> Self {
        Self {
            values: Vec::new(),
            regexp: Some(pattern.into()),
        }
    }
}

/// `headers` section: header name → accepted values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSpec(pub BTreeMap<String, ValueValidator>);

impl HeaderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: require `header` to satisfy `rule`.
    pub fn require(mut self, header: impl Into<String>, rule: ValueValidator) -> Self {
        self.0.insert(header.into(), rule);
        self
    }
}

struct CompiledRule {
    header: String,
    values: Vec<String>,
    regexp: Option<Regex>,
}

impl CompiledRule {
    fn accepts(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
            || self.regexp.as_ref().is_some_and(|re| re.is_match(value))
    }

    // A repeated header arrives folded; any one of its elements may satisfy the rule.
    fn accepts_any(&self, request: &GatewayRequest, value: &str) -> bool {
        self.accepts(value) || request.header_values(&self.header).any(|v| self.accepts(v))
    }
}

/// Validator for the `headers` section.
pub struct HeaderValidator {
    rules: Vec<CompiledRule>,
}

impl HeaderValidator {
    pub fn new(spec: &HeaderSpec) -> ConfigResult<Self> {
        if spec.0.is_empty() {
            return Err(ConfigError::invalid(
                Scheme::Headers,
                "at least one header must be specified",
            ));
        }

        let mut rules = Vec::with_capacity(spec.0.len());
        for (header, rule) in &spec.0 {
            if header.trim().is_empty() {
                return Err(ConfigError::invalid(Scheme::Headers, "header name is empty"));
            }
            if rule.values.is_empty() && rule.regexp.is_none() {
                return Err(ConfigError::invalid(
                    Scheme::Headers,
                    format!("header '{header}': neither values nor regexp is specified"),
                ));
            }
            let regexp = rule
                .regexp
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|source| ConfigError::InvalidPattern {
                    header: header.clone(),
                    source,
                })?;

            rules.push(CompiledRule {
                header: header.to_lowercase(),
                values: rule.values.clone(),
                regexp,
            });
        }

        Ok(Self { rules })
    }
}

#[async_trait]
impl SchemeValidator for HeaderValidator {
    fn scheme(&self) -> Scheme {
        Scheme::Headers
    }

    async fn validate(&self, request: &GatewayRequest) -> Result<(), ValidationError> {
        for rule in &self.rules {
            let Some(value) = request.header(&rule.header) else {
                return Err(ValidationError::missing(format!(
                    "header {} not found",
                    rule.header
                )));
            };
            if !rule.accepts_any(request, value) {
                return Err(ValidationError::invalid(format!(
                    "header {} is invalid",
                    rule.header
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_kernel::gateway::HttpMethod;

    fn request() -> GatewayRequest {
        GatewayRequest::new("req-1", "/", HttpMethod::Get)
    }

    #[tokio::test]
    async fn missing_header_is_reported() {
        let spec = HeaderSpec::new().require("X-Api-Key", ValueValidator::regexp(".+"));
        let validator = HeaderValidator::new(&spec).unwrap();

        let err = validator.validate(&request()).await.unwrap_err();
        assert_eq!(
            err,
            ValidationError::Missing("header x-api-key not found".to_string())
        );
    }

    #[tokio::test]
    async fn values_and_regexp_are_alternatives() {
        let spec = HeaderSpec::new().require(
            "X-Tenant",
            ValueValidator {
                values: vec!["acme".to_string()],
                regexp: Some("^team-[0-9]+$".to_string()),
            },
        );
        let validator = HeaderValidator::new(&spec).unwrap();

        for ok in ["acme", "team-42"] {
            let req = request().with_header("X-Tenant", ok);
            assert!(validator.validate(&req).await.is_ok(), "{ok} should pass");
        }

        let req = request().with_header("X-Tenant", "team-x");
        assert!(matches!(
            validator.validate(&req).await,
            Err(ValidationError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn repeated_header_passes_when_any_value_is_listed() {
        let spec = HeaderSpec::new().require("X-Api-Key", ValueValidator::values(["k2"]));
        let validator = HeaderValidator::new(&spec).unwrap();

        let req = request()
            .append_header("X-Api-Key", "bogus")
            .append_header("X-Api-Key", "k2");
        assert!(validator.validate(&req).await.is_ok());

        let req = request()
            .append_header("X-Api-Key", "bogus")
            .append_header("X-Api-Key", "other");
        assert!(matches!(
            validator.validate(&req).await,
            Err(ValidationError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn every_header_is_required() {
        let spec = HeaderSpec::new()
            .require("X-A", ValueValidator::values(["1"]))
            .require("X-B", ValueValidator::values(["2"]));
        let validator = HeaderValidator::new(&spec).unwrap();

        let req = request().with_header("X-A", "1");
        assert!(validator.validate(&req).await.is_err());

        let req = req.with_header("X-B", "2");
        assert!(validator.validate(&req).await.is_ok());
    }

    #[test]
    fn rule_without_values_or_regexp_is_rejected() {
        let spec = HeaderSpec::new().require("X-A", ValueValidator::default());
        assert!(matches!(
            HeaderValidator::new(&spec),
            Err(ConfigError::InvalidSpec { scheme: Scheme::Headers, .. })
        ));
    }

    #[test]
    fn bad_regexp_is_a_config_error() {
        let spec = HeaderSpec::new().require("X-A", ValueValidator::regexp("(unclosed"));
        assert!(matches!(
            HeaderValidator::new(&spec),
            Err(ConfigError::InvalidPattern { ref header, .. }) if header == "X-A"
        ));
    }

    #[test]
    fn empty_section_is_rejected() {
        assert!(HeaderValidator::new(&HeaderSpec::new()).is_err());
    }
}
