//! Common test utilities shared across the `vigil-validator` integration
//! tests.
//!
//! Declared with `mod common;` inside each test file that needs it.

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use vigil_kernel::gateway::GatewayRequest;
use vigil_validator::{
    ConfigError, ConfigResult, GateConfig, HeaderSpec, JwtSpec, Scheme, SchemeFactory, SchemeSpec,
    SchemeValidator, ValidationError, ValueValidator,
};

/// What a mock validator does with every request.
#[derive(Debug, Clone)]
pub enum Behavior {
    Accept,
    Reject(ValidationError),
    Panic,
    Sleep(Duration),
}

/// Shared counters and records for all validators built by a [`MockFactory`].
#[derive(Default)]
pub struct Probe {
    pub builds: AtomicUsize,
    pub calls: DashMap<Scheme, usize>,
    pub releases: DashMap<String, usize>,
    /// request id → labels of the validators that saw it
    pub seen: DashMap<String, Vec<String>>,
    /// validate calls that ran on an already-released validator
    pub used_after_release: AtomicUsize,
}

impl Probe {
    pub fn calls(&self, scheme: Scheme) -> usize {
        self.calls.get(&scheme).map(|c| *c).unwrap_or(0)
    }

    pub fn releases(&self, label: &str) -> usize {
        self.releases.get(label).map(|c| *c).unwrap_or(0)
    }
}

/// Labels a spec so validators can say which generation built them.
///
/// Headers specs carry the label as their single header name, JWT specs as
/// their issuer.
pub fn label_of(spec: &SchemeSpec) -> String {
    match spec {
        SchemeSpec::Headers(h) => h.0.keys().next().cloned().unwrap_or_default(),
        SchemeSpec::Jwt(j) => j.issuer.clone().unwrap_or_default(),
        other => other.scheme().to_string(),
    }
}

pub fn headers(label: &str) -> HeaderSpec {
    HeaderSpec::new().require(label, ValueValidator::regexp(".*"))
}

pub fn jwt(label: &str) -> JwtSpec {
    JwtSpec::hmac("HS256", "00").with_issuer(label)
}

/// Headers + JWT config whose validators are all labelled `label`.
pub fn labelled_config(label: &str) -> GateConfig {
    GateConfig::new(headers(label)).with(jwt(label))
}

pub struct MockValidator {
    scheme: Scheme,
    label: String,
    behavior: Behavior,
    probe: Arc<Probe>,
    released: AtomicBool,
}

#[async_trait]
impl SchemeValidator for MockValidator {
    fn scheme(&self) -> Scheme {
        self.scheme
    }

    async fn validate(&self, request: &GatewayRequest) -> Result<(), ValidationError> {
        *self.probe.calls.entry(self.scheme).or_insert(0) += 1;
        self.probe
            .seen
            .entry(request.id.clone())
            .or_default()
            .push(self.label.clone());

        let result = match &self.behavior {
            Behavior::Accept => Ok(()),
            Behavior::Reject(e) => Err(e.clone()),
            Behavior::Panic => panic!("mock validator exploded"),
            Behavior::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
        };

        if self.released.load(Ordering::SeqCst) {
            self.probe.used_after_release.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            *self.probe.releases.entry(self.label.clone()).or_insert(0) += 1;
        }
    }
}

/// Factory building [`MockValidator`]s.
///
/// Per-scheme behaviors default to `Accept`; a label listed in `fail_labels`
/// makes `build` fail for that spec.
#[derive(Default)]
pub struct MockFactory {
    pub probe: Arc<Probe>,
    pub behaviors: DashMap<Scheme, Behavior>,
    pub fail_labels: DashMap<String, ()>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, scheme: Scheme, behavior: Behavior) {
        self.behaviors.insert(scheme, behavior);
    }
}

impl SchemeFactory for MockFactory {
    fn build(&self, spec: &SchemeSpec) -> ConfigResult<Box<dyn SchemeValidator>> {
        let label = label_of(spec);
        if self.fail_labels.contains_key(&label) {
            return Err(ConfigError::InvalidSpec {
                scheme: spec.scheme(),
                reason: format!("mock build failure for {label}"),
            });
        }
        self.probe.builds.fetch_add(1, Ordering::SeqCst);

        let behavior = self
            .behaviors
            .get(&spec.scheme())
            .map(|b| b.clone())
            .unwrap_or(Behavior::Accept);
        Ok(Box::new(MockValidator {
            scheme: spec.scheme(),
            label,
            behavior,
            probe: Arc::clone(&self.probe),
            released: AtomicBool::new(false),
        }))
    }
}
