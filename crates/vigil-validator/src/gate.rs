//! The validation gate.
//!
//! A [`Gate`] owns exactly one live [`Generation`]: an immutable
//! [`GateConfig`] plus the validators built from it.  Evaluations clone the
//! live `Arc<Generation>` and run against that snapshot, so a concurrent
//! [`Gate::reconfigure`] never changes the rules under a request that has
//! already started.
//!
//! ```text
//!            reconfigure(cfg')                      release()
//!  Live(N) ─────────────────────▶ Live(N+1) ─ … ──────────────▶ Released
//!     │                              │
//!     └─ gen N released when the last in-flight evaluation drops it
//! ```

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vigil_kernel::gateway::GatewayRequest;

use crate::error::{ConfigResult, GateError, ValidationError};
use crate::outcome::{Outcome, Rejection};
use crate::scheme::{BuiltinSchemes, SchemeFactory, SchemeValidator};
use crate::spec::{GateConfig, Scheme, ValidatorSpec};

// ─────────────────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────────────────

/// One configuration and the validators built from it.
///
/// Validators are released exactly once: explicitly through
/// [`Gate::release`] or when the last reference is dropped.
struct Generation {
    id: u64,
    config: GateConfig,
    validators: Vec<Box<dyn SchemeValidator>>,
    released: AtomicBool,
}

impl Generation {
    fn build(id: u64, config: GateConfig, factory: &dyn SchemeFactory) -> ConfigResult<Self> {
        let mut validators: Vec<Box<dyn SchemeValidator>> =
            Vec::with_capacity(config.scheme_count());

        for spec in config.specs() {
            match factory.build(spec) {
                Ok(validator) => validators.push(validator),
                Err(e) => {
                    warn!(
                        generation = id,
                        scheme = %spec.scheme(),
                        error = %e,
                        "Failed to build scheme validator"
                    );
                    for built in &validators {
                        built.release();
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            id,
            config,
            validators,
            released: AtomicBool::new(false),
        })
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        for validator in &self.validators {
            validator.release();
        }
        debug!(generation = self.id, "Released generation");
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        self.release();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gate
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`Gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Live { generation: u64 },
    Released,
}

/// Composes the enabled schemes into a single admission decision.
pub struct Gate {
    live: RwLock<Option<Arc<Generation>>>,
    /// Serializes reconfiguration; holds the last published generation id.
    last_generation: Mutex<u64>,
    factory: Arc<dyn SchemeFactory>,
}

impl Gate {
    /// Build a gate with the built-in scheme validators.
    pub fn configure(config: GateConfig) -> ConfigResult<Self> {
        Self::configure_with(config, Arc::new(BuiltinSchemes))
    }

    /// Build a gate from the serde configuration surface.
    pub fn from_spec(spec: ValidatorSpec) -> ConfigResult<Self> {
        Self::configure(GateConfig::try_from(spec)?)
    }

    /// Build a gate whose validators come from `factory`.
    pub fn configure_with(config: GateConfig, factory: Arc<dyn SchemeFactory>) -> ConfigResult<Self> {
        let generation = Generation::build(1, config, factory.as_ref())?;
        info!(
            generation = 1,
            schemes = ?generation.config.schemes().collect::<Vec<_>>(),
            "Validator gate configured"
        );

        Ok(Self {
            live: RwLock::new(Some(Arc::new(generation))),
            last_generation: Mutex::new(1),
            factory,
        })
    }

    /// Replace the live configuration, returning the new generation number.
    ///
    /// On failure the live generation is untouched.
    pub fn reconfigure(&self, config: GateConfig) -> Result<u64, GateError> {
        let mut last = self.last_generation.lock();
        if self.live.read().is_none() {
            return Err(GateError::Released);
        }

        let id = *last + 1;
        let generation = Arc::new(Generation::build(id, config, self.factory.as_ref())?);

        let previous = {
            let mut live = self.live.write();
            match live.as_mut() {
                // released while building; dropping `generation` releases it
                None => return Err(GateError::Released),
                Some(current) => std::mem::replace(current, generation),
            }
        };
        *last = id;
        drop(last);

        info!(
            generation = id,
            previous = previous.id,
            in_flight = Arc::strong_count(&previous) - 1,
            "Validator gate reconfigured"
        );
        Ok(id)
    }

    /// [`reconfigure`](Self::reconfigure) from the serde configuration surface.
    pub fn reconfigure_spec(&self, spec: ValidatorSpec) -> Result<u64, GateError> {
        self.reconfigure(GateConfig::try_from(spec)?)
    }

    /// Release the live generation.  Later calls are no-ops.
    pub fn release(&self) {
        let taken = self.live.write().take();
        if let Some(generation) = taken {
            generation.release();
            info!(generation = generation.id, "Validator gate released");
        }
    }

    pub fn state(&self) -> GateState {
        match self.live.read().as_ref() {
            Some(g) => GateState::Live { generation: g.id },
            None => GateState::Released,
        }
    }

    /// Live generation number, `None` once released.
    pub fn generation(&self) -> Option<u64> {
        self.live.read().as_ref().map(|g| g.id)
    }

    /// Snapshot of the live configuration.
    pub fn config(&self) -> Option<GateConfig> {
        self.live.read().as_ref().map(|g| g.config.clone())
    }

    /// Decide whether `request` is admitted.
    ///
    /// Errors only when the gate has been released.
    pub async fn evaluate(&self, request: &GatewayRequest) -> Result<Outcome, GateError> {
        self.run(request, None).await
    }

    /// [`evaluate`](Self::evaluate) with a deadline for the whole decision.
    ///
    /// A scheme still running when the budget runs out rejects the request
    /// with [`ValidationError::DeadlineExceeded`].
    pub async fn evaluate_within(
        &self,
        request: &GatewayRequest,
        budget: Duration,
    ) -> Result<Outcome, GateError> {
        self.run(request, Some(Instant::now() + budget)).await
    }

    fn current(&self) -> Result<Arc<Generation>, GateError> {
        self.live.read().as_ref().cloned().ok_or(GateError::Released)
    }

    async fn run(
        &self,
        request: &GatewayRequest,
        deadline: Option<Instant>,
    ) -> Result<Outcome, GateError> {
        let generation = self.current()?;

        for validator in &generation.validators {
            let scheme = validator.scheme();
            if let Err(error) = call_scheme(validator.as_ref(), request, deadline).await {
                let rejection = Rejection::new(scheme, error);
                debug!(
                    request_id = %request.id,
                    generation = generation.id,
                    scheme = %scheme,
                    status = rejection.status,
                    tag = %rejection.tag,
                    "Request rejected"
                );
                return Ok(Outcome::Rejected(rejection));
            }
        }

        debug!(request_id = %request.id, generation = generation.id, "Request admitted");
        Ok(Outcome::Pass)
    }
}

/// Run one scheme, converting panics and deadline expiry into rejections.
async fn call_scheme(
    validator: &dyn SchemeValidator,
    request: &GatewayRequest,
    deadline: Option<Instant>,
) -> Result<(), ValidationError> {
    let call = AssertUnwindSafe(validator.validate(request)).catch_unwind();
    let result = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => return Err(ValidationError::DeadlineExceeded),
        },
        None => call.await,
    };

    result.unwrap_or_else(|payload| {
        let scheme: Scheme = validator.scheme();
        let message = panic_message(payload.as_ref());
        warn!(scheme = %scheme, panic = %message, "Scheme validator panicked");
        Err(ValidationError::Internal(message))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "scheme validator panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::{HeaderSpec, JwtSpec, ValueValidator};
    use vigil_kernel::gateway::HttpMethod;

    fn api_key_config() -> GateConfig {
        GateConfig::new(HeaderSpec::new().require("X-Api-Key", ValueValidator::regexp(".+")))
    }

    fn request() -> GatewayRequest {
        GatewayRequest::new("req-1", "/orders", HttpMethod::Get)
    }

    #[tokio::test]
    async fn header_scheme_decides() {
        let gate = Gate::configure(api_key_config()).unwrap();

        let outcome = gate.evaluate(&request()).await.unwrap();
        assert_eq!(outcome.status(), Some(400));
        assert_eq!(
            outcome.tag(),
            Some("header validator: header x-api-key not found")
        );

        let outcome = gate
            .evaluate(&request().with_header("X-Api-Key", "k1"))
            .await
            .unwrap();
        assert!(outcome.is_pass());
    }

    #[tokio::test]
    async fn reconfigure_swaps_rules_and_numbers_generations() {
        let gate = Gate::configure(api_key_config()).unwrap();
        assert_eq!(gate.state(), GateState::Live { generation: 1 });

        let jwt = GateConfig::new(JwtSpec::hmac("HS256", hex::encode("secret")));
        assert_eq!(gate.reconfigure(jwt).unwrap(), 2);

        let outcome = gate
            .evaluate(&request().with_header("X-Api-Key", "k1"))
            .await
            .unwrap();
        assert_eq!(outcome.status(), Some(401));
        assert!(outcome.tag().unwrap().starts_with("JWT validator: "));
    }

    #[tokio::test]
    async fn failed_reconfigure_keeps_live_generation() {
        let gate = Gate::configure(api_key_config()).unwrap();
        let bad = GateConfig::new(HeaderSpec::new().require("X-A", ValueValidator::regexp("(")));

        assert!(matches!(gate.reconfigure(bad), Err(GateError::Config(_))));
        assert_eq!(gate.generation(), Some(1));
        assert_eq!(gate.reconfigure(api_key_config()).unwrap(), 2);
    }

    #[tokio::test]
    async fn released_gate_refuses_work() {
        let gate = Gate::configure(api_key_config()).unwrap();
        gate.release();
        gate.release();

        assert_eq!(gate.state(), GateState::Released);
        assert!(matches!(
            gate.evaluate(&request()).await,
            Err(GateError::Released)
        ));
        assert!(matches!(
            gate.reconfigure(api_key_config()),
            Err(GateError::Released)
        ));
    }

    #[test]
    fn empty_spec_cannot_configure() {
        assert!(matches!(
            Gate::from_spec(ValidatorSpec::default()),
            Err(crate::error::ConfigError::Empty)
        ));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "scheme validator panicked");
    }
}
