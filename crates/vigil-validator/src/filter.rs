//! Pipeline adapter for the gate.
//!
//! On rejection the diagnostic tag goes to `ctx.tags`, the attribute
//! `validator.result` is set to `"invalid"` and the caller only sees the
//! generic reason phrase of the status.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use vigil_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayError, GatewayFilter, GatewayResponse,
};

use crate::error::GateError;
use crate::gate::Gate;
use crate::outcome::Outcome;

/// Context attribute recording a rejection.
pub const RESULT_ATTR: &str = "validator.result";
/// Value of [`RESULT_ATTR`] for rejected requests.
pub const RESULT_INVALID: &str = "invalid";

const FILTER_NAME: &str = "validator";

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        _ => "Request Rejected",
    }
}

/// Runs a shared [`Gate`] in the auth slot of a filter chain.
pub struct ValidatorFilter {
    gate: Arc<Gate>,
    budget: Option<Duration>,
}

impl ValidatorFilter {
    pub fn new(gate: Arc<Gate>) -> Self {
        Self { gate, budget: None }
    }

    /// Builder: bound every evaluation by `budget`.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }
}

#[async_trait]
impl GatewayFilter for ValidatorFilter {
    fn name(&self) -> &str {
        FILTER_NAME
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTH
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
        let outcome = match self.budget {
            Some(budget) => self.gate.evaluate_within(&ctx.request, budget).await,
            None => self.gate.evaluate(&ctx.request).await,
        };

        match outcome {
            Ok(Outcome::Pass) => Ok(FilterAction::Continue),
            Ok(Outcome::Rejected(rejection)) => {
                ctx.add_tag(rejection.tag.clone());
                ctx.set_attr(RESULT_ATTR, &RESULT_INVALID);
                Ok(FilterAction::Reject(
                    rejection.status,
                    reason_phrase(rejection.status).to_string(),
                ))
            }
            Err(GateError::Released) => {
                warn!(request_id = %ctx.request.id, "Validator gate is released");
                Err(GatewayError::FilterReleased(FILTER_NAME.to_string()))
            }
            Err(e) => Err(GatewayError::FilterFailed {
                filter: FILTER_NAME.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn on_response(
        &self,
        _ctx: &GatewayContext,
        _resp: &mut GatewayResponse,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}
