//! Gateway filter trait and filter-ordering types.
//!
//! A filter chain is an ordered list of [`GatewayFilter`] instances applied
//! to every request and response.  Filters are sorted by their declared
//! [`FilterOrder`] and executed in ascending order on the request path
//! (lowest value first) and descending order on the response path.
//!
//! ```text
//! Request  ──► PreAuth ──► Auth (admission gate) ──► Transform ──► Logging
//!                  (downstream handler runs here)
//! Response ◄── Logging ◄── Transform ◄── Auth ◄── PreAuth
//! ```

use super::error::GatewayError;
use super::types::{GatewayContext, GatewayResponse};
use async_trait::async_trait;

// ─────────────────────────────────────────────────────────────────────────────
// Filter ordering
// ─────────────────────────────────────────────────────────────────────────────

/// Numeric ordering slot for a filter in the chain.
///
/// The well-known slots below act as guidelines; any `u32` value is accepted
/// so implementors can slot in custom filters between the standard phases.
/// Filters with equal order values are executed in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterOrder(pub u32);

impl FilterOrder {
    /// Executes before all admission logic (e.g. request ID injection).
    pub const PRE_AUTH: FilterOrder = FilterOrder(0);
    /// Admission slot (header shape, JWT, signature, OAuth2, basic auth).
    pub const AUTH: FilterOrder = FilterOrder(100);
    /// Access logging slot; runs after admission.
    pub const LOGGING: FilterOrder = FilterOrder(400);
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter action
// ─────────────────────────────────────────────────────────────────────────────

/// Instruction returned by [`GatewayFilter::on_request`] controlling what
/// the pipeline does with the request after the filter runs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterAction {
    /// Pass the request to the next filter or the downstream handler.
    Continue,
    /// Short-circuit the chain and answer with the given HTTP status and a
    /// caller-safe message.
    Reject(u16, String),
    /// Short-circuit and redirect the caller to a different location.
    Redirect(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayFilter trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for a single filter in the pipeline.
///
/// Implementations must be `Send + Sync` so they can be shared across Tokio
/// tasks without additional synchronization by the caller.
#[async_trait]
pub trait GatewayFilter: Send + Sync {
    /// Stable, human-readable identifier for this filter (used in logs).
    fn name(&self) -> &str;

    /// Position in the filter chain.  Lower values execute first on the
    /// request path.
    fn order(&self) -> FilterOrder;

    /// Called with the inbound request *before* it reaches the downstream
    /// handler.
    ///
    /// Return [`FilterAction::Continue`] to proceed, or a `Reject`/`Redirect`
    /// variant to short-circuit the chain.  `Err` is reserved for filters that
    /// cannot serve at all; it is never used to report a rejected request.
    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError>;

    /// Called with the response *before* it is returned to the caller.
    async fn on_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), GatewayError>;
}
