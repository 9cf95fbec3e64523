//! Pipeline error types for `vigil-kernel`.
//!
//! [`GatewayError`] covers failures of the pipeline itself: a chain that was
//! assembled wrongly, or a filter that can no longer serve.  A request that
//! is merely *rejected* is not an error; it is a
//! [`FilterAction::Reject`](super::filter::FilterAction::Reject).

use thiserror::Error;

/// Pipeline error type for the kernel contract.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    // ── Chain assembly ──────────────────────────────────────────────────────
    /// A filter chain is empty (must contain at least one filter).
    #[error("filter chain must contain at least one filter")]
    EmptyFilterChain,

    /// Two filters in one chain share a name.
    #[error("filter '{0}' is already registered")]
    DuplicateFilter(String),

    // ── Runtime ─────────────────────────────────────────────────────────────
    /// The filter has been shut down and can no longer evaluate requests.
    #[error("filter '{0}' has been released")]
    FilterReleased(String),

    /// The filter failed for a reason unrelated to the request itself.
    #[error("filter '{filter}' failed: {reason}")]
    FilterFailed { filter: String, reason: String },
}
