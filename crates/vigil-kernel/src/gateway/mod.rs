//! Request pipeline kernel contract.
//!
//! This module defines the *trait interfaces and data types* every pipeline
//! stage agrees on.  No concrete filters live here; those belong in
//! `vigil-validator` (admission gate) and `vigil-gateway` (HTTP host).
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              vigil-kernel  (this module)                    │
//! │  GatewayFilter trait    FilterAction / FilterOrder          │
//! │  GatewayRequest/Response/Context  GatewayError              │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              vigil-validator                                │
//! │  Gate (generations, hot swap)   ValidatorFilter             │
//! │  Header / JWT / Signature / OAuth2 / BasicAuth schemes      │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              vigil-gateway  (axum host)                     │
//! │  FilterPipeline   LoggingFilter   AdmissionServer           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod filter;
pub mod types;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use error::GatewayError;
pub use filter::{FilterAction, FilterOrder, GatewayFilter};
pub use types::{GatewayContext, GatewayRequest, GatewayResponse, HttpMethod};
