//! Vigil admission gate.
//!
//! A [`Gate`] composes independent validation schemes into a single
//! admission decision with a fixed precedence:
//!
//! ```text
//! headers ─► jwt ─► signature ─► oauth2 ─► basicAuth ─► Pass
//!    │        │         │           │           │
//!    └────────┴─────────┴───────────┴───────────┴──► Rejected{status, tag}
//! ```
//!
//! The first scheme that refuses the request decides the outcome; later
//! schemes are not called.  The live rules can be replaced at any time with
//! [`Gate::reconfigure`]; requests already in flight finish against the rules
//! they started with.
//!
//! ```rust,no_run
//! use vigil_kernel::gateway::{GatewayRequest, HttpMethod};
//! use vigil_validator::{Gate, GateConfig, HeaderSpec, ValueValidator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let gate = Gate::configure(GateConfig::new(
//!     HeaderSpec::new().require("X-Api-Key", ValueValidator::regexp("^[a-z0-9]{32}$")),
//! ))?;
//!
//! let request = GatewayRequest::new("req-1", "/orders", HttpMethod::Get);
//! let outcome = gate.evaluate(&request).await?;
//! assert_eq!(outcome.status(), Some(400));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod filter;
pub mod gate;
pub mod outcome;
pub mod scheme;
pub mod spec;
pub mod watch;

pub use error::{ConfigError, ConfigResult, GateError, ValidationError};
pub use filter::ValidatorFilter;
pub use gate::{Gate, GateState};
pub use outcome::{Outcome, Rejection};
pub use scheme::{
    BasicAuthSpec, BasicAuthValidator, BuiltinSchemes, HeaderSpec, HeaderValidator, JwtSpec,
    JwtValidator, OAuth2JwtSpec, OAuth2Spec, OAuth2Validator, SchemeFactory, SchemeValidator,
    SignatureSpec, SignatureValidator, Signer, TokenIntrospectSpec, ValueValidator,
};
pub use spec::{GateConfig, Scheme, SchemeSpec, ValidatorSpec};
pub use watch::FileWatcher;
