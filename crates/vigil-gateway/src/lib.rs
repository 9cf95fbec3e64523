//! `vigil-gateway`: forward-auth admission server.
//!
//! Hosts a [`vigil_validator::Gate`] behind axum:
//!
//! | Piece | Role |
//! |-------|------|
//! | [`filter::FilterPipeline`] | ordered [`GatewayFilter`](vigil_kernel::gateway::GatewayFilter) chain |
//! | [`filter::LoggingFilter`] | access log of every decision |
//! | [`vigil_validator::ValidatorFilter`] | the admission gate |
//! | [`reload::SpecReloader`] | spec file → `Gate::reconfigure_spec` |
//! | [`server::AdmissionServer`] | HTTP front |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil_gateway::{config::ServerConfig, server::AdmissionServer};
//! use vigil_validator::{Gate, ValidatorSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_env()?;
//!     let gate = Arc::new(Gate::from_spec(ValidatorSpec::load(&config.spec_path)?)?);
//!
//!     AdmissionServer::new(config, gate)
//!         .start(async { let _ = tokio::signal::ctrl_c().await; })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod reload;
pub mod server;

// Re-export the kernel pipeline types for convenience.
pub use vigil_kernel::gateway;
