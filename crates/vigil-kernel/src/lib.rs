//! Vigil kernel.
//!
//! Holds the contract shared by every stage of the request pipeline
//! ([`gateway`]) and the multi-format configuration loader ([`config`]).
//! Concrete filters live in `vigil-validator`; the HTTP host lives in
//! `vigil-gateway`.

// pipeline contract
pub mod gateway;

// configuration loading
pub mod config;
