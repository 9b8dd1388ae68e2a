//! # waypoint-forwarder
//!
//! The retry loop that drives one inbound request across providers and
//! endpoints until it succeeds, is rejected as a client error, or the
//! candidate pool is exhausted.
//!
//! - [`classify`]: maps a dispatch outcome to an [`waypoint_core::ErrorCategory`]
//!   and a retry decision.
//! - [`headers`]: per-attempt outbound header construction, auth injection,
//!   and log redaction.
//! - [`forward`]: [`forward::Forwarder`], the orchestrator tying selection,
//!   endpoint resolution, dispatch, and the circuit breakers together.
//! - [`types`]: request/outcome types and the [`types::Dispatcher`] trait the
//!   orchestrator dispatches through.
//! - [`errors`]: [`errors::ForwardError`], the forwarder's public error type.

#![deny(unsafe_code)]

pub mod classify;
pub mod errors;
pub mod forward;
pub mod headers;
pub mod types;

pub use errors::ForwardError;
pub use forward::{Forwarder, ProviderContext};
pub use types::{AttemptPlan, DispatchOutcome, Dispatcher, ForwardRequest, ForwardSuccess};
