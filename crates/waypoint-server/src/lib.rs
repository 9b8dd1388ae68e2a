//! # waypoint-server
//!
//! The request-execution engine's HTTP surface: a guard pipeline
//! (authenticate, rate-limit, session-assign) in front of the
//! [`waypoint_forwarder::Forwarder`] retry loop, mounted behind one axum
//! `Router` per the wire-format route table.
//!
//! - [`server`]: `AppState`, route wiring, and the shared per-route handler.
//! - [`pipeline`]: the guard stages each request runs before forwarding.
//! - [`catalog`]: the [`waypoint_forwarder::ProviderContext`] adapter over
//!   `SQLite`-backed repositories.
//! - [`dispatch`]: the [`waypoint_forwarder::Dispatcher`] adapter over
//!   `reqwest`.
//! - [`cost`]: the pure cost-computation interface.
//! - [`health`]: liveness/readiness handlers.
//! - [`metrics`]: the Prometheus recorder and metric name constants.
//! - [`shutdown`]: graceful shutdown via `CancellationToken` coordination.

#![deny(unsafe_code)]

pub mod catalog;
pub mod cost;
pub mod dispatch;
pub mod health;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod shutdown;
