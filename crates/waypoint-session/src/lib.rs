//! Session tracking and the Codex session-id completer.
//!
//! [`tracker::SessionTracker`] owns the in-flight concurrency bookkeeping
//! and session-record stickiness; [`fingerprint::CodexCompleter`] fills in a
//! session id for Codex requests that don't carry one.

pub mod fingerprint;
pub mod tracker;

pub use fingerprint::{CodexCompleter, Completion, FingerprintInputs, IdSources};
pub use tracker::{AssignContext, SessionTracker};
