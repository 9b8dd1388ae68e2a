//! `SQLite`-backed persistence for the proxy: keys, users, the provider
//! catalog, and message-request bookkeeping.
//!
//! Connections are pooled with `r2d2`; most `Provider` tunables live in a
//! JSON `config` column rather than dozens of dedicated SQL columns.

pub mod errors;
pub mod message_request;
pub mod pool;
pub mod repositories;

pub use errors::StorageError;
pub use message_request::{AsyncWriter, MessageRequestRecord, MessageRequestWriter, SyncWriter};
pub use pool::{build_pool, Pool};
pub use repositories::{EndpointRepository, KeyRepository, ProviderRepository, UserRepository};
