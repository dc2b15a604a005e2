//! Inferlink server.
//!
//! Owns exactly one transport and one backend. Requests arriving on
//! the transport are enqueued; a single dedicated worker drains the
//! queue sequentially, runs the backend, and streams results back
//! through the transport under a per-request credit budget.

pub mod config;
pub mod error;
pub mod queue;

mod dispatch;

pub use config::ServerConfig;
pub use dispatch::{CreditBudget, Server, ShutdownHandle};
pub use error::{Result, ServerError};
pub use queue::{WorkItem, WorkQueue};
