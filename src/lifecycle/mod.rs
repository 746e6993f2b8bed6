//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → metrics → watcher → event loop → admin API → install event
//!
//! Event loop (agent.rs):
//!     mpsc queue → Reconciler::handle (one at a time) → AgentStatus snapshot
//!     Waiting → update-status re-queued after backoff
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → broadcast → loop, probe and admin API stop
//! ```
//!
//! # Design Decisions
//! - One consumer: passes never overlap
//! - Dex outlives the agent; stopping the agent does not stop Dex

pub mod agent;
pub mod shutdown;
pub mod signals;
pub mod startup;
