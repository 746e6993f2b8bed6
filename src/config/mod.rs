//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! agent config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → OperatorConfig (validated, immutable for the agent's lifetime)
//!
//! charm options file (YAML)
//!     → loader.rs (parse, defaults when absent)
//!     → CharmOptions (re-read on every reconciliation pass)
//!
//! On change:
//!     watcher.rs detects option or relation writes
//!     → config-changed / <endpoint>-relation-changed hook queued
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Charm options are never cached; every pass reads them fresh

pub mod loader;
pub mod options;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use options::CharmOptions;
pub use schema::OperatorConfig;
pub use schema::UnitConfig;
pub use schema::WorkloadConfig;
