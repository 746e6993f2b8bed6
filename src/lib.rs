//! Dex auth operator library.
//!
//! Deploys, configures and relates Dex, an OpenID Connect provider.

pub mod config;
pub mod error;
pub mod relation;
pub mod settings;
pub mod workload;
pub mod reconciler;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod admin;

pub use config::schema::OperatorConfig;
pub use error::{Error, Result};
pub use lifecycle::shutdown::Shutdown;
pub use reconciler::{Event, Reconciler, UnitStatus};
