//! Relation data exchange subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound (remote application bag):
//!     store.rs (raw key/value bag)
//!     → exchanger.rs negotiate (_supported_versions)
//!     → exchanger.rs consume (schema.rs validation)
//!     → Record<T> handed to the settings assembler
//!
//! Outbound (our application bag):
//!     payload built from final Settings
//!     → exchanger.rs publish (schema.rs validation first)
//!     → store.rs update_local_data (only when changed)
//!
//! Plain interfaces (oidc_config.rs, observability.rs) write their own keys
//! directly to the store.
//! ```
//!
//! # Design Decisions
//! - Validation always precedes transmission; an invalid payload writes nothing
//! - A remote that has not published yet yields zero records, not an error
//! - Writes are idempotent: unchanged bags are not rewritten

pub mod endpoints;
pub mod exchanger;
pub mod observability;
pub mod oidc_config;
pub mod schema;
pub mod store;

pub use exchanger::{Record, RelationExchanger};
pub use schema::{IngressRoute, OidcClient, SchemaVersion};
pub use store::{Bag, FsRelationStore, MemoryRelationStore, Relation, RelationStore};
