//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Pass ends Waiting
//!     → backoff.rs (delay for this attempt)
//!     → update-status re-queued after the delay
//! Pass ends Active or Blocked
//!     → attempt counter reset
//! ```

pub mod backoff;
