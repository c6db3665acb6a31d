//! Health probing subsystem.
//!
//! # Data Flow
//! ```text
//! Liveness (probes.rs):
//!     GET /liveness → 200, no dependency check
//!
//! Readiness (probes.rs → state.rs):
//!     GET /readiness → lock gate → 200 or 503
//!
//! Gate writers:
//!     startup (after store init) → true
//!     shutdown (before drain)    → false
//! ```
//!
//! # Design Decisions
//! - Liveness detects a dead or deadlocked process, not partial degradation
//! - Readiness flips off ahead of the listener closing, so load balancers
//!   stop routing before connections are refused

pub mod probes;
pub mod state;

pub use state::ReadinessGate;
