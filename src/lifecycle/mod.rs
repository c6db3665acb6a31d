//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → serve probes → initialize dependencies → readiness = true
//!
//! Shutdown (shutdown.rs):
//!     Signal received → readiness = false → stop accepting
//!     → drain (bounded) → release store → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: listener first, store handle second
//! - Shutdown has timeout: a drain that overruns is abandoned, not fatal

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{DrainOutcome, Shutdown, ShutdownPhase};
pub use startup::StartupError;
