//! Recording session management
//!
//! This module provides the `SessionController` state machine that manages:
//! - Starting and stopping the background sampling loop
//! - The live-adjustable flush interval
//! - Periodic and final flushes of the sample buffer
//! - Session statistics and the operator-facing status line

mod config;
mod controller;
mod stats;

pub use config::SessionConfig;
pub use controller::SessionController;
pub(crate) use controller::{PeriodicFlush, Shared};
pub use stats::{SessionState, SessionStats};
