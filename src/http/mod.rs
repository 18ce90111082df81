//! HTTP API server for external control
//!
//! This module provides a REST API for driving the session controller:
//! - POST /record/start - Start recording
//! - POST /record/stop - Stop recording (returns after the final flush)
//! - PUT /record/interval - Change the flush interval
//! - GET /record/status - Query session statistics
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::IntervalValue;
pub use routes::create_router;
pub use state::AppState;
