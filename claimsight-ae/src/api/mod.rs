//! HTTP API handlers for claimsight-ae
//!
//! Engine control via REST, live updates via SSE.

pub mod engine;
pub mod health;
pub mod sse;

pub use engine::engine_routes;
pub use health::health_routes;
pub use sse::event_stream;
