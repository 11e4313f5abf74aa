//! Request instrumentation for the router.

pub mod tower;
pub mod track;

pub use self::{tower::TraceLayer, track::track_requests};
