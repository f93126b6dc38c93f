//! Livedata daemon library
//!
//! HTTP request boundary, job queue, SSH transport and retention schedule.
//! Exposed as a library so integration tests can drive the router in-process.

pub mod queue;
pub mod routes;
pub mod scheduler;
pub mod server;
pub mod ssh;
