//! Livedata Common - live device queries for network inventory objects
//!
//! Resolve an interface, device or cluster to the device that can actually
//! be reached, render its CLI command templates, run them over one session,
//! and filter the output. Also owns the job result store, retention sweeper
//! and configuration shared by the daemon and the CLI.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod error;
pub mod interface_name;
pub mod job;
pub mod orchestrator;
pub mod output_filter;
pub mod resolver;
pub mod result_store;
pub mod sweeper;
pub mod template;
pub mod transport;
pub mod types;

pub use error::{JobFailure, LivedataError, Result};
pub use output_filter::apply_output_filter;
pub use types::*;
