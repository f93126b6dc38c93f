//! Livedata Control - CLI client for the Livedata daemon

pub mod cli;
pub mod client;
pub mod commands;
