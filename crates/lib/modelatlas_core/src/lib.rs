//! # modelatlas_core
//!
//! Core client logic for Model Atlas: session resolution, transports,
//! catalog browsing, statistics, record editing and submissions.

pub mod auth;
pub mod card;
pub mod catalog;
pub mod charts;
pub mod config;
pub mod context;
pub mod details;
pub mod error;
pub mod models;
pub mod session;
pub mod stats;
pub mod storage;
pub mod submission;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
