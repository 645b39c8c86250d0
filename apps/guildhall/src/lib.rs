//! # Guildhall Library
//!
//! This library exposes the Guildhall CLI commands for testing and
//! integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod cli;

// Re-export guildhall_core for convenience
pub use guildhall_core;
