//! Rust-specific implemenations.
//!
//! This module includes:
//! - panic handler

pub mod panicking;
