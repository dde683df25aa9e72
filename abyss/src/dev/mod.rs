//! Devices.

pub mod pic;
pub mod pit;
pub mod serial;
