//! Foundation module - Core utilities and types
//!
//! - Math types and camera matrices
//! - Aligned memory layouts for GPU uploads
//! - Logging utilities

pub mod logging;
pub mod math;
pub mod memory;
