//! Core types for the Lodestar engine.
//!
//! This crate provides the small vocabulary shared by the GPU, platform and
//! application crates:
//! - Log severity thresholds
//! - Host power-source status
//! - Common error types

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{BatteryStatus, LogLevel};

/// Engine-wide constants
pub mod constants {
    /// Name reported to the driver as the engine name.
    pub const ENGINE_NAME: &str = "Lodestar";
    /// Engine version reported to the driver.
    pub const ENGINE_VERSION: u32 = 1;
    /// Backbuffer count used when none is configured.
    pub const DEFAULT_BACKBUFFER_COUNT: u32 = 3;
}
