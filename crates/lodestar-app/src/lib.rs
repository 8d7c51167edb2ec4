//! Application framework for the Lodestar engine.
//!
//! This crate handles the boilerplate around a windowed Vulkan application:
//! - Logging setup
//! - Window creation and the event loop
//! - GPU bootstrap and swapchain recreation
//! - Per-frame acquire, submit and present
//!
//! # Example
//!
//! ```no_run
//! use lodestar_app::{run_app, App, AppConfig, AppContext, FrameContext};
//!
//! struct MyApp;
//!
//! impl App for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {}
//!
//!     fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
pub mod logging;
mod runner;

pub use app::App;
pub use context::AppContext;
pub use frame::FrameContext;
pub use logging::{init_logging, LoggingConfig};
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use lodestar_gpu::{GpuContext, GpuContextBuilder};
pub use winit::event::WindowEvent;
