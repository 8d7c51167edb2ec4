//! `App` trait definition.

use winit::event::WindowEvent;

use crate::context::AppContext;
use crate::frame::FrameContext;

/// Trait for Lodestar applications.
///
/// The framework creates the window and GPU context, acquires a swapchain
/// image every frame and presents it once the application has recorded its
/// commands.
pub trait App: Sized {
    /// Initialize the application.
    ///
    /// Called once after the GPU context and window have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state. `dt` is the time since the last frame in
    /// seconds.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record rendering commands for one frame.
    ///
    /// The swapchain image is in `TRANSFER_DST_OPTIMAL` layout while this
    /// runs; the framework handles both layout transitions, queue ownership
    /// transfers, submission and presentation.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// Handle window resize. The swapchain has already been recreated.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events. Return `true` to stop further processing.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Release application resources. The GPU is idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
