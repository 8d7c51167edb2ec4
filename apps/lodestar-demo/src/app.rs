//! Clear-colour demo application.

use ash::vk;
use lodestar_app::{App, AppContext, FrameContext};
use lodestar_gpu::swapchain::color_subresource_range;
use tracing::info;

/// Seconds for one full trip around the hue circle.
const CYCLE_SECONDS: f32 = 6.0;

pub struct ClearDemo {
    elapsed: f32,
}

impl ClearDemo {
    fn clear_color(&self) -> [f32; 4] {
        let hue = (self.elapsed / CYCLE_SECONDS).fract();
        let [r, g, b] = hue_to_rgb(hue);
        [r, g, b, 1.0]
    }
}

/// Fully saturated colour for a hue in `[0, 1)`.
fn hue_to_rgb(hue: f32) -> [f32; 3] {
    let h = hue * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    match h as u32 {
        0 => [1.0, x, 0.0],
        1 => [x, 1.0, 0.0],
        2 => [0.0, 1.0, x],
        3 => [0.0, x, 1.0],
        4 => [x, 0.0, 1.0],
        _ => [1.0, 0.0, x],
    }
}

impl App for ClearDemo {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        info!(
            "Clearing {}x{} with {} frames in flight",
            ctx.width(),
            ctx.height(),
            ctx.frames_in_flight()
        );
        Ok(Self { elapsed: 0.0 })
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        self.elapsed += dt;
    }

    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let clear = vk::ClearColorValue {
            float32: self.clear_color(),
        };
        let range = color_subresource_range();

        // SAFETY: the command buffer is recording and the image is in
        // TRANSFER_DST_OPTIMAL layout.
        unsafe {
            ctx.gpu.device().cmd_clear_color_image(
                frame.command_buffer,
                frame.swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear,
                &[range],
            );
        }
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        info!("Presented {} frames", ctx.frame_count);
    }
}
