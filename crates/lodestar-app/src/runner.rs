//! Application runner and event loop.

use std::path::PathBuf;
use std::sync::Arc;

use lodestar_core::constants::DEFAULT_BACKBUFFER_COUNT;
use lodestar_core::LogLevel;
use lodestar_gpu::GpuContextBuilder;
use lodestar_platform::PlatformConfig;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::window::WindowId;

use crate::app::App;
use crate::context::{AppContext, FrameOutcome};
use crate::frame::FrameContext;
use crate::logging::{init_logging, LoggingConfig};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also reported to the driver as the application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    pub fullscreen: bool,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers if installed.
    pub validation: bool,
    /// Number of swapchain images and frames in flight.
    pub backbuffers: u32,
    pub log_level: LogLevel,
    pub logfile: Option<PathBuf>,
    pub popups: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lodestar".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
            vsync: true,
            validation: false,
            backbuffers: DEFAULT_BACKBUFFER_COUNT,
            log_level: LogLevel::default(),
            logfile: None,
            popups: true,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = fullscreen;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_backbuffers(mut self, count: u32) -> Self {
        self.backbuffers = count;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.logfile = Some(path.into());
        self
    }

    pub fn with_popups(mut self, popups: bool) -> Self {
        self.popups = popups;
        self
    }

    fn platform(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            fullscreen: self.fullscreen,
            resizable: true,
        }
    }

    fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level,
            logfile: self.logfile.clone(),
            popups: self.popups,
        }
    }
}

/// Run an [`App`] with the given configuration.
///
/// Initializes logging, creates the window and GPU context and runs the
/// event loop until the window closes. A failed bootstrap is returned as an
/// error.
pub fn run_app<A: App + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging(&config.logging())?;

    info!("{} starting...", config.title);

    let event_loop = lodestar_platform::create_event_loop()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: App> {
    config: AppConfig,
    state: Option<AppState<A>>,
    failure: Option<anyhow::Error>,
}

/// Internal application state.
struct AppState<A: App> {
    app: A,
    ctx: AppContext,
}

impl<A: App + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e:#}");
                        self.fail(event_loop, e);
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e:#}");
                        self.fail(event_loop, e);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: App + 'static> AppRunner<A> {
    /// Record a fatal error, release the application and stop the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        self.failure = Some(error);
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }

    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window = Arc::new(lodestar_platform::create_window(
            event_loop,
            &self.config.platform(),
        )?);

        let size = window.inner_size();
        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .log_level(self.config.log_level)
            .backbuffer_count(self.config.backbuffers)
            .vsync(self.config.vsync)
            .battery_status(lodestar_platform::battery_status())
            .build(window.as_ref(), size.width.max(1), size.height.max(1))?;

        let mut ctx = AppContext::new(window, gpu)?;
        let app = A::init(&mut ctx)?;

        Ok(AppState { app, ctx })
    }
}

impl<A: App> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let now = std::time::Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;

        self.app.update(&self.ctx, dt);

        let app = &mut self.app;
        let outcome = self
            .ctx
            .run_frame(dt, |ctx, frame: &mut FrameContext| app.render(ctx, frame))?;

        if outcome == FrameOutcome::NeedsRecreate {
            let size = self.ctx.window.inner_size();
            self.handle_resize(size.width, size.height)?;
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        // Minimized windows have nothing to present to
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.ctx.recreate_swapchain(width, height)?;
        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self) {
        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            warn!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);
        self.ctx.gpu.swapchain_mut().destroy();

        if self.ctx.frame_count > 0 {
            info!("Total frames: {}", self.ctx.frame_count);
        }
        info!("Cleanup complete");
    }
}
