//! Platform abstraction for the Lodestar engine.
//!
//! Provides the event loop, window creation and the host power-source status
//! used for GPU selection.

pub mod power;

use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Fullscreen, Window, WindowAttributes};

pub use power::battery_status;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Borderless fullscreen on the current monitor.
    pub fullscreen: bool,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Lodestar".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
            resizable: true,
        }
    }
}

impl PlatformConfig {
    /// Window attributes for this configuration.
    pub fn window_attributes(&self) -> WindowAttributes {
        let attributes = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(self.resizable);

        if self.fullscreen {
            attributes.with_fullscreen(Some(Fullscreen::Borderless(None)))
        } else {
            attributes
        }
    }
}

/// Create the application event loop.
pub fn create_event_loop() -> Result<EventLoop<()>> {
    EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))
}

/// Open a window described by `config`.
pub fn create_window(event_loop: &ActiveEventLoop, config: &PlatformConfig) -> Result<Window> {
    let window = event_loop
        .create_window(config.window_attributes())
        .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;
    tracing::info!(
        "Window created: {}x{}{}",
        config.width,
        config.height,
        if config.fullscreen { " (fullscreen)" } else { "" }
    );
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_windowed() {
        let config = PlatformConfig::default();
        assert!(!config.fullscreen);
        assert!(config.resizable);
        assert_eq!((config.width, config.height), (1280, 720));
    }

    #[test]
    fn fullscreen_attributes() {
        let windowed = PlatformConfig::default().window_attributes();
        assert!(windowed.fullscreen.is_none());

        let fullscreen = PlatformConfig {
            fullscreen: true,
            ..PlatformConfig::default()
        }
        .window_attributes();
        assert!(matches!(
            fullscreen.fullscreen,
            Some(Fullscreen::Borderless(None))
        ));
        assert_eq!(fullscreen.title, "Lodestar");
    }

    #[test]
    fn errors_name_the_failing_step() {
        let window = PlatformError::WindowCreation("no display".into());
        assert_eq!(window.to_string(), "Window creation failed: no display");
        let event_loop = PlatformError::EventLoop("already running".into());
        assert_eq!(event_loop.to_string(), "Event loop error: already running");
    }
}
