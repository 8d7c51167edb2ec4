//! Window-system surface extension negotiation.
//!
//! Every presentable surface needs the generic `VK_KHR_surface` extension plus
//! exactly one platform extension. The platform is resolved once, from the
//! window's display handle, into a [`WindowSystem`] and from there into a
//! concrete extension table.

use std::ffi::CStr;

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::error::{GpuError, Result};

/// Native window systems a surface can be created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowSystem {
    Win32,
    Xlib,
    Xcb,
    Wayland,
    Android,
    MacOs,
    Ios,
}

impl WindowSystem {
    /// Minimum number of surface extensions any platform needs.
    pub const REQUIRED_EXTENSION_COUNT: usize = 2;

    /// Resolve the window system from a display handle.
    pub fn from_display_handle(handle: RawDisplayHandle) -> Option<Self> {
        match handle {
            RawDisplayHandle::Windows(_) => Some(Self::Win32),
            RawDisplayHandle::Xlib(_) => Some(Self::Xlib),
            RawDisplayHandle::Xcb(_) => Some(Self::Xcb),
            RawDisplayHandle::Wayland(_) => Some(Self::Wayland),
            RawDisplayHandle::Android(_) => Some(Self::Android),
            RawDisplayHandle::AppKit(_) => Some(Self::MacOs),
            RawDisplayHandle::UiKit(_) => Some(Self::Ios),
            _ => None,
        }
    }

    /// The window system a build targets when no display handle is at hand.
    pub const fn target_default() -> Self {
        if cfg!(target_os = "windows") {
            Self::Win32
        } else if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else {
            Self::Xlib
        }
    }

    /// The platform-specific surface extension for this window system.
    pub const fn platform_extension(self) -> &'static CStr {
        match self {
            Self::Win32 => ash::khr::win32_surface::NAME,
            Self::Xlib => ash::khr::xlib_surface::NAME,
            Self::Xcb => ash::khr::xcb_surface::NAME,
            Self::Wayland => ash::khr::wayland_surface::NAME,
            Self::Android => ash::khr::android_surface::NAME,
            Self::MacOs | Self::Ios => ash::ext::metal_surface::NAME,
        }
    }

    /// Generic surface extension followed by the platform extension.
    pub const fn extension_table(self) -> [&'static CStr; 2] {
        [ash::khr::surface::NAME, self.platform_extension()]
    }
}

/// Collect the names from enumerated extension properties.
pub fn extension_names(properties: &[vk::ExtensionProperties]) -> Vec<&CStr> {
    properties
        .iter()
        .filter_map(|props| props.extension_name_as_c_str().ok())
        .collect()
}

/// Pick the surface extensions to enable for `window_system`.
///
/// `available` is the full instance-extension list and `capacity` the room the
/// caller has for the result. Returns the generic surface extension followed
/// by the platform extension.
pub fn query_window_system(
    window_system: WindowSystem,
    available: &[&CStr],
    capacity: usize,
) -> Result<Vec<&'static CStr>> {
    if capacity == 0 {
        tracing::error!("Window system query needs a non-zero output capacity");
        return Err(GpuError::CapacityExceeded {
            needed: WindowSystem::REQUIRED_EXTENSION_COUNT,
            capacity,
        });
    }

    let desired: Vec<&'static CStr> = window_system
        .extension_table()
        .into_iter()
        .filter(|wanted| available.contains(wanted))
        .collect();

    if desired.len() < WindowSystem::REQUIRED_EXTENSION_COUNT {
        tracing::error!(
            "Failed to find the {:?} platform surface extensions (found {})",
            window_system,
            desired.len()
        );
        let missing = window_system
            .extension_table()
            .into_iter()
            .filter(|wanted| !desired.contains(wanted))
            .map(|name| name.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(GpuError::MissingRequiredExtension(missing));
    }

    if desired.len() > capacity {
        tracing::error!(
            "Found {} surface extensions but only {} fit",
            desired.len(),
            capacity
        );
        return Err(GpuError::CapacityExceeded {
            needed: desired.len(),
            capacity,
        });
    }

    Ok(desired)
}
