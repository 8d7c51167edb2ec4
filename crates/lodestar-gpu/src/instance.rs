//! Vulkan instance creation.
//!
//! [`InstanceContext`] owns the loader entry, the instance and the optional
//! debug messenger. It is the first object created during bootstrap and the
//! last one destroyed.

use std::ffi::{c_char, c_void, CStr, CString};

use ash::vk;
use lodestar_core::constants::{ENGINE_NAME, ENGINE_VERSION};
use lodestar_core::LogLevel;

use crate::error::{GpuError, Result};
use crate::window_system::{extension_names, query_window_system, WindowSystem};

/// Standard validation layer.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Room reserved for enabled extension names.
const MAX_ENABLED_EXTENSIONS: usize = 16;

/// Instance creation parameters.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Application version reported to the driver.
    pub app_version: u32,
    /// Request the validation layer if it is installed.
    pub validate: bool,
    /// Logging threshold, also used to filter driver diagnostics.
    pub log_level: LogLevel,
    /// Window system whose surface extension must be enabled.
    pub window_system: WindowSystem,
}

/// Live Vulkan instance.
pub struct InstanceContext {
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    instance: ash::Instance,
    // Must outlive the instance
    entry: ash::Entry,
    enabled_extensions: Vec<&'static CStr>,
    enabled_layers: Vec<&'static CStr>,
    validation_enabled: bool,
}

impl InstanceContext {
    /// Load Vulkan and create an instance.
    pub fn new(config: &InstanceConfig) -> Result<Self> {
        // SAFETY: loading the system Vulkan library runs its initialisation
        // code; nothing else in this process depends on it yet.
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            tracing::error!("Failed to load the Vulkan loader: {e}");
            GpuError::Loading(e.to_string())
        })?;

        // SAFETY: entry is live for the rest of this function.
        unsafe { Self::with_entry(entry, config) }
    }

    /// Create an instance from an already loaded entry.
    ///
    /// # Safety
    /// The entry must be a valid Vulkan entry point.
    pub unsafe fn with_entry(entry: ash::Entry, config: &InstanceConfig) -> Result<Self> {
        let app_name = CString::new(config.app_name.as_str())
            .map_err(|_| GpuError::InvalidState("application name contains a NUL byte".into()))?;
        let engine_name = CString::new(ENGINE_NAME)
            .map_err(|_| GpuError::InvalidState("engine name contains a NUL byte".into()))?;

        // Validation is optional: its absence is not an error
        let available_layers = unsafe { entry.enumerate_instance_layer_properties() }
            .unwrap_or_else(|e| {
                tracing::warn!("vkEnumerateInstanceLayerProperties failed: {e}");
                Vec::new()
            });
        let layer_names: Vec<&CStr> = available_layers
            .iter()
            .filter_map(|props| props.layer_name_as_c_str().ok())
            .collect();
        let enabled_layers = select_layers(config.validate, &layer_names);
        let validation_enabled = !enabled_layers.is_empty();
        if validation_enabled {
            tracing::info!("Found standard validation layer");
        } else if config.validate {
            tracing::info!(
                "Validation requested but {} is not installed, continuing without it",
                VALIDATION_LAYER.to_string_lossy()
            );
        }

        let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(|e| {
                tracing::error!("vkEnumerateInstanceExtensionProperties failed: {e}");
                GpuError::from(e)
            })?;
        if available_extensions.is_empty() {
            tracing::error!("Driver reported no instance extensions");
            return Err(GpuError::MissingRequiredExtension(
                ash::khr::surface::NAME.to_string_lossy().into_owned(),
            ));
        }
        let available_names = extension_names(&available_extensions);

        let mut enabled_extensions =
            query_window_system(config.window_system, &available_names, MAX_ENABLED_EXTENSIONS)?;

        let debug_enabled = config.log_level.is_enabled()
            && available_names.contains(&ash::ext::debug_utils::NAME);
        if debug_enabled {
            tracing::info!("Found debug utils extension in instance extension list");
            enabled_extensions.push(ash::ext::debug_utils::NAME);
        }

        let portability = cfg!(target_os = "macos")
            && available_names.contains(&ash::khr::portability_enumeration::NAME);
        if portability {
            enabled_extensions.push(ash::khr::portability_enumeration::NAME);
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(config.app_version)
            .engine_name(&engine_name)
            .engine_version(ENGINE_VERSION)
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs: Vec<*const c_char> =
            enabled_extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = enabled_layers.iter().map(|l| l.as_ptr()).collect();

        let create_flags = if portability {
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        let mut debug_info = debug_messenger_info(config.log_level).filter(|_| debug_enabled);

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .flags(create_flags);
        if let Some(info) = debug_info.as_mut() {
            create_info = create_info.push_next(info);
        }

        let instance = match unsafe { entry.create_instance(&create_info, None) } {
            Ok(instance) => instance,
            Err(vk::Result::ERROR_INCOMPATIBLE_DRIVER) => {
                tracing::error!("vkCreateInstance could not find a compatible Vulkan ICD");
                return Err(GpuError::IncompatibleDriver);
            }
            Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT) => {
                tracing::error!("vkCreateInstance could not find one or more extensions");
                return Err(GpuError::MissingRequiredExtension(
                    describe_names(&enabled_extensions),
                ));
            }
            Err(e) => {
                tracing::error!("vkCreateInstance failed with {e} ({})", e.as_raw());
                return Err(e.into());
            }
        };

        let debug_messenger = match debug_info {
            Some(mut info) => {
                info.p_next = std::ptr::null();
                let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
                match unsafe { loader.create_debug_utils_messenger(&info, None) } {
                    Ok(messenger) => Some((loader, messenger)),
                    Err(e) => {
                        tracing::error!("vkCreateDebugUtilsMessengerEXT failed: {e}");
                        unsafe { instance.destroy_instance(None) };
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        tracing::info!(
            "Vulkan instance created ({} extensions, {} layers)",
            enabled_extensions.len(),
            enabled_layers.len()
        );

        Ok(Self {
            debug_messenger,
            instance,
            entry,
            enabled_extensions,
            enabled_layers,
            validation_enabled,
        })
    }

    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Extensions enabled on the instance.
    pub fn enabled_extensions(&self) -> &[&'static CStr] {
        &self.enabled_extensions
    }

    /// Layers enabled on the instance.
    pub fn enabled_layers(&self) -> &[&'static CStr] {
        &self.enabled_layers
    }

    /// Whether the validation layer is active.
    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    /// Whether a debug messenger is registered.
    pub fn debug_enabled(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Ensure at least one physical device is visible to this instance.
    pub fn physical_device_count(&self) -> Result<usize> {
        let devices = unsafe { self.instance.enumerate_physical_devices() }.map_err(|e| {
            tracing::error!("vkEnumeratePhysicalDevices failed: {e}");
            GpuError::from(e)
        })?;
        if devices.is_empty() {
            tracing::error!("vkEnumeratePhysicalDevices reported no devices");
            return Err(GpuError::NoSuitableDevice);
        }
        Ok(devices.len())
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Layers to enable given the validation request and installed layers.
pub fn select_layers(validate: bool, available: &[&CStr]) -> Vec<&'static CStr> {
    if validate && available.contains(&VALIDATION_LAYER) {
        vec![VALIDATION_LAYER]
    } else {
        Vec::new()
    }
}

/// Severity mask forwarded by the debug messenger for a log level.
///
/// Each level includes all more severe ones. Returns `None` when logging is
/// disabled.
pub fn debug_severity_mask(level: LogLevel) -> Option<vk::DebugUtilsMessageSeverityFlagsEXT> {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

    if !level.is_enabled() {
        return None;
    }

    let mut mask = Severity::ERROR;
    if level.allows(LogLevel::Warn) {
        mask |= Severity::WARNING;
    }
    if level.allows(LogLevel::Info) {
        mask |= Severity::INFO;
    }
    if level.allows(LogLevel::All) {
        mask |= Severity::VERBOSE;
    }
    Some(mask)
}

/// Message types forwarded by the debug messenger for a log level.
///
/// Performance warnings are reported from `Warn` upwards.
pub fn debug_type_mask(level: LogLevel) -> vk::DebugUtilsMessageTypeFlagsEXT {
    use vk::DebugUtilsMessageTypeFlagsEXT as Kind;

    let mut mask = Kind::GENERAL | Kind::VALIDATION;
    if level.allows(LogLevel::Warn) {
        mask |= Kind::PERFORMANCE;
    }
    mask
}

fn debug_messenger_info(level: LogLevel) -> Option<vk::DebugUtilsMessengerCreateInfoEXT<'static>> {
    debug_severity_mask(level).map(|severity| {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity)
            .message_type(debug_type_mask(level))
            .pfn_user_callback(Some(vulkan_debug_callback))
    })
}

fn describe_names(names: &[&CStr]) -> String {
    names
        .iter()
        .map(|name| name.to_string_lossy())
        .collect::<Vec<_>>()
        .join(", ")
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the driver hands us valid callback data for the duration of the call
    let data = unsafe { &*p_callback_data };
    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
    };
    let performance = message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE);

    match message_severity {
        Severity::ERROR => tracing::error!(target: "vulkan", "{message}"),
        Severity::WARNING if performance => {
            tracing::warn!(target: "vulkan", "[performance] {message}");
        }
        Severity::WARNING => tracing::warn!(target: "vulkan", "{message}"),
        Severity::INFO => tracing::info!(target: "vulkan", "{message}"),
        _ => tracing::debug!(target: "vulkan", "{message}"),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
    use vk::DebugUtilsMessageTypeFlagsEXT as Kind;

    #[test]
    fn validation_needs_request_and_layer() {
        let installed = [c"VK_LAYER_MESA_device_select", VALIDATION_LAYER];
        assert_eq!(select_layers(true, &installed), vec![VALIDATION_LAYER]);
        assert!(select_layers(false, &installed).is_empty());
        assert!(select_layers(true, &installed[..1]).is_empty());
    }

    #[test]
    fn disabled_logging_registers_no_messenger() {
        assert!(debug_severity_mask(LogLevel::Disable).is_none());
        assert!(debug_messenger_info(LogLevel::Disable).is_none());
    }

    #[test]
    fn severity_accumulates_by_threshold() {
        assert_eq!(debug_severity_mask(LogLevel::Error), Some(Severity::ERROR));
        assert_eq!(
            debug_severity_mask(LogLevel::Warn),
            Some(Severity::ERROR | Severity::WARNING)
        );
        assert_eq!(
            debug_severity_mask(LogLevel::Info),
            Some(Severity::ERROR | Severity::WARNING | Severity::INFO)
        );
        assert_eq!(
            debug_severity_mask(LogLevel::All),
            Some(Severity::ERROR | Severity::WARNING | Severity::INFO | Severity::VERBOSE)
        );
    }

    #[test]
    fn performance_warnings_follow_warn_threshold() {
        assert!(!debug_type_mask(LogLevel::Error).contains(Kind::PERFORMANCE));
        assert!(debug_type_mask(LogLevel::Warn).contains(Kind::PERFORMANCE));
        assert!(debug_type_mask(LogLevel::All).contains(Kind::VALIDATION));
    }
}
