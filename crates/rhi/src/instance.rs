//! Vulkan 1.3 instance with optional Khronos validation.
//!
//! When validation is on, layer messages are routed into `tracing` under the
//! `vulkan` target.

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::RhiResult;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"terrain";

/// Debug-utils loader and the messenger installed through it.
struct Validation {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// The Vulkan instance and its loader entry.
///
/// Everything created from the instance must be destroyed before it.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    validation: Option<Validation>,
}

impl Instance {
    /// Loads Vulkan and creates the instance with `surface_extensions`
    /// enabled. Validation is turned on when `enable_validation` is set and
    /// the layer is installed; a missing layer only logs a warning.
    pub fn new(
        application_name: &CStr,
        enable_validation: bool,
        surface_extensions: &[*const c_char],
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validate = enable_validation && validation_layer_installed(&entry)?;
        if enable_validation && !validate {
            warn!("{:?} is not installed, running without validation", VALIDATION_LAYER);
        }

        let version = vk::make_api_version(0, 0, 1, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(application_name)
            .application_version(version)
            .engine_name(ENGINE_NAME)
            .engine_version(version)
            .api_version(vk::API_VERSION_1_3);

        let extensions = instance_extensions(surface_extensions, validate);
        let layers: Vec<*const c_char> = if validate {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!(
            "Vulkan 1.3 instance, {} extensions, validation {}",
            extensions.len(),
            if validate { "on" } else { "off" }
        );

        let validation = if validate {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) } {
                Ok(messenger) => Some(Validation { loader, messenger }),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            validation,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Whether validation messages are being reported.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.validation.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(validation) = self.validation.take() {
                validation
                    .loader
                    .destroy_debug_utils_messenger(validation.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

fn validation_layer_installed(entry: &Entry) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER)))
}

/// `surface` without duplicates, plus debug utils when validating.
fn instance_extensions(surface: &[*const c_char], validate: bool) -> Vec<*const c_char> {
    let mut names: Vec<&CStr> = Vec::with_capacity(surface.len() + 1);
    for &ptr in surface {
        // SAFETY: ash-window and ash hand out static nul-terminated names.
        let name = unsafe { CStr::from_ptr(ptr) };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if validate {
        names.push(ash::ext::debug_utils::NAME);
    }
    names.into_iter().map(CStr::as_ptr).collect()
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(forward_to_tracing))
}

unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the loader passes either null or valid callback data.
    let Some(data) = (unsafe { data.as_ref() }) else {
        return vk::FALSE;
    };
    let message = unsafe { data.message_as_c_str() }
        .map_or(Cow::Borrowed("<empty>"), CStr::to_string_lossy);
    let kind = message_kind(kind);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{kind}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "[{kind}] {message}");
    } else {
        trace!(target: "vulkan", "[{kind}] {message}");
    }
    vk::FALSE
}

fn message_kind(kind: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ptrs: &[*const c_char]) -> Vec<&'static CStr> {
        ptrs.iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect()
    }

    #[test]
    fn test_surface_extensions_deduplicated() {
        let surface = [
            ash::khr::surface::NAME.as_ptr(),
            ash::khr::surface::NAME.as_ptr(),
        ];
        assert_eq!(
            names(&instance_extensions(&surface, false)),
            [ash::khr::surface::NAME]
        );
    }

    #[test]
    fn test_validation_adds_debug_utils() {
        let surface = [ash::khr::surface::NAME.as_ptr()];
        assert_eq!(
            names(&instance_extensions(&surface, true)),
            [ash::khr::surface::NAME, ash::ext::debug_utils::NAME]
        );
    }

    #[test]
    fn test_message_kind() {
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "validation"
        );
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            "performance"
        );
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL),
            "general"
        );
    }
}
