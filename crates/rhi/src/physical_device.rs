//! Adapter (physical device) enumeration and selection.
//!
//! Selection follows a strict rule set:
//! 1. Enumerate every physical device and order by performance preference
//!    (discrete, integrated, virtual, other).
//! 2. Skip software adapters (`PhysicalDeviceType::CPU`).
//! 3. Skip adapters below the minimum feature level (Vulkan 1.3 with
//!    tessellation, non-solid fill, timeline semaphores and dynamic rendering)
//!    or without graphics and present queues.
//! 4. The caller creates a device on each remaining adapter in order and keeps
//!    the first that succeeds ([`select_first`]). Running out of adapters is
//!    [`RhiError::NoSuitableGpu`].

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Queue family indices used by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family that supports graphics and transfer work.
    pub graphics_family: Option<u32>,
    /// Family that can present to the window surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both graphics and present families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics_family.into_iter().collect();
        families.extend(self.present_family.filter(|p| !families.contains(p)));
        families
    }
}

/// Feature bits that make up the minimum feature level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureLevel {
    pub api_version: u32,
    pub tessellation_shader: bool,
    pub fill_mode_non_solid: bool,
    pub timeline_semaphore: bool,
    pub dynamic_rendering: bool,
}

impl FeatureLevel {
    /// The level every adapter must reach.
    pub const MINIMUM: Self = Self {
        api_version: vk::API_VERSION_1_3,
        tessellation_shader: true,
        fill_mode_non_solid: true,
        timeline_semaphore: true,
        dynamic_rendering: true,
    };

    /// Returns the first missing capability, if any.
    pub fn missing_from(&self, supported: &FeatureLevel) -> Option<&'static str> {
        let version = |v: u32| (vk::api_version_major(v), vk::api_version_minor(v));
        if version(supported.api_version) < version(self.api_version) {
            return Some("Vulkan 1.3");
        }
        if self.tessellation_shader && !supported.tessellation_shader {
            return Some("tessellation shaders");
        }
        if self.fill_mode_non_solid && !supported.fill_mode_non_solid {
            return Some("wireframe fill mode");
        }
        if self.timeline_semaphore && !supported.timeline_semaphore {
            return Some("timeline semaphores");
        }
        if self.dynamic_rendering && !supported.dynamic_rendering {
            return Some("dynamic rendering");
        }
        None
    }
}

/// A hardware adapter that passed the feature-level and queue checks.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps, used to break preference ties.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for graphics and present.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        match self.properties.device_name_as_c_str().map(CStr::to_str) {
            Ok(Ok(name)) => name,
            _ => "<unnamed adapter>",
        }
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
            vk::PhysicalDeviceType::CPU => "software",
            _ => "other",
        }
    }

    /// Bytes across all device-local heaps. Breaks ties between adapters of
    /// the same type.
    pub fn device_local_memory(&self) -> u64 {
        let memory = &self.memory_properties;
        memory.memory_heaps[..memory.memory_heap_count as usize]
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = self.properties.api_version;
        write!(
            f,
            "{} ({}, Vulkan {}.{}, {:?})",
            self.device_name(),
            self.device_type_name(),
            vk::api_version_major(v),
            vk::api_version_minor(v),
            self.queue_families
        )
    }
}

/// Preference rank of a device type; lower is preferred. `None` means never use.
pub fn preference_rank(device_type: vk::PhysicalDeviceType) -> Option<u8> {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => Some(0),
        vk::PhysicalDeviceType::INTEGRATED_GPU => Some(1),
        vk::PhysicalDeviceType::VIRTUAL_GPU => Some(2),
        vk::PhysicalDeviceType::CPU => None,
        _ => Some(3),
    }
}

/// Lists hardware adapters that reach [`FeatureLevel::MINIMUM`], most preferred first.
///
/// An empty list is not an error here; [`select_first`] reports it.
pub fn enumerate_adapters(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Vec<PhysicalDeviceInfo>> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} Vulkan adapter(s)", devices.len());

    let mut adapters: Vec<(u8, PhysicalDeviceInfo)> = Vec::with_capacity(devices.len());
    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(rank) = preference_rank(properties.device_type) else {
            debug!("Adapter '{}' skipped: software adapter", name);
            continue;
        };

        let supported = query_feature_level(instance, device, &properties);
        if let Some(missing) = FeatureLevel::MINIMUM.missing_from(&supported) {
            debug!("Adapter '{}' skipped: missing {}", name, missing);
            continue;
        }

        let queue_families = find_queue_families(instance, device, surface, surface_loader);
        if !queue_families.is_complete() {
            debug!(
                "Adapter '{}' skipped: graphics={:?} present={:?}",
                name, queue_families.graphics_family, queue_families.present_family
            );
            continue;
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        adapters.push((
            rank,
            PhysicalDeviceInfo {
                device,
                properties,
                memory_properties,
                queue_families,
            },
        ));
    }

    adapters.sort_by(|(rank_a, a), (rank_b, b)| {
        rank_a
            .cmp(rank_b)
            .then_with(|| b.device_local_memory().cmp(&a.device_local_memory()))
    });

    Ok(adapters.into_iter().map(|(_, info)| info).collect())
}

/// Tries `create` on each adapter in order and returns the first success.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when every attempt failed or the list was empty.
pub fn select_first<A, T>(
    adapters: impl IntoIterator<Item = A>,
    mut create: impl FnMut(&A) -> RhiResult<T>,
) -> RhiResult<T> {
    for (index, adapter) in adapters.into_iter().enumerate() {
        match create(&adapter) {
            Ok(created) => return Ok(created),
            Err(e) => warn!("Device creation on adapter #{} failed: {}", index, e),
        }
    }
    Err(RhiError::NoSuitableGpu)
}

fn query_feature_level(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    properties: &vk::PhysicalDeviceProperties,
) -> FeatureLevel {
    let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut features12)
        .push_next(&mut features13);
    unsafe { instance.get_physical_device_features2(device, &mut features2) };
    let base = features2.features;

    FeatureLevel {
        api_version: properties.api_version,
        tessellation_shader: base.tessellation_shader == vk::TRUE,
        fill_mode_non_solid: base.fill_mode_non_solid == vk::TRUE,
        timeline_semaphore: features12.timeline_semaphore == vk::TRUE,
        dynamic_rendering: features13.dynamic_rendering == vk::TRUE,
    }
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        };

        // One family doing both avoids ownership transfers of swapchain images.
        if graphics && present {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn test_unique_families_shared() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_unique_families_split() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(1),
        };
        assert_eq!(indices.unique_families(), vec![2, 1]);
    }

    #[test]
    fn test_preference_rank_skips_software() {
        assert_eq!(preference_rank(vk::PhysicalDeviceType::CPU), None);
        assert!(
            preference_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
                < preference_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            preference_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
                < preference_rank(vk::PhysicalDeviceType::VIRTUAL_GPU)
        );
    }

    #[test]
    fn test_feature_level_minimum_met() {
        let supported = FeatureLevel::MINIMUM;
        assert_eq!(FeatureLevel::MINIMUM.missing_from(&supported), None);
    }

    #[test]
    fn test_feature_level_old_api() {
        let supported = FeatureLevel {
            api_version: vk::API_VERSION_1_2,
            ..FeatureLevel::MINIMUM
        };
        assert_eq!(
            FeatureLevel::MINIMUM.missing_from(&supported),
            Some("Vulkan 1.3")
        );
    }

    #[test]
    fn test_feature_level_newer_api_passes() {
        let supported = FeatureLevel {
            api_version: vk::make_api_version(0, 1, 4, 0),
            ..FeatureLevel::MINIMUM
        };
        assert_eq!(FeatureLevel::MINIMUM.missing_from(&supported), None);
    }

    #[test]
    fn test_feature_level_missing_tessellation() {
        let supported = FeatureLevel {
            tessellation_shader: false,
            ..FeatureLevel::MINIMUM
        };
        assert_eq!(
            FeatureLevel::MINIMUM.missing_from(&supported),
            Some("tessellation shaders")
        );
    }

    #[test]
    fn test_select_first_skips_failures() {
        let mut attempts = Vec::new();
        let result = select_first([1, 2, 3], |&n| {
            attempts.push(n);
            if n < 2 {
                Err(RhiError::InvalidHandle("no device".into()))
            } else {
                Ok(n * 10)
            }
        });
        assert_eq!(result.ok(), Some(20));
        assert_eq!(attempts, vec![1, 2]);
    }

    #[test]
    fn test_select_first_none_is_fatal() {
        let result: RhiResult<u32> = select_first(Vec::<u32>::new(), |_| Ok(0));
        assert!(matches!(result, Err(RhiError::NoSuitableGpu)));

        let result: RhiResult<u32> = select_first([1u32, 2], |_| {
            Err(RhiError::InvalidHandle("no device".into()))
        });
        assert!(matches!(result, Err(RhiError::NoSuitableGpu)));
    }
}
