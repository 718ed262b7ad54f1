//! Selection policy ([`SelectionPolicy`]) — the caller-supplied
//! configuration governing which physical device gets picked.
//!
//! The policy is immutable input for one resolution pass. The preferred
//! device-type list is both a hard filter (types not listed are rejected)
//! and the dominant score term (earlier types rank higher). Required
//! extensions eliminate candidates; optional extensions are enabled when
//! present and silently skipped otherwise.

use std::ffi::CString;

use ash::vk;

/// Core feature flags the chosen device must support.
///
/// Checked once, after selection, against the cached feature chain. A
/// missing flag is fatal for the whole resolution — by that point there is
/// no fallback candidate left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequiredFeatures {
    pub sampler_anisotropy: bool,
    pub geometry_shader: bool,
    pub fill_mode_non_solid: bool,
}

#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    /// Whether a candidate must be able to present to the attached surface.
    pub require_presentation: bool,

    /// Acceptable device types, best first. Doubles as the type-rank score
    /// source; a device whose type is not listed is rejected outright.
    pub preferred_types: Vec<vk::PhysicalDeviceType>,

    /// Device extensions every candidate must expose.
    pub required_extensions: Vec<CString>,
    /// Device extensions enabled when available, skipped when not.
    pub optional_extensions: Vec<CString>,

    pub required_features: RequiredFeatures,

    /// Prefer a compute family without graphics capability.
    pub prefer_dedicated_compute: bool,
    /// Prefer a transfer family without graphics or compute capability.
    pub prefer_dedicated_transfer: bool,

    /// Score contribution per unit of `maxImageDimension2D`.
    pub weight_max_image_2d: i64,
    /// Score contribution per MiB of the largest device-local heap.
    pub weight_vram: i64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            require_presentation: true,
            preferred_types: vec![
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vk::PhysicalDeviceType::INTEGRATED_GPU,
                vk::PhysicalDeviceType::CPU,
                vk::PhysicalDeviceType::VIRTUAL_GPU,
                vk::PhysicalDeviceType::OTHER,
            ],
            required_extensions: vec![ash::khr::swapchain::NAME.to_owned()],
            optional_extensions: Vec::new(),
            required_features: RequiredFeatures::default(),
            prefer_dedicated_compute: true,
            prefer_dedicated_transfer: true,
            weight_max_image_2d: 1,
            weight_vram: 1,
        }
    }
}

impl SelectionPolicy {
    /// Zero-based rank of a device type in the preference list, or `None`
    /// when the type is not acceptable at all.
    pub fn type_rank(&self, device_type: vk::PhysicalDeviceType) -> Option<usize> {
        self.preferred_types.iter().position(|&t| t == device_type)
    }

    /// One-line rendering of the constraints, used in the
    /// no-suitable-device diagnostic so the caller can see what emptied
    /// the candidate pool.
    pub fn summary(&self) -> String {
        let required: Vec<String> = self
            .required_extensions
            .iter()
            .map(|e| e.to_string_lossy().into_owned())
            .collect();
        format!(
            "require_presentation={}, preferred_types={:?}, required_extensions={:?}",
            self.require_presentation, self.preferred_types, required,
        )
    }
}
