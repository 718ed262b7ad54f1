//! The cached device feature chain ([`FeatureChain`]) and required
//! core-feature validation.
//!
//! Vulkan reports extended features through a `pNext` chain hanging off
//! `VkPhysicalDeviceFeatures2`. Instead of carrying linked structs around,
//! the chain is queried once with every versioned block attached and then
//! flattened into plain owned fields; the `p_next` pointers are nulled
//! immediately after the query so the stored blocks reference nothing.

use ash::vk;
use thiserror::Error;

use crate::{instance::Instance, policy::RequiredFeatures};

/// A required core feature flag the chosen device does not support.
///
/// Distinct from a missing extension on purpose: extension misses reject
/// one candidate during scoring, while this is discovered only after
/// selection has committed to a winner, so it fails the whole resolution.
#[derive(Debug, Error)]
#[error("Device lacks required core feature '{0}'")]
pub struct MissingCoreFeature(pub &'static str);

/// Base + versioned feature blocks of one device, queried in a single
/// chained call and stored as independent values.
///
/// Invariant: every `p_next` in the stored blocks is null.
#[derive(Default)]
pub struct FeatureChain {
    pub core: vk::PhysicalDeviceFeatures,
    pub v11: vk::PhysicalDeviceVulkan11Features<'static>,
    pub v12: vk::PhysicalDeviceVulkan12Features<'static>,
    pub v13: vk::PhysicalDeviceVulkan13Features<'static>,
}

impl std::fmt::Debug for FeatureChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureChain")
            .field("sampler_anisotropy", &self.core.sampler_anisotropy)
            .field("geometry_shader", &self.core.geometry_shader)
            .field("fill_mode_non_solid", &self.core.fill_mode_non_solid)
            .finish_non_exhaustive()
    }
}

impl FeatureChain {
    /// Query the full feature chain of a physical device.
    ///
    /// All versioned blocks are queried unconditionally; on drivers below
    /// the corresponding API version the block simply comes back zeroed.
    ///
    /// # Safety
    /// `physical_device` must be a valid handle derived from `instance`.
    pub unsafe fn query(instance: &Instance, physical_device: vk::PhysicalDevice) -> Self {
        let mut v13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut v12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut v11 = vk::PhysicalDeviceVulkan11Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut v11)
            .push_next(&mut v12)
            .push_next(&mut v13);

        // SAFETY: physical_device is derived from instance (caller
        // guarantees); the chain rooted at features2 references only the
        // stack locals above.
        unsafe { instance.get_raw_physical_device_features2(physical_device, &mut features2) };
        let core = features2.features;

        // Detach the chain so the stored blocks own no pointers into the
        // stack frame that just queried them.
        v11.p_next = std::ptr::null_mut();
        v12.p_next = std::ptr::null_mut();
        v13.p_next = std::ptr::null_mut();

        Self {
            core,
            v11,
            v12,
            v13,
        }
    }

    /// Check every policy-required core feature flag against the cached
    /// base feature block. The first unsupported flag fails the whole
    /// resolution.
    pub fn validate_required(&self, required: &RequiredFeatures) -> Result<(), MissingCoreFeature> {
        if required.sampler_anisotropy && self.core.sampler_anisotropy == vk::FALSE {
            return Err(MissingCoreFeature("samplerAnisotropy"));
        }
        if required.geometry_shader && self.core.geometry_shader == vk::FALSE {
            return Err(MissingCoreFeature("geometryShader"));
        }
        if required.fill_mode_non_solid && self.core.fill_mode_non_solid == vk::FALSE {
            return Err(MissingCoreFeature("fillModeNonSolid"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_required_features_always_validates() {
        let chain = FeatureChain::default();

        assert!(chain.validate_required(&RequiredFeatures::default()).is_ok());
    }

    #[test]
    fn missing_required_feature_is_named() {
        let chain = FeatureChain::default();
        let required = RequiredFeatures {
            sampler_anisotropy: true,
            ..Default::default()
        };

        let err = chain.validate_required(&required).unwrap_err();

        assert!(err.to_string().contains("samplerAnisotropy"));
    }

    #[test]
    fn supported_required_features_validate() {
        let chain = FeatureChain {
            core: vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(true)
                .geometry_shader(true)
                .fill_mode_non_solid(true),
            ..Default::default()
        };
        let required = RequiredFeatures {
            sampler_anisotropy: true,
            geometry_shader: true,
            fill_mode_non_solid: true,
        };

        assert!(chain.validate_required(&required).is_ok());
    }

    #[test]
    fn each_required_flag_is_checked_independently() {
        let chain = FeatureChain {
            core: vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true),
            ..Default::default()
        };
        let required = RequiredFeatures {
            sampler_anisotropy: true,
            geometry_shader: true,
            fill_mode_non_solid: false,
        };

        let err = chain.validate_required(&required).unwrap_err();

        assert!(err.to_string().contains("geometryShader"));
    }
}
