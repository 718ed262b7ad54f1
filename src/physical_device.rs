//! The resolved device handle ([`PhysicalDevice`]): selection policy plus
//! the cached capability snapshot of the chosen device.
//!
//! The handle moves through three states. Freshly constructed it carries
//! only a policy. Attaching an instance (and, for presentation, a surface)
//! makes it initializable. [`PhysicalDevice::init`] runs the full
//! selection pass and caches a [`DeviceDescriptor`] for the winner; from
//! then on every capability query is answered from the cache without
//! touching the driver. [`PhysicalDevice::release`] drops the cache and
//! both attachments and is idempotent.

use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::{
    extensions::{resolve_extensions, MissingRequiredExtension},
    features::{FeatureChain, MissingCoreFeature},
    instance::Instance,
    policy::SelectionPolicy,
    queues::{probe_queue_families, QueueAssignment},
    score::DeviceProfile,
    select::{gather_profiles, pick_best, SelectError},
};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Device resolution requires an attached instance")]
    NotAttached,

    #[error("Selection policy requires presentation but no surface is attached")]
    SurfaceRequired,

    #[error("Device selection failed: {0}")]
    Select(#[from] SelectError),

    #[error("Selected device failed extension negotiation: {0}")]
    MissingExtension(#[from] MissingRequiredExtension),

    #[error("Selected device failed feature validation: {0}")]
    MissingFeature(#[from] MissingCoreFeature),

    #[error("Queue probe of the selected device produced an unusable assignment")]
    QueueFamiliesUnsatisfied,

    #[error("Selected present family {family} cannot present to the attached surface")]
    PresentNotSupported { family: u32 },
}

/// Everything the logical-device layer needs to know about the chosen
/// device, captured once at resolution time.
pub struct DeviceDescriptor {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub features: FeatureChain,
    /// Every extension the device reports.
    pub available_extensions: Vec<CString>,
    /// Required extensions in policy order, then satisfied optionals.
    pub enabled_extensions: Vec<CString>,
    pub queues: QueueAssignment,
}

impl DeviceDescriptor {
    pub fn name(&self) -> &CStr {
        self.properties.device_name_as_c_str().unwrap_or(c"unknown")
    }

    /// Whether the device *reports* the extension, enabled or not.
    pub fn has_extension(&self, name: &CStr) -> bool {
        crate::extensions::has_extension(&self.available_extensions, name)
    }
}

impl std::fmt::Debug for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("name", &self.name())
            .field("device_type", &self.properties.device_type)
            .field("queues", &self.queues)
            .field("enabled_extensions", &self.enabled_extensions)
            .finish_non_exhaustive()
    }
}

pub struct PhysicalDevice {
    policy: SelectionPolicy,
    instance: Option<Arc<Instance>>,
    surface: Option<vk::SurfaceKHR>,
    resolved: Option<DeviceDescriptor>,
}

impl PhysicalDevice {
    /// A fresh, unattached handle. Nothing touches the driver until
    /// [`Self::init`].
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            instance: None,
            surface: None,
            resolved: None,
        }
    }

    pub fn attach(&mut self, instance: Arc<Instance>) {
        self.instance = Some(instance);
    }

    /// Attach the presentation surface candidates will be probed against.
    ///
    /// The handle is borrowed, not owned: the surface wrapper that created
    /// it stays responsible for destruction.
    ///
    /// # Safety
    /// `surface` must be a valid `VkSurfaceKHR` created from the attached
    /// instance, and must outlive this handle or be detached via
    /// [`Self::release`] before it is destroyed.
    pub unsafe fn attach_surface(&mut self, surface: vk::SurfaceKHR) {
        self.surface = Some(surface);
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// The cached capability snapshot, present only after a successful
    /// [`Self::init`].
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.resolved.as_ref()
    }

    /// Run the full resolution pass: enumerate, evaluate, pick, and cache.
    ///
    /// Calling this on an already-resolved handle discards the stale
    /// descriptor and re-resolves against the current device pool; the
    /// instance and surface attachments are kept. On any error the handle
    /// is left unresolved but still attached.
    pub fn init(&mut self) -> Result<(), InitError> {
        let instance = match self.instance {
            Some(ref instance) => Arc::clone(instance),
            None => return Err(InitError::NotAttached),
        };
        if self.policy.require_presentation && self.surface.is_none() {
            return Err(InitError::SurfaceRequired);
        }
        if let Some(stale) = self.resolved.take() {
            tracing::info!("Re-resolving, discarding cached {:?}", stale.name());
        }

        let profiles = gather_profiles(&instance)?;

        let winner = match self.surface {
            Some(surface) => {
                let mut supports = |candidate: usize, family: u32| {
                    //SAFETY: the candidate handle was enumerated from the
                    //instance the surface was created from (attach_surface
                    //contract)
                    unsafe {
                        instance.get_raw_physical_device_surface_support(
                            profiles[candidate].handle,
                            family,
                            surface,
                        )
                    }
                    .unwrap_or(false)
                };
                pick_best(&profiles, &self.policy, Some(&mut supports))?
            }
            None => pick_best(&profiles, &self.policy, None)?,
        };

        let descriptor = self.resolve(&instance, profiles, winner)?;
        tracing::info!("Resolved {:?}", descriptor);
        self.resolved = Some(descriptor);
        Ok(())
    }

    /// Build the cached descriptor for the winning candidate.
    fn resolve(
        &self,
        instance: &Instance,
        mut profiles: Vec<DeviceProfile>,
        winner: usize,
    ) -> Result<DeviceDescriptor, InitError> {
        let profile = profiles.swap_remove(winner);

        let queues = match self.surface {
            Some(surface) => {
                let mut supports = |family: u32| {
                    //SAFETY: profile.handle was enumerated from the instance
                    //the surface was created from (attach_surface contract)
                    unsafe {
                        instance.get_raw_physical_device_surface_support(
                            profile.handle,
                            family,
                            surface,
                        )
                    }
                    .unwrap_or(false)
                };
                probe_queue_families(&profile.queue_families, &self.policy, Some(&mut supports))
            }
            None => probe_queue_families(&profile.queue_families, &self.policy, None),
        };
        if !queues.is_valid(self.policy.require_presentation) {
            return Err(InitError::QueueFamiliesUnsatisfied);
        }

        let enabled_extensions = resolve_extensions(&profile.extensions, &self.policy)?;

        //SAFETY: profile.handle was enumerated from instance
        let features = unsafe { FeatureChain::query(instance, profile.handle) };
        features.validate_required(&self.policy.required_features)?;

        // Re-verify the present family against the live surface. The probe
        // above already consulted it, but this is the last point before the
        // assignment is cached and handed to device creation.
        if self.policy.require_presentation {
            let family = queues.present.ok_or(InitError::QueueFamiliesUnsatisfied)?;
            let surface = self.surface.ok_or(InitError::SurfaceRequired)?;
            //SAFETY: profile.handle was enumerated from the instance the
            //surface was created from (attach_surface contract)
            let supported = unsafe {
                instance.get_raw_physical_device_surface_support(profile.handle, family, surface)
            }
            .unwrap_or(false);
            if !supported {
                return Err(InitError::PresentNotSupported { family });
            }
        }

        Ok(DeviceDescriptor {
            handle: profile.handle,
            properties: profile.properties,
            memory: profile.memory,
            queue_families: profile.queue_families,
            features,
            available_extensions: profile.extensions,
            enabled_extensions,
            queues,
        })
    }

    /// Drop the cached descriptor and both attachments, returning the
    /// handle to its freshly-constructed state. Safe to call at any point,
    /// any number of times.
    pub fn release(&mut self) {
        if let Some(descriptor) = self.resolved.take() {
            tracing::info!("Releasing resolved device {:?}", descriptor.name());
        }
        self.surface = None;
        self.instance = None;
    }
}

impl std::fmt::Debug for PhysicalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDevice")
            .field("attached", &self.instance.is_some())
            .field("surface", &self.surface)
            .field("resolved", &self.resolved)
            .finish()
    }
}
