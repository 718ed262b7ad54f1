//! Pool enumeration and arg-max selection ([`select`], [`pick_best`]).
//!
//! The selector owns no long-lived state: one call enumerates the visible
//! devices, snapshots each into a [`DeviceProfile`], evaluates them all,
//! and returns the best accepted candidate. Per-candidate rejections are
//! absorbed by the scorer; only pool-level failures surface here as
//! errors.

use ash::vk;
use thiserror::Error;

use crate::{
    instance::{FetchPhysicalDeviceError, Instance},
    policy::SelectionPolicy,
    score::{evaluate, CandidateScore, DeviceProfile},
    surface::Surface,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

#[derive(Debug, Error)]
pub enum SelectError {
    /// The device or extension listing call itself failed — not "zero
    /// results", an actual query error. No meaningful pool exists.
    #[error("Physical device enumeration failed: {0}")]
    Enumeration(#[from] FetchPhysicalDeviceError),

    #[error("Failed to enumerate extensions of a candidate device: {0}")]
    ExtensionEnumeration(vk::Result),

    #[error("No Vulkan-capable physical devices found")]
    NoDevicesFound,

    /// Every enumerated candidate was rejected. Carries the policy
    /// constraints that emptied the pool.
    #[error("No suitable physical device found (policy: {policy})")]
    NoSuitableDevice { policy: String },
}

/// Snapshot every visible device.
///
/// A failing per-device extension enumeration is fatal here rather than a
/// candidate rejection: it means the query layer itself is broken, and
/// scoring the rest of the pool against a half-enumerated world would
/// hide that.
pub fn gather_profiles(instance: &Instance) -> Result<Vec<DeviceProfile>, SelectError> {
    let handles = instance.fetch_physical_devices()?;

    let mut profiles = Vec::with_capacity(handles.len());
    for &handle in &handles {
        //SAFETY: handle was just enumerated from instance
        let properties = unsafe { instance.get_raw_physical_device_properties(handle) };
        //SAFETY: handle was just enumerated from instance
        let queue_families =
            unsafe { instance.get_raw_physical_device_queue_family_properties(handle) };
        //SAFETY: handle was just enumerated from instance
        let memory = unsafe { instance.get_raw_physical_device_memory_properties(handle) };
        //SAFETY: handle was just enumerated from instance
        let extension_props = unsafe { instance.enumerate_raw_device_extension_properties(handle) }
            .map_err(SelectError::ExtensionEnumeration)?;

        let profile = DeviceProfile {
            handle,
            properties,
            memory,
            queue_families,
            extensions: crate::extensions::extension_names(&extension_props),
        };

        let ver = crate::instance::VkVersion::from_raw(profile.properties.api_version);
        tracing::info!(
            "[#{}] {:?} | {:?} | API {}.{}.{}",
            profiles.len(),
            profile.name(),
            profile.properties.device_type,
            ver.major(),
            ver.minor(),
            ver.patch(),
        );

        profiles.push(profile);
    }

    Ok(profiles)
}

/// Arg-max over the accepted candidates.
///
/// Comparison is strict `>`, so among exact ties the first enumerated
/// device wins — selection is deterministic for a fixed pool and policy.
/// `present_support` is called as `(candidate index, family index)`.
pub fn pick_best(
    profiles: &[DeviceProfile],
    policy: &SelectionPolicy,
    mut present_support: Option<&mut dyn FnMut(usize, u32) -> bool>,
) -> Result<usize, SelectError> {
    if profiles.is_empty() {
        return Err(SelectError::NoDevicesFound);
    }

    let mut best: Option<(usize, i64)> = None;
    for (idx, profile) in profiles.iter().enumerate() {
        let score = match present_support {
            Some(ref mut supports) => {
                let mut for_candidate = |family: u32| supports(idx, family);
                evaluate(profile, policy, Some(&mut for_candidate))
            }
            None => evaluate(profile, policy, None),
        };

        if !score.accepted {
            debug_assert_eq!(score, CandidateScore::rejected());
            continue;
        }
        let beats_current = match best {
            Some((_, best_score)) => score.score > best_score,
            None => true,
        };
        if beats_current {
            best = Some((idx, score.score));
        }
    }

    match best {
        Some((idx, score)) => {
            tracing::info!(
                "Selected {:?} (index {}, score {})",
                profiles[idx].name(),
                idx,
                score,
            );
            Ok(idx)
        }
        None => Err(SelectError::NoSuitableDevice {
            policy: policy.summary(),
        }),
    }
}

/// Enumerate, evaluate, and pick in one pass against live devices.
///
/// Returns the chosen profile so the caller can cache it without
/// re-querying.
pub fn select<T: HasDisplayHandle + HasWindowHandle>(
    instance: &Instance,
    policy: &SelectionPolicy,
    surface: Option<&Surface<T>>,
) -> Result<DeviceProfile, SelectError> {
    let mut profiles = gather_profiles(instance)?;

    let idx = match surface {
        Some(surface) => {
            let mut supports = |candidate: usize, family: u32| {
                //SAFETY: the handle was enumerated from the same instance
                //the surface was created from
                unsafe { surface.supports_queue_family(profiles[candidate].handle, family) }
                    .unwrap_or(false)
            };
            pick_best(&profiles, policy, Some(&mut supports))?
        }
        None => pick_best(&profiles, policy, None)?,
    };

    Ok(profiles.swap_remove(idx))
}
