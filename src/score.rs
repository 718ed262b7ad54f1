//! Per-candidate evaluation ([`evaluate`]): the rejection cascade and the
//! weighted score.
//!
//! Every check the cascade needs is read from a [`DeviceProfile`]
//! snapshot taken once per candidate, so evaluation is pure and
//! deterministic for a fixed pool. Rejections are absorbed here — logged
//! at warn, folded into the accepted flag — and never surfaced as errors;
//! only the selector decides whether the whole pool is unusable.

use std::ffi::{CStr, CString};

use ash::vk;

use crate::{
    extensions::{has_extension, required_satisfied},
    policy::SelectionPolicy,
    queues::probe_queue_families,
};

/// Read-only snapshot of everything evaluation needs about one device.
///
/// Queried once per candidate during a selection pass; the winner's
/// snapshot is reused verbatim for the cached descriptor, so the data the
/// scorer judged is exactly the data later consumers see.
pub struct DeviceProfile {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub extensions: Vec<CString>,
}

impl DeviceProfile {
    pub fn name(&self) -> &CStr {
        self.properties.device_name_as_c_str().unwrap_or(c"unknown")
    }
}

/// Outcome of evaluating one candidate.
///
/// Rejected candidates carry `i64::MIN` and are never selected, even when
/// every other candidate is rejected too — selection fails explicitly
/// instead of picking a rejected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateScore {
    pub score: i64,
    pub accepted: bool,
}

impl CandidateScore {
    pub fn rejected() -> Self {
        Self {
            score: i64::MIN,
            accepted: false,
        }
    }
}

/// Largest device-local heap, in MiB. Zero when no heap is device-local.
fn max_device_local_heap_mib(memory: &vk::PhysicalDeviceMemoryProperties) -> i64 {
    let best = memory.memory_heaps[..memory.memory_heap_count as usize]
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .max()
        .unwrap_or(0);
    (best / (1024 * 1024)) as i64
}

/// Run one candidate through the rejection cascade and, if it survives,
/// compute its score.
///
/// Cascade order (first failure wins):
/// 1. Device type must appear in the policy's preference list.
/// 2. Under a presentation requirement, `VK_KHR_swapchain` must be
///    reported. This stays a distinct stage ahead of the generic required
///    list: it is the cheapest check and by far the most common reject on
///    compute-only devices, so it earns its own diagnostic.
/// 3. Every required extension must be reported.
/// 4. The queue probe must yield a valid assignment under the policy's
///    presentation requirement.
///
/// The score sums three terms: type rank (`1000 - 100 * rank`, dominant
/// by construction), `weight_max_image_2d * maxImageDimension2D`, and
/// `weight_vram *` the largest device-local heap in MiB.
pub fn evaluate(
    profile: &DeviceProfile,
    policy: &SelectionPolicy,
    present_support: Option<&mut dyn FnMut(u32) -> bool>,
) -> CandidateScore {
    let device_type = profile.properties.device_type;

    let Some(rank) = policy.type_rank(device_type) else {
        tracing::warn!(
            "Rejected {:?}: device type {:?} not in preferred list",
            profile.name(),
            device_type,
        );
        return CandidateScore::rejected();
    };

    if policy.require_presentation && !has_extension(&profile.extensions, ash::khr::swapchain::NAME)
    {
        tracing::warn!(
            "Rejected {:?}: missing VK_KHR_swapchain (presentation required)",
            profile.name(),
        );
        return CandidateScore::rejected();
    }

    if !required_satisfied(&profile.extensions, policy) {
        tracing::warn!(
            "Rejected {:?}: missing at least one required extension",
            profile.name(),
        );
        return CandidateScore::rejected();
    }

    let assignment = probe_queue_families(&profile.queue_families, policy, present_support);
    if !assignment.is_valid(policy.require_presentation) {
        tracing::warn!(
            "Rejected {:?}: queue families incomplete (graphics/present)",
            profile.name(),
        );
        return CandidateScore::rejected();
    }

    let mut score = 1000 - 100 * rank as i64;

    score += policy.weight_max_image_2d * i64::from(profile.properties.limits.max_image_dimension2_d);

    let vram_mib = max_device_local_heap_mib(&profile.memory);
    score += policy.weight_vram * vram_mib;

    tracing::info!(
        "Accepted {:?}: queues G={:?} C={:?} T={:?} P={:?}, score={} (VRAM~{} MiB, maxImage2D={})",
        profile.name(),
        assignment.graphics,
        assignment.compute,
        assignment.transfer,
        assignment.present,
        score,
        vram_mib,
        profile.properties.limits.max_image_dimension2_d,
    );

    CandidateScore {
        score,
        accepted: true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::policy::SelectionPolicy;

    pub(crate) fn profile(
        device_type: vk::PhysicalDeviceType,
        extensions: &[&CStr],
        queue_flags: &[vk::QueueFlags],
    ) -> DeviceProfile {
        let mut limits = vk::PhysicalDeviceLimits::default();
        limits.max_image_dimension2_d = 4096;

        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = device_type;
        properties.limits = limits;

        let mut memory = vk::PhysicalDeviceMemoryProperties::default();
        memory.memory_heap_count = 1;
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };

        DeviceProfile {
            handle: vk::PhysicalDevice::null(),
            properties,
            memory,
            queue_families: queue_flags
                .iter()
                .map(|&flags| {
                    vk::QueueFamilyProperties::default()
                        .queue_flags(flags)
                        .queue_count(1)
                })
                .collect(),
            extensions: extensions.iter().map(|e| (*e).to_owned()).collect(),
        }
    }

    fn offline_policy() -> SelectionPolicy {
        SelectionPolicy {
            require_presentation: false,
            required_extensions: Vec::new(),
            ..Default::default()
        }
    }

    fn all_roles() -> vk::QueueFlags {
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
    }

    #[test]
    fn unlisted_device_type_is_rejected() {
        let profile = profile(vk::PhysicalDeviceType::CPU, &[], &[all_roles()]);
        let policy = SelectionPolicy {
            preferred_types: vec![vk::PhysicalDeviceType::DISCRETE_GPU],
            ..offline_policy()
        };

        let score = evaluate(&profile, &policy, None);

        assert_eq!(score, CandidateScore::rejected());
    }

    #[test]
    fn presentation_requirement_rejects_without_swapchain_extension() {
        let profile = profile(vk::PhysicalDeviceType::DISCRETE_GPU, &[], &[all_roles()]);
        let policy = SelectionPolicy {
            required_extensions: Vec::new(),
            ..Default::default()
        };
        let mut present = |_family: u32| true;

        let score = evaluate(&profile, &policy, Some(&mut present));

        assert_eq!(score, CandidateScore::rejected());
    }

    #[test]
    fn missing_required_extension_rejects() {
        let profile = profile(vk::PhysicalDeviceType::DISCRETE_GPU, &[], &[all_roles()]);
        let policy = SelectionPolicy {
            required_extensions: vec![c"VK_EXT_mesh_shader".to_owned()],
            ..offline_policy()
        };

        let score = evaluate(&profile, &policy, None);

        assert_eq!(score, CandidateScore::rejected());
    }

    #[test]
    fn invalid_queue_assignment_rejects() {
        // Compute-only device, no graphics family at all.
        let profile = profile(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            &[],
            &[vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER],
        );

        let score = evaluate(&profile, &offline_policy(), None);

        assert_eq!(score, CandidateScore::rejected());
    }

    #[test]
    fn accepted_candidate_sums_all_three_terms() {
        let profile = profile(vk::PhysicalDeviceType::DISCRETE_GPU, &[], &[all_roles()]);

        let score = evaluate(&profile, &offline_policy(), None);

        assert!(score.accepted);
        // rank 0 => 1000, + 4096 * 1, + 1024 MiB * 1
        assert_eq!(score.score, 1000 + 4096 + 1024);
    }

    #[test]
    fn type_rank_term_uses_policy_position() {
        let integrated = profile(vk::PhysicalDeviceType::INTEGRATED_GPU, &[], &[all_roles()]);
        let discrete = profile(vk::PhysicalDeviceType::DISCRETE_GPU, &[], &[all_roles()]);

        let integrated_score = evaluate(&integrated, &offline_policy(), None);
        let discrete_score = evaluate(&discrete, &offline_policy(), None);

        // Same limits and memory, so the difference is exactly one rank
        // step.
        assert_eq!(discrete_score.score - integrated_score.score, 100);
    }

    #[test]
    fn memory_term_takes_the_largest_device_local_heap() {
        let mut memory = vk::PhysicalDeviceMemoryProperties::default();
        memory.memory_heap_count = 3;
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 256 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        // Host-visible heap, bigger but not device-local; must not win.
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 8 * 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::empty(),
        };
        memory.memory_heaps[2] = vk::MemoryHeap {
            size: 512 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };

        assert_eq!(max_device_local_heap_mib(&memory), 512);
    }

    #[test]
    fn no_device_local_heap_scores_zero_memory() {
        let memory = vk::PhysicalDeviceMemoryProperties::default();

        assert_eq!(max_device_local_heap_mib(&memory), 0);
    }
}
