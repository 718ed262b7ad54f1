//! Queue-family probing ([`probe_queue_families`]) and the resulting
//! per-role assignment ([`QueueAssignment`]).
//!
//! Probing is pure over the queue-family list plus an injected
//! present-support predicate, so it can be exercised against hand-built
//! family tables. Presentation support is a (family, surface) pair query,
//! which is why it arrives as a closure rather than a flag on the family.

use ash::vk;

use crate::policy::SelectionPolicy;

/// Queue family indices for the four execution roles.
///
/// `compute` and `transfer` always collapse to the graphics family when no
/// better family exists; that fallback is intentional, not an error. Small
/// and integrated devices commonly expose one universal family serving
/// every role. `present` never falls back: either some family can present
/// to the attached surface or the assignment is invalid under a
/// presentation requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueAssignment {
    pub graphics: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
    pub present: Option<u32>,
}

impl QueueAssignment {
    /// An assignment is usable when graphics is assigned, and — only when
    /// the policy demands presentation — present is assigned too.
    pub fn is_valid(&self, require_present: bool) -> bool {
        if self.graphics.is_none() {
            return false;
        }
        if require_present && self.present.is_none() {
            return false;
        }
        true
    }
}

/// Probe a device's queue families and assign one family per role.
///
/// Pass 1 records the first family with graphics capability and, when a
/// present predicate is supplied, the first family that can present. Pass
/// 2 picks compute, preferring a compute-without-graphics family when the
/// policy asks for a dedicated one; pass 3 does the same for transfer
/// (dedicated = transfer without graphics or compute). Scanning is always
/// in ascending index order, first match wins, so the result is
/// deterministic for a fixed family table. Compute and transfer collapse
/// to the graphics index when no capable family was found.
///
/// An empty family table yields the default (all-unassigned) assignment,
/// which is invalid under any requirement.
pub fn probe_queue_families(
    families: &[vk::QueueFamilyProperties],
    policy: &SelectionPolicy,
    mut present_support: Option<&mut dyn FnMut(u32) -> bool>,
) -> QueueAssignment {
    if families.is_empty() {
        tracing::warn!("No queue families reported by the device");
        return QueueAssignment::default();
    }

    let mut graphics = None;
    let mut compute = None;
    let mut transfer = None;
    let mut present = None;

    // Pass 1: first graphics family and, if a surface is attached, first
    // present-capable family.
    for (idx, family) in families.iter().enumerate() {
        let idx = idx as u32;
        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(idx);
        }
        if let Some(ref mut supports_present) = present_support {
            if present.is_none() && supports_present(idx) {
                present = Some(idx);
            }
        }
    }

    // Pass 2: compute, dedicated (no graphics) first when preferred.
    if policy.prefer_dedicated_compute {
        compute = families.iter().position(|f| {
            f.queue_flags.contains(vk::QueueFlags::COMPUTE)
                && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        });
    }
    if compute.is_none() {
        compute = families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::COMPUTE));
    }

    // Pass 3: transfer, dedicated (no graphics, no compute) first when
    // preferred.
    let mut transfer_idx = None;
    if policy.prefer_dedicated_transfer {
        transfer_idx = families.iter().position(|f| {
            f.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && !f.queue_flags.contains(vk::QueueFlags::COMPUTE)
        });
    }
    if transfer_idx.is_none() {
        transfer_idx = families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::TRANSFER));
    }
    if let Some(idx) = transfer_idx {
        transfer = Some(idx as u32);
    }

    let compute = compute.map(|i| i as u32);

    let assignment = QueueAssignment {
        graphics,
        compute: compute.or(graphics),
        transfer: transfer.or(graphics),
        present,
    };

    tracing::debug!(
        "Queues -> G={:?}, C={:?}, T={:?}, P={:?}",
        assignment.graphics,
        assignment.compute,
        assignment.transfer,
        assignment.present,
    );

    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties::default()
            .queue_flags(flags)
            .queue_count(1)
    }

    fn all_roles() -> vk::QueueFlags {
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
    }

    #[test]
    fn universal_family_serves_every_role() {
        let families = [family(all_roles())];
        let policy = SelectionPolicy::default();
        let mut present = |_family: u32| true;

        let assignment = probe_queue_families(&families, &policy, Some(&mut present));

        assert_eq!(assignment.graphics, Some(0));
        assert_eq!(assignment.compute, Some(0));
        assert_eq!(assignment.transfer, Some(0));
        assert_eq!(assignment.present, Some(0));
        assert!(assignment.is_valid(true));
    }

    #[test]
    fn dedicated_compute_and_transfer_family_is_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];
        let policy = SelectionPolicy {
            require_presentation: false,
            ..Default::default()
        };

        let assignment = probe_queue_families(&families, &policy, None);

        assert_eq!(assignment.graphics, Some(0));
        assert_eq!(assignment.compute, Some(1));
        assert_eq!(assignment.transfer, Some(1));
        assert!(assignment.is_valid(false));
    }

    #[test]
    fn dedicated_transfer_skips_compute_capable_families() {
        let families = [
            family(all_roles()),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let policy = SelectionPolicy {
            require_presentation: false,
            ..Default::default()
        };

        let assignment = probe_queue_families(&families, &policy, None);

        assert_eq!(assignment.compute, Some(1));
        assert_eq!(assignment.transfer, Some(2));
    }

    #[test]
    fn without_dedicated_preference_first_capable_family_wins() {
        let families = [
            family(all_roles()),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];
        let policy = SelectionPolicy {
            require_presentation: false,
            prefer_dedicated_compute: false,
            prefer_dedicated_transfer: false,
            ..Default::default()
        };

        let assignment = probe_queue_families(&families, &policy, None);

        assert_eq!(assignment.compute, Some(0));
        assert_eq!(assignment.transfer, Some(0));
    }

    #[test]
    fn compute_and_transfer_fall_back_to_graphics() {
        // Graphics-only family table; the fallback must still produce
        // valid compute/transfer indices.
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let policy = SelectionPolicy {
            require_presentation: false,
            ..Default::default()
        };

        let assignment = probe_queue_families(&families, &policy, None);

        assert_eq!(assignment.graphics, Some(0));
        assert_eq!(assignment.compute, Some(0));
        assert_eq!(assignment.transfer, Some(0));
    }

    #[test]
    fn fallback_invariant_holds_whenever_graphics_is_assigned() {
        let tables: Vec<Vec<vk::QueueFamilyProperties>> = vec![
            vec![family(vk::QueueFlags::GRAPHICS)],
            vec![family(all_roles())],
            vec![
                family(vk::QueueFlags::GRAPHICS),
                family(vk::QueueFlags::COMPUTE),
            ],
            vec![
                family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
                family(vk::QueueFlags::TRANSFER),
            ],
        ];
        let policy = SelectionPolicy {
            require_presentation: false,
            ..Default::default()
        };

        for families in &tables {
            let assignment = probe_queue_families(families, &policy, None);
            if assignment.graphics.is_some() {
                assert!(assignment.compute.is_some());
                assert!(assignment.transfer.is_some());
            }
        }
    }

    #[test]
    fn present_does_not_fall_back_to_graphics() {
        let families = [family(all_roles())];
        let policy = SelectionPolicy::default();
        let mut present = |_family: u32| false;

        let assignment = probe_queue_families(&families, &policy, Some(&mut present));

        assert_eq!(assignment.present, None);
        assert!(!assignment.is_valid(true));
        assert!(assignment.is_valid(false));
    }

    #[test]
    fn first_present_capable_family_wins() {
        let families = [family(all_roles()), family(all_roles())];
        let policy = SelectionPolicy::default();
        let mut present = |family: u32| family >= 1;

        let assignment = probe_queue_families(&families, &policy, Some(&mut present));

        assert_eq!(assignment.present, Some(1));
    }

    #[test]
    fn empty_family_table_is_invalid() {
        let policy = SelectionPolicy::default();

        let assignment = probe_queue_families(&[], &policy, None);

        assert_eq!(assignment, QueueAssignment::default());
        assert!(!assignment.is_valid(false));
    }
}
