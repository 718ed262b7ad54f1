//! Device-extension negotiation.
//!
//! Required extensions are a hard per-candidate filter: a missing one
//! rejects that device (the scorer folds it into the rejection cascade),
//! never the whole pool. Optional extensions are enabled when present and
//! skipped silently otherwise. The enabled list keeps policy declaration
//! order, required first.

use std::ffi::{CStr, CString};

use ash::vk;
use thiserror::Error;

use crate::policy::SelectionPolicy;

#[derive(Debug, Error)]
#[error("Missing required device extension '{0}'")]
pub struct MissingRequiredExtension(pub String);

/// Owned name list from the raw extension property array.
///
/// Entries whose name bytes are not a valid C string are skipped; a driver
/// handing those back is broken enough that dropping the entry beats
/// failing the whole enumeration.
pub fn extension_names(properties: &[vk::ExtensionProperties]) -> Vec<CString> {
    properties
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .map(|name| name.to_owned())
        .collect()
}

pub fn has_extension(available: &[CString], name: &CStr) -> bool {
    available.iter().any(|ext| ext.as_c_str() == name)
}

/// True when every required extension of the policy appears in
/// `available`. Used by the scorer, which only needs the yes/no answer.
pub fn required_satisfied(available: &[CString], policy: &SelectionPolicy) -> bool {
    policy
        .required_extensions
        .iter()
        .all(|req| has_extension(available, req))
}

/// Resolve the policy's extension lists against what the device reports.
///
/// Returns the enabled list: all required extensions in policy order,
/// then every satisfied optional extension in policy order. A missing
/// required extension is an error; a missing optional one is logged at
/// info and skipped.
pub fn resolve_extensions(
    available: &[CString],
    policy: &SelectionPolicy,
) -> Result<Vec<CString>, MissingRequiredExtension> {
    let mut enabled =
        Vec::with_capacity(policy.required_extensions.len() + policy.optional_extensions.len());

    for required in &policy.required_extensions {
        if !has_extension(available, required) {
            return Err(MissingRequiredExtension(
                required.to_string_lossy().into_owned(),
            ));
        }
        enabled.push(required.clone());
    }

    for optional in &policy.optional_extensions {
        if has_extension(available, optional) {
            tracing::info!("Enabled optional extension {:?}", optional);
            enabled.push(optional.clone());
        } else {
            tracing::info!("Optional extension {:?} not available, skipping", optional);
        }
    }

    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cstrings(names: &[&str]) -> Vec<CString> {
        names
            .iter()
            .map(|n| CString::new(*n).expect("test names contain no NUL"))
            .collect()
    }

    fn policy(required: &[&str], optional: &[&str]) -> SelectionPolicy {
        SelectionPolicy {
            required_extensions: cstrings(required),
            optional_extensions: cstrings(optional),
            ..Default::default()
        }
    }

    #[test]
    fn resolve_keeps_required_then_optional_in_policy_order() {
        let available = cstrings(&["VK_EXT_b", "VK_KHR_swapchain", "VK_EXT_a"]);
        let policy = policy(&["VK_KHR_swapchain", "VK_EXT_a"], &["VK_EXT_b"]);

        let enabled = resolve_extensions(&available, &policy).expect("all required are available");

        assert_eq!(
            enabled,
            cstrings(&["VK_KHR_swapchain", "VK_EXT_a", "VK_EXT_b"])
        );
    }

    #[test]
    fn missing_required_extension_is_an_error() {
        let available = cstrings(&["VK_EXT_other"]);
        let policy = policy(&["VK_KHR_swapchain"], &[]);

        let err = resolve_extensions(&available, &policy).unwrap_err();

        assert!(err.to_string().contains("VK_KHR_swapchain"));
    }

    #[test]
    fn missing_optional_extension_is_skipped_silently() {
        let available = cstrings(&["VK_KHR_swapchain"]);
        let policy = policy(&["VK_KHR_swapchain"], &["VK_EXT_memory_budget"]);

        let enabled = resolve_extensions(&available, &policy).expect("required is available");

        assert_eq!(enabled, cstrings(&["VK_KHR_swapchain"]));
    }

    #[test]
    fn required_satisfied_matches_resolve_outcome() {
        let available = cstrings(&["VK_KHR_swapchain"]);

        let satisfiable = policy(&["VK_KHR_swapchain"], &[]);
        let unsatisfiable = policy(&["VK_KHR_swapchain", "VK_EXT_absent"], &[]);

        assert!(required_satisfied(&available, &satisfiable));
        assert!(!required_satisfied(&available, &unsatisfiable));
        assert!(resolve_extensions(&available, &unsatisfiable).is_err());
    }

    #[test]
    fn extension_names_converts_raw_properties() {
        let mut props = vk::ExtensionProperties::default();
        let name = b"VK_KHR_swapchain\0";
        for (dst, src) in props.extension_name.iter_mut().zip(name.iter()) {
            *dst = *src as std::os::raw::c_char;
        }

        let names = extension_names(&[props]);

        assert_eq!(names, cstrings(&["VK_KHR_swapchain"]));
    }
}
