//! Vulkan physical-device capability resolution and selection.
//!
//! Given an [`instance::Instance`] and a [`policy::SelectionPolicy`], this
//! crate enumerates the visible physical devices, filters them through a
//! rejection cascade (device type, required extensions, queue families),
//! scores the survivors, and caches everything the logical-device layer
//! needs about the winner in a [`physical_device::PhysicalDevice`]:
//! properties, memory layout, the versioned feature chain, the queue
//! assignment, and the enabled-extension list.
//!
//! The decision logic ([`queues`], [`extensions`], [`score`], [`select`])
//! is written against plain `ash::vk` value types so it can be exercised
//! without a driver.
//!
//! # Naming conventions
//!
//! | prefix  | meaning                                   |
//! |---------|-------------------------------------------|
//! | `raw_*` | accepts or returns a raw `ash::vk` handle |
//! | `ash_*` | returns the `ash` wrapper object          |

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod extensions;
pub mod features;
pub mod instance;
pub mod log;
pub mod physical_device;
pub mod policy;
pub mod queues;
pub mod score;
pub mod select;
pub mod surface;

pub use ash;
pub use raw_window_handle::HandleError as RwhHandleError;
