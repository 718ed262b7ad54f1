//! Presentation surface wrapper ([`Surface`]).
//!
//! The selection engine only ever *reads* a surface: presentation support
//! is a (queue family, surface) pair query, not an intrinsic device
//! property, so the surface has to exist before candidates can be scored
//! under a presentation requirement. Creation and destruction stay here,
//! on the collaborator side; [`crate::physical_device::PhysicalDevice`]
//! borrows only the raw handle.

use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;

use crate::instance::{Instance, SurfaceSupportError};

#[derive(Debug, Error)]
pub enum CreateSurfaceError {
    #[error("Couldn't get display handle: {0}")]
    InvalidDisplayHandle(raw_window_handle::HandleError),
    #[error("Couldn't get window handle: {0}")]
    InvalidWindowHandle(raw_window_handle::HandleError),
    #[error("Vulkan surface creation failed: {0}")]
    VulkanError(ash::vk::Result),
    #[error(
        "Parent instance did not have the surface extensions \
         for this platform loaded"
    )]
    MissingExtension,
}

pub struct Surface<T: HasWindowHandle + HasDisplayHandle> {
    parent_instance: Arc<Instance>,
    handle: ash::vk::SurfaceKHR,
    _surface_source: Arc<T>,
}

impl<T: HasWindowHandle + HasDisplayHandle> std::fmt::Debug for Surface<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("handle", &self.handle)
            .field("parent", &self.parent_instance)
            .finish_non_exhaustive()
    }
}

impl<T: HasWindowHandle + HasDisplayHandle> Surface<T> {
    /// Creates a new surface associated with the source.
    ///
    /// # Safety
    /// This must be dropped on events like suspend in winit due to the surface
    /// being implicitly invalidated.
    ///
    /// Callers are responsible for ensuring nothing still references resources
    /// derived from this surface at destruction time. In particular a
    /// [`crate::physical_device::PhysicalDevice`] this surface was attached to
    /// must be released first.
    pub unsafe fn new(
        instance: &Arc<Instance>,
        source: Arc<T>,
    ) -> Result<Self, CreateSurfaceError> {
        //SAFETY: We hold Arc references to the instance and source, ensuring
        //they outlive the surface
        let surface = unsafe { instance.create_raw_surface(&*source) }.map_err(|e| match e {
            crate::instance::CreateRawSurfaceError::OnCreate(vk) => {
                CreateSurfaceError::VulkanError(vk)
            }
            crate::instance::CreateRawSurfaceError::DisplayHandle(e) => {
                CreateSurfaceError::InvalidDisplayHandle(e)
            }
            crate::instance::CreateRawSurfaceError::WindowHandle(e) => {
                CreateSurfaceError::InvalidWindowHandle(e)
            }
            crate::instance::CreateRawSurfaceError::ExtensionNotLoaded => {
                CreateSurfaceError::MissingExtension
            }
        })?;

        // SAFETY: `surface` was created from `instance` and `source` is the
        // handle provider used to create it.
        Ok(unsafe { Self::from_parts(Arc::clone(instance), surface, source) })
    }

    /// # Safety
    /// `handle` must be a valid `VkSurfaceKHR` created from `parent_instance`,
    /// and `source` must remain a valid window/display handle source for the
    /// lifetime expectations of this surface wrapper.
    pub unsafe fn from_parts(
        parent_instance: Arc<Instance>,
        handle: vk::SurfaceKHR,
        source: Arc<T>,
    ) -> Self {
        Self {
            parent_instance,
            handle,
            _surface_source: source,
        }
    }

    pub fn get_parent(&self) -> &Arc<Instance> {
        &self.parent_instance
    }

    pub fn raw_handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Check if a queue family on a physical device supports presenting to
    /// this surface.
    ///
    /// # Safety
    /// `physical_device` must be a valid handle derived from the same instance
    /// as this surface.
    pub unsafe fn supports_queue_family(
        &self,
        physical_device: ash::vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, SurfaceSupportError> {
        //SAFETY: physical_device was derived from the same instance as this
        //surface (caller guarantees), self.handle is valid
        unsafe {
            self.parent_instance
                .get_raw_physical_device_surface_support(
                    physical_device,
                    queue_family_index,
                    self.handle,
                )
        }
    }
}

impl<T: HasWindowHandle + HasDisplayHandle> Drop for Surface<T> {
    fn drop(&mut self) {
        tracing::debug!("Dropping surface {:?}", self.handle);
        //SAFETY: This is being dropped which means all derived objects should
        //also be being dropped and nothing may still reference it.
        let _ = unsafe { self.parent_instance.destroy_raw_surface(self.handle) }.inspect_err(|e| {
            tracing::error!("Error while dropping surface {:?}: {e}", self.handle)
        });
    }
}
