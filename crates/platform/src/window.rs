//! The viewer window and its Vulkan surface.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use terrain_core::{Error, Result};

/// A `VkSurfaceKHR` plus the loader that destroys it. Must be dropped
/// before the instance it was created on.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for surface capability and present-support queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
        debug!("Surface destroyed");
    }
}

/// Resizable winit window that remembers its last reported inner size.
pub struct Window {
    window: WinitWindow,
    size: PhysicalSize<u32>,
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::Window(e.to_string()))?;

        let size = window.inner_size();
        info!("Window '{}' opened at {}x{}", title, size.width, size.height);
        Ok(Self { window, size })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// A zero-sized window has nothing to present to.
    pub fn is_minimized(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = PhysicalSize::new(width, height);
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface on this window's
    /// display. The names are static strings owned by ash-window.
    pub fn surface_extensions(&self) -> Result<&'static [*const c_char]> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("display handle: {e}")))?;
        let extensions = ash_window::enumerate_required_extensions(display.as_raw())
            .map_err(|e| Error::Surface(format!("surface extensions: {e}")))?;

        for &name in extensions {
            // SAFETY: ash-window only returns static nul-terminated names.
            debug!("Surface extension {:?}", unsafe { CStr::from_ptr(name) });
        }
        Ok(extensions)
    }

    /// Creates the surface this window presents through.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("display handle: {e}")))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("window handle: {e}")))?;

        // SAFETY: the handles belong to a live window that outlives the
        // surface, which is only destroyed in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
        }
        .map_err(|e| Error::Surface(format!("vkCreateSurfaceKHR: {e}")))?;

        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}
