#![cfg(feature = "glutin_backend")]
/*!

Backend implementation for the glutin library.

Each context gets its own invisible window. The runner always draws into a framebuffer object,
so the window surface is only there to make the context current.

# Features

Only available if the 'glutin_backend' feature is enabled.

*/
use std::error::Error;
use std::ffi::CString;
use std::fmt;
use std::num::NonZeroU32;
use std::os::raw::c_void;

use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, WindowSurface};
use glutin_winit::DisplayBuilder;
use log::{debug, warn};
use raw_window_handle::HasRawWindowHandle;
use takeable_option::Takeable;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

use crate::backend::{Backend, BackendFactory};
use crate::context::{ContextRequest, Profile};
use crate::version::Api;

/// An implementation of the `Backend` trait for glutin.
pub struct GlutinBackend {
    // dropped before the surface, which is dropped before the window
    context: Takeable<PossiblyCurrentContext>,
    surface: Takeable<Surface<WindowSurface>>,
    window: Window,
    request: ContextRequest,
}

/// Error that can happen while creating a glutin backend.
#[derive(Debug)]
pub enum CreationError {
    /// The window or its configuration couldn't be created.
    WindowCreationError(Box<dyn Error>),
    /// glutin-winit returned a configuration without a window.
    NoWindow,
    /// glutin refused every set of context attributes.
    GlutinCreationError(glutin::error::Error),
}

impl fmt::Display for CreationError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            CreationError::WindowCreationError(err) => write!(fmt, "window creation failed: {}", err),
            CreationError::NoWindow => write!(fmt, "no window was created"),
            CreationError::GlutinCreationError(err) => write!(fmt, "context creation failed: {}", err),
        }
    }
}

impl Error for CreationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CreationError::WindowCreationError(err) => Some(&**err),
            CreationError::NoWindow => None,
            CreationError::GlutinCreationError(err) => Some(err),
        }
    }
}

impl From<glutin::error::Error> for CreationError {
    fn from(err: glutin::error::Error) -> CreationError {
        CreationError::GlutinCreationError(err)
    }
}

unsafe impl Backend for GlutinBackend {
    unsafe fn get_proc_address(&self, symbol: &str) -> *const c_void {
        match CString::new(symbol) {
            Ok(symbol) => self.context.display().get_proc_address(&symbol) as *const _,
            Err(_) => std::ptr::null(),
        }
    }

    fn get_framebuffer_dimensions(&self) -> (u32, u32) {
        self.window.inner_size().into()
    }

    fn is_current(&self) -> bool {
        self.context.is_current()
    }

    unsafe fn make_current(&self) {
        if let Err(err) = self.context.make_current(&*self.surface) {
            warn!("failed to make the context current: {}", err);
        }
    }

    fn request(&self) -> &ContextRequest {
        &self.request
    }
}

impl Drop for GlutinBackend {
    fn drop(&mut self) {
        drop(Takeable::take(&mut self.context));
        drop(Takeable::take(&mut self.surface));
    }
}

/// Creates a [`GlutinBackend`] per context request.
///
/// Owns the winit event loop, which can only be created once per process and only on the main
/// thread.
pub struct GlutinFactory {
    event_loop: EventLoop<()>,
    dimensions: (u32, u32),
}

impl GlutinFactory {
    /// Creates the event loop. Windows are created with the given inner size.
    pub fn new(dimensions: (u32, u32)) -> GlutinFactory {
        GlutinFactory {
            event_loop: EventLoop::new(),
            dimensions,
        }
    }
}

impl BackendFactory for GlutinFactory {
    type Error = CreationError;

    fn create(&mut self, request: &ContextRequest) -> Result<Box<dyn Backend>, CreationError> {
        let (width, height) = self.dimensions;

        let window_builder = WindowBuilder::new()
            .with_title("shader_runner")
            .with_visible(false)
            .with_inner_size(PhysicalSize::new(width, height));

        let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

        let (window, gl_config) = display_builder
            .build(&self.event_loop, ConfigTemplateBuilder::new(), |mut configs| {
                // find_configs fails on its own when nothing matches
                configs.next().expect("no OpenGL configuration available")
            })
            .map_err(CreationError::WindowCreationError)?;
        let window = window.ok_or(CreationError::NoWindow)?;
        let raw_window_handle = window.raw_window_handle();

        let api_version = request.version.map(|(major, minor)| glutin::context::Version::new(major, minor));
        let context_api = match request.api {
            Api::Gl => ContextApi::OpenGl(api_version),
            Api::GlEs => ContextApi::Gles(api_version),
        };

        let profiles: &[Option<GlProfile>] = match (request.api, request.profile) {
            (Api::GlEs, _) => &[None],
            (Api::Gl, Some(Profile::Core)) => &[Some(GlProfile::Core)],
            (Api::Gl, Some(Profile::Compatibility)) => &[Some(GlProfile::Compatibility)],
            (Api::Gl, None) if request.version.map_or(false, |version| version >= (3, 2)) => {
                &[Some(GlProfile::Compatibility), Some(GlProfile::Core)]
            },
            (Api::Gl, None) => &[None],
        };

        let mut last_error = None;
        let mut not_current_context = None;

        for &profile in profiles {
            let mut attributes = ContextAttributesBuilder::new().with_context_api(context_api);
            if let Some(profile) = profile {
                attributes = attributes.with_profile(profile);
            }
            let attributes = attributes.build(Some(raw_window_handle));

            match unsafe { gl_config.display().create_context(&gl_config, &attributes) } {
                Ok(context) => {
                    debug!("created context with profile {:?}", profile);
                    not_current_context = Some(context);
                    break;
                },
                Err(err) => {
                    warn!("{} context with profile {:?} unavailable: {}", request, profile, err);
                    last_error = Some(err);
                },
            }
        }

        let not_current_context = match (not_current_context, last_error) {
            (Some(context), _) => context,
            (None, Some(err)) => return Err(err.into()),
            (None, None) => return Err(CreationError::NoWindow),
        };

        let (width, height): (u32, u32) = window.inner_size().into();
        let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            raw_window_handle,
            NonZeroU32::new(width).unwrap_or(NonZeroU32::MIN),
            NonZeroU32::new(height).unwrap_or(NonZeroU32::MIN),
        );

        let surface = unsafe { gl_config.display().create_window_surface(&gl_config, &attrs)? };
        let context = not_current_context.make_current(&surface)?;

        Ok(Box::new(GlutinBackend {
            context: Takeable::new(context),
            surface: Takeable::new(surface),
            window,
            request: request.clone(),
        }))
    }
}
