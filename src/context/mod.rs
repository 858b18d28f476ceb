/*!

Wraps a [`Backend`] with everything the runner needs to know about its OpenGL context.

The function table is loaded once when the context is built, and the version, extensions and
capabilities are queried right away so that requirements can be checked without touching GL
again.

*/
use std::error::Error;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_char;

use log::info;

use crate::backend::Backend;
use crate::enums;
use crate::gl;
use crate::version::{self, Api, InvalidVersion, Version};

pub use self::capabilities::Capabilities;
pub use self::extensions::ExtensionsList;

mod capabilities;
mod extensions;

/// The profile of a desktop OpenGL context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Profile {
    Core,
    Compatibility,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Profile::Core => write!(f, "core"),
            Profile::Compatibility => write!(f, "compatibility"),
        }
    }
}

/// The kind of context a script needs.
///
/// Two scripts with equal requests can share a context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextRequest {
    pub api: Api,
    /// `None` lets the backend pick whatever version it likes.
    pub version: Option<(u8, u8)>,
    /// `None` means compatibility when possible, otherwise core.
    pub profile: Option<Profile>,
}

impl Default for ContextRequest {
    fn default() -> ContextRequest {
        ContextRequest { api: Api::Gl, version: None, profile: None }
    }
}

impl fmt::Display for ContextRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.api {
            Api::Gl => write!(f, "OpenGL")?,
            Api::GlEs => write!(f, "OpenGL ES")?,
        }
        if let Some((major, minor)) = self.version {
            write!(f, " {}.{}", major, minor)?;
        }
        match self.profile {
            Some(profile) => write!(f, " {}", profile),
            None => Ok(()),
        }
    }
}

/// Error reported by `glGetError`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GlError(pub gl::types::GLenum);

impl fmt::Display for GlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GL error: {}", enums::error_name(self.0))
    }
}

impl Error for GlError {}

/// Error that can happen while building a [`Context`].
#[derive(Debug)]
pub enum CreationError {
    /// The driver returned a version string that can't be parsed.
    InvalidVersion(InvalidVersion),
    /// The OpenGL implementation is too old to run shaders.
    IncompatibleOpenGl(String),
}

impl fmt::Display for CreationError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CreationError::InvalidVersion(e) => e.fmt(fmt),
            CreationError::IncompatibleOpenGl(msg) => {
                write!(fmt, "the OpenGL implementation is not compatible: {}", msg)
            },
        }
    }
}

impl Error for CreationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CreationError::InvalidVersion(e) => Some(e),
            CreationError::IncompatibleOpenGl(_) => None,
        }
    }
}

impl From<InvalidVersion> for CreationError {
    fn from(e: InvalidVersion) -> CreationError {
        CreationError::InvalidVersion(e)
    }
}

/// Trait for objects that describe what an OpenGL implementation can do.
///
/// Requirements are checked against this trait rather than against [`Context`] directly.
pub trait CapabilitiesSource {
    /// Returns the version of the backend.
    fn get_version(&self) -> &Version;

    /// Returns the version of the shading language, if there is a compiler.
    fn get_glsl_version(&self) -> Option<&Version>;

    /// Returns true if the extension is advertised.
    fn has_extension(&self, name: &str) -> bool;

    /// Returns the profile of a desktop context.
    fn get_profile(&self) -> Option<Profile>;

    /// Queries an integer limit such as `GL_MAX_TEXTURE_SIZE` by name.
    fn get_limit(&self, name: &str) -> Option<i64>;
}

pub struct Context {
    gl: gl::Gl,
    version: Version,
    renderer: String,
    extensions: ExtensionsList,
    capabilities: Capabilities,
    backend: Box<dyn Backend>,
}

impl Context {
    /// Builds a new context on top of a backend.
    ///
    /// The backend is made current and stays current for the lifetime of the context.
    pub fn new(backend: Box<dyn Backend>) -> Result<Context, CreationError> {
        unsafe { backend.make_current() };

        let gl = gl::Gl::load_with(|symbol| unsafe { backend.get_proc_address(symbol) });

        let version_string = unsafe { get_string(&gl, gl::VERSION) }
            .ok_or_else(|| CreationError::IncompatibleOpenGl("glGetString failed".to_owned()))?;
        let version = version::parse_gl_version(&version_string)?;
        let renderer = unsafe { get_string(&gl, gl::RENDERER) }.unwrap_or_default();

        let extensions = unsafe { extensions::get_extensions(&gl, &version) };
        let capabilities = unsafe { capabilities::get_capabilities(&gl, &version, &extensions) };

        check_gl_compatibility(&gl, &version, &capabilities)?;

        info!("created {} context: {} ({})", backend.request(), version_string, renderer);

        Ok(Context { gl, version, renderer, extensions, capabilities, backend })
    }

    /// The generated function table.
    pub fn gl(&self) -> &gl::Gl {
        &self.gl
    }

    pub fn make_current(&self) {
        if !self.backend.is_current() {
            unsafe { self.backend.make_current() };
        }
    }

    pub fn request(&self) -> &ContextRequest {
        self.backend.request()
    }

    pub fn get_framebuffer_dimensions(&self) -> (u32, u32) {
        self.backend.get_framebuffer_dimensions()
    }

    pub fn renderer(&self) -> &str {
        &self.renderer
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn get_extensions(&self) -> &ExtensionsList {
        &self.extensions
    }

    /// Returns the next error flag, `GL_NO_ERROR` if there is none.
    pub fn get_error(&self) -> gl::types::GLenum {
        unsafe { self.gl.GetError() }
    }

    /// Fails with the first pending error and clears the others.
    pub fn check_error(&self) -> Result<(), GlError> {
        let first = self.get_error();

        if first == gl::NO_ERROR {
            return Ok(());
        }

        // a lost context keeps returning errors forever
        for _ in 0..16 {
            if self.get_error() == gl::NO_ERROR {
                break;
            }
        }

        Err(GlError(first))
    }

    /// Calls `glGetIntegerv` and checks that the query was accepted.
    pub fn get_integer(&self, pname: gl::types::GLenum) -> Result<gl::types::GLint, GlError> {
        self.check_error()?;

        let mut value = 0;
        unsafe { self.gl.GetIntegerv(pname, &mut value) };

        self.check_error()?;

        Ok(value)
    }
}

impl CapabilitiesSource for Context {
    fn get_version(&self) -> &Version {
        &self.version
    }

    fn get_glsl_version(&self) -> Option<&Version> {
        self.capabilities.glsl_version.as_ref()
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn get_profile(&self) -> Option<Profile> {
        self.capabilities.profile
    }

    fn get_limit(&self, name: &str) -> Option<i64> {
        let pname = enums::lookup(name)?;
        self.get_integer(pname).ok().map(i64::from)
    }
}

fn check_gl_compatibility(gl: &gl::Gl, version: &Version, capabilities: &Capabilities)
                          -> Result<(), CreationError>
{
    let mut result = Vec::new();

    if !(version >= &Version(Api::Gl, 2, 0)) && !(version >= &Version(Api::GlEs, 2, 0)) {
        result.push("shaders need OpenGL 2.0 or OpenGL ES 2.0");
    }

    if capabilities.glsl_version.is_none() {
        result.push("the implementation has no shading language compiler");
    }

    if !gl.GenFramebuffers.is_loaded() {
        result.push("framebuffer objects are not supported");
    }

    if result.is_empty() {
        Ok(())
    } else {
        Err(CreationError::IncompatibleOpenGl(result.join("\n")))
    }
}

/// Returns a string from `glGetString`, or `None` if the query failed.
pub(crate) unsafe fn get_string(gl: &gl::Gl, name: gl::types::GLenum) -> Option<String> {
    let ptr = gl.GetString(name);

    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr as *const c_char).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_display() {
        let request = ContextRequest {
            api: Api::Gl,
            version: Some((4, 5)),
            profile: Some(Profile::Core),
        };
        assert_eq!(request.to_string(), "OpenGL 4.5 core");

        let request = ContextRequest { api: Api::GlEs, version: Some((3, 1)), profile: None };
        assert_eq!(request.to_string(), "OpenGL ES 3.1");

        assert_eq!(ContextRequest::default().to_string(), "OpenGL");
    }

    #[test]
    fn gl_error_names() {
        assert_eq!(GlError(gl::INVALID_VALUE).to_string(), "GL error: GL_INVALID_VALUE");
    }
}
