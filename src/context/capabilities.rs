use crate::context::{get_string, ExtensionsList, Profile};
use crate::gl;
use crate::version::{self, Api, Version};

/// Represents the capabilities of the context.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Version of the shading language. `None` if the backend doesn't have a compiler.
    pub glsl_version: Option<Version>,

    /// Profile of a desktop context. Always `None` for OpenGL ES.
    pub profile: Option<Profile>,

    /// Whether vertex array objects are available. Core contexts can't draw without one.
    pub vertex_array_objects: bool,

    /// Whether `glDispatchCompute` can be called.
    pub compute_shaders: bool,

    /// Whether patches can be drawn.
    pub tessellation_shaders: bool,

    /// Whether shader storage buffers can be bound.
    pub shader_storage_buffers: bool,

    /// Whether atomic counter buffers can be bound.
    pub atomic_counters: bool,

    /// Maximum number of textures that can be bound to a program.
    ///
    /// `glActiveTexture` must be between `GL_TEXTURE0` and `GL_TEXTURE0` + this value - 1.
    pub max_combined_texture_image_units: gl::types::GLint,
}

/// Loads the capabilities.
///
/// The context must be current.
pub unsafe fn get_capabilities(gl: &gl::Gl, version: &Version, extensions: &ExtensionsList)
                               -> Capabilities
{
    let glsl_version = get_string(gl, gl::SHADING_LANGUAGE_VERSION)
        .and_then(|s| version::parse_glsl_version(&s).ok());

    let profile = match version.0 {
        Api::GlEs => None,
        Api::Gl if version >= &Version(Api::Gl, 3, 2) => {
            let mut mask = 0;
            gl.GetIntegerv(gl::CONTEXT_PROFILE_MASK, &mut mask);
            if mask as gl::types::GLenum & gl::CONTEXT_CORE_PROFILE_BIT != 0 {
                Some(Profile::Core)
            } else {
                Some(Profile::Compatibility)
            }
        },
        Api::Gl if version >= &Version(Api::Gl, 3, 1) => {
            if extensions.contains("GL_ARB_compatibility") {
                Some(Profile::Compatibility)
            } else {
                Some(Profile::Core)
            }
        },
        Api::Gl => Some(Profile::Compatibility),
    };

    let mut max_combined_texture_image_units = 0;
    gl.GetIntegerv(gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS, &mut max_combined_texture_image_units);

    Capabilities {
        glsl_version,
        profile,

        vertex_array_objects: version >= &Version(Api::Gl, 3, 0) ||
                              version >= &Version(Api::GlEs, 3, 0) ||
                              extensions.contains("GL_ARB_vertex_array_object") ||
                              extensions.contains("GL_OES_vertex_array_object"),

        compute_shaders: version >= &Version(Api::Gl, 4, 3) ||
                         version >= &Version(Api::GlEs, 3, 1) ||
                         extensions.contains("GL_ARB_compute_shader"),

        tessellation_shaders: version >= &Version(Api::Gl, 4, 0) ||
                              version >= &Version(Api::GlEs, 3, 2) ||
                              extensions.contains("GL_ARB_tessellation_shader"),

        shader_storage_buffers: version >= &Version(Api::Gl, 4, 3) ||
                                version >= &Version(Api::GlEs, 3, 1) ||
                                extensions.contains("GL_ARB_shader_storage_buffer_object"),

        atomic_counters: version >= &Version(Api::Gl, 4, 2) ||
                         version >= &Version(Api::GlEs, 3, 1) ||
                         extensions.contains("GL_ARB_shader_atomic_counters"),

        max_combined_texture_image_units,
    }
}
