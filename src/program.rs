//! Compiling the shaders of a script and linking them into a program.

use std::error::Error;
use std::ffi::CString;
use std::fmt;
use std::ptr;

use log::debug;

use crate::context::{CapabilitiesSource, Context, Profile};
use crate::gl;
use crate::gl::types::{GLchar, GLenum, GLint, GLuint};
use crate::script::{Script, Shader, Stage};
use crate::version::{Api, Version};

/// Attribute locations bound before linking.
pub const VERTEX_ATTRIB_LOCATION: GLuint = 0;
pub const TEXCOORD_ATTRIB_LOCATION: GLuint = 1;

/// Error that can be triggered when creating a `Program`.
#[derive(Clone, Debug)]
pub enum ProgramCreationError {
    /// Error while compiling one of the shaders.
    CompilationError(String, Stage),

    /// Error while linking the program.
    LinkingError(String),

    /// The context can't compile shaders of this stage.
    ShaderTypeNotSupported(Stage),

    /// The shader text contains a nul byte.
    InvalidSource(Stage),
}

impl fmt::Display for ProgramCreationError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            ProgramCreationError::CompilationError(log, stage) => {
                write!(fmt, "Failed to compile {} shader: {}", stage.name(), log)
            },
            ProgramCreationError::LinkingError(log) => write!(fmt, "Failed to link: {}", log),
            ProgramCreationError::ShaderTypeNotSupported(stage) => {
                write!(fmt, "{} shaders are not supported by the context", stage.name())
            },
            ProgramCreationError::InvalidSource(stage) => {
                write!(fmt, "{} shader source contains a nul byte", stage.name())
            },
        }
    }
}

impl Error for ProgramCreationError {}

/// Where a member of a uniform block lives in the block's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBlockMember {
    pub block: usize,
    pub offset: usize,
    pub array_stride: usize,
    pub matrix_stride: usize,
    pub row_major: bool,
}

/// A linked program along with a buffer for each of its uniform blocks.
pub struct Program<'a> {
    context: &'a Context,
    id: GLuint,
    block_buffers: Vec<GLuint>,
}

// Deleted when dropped, which only flags the shader for deletion once it's attached.
struct CompiledShader<'a> {
    gl: &'a gl::Gl,
    id: GLuint,
}

impl<'a> Drop for CompiledShader<'a> {
    fn drop(&mut self) {
        unsafe { self.gl.DeleteShader(self.id) };
    }
}

fn shader_type(stage: Stage) -> GLenum {
    match stage {
        Stage::Vertex => gl::VERTEX_SHADER,
        Stage::TessCtrl => gl::TESS_CONTROL_SHADER,
        Stage::TessEval => gl::TESS_EVALUATION_SHADER,
        Stage::Geometry => gl::GEOMETRY_SHADER,
        Stage::Fragment => gl::FRAGMENT_SHADER,
        Stage::Compute => gl::COMPUTE_SHADER,
    }
}

fn is_stage_supported(context: &Context, stage: Stage) -> bool {
    let caps = context.capabilities();
    let version = context.get_version();

    match stage {
        Stage::Vertex | Stage::Fragment => caps.glsl_version.is_some(),
        Stage::Geometry => version >= &Version(Api::Gl, 3, 2) ||
                           version >= &Version(Api::GlEs, 3, 2) ||
                           context.has_extension("GL_ARB_geometry_shader4") ||
                           context.has_extension("GL_EXT_geometry_shader"),
        Stage::TessCtrl | Stage::TessEval => caps.tessellation_shaders,
        Stage::Compute => caps.compute_shaders,
    }
}

/// Source of the vertex shader generated for `[vertex shader passthrough]`.
///
/// `glsl` is the version the other shaders are written for. Core contexts need at least 1.40.
pub fn passthrough_vertex_shader(glsl: Version, profile: Option<Profile>) -> String {
    let (declaration, header) = match glsl {
        Version(Api::GlEs, major, minor) if major >= 3 => {
            ("in", format!("#version {}{:02} es\n", major, minor))
        },
        Version(Api::GlEs, _, _) => ("attribute", "#version 100\n".to_owned()),
        Version(Api::Gl, major, minor) => {
            let (major, minor) = if profile == Some(Profile::Core) {
                (major, minor).max((1, 40))
            } else {
                (major, minor)
            };
            if (major, minor) >= (1, 30) {
                ("in", format!("#version {}{:02}\n", major, minor))
            } else {
                ("attribute", format!("#version {}{:02}\n", major, minor))
            }
        },
    };

    format!("{}{} vec4 piglit_vertex;\n\
             void main()\n\
             {{\n\
             \tgl_Position = piglit_vertex;\n\
             }}\n",
            header, declaration)
}

unsafe fn info_log(gl: &gl::Gl, id: GLuint, program: bool) -> String {
    let mut length: GLint = 0;

    if program {
        gl.GetProgramiv(id, gl::INFO_LOG_LENGTH, &mut length);
    } else {
        gl.GetShaderiv(id, gl::INFO_LOG_LENGTH, &mut length);
    }

    if length <= 0 {
        return String::new();
    }

    let mut log = vec![0u8; length as usize];
    let mut written: GLint = 0;

    if program {
        gl.GetProgramInfoLog(id, length, &mut written, log.as_mut_ptr() as *mut GLchar);
    } else {
        gl.GetShaderInfoLog(id, length, &mut written, log.as_mut_ptr() as *mut GLchar);
    }

    log.truncate(written.max(0) as usize);

    String::from_utf8_lossy(&log).into_owned()
}

fn compile_shader<'a>(context: &'a Context, stage: Stage, source: &str)
                      -> Result<CompiledShader<'a>, ProgramCreationError>
{
    if !is_stage_supported(context, stage) {
        return Err(ProgramCreationError::ShaderTypeNotSupported(stage));
    }

    let source = CString::new(source).map_err(|_| ProgramCreationError::InvalidSource(stage))?;
    let gl = context.gl();

    unsafe {
        let id = gl.CreateShader(shader_type(stage));

        if id == 0 {
            return Err(ProgramCreationError::ShaderTypeNotSupported(stage));
        }

        let shader = CompiledShader { gl, id };

        gl.ShaderSource(id, 1, [source.as_ptr()].as_ptr(), ptr::null());
        gl.CompileShader(id);

        let mut status: GLint = 0;
        gl.GetShaderiv(id, gl::COMPILE_STATUS, &mut status);

        if status == gl::TRUE as GLint {
            Ok(shader)
        } else {
            Err(ProgramCreationError::CompilationError(info_log(gl, id, false), stage))
        }
    }
}

impl<'a> Program<'a> {
    /// Compiles every shader of the script and links them.
    pub fn new(context: &'a Context, script: &Script) -> Result<Program<'a>, ProgramCreationError> {
        let gl = context.gl();
        let mut shaders = Vec::new();

        for &stage in Stage::ALL.iter() {
            for shader in script.shaders(stage) {
                let compiled = match shader {
                    Shader::Glsl(source) => compile_shader(context, stage, source)?,
                    Shader::Passthrough => {
                        let glsl = script.requirements()
                                         .glsl_version()
                                         .or_else(|| context.get_glsl_version().copied())
                                         .unwrap_or(Version(Api::Gl, 1, 10));
                        let source = passthrough_vertex_shader(glsl, context.get_profile());
                        compile_shader(context, stage, &source)?
                    },
                };
                shaders.push(compiled);
            }
        }

        let program = unsafe {
            let id = gl.CreateProgram();

            for shader in &shaders {
                gl.AttachShader(id, shader.id);
            }

            gl.BindAttribLocation(id, VERTEX_ATTRIB_LOCATION,
                                  b"piglit_vertex\0".as_ptr() as *const GLchar);
            gl.BindAttribLocation(id, TEXCOORD_ATTRIB_LOCATION,
                                  b"piglit_texcoord\0".as_ptr() as *const GLchar);

            gl.LinkProgram(id);

            for shader in &shaders {
                gl.DetachShader(id, shader.id);
            }

            let mut status: GLint = 0;
            gl.GetProgramiv(id, gl::LINK_STATUS, &mut status);

            if status != gl::TRUE as GLint {
                let log = info_log(gl, id, true);
                gl.DeleteProgram(id);
                return Err(ProgramCreationError::LinkingError(log));
            }

            Program { context, id, block_buffers: Vec::new() }
        };

        debug!("linked program {} from {} shader(s)", program.id, shaders.len());

        Ok(program.with_block_buffers())
    }

    // Gives every uniform block a zeroed buffer, bound to the binding point of the same index
    fn with_block_buffers(mut self) -> Program<'a> {
        let version = self.context.get_version();

        if !(version >= &Version(Api::Gl, 3, 1) || version >= &Version(Api::GlEs, 3, 0)) {
            return self;
        }

        let gl = self.context.gl();

        unsafe {
            let mut n_blocks: GLint = 0;
            gl.GetProgramiv(self.id, gl::ACTIVE_UNIFORM_BLOCKS, &mut n_blocks);

            for block in 0..n_blocks.max(0) as GLuint {
                let mut size: GLint = 0;
                gl.GetActiveUniformBlockiv(self.id, block, gl::UNIFORM_BLOCK_DATA_SIZE, &mut size);

                let zeroes = vec![0u8; size.max(0) as usize];
                let mut buffer = 0;
                gl.GenBuffers(1, &mut buffer);
                gl.BindBuffer(gl::UNIFORM_BUFFER, buffer);
                gl.BufferData(gl::UNIFORM_BUFFER, zeroes.len() as isize,
                              zeroes.as_ptr() as *const _, gl::DYNAMIC_DRAW);

                gl.UniformBlockBinding(self.id, block, block);
                gl.BindBufferBase(gl::UNIFORM_BUFFER, block, buffer);

                self.block_buffers.push(buffer);
            }
        }

        debug!("program {} has {} uniform block(s)", self.id, self.block_buffers.len());

        self
    }

    pub fn id(&self) -> GLuint {
        self.id
    }

    /// Location of a uniform of the default block.
    pub fn uniform_location(&self, name: &str) -> Option<GLint> {
        let name = CString::new(name).ok()?;

        match unsafe { self.context.gl().GetUniformLocation(self.id, name.as_ptr()) } {
            -1 => None,
            location => Some(location),
        }
    }

    /// Location of a vertex attribute, `None` if it isn't active.
    pub fn attrib_location(&self, name: &str) -> Option<GLuint> {
        let name = CString::new(name).ok()?;

        match unsafe { self.context.gl().GetAttribLocation(self.id, name.as_ptr()) } {
            location if location < 0 => None,
            location => Some(location as GLuint),
        }
    }

    /// Looks up a uniform that's a member of a uniform block.
    pub fn uniform_block_member(&self, name: &str) -> Option<UniformBlockMember> {
        if self.block_buffers.is_empty() {
            return None;
        }

        let name = CString::new(name).ok()?;
        let gl = self.context.gl();

        unsafe {
            let mut index: GLuint = gl::INVALID_INDEX;
            gl.GetUniformIndices(self.id, 1, [name.as_ptr()].as_ptr(), &mut index);

            if index == gl::INVALID_INDEX {
                return None;
            }

            let query = |pname| {
                let mut value: GLint = 0;
                gl.GetActiveUniformsiv(self.id, 1, &index, pname, &mut value);
                value
            };

            let block = query(gl::UNIFORM_BLOCK_INDEX);

            if block < 0 {
                return None;
            }

            Some(UniformBlockMember {
                block: block as usize,
                offset: query(gl::UNIFORM_OFFSET).max(0) as usize,
                array_stride: query(gl::UNIFORM_ARRAY_STRIDE).max(0) as usize,
                matrix_stride: query(gl::UNIFORM_MATRIX_STRIDE).max(0) as usize,
                row_major: query(gl::UNIFORM_IS_ROW_MAJOR) != 0,
            })
        }
    }

    /// Buffer backing a uniform block.
    pub fn block_buffer(&self, block: usize) -> Option<GLuint> {
        self.block_buffers.get(block).copied()
    }
}

impl<'a> Drop for Program<'a> {
    fn drop(&mut self) {
        let gl = self.context.gl();

        unsafe {
            if !self.block_buffers.is_empty() {
                gl.DeleteBuffers(self.block_buffers.len() as GLint, self.block_buffers.as_ptr());
            }
            gl.DeleteProgram(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_sources() {
        let source = passthrough_vertex_shader(Version(Api::Gl, 1, 10), None);
        assert!(source.starts_with("#version 110\nattribute vec4 piglit_vertex;\n"));

        let source = passthrough_vertex_shader(Version(Api::Gl, 1, 30), None);
        assert!(source.starts_with("#version 130\nin vec4 piglit_vertex;\n"));
        assert!(source.contains("gl_Position = piglit_vertex;"));

        let source = passthrough_vertex_shader(Version(Api::Gl, 1, 20), Some(Profile::Core));
        assert!(source.starts_with("#version 140\nin vec4"));

        let source = passthrough_vertex_shader(Version(Api::Gl, 4, 50), Some(Profile::Core));
        assert!(source.starts_with("#version 450\n"));

        let source = passthrough_vertex_shader(Version(Api::GlEs, 1, 0), None);
        assert!(source.starts_with("#version 100\nattribute vec4"));

        let source = passthrough_vertex_shader(Version(Api::GlEs, 3, 10), None);
        assert!(source.starts_with("#version 310 es\nin vec4"));
    }

    #[test]
    fn error_messages() {
        let error = ProgramCreationError::CompilationError("0:1: syntax error".to_owned(),
                                                           Stage::Fragment);
        assert_eq!(error.to_string(), "Failed to compile fragment shader: 0:1: syntax error");
        assert_eq!(
            ProgramCreationError::ShaderTypeNotSupported(Stage::TessEval).to_string(),
            "tessellation evaluation shaders are not supported by the context"
        );
    }
}
