//! Replays the `[test]` commands of a script against a live context.

use std::error::Error as StdError;
use std::fmt;
use std::mem;
use std::ptr;

use fnv::FnvHashMap;
use log::{debug, warn};

use crate::context::{CapabilitiesSource, Context, GlError};
use crate::fbo::{self, Framebuffer, IncompleteFramebuffer};
use crate::gl;
use crate::gl::types::{GLenum, GLint, GLsizei, GLsizeiptr, GLuint};
use crate::program::{
    Program, ProgramCreationError, UniformBlockMember, TEXCOORD_ATTRIB_LOCATION,
    VERTEX_ATTRIB_LOCATION,
};
use crate::script::{Command, Operation, Region, Script, TexParameterValue, TextureImage};
use crate::texture;
use crate::uniform::{Comparison, UniformType, Values};
use crate::vbo::Interpretation;
use crate::version::Api;

#[derive(Debug)]
pub struct CommandError {
    pub line_num: usize,
    pub error: Error,
}

#[derive(Debug)]
pub enum Error {
    Gl(GlError),
    ProbeFailed(ProbeFailedError),
    DepthProbeFailed {
        x: u32,
        y: u32,
        expected: f64,
        observed: f64,
    },
    SsboProbeFailed {
        binding: u32,
        offset: usize,
        comparison: Comparison,
        expected: Values,
        observed: Values,
    },
    AtomicCounterProbeFailed {
        index: u32,
        comparison: Comparison,
        expected: u32,
        observed: u32,
    },
    UniformNotFound(String),
    AttribNotFound(String),
    InvalidTextureUnit(u32),
    NoTexture(u32),
    NoSsbo(u32),
    /// A probe reaching past the edges of the render target.
    ProbeOutOfRange {
        rect: [u32; 4],
        size: (u32, u32),
    },
    SsboOutOfRange {
        binding: u32,
        offset: usize,
        length: usize,
        size: usize,
    },
    AtomicCounterOutOfRange {
        index: u32,
        count: u32,
    },
    /// The context doesn't have the entry points a command needs.
    Unsupported(&'static str),
    IncompleteFramebuffer(IncompleteFramebuffer),
    Link(ProgramCreationError),
    UnexpectedLinkSuccess,
    NoProgram,
    CommandErrors(Vec<CommandError>),
}

#[derive(Debug)]
pub struct ProbeFailedError {
    x: u32,
    y: u32,
    expected: [f64; 4],
    observed: [f64; 4],
    n_components: usize,
}

fn format_pixel(f: &mut fmt::Formatter, pixel: &[f64]) -> fmt::Result {
    for component in pixel {
        write!(f, " {}", component)?;
    }

    Ok(())
}

impl fmt::Display for ProbeFailedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Probe color at ({},{})\n\
             \x20 Expected:",
            self.x,
            self.y,
        )?;
        format_pixel(f, &self.expected[0..self.n_components])?;
        write!(
            f,
            "\n\
             \x20 Observed:"
        )?;
        format_pixel(f, &self.observed[0..self.n_components])
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Gl(e) => e.fmt(f),
            Error::ProbeFailed(e) => e.fmt(f),
            Error::DepthProbeFailed { x, y, expected, observed } => {
                write!(
                    f,
                    "Probe depth at ({},{})\n\
                     \x20 Expected: {}\n\
                     \x20 Observed: {}",
                    x, y, expected, observed,
                )
            },
            Error::SsboProbeFailed { binding, offset, comparison, expected, observed } => {
                write!(
                    f,
                    "SSBO {} probe failed at offset {}\n\
                     \x20 Expected: {} {}\n\
                     \x20 Observed: {}",
                    binding, offset, comparison, expected, observed,
                )
            },
            Error::AtomicCounterProbeFailed { index, comparison, expected, observed } => {
                write!(
                    f,
                    "Atomic counter {} probe failed\n\
                     \x20 Expected: {} {}\n\
                     \x20 Observed: {}",
                    index, comparison, expected, observed,
                )
            },
            Error::UniformNotFound(name) => {
                write!(f, "Cannot get location of uniform “{}”", name)
            },
            Error::AttribNotFound(name) => {
                write!(f, "Unexpected vertex data column name “{}”", name)
            },
            Error::InvalidTextureUnit(unit) => write!(f, "Invalid texture unit {}", unit),
            Error::NoTexture(unit) => write!(f, "No texture is bound to unit {}", unit),
            Error::NoSsbo(binding) => write!(f, "No SSBO is allocated at binding {}", binding),
            Error::ProbeOutOfRange { rect: [x, y, w, h], size: (width, height) } => {
                write!(
                    f,
                    "Probe rectangle ({}, {}, {}, {}) is outside of the {}x{} render target",
                    x, y, w, h, width, height,
                )
            },
            Error::SsboOutOfRange { binding, offset, length, size } => {
                write!(
                    f,
                    "Range {}+{} is outside of SSBO {} which has size {}",
                    offset, length, binding, size,
                )
            },
            Error::AtomicCounterOutOfRange { index, count } => {
                write!(f, "Atomic counter {} is out of range, {} allocated", index, count)
            },
            Error::Unsupported(what) => write!(f, "{} not supported by the context", what),
            Error::IncompleteFramebuffer(e) => e.fmt(f),
            Error::Link(e) => e.fmt(f),
            Error::UnexpectedLinkSuccess => {
                write!(f, "Program linked successfully but a link error was expected")
            },
            Error::NoProgram => write!(f, "The script has no program"),
            Error::CommandErrors(errors) => {
                for (num, e) in errors.iter().enumerate() {
                    if num > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "line {}: ", e.line_num)?;
                    e.error.fmt(f)?;
                }
                Ok(())
            },
        }
    }
}

impl StdError for Error {}

impl From<GlError> for Error {
    fn from(e: GlError) -> Error {
        Error::Gl(e)
    }
}

impl From<IncompleteFramebuffer> for Error {
    fn from(e: IncompleteFramebuffer) -> Error {
        Error::IncompleteFramebuffer(e)
    }
}

/// Outcome of building the script's program.
#[derive(Clone, Copy)]
pub enum ProgramState<'p, 'c> {
    /// The script has no shaders.
    None,
    Linked(&'p Program<'c>),
    /// Only `link error` and `link success` run in this state.
    Failed(&'p ProgramCreationError),
}

/// Vertex layout of `draw rect`: a vec4 position followed by a vec2 texture coordinate.
const RECT_VERTEX_FLOATS: usize = 6;

/// Vertices of a rectangle drawn as a triangle strip.
fn rect_vertices(x: f32, y: f32, w: f32, h: f32, tex: [f32; 4])
                 -> [f32; RECT_VERTEX_FLOATS * 4]
{
    let [tx, ty, tw, th] = tex;

    [
        x, y, 0.0, 1.0, tx, ty,
        x + w, y, 0.0, 1.0, tx + tw, ty,
        x, y + h, 0.0, 1.0, tx, ty + th,
        x + w, y + h, 0.0, 1.0, tx + tw, ty + th,
    ]
}

/// Converts a rectangle in pixels of a render target to normalized device coordinates.
fn ortho_to_ndc([x, y, w, h]: [f32; 4], (width, height): (u32, u32)) -> [f32; 4] {
    let (width, height) = (width as f32, height as f32);

    [x * 2.0 / width - 1.0, y * 2.0 / height - 1.0, w * 2.0 / width, h * 2.0 / height]
}

/// Checks that a rectangle in pixels lies within a render target.
fn check_probe_rect(rect: [u32; 4], size: (u32, u32)) -> Result<(), Error> {
    let [x, y, w, h] = rect;
    let fits = |start: u32, length: u32, limit: u32| {
        start.checked_add(length).map_or(false, |end| end <= limit)
    };

    if fits(x, w, size.0) && fits(y, h, size.1) {
        Ok(())
    } else {
        Err(Error::ProbeOutOfRange { rect, size })
    }
}

/// Byte offset of every component of a uniform block member, in the order the values are
/// given in the script.
fn block_member_offsets(member: &UniformBlockMember, uniform_type: &UniformType,
                        n_elements: usize) -> Vec<usize>
{
    let component_size = uniform_type.base_type.size();
    let mut offsets = Vec::with_capacity(n_elements * uniform_type.n_components());

    for element in 0..n_elements {
        let base = member.offset + element * member.array_stride;

        for column in 0..uniform_type.columns {
            for row in 0..uniform_type.rows {
                let offset = if !uniform_type.is_matrix() {
                    row * component_size
                } else if member.row_major {
                    row * member.matrix_stride + column * component_size
                } else {
                    column * member.matrix_stride + row * component_size
                };

                offsets.push(base + offset);
            }
        }
    }

    offsets
}

fn to_rgba8(texels: &[f32]) -> Vec<u8> {
    texels.iter().map(|&c| (c.clamp(0.0, 1.0) * 255.0).round() as u8).collect()
}

#[derive(Debug, Clone, Copy)]
struct BoundTexture {
    id: GLuint,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy)]
struct Ssbo {
    id: GLuint,
    size: usize,
}

struct Tester<'a> {
    context: &'a Context,
    framebuffer: &'a Framebuffer<'a>,
    script: &'a Script,
    program: ProgramState<'a, 'a>,
    vertex_array: Option<GLuint>,
    rect_buffer: Option<GLuint>,
    vbo_buffer: Option<GLuint>,
    textures: FnvHashMap<u32, BoundTexture>,
    ssbos: FnvHashMap<u32, Ssbo>,
    atomic_counters: Option<(GLuint, u32)>,
    texture_framebuffer: Option<GLuint>,
    /// Size of what is being drawn to: the framebuffer, or a texture level after `fb tex 2d`.
    render_size: (u32, u32),
}

macro_rules! require_fn {
    ($gl:expr, $func:ident, $what:expr) => {
        if !$gl.$func.is_loaded() {
            return Err(Error::Unsupported($what));
        }
    };
}

impl<'a> Tester<'a> {
    fn new(
        context: &'a Context,
        framebuffer: &'a Framebuffer<'a>,
        script: &'a Script,
        program: ProgramState<'a, 'a>,
    ) -> Tester<'a> {
        let gl = context.gl();

        let vertex_array = if context.capabilities().vertex_array_objects {
            let mut id = 0;
            unsafe {
                gl.GenVertexArrays(1, &mut id);
                gl.BindVertexArray(id);
            }
            Some(id)
        } else {
            None
        };

        if let ProgramState::Linked(program) = program {
            unsafe { gl.UseProgram(program.id()) };
        }

        framebuffer.bind(gl::FRAMEBUFFER);
        framebuffer.reset_viewport();

        Tester {
            context,
            framebuffer,
            script,
            program,
            vertex_array,
            rect_buffer: None,
            vbo_buffer: None,
            textures: FnvHashMap::default(),
            ssbos: FnvHashMap::default(),
            atomic_counters: None,
            texture_framebuffer: None,
            render_size: framebuffer.dimensions(),
        }
    }

    fn gl(&self) -> &'a gl::Gl {
        self.context.gl()
    }

    fn linked_program(&self) -> Result<&'a Program<'a>, Error> {
        match self.program {
            ProgramState::Linked(program) => Ok(program),
            ProgramState::None | ProgramState::Failed(_) => Err(Error::NoProgram),
        }
    }

    fn is_es(&self) -> bool {
        self.context.get_version().0 == Api::GlEs
    }

    fn clear(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::Clear { color, depth, stencil } = op else {
            unreachable!("bad op");
        };

        let gl = self.gl();

        unsafe {
            gl.ClearColor(color[0], color[1], color[2], color[3]);

            if gl.ClearDepthf.is_loaded() {
                gl.ClearDepthf(depth);
            } else {
                gl.ClearDepth(depth as f64);
            }

            gl.ClearStencil(stencil as GLint);
            gl.Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT);
        }

        Ok(())
    }

    fn get_rect_buffer(&mut self) -> GLuint {
        if let Some(buffer) = self.rect_buffer {
            return buffer;
        }

        let mut buffer = 0;
        unsafe { self.gl().GenBuffers(1, &mut buffer) };
        self.rect_buffer = Some(buffer);

        buffer
    }

    fn draw_rect(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::DrawRect { x, y, w, h, ortho, tex, patch, instances } = op else {
            unreachable!("bad op");
        };

        let [x, y, w, h] = if ortho {
            ortho_to_ndc([x, y, w, h], self.render_size)
        } else {
            [x, y, w, h]
        };

        let gl = self.gl();

        if patch {
            require_fn!(gl, PatchParameteri, "Drawing patches");
        }
        if instances.is_some() {
            require_fn!(gl, DrawArraysInstanced, "Instanced drawing");
        }

        let vertices = rect_vertices(x, y, w, h, tex.unwrap_or([0.0; 4]));
        let buffer = self.get_rect_buffer();
        let stride = (RECT_VERTEX_FLOATS * mem::size_of::<f32>()) as GLsizei;

        unsafe {
            gl.BindBuffer(gl::ARRAY_BUFFER, buffer);
            gl.BufferData(gl::ARRAY_BUFFER, mem::size_of_val(&vertices) as GLsizeiptr,
                          vertices.as_ptr() as *const _, gl::STREAM_DRAW);

            gl.VertexAttribPointer(VERTEX_ATTRIB_LOCATION, 4, gl::FLOAT, gl::FALSE, stride,
                                   ptr::null());
            gl.EnableVertexAttribArray(VERTEX_ATTRIB_LOCATION);

            if tex.is_some() {
                gl.VertexAttribPointer(TEXCOORD_ATTRIB_LOCATION, 2, gl::FLOAT, gl::FALSE, stride,
                                       (4 * mem::size_of::<f32>()) as *const _);
                gl.EnableVertexAttribArray(TEXCOORD_ATTRIB_LOCATION);
            }

            if patch {
                let mut old_vertices: GLint = 0;
                gl.GetIntegerv(gl::PATCH_VERTICES, &mut old_vertices);
                gl.PatchParameteri(gl::PATCH_VERTICES, 4);
                gl.DrawArrays(gl::PATCHES, 0, 4);
                gl.PatchParameteri(gl::PATCH_VERTICES, old_vertices);
            } else if let Some(instances) = instances {
                gl.DrawArraysInstanced(gl::TRIANGLE_STRIP, 0, 4, instances as GLsizei);
            } else {
                gl.DrawArrays(gl::TRIANGLE_STRIP, 0, 4);
            }

            gl.DisableVertexAttribArray(VERTEX_ATTRIB_LOCATION);
            if tex.is_some() {
                gl.DisableVertexAttribArray(TEXCOORD_ATTRIB_LOCATION);
            }
            gl.BindBuffer(gl::ARRAY_BUFFER, 0);
        }

        Ok(())
    }

    fn get_vbo_buffer(&mut self) -> Option<GLuint> {
        let vbo = self.script.vertex_data()?;

        if let Some(buffer) = self.vbo_buffer {
            return Some(buffer);
        }

        let gl = self.gl();
        let mut buffer = 0;

        unsafe {
            gl.GenBuffers(1, &mut buffer);
            gl.BindBuffer(gl::ARRAY_BUFFER, buffer);
            gl.BufferData(gl::ARRAY_BUFFER, vbo.raw_data().len() as GLsizeiptr,
                          vbo.raw_data().as_ptr() as *const _, gl::STATIC_DRAW);
        }

        self.vbo_buffer = Some(buffer);

        Some(buffer)
    }

    // Points every column of the vertex data at its attribute and returns the enabled locations
    fn bind_vertex_data(&mut self) -> Result<Vec<GLuint>, Error> {
        let Some(buffer) = self.get_vbo_buffer() else {
            return Ok(Vec::new());
        };
        let Some(vbo) = self.script.vertex_data() else {
            return Ok(Vec::new());
        };

        let program = self.linked_program()?;
        let gl = self.gl();
        let stride = vbo.stride() as GLsizei;
        let mut locations = Vec::with_capacity(vbo.attribs().len());

        unsafe { gl.BindBuffer(gl::ARRAY_BUFFER, buffer) };

        for attrib in vbo.attribs() {
            let location = program.attrib_location(attrib.name())
                                  .ok_or_else(|| Error::AttribNotFound(attrib.name().to_owned()))?
                + attrib.column();
            let size = attrib.n_components() as GLint;
            let data_type = attrib.data_type().gl_type();
            let offset = attrib.offset() as *const _;

            unsafe {
                match attrib.interpretation() {
                    Interpretation::Float => {
                        gl.VertexAttribPointer(location, size, data_type, gl::FALSE, stride,
                                               offset);
                    },
                    Interpretation::Integer => {
                        require_fn!(gl, VertexAttribIPointer, "Integer vertex attributes");
                        gl.VertexAttribIPointer(location, size, data_type, stride, offset);
                    },
                    Interpretation::Double => {
                        require_fn!(gl, VertexAttribLPointer, "Double vertex attributes");
                        gl.VertexAttribLPointer(location, size, data_type, stride, offset);
                    },
                }
                gl.EnableVertexAttribArray(location);
            }

            locations.push(location);
        }

        Ok(locations)
    }

    fn draw_arrays(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::DrawArrays { mode, first, count, instances } = op else {
            unreachable!("bad op");
        };

        let gl = self.gl();

        if instances.is_some() {
            require_fn!(gl, DrawArraysInstanced, "Instanced drawing");
        }

        let locations = self.bind_vertex_data()?;

        unsafe {
            match instances {
                Some(instances) => {
                    gl.DrawArraysInstanced(mode, first as GLint, count as GLsizei,
                                           instances as GLsizei)
                },
                None => gl.DrawArrays(mode, first as GLint, count as GLsizei),
            }

            for location in locations {
                gl.DisableVertexAttribArray(location);
            }
            gl.BindBuffer(gl::ARRAY_BUFFER, 0);
        }

        Ok(())
    }

    fn dispatch_compute(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::Compute { x, y, z } = op else {
            unreachable!("bad op");
        };

        if !self.context.capabilities().compute_shaders {
            return Err(Error::Unsupported("Compute shaders"));
        }

        unsafe { self.gl().DispatchCompute(x, y, z) };

        Ok(())
    }

    fn probe_rect(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::ProbeRect { n_components, region, ref color, ref tolerance } = op else {
            unreachable!("bad op");
        };

        let rect = region.resolve(self.render_size);
        check_probe_rect(rect, self.render_size)?;

        let [x, y, w, h] = rect;
        let pixels = fbo::read_pixels(self.context, x, y, w, h);

        for (i, pixel) in pixels.iter().enumerate() {
            if !tolerance.pixel_equal(&pixel[0..n_components], &color[0..n_components]) {
                return Err(Error::ProbeFailed(ProbeFailedError {
                    x: x + i as u32 % w,
                    y: y + i as u32 / w,
                    expected: *color,
                    observed: *pixel,
                    n_components,
                }));
            }
        }

        Ok(())
    }

    fn probe_depth(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::ProbeDepth { x, y, depth, ref tolerance } = op else {
            unreachable!("bad op");
        };

        if self.is_es() {
            return Err(Error::Unsupported("Reading the depth buffer"));
        }

        check_probe_rect([x, y, 1, 1], self.render_size)?;

        let observed = fbo::read_depth(self.context, x, y);

        if tolerance.equal(0, observed, depth) {
            Ok(())
        } else {
            Err(Error::DepthProbeFailed { x, y, expected: depth, observed })
        }
    }

    fn set_uniform(&mut self, op: &Operation) -> Result<(), Error> {
        let Operation::Uniform { name, uniform_type, values } = op else {
            unreachable!("bad op");
        };

        let program = self.linked_program()?;

        if let Some(location) = program.uniform_location(name) {
            return self.set_default_block_uniform(location, uniform_type, values);
        }

        if let Some(member) = program.uniform_block_member(name) {
            let buffer = program.block_buffer(member.block)
                                .ok_or_else(|| Error::UniformNotFound(name.clone()))?;
            let n_elements = values.len() / uniform_type.n_components();
            let offsets = block_member_offsets(&member, uniform_type, n_elements);
            let gl = self.gl();

            unsafe {
                gl.BindBuffer(gl::UNIFORM_BUFFER, buffer);

                for (index, &offset) in offsets.iter().enumerate() {
                    let bytes = values.component_bytes(index);
                    gl.BufferSubData(gl::UNIFORM_BUFFER, offset as isize,
                                     bytes.len() as GLsizeiptr, bytes.as_ptr() as *const _);
                }

                gl.BindBuffer(gl::UNIFORM_BUFFER, 0);
            }

            return Ok(());
        }

        Err(Error::UniformNotFound(name.clone()))
    }

    fn set_default_block_uniform(&self, location: GLint, uniform_type: &UniformType,
                                 values: &Values) -> Result<(), Error>
    {
        let gl = self.gl();
        let count = (values.len() / uniform_type.n_components()) as GLsizei;
        let shape = (uniform_type.columns, uniform_type.rows);

        if let Values::Double(_) = values {
            require_fn!(gl, Uniform1dv, "Double uniforms");
        }

        unsafe {
            match values {
                Values::Float(v) => {
                    let p = v.as_ptr();
                    match shape {
                        (1, 1) => gl.Uniform1fv(location, count, p),
                        (1, 2) => gl.Uniform2fv(location, count, p),
                        (1, 3) => gl.Uniform3fv(location, count, p),
                        (1, 4) => gl.Uniform4fv(location, count, p),
                        (2, 2) => gl.UniformMatrix2fv(location, count, gl::FALSE, p),
                        (2, 3) => gl.UniformMatrix2x3fv(location, count, gl::FALSE, p),
                        (2, 4) => gl.UniformMatrix2x4fv(location, count, gl::FALSE, p),
                        (3, 2) => gl.UniformMatrix3x2fv(location, count, gl::FALSE, p),
                        (3, 3) => gl.UniformMatrix3fv(location, count, gl::FALSE, p),
                        (3, 4) => gl.UniformMatrix3x4fv(location, count, gl::FALSE, p),
                        (4, 2) => gl.UniformMatrix4x2fv(location, count, gl::FALSE, p),
                        (4, 3) => gl.UniformMatrix4x3fv(location, count, gl::FALSE, p),
                        (4, 4) => gl.UniformMatrix4fv(location, count, gl::FALSE, p),
                        _ => unreachable!("bad uniform shape"),
                    }
                },
                Values::Double(v) => {
                    let p = v.as_ptr();
                    match shape {
                        (1, 1) => gl.Uniform1dv(location, count, p),
                        (1, 2) => gl.Uniform2dv(location, count, p),
                        (1, 3) => gl.Uniform3dv(location, count, p),
                        (1, 4) => gl.Uniform4dv(location, count, p),
                        (2, 2) => gl.UniformMatrix2dv(location, count, gl::FALSE, p),
                        (2, 3) => gl.UniformMatrix2x3dv(location, count, gl::FALSE, p),
                        (2, 4) => gl.UniformMatrix2x4dv(location, count, gl::FALSE, p),
                        (3, 2) => gl.UniformMatrix3x2dv(location, count, gl::FALSE, p),
                        (3, 3) => gl.UniformMatrix3dv(location, count, gl::FALSE, p),
                        (3, 4) => gl.UniformMatrix3x4dv(location, count, gl::FALSE, p),
                        (4, 2) => gl.UniformMatrix4x2dv(location, count, gl::FALSE, p),
                        (4, 3) => gl.UniformMatrix4x3dv(location, count, gl::FALSE, p),
                        (4, 4) => gl.UniformMatrix4dv(location, count, gl::FALSE, p),
                        _ => unreachable!("bad uniform shape"),
                    }
                },
                Values::Int(v) => {
                    let p = v.as_ptr();
                    match uniform_type.rows {
                        1 => gl.Uniform1iv(location, count, p),
                        2 => gl.Uniform2iv(location, count, p),
                        3 => gl.Uniform3iv(location, count, p),
                        _ => gl.Uniform4iv(location, count, p),
                    }
                },
                Values::UInt(v) => {
                    let p = v.as_ptr();
                    match uniform_type.rows {
                        1 => gl.Uniform1uiv(location, count, p),
                        2 => gl.Uniform2uiv(location, count, p),
                        3 => gl.Uniform3uiv(location, count, p),
                        _ => gl.Uniform4uiv(location, count, p),
                    }
                },
            }
        }

        Ok(())
    }

    fn activate_texture_unit(&self, unit: u32) -> Result<(), Error> {
        let max_units = self.context.capabilities().max_combined_texture_image_units;

        if unit as GLint >= max_units {
            return Err(Error::InvalidTextureUnit(unit));
        }

        unsafe { self.gl().ActiveTexture(gl::TEXTURE0 + unit) };

        Ok(())
    }

    // Creates a fresh 2D texture on the unit, replacing whatever was there
    fn new_texture(&mut self, unit: u32, width: u32, height: u32) -> Result<GLuint, Error> {
        self.activate_texture_unit(unit)?;

        let gl = self.gl();
        let mut id = 0;

        unsafe {
            gl.GenTextures(1, &mut id);
            gl.BindTexture(gl::TEXTURE_2D, id);
        }

        if let Some(old) = self.textures.insert(unit, BoundTexture { id, width, height }) {
            unsafe { gl.DeleteTextures(1, &old.id) };
        }

        Ok(id)
    }

    fn upload_rgba(&self, level: u32, width: u32, height: u32, texels: Option<&[f32]>) {
        let gl = self.gl();
        let internal_format = if self.is_es() { gl::RGBA } else { gl::RGBA8 };
        let data = texels.map(to_rgba8);

        unsafe {
            gl.PixelStorei(gl::UNPACK_ALIGNMENT, 1);
            gl.TexImage2D(gl::TEXTURE_2D, level as GLint, internal_format as GLint,
                          width as GLsizei, height as GLsizei, 0, gl::RGBA, gl::UNSIGNED_BYTE,
                          data.as_ref().map_or(ptr::null(), |d| d.as_ptr() as *const _));
        }
    }

    fn set_filters(&self, min: GLenum, mag: GLenum) {
        let gl = self.gl();

        unsafe {
            gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, min as GLint);
            gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, mag as GLint);
        }
    }

    fn texture(&mut self, op: &Operation) -> Result<(), Error> {
        let Operation::Texture { unit, image } = op else {
            unreachable!("bad op");
        };
        let unit = *unit;

        match *image {
            TextureImage::Rgbw { width, height } => {
                self.new_texture(unit, width, height)?;
                let texels = texture::rgbw(width, height);
                self.upload_rgba(0, width, height, Some(&texels[..]));
                self.set_filters(gl::NEAREST, gl::NEAREST);
            },
            TextureImage::Checkerboard { level, width, height, color1, color2 } => {
                self.new_texture(unit, width, height)?;
                let texels = texture::checkerboard(width, height, color1, color2);
                self.upload_rgba(level, width, height, Some(&texels[..]));
                self.set_filters(gl::NEAREST, gl::NEAREST);
            },
            TextureImage::Miptree => {
                self.new_texture(unit, texture::MIPTREE_SIZE, texture::MIPTREE_SIZE)?;
                let levels = texture::miptree();
                for (level, (size, texels)) in levels.iter().enumerate() {
                    self.upload_rgba(level as u32, *size, *size, Some(&texels[..]));
                }
                self.set_filters(gl::NEAREST_MIPMAP_NEAREST, gl::NEAREST);
                unsafe {
                    self.gl().TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAX_LEVEL,
                                            levels.len() as GLint - 1);
                }
            },
            TextureImage::Junk { width, height } => {
                self.new_texture(unit, width, height)?;
                self.upload_rgba(0, width, height, None);
                self.set_filters(gl::NEAREST, gl::NEAREST);
            },
            TextureImage::Shadow2D { width, height } => {
                self.new_texture(unit, width, height)?;
                let texels = texture::depth_ramp(width, height);
                let internal_format = if self.is_es() {
                    gl::DEPTH_COMPONENT32F
                } else {
                    gl::DEPTH_COMPONENT
                };
                let gl = self.gl();

                unsafe {
                    gl.PixelStorei(gl::UNPACK_ALIGNMENT, 1);
                    gl.TexImage2D(gl::TEXTURE_2D, 0, internal_format as GLint, width as GLsizei,
                                  height as GLsizei, 0, gl::DEPTH_COMPONENT, gl::FLOAT,
                                  texels.as_ptr() as *const _);
                    gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_COMPARE_MODE,
                                     gl::COMPARE_REF_TO_TEXTURE as GLint);
                    gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_COMPARE_FUNC,
                                     gl::LEQUAL as GLint);
                }
                self.set_filters(gl::NEAREST, gl::NEAREST);
            },
        }

        Ok(())
    }

    fn tex_parameter(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::TexParameter { target, pname, value } = op else {
            unreachable!("bad op");
        };

        let gl = self.gl();

        unsafe {
            match value {
                TexParameterValue::Int(value) => gl.TexParameteri(target, pname, value),
                TexParameterValue::Float(value) => gl.TexParameterf(target, pname, value),
            }
        }

        Ok(())
    }

    fn set_state(&mut self, op: &Operation) -> Result<(), Error> {
        let gl = self.gl();

        unsafe {
            match *op {
                Operation::Enable { cap, enabled: true } => gl.Enable(cap),
                Operation::Enable { cap, enabled: false } => gl.Disable(cap),
                Operation::BlendFunc { src, dst } => gl.BlendFunc(src, dst),
                Operation::BlendEquation { mode } => gl.BlendEquation(mode),
                Operation::DepthFunc { func } => gl.DepthFunc(func),
                Operation::PolygonMode { face, mode } => {
                    require_fn!(gl, PolygonMode, "glPolygonMode");
                    gl.PolygonMode(face, mode)
                },
                Operation::ProvokingVertex { mode } => {
                    require_fn!(gl, ProvokingVertex, "glProvokingVertex");
                    gl.ProvokingVertex(mode)
                },
                Operation::Hint { target, mode } => gl.Hint(target, mode),
                Operation::PatchVertices { count } => {
                    require_fn!(gl, PatchParameteri, "Tessellation");
                    gl.PatchParameteri(gl::PATCH_VERTICES, count as GLint)
                },
                Operation::PatchDefaultOuterLevel { ref levels } => {
                    require_fn!(gl, PatchParameterfv, "Default tessellation levels");
                    gl.PatchParameterfv(gl::PATCH_DEFAULT_OUTER_LEVEL, levels.as_ptr())
                },
                Operation::PatchDefaultInnerLevel { ref levels } => {
                    require_fn!(gl, PatchParameterfv, "Default tessellation levels");
                    gl.PatchParameterfv(gl::PATCH_DEFAULT_INNER_LEVEL, levels.as_ptr())
                },
                Operation::MemoryBarrier { barriers } => {
                    require_fn!(gl, MemoryBarrier, "glMemoryBarrier");
                    gl.MemoryBarrier(barriers)
                },
                _ => unreachable!("bad op"),
            }
        }

        Ok(())
    }

    fn ssbo_size(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::SsboSize { binding, size } = op else {
            unreachable!("bad op");
        };

        if !self.context.capabilities().shader_storage_buffers {
            return Err(Error::Unsupported("Shader storage buffers"));
        }

        let gl = self.gl();
        let zeroes = vec![0u8; size];
        let mut id = 0;

        unsafe {
            gl.GenBuffers(1, &mut id);
            gl.BindBuffer(gl::SHADER_STORAGE_BUFFER, id);
            gl.BufferData(gl::SHADER_STORAGE_BUFFER, size as GLsizeiptr,
                          zeroes.as_ptr() as *const _, gl::DYNAMIC_DRAW);
            gl.BindBufferBase(gl::SHADER_STORAGE_BUFFER, binding, id);
        }

        if let Some(old) = self.ssbos.insert(binding, Ssbo { id, size }) {
            unsafe { gl.DeleteBuffers(1, &old.id) };
        }

        Ok(())
    }

    fn get_ssbo(&self, binding: u32, offset: usize, length: usize) -> Result<Ssbo, Error> {
        let ssbo = *self.ssbos.get(&binding).ok_or(Error::NoSsbo(binding))?;

        if offset.checked_add(length).map_or(true, |end| end > ssbo.size) {
            return Err(Error::SsboOutOfRange { binding, offset, length, size: ssbo.size });
        }

        Ok(ssbo)
    }

    fn ssbo_sub_data(&mut self, op: &Operation) -> Result<(), Error> {
        let Operation::SsboSubData { binding, offset, data } = op else {
            unreachable!("bad op");
        };

        let ssbo = self.get_ssbo(*binding, *offset, data.len())?;
        let gl = self.gl();

        unsafe {
            gl.BindBuffer(gl::SHADER_STORAGE_BUFFER, ssbo.id);
            gl.BufferSubData(gl::SHADER_STORAGE_BUFFER, *offset as isize,
                             data.len() as GLsizeiptr, data.as_ptr() as *const _);
        }

        Ok(())
    }

    // Copies part of a buffer back to the client
    fn read_buffer(&self, target: GLenum, buffer: GLuint, offset: usize, length: usize)
                   -> Result<Vec<u8>, Error>
    {
        let gl = self.gl();
        let mut data = vec![0u8; length];

        unsafe {
            gl.BindBuffer(target, buffer);
            let map = gl.MapBufferRange(target, offset as isize, length as GLsizeiptr,
                                        gl::MAP_READ_BIT);
            if map.is_null() {
                self.context.check_error()?;
                return Err(Error::Unsupported("Mapping buffers"));
            }
            ptr::copy_nonoverlapping(map as *const u8, data.as_mut_ptr(), length);
            gl.UnmapBuffer(target);
        }

        Ok(data)
    }

    fn probe_ssbo(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::ProbeSsbo {
            binding,
            offset,
            base_type,
            comparison,
            ref values,
            ref tolerance,
        } = op else {
            unreachable!("bad op");
        };

        let length = values.len() * base_type.size();
        let ssbo = self.get_ssbo(binding, offset, length)?;

        unsafe { self.gl().MemoryBarrier(gl::BUFFER_UPDATE_BARRIER_BIT) };

        let bytes = self.read_buffer(gl::SHADER_STORAGE_BUFFER, ssbo.id, offset, length)?;
        let observed = Values::from_bytes(base_type, &bytes);

        if values.compare(&observed, comparison, tolerance) {
            Ok(())
        } else {
            Err(Error::SsboProbeFailed {
                binding,
                offset,
                comparison,
                expected: values.clone(),
                observed,
            })
        }
    }

    fn atomic_counters(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::AtomicCounters { count } = op else {
            unreachable!("bad op");
        };

        if !self.context.capabilities().atomic_counters {
            return Err(Error::Unsupported("Atomic counters"));
        }

        let gl = self.gl();
        let zeroes = vec![0u32; count as usize];
        let mut id = 0;

        unsafe {
            gl.GenBuffers(1, &mut id);
            gl.BindBuffer(gl::ATOMIC_COUNTER_BUFFER, id);
            gl.BufferData(gl::ATOMIC_COUNTER_BUFFER, mem::size_of_val(&zeroes[..]) as GLsizeiptr,
                          zeroes.as_ptr() as *const _, gl::DYNAMIC_DRAW);
            gl.BindBufferBase(gl::ATOMIC_COUNTER_BUFFER, 0, id);
        }

        if let Some((old, _)) = self.atomic_counters.replace((id, count)) {
            unsafe { gl.DeleteBuffers(1, &old) };
        }

        Ok(())
    }

    fn probe_atomic_counter(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::ProbeAtomicCounter { index, comparison, value } = op else {
            unreachable!("bad op");
        };

        let buffer = match self.atomic_counters {
            Some((buffer, count)) if index < count => buffer,
            Some((_, count)) => return Err(Error::AtomicCounterOutOfRange { index, count }),
            None => return Err(Error::AtomicCounterOutOfRange { index, count: 0 }),
        };

        unsafe { self.gl().MemoryBarrier(gl::BUFFER_UPDATE_BARRIER_BIT) };

        let size = mem::size_of::<u32>();
        let bytes = self.read_buffer(gl::ATOMIC_COUNTER_BUFFER, buffer,
                                     index as usize * size, size)?;
        let observed = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        if comparison.compare(observed, value) {
            Ok(())
        } else {
            Err(Error::AtomicCounterProbeFailed { index, comparison, expected: value, observed })
        }
    }

    fn fb_texture_2d(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::FbTexture2d { unit, level } = op else {
            unreachable!("bad op");
        };

        let texture = *self.textures.get(&unit).ok_or(Error::NoTexture(unit))?;
        let gl = self.gl();

        let id = match self.texture_framebuffer {
            Some(id) => id,
            None => {
                let mut id = 0;
                unsafe { gl.GenFramebuffers(1, &mut id) };
                self.texture_framebuffer = Some(id);
                id
            },
        };

        unsafe {
            gl.BindFramebuffer(gl::FRAMEBUFFER, id);
            gl.FramebufferTexture2D(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D,
                                    texture.id, level as GLint);
        }

        fbo::check_status(self.context)?;

        let width = (texture.width >> level).max(1);
        let height = (texture.height >> level).max(1);
        unsafe { gl.Viewport(0, 0, width as GLsizei, height as GLsizei) };
        self.render_size = (width, height);

        Ok(())
    }

    fn fb_winsys(&mut self, op: &Operation) -> Result<(), Error> {
        let &Operation::FbWinsys { draw, read } = op else {
            unreachable!("bad op");
        };

        match (draw, read) {
            (true, true) => self.framebuffer.bind(gl::FRAMEBUFFER),
            (true, false) => self.framebuffer.bind(gl::DRAW_FRAMEBUFFER),
            (false, true) => self.framebuffer.bind(gl::READ_FRAMEBUFFER),
            (false, false) => (),
        }

        if draw {
            self.framebuffer.reset_viewport();
        }
        if draw || read {
            self.render_size = self.framebuffer.dimensions();
        }

        Ok(())
    }

    fn check_link(&mut self, op: &Operation) -> Result<(), Error> {
        match (op, self.program) {
            (Operation::LinkError, ProgramState::Failed(_)) => Ok(()),
            (Operation::LinkError, _) => Err(Error::UnexpectedLinkSuccess),
            (Operation::LinkSuccess, ProgramState::Failed(e)) => Err(Error::Link(e.clone())),
            (Operation::LinkSuccess, ProgramState::Linked(_)) => Ok(()),
            (Operation::LinkSuccess, ProgramState::None) => Err(Error::NoProgram),
            _ => unreachable!("bad op"),
        }
    }

    fn run_operation(&mut self, op: &Operation) -> Result<(), Error> {
        match op {
            Operation::Clear { .. } => self.clear(op),
            Operation::DrawRect { .. } => self.draw_rect(op),
            Operation::DrawArrays { .. } => self.draw_arrays(op),
            Operation::Compute { .. } => self.dispatch_compute(op),
            Operation::ProbeRect { .. } => self.probe_rect(op),
            Operation::ProbeDepth { .. } => self.probe_depth(op),
            Operation::Uniform { .. } => self.set_uniform(op),
            Operation::Texture { .. } => self.texture(op),
            Operation::TexParameter { .. } => self.tex_parameter(op),
            Operation::Enable { .. } |
            Operation::BlendFunc { .. } |
            Operation::BlendEquation { .. } |
            Operation::DepthFunc { .. } |
            Operation::PolygonMode { .. } |
            Operation::ProvokingVertex { .. } |
            Operation::Hint { .. } |
            Operation::PatchVertices { .. } |
            Operation::PatchDefaultOuterLevel { .. } |
            Operation::PatchDefaultInnerLevel { .. } |
            Operation::MemoryBarrier { .. } => self.set_state(op),
            Operation::SsboSize { .. } => self.ssbo_size(op),
            Operation::SsboSubData { .. } => self.ssbo_sub_data(op),
            Operation::ProbeSsbo { .. } => self.probe_ssbo(op),
            Operation::AtomicCounters { .. } => self.atomic_counters(op),
            Operation::ProbeAtomicCounter { .. } => self.probe_atomic_counter(op),
            Operation::FbTexture2d { .. } => self.fb_texture_2d(op),
            Operation::FbWinsys { .. } => self.fb_winsys(op),
            Operation::LinkError | Operation::LinkSuccess => self.check_link(op),
        }
    }

    fn run_command(&mut self, command: &Command) -> Result<(), Error> {
        // leftovers from earlier commands aren't blamed on this one
        if let Err(e) = self.context.check_error() {
            warn!("line {}: ignoring a pending {}", command.line_num, e);
        }

        self.run_operation(&command.op)?;

        self.context.check_error()?;

        Ok(())
    }
}

impl<'a> Drop for Tester<'a> {
    fn drop(&mut self) {
        let gl = self.gl();

        let mut buffers: Vec<GLuint> = self.ssbos.values().map(|s| s.id).collect();
        buffers.extend(self.rect_buffer);
        buffers.extend(self.vbo_buffer);
        buffers.extend(self.atomic_counters.map(|(id, _)| id));

        let textures: Vec<GLuint> = self.textures.values().map(|t| t.id).collect();

        unsafe {
            if !buffers.is_empty() {
                gl.DeleteBuffers(buffers.len() as GLsizei, buffers.as_ptr());
            }
            if !textures.is_empty() {
                gl.DeleteTextures(textures.len() as GLsizei, textures.as_ptr());
            }
            if let Some(id) = self.texture_framebuffer {
                gl.DeleteFramebuffers(1, &id);
            }
            if let Some(id) = self.vertex_array {
                gl.BindVertexArray(0);
                gl.DeleteVertexArrays(1, &id);
            }

            gl.UseProgram(0);
            gl.ActiveTexture(gl::TEXTURE0);
        }

        self.framebuffer.bind(gl::FRAMEBUFFER);
        self.framebuffer.reset_viewport();
    }
}

fn is_link_check(op: &Operation) -> bool {
    matches!(op, Operation::LinkError | Operation::LinkSuccess)
}

/// Runs every command of the script.
///
/// All the commands run even after one of them fails. The errors are collected in
/// [`Error::CommandErrors`].
pub fn run(
    context: &Context,
    framebuffer: &Framebuffer,
    script: &Script,
    program: ProgramState,
) -> Result<(), Error> {
    let mut tester = Tester::new(context, framebuffer, script, program);
    let mut errors = Vec::new();

    for command in script.commands().iter() {
        if let ProgramState::Failed(_) = program {
            if !is_link_check(&command.op) {
                debug!("line {}: skipped, the program didn't link", command.line_num);
                continue;
            }
        }

        debug!("line {}: {:?}", command.line_num, command.op);

        if let Err(e) = tester.run_command(command) {
            errors.push(CommandError {
                line_num: command.line_num,
                error: e,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::CommandErrors(errors))
    }
}
