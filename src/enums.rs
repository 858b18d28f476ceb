//! Lookup of `GL_*` enum names used by the test commands.

use fnv::FnvHashMap;
use lazy_static::lazy_static;

use crate::gl;
use crate::gl::types::GLenum;
use crate::parse_num;

macro_rules! gl_enums {
    ($($name:ident),* $(,)?) => {
        static ENUMS: &[(&str, GLenum)] = &[
            $((concat!("GL_", stringify!($name)), gl::$name as GLenum)),*
        ];
    };
}

gl_enums![
    // errors
    NO_ERROR, INVALID_ENUM, INVALID_VALUE, INVALID_OPERATION, INVALID_FRAMEBUFFER_OPERATION,
    OUT_OF_MEMORY, STACK_OVERFLOW, STACK_UNDERFLOW,

    // capabilities
    BLEND, CULL_FACE, DEPTH_TEST, STENCIL_TEST, SCISSOR_TEST, DITHER, POLYGON_OFFSET_FILL,
    POLYGON_OFFSET_LINE, POLYGON_OFFSET_POINT, MULTISAMPLE, SAMPLE_ALPHA_TO_COVERAGE,
    SAMPLE_ALPHA_TO_ONE, SAMPLE_COVERAGE, SAMPLE_SHADING, PROGRAM_POINT_SIZE,
    VERTEX_PROGRAM_POINT_SIZE, POINT_SPRITE, CLIP_DISTANCE0, CLIP_DISTANCE1, CLIP_DISTANCE2,
    CLIP_DISTANCE3, CLIP_DISTANCE4, CLIP_DISTANCE5, CLIP_DISTANCE6, CLIP_DISTANCE7, DEPTH_CLAMP,
    PRIMITIVE_RESTART, PRIMITIVE_RESTART_FIXED_INDEX, RASTERIZER_DISCARD, FRAMEBUFFER_SRGB,
    TEXTURE_CUBE_MAP_SEAMLESS, LINE_SMOOTH, POLYGON_SMOOTH, COLOR_LOGIC_OP,

    // blending
    ZERO, ONE, SRC_COLOR, ONE_MINUS_SRC_COLOR, DST_COLOR, ONE_MINUS_DST_COLOR, SRC_ALPHA,
    ONE_MINUS_SRC_ALPHA, DST_ALPHA, ONE_MINUS_DST_ALPHA, CONSTANT_COLOR, ONE_MINUS_CONSTANT_COLOR,
    CONSTANT_ALPHA, ONE_MINUS_CONSTANT_ALPHA, SRC_ALPHA_SATURATE, SRC1_COLOR, SRC1_ALPHA,
    ONE_MINUS_SRC1_COLOR, ONE_MINUS_SRC1_ALPHA, FUNC_ADD, FUNC_SUBTRACT, FUNC_REVERSE_SUBTRACT,
    MIN, MAX,

    // comparison functions
    NEVER, LESS, EQUAL, LEQUAL, GREATER, NOTEQUAL, GEQUAL, ALWAYS,

    // rasterization
    FRONT, BACK, FRONT_AND_BACK, POINT, LINE, FILL, FIRST_VERTEX_CONVENTION,
    LAST_VERTEX_CONVENTION,

    // hints
    FRAGMENT_SHADER_DERIVATIVE_HINT, LINE_SMOOTH_HINT, POLYGON_SMOOTH_HINT,
    TEXTURE_COMPRESSION_HINT, GENERATE_MIPMAP_HINT, FASTEST, NICEST, DONT_CARE,

    // primitives
    POINTS, LINES, LINE_LOOP, LINE_STRIP, TRIANGLES, TRIANGLE_STRIP, TRIANGLE_FAN,
    LINES_ADJACENCY, LINE_STRIP_ADJACENCY, TRIANGLES_ADJACENCY, TRIANGLE_STRIP_ADJACENCY,
    PATCHES, QUADS, QUAD_STRIP, POLYGON,

    // barriers
    VERTEX_ATTRIB_ARRAY_BARRIER_BIT, ELEMENT_ARRAY_BARRIER_BIT, UNIFORM_BARRIER_BIT,
    TEXTURE_FETCH_BARRIER_BIT, SHADER_IMAGE_ACCESS_BARRIER_BIT, COMMAND_BARRIER_BIT,
    PIXEL_BUFFER_BARRIER_BIT, TEXTURE_UPDATE_BARRIER_BIT, BUFFER_UPDATE_BARRIER_BIT,
    FRAMEBUFFER_BARRIER_BIT, TRANSFORM_FEEDBACK_BARRIER_BIT, ATOMIC_COUNTER_BARRIER_BIT,
    SHADER_STORAGE_BARRIER_BIT, ALL_BARRIER_BITS,

    // texture parameters
    NEAREST, LINEAR, NEAREST_MIPMAP_NEAREST, LINEAR_MIPMAP_NEAREST, NEAREST_MIPMAP_LINEAR,
    LINEAR_MIPMAP_LINEAR, REPEAT, CLAMP_TO_EDGE, CLAMP_TO_BORDER, MIRRORED_REPEAT,
    COMPARE_REF_TO_TEXTURE, NONE,

    // framebuffer status
    FRAMEBUFFER_COMPLETE, FRAMEBUFFER_UNDEFINED, FRAMEBUFFER_INCOMPLETE_ATTACHMENT,
    FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT, FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER,
    FRAMEBUFFER_INCOMPLETE_READ_BUFFER, FRAMEBUFFER_UNSUPPORTED,
    FRAMEBUFFER_INCOMPLETE_MULTISAMPLE, FRAMEBUFFER_INCOMPLETE_LAYER_TARGETS,

    // implementation limits
    MAX_TEXTURE_SIZE, MAX_3D_TEXTURE_SIZE, MAX_ARRAY_TEXTURE_LAYERS, MAX_CUBE_MAP_TEXTURE_SIZE,
    MAX_RENDERBUFFER_SIZE, MAX_TEXTURE_IMAGE_UNITS, MAX_COMBINED_TEXTURE_IMAGE_UNITS,
    MAX_VERTEX_TEXTURE_IMAGE_UNITS, MAX_GEOMETRY_TEXTURE_IMAGE_UNITS, MAX_VERTEX_ATTRIBS,
    MAX_VARYING_COMPONENTS, MAX_VARYING_FLOATS, MAX_VARYING_VECTORS,
    MAX_VERTEX_UNIFORM_COMPONENTS, MAX_FRAGMENT_UNIFORM_COMPONENTS, MAX_VERTEX_UNIFORM_VECTORS,
    MAX_FRAGMENT_UNIFORM_VECTORS, MAX_VERTEX_OUTPUT_COMPONENTS, MAX_FRAGMENT_INPUT_COMPONENTS,
    MAX_GEOMETRY_OUTPUT_VERTICES, MAX_GEOMETRY_UNIFORM_COMPONENTS, MAX_GEOMETRY_INPUT_COMPONENTS,
    MAX_GEOMETRY_OUTPUT_COMPONENTS, MAX_GEOMETRY_TOTAL_OUTPUT_COMPONENTS, MAX_CLIP_DISTANCES,
    MAX_DRAW_BUFFERS, MAX_DUAL_SOURCE_DRAW_BUFFERS, MAX_COLOR_ATTACHMENTS, MAX_SAMPLES,
    MAX_VIEWPORTS, MAX_UNIFORM_BLOCK_SIZE, MAX_UNIFORM_BUFFER_BINDINGS,
    MAX_VERTEX_UNIFORM_BLOCKS, MAX_GEOMETRY_UNIFORM_BLOCKS, MAX_FRAGMENT_UNIFORM_BLOCKS,
    MAX_COMBINED_UNIFORM_BLOCKS, MAX_SHADER_STORAGE_BUFFER_BINDINGS,
    MAX_SHADER_STORAGE_BLOCK_SIZE, MAX_VERTEX_SHADER_STORAGE_BLOCKS,
    MAX_FRAGMENT_SHADER_STORAGE_BLOCKS, MAX_COMPUTE_SHADER_STORAGE_BLOCKS,
    MAX_COMBINED_SHADER_STORAGE_BLOCKS, MAX_COMPUTE_WORK_GROUP_INVOCATIONS,
    MAX_COMPUTE_SHARED_MEMORY_SIZE, MAX_COMPUTE_UNIFORM_COMPONENTS,
    MAX_ATOMIC_COUNTER_BUFFER_BINDINGS, MAX_COMBINED_ATOMIC_COUNTERS,
    MAX_VERTEX_ATOMIC_COUNTERS, MAX_FRAGMENT_ATOMIC_COUNTERS, MAX_COMPUTE_ATOMIC_COUNTERS,
    MAX_TESS_GEN_LEVEL, MAX_PATCH_VERTICES, MAX_TESS_CONTROL_UNIFORM_COMPONENTS,
    MAX_TESS_EVALUATION_UNIFORM_COMPONENTS, MAX_SUBROUTINES,
    MAX_SUBROUTINE_UNIFORM_LOCATIONS, MAX_PROGRAM_TEXEL_OFFSET, MIN_PROGRAM_TEXEL_OFFSET,
    MAX_IMAGE_UNITS, MAX_FRAGMENT_IMAGE_UNIFORMS, MAX_COMBINED_IMAGE_UNIFORMS,
];

lazy_static! {
    static ref BY_NAME: FnvHashMap<&'static str, GLenum> = ENUMS.iter().cloned().collect();
}

/// Looks up an enum by its `GL_` name. A raw number such as `0x0BE2` is also accepted.
pub fn lookup(name: &str) -> Option<GLenum> {
    if let Some(&value) = BY_NAME.get(name) {
        return Some(value);
    }

    match parse_num::parse_u32(name) {
        Ok((value, "")) => Some(value),
        _ => None,
    }
}

/// Returns the first known name of `value`, falling back to its hex representation.
///
/// Several enums share a value (`GL_ZERO`, `GL_NONE` and `GL_NO_ERROR` are all zero) so this
/// is only meant for messages.
pub fn name_of(value: GLenum) -> String {
    ENUMS.iter()
         .find(|&&(_, v)| v == value)
         .map(|&(name, _)| name.to_owned())
         .unwrap_or_else(|| format!("0x{:04x}", value))
}

/// Name of a value returned by `glGetError`.
pub fn error_name(value: GLenum) -> &'static str {
    match value {
        gl::NO_ERROR => "GL_NO_ERROR",
        gl::INVALID_ENUM => "GL_INVALID_ENUM",
        gl::INVALID_VALUE => "GL_INVALID_VALUE",
        gl::INVALID_OPERATION => "GL_INVALID_OPERATION",
        gl::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        gl::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        gl::STACK_OVERFLOW => "GL_STACK_OVERFLOW",
        gl::STACK_UNDERFLOW => "GL_STACK_UNDERFLOW",
        _ => "(unknown error)",
    }
}
