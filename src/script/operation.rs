use crate::gl::types::{GLbitfield, GLenum, GLint};
use crate::tolerance::Tolerance;
use crate::uniform::{BaseType, Comparison, UniformType, Values};

/// A shader stage. The discriminant is the index into the per-stage arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex = 0,
    TessCtrl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

pub const N_STAGES: usize = 6;

impl Stage {
    pub const ALL: [Stage; N_STAGES] = [
        Stage::Vertex,
        Stage::TessCtrl,
        Stage::TessEval,
        Stage::Geometry,
        Stage::Fragment,
        Stage::Compute,
    ];

    /// Name used in section headers, e.g. `tessellation control`.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::TessCtrl => "tessellation control",
            Stage::TessEval => "tessellation evaluation",
            Stage::Geometry => "geometry",
            Stage::Fragment => "fragment",
            Stage::Compute => "compute",
        }
    }
}

/// Source of one shader object.
#[derive(Debug, Clone, PartialEq)]
pub enum Shader {
    Glsl(String),
    /// `[vertex shader passthrough]`: generated when compiling, for the GLSL version of the
    /// context.
    Passthrough,
}

/// The pattern of a `texture` command.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureImage {
    Rgbw { width: u32, height: u32 },
    Checkerboard {
        level: u32,
        width: u32,
        height: u32,
        color1: [f32; 4],
        color2: [f32; 4],
    },
    Miptree,
    Junk { width: u32, height: u32 },
    Shadow2D { width: u32, height: u32 },
}

/// The pixels a probe reads. Relative and whole-target regions depend on the size of the render
/// target at the time the probe runs, which `fb` commands change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    /// x, y, w, h in pixels.
    Pixels([u32; 4]),
    /// One pixel at x, y given as fractions of the render target.
    RelativePoint([f32; 2]),
    /// x, y, w, h as fractions of the render target.
    RelativeRect([f32; 4]),
    All,
}

impl Region {
    /// Turns the region into pixels for a render target of the given size.
    pub fn resolve(&self, (width, height): (u32, u32)) -> [u32; 4] {
        let scale = |fraction: f32, size: u32| (fraction * size as f32) as u32;

        match *self {
            Region::Pixels(rect) => rect,
            Region::RelativePoint([x, y]) => [scale(x, width), scale(y, height), 1, 1],
            Region::RelativeRect([x, y, w, h]) => {
                [scale(x, width), scale(y, height), scale(w, width), scale(h, height)]
            },
            Region::All => [0, 0, width, height],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TexParameterValue {
    Int(GLint),
    Float(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Clear {
        color: [f32; 4],
        depth: f32,
        stencil: u32,
    },
    /// A rectangle in normalized device coordinates, or in pixels of the render target with
    /// `ortho`.
    DrawRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        ortho: bool,
        /// Texture coordinates for `piglit_texcoord`: x, y, w, h.
        tex: Option<[f32; 4]>,
        patch: bool,
        instances: Option<u32>,
    },
    DrawArrays {
        mode: GLenum,
        first: u32,
        count: u32,
        instances: Option<u32>,
    },
    Compute {
        x: u32,
        y: u32,
        z: u32,
    },
    ProbeRect {
        n_components: usize,
        region: Region,
        color: [f64; 4],
        tolerance: Tolerance,
    },
    ProbeDepth {
        x: u32,
        y: u32,
        depth: f64,
        tolerance: Tolerance,
    },
    Uniform {
        name: String,
        uniform_type: UniformType,
        values: Values,
    },
    Texture {
        unit: u32,
        image: TextureImage,
    },
    TexParameter {
        target: GLenum,
        pname: GLenum,
        value: TexParameterValue,
    },
    Enable {
        cap: GLenum,
        enabled: bool,
    },
    BlendFunc {
        src: GLenum,
        dst: GLenum,
    },
    BlendEquation {
        mode: GLenum,
    },
    DepthFunc {
        func: GLenum,
    },
    PolygonMode {
        face: GLenum,
        mode: GLenum,
    },
    ProvokingVertex {
        mode: GLenum,
    },
    Hint {
        target: GLenum,
        mode: GLenum,
    },
    PatchVertices {
        count: u32,
    },
    PatchDefaultOuterLevel {
        levels: [f32; 4],
    },
    PatchDefaultInnerLevel {
        levels: [f32; 2],
    },
    SsboSize {
        binding: u32,
        size: usize,
    },
    SsboSubData {
        binding: u32,
        offset: usize,
        data: Vec<u8>,
    },
    ProbeSsbo {
        binding: u32,
        offset: usize,
        base_type: BaseType,
        comparison: Comparison,
        values: Values,
        tolerance: Tolerance,
    },
    AtomicCounters {
        count: u32,
    },
    ProbeAtomicCounter {
        index: u32,
        comparison: Comparison,
        value: u32,
    },
    MemoryBarrier {
        barriers: GLbitfield,
    },
    /// Render into a level of the 2D texture bound to a unit.
    FbTexture2d {
        unit: u32,
        level: u32,
    },
    /// Go back to the framebuffer the runner created, for drawing, reading or both.
    FbWinsys {
        draw: bool,
        read: bool,
    },
    LinkError,
    LinkSuccess,
}

/// An operation with the line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub line_num: usize,
    pub op: Operation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_follow_the_render_target() {
        assert_eq!(Region::All.resolve((8, 4)), [0, 0, 8, 4]);
        assert_eq!(Region::All.resolve((250, 250)), [0, 0, 250, 250]);
        assert_eq!(Region::RelativePoint([0.5, 0.75]).resolve((8, 8)), [4, 6, 1, 1]);
        assert_eq!(Region::RelativeRect([0.5, 0.25, 0.5, 0.1]).resolve((250, 250)),
                   [125, 62, 125, 25]);
        assert_eq!(Region::Pixels([1, 2, 3, 4]).resolve((8, 8)), [1, 2, 3, 4]);
    }
}
