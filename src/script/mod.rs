//! Loading of `.shader_test` scripts.
//!
//! A script is read line by line. Section headers such as `[fragment shader]` switch the loader
//! to another state, and each state decides what to do with the lines of its section. The
//! `[test]` section is turned into a list of [`Command`]s that the [`tester`](crate::tester)
//! executes later.

use std::fmt;
use std::fs;

use crate::enums;
use crate::gl;
use crate::gl::types::{GLbitfield, GLenum};
use crate::parse_num;
use crate::requirements::Requirements;
use crate::source::Source;
use crate::stream::{Stream, StreamError};
use crate::tolerance::Tolerance;
use crate::uniform::{Comparison, UniformType};
use crate::vbo;

pub use self::operation::{
    Command, Operation, Region, Shader, Stage, TexParameterValue, TextureImage,
};
pub use self::operation::N_STAGES;

mod operation;

/// Framebuffer size used when `[require]` has no `SIZE` line.
pub const DEFAULT_WINDOW_SIZE: (u32, u32) = (250, 250);

/// A fully loaded script.
#[derive(Debug)]
pub struct Script {
    filename: String,
    stages: [Box<[Shader]>; N_STAGES],
    commands: Box<[Command]>,
    requirements: Requirements,
    window_size: (u32, u32),
    vertex_data: Option<vbo::Vbo>,
}

#[derive(Debug)]
pub enum LoadError {
    Stream(StreamError),
    Vbo { line_num: usize, detail: vbo::Error },
    Invalid { line_num: usize, message: String },
    Number { line_num: usize, detail: parse_num::ParseError },
}

impl From<StreamError> for LoadError {
    fn from(error: StreamError) -> LoadError {
        LoadError::Stream(error)
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadError::Stream(e) => e.fmt(f),
            LoadError::Vbo { line_num, detail } => write!(f, "line {}: {}", line_num, detail),
            LoadError::Invalid { line_num, message } => write!(f, "line {}: {}", line_num, message),
            LoadError::Number { line_num, detail } => write!(f, "line {}: {}", line_num, detail),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Stream(e) => Some(e),
            LoadError::Vbo { detail, .. } => Some(detail),
            LoadError::Invalid { .. } => None,
            LoadError::Number { detail, .. } => Some(detail),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    None = 0,
    Comment,
    Require,
    Shader,
    ShaderFile,
    VertexData,
    Test,
}

#[derive(PartialEq, Eq, Debug)]
enum MatchResult {
    // The line was parsed by this method
    Matched,
    // Not this kind of line, try the next method
    NotMatched,
}

// Returns from the calling function if the line was matched or an error was raised
macro_rules! handle_match_result {
    ($func:expr) => {
        match $func? {
            MatchResult::NotMatched => (),
            MatchResult::Matched => return Ok(()),
        }
    };
}

macro_rules! parse_num_func {
    ($func:ident, $type:ty) => {
        fn $func<'b>(&self, s: &'b str) -> Result<($type, &'b str), LoadError> {
            parse_num::$func(s).map_err(|detail| LoadError::Number {
                line_num: self.stream.line_num(),
                detail,
            })
        }
    };
}

macro_rules! error_at_line {
    ($loader:expr, $($format_arg:expr),+) => {
        LoadError::Invalid {
            line_num: $loader.stream.line_num(),
            message: format!($($format_arg),+),
        }
    };
}

type ParseResult = Result<MatchResult, LoadError>;

static TEXTURE_TARGETS: [(&str, GLenum); 8] = [
    ("1D", gl::TEXTURE_1D),
    ("2D", gl::TEXTURE_2D),
    ("3D", gl::TEXTURE_3D),
    ("Rect", gl::TEXTURE_RECTANGLE),
    ("Cube", gl::TEXTURE_CUBE_MAP),
    ("1DArray", gl::TEXTURE_1D_ARRAY),
    ("2DArray", gl::TEXTURE_2D_ARRAY),
    ("CubeArray", gl::TEXTURE_CUBE_MAP_ARRAY),
];

static FILTER_MODES: [(&str, GLenum); 6] = [
    ("nearest", gl::NEAREST),
    ("linear", gl::LINEAR),
    ("nearest_mipmap_nearest", gl::NEAREST_MIPMAP_NEAREST),
    ("linear_mipmap_nearest", gl::LINEAR_MIPMAP_NEAREST),
    ("nearest_mipmap_linear", gl::NEAREST_MIPMAP_LINEAR),
    ("linear_mipmap_linear", gl::LINEAR_MIPMAP_LINEAR),
];

static WRAP_MODES: [(&str, GLenum); 4] = [
    ("repeat", gl::REPEAT),
    ("clamp_to_edge", gl::CLAMP_TO_EDGE),
    ("clamp_to_border", gl::CLAMP_TO_BORDER),
    ("mirrored_repeat", gl::MIRRORED_REPEAT),
];

static COMPARE_FUNCS: [(&str, GLenum); 8] = [
    ("greater", gl::GREATER),
    ("gequal", gl::GEQUAL),
    ("less", gl::LESS),
    ("lequal", gl::LEQUAL),
    ("equal", gl::EQUAL),
    ("notequal", gl::NOTEQUAL),
    ("never", gl::NEVER),
    ("always", gl::ALWAYS),
];

static COMPARE_MODES: [(&str, GLenum); 2] = [
    ("none", gl::NONE),
    ("compare_r_to_texture", gl::COMPARE_REF_TO_TEXTURE),
];

fn lookup_name(table: &[(&str, GLenum)], name: &str) -> Option<GLenum> {
    table.iter().find(|&&(n, _)| n == name).map(|&(_, value)| value)
}

fn table_names(table: &[(&str, GLenum)]) -> String {
    table.iter().map(|&(name, _)| name).collect::<Vec<_>>().join(", ")
}

// Like `str::strip_prefix` but also skips leading whitespace and only matches a whole word. The
// tail keeps its leading whitespace.
fn strip_word_prefix<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let tail = s.trim_start().strip_prefix(prefix)?;

    match tail.chars().next() {
        None => Some(tail),
        Some(ch) if ch.is_whitespace() => Some(tail),
        Some(_) => None,
    }
}

// `strip_word_prefix` for each word of `prefix`, so any amount of whitespace may separate them
fn strip_words_prefix<'a>(mut s: &'a str, prefix: &str) -> Option<&'a str> {
    for word in prefix.split_whitespace() {
        s = strip_word_prefix(s, word)?;
    }

    Some(s)
}

fn next_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let word = s.split_whitespace().next()?;

    Some((word, &s[word.len()..]))
}

// Removes the comment and surrounding whitespace. Returns None for lines with nothing left.
fn trim_line_or_skip(line: &str) -> Option<&str> {
    let line = line.split_once('#').map_or(line, |(line, _comment)| line).trim();

    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

struct Loader<'a> {
    source: &'a Source,
    stream: Stream<'a>,
    default_window_size: (u32, u32),
    current_section: Section,
    had_sections: u32,
    current_source: Option<Shader>,
    current_stage: Stage,
    current_file_given: bool,
    stages: [Vec<Shader>; N_STAGES],
    tolerance: Tolerance,
    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: u32,
    commands: Vec<Command>,
    vertex_data: Option<vbo::Vbo>,
    vbo_parser: Option<vbo::Parser>,
    requirements: Requirements,
}

impl<'a> Loader<'a> {
    fn new(source: &'a Source, default_window_size: (u32, u32)) -> Result<Loader<'a>, LoadError> {
        Ok(Loader {
            source,
            stream: Stream::new(source)?,
            default_window_size,
            current_section: Section::None,
            had_sections: 0,
            current_source: None,
            current_stage: Stage::Vertex,
            current_file_given: false,
            stages: Default::default(),
            tolerance: Default::default(),
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            clear_stencil: 0,
            commands: Vec::new(),
            vertex_data: None,
            vbo_parser: None,
            requirements: Requirements::new(),
        })
    }

    parse_num_func!(parse_u32, u32);
    parse_num_func!(parse_i32, i32);
    parse_num_func!(parse_f32, f32);
    parse_num_func!(parse_f64, f64);

    fn window_size(&self) -> (u32, u32) {
        self.requirements.size().unwrap_or(self.default_window_size)
    }

    fn push_command(&mut self, op: Operation) {
        self.commands.push(Command {
            line_num: self.stream.line_num(),
            op,
        });
    }

    fn end_shader(&mut self) -> Result<(), LoadError> {
        if self.current_section == Section::ShaderFile && !self.current_file_given {
            return Err(error_at_line!(self, "Missing shader file name"));
        }

        if let Some(shader) = self.current_source.take() {
            self.stages[self.current_stage as usize].push(shader);
        }

        Ok(())
    }

    fn end_vertex_data(&mut self) -> Result<(), LoadError> {
        let parser = match self.vbo_parser.take() {
            Some(parser) => parser,
            None => return Ok(()),
        };

        match parser.into_vbo() {
            Ok(vbo) => {
                self.vertex_data = Some(vbo);
                Ok(())
            },
            Err(detail) => Err(LoadError::Vbo {
                line_num: self.stream.line_num(),
                detail,
            }),
        }
    }

    fn end_section(&mut self) -> Result<(), LoadError> {
        match self.current_section {
            Section::None | Section::Comment | Section::Require | Section::Test => (),
            Section::Shader | Section::ShaderFile => self.end_shader()?,
            Section::VertexData => self.end_vertex_data()?,
        }

        self.current_section = Section::None;

        Ok(())
    }

    fn set_current_section(&mut self, section: Section) {
        self.had_sections |= 1 << (section as u32);
        self.current_section = section;
    }

    fn is_stage_name<'b>(line: &'b str, suffix: &str) -> Option<(Stage, &'b str)> {
        for &stage in Stage::ALL.iter() {
            if let Some(tail) = strip_words_prefix(line, stage.name()) {
                if let Some(tail) = strip_word_prefix(tail, suffix) {
                    return Some((stage, tail));
                }
            }
        }

        None
    }

    fn process_stage_header(&mut self, section_name: &str) -> ParseResult {
        let (stage, tail) = match Loader::is_stage_name(section_name, "shader") {
            Some(v) => v,
            None => return Ok(MatchResult::NotMatched),
        };

        let (section, tail) = match strip_word_prefix(tail, "file") {
            Some(tail) => (Section::ShaderFile, tail),
            None => (Section::Shader, tail),
        };

        if !tail.trim_end().is_empty() {
            return Ok(MatchResult::NotMatched);
        }

        self.current_source = Some(Shader::Glsl(String::new()));
        self.current_stage = stage;
        self.current_file_given = false;
        self.set_current_section(section);

        Ok(MatchResult::Matched)
    }

    fn process_section_name(&mut self, section_name: &str) -> Result<(), LoadError> {
        if self.process_stage_header(section_name)? == MatchResult::Matched {
            return Ok(());
        }

        match section_name.trim() {
            "vertex shader passthrough" => {
                // the section has no body
                self.set_current_section(Section::None);
                self.stages[Stage::Vertex as usize].push(Shader::Passthrough);
            },
            "comment" => self.set_current_section(Section::Comment),
            "require" => {
                // the test commands need the window size from this section
                if self.had_sections & !(1 << (Section::Comment as u32)) != 0 {
                    return Err(error_at_line!(self, "[require] must be the first section"));
                }
                self.set_current_section(Section::Require);
            },
            "test" => self.set_current_section(Section::Test),
            "vertex data" => {
                if self.vertex_data.is_some() {
                    return Err(error_at_line!(self, "Duplicate vertex data section"));
                }
                self.set_current_section(Section::VertexData);
                self.vbo_parser = Some(vbo::Parser::new());
            },
            name => return Err(error_at_line!(self, "Unknown section “{}”", name)),
        }

        Ok(())
    }

    fn process_section_header(&mut self, line: &str) -> ParseResult {
        if !line.starts_with('[') {
            return Ok(MatchResult::NotMatched);
        }

        self.end_section()?;

        let section_name = match line.find(']') {
            None => return Err(error_at_line!(self, "Missing ‘]’")),
            Some(pos) => match line.trim_end().split_at(pos) {
                (before, "]") => &before[1..],
                _ => return Err(error_at_line!(self, "Trailing data after ‘]’")),
            },
        };

        self.process_section_name(section_name)?;

        Ok(MatchResult::Matched)
    }

    fn process_none_line(&self, line: &str) -> Result<(), LoadError> {
        match trim_line_or_skip(line) {
            Some(_) => Err(error_at_line!(self, "expected empty line")),
            None => Ok(()),
        }
    }

    fn process_require_line(&mut self, line: &str) -> Result<(), LoadError> {
        let line = match trim_line_or_skip(line) {
            Some(l) => l,
            None => return Ok(()),
        };

        let line_num = self.stream.line_num();

        self.requirements.parse_line(line).map_err(|e| LoadError::Invalid {
            line_num,
            message: e.to_string(),
        })
    }

    fn process_shader_line(&mut self, line: &str) {
        if let Some(Shader::Glsl(source)) = self.current_source.as_mut() {
            source.push_str(line);
        }
    }

    fn process_shader_file_line(&mut self, line: &str) -> Result<(), LoadError> {
        let filename = match trim_line_or_skip(line) {
            Some(l) => l,
            None => return Ok(()),
        };

        if self.current_file_given {
            return Err(error_at_line!(self, "Only one file name is allowed per shader section"));
        }

        let path = self.source.directory().join(filename);

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                return Err(error_at_line!(self, "{}: {}", path.display(), e));
            },
        };

        self.current_source = Some(Shader::Glsl(text));
        self.current_file_given = true;

        Ok(())
    }

    fn process_vertex_data_line(&mut self, line: &str) -> Result<(), LoadError> {
        let line_num = self.stream.line_num();

        match self.vbo_parser.as_mut() {
            Some(parser) => parser.parse_line(line).map_err(|detail| LoadError::Vbo {
                line_num,
                detail,
            }),
            None => Ok(()),
        }
    }

    fn parse_enum(&self, name: &str) -> Result<GLenum, LoadError> {
        enums::lookup(name).ok_or_else(|| error_at_line!(self, "Unknown enum “{}”", name))
    }

    fn expect_end(&self, tail: &str, command: &str) -> Result<(), LoadError> {
        if tail.trim().is_empty() {
            Ok(())
        } else {
            Err(error_at_line!(self, "Extra data after {} command", command))
        }
    }

    // Parses `n_parts` values either as `(a, b, ...)` or separated by whitespace
    fn parse_list<'b, T, F>(&self, line: &'b str, n_parts: usize, mut parse: F)
                            -> Result<([T; 4], &'b str), LoadError>
        where T: Copy + Default,
              F: FnMut(&'b str) -> Result<(T, &'b str), LoadError>
    {
        let (parens, mut line) = match line.trim_start().strip_prefix('(') {
            Some(tail) => (true, tail),
            None => (false, line),
        };

        let mut result = [T::default(); 4];

        for i in 0..n_parts {
            let (value, tail) = parse(line)?;
            result[i] = value;
            line = tail;

            if parens && i < n_parts - 1 {
                line = match line.trim_start().strip_prefix(',') {
                    None => return Err(error_at_line!(self, "Expected ‘,’")),
                    Some(tail) => tail,
                };
            }
        }

        if !parens {
            return Ok((result, line));
        }

        match line.trim_start().strip_prefix(')') {
            None => Err(error_at_line!(self, "Expected ‘)’")),
            Some(tail) => Ok((result, tail)),
        }
    }

    fn parse_coords<'b>(&self, line: &'b str, n_parts: usize)
                        -> Result<([u32; 4], &'b str), LoadError>
    {
        self.parse_list(line, n_parts, |s| self.parse_u32(s))
    }

    fn parse_fractions<'b>(&self, line: &'b str, n_parts: usize)
                           -> Result<([f32; 4], &'b str), LoadError>
    {
        self.parse_list(line, n_parts, |s| self.parse_f32(s))
    }

    fn parse_color<'b>(&self, line: &'b str, n_parts: usize)
                       -> Result<([f64; 4], &'b str), LoadError>
    {
        self.parse_list(line, n_parts, |s| self.parse_f64(s))
    }

    fn parse_size<'b>(&self, line: &'b str) -> Result<((u32, u32), &'b str), LoadError> {
        let (parts, tail) = self.parse_list(line, 2, |s| self.parse_u32(s))?;

        if parts[0] == 0 || parts[1] == 0 {
            return Err(error_at_line!(self, "Texture size must not be zero"));
        }

        Ok(((parts[0], parts[1]), tail))
    }

    fn process_probe(&mut self, line: &str) -> ParseResult {
        let (relative, line) = match strip_word_prefix(line, "relative") {
            None => (false, line),
            Some(tail) => (true, tail),
        };

        let line = match strip_word_prefix(line, "probe") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        enum RegionType {
            Point,
            Rect,
            All,
        }

        let (region_type, line) = if let Some(tail) = strip_word_prefix(line, "rect") {
            (RegionType::Rect, tail)
        } else if let Some(tail) = strip_word_prefix(line, "all") {
            (RegionType::All, tail)
        } else {
            (RegionType::Point, line)
        };

        let (n_components, line) = if let Some(tail) = strip_word_prefix(line, "rgb") {
            (3, tail)
        } else if let Some(tail) = strip_word_prefix(line, "rgba") {
            (4, tail)
        } else {
            return Err(error_at_line!(self, "Expected rgb or rgba in probe command"));
        };

        let (region, line) = match region_type {
            RegionType::All => {
                if relative {
                    return Err(error_at_line!(self, "‘all’ can’t be used with a relative probe"));
                }
                (Region::All, line)
            },
            RegionType::Point if relative => {
                let ([x, y, ..], tail) = self.parse_fractions(line, 2)?;
                (Region::RelativePoint([x, y]), tail)
            },
            RegionType::Point => {
                let ([x, y, ..], tail) = self.parse_coords(line, 2)?;
                (Region::Pixels([x, y, 1, 1]), tail)
            },
            RegionType::Rect if relative => {
                let (rect, tail) = self.parse_fractions(line, 4)?;
                (Region::RelativeRect(rect), tail)
            },
            RegionType::Rect => {
                let (rect, tail) = self.parse_coords(line, 4)?;
                (Region::Pixels(rect), tail)
            },
        };

        let (color, line) = self.parse_color(line, n_components)?;

        self.expect_end(line, "probe")?;

        self.push_command(Operation::ProbeRect {
            n_components,
            region,
            color,
            tolerance: self.tolerance.clone(),
        });

        Ok(MatchResult::Matched)
    }

    fn process_probe_depth(&mut self, line: &str) -> ParseResult {
        let line = match strip_words_prefix(line, "probe depth") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let (coords, line) = self.parse_coords(line, 2)?;
        let (depth, line) = self.parse_f64(line)?;
        self.expect_end(line, "probe")?;

        self.push_command(Operation::ProbeDepth {
            x: coords[0],
            y: coords[1],
            depth,
            tolerance: self.tolerance.clone(),
        });

        Ok(MatchResult::Matched)
    }

    fn parse_uniform_type<'b>(&self, line: &'b str) -> Result<(UniformType, &'b str), LoadError> {
        let (name, tail) = match next_word(line) {
            Some(v) => v,
            None => return Err(error_at_line!(self, "Expected GLSL type name")),
        };

        match UniformType::from_glsl_name(name) {
            Some(uniform_type) => Ok((uniform_type, tail)),
            None => Err(error_at_line!(self, "Invalid GLSL type name: {}", name)),
        }
    }

    fn parse_comparison<'b>(&self, line: &'b str) -> Result<(Comparison, &'b str), LoadError> {
        let (operator, tail) = match next_word(line) {
            Some(v) => v,
            None => return Err(error_at_line!(self, "Expected comparison operator")),
        };

        match Comparison::from_operator(operator) {
            Some(comparison) => Ok((comparison, tail)),
            None => Err(error_at_line!(self, "Unknown comparison operator: {}", operator)),
        }
    }

    fn process_uniform(&mut self, line: &str) -> ParseResult {
        let line = match strip_word_prefix(line, "uniform") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let (uniform_type, line) = self.parse_uniform_type(line)?;

        let (name, line) = match next_word(line) {
            Some(v) => v,
            None => return Err(error_at_line!(self, "Missing uniform name")),
        };

        let values = match uniform_type.parse_values(line) {
            Ok(values) => values,
            Err(e) => return Err(error_at_line!(self, "{}", e)),
        };

        self.push_command(Operation::Uniform {
            name: name.to_owned(),
            uniform_type,
            values,
        });

        Ok(MatchResult::Matched)
    }

    fn process_draw_rect(&mut self, line: &str) -> ParseResult {
        let (instanced, mut line) = if let Some(tail) = strip_words_prefix(line, "draw rect") {
            (false, tail)
        } else if let Some(tail) = strip_words_prefix(line, "draw instanced rect") {
            (true, tail)
        } else {
            return Ok(MatchResult::NotMatched);
        };

        let mut ortho = false;
        let mut patch = false;
        let mut tex = false;

        loop {
            if let Some(tail) = strip_word_prefix(line, "ortho") {
                ortho = true;
                line = tail;
            } else if let Some(tail) = strip_word_prefix(line, "patch") {
                patch = true;
                line = tail;
            } else if let Some(tail) = strip_word_prefix(line, "tex") {
                tex = true;
                line = tail;
            } else {
                break;
            }
        }

        let (instances, line) = if instanced {
            let (instances, tail) = self.parse_u32(line)?;
            (Some(instances), tail)
        } else {
            (None, line)
        };

        let (x, line) = self.parse_f32(line)?;
        let (y, line) = self.parse_f32(line)?;
        let (w, line) = self.parse_f32(line)?;
        let (h, line) = self.parse_f32(line)?;

        let (tex, line) = if tex {
            let (tx, line) = self.parse_f32(line)?;
            let (ty, line) = self.parse_f32(line)?;
            let (tw, line) = self.parse_f32(line)?;
            let (th, line) = self.parse_f32(line)?;
            (Some([tx, ty, tw, th]), line)
        } else {
            (None, line)
        };

        if !line.trim_end().is_empty() {
            return Err(error_at_line!(self, "Extra data at end of line"));
        }

        self.push_command(Operation::DrawRect { x, y, w, h, ortho, tex, patch, instances });

        Ok(MatchResult::Matched)
    }

    fn process_draw_arrays(&mut self, line: &str) -> ParseResult {
        let line = match strip_words_prefix(line, "draw arrays") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let (instanced, line) = match strip_word_prefix(line, "instanced") {
            Some(tail) => (true, tail),
            None => (false, line),
        };

        let (mode, line) = match next_word(line) {
            Some((word, tail)) => (self.parse_enum(word)?, tail),
            None => return Err(error_at_line!(self, "Expected primitive mode")),
        };

        let (first, line) = self.parse_u32(line)?;
        let (count, line) = self.parse_u32(line)?;

        let (instances, line) = if instanced {
            let (instances, tail) = self.parse_u32(line)?;
            (Some(instances), tail)
        } else {
            (None, line)
        };

        self.expect_end(line, "draw arrays")?;

        self.push_command(Operation::DrawArrays { mode, first, count, instances });

        Ok(MatchResult::Matched)
    }

    fn process_compute(&mut self, line: &str) -> ParseResult {
        let line = match strip_word_prefix(line, "compute") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let (x, line) = self.parse_u32(line)?;
        let (y, line) = self.parse_u32(line)?;
        let (z, line) = self.parse_u32(line)?;
        self.expect_end(line, "compute")?;

        self.push_command(Operation::Compute { x, y, z });

        Ok(MatchResult::Matched)
    }

    fn process_clear(&mut self, line: &str) -> ParseResult {
        if line != "clear" {
            return Ok(MatchResult::NotMatched);
        }

        self.push_command(Operation::Clear {
            color: self.clear_color,
            depth: self.clear_depth,
            stencil: self.clear_stencil,
        });

        Ok(MatchResult::Matched)
    }

    fn process_clear_values(&mut self, line: &str) -> ParseResult {
        let line = match strip_word_prefix(line, "clear") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        if let Some(line) = strip_word_prefix(line, "color") {
            let (r, tail) = self.parse_f32(line)?;
            let (g, tail) = self.parse_f32(tail)?;
            let (b, tail) = self.parse_f32(tail)?;
            let (a, tail) = self.parse_f32(tail)?;

            if tail.is_empty() {
                self.clear_color = [r, g, b, a];
                Ok(MatchResult::Matched)
            } else {
                Err(error_at_line!(self, "Invalid clear color command"))
            }
        } else if let Some(line) = strip_word_prefix(line, "depth") {
            let (depth, tail) = self.parse_f32(line)?;

            if tail.is_empty() {
                self.clear_depth = depth;
                Ok(MatchResult::Matched)
            } else {
                Err(error_at_line!(self, "Invalid clear depth command"))
            }
        } else if let Some(line) = strip_word_prefix(line, "stencil") {
            let (stencil, tail) = self.parse_u32(line)?;

            if tail.is_empty() {
                self.clear_stencil = stencil;
                Ok(MatchResult::Matched)
            } else {
                Err(error_at_line!(self, "Invalid clear stencil command"))
            }
        } else {
            Ok(MatchResult::NotMatched)
        }
    }

    fn process_tolerance(&mut self, line: &str) -> ParseResult {
        let mut line = match strip_word_prefix(line, "tolerance") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let mut is_percent = false;
        let mut n_args = 0usize;
        let mut value = [0.0f64; 4];

        loop {
            line = line.trim_start();

            if line.is_empty() {
                break;
            }

            if n_args >= 4 {
                return Err(error_at_line!(self, "tolerance command has extra arguments"));
            }

            let (component, tail) = self.parse_f64(line)?;
            value[n_args] = component;
            line = tail;

            let this_is_percent = match line.strip_prefix('%') {
                Some(tail) => {
                    line = tail;
                    true
                },
                None => false,
            };

            if n_args > 0 && this_is_percent != is_percent {
                return Err(error_at_line!(
                    self,
                    "Either all tolerance values must be a percentage or none"
                ));
            }

            is_percent = this_is_percent;
            n_args += 1;
        }

        if n_args == 1 {
            let first_value = value[0];
            value[1..].fill(first_value);
        } else if n_args != 4 {
            return Err(error_at_line!(self, "There must be either 1 or 4 tolerance values"));
        }

        self.tolerance = Tolerance::new(value, is_percent);

        Ok(MatchResult::Matched)
    }

    fn process_texture(&mut self, line: &str) -> ParseResult {
        let line = match strip_word_prefix(line, "texture") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let (kind, line) = match next_word(line) {
            Some(v) => v,
            None => return Err(error_at_line!(self, "Expected texture type")),
        };

        let (unit, line) = self.parse_u32(line)?;

        let (image, line) = match kind {
            "rgbw" => {
                let ((width, height), tail) = self.parse_size(line)?;
                (TextureImage::Rgbw { width, height }, tail)
            },
            "checkerboard" => {
                let (level, tail) = self.parse_u32(line)?;
                let ((width, height), tail) = self.parse_size(tail)?;
                let (color1, tail) = self.parse_list(tail, 4, |s| self.parse_f32(s))?;
                let (color2, tail) = self.parse_list(tail, 4, |s| self.parse_f32(s))?;
                (TextureImage::Checkerboard { level, width, height, color1, color2 }, tail)
            },
            "miptree" => (TextureImage::Miptree, line),
            "junk" => {
                let ((width, height), tail) = self.parse_size(line)?;
                (TextureImage::Junk { width, height }, tail)
            },
            "shadow2D" => {
                let ((width, height), tail) = self.parse_size(line)?;
                (TextureImage::Shadow2D { width, height }, tail)
            },
            _ => return Err(error_at_line!(self, "Unknown texture type “{}”", kind)),
        };

        self.expect_end(line, "texture")?;

        self.push_command(Operation::Texture { unit, image });

        Ok(MatchResult::Matched)
    }

    fn lookup_or_error(&self, table: &[(&str, GLenum)], what: &str, name: &str)
                       -> Result<GLenum, LoadError>
    {
        lookup_name(table, name).ok_or_else(|| {
            error_at_line!(self, "Invalid {} “{}”, expected one of: {}", what, name,
                           table_names(table))
        })
    }

    fn process_texparameter(&mut self, line: &str) -> ParseResult {
        let line = match strip_word_prefix(line, "texparameter") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let words: Vec<&str> = line.split_whitespace().collect();

        let (target, param, value) = match words.as_slice() {
            [target, param, value] => (*target, *param, *value),
            _ => return Err(error_at_line!(self, "Expected texparameter TARGET PARAM VALUE")),
        };

        let target = self.lookup_or_error(&TEXTURE_TARGETS, "texture target", target)?;

        let enum_value = |table: &[(&str, GLenum)]| {
            self.lookup_or_error(table, param, value)
                .map(|v| TexParameterValue::Int(v as i32))
        };

        let (pname, value) = match param {
            "min" => (gl::TEXTURE_MIN_FILTER, enum_value(&FILTER_MODES[..])?),
            "mag" => (gl::TEXTURE_MAG_FILTER, enum_value(&FILTER_MODES[..2])?),
            "wrap_s" => (gl::TEXTURE_WRAP_S, enum_value(&WRAP_MODES[..])?),
            "wrap_t" => (gl::TEXTURE_WRAP_T, enum_value(&WRAP_MODES[..])?),
            "wrap_r" => (gl::TEXTURE_WRAP_R, enum_value(&WRAP_MODES[..])?),
            "compare_func" => (gl::TEXTURE_COMPARE_FUNC, enum_value(&COMPARE_FUNCS[..])?),
            "compare_mode" => (gl::TEXTURE_COMPARE_MODE, enum_value(&COMPARE_MODES[..])?),
            "base_level" | "max_level" => {
                let pname = if param == "base_level" {
                    gl::TEXTURE_BASE_LEVEL
                } else {
                    gl::TEXTURE_MAX_LEVEL
                };
                match self.parse_i32(value)? {
                    (level, "") => (pname, TexParameterValue::Int(level)),
                    _ => return Err(error_at_line!(self, "Invalid {} “{}”", param, value)),
                }
            },
            "lod_bias" => match self.parse_f32(value)? {
                (bias, "") => (gl::TEXTURE_LOD_BIAS, TexParameterValue::Float(bias)),
                _ => return Err(error_at_line!(self, "Invalid lod_bias “{}”", value)),
            },
            _ => return Err(error_at_line!(self, "Unknown texture parameter “{}”", param)),
        };

        self.push_command(Operation::TexParameter { target, pname, value });

        Ok(MatchResult::Matched)
    }

    // Commands that take a fixed list of GL enum names
    fn process_enum_command(&mut self, line: &str) -> ParseResult {
        let (command, args) = match next_word(line) {
            Some(v) => v,
            None => return Ok(MatchResult::NotMatched),
        };

        let (command, args) = match command {
            "polygon" | "provoking" => match next_word(args) {
                Some(("mode", tail)) if command == "polygon" => ("polygon mode", tail),
                Some(("vertex", tail)) if command == "provoking" => ("provoking vertex", tail),
                _ => return Ok(MatchResult::NotMatched),
            },
            _ => (command, args),
        };

        let n_args = match command {
            "enable" | "disable" | "blend_equation" | "depthfunc" | "provoking vertex" => 1,
            "blend_func" | "polygon mode" | "hint" => 2,
            _ => return Ok(MatchResult::NotMatched),
        };

        let words: Vec<&str> = args.split_whitespace().collect();

        if words.len() != n_args {
            return Err(error_at_line!(self, "{} takes {} argument(s)", command, n_args));
        }

        let op = match command {
            "enable" => Operation::Enable { cap: self.parse_enum(words[0])?, enabled: true },
            "disable" => Operation::Enable { cap: self.parse_enum(words[0])?, enabled: false },
            "blend_equation" => Operation::BlendEquation { mode: self.parse_enum(words[0])? },
            "depthfunc" => Operation::DepthFunc { func: self.parse_enum(words[0])? },
            "provoking vertex" => {
                let mode = match words[0] {
                    "first" => gl::FIRST_VERTEX_CONVENTION,
                    "last" => gl::LAST_VERTEX_CONVENTION,
                    name => self.parse_enum(name)?,
                };
                Operation::ProvokingVertex { mode }
            },
            "blend_func" => Operation::BlendFunc {
                src: self.parse_enum(words[0])?,
                dst: self.parse_enum(words[1])?,
            },
            "polygon mode" => Operation::PolygonMode {
                face: self.parse_enum(words[0])?,
                mode: self.parse_enum(words[1])?,
            },
            _ => Operation::Hint {
                target: self.parse_enum(words[0])?,
                mode: self.parse_enum(words[1])?,
            },
        };

        self.push_command(op);

        Ok(MatchResult::Matched)
    }

    fn process_patch_parameter(&mut self, line: &str) -> ParseResult {
        let line = match strip_words_prefix(line, "patch parameter") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        if let Some(tail) = strip_word_prefix(line, "vertices") {
            let (count, tail) = self.parse_u32(tail)?;
            if !tail.is_empty() {
                return Err(error_at_line!(self, "Invalid patch parameter vertices command"));
            }
            self.push_command(Operation::PatchVertices { count });
        } else if let Some(tail) = strip_words_prefix(line, "default level outer") {
            let (levels, tail) = self.parse_list(tail, 4, |s| self.parse_f32(s))?;
            self.expect_end(tail, "patch parameter")?;
            self.push_command(Operation::PatchDefaultOuterLevel { levels });
        } else if let Some(tail) = strip_words_prefix(line, "default level inner") {
            let (levels, tail) = self.parse_list(tail, 2, |s| self.parse_f32(s))?;
            self.expect_end(tail, "patch parameter")?;
            self.push_command(Operation::PatchDefaultInnerLevel { levels: [levels[0], levels[1]] });
        } else {
            return Err(error_at_line!(self, "Invalid patch parameter command"));
        }

        Ok(MatchResult::Matched)
    }

    fn process_ssbo(&mut self, line: &str) -> ParseResult {
        let line = match strip_word_prefix(line, "ssbo") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let (binding, line) = self.parse_u32(line)?;

        if let Some(tail) = strip_word_prefix(line, "subdata") {
            let (uniform_type, tail) = self.parse_uniform_type(tail)?;
            let (offset, tail) = self.parse_u32(tail)?;
            let values = match uniform_type.parse_values(tail) {
                Ok(values) => values,
                Err(e) => return Err(error_at_line!(self, "{}", e)),
            };
            self.push_command(Operation::SsboSubData {
                binding,
                offset: offset as usize,
                data: values.to_bytes(),
            });
        } else {
            let (size, tail) = self.parse_u32(line)?;
            if !tail.trim().is_empty() {
                return Err(error_at_line!(self, "Invalid ssbo command"));
            }
            self.push_command(Operation::SsboSize { binding, size: size as usize });
        }

        Ok(MatchResult::Matched)
    }

    fn process_probe_ssbo(&mut self, line: &str) -> ParseResult {
        let line = match strip_words_prefix(line, "probe ssbo") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let (uniform_type, line) = self.parse_uniform_type(line)?;
        let (binding, line) = self.parse_u32(line)?;
        let (offset, line) = self.parse_u32(line)?;
        let (comparison, line) = self.parse_comparison(line)?;

        let values = match uniform_type.parse_values(line) {
            Ok(values) => values,
            Err(e) => return Err(error_at_line!(self, "{}", e)),
        };

        self.push_command(Operation::ProbeSsbo {
            binding,
            offset: offset as usize,
            base_type: uniform_type.base_type,
            comparison,
            values,
            tolerance: self.tolerance.clone(),
        });

        Ok(MatchResult::Matched)
    }

    fn process_atomic_counters(&mut self, line: &str) -> ParseResult {
        if let Some(line) = strip_words_prefix(line, "atomic counters") {
            let (count, tail) = self.parse_u32(line)?;
            self.expect_end(tail, "atomic counters")?;
            self.push_command(Operation::AtomicCounters { count });
        } else if let Some(line) = strip_words_prefix(line, "probe atomic counter") {
            let (index, tail) = self.parse_u32(line)?;
            let (comparison, tail) = self.parse_comparison(tail)?;
            let (value, tail) = self.parse_u32(tail)?;
            self.expect_end(tail, "probe atomic counter")?;
            self.push_command(Operation::ProbeAtomicCounter { index, comparison, value });
        } else {
            return Ok(MatchResult::NotMatched);
        }

        Ok(MatchResult::Matched)
    }

    fn process_memory_barrier(&mut self, line: &str) -> ParseResult {
        let line = match strip_words_prefix(line, "memory barrier") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let mut barriers: GLbitfield = 0;

        for name in line.split(|c: char| c == '|' || c.is_whitespace()).filter(|n| !n.is_empty()) {
            barriers |= self.parse_enum(name)?;
        }

        if barriers == 0 {
            return Err(error_at_line!(self, "Expected barrier bits"));
        }

        self.push_command(Operation::MemoryBarrier { barriers });

        Ok(MatchResult::Matched)
    }

    fn process_fb(&mut self, line: &str) -> ParseResult {
        let line = match strip_word_prefix(line, "fb") {
            Some(l) => l,
            None => return Ok(MatchResult::NotMatched),
        };

        let op = if let Some(tail) = strip_words_prefix(line, "tex 2d") {
            let (unit, tail) = self.parse_u32(tail)?;
            let (level, tail) = if tail.trim().is_empty() {
                (0, tail)
            } else {
                self.parse_u32(tail)?
            };
            self.expect_end(tail, "fb")?;
            Operation::FbTexture2d { unit, level }
        } else {
            let (draw, read, tail) = if let Some(tail) = strip_words_prefix(line, "draw winsys") {
                (true, false, tail)
            } else if let Some(tail) = strip_words_prefix(line, "read winsys") {
                (false, true, tail)
            } else if let Some(tail) = strip_word_prefix(line, "winsys") {
                (true, true, tail)
            } else {
                return Err(error_at_line!(self, "Invalid fb command"));
            };
            self.expect_end(tail, "fb")?;
            Operation::FbWinsys { draw, read }
        };

        self.push_command(op);

        Ok(MatchResult::Matched)
    }

    fn process_link(&mut self, line: &str) -> ParseResult {
        let op = match line {
            "link error" => Operation::LinkError,
            "link success" => Operation::LinkSuccess,
            _ => return Ok(MatchResult::NotMatched),
        };

        self.push_command(op);

        Ok(MatchResult::Matched)
    }

    fn process_test_line(&mut self, line: &str) -> Result<(), LoadError> {
        let line = match trim_line_or_skip(line) {
            Some(l) => l,
            None => return Ok(()),
        };

        // the more specific probes have to be tried before the generic one
        handle_match_result!(self.process_probe_ssbo(line));
        handle_match_result!(self.process_atomic_counters(line));
        handle_match_result!(self.process_probe_depth(line));
        handle_match_result!(self.process_probe(line));
        handle_match_result!(self.process_uniform(line));
        handle_match_result!(self.process_draw_rect(line));
        handle_match_result!(self.process_draw_arrays(line));
        handle_match_result!(self.process_compute(line));
        handle_match_result!(self.process_clear(line));
        handle_match_result!(self.process_clear_values(line));
        handle_match_result!(self.process_tolerance(line));
        handle_match_result!(self.process_texture(line));
        handle_match_result!(self.process_texparameter(line));
        handle_match_result!(self.process_enum_command(line));
        handle_match_result!(self.process_patch_parameter(line));
        handle_match_result!(self.process_ssbo(line));
        handle_match_result!(self.process_memory_barrier(line));
        handle_match_result!(self.process_fb(line));
        handle_match_result!(self.process_link(line));

        Err(error_at_line!(self, "Invalid test command"))
    }

    fn process_line(&mut self, line: &str) -> Result<(), LoadError> {
        if self.process_section_header(line)? == MatchResult::Matched {
            return Ok(());
        }

        match self.current_section {
            Section::None => self.process_none_line(line),
            Section::Comment => Ok(()),
            Section::Require => self.process_require_line(line),
            Section::Shader => {
                self.process_shader_line(line);
                Ok(())
            },
            Section::ShaderFile => self.process_shader_file_line(line),
            Section::VertexData => self.process_vertex_data_line(line),
            Section::Test => self.process_test_line(line),
        }
    }

    fn parse(mut self) -> Result<Script, LoadError> {
        let mut line = String::new();

        loop {
            line.clear();

            if self.stream.read_line(&mut line)? == 0 {
                break;
            }

            self.process_line(&line)?;
        }

        self.end_section()?;

        let window_size = self.window_size();

        Ok(Script {
            filename: self.source.filename(),
            stages: self.stages.map(|stage| stage.into_boxed_slice()),
            commands: self.commands.into_boxed_slice(),
            requirements: self.requirements,
            window_size,
            vertex_data: self.vertex_data,
        })
    }
}

impl Script {
    /// Loads a script. The framebuffer is [`DEFAULT_WINDOW_SIZE`] unless the script asks for
    /// another size.
    pub fn load(source: &Source) -> Result<Script, LoadError> {
        Script::load_with_window_size(source, DEFAULT_WINDOW_SIZE)
    }

    /// Loads a script with a different default framebuffer size.
    pub fn load_with_window_size(source: &Source, window_size: (u32, u32))
                                 -> Result<Script, LoadError>
    {
        Loader::new(source, window_size)?.parse()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn shaders(&self, stage: Stage) -> &[Shader] {
        &self.stages[stage as usize]
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn vertex_data(&self) -> Option<&vbo::Vbo> {
        self.vertex_data.as_ref()
    }

    /// True if the script has any shader at all. Scripts without shaders run their commands
    /// with program 0 bound.
    pub fn has_shaders(&self) -> bool {
        self.stages.iter().any(|stage| !stage.is_empty())
    }

    /// True if the script contains a `link error` command, in which case a program that fails
    /// to link doesn't fail the test by itself.
    pub fn expects_link_error(&self) -> bool {
        self.commands.iter().any(|command| command.op == Operation::LinkError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::Requirement;
    use crate::uniform::{BaseType, Values};
    use crate::version::Api;
    use smallvec::smallvec;

    #[test]
    fn test_strip_word_prefix() {
        assert_eq!(strip_word_prefix("potato", "potato"), Some(""));
        assert_eq!(strip_word_prefix("   potato  ", "potato"), Some("  "));
        assert_eq!(strip_word_prefix("potato-party", "potato"), None);
        assert_eq!(strip_word_prefix("potato party", "potato"), Some(" party"));
        assert_eq!(strip_word_prefix("hotpotato", "potato"), None);

        assert_eq!(strip_words_prefix("draw    rect 1", "draw rect"), Some(" 1"));
        assert_eq!(strip_words_prefix("draw rectangle", "draw rect"), None);
    }

    #[test]
    fn test_trim_line_or_skip() {
        assert_eq!(trim_line_or_skip("   probe all rgb 1 0 0 \r\n"), Some("probe all rgb 1 0 0"));
        assert_eq!(trim_line_or_skip("clear # everything\n"), Some("clear"));
        assert_eq!(trim_line_or_skip("    \t     \n"), None);
        assert_eq!(trim_line_or_skip("# comment"), None);
    }

    fn check_error(source: &str, error: &str) {
        let source = Source::from_string(source.to_string());
        let load_error = Script::load(&source).unwrap_err().to_string();
        assert_eq!(error, load_error);
    }

    fn script_from_string(source: String) -> Script {
        let source = Source::from_string(source);
        Script::load(&source).unwrap()
    }

    fn check_test_command(source: &str, op: Operation) -> Script {
        let script = script_from_string(format!("[test]\n{}", source));
        assert_eq!(script.commands().len(), 1);
        assert_eq!(script.commands()[0].line_num, 2);
        assert_eq!(script.commands()[0].op, op);
        script
    }

    fn check_test_command_error(source: &str, error: &str) {
        let source_string = format!("[test]\n{}", source);
        let error = format!("line 2: {}", error);
        check_error(&source_string, &error);
    }

    #[test]
    fn test_sections() {
        let script = script_from_string(
            "# leading comment\n\
             [require]\n\
             GLSL >= 1.30 # comment\n\
             SIZE 64 32\n\
             \n\
             [vertex shader passthrough]\n\
             [fragment shader]\n\
             #version 130\n\
             void main() { gl_FragColor = vec4(1.0); }\n\
             [fragment shader]\n\
             void helper() {}\n\
             [test]\n\
             draw rect -1 -1 2 2\n".to_string()
        );

        assert_eq!(script.filename(), "(string source)");
        assert_eq!(script.window_size(), (64, 32));
        assert_eq!(script.shaders(Stage::Vertex), [Shader::Passthrough]);
        assert_eq!(
            script.shaders(Stage::Fragment),
            [
                Shader::Glsl("#version 130\nvoid main() { gl_FragColor = vec4(1.0); }\n".to_owned()),
                Shader::Glsl("void helper() {}\n".to_owned()),
            ]
        );
        assert!(script.shaders(Stage::Geometry).is_empty());
        assert_eq!(script.commands().len(), 1);
        assert_eq!(script.commands()[0].line_num, 13);
        assert!(script.has_shaders());
        assert!(!script.expects_link_error());

        let glsl = script.requirements().iter().next().unwrap();
        assert!(matches!(glsl, Requirement::GlslVersion { api: Api::Gl, .. }));
    }

    #[test]
    fn test_section_errors() {
        check_error("[fragment shader]\n[require]\n", "line 2: [require] must be the first section");
        check_error(
            "[comment]\nfoo\n[require]\nGL >= 3.0\n[test]\npotato\n",
            "line 6: Invalid test command"
        );
        check_error("[potato]\n", "line 1: Unknown section “potato”");
        check_error("[test\n", "line 1: Missing ‘]’");
        check_error("[test] foo\n", "line 1: Trailing data after ‘]’");
        check_error("stuff\n", "line 1: expected empty line");
        check_error(
            "[vertex data]\nx/float/1\n[vertex data]\n",
            "line 3: Duplicate vertex data section"
        );
        check_error("[require]\nGL ~= 3.0\n", "line 2: Invalid comparison operator “~=”");
        check_error("[fragment shader file]\n[test]\n", "line 2: Missing shader file name");
    }

    #[test]
    fn test_vertex_data() {
        let script = script_from_string(
            "[vertex data]\n\
             piglit_vertex/float/vec2 # position\n\
             -1 -1\n\
             1 -1\n\
             \n\
             1 1\n".to_string()
        );

        let vbo = script.vertex_data().unwrap();
        assert_eq!(vbo.num_rows(), 3);
        assert_eq!(vbo.attribs()[0].name(), "piglit_vertex");

        // reported at the end of the file
        check_error("[vertex data]\n\n", "line 3: Missing header line");
    }

    #[test]
    fn test_shader_file() {
        let dir = std::env::temp_dir().join(format!("shader-runner-script-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("shader.frag"), "void main() {}\n").unwrap();
        let script_path = dir.join("test.shader_test");
        fs::write(&script_path, "[fragment shader file]\nshader.frag\n").unwrap();

        let source = Source::from_file(&script_path);
        let script = Script::load(&source).unwrap();
        assert_eq!(script.shaders(Stage::Fragment), [Shader::Glsl("void main() {}\n".to_owned())]);

        fs::write(&script_path, "[fragment shader file]\nshader.frag\nother.frag\n").unwrap();
        let error = Script::load(&source).unwrap_err().to_string();
        assert_eq!(error, "line 3: Only one file name is allowed per shader section");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_probe() {
        check_test_command(
            " relative   probe  rect   rgb ( 0.5,0.25,  0.5, 0.1 ) (5, 6, 7)",
            Operation::ProbeRect {
                n_components: 3,
                region: Region::RelativeRect([0.5, 0.25, 0.5, 0.1]),
                color: [5.0, 6.0, 7.0, 0.0],
                tolerance: Tolerance::default(),
            },
        );
        check_test_command(
            "probe rgba (1, 2) (0.5, 0.25, 1, 0)",
            Operation::ProbeRect {
                n_components: 4,
                region: Region::Pixels([1, 2, 1, 1]),
                color: [0.5, 0.25, 1.0, 0.0],
                tolerance: Tolerance::default(),
            },
        );
        check_test_command(
            "probe rgb 10 20 1 0 0",
            Operation::ProbeRect {
                n_components: 3,
                region: Region::Pixels([10, 20, 1, 1]),
                color: [1.0, 0.0, 0.0, 0.0],
                tolerance: Tolerance::default(),
            },
        );
        check_test_command(
            "probe all rgba 0 1 0 1",
            Operation::ProbeRect {
                n_components: 4,
                region: Region::All,
                color: [0.0, 1.0, 0.0, 1.0],
                tolerance: Tolerance::default(),
            },
        );
        check_test_command(
            "relative probe rgb (0.5, 0.75) (0, 0, 1)",
            Operation::ProbeRect {
                n_components: 3,
                region: Region::RelativePoint([0.5, 0.75]),
                color: [0.0, 0.0, 1.0, 0.0],
                tolerance: Tolerance::default(),
            },
        );

        let script = script_from_string(
            "[test]\n\
             tolerance 2% 3% 4% 5%\n\
             probe rect rgb (0, 0, 5, 5) (1, 1, 1)\n".to_string()
        );
        match &script.commands()[0].op {
            Operation::ProbeRect { tolerance, .. } => {
                assert_eq!(*tolerance, Tolerance::new([2.0, 3.0, 4.0, 5.0], true));
            },
            op => panic!("unexpected operation {:?}", op),
        }

        check_test_command_error("probe rgbx 1 2 3 4 5", "Expected rgb or rgba in probe command");
        check_test_command_error("probe rgb (1 2) (3, 4, 5)", "Expected ‘,’");
        check_test_command_error("probe rgb (1, 2 (3, 4, 5)", "Expected ‘)’");
        check_test_command_error("probe rgb (1, 2) (3, 4, 5) 6", "Extra data after probe command");
        check_test_command_error(
            "relative probe all rgb 1 1 1",
            "‘all’ can’t be used with a relative probe"
        );
    }

    #[test]
    fn test_probe_depth() {
        check_test_command(
            "probe depth 3 4 0.5",
            Operation::ProbeDepth {
                x: 3,
                y: 4,
                depth: 0.5,
                tolerance: Tolerance::default(),
            },
        );
        check_test_command_error("probe depth 3 4 0.5 1", "Extra data after probe command");
    }

    #[test]
    fn test_tolerance() {
        check_test_command_error(
            "tolerance 1 2 3 4 5",
            "tolerance command has extra arguments"
        );
        check_test_command_error(
            "tolerance 1% 2 3 4",
            "Either all tolerance values must be a percentage or none"
        );
        check_test_command_error(
            "tolerance 1 2",
            "There must be either 1 or 4 tolerance values"
        );
    }

    #[test]
    fn test_draw_rect() {
        check_test_command(
            "  draw    rect  1 2 3 4 ",
            Operation::DrawRect {
                x: 1.0,
                y: 2.0,
                w: 3.0,
                h: 4.0,
                ortho: false,
                tex: None,
                patch: false,
                instances: None,
            },
        );
        check_test_command(
            "draw rect patch ortho 0 0 125 250",
            Operation::DrawRect {
                x: 0.0,
                y: 0.0,
                w: 125.0,
                h: 250.0,
                ortho: true,
                tex: None,
                patch: true,
                instances: None,
            },
        );
        check_test_command(
            "draw rect tex -1 -1 2 2 0 0 1 1",
            Operation::DrawRect {
                x: -1.0,
                y: -1.0,
                w: 2.0,
                h: 2.0,
                ortho: false,
                tex: Some([0.0, 0.0, 1.0, 1.0]),
                patch: false,
                instances: None,
            },
        );
        check_test_command(
            "draw instanced rect 3 -1 -1 2 2",
            Operation::DrawRect {
                x: -1.0,
                y: -1.0,
                w: 2.0,
                h: 2.0,
                ortho: false,
                tex: None,
                patch: false,
                instances: Some(3),
            },
        );

        check_test_command_error("draw rect", "cannot parse float from empty string");
        check_test_command_error("draw rect 0 0 0", "cannot parse float from empty string");
        check_test_command_error("draw rect 0 0 0 0 foo", "Extra data at end of line");
    }

    #[test]
    fn test_draw_arrays() {
        check_test_command(
            "draw arrays GL_TRIANGLE_FAN 0 4",
            Operation::DrawArrays {
                mode: gl::TRIANGLE_FAN,
                first: 0,
                count: 4,
                instances: None,
            },
        );
        check_test_command(
            "draw arrays instanced GL_POINTS 1 2 8",
            Operation::DrawArrays {
                mode: gl::POINTS,
                first: 1,
                count: 2,
                instances: Some(8),
            },
        );
        check_test_command_error("draw arrays GL_POTATOES 0 4", "Unknown enum “GL_POTATOES”");
        check_test_command_error("draw arrays", "Expected primitive mode");
    }

    #[test]
    fn test_compute_and_clear() {
        check_test_command("compute 4 2 1", Operation::Compute { x: 4, y: 2, z: 1 });

        let script = script_from_string(
            "[test]\n\
             clear color 0.5 0.25 0 1\n\
             clear depth 0.5\n\
             clear stencil 3\n\
             clear\n".to_string()
        );
        assert_eq!(script.commands().len(), 1);
        assert_eq!(
            script.commands()[0].op,
            Operation::Clear { color: [0.5, 0.25, 0.0, 1.0], depth: 0.5, stencil: 3 }
        );

        check_test_command_error("clear color 1 2 3 4 5", "Invalid clear color command");
        check_test_command_error("compute 1 2", "cannot parse integer from empty string");
    }

    #[test]
    fn test_uniform() {
        check_test_command(
            "uniform vec4 color 1.0 0.5 0.25 0",
            Operation::Uniform {
                name: "color".to_owned(),
                uniform_type: UniformType::from_glsl_name("vec4").unwrap(),
                values: Values::Float(smallvec![1.0, 0.5, 0.25, 0.0]),
            },
        );
        check_test_command(
            "uniform int tex[1] 3",
            Operation::Uniform {
                name: "tex[1]".to_owned(),
                uniform_type: UniformType::from_glsl_name("int").unwrap(),
                values: Values::Int(smallvec![3]),
            },
        );
        check_test_command_error("uniform potato x 1", "Invalid GLSL type name: potato");
        check_test_command_error("uniform vec2", "Missing uniform name");
        check_test_command_error(
            "uniform vec2 pos 1 2 3",
            "Expected a multiple of 2 values but got 3"
        );
    }

    #[test]
    fn test_texture() {
        check_test_command(
            "texture rgbw 0 (8, 8)",
            Operation::Texture { unit: 0, image: TextureImage::Rgbw { width: 8, height: 8 } },
        );
        check_test_command(
            "texture checkerboard 1 0 (32, 16) (1, 0, 0, 1) (0, 0, 1, 1)",
            Operation::Texture {
                unit: 1,
                image: TextureImage::Checkerboard {
                    level: 0,
                    width: 32,
                    height: 16,
                    color1: [1.0, 0.0, 0.0, 1.0],
                    color2: [0.0, 0.0, 1.0, 1.0],
                },
            },
        );
        check_test_command("texture miptree 2", Operation::Texture {
            unit: 2,
            image: TextureImage::Miptree,
        });
        check_test_command("texture shadow2D 0 (4, 4)", Operation::Texture {
            unit: 0,
            image: TextureImage::Shadow2D { width: 4, height: 4 },
        });
        check_test_command("texture junk 3 (2, 2)", Operation::Texture {
            unit: 3,
            image: TextureImage::Junk { width: 2, height: 2 },
        });

        check_test_command_error("texture potato 0", "Unknown texture type “potato”");
        check_test_command_error("texture rgbw 0 (0, 8)", "Texture size must not be zero");
    }

    #[test]
    fn test_texparameter() {
        check_test_command(
            "texparameter 2D min linear_mipmap_nearest",
            Operation::TexParameter {
                target: gl::TEXTURE_2D,
                pname: gl::TEXTURE_MIN_FILTER,
                value: TexParameterValue::Int(gl::LINEAR_MIPMAP_NEAREST as i32),
            },
        );
        check_test_command(
            "texparameter Cube lod_bias -1.5",
            Operation::TexParameter {
                target: gl::TEXTURE_CUBE_MAP,
                pname: gl::TEXTURE_LOD_BIAS,
                value: TexParameterValue::Float(-1.5),
            },
        );
        check_test_command(
            "texparameter 2D compare_mode compare_r_to_texture",
            Operation::TexParameter {
                target: gl::TEXTURE_2D,
                pname: gl::TEXTURE_COMPARE_MODE,
                value: TexParameterValue::Int(gl::COMPARE_REF_TO_TEXTURE as i32),
            },
        );
        check_test_command_error(
            "texparameter 2D mag linear_mipmap_linear",
            "Invalid mag “linear_mipmap_linear”, expected one of: nearest, linear"
        );
        check_test_command_error("texparameter 4D min linear", "Invalid texture target “4D”, \
                                  expected one of: 1D, 2D, 3D, Rect, Cube, 1DArray, 2DArray, \
                                  CubeArray");
        check_test_command_error("texparameter 2D swizzle red", "Unknown texture parameter “swizzle”");
    }

    #[test]
    fn test_state_commands() {
        check_test_command("enable GL_BLEND", Operation::Enable { cap: gl::BLEND, enabled: true });
        check_test_command(
            "disable GL_DEPTH_TEST",
            Operation::Enable { cap: gl::DEPTH_TEST, enabled: false },
        );
        check_test_command(
            "blend_func GL_SRC_ALPHA GL_ONE_MINUS_SRC_ALPHA",
            Operation::BlendFunc { src: gl::SRC_ALPHA, dst: gl::ONE_MINUS_SRC_ALPHA },
        );
        check_test_command("blend_equation GL_MAX", Operation::BlendEquation { mode: gl::MAX });
        check_test_command("depthfunc GL_LEQUAL", Operation::DepthFunc { func: gl::LEQUAL });
        check_test_command(
            "polygon mode GL_FRONT_AND_BACK GL_LINE",
            Operation::PolygonMode { face: gl::FRONT_AND_BACK, mode: gl::LINE },
        );
        check_test_command(
            "provoking vertex first",
            Operation::ProvokingVertex { mode: gl::FIRST_VERTEX_CONVENTION },
        );
        check_test_command(
            "hint GL_FRAGMENT_SHADER_DERIVATIVE_HINT GL_NICEST",
            Operation::Hint { target: gl::FRAGMENT_SHADER_DERIVATIVE_HINT, mode: gl::NICEST },
        );
        check_test_command_error("enable", "enable takes 1 argument(s)");
        check_test_command_error("depthfunc GL_SOMETIMES", "Unknown enum “GL_SOMETIMES”");
    }

    #[test]
    fn test_patch_parameter() {
        check_test_command("patch parameter vertices 3", Operation::PatchVertices { count: 3 });
        check_test_command(
            "patch parameter default level outer 1 2 3 4",
            Operation::PatchDefaultOuterLevel { levels: [1.0, 2.0, 3.0, 4.0] },
        );
        check_test_command(
            "patch parameter default level inner 5 6",
            Operation::PatchDefaultInnerLevel { levels: [5.0, 6.0] },
        );
        check_test_command_error("patch parameter potato", "Invalid patch parameter command");
    }

    #[test]
    fn test_ssbo() {
        check_test_command("ssbo 1 64", Operation::SsboSize { binding: 1, size: 64 });

        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_ne_bytes());
        data.extend_from_slice(&2u32.to_ne_bytes());
        check_test_command(
            "ssbo 0 subdata uvec2 8 1 2",
            Operation::SsboSubData { binding: 0, offset: 8, data },
        );

        check_test_command(
            "probe ssbo float 2 4 ~= 0.5",
            Operation::ProbeSsbo {
                binding: 2,
                offset: 4,
                base_type: BaseType::Float,
                comparison: Comparison::FuzzyEqual,
                values: Values::Float(smallvec![0.5]),
                tolerance: Tolerance::default(),
            },
        );
        check_test_command_error("probe ssbo int 0 0 =< 1", "Unknown comparison operator: =<");
        check_test_command_error("ssbo 0 12 13", "Invalid ssbo command");
    }

    #[test]
    fn test_atomic_counters() {
        check_test_command("atomic counters 2", Operation::AtomicCounters { count: 2 });
        check_test_command(
            "probe atomic counter 1 >= 10",
            Operation::ProbeAtomicCounter { index: 1, comparison: Comparison::GreaterEqual, value: 10 },
        );
        check_test_command_error("probe atomic counter 1", "Expected comparison operator");
    }

    #[test]
    fn test_misc_commands() {
        check_test_command(
            "memory barrier GL_SHADER_STORAGE_BARRIER_BIT",
            Operation::MemoryBarrier { barriers: gl::SHADER_STORAGE_BARRIER_BIT },
        );
        check_test_command(
            "memory barrier GL_UNIFORM_BARRIER_BIT | GL_COMMAND_BARRIER_BIT",
            Operation::MemoryBarrier {
                barriers: gl::UNIFORM_BARRIER_BIT | gl::COMMAND_BARRIER_BIT,
            },
        );
        check_test_command("fb tex 2d 1", Operation::FbTexture2d { unit: 1, level: 0 });
        check_test_command("fb tex 2d 0 2", Operation::FbTexture2d { unit: 0, level: 2 });
        check_test_command("fb draw winsys", Operation::FbWinsys { draw: true, read: false });
        check_test_command("fb winsys", Operation::FbWinsys { draw: true, read: true });

        let script = check_test_command("link error", Operation::LinkError);
        assert!(script.expects_link_error());
        check_test_command("link success", Operation::LinkSuccess);

        check_test_command_error("fb potato", "Invalid fb command");
        check_test_command_error("potato", "Invalid test command");
    }

    #[test]
    fn test_token_replacement() {
        let mut source = Source::from_string("[test]\nprobe all rgb COLOR\n");
        source.add_token_replacement("COLOR", "0 1 0");

        let script = Script::load(&source).unwrap();
        match &script.commands()[0].op {
            Operation::ProbeRect { color, .. } => assert_eq!(*color, [0.0, 1.0, 0.0, 0.0]),
            op => panic!("unexpected operation {:?}", op),
        }
    }

    #[test]
    fn test_window_size() {
        let source = Source::from_string("[require]\nSIZE 16 8\n[test]\nprobe all rgb 0 0 0\n");
        let script = Script::load_with_window_size(&source, (250, 250)).unwrap();

        assert_eq!(script.window_size(), (16, 8));

        let source = Source::from_string("[test]\nclear\n");
        let script = Script::load_with_window_size(&source, (16, 8)).unwrap();

        assert_eq!(script.window_size(), (16, 8));
    }

    #[test]
    fn test_texture_render_target() {
        let script = script_from_string(
            "[require]\n\
             SIZE 250 250\n\
             [test]\n\
             texture rgbw 0 (8, 8)\n\
             fb tex 2d 0\n\
             probe all rgba 1 0 0 1\n\
             draw rect ortho 0 0 4 4\n".to_string()
        );
        let ops: Vec<_> = script.commands().iter().map(|c| &c.op).collect();

        assert_eq!(ops[1], &Operation::FbTexture2d { unit: 0, level: 0 });
        // left for the tester to resolve against the 8x8 texture
        assert!(matches!(ops[2], Operation::ProbeRect { region: Region::All, .. }));
        assert!(matches!(ops[3], Operation::DrawRect { ortho: true, w, .. } if *w == 4.0));
    }

    #[test]
    fn test_sampler_uniform() {
        check_test_command(
            "uniform sampler2D tex 1",
            Operation::Uniform {
                name: "tex".to_owned(),
                uniform_type: UniformType::from_glsl_name("int").unwrap(),
                values: Values::Int(smallvec![1]),
            },
        );

        let script = script_from_string("[test]\nuniform usampler2DArray tex 0\n".to_string());
        assert_eq!(script.commands().len(), 1);
    }
}
