//! Parsing of the `[vertex data]` section.
//!
//! The section is a table. The first row holds one header per column and every other row
//! holds the values for one vertex:
//!
//! ```text
//!   piglit_vertex/float/vec2  color/ubyte/4  m/float/mat2x3/0  m/float/mat2x3/1
//!   -1.0 -1.0                 255 0 0 255    1 0 0             0 1 0
//! ```
//!
//! Each header has the form `NAME/TYPE/GLSL_TYPE`, `NAME/TYPE/GLSL_TYPE/COLUMN` for a column of
//! a matrix attribute, or the older `NAME/TYPE/COUNT`. `TYPE` is the type of the data that
//! follows (`byte`, `ubyte`, `short`, `ushort`, `int`, `uint`, `float` or `double`) and
//! `GLSL_TYPE` is the type of the attribute in the shader. The attribute is looked up by name
//! in the linked program when drawing.

use std::fmt;

use crate::gl;
use crate::gl::types::GLenum;
use crate::parse_num;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidHeader(String),
    InvalidData(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Error::InvalidHeader(s) => write!(f, "{}", s),
            Error::InvalidData(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for Error {}

/// Type of the values stored in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

static DATA_TYPES: [(&str, DataType); 8] = [
    ("byte", DataType::Byte),
    ("ubyte", DataType::UByte),
    ("short", DataType::Short),
    ("ushort", DataType::UShort),
    ("int", DataType::Int),
    ("uint", DataType::UInt),
    ("float", DataType::Float),
    ("double", DataType::Double),
];

impl DataType {
    pub fn from_name(name: &str) -> Option<DataType> {
        DATA_TYPES.iter().find(|&&(n, _)| n == name).map(|&(_, t)| t)
    }

    /// Size in bytes of one component.
    pub fn size(self) -> usize {
        match self {
            DataType::Byte | DataType::UByte => 1,
            DataType::Short | DataType::UShort => 2,
            DataType::Int | DataType::UInt | DataType::Float => 4,
            DataType::Double => 8,
        }
    }

    pub fn gl_type(self) -> GLenum {
        match self {
            DataType::Byte => gl::BYTE,
            DataType::UByte => gl::UNSIGNED_BYTE,
            DataType::Short => gl::SHORT,
            DataType::UShort => gl::UNSIGNED_SHORT,
            DataType::Int => gl::INT,
            DataType::UInt => gl::UNSIGNED_INT,
            DataType::Float => gl::FLOAT,
            DataType::Double => gl::DOUBLE,
        }
    }
}

/// How the shader reads an attribute, which decides the `glVertexAttrib*Pointer` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpretation {
    /// Converted to floats (`glVertexAttribPointer`).
    Float,
    /// Integer attributes (`glVertexAttribIPointer`).
    Integer,
    /// Double attributes (`glVertexAttribLPointer`).
    Double,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attrib {
    name: String,
    data_type: DataType,
    interpretation: Interpretation,
    n_components: usize,
    // For matrices, the column is added to the location of the attribute
    column: u32,
    // Byte offset into each row
    offset: usize,
}

impl Attrib {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn interpretation(&self) -> Interpretation {
        self.interpretation
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    #[inline]
    pub fn column(&self) -> u32 {
        self.column
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Vertex data ready to be uploaded into a single interleaved buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Vbo {
    attribs: Box<[Attrib]>,
    raw_data: Box<[u8]>,
    stride: usize,
    num_rows: usize,
}

impl Vbo {
    #[inline]
    pub fn attribs(&self) -> &[Attrib] {
        &self.attribs
    }

    #[inline]
    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }
}

impl std::str::FromStr for Vbo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Vbo, Error> {
        let mut parser = Parser::new();

        for line in s.lines() {
            parser.parse_line(line)?;
        }

        parser.into_vbo()
    }
}

/// Builds a [`Vbo`] one line at a time.
#[derive(Debug, Default)]
pub struct Parser {
    // None until the header line has been seen
    attribs: Option<Vec<Attrib>>,
    raw_data: Vec<u8>,
    stride: usize,
    num_rows: usize,
}

macro_rules! invalid_header {
    ($($message:expr),+) => {
        return Err(Error::InvalidHeader(format!($($message),+)))
    };
}

macro_rules! invalid_data {
    ($($message:expr),+) => {
        return Err(Error::InvalidData(format!($($message),+)))
    };
}

fn align(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

// Returns the interpretation, the number of components and the number of matrix columns
fn decode_glsl_type(glsl_type: &str) -> Option<(Interpretation, usize, u32)> {
    let (interpretation, tail) = match glsl_type.as_bytes().first()? {
        b'i' => (Interpretation::Integer, &glsl_type[1..]),
        b'u' => (Interpretation::Integer, &glsl_type[1..]),
        b'd' => (Interpretation::Double, &glsl_type[1..]),
        _ => (Interpretation::Float, glsl_type),
    };

    let size = |s: &str| match s.parse::<usize>() {
        Ok(n @ 2..=4) => Some(n),
        _ => None,
    };

    match tail {
        "nt" | "int" if interpretation == Interpretation::Integer => Some((interpretation, 1, 1)),
        "ouble" if interpretation == Interpretation::Double => Some((interpretation, 1, 1)),
        "float" if interpretation == Interpretation::Float => Some((interpretation, 1, 1)),
        _ => {
            if let Some(n) = tail.strip_prefix("vec") {
                Some((interpretation, size(n)?, 1))
            } else if let Some(dims) = tail.strip_prefix("mat") {
                if interpretation == Interpretation::Integer {
                    return None;
                }
                let (columns, rows) = match dims.split_once('x') {
                    Some((c, r)) => (size(c)?, size(r)?),
                    None => (size(dims)?, size(dims)?),
                };
                Some((interpretation, rows, columns as u32))
            } else {
                None
            }
        },
    }
}

impl Parser {
    pub fn new() -> Parser {
        Default::default()
    }

    fn trim_line(line: &str) -> &str {
        let line = match line.find('#') {
            Some(end) => &line[0..end],
            None => line,
        };

        line.trim()
    }

    fn parse_attrib(&self, s: &str, offset: usize) -> Result<Attrib, Error> {
        let parts: Vec<&str> = s.split('/').collect();

        if parts.len() < 3 || parts.len() > 4 {
            invalid_header!(
                "Column headers must be in the form name/type/glsl_type[/column]. Got: {}",
                s
            );
        }

        let data_type = match DataType::from_name(parts[1]) {
            Some(t) => t,
            None => invalid_header!("Unknown GL type: {}", parts[1]),
        };

        let (interpretation, n_components, n_columns) =
            if parts[2].starts_with(|c: char| c.is_ascii_digit()) {
                match parts[2].parse::<usize>() {
                    Ok(n @ 1..=4) => {
                        let interpretation = match data_type {
                            DataType::Double => Interpretation::Double,
                            _ => Interpretation::Float,
                        };
                        (interpretation, n, 1)
                    },
                    _ => invalid_header!("Invalid component count: {}", parts[2]),
                }
            } else {
                match decode_glsl_type(parts[2]) {
                    Some(t) => t,
                    None => invalid_header!("Unknown GLSL type: {}", parts[2]),
                }
            };

        if interpretation == Interpretation::Double && data_type != DataType::Double {
            invalid_header!("Double attributes need double data: {}", s);
        }
        if interpretation == Interpretation::Integer &&
            matches!(data_type, DataType::Float | DataType::Double)
        {
            invalid_header!("Integer attributes need integer data: {}", s);
        }

        let column = match parts.get(3) {
            Some(column) => match column.parse::<u32>() {
                Ok(c) if c < n_columns => c,
                _ => invalid_header!("Invalid matrix column in {}", s),
            },
            None if n_columns > 1 => {
                invalid_header!("Matrix attributes need a column index: {}", s);
            },
            None => 0,
        };

        Ok(Attrib {
            name: parts[0].to_owned(),
            data_type,
            interpretation,
            n_components,
            column,
            offset: align(offset, data_type.size()),
        })
    }

    fn parse_header_line(&mut self, line: &str) -> Result<(), Error> {
        let mut attribs: Vec<Attrib> = Vec::new();
        let mut stride = 0;
        let mut max_alignment = 1;

        for header in line.split_whitespace() {
            let attrib = self.parse_attrib(header, stride)?;

            if attribs.iter().any(|a| a.name == attrib.name && a.column == attrib.column) {
                invalid_header!("Duplicate column: {}", header);
            }

            let size = attrib.data_type.size();
            stride = attrib.offset + size * attrib.n_components;
            max_alignment = max_alignment.max(size);

            attribs.push(attrib);
        }

        self.attribs = Some(attribs);
        self.stride = align(stride, max_alignment);

        Ok(())
    }

    fn parse_datum<'a>(data_type: DataType, text: &'a str, data: &mut [u8])
                       -> Result<&'a str, Error>
    {
        macro_rules! datum {
            ($func:ident, $what:expr) => {
                match parse_num::$func(text) {
                    Ok((v, tail)) => {
                        let bytes = v.to_ne_bytes();
                        data[..bytes.len()].copy_from_slice(&bytes);
                        Ok(tail)
                    },
                    Err(_) => invalid_data!("Couldn’t parse as {}: {}", $what, text.trim()),
                }
            };
        }

        match data_type {
            DataType::Byte => datum!(parse_i8, "signed byte"),
            DataType::UByte => datum!(parse_u8, "unsigned byte"),
            DataType::Short => datum!(parse_i16, "signed short"),
            DataType::UShort => datum!(parse_u16, "unsigned short"),
            DataType::Int => datum!(parse_i32, "signed int"),
            DataType::UInt => datum!(parse_u32, "unsigned int"),
            DataType::Float => datum!(parse_f32, "float"),
            DataType::Double => datum!(parse_f64, "double"),
        }
    }

    fn parse_data_line(&mut self, mut line: &str) -> Result<(), Error> {
        let attribs = match &self.attribs {
            Some(attribs) => attribs,
            None => unreachable!("the header is parsed first"),
        };

        let row_start = self.raw_data.len();
        self.raw_data.resize(row_start + self.stride, 0);
        let row = &mut self.raw_data[row_start..];

        for attrib in attribs.iter() {
            let size = attrib.data_type.size();

            for component in 0..attrib.n_components {
                if line.trim_start().is_empty() {
                    invalid_data!("Not enough values on the row, “{}” is incomplete", attrib.name);
                }

                let offset = attrib.offset + component * size;
                line = Parser::parse_datum(attrib.data_type, line, &mut row[offset..])?;

                // values must be separated by whitespace
                if !line.is_empty() && !line.starts_with(char::is_whitespace) {
                    invalid_data!("Invalid value on the row: {}", line.trim());
                }
            }
        }

        if !line.trim().is_empty() {
            invalid_data!("Extra data at end of line: {}", line.trim());
        }

        self.num_rows += 1;

        Ok(())
    }

    /// Parses one line of the section. Blank lines and comments are ignored.
    pub fn parse_line(&mut self, line: &str) -> Result<(), Error> {
        let line = Parser::trim_line(line);

        if line.is_empty() {
            Ok(())
        } else if self.attribs.is_none() {
            self.parse_header_line(line)
        } else {
            self.parse_data_line(line)
        }
    }

    pub fn into_vbo(self) -> Result<Vbo, Error> {
        match self.attribs {
            None => Err(Error::InvalidData("Missing header line".to_owned())),
            Some(attribs) => Ok(Vbo {
                attribs: attribs.into_boxed_slice(),
                raw_data: self.raw_data.into_boxed_slice(),
                stride: self.stride,
                num_rows: self.num_rows,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(data: &[u8]) -> Vec<f32> {
        data.chunks(4).map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]])).collect()
    }

    #[test]
    fn rectangle() {
        let vbo: Vbo = "piglit_vertex/float/vec2 \n\
                        -1 -1 # bottom left\n\
                        \n\
                         1 -1\n\
                         1  1\n\
                        -1  1\n".parse().unwrap();

        assert_eq!(vbo.num_rows(), 4);
        assert_eq!(vbo.stride(), 8);
        assert_eq!(vbo.attribs().len(), 1);
        assert_eq!(vbo.attribs()[0].name(), "piglit_vertex");
        assert_eq!(vbo.attribs()[0].interpretation(), Interpretation::Float);
        assert_eq!(floats(vbo.raw_data()), [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0]);
    }

    #[test]
    fn mixed_types_are_aligned() {
        let vbo: Vbo = "pos/float/2 c/ubyte/3 i/int/int\n\
                        0.5 1.5 1 2 3 -7\n".parse().unwrap();

        let attribs = vbo.attribs();
        assert_eq!(attribs[0].offset(), 0);
        assert_eq!(attribs[1].offset(), 8);
        assert_eq!(attribs[1].n_components(), 3);
        assert_eq!(attribs[2].offset(), 12);
        assert_eq!(attribs[2].interpretation(), Interpretation::Integer);
        assert_eq!(vbo.stride(), 16);

        let data = vbo.raw_data();
        assert_eq!(floats(&data[0..8]), [0.5, 1.5]);
        assert_eq!(&data[8..11], &[1, 2, 3]);
        assert_eq!(i32::from_ne_bytes([data[12], data[13], data[14], data[15]]), -7);
    }

    #[test]
    fn glsl_types() {
        assert_eq!(decode_glsl_type("float"), Some((Interpretation::Float, 1, 1)));
        assert_eq!(decode_glsl_type("vec3"), Some((Interpretation::Float, 3, 1)));
        assert_eq!(decode_glsl_type("int"), Some((Interpretation::Integer, 1, 1)));
        assert_eq!(decode_glsl_type("uvec4"), Some((Interpretation::Integer, 4, 1)));
        assert_eq!(decode_glsl_type("uint"), Some((Interpretation::Integer, 1, 1)));
        assert_eq!(decode_glsl_type("dvec2"), Some((Interpretation::Double, 2, 1)));
        assert_eq!(decode_glsl_type("double"), Some((Interpretation::Double, 1, 1)));
        assert_eq!(decode_glsl_type("mat3"), Some((Interpretation::Float, 3, 3)));
        assert_eq!(decode_glsl_type("mat2x4"), Some((Interpretation::Float, 4, 2)));
        assert_eq!(decode_glsl_type("vec5"), None);
        assert_eq!(decode_glsl_type("imat2"), None);
        assert_eq!(decode_glsl_type("potato"), None);
    }

    #[test]
    fn matrix_columns() {
        let vbo: Vbo = "m/float/mat2x3/0 m/float/mat2x3/1\n\
                        1 2 3 4 5 6\n".parse().unwrap();

        assert_eq!(vbo.attribs()[1].column(), 1);
        assert_eq!(vbo.attribs()[1].offset(), 12);
        assert_eq!(floats(vbo.raw_data()), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        assert_eq!(
            "m/float/mat2\n".parse::<Vbo>(),
            Err(Error::InvalidHeader("Matrix attributes need a column index: m/float/mat2".into())),
        );
        assert!(matches!("m/float/mat2/2\n".parse::<Vbo>(), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn bad_headers() {
        assert_eq!(
            "pos/float\n".parse::<Vbo>(),
            Err(Error::InvalidHeader(
                "Column headers must be in the form name/type/glsl_type[/column]. Got: pos/float"
                    .into()
            )),
        );
        assert_eq!(
            "pos/quad/vec2\n".parse::<Vbo>(),
            Err(Error::InvalidHeader("Unknown GL type: quad".into())),
        );
        assert!(matches!("pos/float/0\n".parse::<Vbo>(), Err(Error::InvalidHeader(_))));
        assert!(matches!("pos/float/ivec2\n".parse::<Vbo>(), Err(Error::InvalidHeader(_))));
        assert!(matches!("pos/float/dvec2\n".parse::<Vbo>(), Err(Error::InvalidHeader(_))));
        assert!(matches!("a/float/2 a/float/2\n".parse::<Vbo>(), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn bad_data() {
        assert!(matches!("p/float/vec2\n1\n".parse::<Vbo>(), Err(Error::InvalidData(_))));
        assert!(matches!("p/float/vec2\n1 2 3\n".parse::<Vbo>(), Err(Error::InvalidData(_))));
        assert!(matches!("p/ubyte/1\n256\n".parse::<Vbo>(), Err(Error::InvalidData(_))));
        assert!(matches!("p/float/1\n1x\n".parse::<Vbo>(), Err(Error::InvalidData(_))));
        assert!(matches!("".parse::<Vbo>(), Err(Error::InvalidData(_))));
    }
}
