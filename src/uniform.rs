//! GLSL value types used by the `uniform`, `ssbo subdata` and `probe ssbo` commands.

use std::fmt;

use smallvec::SmallVec;

use crate::parse_num::{self, ParseError};
use crate::tolerance::Tolerance;

/// Scalar type of the components of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Float,
    Double,
    Int,
    UInt,
    /// Set with the integer entry points.
    Bool,
}

impl BaseType {
    pub fn size(self) -> usize {
        match self {
            BaseType::Double => 8,
            BaseType::Float | BaseType::Int | BaseType::UInt | BaseType::Bool => 4,
        }
    }
}

/// A GLSL scalar, vector or matrix type.
///
/// Vectors have one column. Matrices are stored column by column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformType {
    pub base_type: BaseType,
    pub columns: usize,
    pub rows: usize,
}

impl UniformType {
    /// Parses a GLSL type name such as `float`, `ivec3`, `bool`, `mat3x2` or `dmat4`.
    ///
    /// Sampler and image types such as `sampler2D` or `uimage3D` are plain `int`s.
    pub fn from_glsl_name(name: &str) -> Option<UniformType> {
        let scalar = |base_type| Some(UniformType { base_type, columns: 1, rows: 1 });

        match name {
            "float" => return scalar(BaseType::Float),
            "double" => return scalar(BaseType::Double),
            "int" => return scalar(BaseType::Int),
            "uint" => return scalar(BaseType::UInt),
            "bool" => return scalar(BaseType::Bool),
            _ => (),
        }

        // samplers and images are set with the number of their unit
        let is_opaque = |s: &str| s.starts_with("sampler") || s.starts_with("image");
        if is_opaque(name) || name.strip_prefix(['i', 'u']).map_or(false, is_opaque) {
            return scalar(BaseType::Int);
        }

        let size = |s: &str| match s.parse::<usize>() {
            Ok(n @ 2..=4) => Some(n),
            _ => None,
        };

        let (base_type, tail) = match name.as_bytes().first()? {
            b'd' => (BaseType::Double, &name[1..]),
            b'i' => (BaseType::Int, &name[1..]),
            b'u' => (BaseType::UInt, &name[1..]),
            b'b' => (BaseType::Bool, &name[1..]),
            _ => (BaseType::Float, name),
        };

        if let Some(rows) = tail.strip_prefix("vec") {
            return Some(UniformType { base_type, columns: 1, rows: size(rows)? });
        }

        let dims = tail.strip_prefix("mat")?;

        if !matches!(base_type, BaseType::Float | BaseType::Double) {
            return None;
        }

        let (columns, rows) = match dims.split_once('x') {
            Some((columns, rows)) => (size(columns)?, size(rows)?),
            None => (size(dims)?, size(dims)?),
        };

        Some(UniformType { base_type, columns, rows })
    }

    pub fn n_components(&self) -> usize {
        self.columns * self.rows
    }

    pub fn is_matrix(&self) -> bool {
        self.columns > 1
    }

    /// Size of one tightly packed value.
    pub fn size(&self) -> usize {
        self.n_components() * self.base_type.size()
    }

    /// Parses whitespace-separated values until the end of the string.
    ///
    /// Any non-zero multiple of the number of components is accepted so that whole arrays can be
    /// set at once.
    pub fn parse_values(&self, s: &str) -> Result<Values, ValuesError> {
        let mut values = Values::new(self.base_type);
        let mut tail = s;

        loop {
            tail = tail.trim_start();
            if tail.is_empty() {
                break;
            }
            tail = values.push_parsed(tail)?;
            if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
                return Err(ValuesError::Garbage(tail.trim_end().to_owned()));
            }
        }

        let n_components = self.n_components();

        if values.is_empty() || values.len() % n_components != 0 {
            return Err(ValuesError::Count { expected: n_components, found: values.len() });
        }

        Ok(values)
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.base_type {
            BaseType::Float => "",
            BaseType::Double => "d",
            BaseType::Int => "i",
            BaseType::UInt => "u",
            BaseType::Bool => "b",
        };

        if self.is_matrix() {
            write!(f, "{}mat{}x{}", prefix, self.columns, self.rows)
        } else if self.rows > 1 {
            write!(f, "{}vec{}", prefix, self.rows)
        } else {
            match self.base_type {
                BaseType::Float => write!(f, "float"),
                BaseType::Double => write!(f, "double"),
                BaseType::Int => write!(f, "int"),
                BaseType::UInt => write!(f, "uint"),
                BaseType::Bool => write!(f, "bool"),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValuesError {
    Number(ParseError),
    Garbage(String),
    Count { expected: usize, found: usize },
}

impl fmt::Display for ValuesError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValuesError::Number(e) => e.fmt(f),
            ValuesError::Garbage(s) => write!(f, "Invalid value: {}", s),
            ValuesError::Count { expected, found } => {
                write!(f, "Expected a multiple of {} values but got {}", expected, found)
            },
        }
    }
}

impl std::error::Error for ValuesError {}

impl From<ParseError> for ValuesError {
    fn from(e: ParseError) -> ValuesError {
        ValuesError::Number(e)
    }
}

/// A list of components, kept in the representation GL expects for their type.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Float(SmallVec<[f32; 16]>),
    Double(SmallVec<[f64; 16]>),
    Int(SmallVec<[i32; 16]>),
    UInt(SmallVec<[u32; 16]>),
}

impl Values {
    fn new(base_type: BaseType) -> Values {
        match base_type {
            BaseType::Float => Values::Float(SmallVec::new()),
            BaseType::Double => Values::Double(SmallVec::new()),
            BaseType::Int | BaseType::Bool => Values::Int(SmallVec::new()),
            BaseType::UInt => Values::UInt(SmallVec::new()),
        }
    }

    fn push_parsed<'a>(&mut self, s: &'a str) -> Result<&'a str, ParseError> {
        match self {
            Values::Float(v) => parse_num::parse_f32(s).map(|(value, tail)| { v.push(value); tail }),
            Values::Double(v) => parse_num::parse_f64(s).map(|(value, tail)| { v.push(value); tail }),
            Values::Int(v) => parse_num::parse_i32(s).map(|(value, tail)| { v.push(value); tail }),
            Values::UInt(v) => parse_num::parse_u32(s).map(|(value, tail)| { v.push(value); tail }),
        }
    }

    /// Reads values back from a buffer.
    pub fn from_bytes(base_type: BaseType, bytes: &[u8]) -> Values {
        let mut values = Values::new(base_type);
        let size = base_type.size();

        for chunk in bytes.chunks_exact(size) {
            match &mut values {
                Values::Float(v) => {
                    v.push(f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                },
                Values::Int(v) => {
                    v.push(i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                },
                Values::UInt(v) => {
                    v.push(u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                },
                Values::Double(v) => {
                    let mut bytes = [0; 8];
                    bytes.copy_from_slice(chunk);
                    v.push(f64::from_ne_bytes(bytes))
                },
            }
        }

        values
    }

    pub fn len(&self) -> usize {
        match self {
            Values::Float(v) => v.len(),
            Values::Double(v) => v.len(),
            Values::Int(v) => v.len(),
            Values::UInt(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of a component in bytes.
    pub fn component_size(&self) -> usize {
        match self {
            Values::Double(_) => 8,
            Values::Float(_) | Values::Int(_) | Values::UInt(_) => 4,
        }
    }

    /// Native-endian bytes of the component at `index`.
    pub fn component_bytes(&self, index: usize) -> SmallVec<[u8; 8]> {
        match self {
            Values::Float(v) => SmallVec::from_slice(&v[index].to_ne_bytes()),
            Values::Double(v) => SmallVec::from_slice(&v[index].to_ne_bytes()),
            Values::Int(v) => SmallVec::from_slice(&v[index].to_ne_bytes()),
            Values::UInt(v) => SmallVec::from_slice(&v[index].to_ne_bytes()),
        }
    }

    /// The components tightly packed in native byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.len()).flat_map(|i| self.component_bytes(i)).collect()
    }

    /// Compares every component of `observed` with the matching component of `self`.
    pub fn compare(&self, observed: &Values, comparison: Comparison, tolerance: &Tolerance)
                   -> bool
    {
        fn all<T: Copy>(a: &[T], b: &[T], f: impl Fn(usize, T, T) -> bool) -> bool {
            a.len() == b.len() && a.iter().zip(b).enumerate().all(|(i, (&a, &b))| f(i, a, b))
        }

        match (observed, self) {
            (Values::Float(o), Values::Float(e)) => all(o, e, |i, o, e| {
                comparison.compare_fuzzy(tolerance, i % 4, o as f64, e as f64)
            }),
            (Values::Double(o), Values::Double(e)) => all(o, e, |i, o, e| {
                comparison.compare_fuzzy(tolerance, i % 4, o, e)
            }),
            (Values::Int(o), Values::Int(e)) => all(o, e, |_, o, e| comparison.compare(o, e)),
            (Values::UInt(o), Values::UInt(e)) => all(o, e, |_, o, e| comparison.compare(o, e)),
            _ => false,
        }
    }
}

impl fmt::Display for Values {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter, values: &[T]) -> fmt::Result {
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", value)?;
            }
            Ok(())
        }

        match self {
            Values::Float(v) => list(f, v),
            Values::Double(v) => list(f, v),
            Values::Int(v) => list(f, v),
            Values::UInt(v) => list(f, v),
        }
    }
}

/// Operator used by probes and requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// The values are exactly equal.
    Equal,
    /// Floating-point values are within the tolerance. Same as `Equal` for integers.
    FuzzyEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

static OPERATORS: [(&str, Comparison); 7] = [
    ("==", Comparison::Equal),
    ("~=", Comparison::FuzzyEqual),
    ("!=", Comparison::NotEqual),
    ("<", Comparison::Less),
    ("<=", Comparison::LessEqual),
    (">", Comparison::Greater),
    (">=", Comparison::GreaterEqual),
];

impl Comparison {
    pub fn from_operator(operator: &str) -> Option<Comparison> {
        OPERATORS.iter().find(|&&(op, _)| op == operator).map(|&(_, c)| c)
    }

    pub fn operator(self) -> &'static str {
        OPERATORS.iter().find(|&&(_, c)| c == self).map_or("?", |&(op, _)| op)
    }

    pub fn compare<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            Comparison::Equal | Comparison::FuzzyEqual => a == b,
            Comparison::NotEqual => a != b,
            Comparison::Less => a < b,
            Comparison::LessEqual => a <= b,
            Comparison::Greater => a > b,
            Comparison::GreaterEqual => a >= b,
        }
    }

    fn compare_fuzzy(self, tolerance: &Tolerance, component: usize, a: f64, b: f64) -> bool {
        match self {
            Comparison::FuzzyEqual => tolerance.equal(component, a, b),
            _ => self.compare(a, b),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.operator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn type_names() {
        let check = |name: &str, base_type, columns, rows| {
            let t = UniformType::from_glsl_name(name).unwrap();
            assert_eq!(t, UniformType { base_type, columns, rows }, "{}", name);
            assert_eq!(UniformType::from_glsl_name(&t.to_string()), Some(t));
        };

        check("float", BaseType::Float, 1, 1);
        check("vec4", BaseType::Float, 1, 4);
        check("ivec2", BaseType::Int, 1, 2);
        check("uint", BaseType::UInt, 1, 1);
        check("bvec3", BaseType::Bool, 1, 3);
        check("double", BaseType::Double, 1, 1);
        check("dvec3", BaseType::Double, 1, 3);
        check("mat3", BaseType::Float, 3, 3);
        check("mat2x4", BaseType::Float, 2, 4);
        check("dmat4x3", BaseType::Double, 4, 3);

        assert_eq!(UniformType::from_glsl_name("vec5"), None);
        assert_eq!(UniformType::from_glsl_name("imat2"), None);
        assert_eq!(UniformType::from_glsl_name(""), None);
    }

    #[test]
    fn opaque_type_names() {
        let int = UniformType { base_type: BaseType::Int, columns: 1, rows: 1 };

        for name in ["sampler2D", "samplerCube", "sampler2DShadow", "isampler3D",
                     "usampler2DArray", "image2D", "iimage1D", "uimageBuffer"] {
            assert_eq!(UniformType::from_glsl_name(name), Some(int), "{}", name);
        }

        assert_eq!(int.parse_values("3"), Ok(Values::Int(smallvec![3])));
        assert_eq!(UniformType::from_glsl_name("xsampler2D"), None);
        assert_eq!(UniformType::from_glsl_name("isampler"), Some(int));
    }

    #[test]
    fn parse_values() {
        let vec4 = UniformType::from_glsl_name("vec4").unwrap();
        assert_eq!(
            vec4.parse_values(" 1 0.5 0x3f800000 -2 "),
            Ok(Values::Float(smallvec![1.0, 0.5, 1.0, -2.0])),
        );
        assert_eq!(
            vec4.parse_values("1 2 3"),
            Err(ValuesError::Count { expected: 4, found: 3 }),
        );
        assert_eq!(
            vec4.parse_values("1 2 3 4z"),
            Err(ValuesError::Garbage("z".to_owned())),
        );

        let int = UniformType::from_glsl_name("int").unwrap();
        assert_eq!(int.parse_values("1 -2 3"), Ok(Values::Int(smallvec![1, -2, 3])));
        assert!(matches!(int.parse_values("1.5"), Err(ValuesError::Garbage(_))));
        assert_eq!(int.parse_values(""), Err(ValuesError::Count { expected: 1, found: 0 }));

        let uint = UniformType::from_glsl_name("uint").unwrap();
        assert!(matches!(uint.parse_values("-1"), Err(ValuesError::Number(_))));
    }

    #[test]
    fn bytes() {
        let values = Values::UInt(smallvec![1, 0xdeadbeef]);
        let bytes = values.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(Values::from_bytes(BaseType::UInt, &bytes), values);

        let values = Values::Double(smallvec![0.25]);
        assert_eq!(Values::from_bytes(BaseType::Double, &values.to_bytes()), values);
    }

    #[test]
    fn comparisons() {
        assert_eq!(Comparison::from_operator(">="), Some(Comparison::GreaterEqual));
        assert_eq!(Comparison::from_operator("=>"), None);
        assert_eq!(Comparison::LessEqual.to_string(), "<=");

        let tolerance = Tolerance::new([0.1; 4], false);
        let expected = Values::Float(smallvec![1.0, 2.0]);
        let close = Values::Float(smallvec![1.05, 1.95]);

        assert!(!expected.compare(&close, Comparison::Equal, &tolerance));
        assert!(expected.compare(&close, Comparison::FuzzyEqual, &tolerance));
        assert!(expected.compare(&close, Comparison::NotEqual, &tolerance));

        let expected = Values::Int(smallvec![5]);
        assert!(expected.compare(&Values::Int(smallvec![3]), Comparison::Less, &tolerance));
        assert!(!expected.compare(&Values::Int(smallvec![5]), Comparison::Greater, &tolerance));
        assert!(!expected.compare(&Values::UInt(smallvec![5]), Comparison::Equal, &tolerance));
    }
}
