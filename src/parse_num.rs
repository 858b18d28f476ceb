//! Number parsing with C semantics.
//!
//! Scripts are written against `strtol`/`strtod`, so integers may be given in decimal, octal
//! (`017`) or hexadecimal (`0x1f`), and floats may be given as a hexadecimal bit pattern
//! (`0x3f800000` is `1.0`). Every function returns the parsed value along with the unparsed tail
//! of the string.

use std::fmt;
use std::num::{ParseFloatError, ParseIntError};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The negative sign was used for an unsigned type.
    Negative,
    /// The value doesn't fit in the signed type.
    SignedOverflow,
    Int(ParseIntError),
    Float(ParseFloatError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Negative => write!(f, "number can’t be negative"),
            ParseError::SignedOverflow => write!(f, "number out of range for type"),
            ParseError::Int(e) => e.fmt(f),
            ParseError::Float(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseIntError> for ParseError {
    fn from(e: ParseIntError) -> ParseError {
        ParseError::Int(e)
    }
}

impl From<ParseFloatError> for ParseError {
    fn from(e: ParseFloatError) -> ParseError {
        ParseError::Float(e)
    }
}

struct Digits<'a> {
    negative: bool,
    radix: u32,
    digits: &'a str,
    tail: &'a str,
}

fn split_digits(s: &str) -> Digits {
    let s = s.trim_start_matches([' ', '\t']);

    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, s) = if let Some(tail) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (16, tail)
    } else if s.len() > 1 && s.starts_with('0') && s.as_bytes()[1].is_ascii_digit() {
        (8, &s[1..])
    } else {
        (10, s)
    };

    let len = s.chars().take_while(|c| c.is_digit(radix)).count();

    Digits { negative, radix, digits: &s[..len], tail: &s[len..] }
}

macro_rules! parse_unsigned {
    ($func:ident, $t:ident) => {
        pub fn $func(s: &str) -> Result<($t, &str), ParseError> {
            let d = split_digits(s);
            let value = $t::from_str_radix(d.digits, d.radix)?;

            if d.negative {
                Err(ParseError::Negative)
            } else {
                Ok((value, d.tail))
            }
        }
    };
}

macro_rules! parse_signed {
    ($func:ident, $st:ident, $ut:ident) => {
        pub fn $func(s: &str) -> Result<($st, &str), ParseError> {
            let d = split_digits(s);
            let magnitude = $ut::from_str_radix(d.digits, d.radix)?;

            if d.negative {
                if magnitude > $st::MAX as $ut + 1 {
                    Err(ParseError::SignedOverflow)
                } else {
                    Ok(((magnitude as $st).wrapping_neg(), d.tail))
                }
            } else if magnitude > $st::MAX as $ut {
                Err(ParseError::SignedOverflow)
            } else {
                Ok((magnitude as $st, d.tail))
            }
        }
    };
}

parse_unsigned!(parse_u8, u8);
parse_unsigned!(parse_u16, u16);
parse_unsigned!(parse_u32, u32);
parse_unsigned!(parse_u64, u64);
parse_signed!(parse_i8, i8, u8);
parse_signed!(parse_i16, i16, u16);
parse_signed!(parse_i32, i32, u32);
parse_signed!(parse_i64, i64, u64);

// Length of the longest prefix of `s` that is a decimal float, including the special words
fn float_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;

    if let Some(b'-' | b'+') = bytes.first() {
        i += 1;
    }

    for word in ["infinity", "inf", "nan"] {
        let end = i + word.len();
        if s.get(i..end).map_or(false, |w| w.eq_ignore_ascii_case(word)) {
            return end;
        }
    }

    let int_digits = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
    i += int_digits;

    let mut frac_digits = 0;
    if bytes.get(i) == Some(&b'.') {
        frac_digits = bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
        i += 1 + frac_digits;
    }

    if int_digits == 0 && frac_digits == 0 {
        return 0;
    }

    if let Some(b'e' | b'E') = bytes.get(i) {
        let mut j = i + 1;
        if let Some(b'-' | b'+') = bytes.get(j) {
            j += 1;
        }
        let exp_digits = bytes[j..].iter().take_while(|b| b.is_ascii_digit()).count();
        if exp_digits > 0 {
            i = j + exp_digits;
        }
    }

    i
}

fn is_hex_prefixed(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    s.starts_with("0x") || s.starts_with("0X")
}

/// Parses a float. A hexadecimal number is taken as the bit pattern of the value.
pub fn parse_f32(s: &str) -> Result<(f32, &str), ParseError> {
    let s = s.trim_start();

    if is_hex_prefixed(s) {
        let (bits, tail) = parse_u32(s.strip_prefix('-').unwrap_or(s))?;
        let value = f32::from_bits(bits);
        return Ok((if s.starts_with('-') { -value } else { value }, tail));
    }

    let len = float_len(s);
    Ok((s[..len].parse::<f32>()?, &s[len..]))
}

/// Parses a double. A hexadecimal number is taken as the bit pattern of the value.
pub fn parse_f64(s: &str) -> Result<(f64, &str), ParseError> {
    let s = s.trim_start();

    if is_hex_prefixed(s) {
        let (bits, tail) = parse_u64(s.strip_prefix('-').unwrap_or(s))?;
        let value = f64::from_bits(bits);
        return Ok((if s.starts_with('-') { -value } else { value }, tail));
    }

    let len = float_len(s);
    Ok((s[..len].parse::<f64>()?, &s[len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned() {
        assert_eq!(parse_u32("42 tail"), Ok((42, " tail")));
        assert_eq!(parse_u32("  0x1F,"), Ok((31, ",")));
        assert_eq!(parse_u32("\t017"), Ok((15, "")));
        assert_eq!(parse_u32("0"), Ok((0, "")));
        assert_eq!(parse_u8("255"), Ok((255, "")));
        assert!(matches!(parse_u16("65536"), Err(ParseError::Int(_))));
        assert_eq!(parse_u64(&u64::MAX.to_string()), Ok((u64::MAX, "")));
        assert_eq!(parse_u32("-1"), Err(ParseError::Negative));
        assert!(matches!(parse_u32("4294967296"), Err(ParseError::Int(_))));
        assert!(matches!(parse_u32(""), Err(ParseError::Int(_))));
    }

    #[test]
    fn signed() {
        assert_eq!(parse_i32("-12)"), Ok((-12, ")")));
        assert_eq!(parse_i32("+7"), Ok((7, "")));
        assert_eq!(parse_i32("-0x10"), Ok((-16, "")));
        assert_eq!(parse_i32(&i32::MIN.to_string()), Ok((i32::MIN, "")));
        assert_eq!(parse_i64(&i64::MIN.to_string()), Ok((i64::MIN, "")));
        assert_eq!(parse_i8("-128"), Ok((-128, "")));
        assert_eq!(parse_i16("0x7fff"), Ok((32767, "")));
        assert_eq!(parse_i8("128"), Err(ParseError::SignedOverflow));
        assert_eq!(parse_i32("2147483648"), Err(ParseError::SignedOverflow));
        assert_eq!(parse_i32("-2147483649"), Err(ParseError::SignedOverflow));
    }

    #[test]
    fn floats() {
        assert_eq!(parse_f32("1.5 2"), Ok((1.5, " 2")));
        assert_eq!(parse_f32(" -.25,"), Ok((-0.25, ",")));
        assert_eq!(parse_f32("3."), Ok((3.0, "")));
        assert_eq!(parse_f32("1e3x"), Ok((1000.0, "x")));
        assert_eq!(parse_f32("2e"), Ok((2.0, "e")));
        assert_eq!(parse_f64("7)"), Ok((7.0, ")")));
        assert!(parse_f32("inf").unwrap().0.is_infinite());
        assert!(parse_f32("-Infinity").unwrap().0 < 0.0);
        assert!(parse_f64("NaN").unwrap().0.is_nan());
        assert!(matches!(parse_f32(""), Err(ParseError::Float(_))));
        assert!(matches!(parse_f32(", 1"), Err(ParseError::Float(_))));
    }

    #[test]
    fn hex_floats_are_bit_patterns() {
        assert_eq!(parse_f32("0x3f800000"), Ok((1.0, "")));
        assert_eq!(parse_f32("-0x40000000 z"), Ok((-2.0, " z")));
        assert_eq!(parse_f64("0x3FF0000000000000"), Ok((1.0, "")));
    }
}
