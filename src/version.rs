use std::cmp::Ordering;
use std::fmt;

/// Describes a version of OpenGL, OpenGL ES or one of their shading languages.
///
/// The minor number is kept as written for GL (`3.2` is `Version(Gl, 3, 2)`). Shading language
/// versions keep both digits of the minor number, so GLSL `1.30` is `Version(Gl, 1, 30)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Version(pub Api, pub u8, pub u8);

/// Describes the corresponding API.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Api {
    Gl,
    GlEs,
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        if self.0 != other.0 {
            return None;
        }

        match self.1.cmp(&other.1) {
            Ordering::Equal => Some(self.2.cmp(&other.2)),
            a => Some(a)
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Api::Gl => write!(f, "{}.{}", self.1, self.2),
            Api::GlEs => write!(f, "ES {}.{}", self.1, self.2),
        }
    }
}

/// Error returned when a version string can't be understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVersion(pub String);

impl fmt::Display for InvalidVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid version string “{}”", self.0)
    }
}

impl std::error::Error for InvalidVersion {}

/// Parses the leading `MAJOR.MINOR` of a string.
///
/// The number of digits of the minor part is preserved, ie `"1.30"` gives `(1, 30)` but `"3.0"`
/// gives `(3, 0)`. Anything after the minor digits is ignored.
pub fn parse_major_minor(s: &str) -> Result<(u8, u8), InvalidVersion> {
    let invalid = || InvalidVersion(s.to_owned());

    let s = s.trim_start();
    let (major, tail) = s.split_once('.').ok_or_else(invalid)?;
    let minor_len = tail.chars().take_while(char::is_ascii_digit).count();

    let major = major.parse::<u8>().map_err(|_| invalid())?;
    let minor = tail[..minor_len].parse::<u8>().map_err(|_| invalid())?;

    Ok((major, minor))
}

/// Parses the string returned by `glGetString(GL_VERSION)`.
///
/// Desktop drivers return `"4.6.0 NVIDIA 535.54"` and ES drivers return
/// `"OpenGL ES 3.2 Mesa 23.1"`.
pub fn parse_gl_version(version: &str) -> Result<Version, InvalidVersion> {
    let (api, tail) = match version.strip_prefix("OpenGL ES ") {
        Some(tail) => (Api::GlEs, tail),
        // Some ES 1 implementations insert a profile name
        None => match version.strip_prefix("OpenGL ES-") {
            Some(tail) => (Api::GlEs, tail.split_once(' ').map(|(_, t)| t).unwrap_or("")),
            None => (Api::Gl, version),
        },
    };

    let (major, minor) = parse_major_minor(tail)?;

    Ok(Version(api, major, minor))
}

/// Parses the string returned by `glGetString(GL_SHADING_LANGUAGE_VERSION)`.
pub fn parse_glsl_version(version: &str) -> Result<Version, InvalidVersion> {
    let (api, tail) = match version.strip_prefix("OpenGL ES GLSL ES ") {
        Some(tail) => (Api::GlEs, tail),
        None => (Api::Gl, version),
    };

    let (major, mut minor) = parse_major_minor(tail)?;

    // Old drivers report "1.1" instead of "1.10"
    if minor < 10 && !tail.trim_start()[2..].starts_with('0') {
        minor *= 10;
    }

    Ok(Version(api, major, minor))
}

/// Returns the minimum context version whose core shading language is `glsl`.
pub fn gl_version_for_glsl(glsl: Version) -> Version {
    match glsl {
        Version(Api::GlEs, 1, _) => Version(Api::GlEs, 2, 0),
        Version(Api::GlEs, major, minor) => Version(Api::GlEs, major, minor / 10),
        Version(Api::Gl, 1, minor) if minor <= 10 => Version(Api::Gl, 2, 0),
        Version(Api::Gl, 1, 20) => Version(Api::Gl, 2, 1),
        Version(Api::Gl, 1, 30) => Version(Api::Gl, 3, 0),
        Version(Api::Gl, 1, 40) => Version(Api::Gl, 3, 1),
        Version(Api::Gl, 1, _) => Version(Api::Gl, 3, 2),
        Version(Api::Gl, major, minor) => Version(Api::Gl, major, minor / 10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gl_version_strings() {
        assert_eq!(parse_gl_version("4.6.0 NVIDIA 535.54.03"), Ok(Version(Api::Gl, 4, 6)));
        assert_eq!(parse_gl_version("3.0 Mesa 23.1.4"), Ok(Version(Api::Gl, 3, 0)));
        assert_eq!(parse_gl_version("OpenGL ES 3.2 Mesa 23.1"), Ok(Version(Api::GlEs, 3, 2)));
        assert_eq!(parse_gl_version("OpenGL ES-CM 1.1"), Ok(Version(Api::GlEs, 1, 1)));
        assert!(parse_gl_version("banana").is_err());
    }

    #[test]
    fn glsl_version_strings() {
        assert_eq!(parse_glsl_version("4.60 NVIDIA"), Ok(Version(Api::Gl, 4, 60)));
        assert_eq!(parse_glsl_version("1.30"), Ok(Version(Api::Gl, 1, 30)));
        assert_eq!(parse_glsl_version("1.1"), Ok(Version(Api::Gl, 1, 10)));
        assert_eq!(
            parse_glsl_version("OpenGL ES GLSL ES 3.20"),
            Ok(Version(Api::GlEs, 3, 20)),
        );
    }

    #[test]
    fn ordering_only_within_an_api() {
        assert!(Version(Api::Gl, 3, 1) > Version(Api::Gl, 3, 0));
        assert!(Version(Api::Gl, 4, 0) > Version(Api::Gl, 3, 3));
        assert!(Version(Api::GlEs, 3, 0) >= Version(Api::GlEs, 3, 0));
        assert_eq!(Version(Api::Gl, 3, 0).partial_cmp(&Version(Api::GlEs, 3, 0)), None);
    }

    #[test]
    fn glsl_to_gl() {
        assert_eq!(gl_version_for_glsl(Version(Api::Gl, 1, 10)), Version(Api::Gl, 2, 0));
        assert_eq!(gl_version_for_glsl(Version(Api::Gl, 1, 30)), Version(Api::Gl, 3, 0));
        assert_eq!(gl_version_for_glsl(Version(Api::Gl, 1, 50)), Version(Api::Gl, 3, 2));
        assert_eq!(gl_version_for_glsl(Version(Api::Gl, 3, 30)), Version(Api::Gl, 3, 3));
        assert_eq!(gl_version_for_glsl(Version(Api::Gl, 4, 50)), Version(Api::Gl, 4, 5));
        assert_eq!(gl_version_for_glsl(Version(Api::GlEs, 1, 0)), Version(Api::GlEs, 2, 0));
        assert_eq!(gl_version_for_glsl(Version(Api::GlEs, 3, 10)), Version(Api::GlEs, 3, 1));
    }
}
