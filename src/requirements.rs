//! The `[require]` section.
//!
//! The requirements are known before any context exists. They decide which kind of context to
//! create and are then checked against the context that was actually obtained.

use std::fmt;

use crate::context::{CapabilitiesSource, ContextRequest, Profile};
use crate::enums;
use crate::uniform::Comparison;
use crate::version::{self, Api, Version};

#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// `GL [ES|CORE|COMPAT] op N.N`
    GlVersion {
        api: Api,
        profile: Option<Profile>,
        comparison: Comparison,
        version: (u8, u8),
    },
    /// `GLSL [ES] op N.NN`
    GlslVersion {
        api: Api,
        comparison: Comparison,
        version: Version,
    },
    /// `GL_ARB_foo` or `!GL_ARB_foo`
    Extension {
        name: String,
        present: bool,
    },
    /// `GL_MAX_FOO op N`
    Limit {
        name: String,
        comparison: Comparison,
        value: i64,
    },
}

/// Error returned for a line that isn't a valid requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRequirement(pub String);

impl fmt::Display for InvalidRequirement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidRequirement {}

/// A requirement that the context doesn't satisfy. The script is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmet(pub String);

impl fmt::Display for Unmet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Unmet {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Requirements {
    requirements: Vec<Requirement>,
    size: Option<(u32, u32)>,
}

fn is_extension_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_comparison(operator: &str) -> Result<Comparison, InvalidRequirement> {
    match Comparison::from_operator(operator) {
        Some(Comparison::FuzzyEqual) | None => {
            Err(InvalidRequirement(format!("Invalid comparison operator “{}”", operator)))
        },
        Some(comparison) => Ok(comparison),
    }
}

fn api_name(api: Api) -> &'static str {
    match api {
        Api::Gl => "OpenGL",
        Api::GlEs => "OpenGL ES",
    }
}

impl Requirements {
    pub fn new() -> Requirements {
        Default::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter()
    }

    /// Framebuffer size requested with `SIZE`.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    pub fn add(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    /// Parses one line of the section with the comments already removed.
    pub fn parse_line(&mut self, line: &str) -> Result<(), InvalidRequirement> {
        let words: Vec<&str> = line.split_whitespace().collect();

        let requirement = match words.as_slice() {
            [] => return Ok(()),
            ["GL", rest @ ..] => {
                let (api, profile, rest) = match rest {
                    ["ES", rest @ ..] => (Api::GlEs, None, rest),
                    ["CORE", rest @ ..] => (Api::Gl, Some(Profile::Core), rest),
                    ["COMPAT", rest @ ..] => (Api::Gl, Some(Profile::Compatibility), rest),
                    rest => (Api::Gl, None, rest),
                };
                let (operator, number) = match rest {
                    [operator, number] => (operator, number),
                    _ => return Err(InvalidRequirement(format!("Invalid GL requirement: {}", line))),
                };
                let version = version::parse_major_minor(number)
                    .map_err(|e| InvalidRequirement(e.to_string()))?;
                Requirement::GlVersion {
                    api,
                    profile,
                    comparison: parse_comparison(operator)?,
                    version,
                }
            },
            ["GLSL", rest @ ..] => {
                let (api, rest) = match rest {
                    ["ES", rest @ ..] => (Api::GlEs, rest),
                    rest => (Api::Gl, rest),
                };
                let (operator, number) = match rest {
                    [operator, number] => (operator, number),
                    _ => {
                        return Err(InvalidRequirement(format!("Invalid GLSL requirement: {}", line)));
                    },
                };
                let Version(_, major, minor) = version::parse_glsl_version(number)
                    .map_err(|e| InvalidRequirement(e.to_string()))?;
                Requirement::GlslVersion {
                    api,
                    comparison: parse_comparison(operator)?,
                    version: Version(api, major, minor),
                }
            },
            ["SIZE", width, height] => {
                match (width.parse::<u32>(), height.parse::<u32>()) {
                    (Ok(w), Ok(h)) if w > 0 && h > 0 => {
                        self.size = Some((w, h));
                        return Ok(());
                    },
                    _ => return Err(InvalidRequirement(format!("Invalid SIZE: {}", line))),
                }
            },
            [name, operator, value] if Comparison::from_operator(operator).is_some() => {
                if enums::lookup(name).is_none() {
                    return Err(InvalidRequirement(format!("Unknown limit “{}”", name)));
                }
                let value = match value.parse::<i64>() {
                    Ok(v) => v,
                    Err(_) => return Err(InvalidRequirement(format!("Invalid limit value “{}”", value))),
                };
                Requirement::Limit {
                    name: name.to_string(),
                    comparison: parse_comparison(operator)?,
                    value,
                }
            },
            [name] => {
                let (present, name) = match name.strip_prefix('!') {
                    Some(name) => (false, name),
                    None => (true, *name),
                };
                if !is_extension_name(name) {
                    return Err(InvalidRequirement(format!("Invalid extension name “{}”", name)));
                }
                Requirement::Extension { name: name.to_owned(), present }
            },
            _ => return Err(InvalidRequirement(format!("Invalid require line: {}", line))),
        };

        self.requirements.push(requirement);

        Ok(())
    }

    fn api(&self) -> Api {
        let es = self.requirements.iter().any(|r| matches!(
            r,
            Requirement::GlVersion { api: Api::GlEs, .. } |
            Requirement::GlslVersion { api: Api::GlEs, .. }
        ));

        if es { Api::GlEs } else { Api::Gl }
    }

    /// The kind of context to create for these requirements.
    ///
    /// The version is the highest minimum implied by a GL or GLSL requirement. A profile is only
    /// requested when a `GL CORE` or `GL COMPAT` line asks for one.
    pub fn context_request(&self) -> ContextRequest {
        let api = self.api();
        let mut version: Option<(u8, u8)> = None;
        let mut profile = None;

        let mut raise = |v: (u8, u8)| {
            if version.map_or(true, |current| v > current) {
                version = Some(v);
            }
        };

        for requirement in &self.requirements {
            match *requirement {
                Requirement::GlVersion { api: req_api, profile: req_profile, comparison, version }
                    if req_api == api =>
                {
                    if matches!(comparison, Comparison::Equal |
                                            Comparison::GreaterEqual |
                                            Comparison::Greater)
                    {
                        raise(version);
                    }
                    if req_profile.is_some() {
                        profile = req_profile;
                    }
                },
                Requirement::GlslVersion { api: req_api, comparison, version }
                    if req_api == api =>
                {
                    if matches!(comparison, Comparison::Equal |
                                            Comparison::GreaterEqual |
                                            Comparison::Greater)
                    {
                        let Version(_, major, minor) = version::gl_version_for_glsl(version);
                        raise((major, minor));
                    }
                },
                _ => (),
            }
        }

        if api == Api::GlEs && version.is_none() {
            version = Some((2, 0));
        }

        ContextRequest { api, version, profile }
    }

    /// The highest minimum GLSL version the script asks for, which its shaders are written for.
    pub fn glsl_version(&self) -> Option<Version> {
        self.requirements
            .iter()
            .filter_map(|requirement| match *requirement {
                Requirement::GlslVersion { comparison, version, .. }
                    if matches!(comparison, Comparison::Equal |
                                            Comparison::GreaterEqual |
                                            Comparison::Greater) => Some(version),
                _ => None,
            })
            .max_by_key(|&Version(_, major, minor)| (major, minor))
    }

    /// Checks every requirement against a context. Returns the first one that isn't met.
    pub fn check(&self, caps: &dyn CapabilitiesSource) -> Result<(), Unmet> {
        for requirement in &self.requirements {
            check_requirement(requirement, caps)?;
        }

        Ok(())
    }
}

fn check_requirement(requirement: &Requirement, caps: &dyn CapabilitiesSource)
                     -> Result<(), Unmet>
{
    match requirement {
        Requirement::GlVersion { api, profile, comparison, version } => {
            let &Version(actual_api, major, minor) = caps.get_version();

            if actual_api != *api {
                return Err(Unmet(format!(
                    "Test requires {} but the context is {}",
                    api_name(*api),
                    api_name(actual_api),
                )));
            }
            if !comparison.compare((major, minor), *version) {
                return Err(Unmet(format!(
                    "Test requires GL version {} {}.{}, but actual version is {}.{}",
                    comparison, version.0, version.1, major, minor,
                )));
            }
            if let Some(profile) = *profile {
                match caps.get_profile() {
                    Some(actual) if actual == profile => (),
                    Some(actual) => return Err(Unmet(format!(
                        "Test requires a {} profile, but the context has a {} profile",
                        profile, actual,
                    ))),
                    None => return Err(Unmet(format!(
                        "Test requires a {} profile, but the context has no profile",
                        profile,
                    ))),
                }
            }
        },
        Requirement::GlslVersion { api, comparison, version } => {
            let actual = match caps.get_glsl_version() {
                Some(v) => *v,
                None => return Err(Unmet("Test requires GLSL but there is no compiler".to_owned())),
            };

            if actual.0 != *api {
                return Err(Unmet(format!(
                    "Test requires GLSL for {} but the context is {}",
                    api_name(*api),
                    api_name(actual.0),
                )));
            }
            if !comparison.compare((actual.1, actual.2), (version.1, version.2)) {
                return Err(Unmet(format!(
                    "Test requires GLSL version {} {}.{:02}, but actual version is {}.{:02}",
                    comparison, version.1, version.2, actual.1, actual.2,
                )));
            }
        },
        Requirement::Extension { name, present } => {
            if caps.has_extension(name) != *present {
                return Err(Unmet(if *present {
                    format!("Test requires {}", name)
                } else {
                    format!("Test requires the absence of {}", name)
                }));
            }
        },
        Requirement::Limit { name, comparison, value } => {
            let actual = match caps.get_limit(name) {
                Some(v) => v,
                None => return Err(Unmet(format!("Can’t query {}", name))),
            };

            if !comparison.compare(actual, *value) {
                return Err(Unmet(format!(
                    "Test requires {} {} {}, but the limit is {}",
                    name, comparison, value, actual,
                )));
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeCaps {
        version: Version,
        glsl_version: Option<Version>,
        profile: Option<Profile>,
        extensions: Vec<&'static str>,
        limits: HashMap<&'static str, i64>,
    }

    impl CapabilitiesSource for FakeCaps {
        fn get_version(&self) -> &Version {
            &self.version
        }

        fn get_glsl_version(&self) -> Option<&Version> {
            self.glsl_version.as_ref()
        }

        fn has_extension(&self, name: &str) -> bool {
            self.extensions.iter().any(|&e| e == name)
        }

        fn get_profile(&self) -> Option<Profile> {
            self.profile
        }

        fn get_limit(&self, name: &str) -> Option<i64> {
            self.limits.get(name).copied()
        }
    }

    fn desktop_caps() -> FakeCaps {
        FakeCaps {
            version: Version(Api::Gl, 4, 5),
            glsl_version: Some(Version(Api::Gl, 4, 50)),
            profile: Some(Profile::Compatibility),
            extensions: vec!["GL_ARB_compute_shader", "GL_ARB_gpu_shader_fp64"],
            limits: [("GL_MAX_VERTEX_ATTRIBS", 16)].into_iter().collect(),
        }
    }

    fn parse(source: &str) -> Requirements {
        let mut requirements = Requirements::new();
        for line in source.lines() {
            requirements.parse_line(line).unwrap();
        }
        requirements
    }

    #[test]
    fn parse_lines() {
        let requirements = parse("GL >= 3.3\n\
                                  GLSL >= 1.50\n\
                                  GL_ARB_compute_shader\n\
                                  !GL_ARB_foo\n\
                                  GL_MAX_VERTEX_ATTRIBS > 8\n\
                                  SIZE 64 32\n");

        assert_eq!(requirements.size(), Some((64, 32)));
        assert_eq!(requirements.iter().collect::<Vec<_>>(), [
            &Requirement::GlVersion {
                api: Api::Gl,
                profile: None,
                comparison: Comparison::GreaterEqual,
                version: (3, 3),
            },
            &Requirement::GlslVersion {
                api: Api::Gl,
                comparison: Comparison::GreaterEqual,
                version: Version(Api::Gl, 1, 50),
            },
            &Requirement::Extension { name: "GL_ARB_compute_shader".into(), present: true },
            &Requirement::Extension { name: "GL_ARB_foo".into(), present: false },
            &Requirement::Limit {
                name: "GL_MAX_VERTEX_ATTRIBS".into(),
                comparison: Comparison::Greater,
                value: 8,
            },
        ]);
    }

    #[test]
    fn invalid_lines() {
        let check = |line: &str, message: &str| {
            let error = Requirements::new().parse_line(line).unwrap_err();
            assert_eq!(error.to_string(), message);
        };

        check("GL 3.3", "Invalid GL requirement: GL 3.3");
        check("GL => 3.3", "Invalid comparison operator “=>”");
        check("GL ~= 3.3", "Invalid comparison operator “~=”");
        check("GLSL >= 1", "invalid version string “1”");
        check("SIZE 0 10", "Invalid SIZE: SIZE 0 10");
        check("GL_MAX_BANANAS >= 3", "Unknown limit “GL_MAX_BANANAS”");
        check("GL_MAX_VERTEX_ATTRIBS >= x", "Invalid limit value “x”");
        check("GL-ARB-foo", "Invalid extension name “GL-ARB-foo”");
        check("what is this", "Invalid require line: what is this");
    }

    #[test]
    fn context_requests() {
        assert_eq!(Requirements::new().context_request(), ContextRequest::default());

        assert_eq!(parse("GL >= 3.0\nGLSL >= 1.50").context_request(), ContextRequest {
            api: Api::Gl,
            version: Some((3, 2)),
            profile: None,
        });

        assert_eq!(parse("GL CORE >= 3.1\nGL < 4.0").context_request(), ContextRequest {
            api: Api::Gl,
            version: Some((3, 1)),
            profile: Some(Profile::Core),
        });

        assert_eq!(parse("GLSL ES >= 3.10").context_request(), ContextRequest {
            api: Api::GlEs,
            version: Some((3, 1)),
            profile: None,
        });

        assert_eq!(parse("GL ES >= 2.0\nGLSL ES >= 1.00").context_request(), ContextRequest {
            api: Api::GlEs,
            version: Some((2, 0)),
            profile: None,
        });
    }

    #[test]
    fn glsl_versions() {
        assert_eq!(Requirements::new().glsl_version(), None);
        assert_eq!(parse("GLSL < 1.30").glsl_version(), None);
        assert_eq!(
            parse("GLSL >= 1.30\nGLSL >= 1.40\nGLSL < 4.00").glsl_version(),
            Some(Version(Api::Gl, 1, 40))
        );
    }

    #[test]
    fn met() {
        let caps = desktop_caps();

        assert_eq!(
            parse("GL >= 3.3\nGLSL >= 4.30\nGL_ARB_compute_shader\n!GL_ARB_foo\n\
                   GL_MAX_VERTEX_ATTRIBS >= 16\nGL COMPAT >= 2.0\nGL < 4.6").check(&caps),
            Ok(()),
        );
    }

    #[test]
    fn unmet() {
        let caps = desktop_caps();
        let check = |source: &str, message: &str| {
            assert_eq!(parse(source).check(&caps), Err(Unmet(message.to_owned())));
        };

        check("GL >= 4.6", "Test requires GL version >= 4.6, but actual version is 4.5");
        check("GLSL == 1.10", "Test requires GLSL version == 1.10, but actual version is 4.50");
        check("GL_ARB_foo", "Test requires GL_ARB_foo");
        check("!GL_ARB_gpu_shader_fp64", "Test requires the absence of GL_ARB_gpu_shader_fp64");
        check("GL_MAX_VERTEX_ATTRIBS > 16",
              "Test requires GL_MAX_VERTEX_ATTRIBS > 16, but the limit is 16");
        check("GL_MAX_TEXTURE_SIZE >= 16", "Can’t query GL_MAX_TEXTURE_SIZE");
        check("GL ES >= 3.0", "Test requires OpenGL ES but the context is OpenGL");
        check("GL CORE >= 3.2",
              "Test requires a core profile, but the context has a compatibility profile");
    }

    #[test]
    fn unmet_profile_without_one() {
        let caps = FakeCaps { version: Version(Api::Gl, 3, 0), profile: None, ..desktop_caps() };

        assert_eq!(
            parse("GL COMPAT >= 3.0").check(&caps),
            Err(Unmet("Test requires a compatibility profile, but the context has no profile"
                      .to_owned())),
        );
    }
}
