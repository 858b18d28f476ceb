use std::ffi::CStr;
use std::iter::FromIterator;
use std::os::raw::c_char;

use fnv::FnvHashSet;

use crate::gl;
use crate::version::{Api, Version};

/// The set of extensions advertised by a context.
#[derive(Debug, Clone, Default)]
pub struct ExtensionsList {
    names: FnvHashSet<String>,
}

impl ExtensionsList {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ExtensionsList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> ExtensionsList {
        ExtensionsList {
            names: iter.into_iter().map(Into::into).filter(|s: &String| !s.is_empty()).collect(),
        }
    }
}

/// Returns the list of extensions supported by the backend.
///
/// The context must be current.
pub unsafe fn get_extensions(gl: &gl::Gl, version: &Version) -> ExtensionsList {
    get_extensions_strings(gl, version).into_iter().collect()
}

unsafe fn get_extensions_strings(gl: &gl::Gl, version: &Version) -> Vec<String> {
    if version >= &Version(Api::Gl, 3, 0) || version >= &Version(Api::GlEs, 3, 0) {
        let mut num_extensions = 0;
        gl.GetIntegerv(gl::NUM_EXTENSIONS, &mut num_extensions);

        (0 .. num_extensions).filter_map(|num| {
            let ext = gl.GetStringi(gl::EXTENSIONS, num as gl::types::GLuint);
            if ext.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ext as *const c_char).to_string_lossy().into_owned())
            }
        }).collect()

    } else {
        let list = gl.GetString(gl::EXTENSIONS);
        if list.is_null() {
            return Vec::new();
        }
        let list = CStr::from_ptr(list as *const c_char).to_string_lossy();
        list.split(' ').map(|e| e.to_owned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_legacy_string() {
        let list: ExtensionsList = "GL_ARB_foo GL_EXT_bar  GL_ARB_foo ".split(' ').collect();

        assert_eq!(list.len(), 2);
        assert!(list.contains("GL_ARB_foo"));
        assert!(list.contains("GL_EXT_bar"));
        assert!(!list.contains(""));
        assert!(!list.contains("GL_ARB_fo"));
    }
}
