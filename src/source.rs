use std::path::{Path, PathBuf};

/// Where the text of a script comes from.
#[derive(Clone, Debug)]
pub enum Data {
    File { filename: PathBuf },
    String { source: String },
}

/// A textual substitution applied to every line of a script before it is parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenReplacement {
    pub token: String,
    pub replacement: String,
}

/// A script to load. Reading the data is done by a [`Stream`](crate::stream::Stream).
#[derive(Clone, Debug)]
pub struct Source {
    data: Data,
    token_replacements: Vec<TokenReplacement>,
}

impl Source {
    pub fn from_file<P: Into<PathBuf>>(filename: P) -> Source {
        Source {
            data: Data::File { filename: filename.into() },
            token_replacements: Vec::new(),
        }
    }

    pub fn from_string<S: Into<String>>(source: S) -> Source {
        Source {
            data: Data::String { source: source.into() },
            token_replacements: Vec::new(),
        }
    }

    /// Replaces every occurrence of `token` with `replacement` when lines are read. Replacements
    /// are applied again to their own output.
    pub fn add_token_replacement<T, R>(&mut self, token: T, replacement: R)
        where T: Into<String>, R: Into<String>
    {
        self.token_replacements.push(TokenReplacement {
            token: token.into(),
            replacement: replacement.into(),
        });
    }

    pub fn token_replacements(&self) -> &[TokenReplacement] {
        &self.token_replacements
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Name to show to the user.
    pub fn filename(&self) -> String {
        match &self.data {
            Data::File { filename } => filename.display().to_string(),
            Data::String { .. } => "(string source)".to_owned(),
        }
    }

    /// Directory that relative paths inside the script are resolved against.
    pub fn directory(&self) -> &Path {
        match &self.data {
            Data::File { filename } => filename.parent().unwrap_or_else(|| Path::new(".")),
            Data::String { .. } => Path::new("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_directories() {
        let source = Source::from_file("tests/shaders/glsl-1.10/mix.shader_test");
        assert_eq!(source.filename(), "tests/shaders/glsl-1.10/mix.shader_test");
        assert_eq!(source.directory(), Path::new("tests/shaders/glsl-1.10"));

        let source = Source::from_string("[test]\n");
        assert_eq!(source.filename(), "(string source)");
        assert_eq!(source.directory(), Path::new("."));
    }

    #[test]
    fn replacements_keep_their_order() {
        let mut source = Source::from_string("");
        source.add_token_replacement("COLOR", "1 0 0 1");
        source.add_token_replacement("SIZE", "16");

        let tokens: Vec<_> = source.token_replacements().iter().map(|r| &r.token[..]).collect();
        assert_eq!(tokens, ["COLOR", "SIZE"]);
    }
}
