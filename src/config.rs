use std::path::{Path, PathBuf};

use crate::script::DEFAULT_WINDOW_SIZE;
use crate::source::TokenReplacement;

/// Settings shared by every script of a run.
#[derive(Debug, Clone)]
pub struct Config {
    window_size: (u32, u32),
    quiet: bool,
    image: Option<PathBuf>,
    token_replacements: Vec<TokenReplacement>,
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

impl Config {
    pub fn new() -> Config {
        Config {
            window_size: DEFAULT_WINDOW_SIZE,
            quiet: false,
            image: None,
            token_replacements: Vec::new(),
        }
    }

    /// Sets the size of the framebuffer for scripts that don't ask for one with `SIZE`.
    pub fn set_window_size(&mut self, window_size: (u32, u32)) {
        self.window_size = window_size;
    }

    /// Sets whether the per-script result lines should be left out. Errors are still printed.
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Sets a file to write the final rendering of each script to, as a PNG image. When several
    /// scripts run, the last one wins.
    pub fn set_image(&mut self, image: Option<PathBuf>) {
        self.image = image;
    }

    pub fn add_token_replacement<T, R>(&mut self, token: T, replacement: R)
        where T: Into<String>, R: Into<String>
    {
        self.token_replacements.push(TokenReplacement {
            token: token.into(),
            replacement: replacement.into(),
        });
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    pub fn token_replacements(&self) -> &[TokenReplacement] {
        &self.token_replacements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.window_size(), (250, 250));
        assert!(!config.quiet());
        assert!(config.image().is_none());
        assert!(config.token_replacements().is_empty());
    }

    #[test]
    fn replacements_keep_order() {
        let mut config = Config::new();
        config.add_token_replacement("FOO", "1");
        config.add_token_replacement("BAR", "FOO");

        let tokens: Vec<_> = config.token_replacements()
                                   .iter()
                                   .map(|r| (r.token.as_str(), r.replacement.as_str()))
                                   .collect();
        assert_eq!(tokens, [("FOO", "1"), ("BAR", "FOO")]);
    }
}
