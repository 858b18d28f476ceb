/*!
Test supports module.

*/

#![allow(dead_code)]

use std::env;
use std::path::PathBuf;

use shader_runner::backend::glutin::GlutinFactory;
use shader_runner::{Config, Runner};

/// Returns true if the tests needing a display should run.
pub fn gl_tests_enabled() -> bool {
    env::var("SHADER_RUNNER_GL_TESTS").is_ok()
}

/// Builds a runner with the default configuration and quiet output.
pub fn build_runner() -> Runner<GlutinFactory> {
    let mut config = Config::new();
    config.set_quiet(true);

    let factory = GlutinFactory::new(config.window_size());

    Runner::new(config, factory)
}

/// Path of one of the scripts under `tests/scripts`.
pub fn script_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("scripts")
        .join(format!("{}.shader_test", name))
}
