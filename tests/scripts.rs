/*!
Runs the scripts under `tests/scripts` against a real OpenGL implementation.

The winit event loop can only be created once per process and on the main thread, so this test
has no harness and runs every script with a single runner. It needs a display and only runs when
`SHADER_RUNNER_GL_TESTS` is set.

*/

mod support;

use std::process::ExitCode;

use shader_runner::TestResult;

/// Every script with the results it may produce. Scripts needing a recent GL are allowed to skip.
const SCRIPTS: &[(&str, &[TestResult])] = &[
    ("clear", &[TestResult::Pass]),
    ("uniform-color", &[TestResult::Pass]),
    ("wrong-color", &[TestResult::Fail]),
    ("unsupported-version", &[TestResult::Skip]),
    ("missing-extension", &[TestResult::Skip]),
    ("vertex-data", &[TestResult::Pass, TestResult::Skip]),
    ("texture-rgbw", &[TestResult::Pass]),
    ("texture-miptree", &[TestResult::Pass, TestResult::Skip]),
    ("fb-texture", &[TestResult::Pass]),
    ("probe-depth", &[TestResult::Pass]),
    ("link-error", &[TestResult::Pass]),
    ("ssbo-compute", &[TestResult::Pass, TestResult::Skip]),
];

fn main() -> ExitCode {
    if !support::gl_tests_enabled() {
        println!("SHADER_RUNNER_GL_TESTS is not set, skipping the GL scripts");
        return ExitCode::SUCCESS;
    }

    let mut runner = support::build_runner();
    let mut failures = 0;

    for &(name, expected) in SCRIPTS {
        let result = runner.run_file(&support::script_path(name));

        if expected.contains(&result) {
            println!("{} ... {}", name, result);
        } else {
            println!("{} ... {} (expected {:?})", name, result, expected);
            failures += 1;
        }
    }

    if failures > 0 {
        println!("{} script(s) gave an unexpected result", failures);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
