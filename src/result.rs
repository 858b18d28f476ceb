use std::fmt;

use serde_json::{json, Map, Value};

/// Outcome of a script, or of a whole run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TestResult {
    Pass,
    Fail,
    Skip,
    Warn,
}

impl TestResult {
    /// Combines two results.
    ///
    /// A failure always wins, then a warning, then a pass. A skip only survives if every result
    /// was skipped.
    pub fn merge(self, other: TestResult) -> TestResult {
        fn rank(result: TestResult) -> u8 {
            match result {
                TestResult::Skip => 0,
                TestResult::Pass => 1,
                TestResult::Warn => 2,
                TestResult::Fail => 3,
            }
        }

        if rank(other) > rank(self) { other } else { self }
    }

    pub fn name(self) -> &'static str {
        match self {
            TestResult::Pass => "pass",
            TestResult::Fail => "fail",
            TestResult::Skip => "skip",
            TestResult::Warn => "warn",
        }
    }

    /// The line Piglit's framework parses to collect the final result.
    pub fn protocol_line(self) -> String {
        format!("PIGLIT: {}", json!({ "result": self.name() }))
    }

    /// The line reporting the result of one subtest.
    pub fn subtest_protocol_line(self, subtest: &str) -> String {
        let mut results = Map::new();
        results.insert(subtest.to_owned(), Value::from(self.name()));
        format!("PIGLIT: {}", json!({ "subtest": results }))
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::TestResult::*;

    #[test]
    fn merge() {
        assert_eq!(Pass.merge(Pass), Pass);
        assert_eq!(Pass.merge(Skip), Pass);
        assert_eq!(Skip.merge(Pass), Pass);
        assert_eq!(Skip.merge(Skip), Skip);
        assert_eq!(Pass.merge(Warn), Warn);
        assert_eq!(Warn.merge(Skip), Warn);
        assert_eq!(Warn.merge(Fail), Fail);
        assert_eq!(Fail.merge(Pass), Fail);
        assert_eq!(Skip.merge(Fail), Fail);
    }

    #[test]
    fn protocol() {
        assert_eq!(Pass.protocol_line(), r#"PIGLIT: {"result":"pass"}"#);
        assert_eq!(
            Skip.subtest_protocol_line("tests/a \"b\".shader_test"),
            r#"PIGLIT: {"subtest":{"tests/a \"b\".shader_test":"skip"}}"#,
        );
    }
}
