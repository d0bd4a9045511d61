//! Test results and the run summary.

use std::fmt;

const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const RESET: &str = "\x1b[0m";

/// Outcome of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    /// Configuration-dependent result; never counted as pass or fail.
    Informational,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => write!(f, "{GREEN}[PASS]{RESET}"),
            Verdict::Failed => write!(f, "{RED}[FAIL]{RESET}"),
            Verdict::Informational => write!(f, "{BLUE}[INFO]{RESET}"),
        }
    }
}

/// One recorded test case. Never changed after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub name: String,
    pub verdict: Verdict,
    pub message: String,
}

/// Results of a harness run, in execution order.
#[derive(Debug, Default)]
pub struct Report {
    results: Vec<TestResult>,
    verbose: bool,
}

impl Report {
    /// A report that prints each result as it is recorded.
    pub fn verbose() -> Self {
        Self {
            results: Vec::new(),
            verbose: true,
        }
    }

    pub fn quiet() -> Self {
        Self::default()
    }

    /// Print a suite banner.
    pub fn section(&self, title: &str) {
        if self.verbose {
            let rule = "=".repeat(50);
            println!("\n{BLUE}{rule}{RESET}\n{BLUE}{title}{RESET}\n{BLUE}{rule}{RESET}\n");
        }
    }

    pub fn record(&mut self, name: impl Into<String>, verdict: Verdict, message: impl Into<String>) {
        let result = TestResult {
            name: name.into(),
            verdict,
            message: message.into(),
        };
        if self.verbose {
            println!("{YELLOW}[TEST]{RESET} {}", result.name);
            println!("{} {}", result.verdict, result.message);
        }
        self.results.push(result);
    }

    pub fn pass(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.record(name, Verdict::Passed, message);
    }

    pub fn fail(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.record(name, Verdict::Failed, message);
    }

    pub fn info(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.record(name, Verdict::Informational, message);
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    fn count(&self, verdict: Verdict) -> usize {
        self.results.iter().filter(|r| r.verdict == verdict).count()
    }

    pub fn passed(&self) -> usize {
        self.count(Verdict::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(Verdict::Failed)
    }

    pub fn informational(&self) -> usize {
        self.count(Verdict::Informational)
    }

    /// Passed plus failed; informational results are not counted.
    pub fn total(&self) -> usize {
        self.passed() + self.failed()
    }

    /// Percentage of counted tests that passed, if any were counted.
    pub fn success_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.passed() as f64 * 100.0 / total as f64),
        }
    }

    /// 0 iff nothing failed.
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            0
        } else {
            1
        }
    }

    pub fn print_summary(&self) {
        let rule = "=".repeat(50);
        println!("\n{BLUE}{rule}{RESET}\n{BLUE}TEST SUMMARY{RESET}\n{BLUE}{rule}{RESET}\n");
        println!("Total Tests: {}", self.total());
        println!("{GREEN}Passed: {}{RESET}", self.passed());
        println!("{RED}Failed: {}{RESET}", self.failed());
        println!("Informational: {}", self.informational());

        if let Some(rate) = self.success_rate() {
            println!("\nSuccess Rate: {rate:.1}%");
        }

        if self.failed() == 0 {
            println!("\n{GREEN}All tests passed.{RESET}\n");
        } else {
            println!("\n{YELLOW}Some tests failed. Review the output above.{RESET}\n");
        }
    }
}
