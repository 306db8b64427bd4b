use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use crate::core::fail::FailHandler;

/// The state of a spec or setup node once it has been considered by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecState {
    Pending,
    Skipped,
    Passed,
    Failed,
    Panicked,
}

impl SpecState {
    /// Returns `true` if the spec failed or panicked.
    pub fn is_failure(&self) -> bool {
        matches!(self, SpecState::Failed | SpecState::Panicked)
    }

    /// Returns `true` if the spec body was not executed.
    pub fn is_not_run(&self) -> bool {
        matches!(self, SpecState::Pending | SpecState::Skipped)
    }
}

/// A source position, captured with `#[track_caller]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    pub file: String,
    pub line: u32,
}

impl CodeLocation {
    pub fn from_location(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }

    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A failed assertion or a recovered panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub location: CodeLocation,
    pub panic_payload: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>, location: CodeLocation) -> Self {
        Self {
            message: message.into(),
            location,
            panic_payload: None,
        }
    }

    pub fn from_panic(payload: impl Into<String>, location: CodeLocation) -> Self {
        let payload = payload.into();
        Self {
            message: "Test Panicked".to_string(),
            location,
            panic_payload: Some(payload),
        }
    }
}

/// Why a spec body stopped before returning `Ok(())`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Abort {
    Fail(Failure),
    Skip(String),
}

impl From<Failure> for Abort {
    fn from(failure: Failure) -> Self {
        Abort::Fail(failure)
    }
}

pub type SpecResult = std::result::Result<(), Abort>;

/// Body of a spec, hook or setup node.
pub type SpecBody = Arc<dyn Fn(&SpecContext) -> SpecResult + Send + Sync>;

/// Handed to every body the runner executes. Assertion helpers route
/// failures through the registered fail handler before returning them.
pub struct SpecContext {
    texts: Vec<String>,
    handler: Arc<dyn FailHandler>,
}

impl SpecContext {
    pub fn new(texts: Vec<String>, handler: Arc<dyn FailHandler>) -> Self {
        Self { texts, handler }
    }

    /// Component texts of the running spec, outermost container first.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    #[track_caller]
    pub fn fail(&self, message: impl Into<String>) -> Abort {
        let failure = Failure::new(message, CodeLocation::caller());
        self.handler.fail(&failure);
        Abort::Fail(failure)
    }

    #[track_caller]
    pub fn expect(&self, condition: bool, message: impl Into<String>) -> SpecResult {
        if condition {
            Ok(())
        } else {
            Err(self.fail(message))
        }
    }

    #[track_caller]
    pub fn expect_eq<T>(&self, actual: T, expected: T) -> SpecResult
    where
        T: PartialEq + fmt::Debug,
    {
        if actual == expected {
            Ok(())
        } else {
            Err(self.fail(format!("Expected\n    {:?}\nto equal\n    {:?}", actual, expected)))
        }
    }

    /// Unwraps `result`, failing the spec with the error's message otherwise.
    #[track_caller]
    pub fn succeed<T, E: fmt::Display>(&self, result: std::result::Result<T, E>) -> std::result::Result<T, Abort> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(format!("Unexpected error: {}", e))),
        }
    }

    pub fn skip(&self, reason: impl Into<String>) -> Abort {
        Abort::Skip(reason.into())
    }
}

/// Outcome of a single spec.
#[derive(Debug, Clone)]
pub struct SpecSummary {
    pub component_texts: Vec<String>,
    pub state: SpecState,
    pub run_time: Duration,
    pub failure: Option<Failure>,
    pub skip_reason: Option<String>,
    pub slow: bool,
    pub location: CodeLocation,
}

impl SpecSummary {
    /// Container texts and spec text joined by a space.
    pub fn full_text(&self) -> String {
        self.component_texts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupKind {
    BeforeSuite,
    AfterSuite,
}

impl SetupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupKind::BeforeSuite => "BeforeSuite",
            SetupKind::AfterSuite => "AfterSuite",
        }
    }
}

/// Outcome of a `before_suite` or `after_suite` node.
#[derive(Debug, Clone)]
pub struct SetupSummary {
    pub kind: SetupKind,
    pub state: SpecState,
    pub run_time: Duration,
    pub failure: Option<Failure>,
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone)]
pub struct SuiteSummary {
    pub description: String,
    pub seed: u64,
    pub total_specs: usize,
    pub specs_that_will_run: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub skipped: usize,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub run_time: Duration,
    pub interrupted: bool,
    pub setup_failed: bool,
    pub succeeded: bool,
}

impl SuiteSummary {
    pub fn new(description: &str, seed: u64, total_specs: usize, specs_that_will_run: usize) -> Self {
        Self {
            description: description.to_string(),
            seed,
            total_specs,
            specs_that_will_run,
            passed: 0,
            failed: 0,
            pending: 0,
            skipped: 0,
            start_time: chrono::Utc::now(),
            run_time: Duration::ZERO,
            interrupted: false,
            setup_failed: false,
            succeeded: false,
        }
    }

    pub fn record(&mut self, state: SpecState) {
        match state {
            SpecState::Passed => self.passed += 1,
            SpecState::Failed | SpecState::Panicked => self.failed += 1,
            SpecState::Pending => self.pending += 1,
            SpecState::Skipped => self.skipped += 1,
        }
    }

    /// Stamp the run time and decide overall success.
    pub fn finalize(&mut self) {
        let end = chrono::Utc::now();
        self.run_time = (end - self.start_time).to_std().unwrap_or_default();
        self.succeeded = self.failed == 0 && !self.setup_failed && !self.interrupted;
    }

    /// Specs whose bodies actually ran.
    pub fn ran(&self) -> usize {
        self.passed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fail::Failer;

    #[test]
    fn test_spec_state_is_failure() {
        assert!(SpecState::Failed.is_failure());
        assert!(SpecState::Panicked.is_failure());
        assert!(!SpecState::Passed.is_failure());
        assert!(!SpecState::Skipped.is_failure());
        assert!(SpecState::Pending.is_not_run());
    }

    #[test]
    fn test_context_fail_notifies_handler() {
        let failer = Arc::new(Failer::new());
        let ctx = SpecContext::new(vec!["a".into()], failer.clone());

        let abort = ctx.fail("boom");
        let recorded = failer.drain().expect("failure recorded");

        assert_eq!(recorded.message, "boom");
        assert!(recorded.location.file.ends_with("spec.rs"));
        assert_eq!(abort, Abort::Fail(recorded));
    }

    #[test]
    fn test_context_expect_passes_silently() {
        let failer = Arc::new(Failer::new());
        let ctx = SpecContext::new(Vec::new(), failer.clone());

        assert!(ctx.expect(true, "never").is_ok());
        assert!(ctx.expect_eq(2, 2).is_ok());
        assert!(failer.drain().is_none());
    }

    #[test]
    fn test_context_expect_eq_message() {
        let failer = Arc::new(Failer::new());
        let ctx = SpecContext::new(Vec::new(), failer);

        match ctx.expect_eq("a", "b") {
            Err(Abort::Fail(failure)) => {
                assert!(failure.message.contains("\"a\""));
                assert!(failure.message.contains("\"b\""));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_context_succeed() {
        let failer = Arc::new(Failer::new());
        let ctx = SpecContext::new(Vec::new(), failer);

        let ok: std::result::Result<u8, String> = Ok(3);
        assert_eq!(ctx.succeed(ok).unwrap(), 3);

        let err: std::result::Result<u8, String> = Err("nope".into());
        assert!(matches!(ctx.succeed(err), Err(Abort::Fail(f)) if f.message == "Unexpected error: nope"));
    }

    #[test]
    fn test_suite_summary_finalize() {
        let mut summary = SuiteSummary::new("suite", 1, 3, 3);
        summary.record(SpecState::Passed);
        summary.record(SpecState::Pending);
        summary.finalize();
        assert!(summary.succeeded);
        assert_eq!(summary.ran(), 1);

        summary.record(SpecState::Panicked);
        summary.finalize();
        assert!(!summary.succeeded);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_full_text() {
        let summary = SpecSummary {
            component_texts: vec!["Template".into(), "should parse".into()],
            state: SpecState::Passed,
            run_time: Duration::from_millis(5),
            failure: None,
            skip_reason: None,
            slow: false,
            location: CodeLocation { file: "x.rs".into(), line: 1 },
        };
        assert_eq!(summary.full_text(), "Template should parse");
    }
}
