use std::path::{Path, PathBuf};
use std::sync::Mutex;
use log::info;

use crate::core::config::RunConfig;
use crate::core::error::{Result, SuiteError};
use crate::core::spec::{SetupSummary, SpecSummary, SuiteSummary};
use crate::reporters::xunit::{self, CaseLog, TestCase};
use crate::reporters::Reporter;

/// JUnit XML reporter for CI consumption
pub struct JUnitReporter {
    output_file: PathBuf,
    description: Mutex<String>,
    cases: CaseLog,
}

impl JUnitReporter {
    /// Create a new JUnit reporter writing to `output_file` when the suite ends
    pub fn new(output_file: impl Into<PathBuf>) -> Self {
        Self {
            output_file: output_file.into(),
            description: Mutex::new(String::new()),
            cases: CaseLog::default(),
        }
    }

    fn classname(&self) -> String {
        match self.description.lock() {
            Ok(d) => d.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_setup(&self, setup: &SetupSummary) {
        if let Some(case) = TestCase::from_setup(setup, &self.classname()) {
            self.cases.push(case);
        }
    }
}

impl Reporter for JUnitReporter {
    fn report_suite_start(&self, _config: &RunConfig, summary: &SuiteSummary) {
        if let Ok(mut description) = self.description.lock() {
            *description = summary.description.clone();
        }
    }

    fn report_before_suite(&self, setup: &SetupSummary) {
        self.record_setup(setup);
    }

    fn report_spec_start(&self, _spec: &SpecSummary) {
        // Cases are only written once the spec has an outcome
    }

    fn report_spec_result(&self, spec: &SpecSummary) {
        self.cases.push(TestCase::from_spec(spec, &self.classname()));
    }

    fn report_after_suite(&self, setup: &SetupSummary) {
        self.record_setup(setup);
    }

    fn report_suite_result(&self, summary: &SuiteSummary) -> Result<()> {
        let document = xunit::render_suite(summary, &self.cases.snapshot());
        xunit::write_document(&self.output_file, &document).map_err(|e| {
            SuiteError::Report(format!(
                "failed to write JUnit report {}: {}",
                self.output_file.display(),
                e
            ))
        })?;
        info!("JUnit report written to {}", self.output_file.display());
        Ok(())
    }

    fn output_path(&self) -> Option<&Path> {
        Some(&self.output_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::core::spec::{CodeLocation, Failure, SetupKind, SpecState};

    fn spec(text: &str, state: SpecState, failure: Option<Failure>) -> SpecSummary {
        SpecSummary {
            component_texts: vec!["Templates".to_string(), text.to_string()],
            state,
            run_time: Duration::from_millis(20),
            failure,
            skip_reason: None,
            slow: false,
            location: CodeLocation { file: "t.rs".into(), line: 1 },
        }
    }

    #[test]
    fn test_writes_report_on_suite_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junit.xml");
        let reporter = JUnitReporter::new(&path);
        let mut summary = SuiteSummary::new("Functional test suite", 0, 2, 2);

        reporter.report_suite_start(&RunConfig::default(), &summary);
        reporter.report_spec_result(&spec("parse", SpecState::Passed, None));
        reporter.report_spec_result(&spec(
            "validate",
            SpecState::Failed,
            Some(Failure::new("bad <json>", CodeLocation { file: "c.rs".into(), line: 40 })),
        ));
        summary.finalize();
        reporter.report_suite_result(&summary).unwrap();

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("<testsuite name=\"Functional test suite\" tests=\"2\" failures=\"1\""));
        assert!(xml.contains("<testcase name=\"Templates parse\" classname=\"Functional test suite\""));
        assert!(xml.contains("<failure type=\"Failure\" message=\"c.rs:40\">bad &lt;json&gt;\nc.rs:40</failure>"));
        assert_eq!(reporter.output_path(), Some(path.as_path()));
    }

    #[test]
    fn test_failed_setup_becomes_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junit.xml");
        let reporter = JUnitReporter::new(&path);
        let summary = SuiteSummary::new("S", 0, 0, 0);

        reporter.report_suite_start(&RunConfig::default(), &summary);
        reporter.report_before_suite(&SetupSummary {
            kind: SetupKind::BeforeSuite,
            state: SpecState::Failed,
            run_time: Duration::ZERO,
            failure: Some(Failure::new("no cluster", CodeLocation { file: "b.rs".into(), line: 2 })),
        });
        reporter.report_suite_result(&summary).unwrap();

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("<testcase name=\"BeforeSuite\" classname=\"S\""));
    }

    #[test]
    fn test_unwritable_path_is_report_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let reporter = JUnitReporter::new(blocker.join("junit.xml"));

        let err = reporter.report_suite_result(&SuiteSummary::new("S", 0, 0, 0)).unwrap_err();
        assert!(matches!(err, SuiteError::Report(_)));
    }
}
