use std::path::Path;
use std::sync::Mutex;
use log::{info, warn};
use regex::Regex;

use crate::core::config::{PolarionConfig, RunConfig};
use crate::core::error::{Result, SuiteError};
use crate::core::spec::{SetupSummary, SpecSummary, SuiteSummary};
use crate::reporters::xunit::{self, CaseLog, TestCase};
use crate::reporters::Reporter;

const TEST_ID_PATTERN: &str = r"\[test_id:(\d+)\]";

/// Polarion reporter producing an xunit import file for the test-management server.
///
/// One instance is shared for the whole process and handed to the suite
/// entry point by reference, so it keeps its collected cases behind a mutex.
pub struct PolarionReporter {
    config: PolarionConfig,
    test_id: Regex,
    description: Mutex<String>,
    cases: CaseLog,
}

impl PolarionReporter {
    pub fn new(config: PolarionConfig) -> Result<Self> {
        let test_id = Regex::new(TEST_ID_PATTERN)
            .map_err(|e| SuiteError::Config(format!("invalid test id pattern: {}", e)))?;
        Ok(Self {
            config,
            test_id,
            description: Mutex::new(String::new()),
            cases: CaseLog::default(),
        })
    }

    pub fn config(&self) -> &PolarionConfig {
        &self.config
    }

    /// Polarion test case id for a spec text carrying a `[test_id:N]` tag.
    pub fn test_case_id(&self, text: &str) -> Option<String> {
        self.test_id
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|id| format!("{}-{}", self.config.project_id, id.as_str()))
    }

    /// Spec text with every `[test_id:N]` tag removed.
    pub fn strip_test_id(&self, text: &str) -> String {
        let stripped = self.test_id.replace_all(text, "");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn classname(&self) -> String {
        match self.description.lock() {
            Ok(d) => d.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn run_properties(&self, summary: &SuiteSummary) -> Vec<(String, String)> {
        let mut properties = vec![
            ("polarion-project-id".to_string(), self.config.project_id.clone()),
            ("polarion-lookup-method".to_string(), self.config.lookup_method.clone()),
            ("polarion-custom-isautomated".to_string(), "True".to_string()),
            (
                "polarion-testrun-title".to_string(),
                self.config
                    .testrun_title
                    .clone()
                    .unwrap_or_else(|| summary.description.clone()),
            ),
        ];
        if let Some(planned_in) = &self.config.planned_in {
            properties.push(("polarion-custom-plannedin".to_string(), planned_in.clone()));
        }
        properties
    }

    fn record_setup(&self, setup: &SetupSummary) {
        if let Some(case) = TestCase::from_setup(setup, &self.classname()) {
            self.cases.push(case);
        }
    }
}

impl Reporter for PolarionReporter {
    fn report_suite_start(&self, _config: &RunConfig, summary: &SuiteSummary) {
        if let Ok(mut description) = self.description.lock() {
            *description = summary.description.clone();
        }
        if self.config.project_id.is_empty() {
            warn!("Polarion reporting enabled without a project id");
        }
    }

    fn report_before_suite(&self, setup: &SetupSummary) {
        self.record_setup(setup);
    }

    fn report_spec_start(&self, _spec: &SpecSummary) {}

    fn report_spec_result(&self, spec: &SpecSummary) {
        let full_text = spec.full_text();
        let mut case = TestCase::from_spec(spec, &self.classname());
        case.name = self.strip_test_id(&full_text);
        if let Some(id) = self.test_case_id(&full_text) {
            case.properties.push(("polarion-testcase-id".to_string(), id));
        }
        self.cases.push(case);
    }

    fn report_after_suite(&self, setup: &SetupSummary) {
        self.record_setup(setup);
    }

    fn report_suite_result(&self, summary: &SuiteSummary) -> Result<()> {
        if self.config.project_id.is_empty() {
            return Err(SuiteError::Report(
                "Polarion project id is required when Polarion reporting is enabled".to_string(),
            ));
        }

        let document = xunit::render_suites(summary, &self.cases.snapshot(), &self.run_properties(summary));
        xunit::write_document(&self.config.report_file, &document).map_err(|e| {
            SuiteError::Report(format!(
                "failed to write Polarion report {}: {}",
                self.config.report_file.display(),
                e
            ))
        })?;
        info!("Polarion report written to {}", self.config.report_file.display());
        Ok(())
    }

    fn output_path(&self) -> Option<&Path> {
        Some(&self.config.report_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use indoc::indoc;
    use crate::core::spec::{CodeLocation, SpecState};

    fn reporter(project_id: &str, report_file: &Path) -> PolarionReporter {
        PolarionReporter::new(PolarionConfig {
            run: true,
            project_id: project_id.to_string(),
            report_file: report_file.to_path_buf(),
            planned_in: Some("v4.14".to_string()),
            testrun_title: None,
            lookup_method: "id".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_case_id_extraction() {
        let reporter = reporter("CNV", Path::new("p.xml"));
        assert_eq!(reporter.test_case_id("[test_id:1234] should boot"), Some("CNV-1234".to_string()));
        assert_eq!(reporter.test_case_id("should boot"), None);
        assert_eq!(reporter.strip_test_id("VM [test_id:1234] should boot"), "VM should boot");
    }

    #[test]
    fn test_writes_import_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polarion.xml");
        let reporter = reporter("CNV", &path);
        let mut summary = SuiteSummary::new("Functional test suite", 0, 1, 1);

        reporter.report_suite_start(&RunConfig::default(), &summary);
        reporter.report_spec_result(&SpecSummary {
            component_texts: vec!["VM".into(), "[test_id:42] boots".into()],
            state: SpecState::Passed,
            run_time: Duration::from_millis(250),
            failure: None,
            skip_reason: None,
            slow: false,
            location: CodeLocation { file: "v.rs".into(), line: 8 },
        });
        summary.finalize();
        summary.run_time = Duration::from_millis(250);
        reporter.report_suite_result(&summary).unwrap();

        let expected = indoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <testsuites>
              <properties>
                <property name="polarion-project-id" value="CNV"></property>
                <property name="polarion-lookup-method" value="id"></property>
                <property name="polarion-custom-isautomated" value="True"></property>
                <property name="polarion-testrun-title" value="Functional test suite"></property>
                <property name="polarion-custom-plannedin" value="v4.14"></property>
              </properties>
              <testsuite name="Functional test suite" tests="1" failures="0" errors="0" skipped="0" time="0.250">
                <testcase name="VM boots" classname="Functional test suite" time="0.250">
                  <properties>
                    <property name="polarion-testcase-id" value="CNV-42"></property>
                  </properties>
                </testcase>
              </testsuite>
            </testsuites>
        "#};
        assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
    }

    #[test]
    fn test_missing_project_id_is_report_error() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = reporter("", &dir.path().join("p.xml"));

        let err = reporter.report_suite_result(&SuiteSummary::new("S", 0, 0, 0)).unwrap_err();
        assert!(matches!(err, SuiteError::Report(_)));
        assert!(!dir.path().join("p.xml").exists());
    }
}
