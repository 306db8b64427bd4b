//! xunit document model shared by the JUnit and Polarion reporters.

use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::error::Result;
use crate::core::spec::{SetupSummary, SpecState, SpecSummary, SuiteSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    Skipped,
    Failed {
        kind: &'static str,
        message: String,
        detail: String,
    },
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub classname: String,
    pub time: Duration,
    pub outcome: CaseOutcome,
    pub properties: Vec<(String, String)>,
}

impl TestCase {
    pub fn from_spec(spec: &SpecSummary, classname: &str) -> Self {
        Self {
            name: spec.full_text(),
            classname: classname.to_string(),
            time: spec.run_time,
            outcome: outcome(spec.state, spec.failure.as_ref()),
            properties: Vec::new(),
        }
    }

    /// Setup nodes only appear in the document when they failed.
    pub fn from_setup(setup: &SetupSummary, classname: &str) -> Option<Self> {
        if !setup.state.is_failure() {
            return None;
        }
        Some(Self {
            name: setup.kind.as_str().to_string(),
            classname: classname.to_string(),
            time: setup.run_time,
            outcome: outcome(setup.state, setup.failure.as_ref()),
            properties: Vec::new(),
        })
    }
}

fn outcome(state: SpecState, failure: Option<&crate::core::spec::Failure>) -> CaseOutcome {
    match state {
        SpecState::Passed => CaseOutcome::Passed,
        SpecState::Pending | SpecState::Skipped => CaseOutcome::Skipped,
        SpecState::Failed | SpecState::Panicked => {
            let kind = if state == SpecState::Panicked { "Panic" } else { "Failure" };
            let (message, detail) = match failure {
                Some(f) => {
                    let mut detail = f.message.clone();
                    if let Some(payload) = &f.panic_payload {
                        detail.push('\n');
                        detail.push_str(payload);
                    }
                    detail.push('\n');
                    detail.push_str(&f.location.to_string());
                    (f.location.to_string(), detail)
                }
                None => (String::new(), String::new()),
            };
            CaseOutcome::Failed { kind, message, detail }
        }
    }
}

/// Test cases collected over a run, guarded for `&self` reporter callbacks.
#[derive(Debug, Default)]
pub struct CaseLog {
    cases: Mutex<Vec<TestCase>>,
}

impl CaseLog {
    pub fn push(&self, case: TestCase) {
        match self.cases.lock() {
            Ok(mut cases) => cases.push(case),
            Err(poisoned) => poisoned.into_inner().push(case),
        }
    }

    pub fn snapshot(&self) -> Vec<TestCase> {
        match self.cases.lock() {
            Ok(cases) => cases.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            // not allowed anywhere in an XML 1.0 document
            c if c < '\u{20}' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

fn seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

fn write_properties(xml: &mut String, indent: &str, properties: &[(String, String)]) {
    if properties.is_empty() {
        return;
    }
    let _ = writeln!(xml, "{}<properties>", indent);
    for (name, value) in properties {
        let _ = writeln!(
            xml,
            "{}  <property name=\"{}\" value=\"{}\"></property>",
            indent,
            escape(name),
            escape(value)
        );
    }
    let _ = writeln!(xml, "{}</properties>", indent);
}

fn write_suite(xml: &mut String, indent: &str, summary: &SuiteSummary, cases: &[TestCase]) {
    let failures = cases
        .iter()
        .filter(|c| matches!(c.outcome, CaseOutcome::Failed { .. }))
        .count();
    let skipped = cases.iter().filter(|c| c.outcome == CaseOutcome::Skipped).count();

    let _ = writeln!(
        xml,
        "{}<testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{}\">",
        indent,
        escape(&summary.description),
        cases.len(),
        failures,
        skipped,
        seconds(summary.run_time)
    );

    let case_indent = format!("{}  ", indent);
    let inner_indent = format!("{}    ", indent);
    for case in cases {
        let _ = writeln!(
            xml,
            "{}<testcase name=\"{}\" classname=\"{}\" time=\"{}\">",
            case_indent,
            escape(&case.name),
            escape(&case.classname),
            seconds(case.time)
        );
        write_properties(xml, &inner_indent, &case.properties);
        match &case.outcome {
            CaseOutcome::Passed => {}
            CaseOutcome::Skipped => {
                let _ = writeln!(xml, "{}<skipped></skipped>", inner_indent);
            }
            CaseOutcome::Failed { kind, message, detail } => {
                let _ = writeln!(
                    xml,
                    "{}<failure type=\"{}\" message=\"{}\">{}</failure>",
                    inner_indent,
                    kind,
                    escape(message),
                    escape(detail)
                );
            }
        }
        let _ = writeln!(xml, "{}</testcase>", case_indent);
    }
    let _ = writeln!(xml, "{}</testsuite>", indent);
}

/// Render a bare `<testsuite>` document.
pub fn render_suite(summary: &SuiteSummary, cases: &[TestCase]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_suite(&mut xml, "", summary, cases);
    xml
}

/// Render a `<testsuites>` document carrying run-level properties.
pub fn render_suites(summary: &SuiteSummary, cases: &[TestCase], properties: &[(String, String)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>\n");
    write_properties(&mut xml, "  ", properties);
    write_suite(&mut xml, "  ", summary, cases);
    xml.push_str("</testsuites>\n");
    xml
}

pub fn write_document(path: &Path, document: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, document)?;
    Ok(())
}
