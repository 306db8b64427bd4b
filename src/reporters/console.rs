use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;
use colored::*;

use crate::core::config::RunConfig;
use crate::core::error::Result;
use crate::core::spec::{SetupSummary, SpecState, SpecSummary, SuiteSummary};
use crate::reporters::Reporter;

/// Default reporter for console output
pub struct ConsoleReporter {
    verbose: bool,
    slow_spec_threshold: Duration,
    failures: Mutex<Vec<SpecSummary>>,
}

impl ConsoleReporter {
    /// Create a new console reporter
    pub fn new(config: &RunConfig) -> Self {
        if config.no_color {
            colored::control::set_override(false);
        }
        Self {
            verbose: config.verbose,
            slow_spec_threshold: config.slow_spec_threshold,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Format a duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let minutes = total_secs / 60;
        let seconds = duration.as_secs_f64() - (minutes * 60) as f64;

        if minutes > 0 {
            format!("{}m {:.3}s", minutes, seconds)
        } else {
            format!("{:.3}s", seconds)
        }
    }

    /// Progress marker for a spec outcome
    fn format_marker(state: SpecState) -> ColoredString {
        match state {
            SpecState::Passed => "•".green(),
            SpecState::Failed => "F".red().bold(),
            SpecState::Panicked => "P!".red().bold(),
            SpecState::Pending => "P".yellow(),
            SpecState::Skipped => "S".cyan(),
        }
    }

    /// Format a spec state with color
    fn format_state(state: SpecState) -> ColoredString {
        match state {
            SpecState::Passed => "✓ PASSED".green().bold(),
            SpecState::Failed => "✗ FAILED".red().bold(),
            SpecState::Panicked => "✗ PANICKED".red().bold(),
            SpecState::Pending => "⋯ PENDING".yellow(),
            SpecState::Skipped => "⏸ SKIPPED".cyan(),
        }
    }

    fn print_failure(spec: &SpecSummary) {
        println!("{}", "------------------------------".red());
        println!("{} {}", Self::format_state(spec.state), spec.full_text().bold());
        if let Some(failure) = &spec.failure {
            println!("  {}", failure.message.red());
            if let Some(payload) = &failure.panic_payload {
                println!("  {}", payload);
            }
            println!("  {}", failure.location.to_string().dimmed());
        }
    }

    fn print_setup(setup: &SetupSummary) {
        if !setup.state.is_failure() {
            return;
        }
        println!("{} [{}]", Self::format_state(setup.state), setup.kind.as_str());
        if let Some(failure) = &setup.failure {
            println!("  {}", failure.message.red());
            println!("  {}", failure.location.to_string().dimmed());
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report_suite_start(&self, _config: &RunConfig, summary: &SuiteSummary) {
        println!("Running Suite: {}", summary.description.bold());
        println!("{}", "=".repeat(15 + summary.description.len()));
        println!("Random Seed: {}", summary.seed.to_string().bold());
        println!(
            "Will run {} of {} specs",
            summary.specs_that_will_run.to_string().bold(),
            summary.total_specs.to_string().bold()
        );
        println!();
        let _ = io::stdout().flush();
    }

    fn report_before_suite(&self, setup: &SetupSummary) {
        Self::print_setup(setup);
    }

    fn report_spec_start(&self, spec: &SpecSummary) {
        if self.verbose && !spec.state.is_not_run() {
            println!("{} {}", "Running".cyan(), spec.full_text());
            let _ = io::stdout().flush();
        }
    }

    fn report_spec_result(&self, spec: &SpecSummary) {
        if spec.state.is_failure() {
            if let Ok(mut failures) = self.failures.lock() {
                failures.push(spec.clone());
            }
        }

        if self.verbose {
            println!(
                "{} {} ({})",
                Self::format_state(spec.state),
                spec.full_text(),
                Self::format_duration(spec.run_time)
            );
            if let Some(reason) = &spec.skip_reason {
                println!("  {}", reason.dimmed());
            }
        } else {
            print!("{}", Self::format_marker(spec.state));
        }

        if spec.slow {
            println!(
                "\n{} {} took {} (threshold {})",
                "[SLOW SPEC]".yellow().bold(),
                spec.full_text(),
                Self::format_duration(spec.run_time),
                Self::format_duration(self.slow_spec_threshold)
            );
        }
        let _ = io::stdout().flush();
    }

    fn report_after_suite(&self, setup: &SetupSummary) {
        Self::print_setup(setup);
    }

    fn report_suite_result(&self, summary: &SuiteSummary) -> Result<()> {
        println!("\n");

        let failures = match self.failures.lock() {
            Ok(f) => f.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if !failures.is_empty() {
            println!("{}", "Summarizing failures:".red().bold());
            for spec in &failures {
                Self::print_failure(spec);
            }
            println!();
        }

        println!(
            "Ran {} of {} Specs in {}",
            summary.ran(),
            summary.total_specs,
            Self::format_duration(summary.run_time)
        );

        let verdict = if summary.succeeded {
            "SUCCESS!".green().bold()
        } else if summary.interrupted {
            "INTERRUPTED!".red().bold()
        } else {
            "FAIL!".red().bold()
        };
        println!(
            "{} -- {} | {} | {} | {}",
            verdict,
            format!("{} Passed", summary.passed).green(),
            format!("{} Failed", summary.failed).red(),
            format!("{} Pending", summary.pending).yellow(),
            format!("{} Skipped", summary.skipped).cyan()
        );
        let _ = io::stdout().flush();
        Ok(())
    }
}
