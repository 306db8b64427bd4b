use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;

use crate::core::config::RunConfig;
use crate::core::error::{Result, SuiteError};
use crate::core::fail::{FailHandler, Failer};
use crate::core::spec::{
    Abort, CodeLocation, Failure, SetupKind, SetupSummary, SpecBody, SpecContext, SpecState,
    SpecSummary, SuiteSummary,
};
use crate::core::tree::{Spec, SpecTree};
use crate::reporters::console::ConsoleReporter;
use crate::reporters::Reporter;

/// The execution engine seen from a suite entry point.
pub trait SpecRunner {
    /// Install the handler every `SpecContext` routes failed assertions through.
    fn register_fail_handler(&mut self, handler: Arc<dyn FailHandler>);

    /// Run every registered spec, notifying the default reporter and then
    /// `reporters` in order. Returns whether the suite passed.
    fn run_specs(&mut self, description: &str, reporters: Vec<Arc<dyn Reporter>>) -> Result<bool>;
}

/// Outcome of running one body under `catch_unwind`.
enum BodyOutcome {
    Ok,
    Failed(Failure),
    Skipped(String),
    Panicked(Failure),
}

/// Spec execution engine
pub struct Suite {
    tree: SpecTree,
    config: RunConfig,
    failer: Arc<Failer>,
    fail_handler: Option<Arc<dyn FailHandler>>,
    default_reporter: Arc<dyn Reporter>,
    interrupted: Arc<AtomicBool>,
}

impl Suite {
    /// Create a new engine over `tree`
    pub fn new(tree: SpecTree, config: RunConfig) -> Self {
        let default_reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter::new(&config));
        Self {
            tree,
            config,
            failer: Arc::new(Failer::new()),
            fail_handler: None,
            default_reporter,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the console reporter that always receives events first.
    pub fn with_default_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.default_reporter = reporter;
        self
    }

    /// The engine's own fail handler. Register it to have failed assertions
    /// recorded even when a body does not return the failure.
    pub fn fail_handler(&self) -> Arc<dyn FailHandler> {
        self.failer.clone()
    }

    /// Set up interrupt handler
    pub fn setup_interrupt_handler(&self) -> Result<()> {
        let interrupted = self.interrupted.clone();

        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            eprintln!("\nReceived interrupt signal, finishing the current spec...");
        })
        .map_err(|e| SuiteError::Config(format!("Failed to set Ctrl-C handler: {}", e)))?;

        Ok(())
    }

    /// Flag shared with the Ctrl-C handler.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn order(&self, mut specs: Vec<Spec>) -> Vec<Spec> {
        if self.config.seed == 0 {
            return specs;
        }
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        if self.config.randomize_all_specs {
            specs.shuffle(&mut rng);
            return specs;
        }

        let mut groups: Vec<usize> = specs.iter().map(|s| s.group).collect();
        groups.dedup();
        groups.shuffle(&mut rng);

        let mut ordered = Vec::with_capacity(specs.len());
        for group in groups {
            ordered.extend(specs.iter().filter(|s| s.group == group).cloned());
        }
        ordered
    }

    fn compile_filter(pattern: &Option<String>, name: &str) -> Result<Option<Regex>> {
        match pattern {
            Some(p) if !p.is_empty() => Regex::new(p)
                .map(Some)
                .map_err(|e| SuiteError::Config(format!("invalid {} pattern '{}': {}", name, p, e))),
            _ => Ok(None),
        }
    }

    /// Initial state of each spec before anything runs.
    fn plan(&self, specs: &[Spec]) -> Result<Vec<(SpecState, Option<String>)>> {
        let focus = Self::compile_filter(&self.config.focus, "focus")?;
        let skip = Self::compile_filter(&self.config.skip, "skip")?;
        let programmatic_focus = specs.iter().any(|s| s.focused && !s.pending);

        if programmatic_focus {
            warn!("Programmatically focused specs detected; unfocused specs will be skipped");
        }

        Ok(specs
            .iter()
            .map(|spec| {
                let text = spec.full_text();
                if spec.pending {
                    (SpecState::Pending, None)
                } else if programmatic_focus && !spec.focused {
                    (SpecState::Skipped, Some("not focused".to_string()))
                } else if focus.as_ref().map_or(false, |re| !re.is_match(&text)) {
                    (SpecState::Skipped, Some("does not match focus".to_string()))
                } else if skip.as_ref().map_or(false, |re| re.is_match(&text)) {
                    (SpecState::Skipped, Some("matches skip".to_string()))
                } else {
                    (SpecState::Passed, None)
                }
            })
            .collect())
    }

    fn execute(&self, body: &SpecBody, ctx: &SpecContext, location: &CodeLocation) -> BodyOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| body(ctx))) {
            Ok(Ok(())) => BodyOutcome::Ok,
            Ok(Err(Abort::Fail(failure))) => BodyOutcome::Failed(failure),
            Ok(Err(Abort::Skip(reason))) => BodyOutcome::Skipped(reason),
            Err(payload) => BodyOutcome::Panicked(Failure::from_panic(
                panic_message(payload.as_ref()),
                location.clone(),
            )),
        }
    }

    /// Run hooks and body; after-each hooks always run.
    fn run_spec(&self, spec: &Spec, handler: &Arc<dyn FailHandler>) -> (SpecState, Option<Failure>, Option<String>) {
        self.failer.drain();
        let ctx = SpecContext::new(spec.component_texts.clone(), handler.clone());

        let mut outcome = BodyOutcome::Ok;
        for hook in &spec.before_each {
            outcome = self.execute(hook, &ctx, &spec.location);
            if !matches!(outcome, BodyOutcome::Ok) {
                break;
            }
        }
        if matches!(outcome, BodyOutcome::Ok) {
            outcome = self.execute(&spec.body, &ctx, &spec.location);
        }
        for hook in &spec.after_each {
            let after = self.execute(hook, &ctx, &spec.location);
            if matches!(outcome, BodyOutcome::Ok) {
                outcome = after;
            }
        }

        let recorded = self.failer.drain();
        match outcome {
            BodyOutcome::Panicked(failure) => (SpecState::Panicked, Some(failure), None),
            BodyOutcome::Failed(failure) => (SpecState::Failed, Some(recorded.unwrap_or(failure)), None),
            BodyOutcome::Ok | BodyOutcome::Skipped(_) if recorded.is_some() => {
                (SpecState::Failed, recorded, None)
            }
            BodyOutcome::Skipped(reason) => (SpecState::Skipped, None, Some(reason)),
            BodyOutcome::Ok => (SpecState::Passed, None, None),
        }
    }

    fn run_setup(&self, kind: SetupKind, body: &SpecBody, handler: &Arc<dyn FailHandler>) -> SetupSummary {
        self.failer.drain();
        let ctx = SpecContext::new(vec![kind.as_str().to_string()], handler.clone());
        let location = CodeLocation { file: kind.as_str().to_string(), line: 0 };
        let start = Instant::now();

        let outcome = if self.config.dry_run {
            BodyOutcome::Ok
        } else {
            self.execute(body, &ctx, &location)
        };
        let recorded = self.failer.drain();

        let (state, failure) = match outcome {
            BodyOutcome::Panicked(f) => (SpecState::Panicked, Some(f)),
            BodyOutcome::Failed(f) => (SpecState::Failed, Some(recorded.unwrap_or(f))),
            _ if recorded.is_some() => (SpecState::Failed, recorded),
            BodyOutcome::Skipped(reason) => {
                info!("{} skipped: {}", kind.as_str(), reason);
                (SpecState::Skipped, None)
            }
            BodyOutcome::Ok => (SpecState::Passed, None),
        };
        SetupSummary {
            kind,
            state,
            run_time: start.elapsed(),
            failure,
        }
    }

    fn broadcast<F: Fn(&dyn Reporter)>(&self, reporters: &[Arc<dyn Reporter>], event: F) {
        event(self.default_reporter.as_ref());
        for reporter in reporters {
            event(reporter.as_ref());
        }
    }
}

impl SpecRunner for Suite {
    fn register_fail_handler(&mut self, handler: Arc<dyn FailHandler>) {
        self.fail_handler = Some(handler);
    }

    fn run_specs(&mut self, description: &str, reporters: Vec<Arc<dyn Reporter>>) -> Result<bool> {
        let handler = self.fail_handler.clone().ok_or(SuiteError::NoFailHandler)?;
        if let Some(problem) = self.tree.errors().first() {
            return Err(SuiteError::Tree(problem.clone()));
        }

        let specs = self.order(self.tree.flatten());
        let plan = self.plan(&specs)?;
        let will_run = plan.iter().filter(|(state, _)| *state == SpecState::Passed).count();

        let mut summary = SuiteSummary::new(description, self.config.seed, specs.len(), will_run);
        info!(
            "Running suite '{}': {} of {} specs (seed {})",
            description,
            will_run,
            specs.len(),
            self.config.seed
        );
        self.broadcast(&reporters, |r| r.report_suite_start(&self.config, &summary));

        let mut suite_skipped = false;
        if let Some(body) = self.tree.before_suite_body() {
            let setup = self.run_setup(SetupKind::BeforeSuite, &body, &handler);
            summary.setup_failed |= setup.state.is_failure();
            suite_skipped = setup.state == SpecState::Skipped;
            self.broadcast(&reporters, |r| r.report_before_suite(&setup));
        }

        let mut failed_fast = false;
        for (spec, (planned, planned_reason)) in specs.iter().zip(plan) {
            let mut result = SpecSummary {
                component_texts: spec.component_texts.clone(),
                state: planned,
                run_time: Duration::ZERO,
                failure: None,
                skip_reason: planned_reason,
                slow: false,
                location: spec.location.clone(),
            };

            if result.state == SpecState::Passed {
                if summary.setup_failed {
                    result.state = SpecState::Skipped;
                    result.skip_reason = Some("before_suite failed".to_string());
                } else if suite_skipped {
                    result.state = SpecState::Skipped;
                    result.skip_reason = Some("skipped in before_suite".to_string());
                } else if self.is_interrupted() {
                    summary.interrupted = true;
                    result.state = SpecState::Skipped;
                    result.skip_reason = Some("interrupted".to_string());
                } else if failed_fast {
                    result.state = SpecState::Skipped;
                    result.skip_reason = Some("fail-fast".to_string());
                }
            }

            self.broadcast(&reporters, |r| r.report_spec_start(&result));

            if result.state == SpecState::Passed && !self.config.dry_run {
                debug!("Running spec: {}", spec.full_text());
                let start = Instant::now();
                let (state, failure, reason) = self.run_spec(spec, &handler);
                result.run_time = start.elapsed();
                result.state = state;
                result.failure = failure;
                result.skip_reason = reason;
                result.slow = state == SpecState::Passed && result.run_time > self.config.slow_spec_threshold;

                if state.is_failure() {
                    error!("Spec failed: {}", spec.full_text());
                    failed_fast = self.config.fail_fast;
                }
            }

            summary.record(result.state);
            self.broadcast(&reporters, |r| r.report_spec_result(&result));
        }

        if self.is_interrupted() {
            summary.interrupted = true;
        }

        if let Some(body) = self.tree.after_suite_body() {
            let setup = self.run_setup(SetupKind::AfterSuite, &body, &handler);
            summary.setup_failed |= setup.state.is_failure();
            self.broadcast(&reporters, |r| r.report_after_suite(&setup));
        }

        summary.finalize();

        let mut report_error = None;
        if let Err(e) = self.default_reporter.report_suite_result(&summary) {
            error!("{}", e);
            report_error = Some(e);
        }
        for reporter in &reporters {
            if let Err(e) = reporter.report_suite_result(&summary) {
                error!("{}", e);
                if report_error.is_none() {
                    report_error = Some(e);
                }
            }
        }

        info!(
            "Suite '{}' finished: {} passed, {} failed, {} pending, {} skipped",
            description, summary.passed, summary.failed, summary.pending, summary.skipped
        );

        match report_error {
            Some(e) => Err(e),
            None => Ok(summary.succeeded),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
