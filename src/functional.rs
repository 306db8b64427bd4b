//! Functional suite entry point.
//!
//! Composes the reporter list from configuration, registers the fail
//! handler and hands control to the engine under the suite label.

use std::sync::Arc;
use log::debug;

use crate::core::config::ReportingConfig;
use crate::core::error::Result;
use crate::core::fail::FailHandler;
use crate::core::runner::SpecRunner;
use crate::reporters::junit::JUnitReporter;
use crate::reporters::polarion::PolarionReporter;
use crate::reporters::Reporter;

pub const SUITE_DESCRIPTION: &str = "Functional test suite";

/// Reporters to attach besides the engine's default one.
///
/// JUnit comes first when an output path is configured; the shared Polarion
/// reporter follows when its run flag is set.
pub fn build_reporters(config: &ReportingConfig, polarion: &Arc<PolarionReporter>) -> Vec<Arc<dyn Reporter>> {
    let mut reporters: Vec<Arc<dyn Reporter>> = Vec::new();

    if !config.junit_output.is_empty() {
        reporters.push(Arc::new(JUnitReporter::new(&config.junit_output)));
    }

    if config.polarion.run {
        reporters.push(polarion.clone());
    }

    reporters
}

/// Run the functional suite. Blocks until every spec has executed and
/// returns whether the suite passed.
pub fn run_functional_suite<R: SpecRunner>(
    runner: &mut R,
    config: &ReportingConfig,
    polarion: &Arc<PolarionReporter>,
    fail_handler: Arc<dyn FailHandler>,
) -> Result<bool> {
    let reporters = build_reporters(config, polarion);
    debug!("Attached {} custom reporter(s)", reporters.len());

    runner.register_fail_handler(fail_handler);
    runner.run_specs(SUITE_DESCRIPTION, reporters)
}
