pub mod console;
pub mod junit;
pub mod polarion;
pub mod xunit;

use std::path::Path;

use crate::core::config::RunConfig;
use crate::core::error::Result;
use crate::core::spec::{SetupSummary, SpecSummary, SuiteSummary};

/// Receives the lifecycle events of a run, in order.
pub trait Reporter: Send + Sync {
    /// Report the start of the suite
    fn report_suite_start(&self, config: &RunConfig, summary: &SuiteSummary);

    /// Report the outcome of the `before_suite` node
    fn report_before_suite(&self, setup: &SetupSummary);

    /// Report that a spec is about to run
    fn report_spec_start(&self, spec: &SpecSummary);

    /// Report the outcome of a spec
    fn report_spec_result(&self, spec: &SpecSummary);

    /// Report the outcome of the `after_suite` node
    fn report_after_suite(&self, setup: &SetupSummary);

    /// Report the final results of the suite
    fn report_suite_result(&self, summary: &SuiteSummary) -> Result<()>;

    /// File this reporter writes, if any.
    fn output_path(&self) -> Option<&Path> {
        None
    }
}
