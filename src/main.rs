use std::process;
use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use anyhow::{Result, Context};
use log::{info, error};
use simple_logger::SimpleLogger;

use funcsuite::checks::templates;
use funcsuite::core::config::{RunConfig, SuiteConfig};
use funcsuite::core::runner::Suite;
use funcsuite::core::tree::SpecTree;
use funcsuite::functional;
use funcsuite::reporters::polarion::PolarionReporter;


#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    no_color: bool,

    /// Ordering seed; 0 keeps definition order
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    randomize_all_specs: bool,

    /// Only run specs whose full text matches this regex
    #[arg(long)]
    focus: Option<String>,

    /// Skip specs whose full text matches this regex
    #[arg(long)]
    skip: Option<String>,

    #[arg(long)]
    fail_fast: bool,

    /// Report every spec as passed without running it
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    slow_spec_threshold: Option<String>,

    /// JUnit XML output path; empty disables it
    #[arg(long)]
    junit_output: Option<String>,

    /// Attach the Polarion reporter
    #[arg(long)]
    polarion_execution: bool,

    #[arg(long)]
    polarion_project_id: Option<String>,

    #[arg(long)]
    polarion_report_file: Option<PathBuf>,

    #[arg(long)]
    polarion_custom_plannedin: Option<String>,

    #[arg(long)]
    polarion_testrun_title: Option<String>,

    /// Directory holding the templates under test
    #[arg(long)]
    templates_dir: Option<PathBuf>,

    /// Directory holding the previously released templates
    #[arg(long)]
    baseline_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    SimpleLogger::new()
        .with_level(log_level)
        .init()
        .context("Failed to initialize logger")?;

    info!("Funcsuite v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            process::exit(2);
        }
    };

    match run(config) {
        Ok(true) => Ok(()),
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("Suite execution failed: {:#}", e);
            process::exit(2);
        }
    }
}


fn load_config(cli: &Cli) -> Result<SuiteConfig> {
    let mut config = match &cli.config {
        Some(path) => SuiteConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SuiteConfig::default(),
    };

    apply_cli(&mut config, cli)?;
    Ok(config)
}


fn apply_cli(config: &mut SuiteConfig, cli: &Cli) -> Result<()> {
    let run = &mut config.run;
    run.verbose |= cli.verbose;
    run.no_color |= cli.no_color;
    run.randomize_all_specs |= cli.randomize_all_specs;
    run.fail_fast |= cli.fail_fast;
    run.dry_run |= cli.dry_run;

    if let Some(seed) = cli.seed {
        run.seed = seed;
    }
    if let Some(focus) = &cli.focus {
        run.focus = Some(focus.clone());
    }
    if let Some(skip) = &cli.skip {
        run.skip = Some(skip.clone());
    }
    if let Some(threshold) = &cli.slow_spec_threshold {
        run.slow_spec_threshold = RunConfig::parse_threshold(threshold)
            .context("Failed to parse slow spec threshold")?;
    }

    let reporting = &mut config.reporting;
    if let Some(path) = &cli.junit_output {
        reporting.junit_output = path.clone();
    }

    let polarion = &mut reporting.polarion;
    polarion.run |= cli.polarion_execution;
    if let Some(project_id) = &cli.polarion_project_id {
        polarion.project_id = project_id.clone();
    }
    if let Some(report_file) = &cli.polarion_report_file {
        polarion.report_file = report_file.clone();
    }
    if let Some(planned_in) = &cli.polarion_custom_plannedin {
        polarion.planned_in = Some(planned_in.clone());
    }
    if let Some(title) = &cli.polarion_testrun_title {
        polarion.testrun_title = Some(title.clone());
    }

    if let Some(dir) = &cli.templates_dir {
        config.templates.dir = dir.clone();
    }
    if let Some(dir) = &cli.baseline_dir {
        config.templates.baseline_dir = Some(dir.clone());
    }

    Ok(())
}


fn run(config: SuiteConfig) -> Result<bool> {
    let mut tree = SpecTree::new();
    templates::register(&mut tree, &config.templates)
        .context("Failed to register template checks")?;

    let polarion = Arc::new(
        PolarionReporter::new(config.reporting.polarion.clone())
            .context("Failed to create Polarion reporter")?,
    );

    let mut suite = Suite::new(tree, config.run.clone());
    suite.setup_interrupt_handler()?;
    let fail_handler = suite.fail_handler();

    let passed = functional::run_functional_suite(&mut suite, &config.reporting, &polarion, fail_handler)?;
    Ok(passed)
}
