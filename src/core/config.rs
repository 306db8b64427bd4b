use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::time::Duration;
use std::path::{Path, PathBuf};

use crate::core::error::{Result, SuiteError};

/// Everything a run needs, loaded once at suite start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub run: RunConfig,
    pub reporting: ReportingConfig,
    pub templates: TemplatesConfig,
}

/// Engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Ordering seed. `0` keeps definition order.
    pub seed: u64,
    pub randomize_all_specs: bool,
    pub focus: Option<String>,
    pub skip: Option<String>,
    pub fail_fast: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub no_color: bool,
    pub slow_spec_threshold: Duration,
}

/// Which reporters get attached besides the console.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// JUnit XML output path. Empty disables the JUnit reporter.
    pub junit_output: String,
    pub polarion: PolarionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarionConfig {
    /// Attach the Polarion reporter to the run.
    pub run: bool,
    pub project_id: String,
    pub report_file: PathBuf,
    pub planned_in: Option<String>,
    pub testrun_title: Option<String>,
    pub lookup_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub dir: PathBuf,
    pub baseline_dir: Option<PathBuf>,
    /// Minimum RAM in bytes per OS, keyed by the OS part of the label
    /// (`fedora39` for `os.template.kubevirt.io/fedora39`).
    pub min_memory: HashMap<String, u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            randomize_all_specs: false,
            focus: None,
            skip: None,
            fail_fast: false,
            dry_run: false,
            verbose: false,
            no_color: false,
            slow_spec_threshold: Duration::from_secs(5),
        }
    }
}

impl Default for PolarionConfig {
    fn default() -> Self {
        Self {
            run: false,
            project_id: String::new(),
            report_file: PathBuf::from("polarion_results.xml"),
            planned_in: None,
            testrun_title: None,
            lookup_method: "id".to_string(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dist/templates"),
            baseline_dir: None,
            min_memory: HashMap::new(),
        }
    }
}

impl SuiteConfig {
    /// Load from a TOML file (by extension) or JSON otherwise.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SuiteError::Config(format!("Config file not found: {}", path.display())));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| SuiteError::Config(format!("Failed to read config file: {}", e)))?;

        let config = if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
            toml::from_str::<Self>(&contents)
                .map_err(|e| SuiteError::Config(format!("Failed to parse TOML config: {}", e)))?
        } else {
            serde_json::from_str::<Self>(&contents)
                .map_err(|e| SuiteError::Config(format!("Failed to parse JSON config: {}", e)))?
        };

        Ok(config)
    }
}

impl RunConfig {
    pub fn parse_threshold(threshold: &str) -> Result<Duration> {
        let duration = humantime::parse_duration(threshold)
            .map_err(|e| SuiteError::Config(format!("Invalid duration format: {}", e)))?;

        if duration.is_zero() {
            return Err(SuiteError::Config("Slow spec threshold must be positive".to_string()));
        }

        Ok(duration)
    }
}
