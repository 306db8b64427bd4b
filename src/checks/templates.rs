use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info};
use serde_yaml::Value;

use crate::core::config::TemplatesConfig;
use crate::core::error::{Result, SuiteError};
use crate::core::spec::{Abort, SpecContext};
use crate::core::tree::SpecTree;

const OS_LABEL_PREFIX: &str = "os.template.kubevirt.io";
const PVC_NAME_PARAM: &str = "SRC_PVC_NAME";
const PVC_NAMESPACE_PARAM: &str = "SRC_PVC_NAMESPACE";
const MIN_MEMORY_VALIDATION: &str = "minimal-required-memory";

/// A template file read at registration time.
pub struct TemplateFile {
    pub path: PathBuf,
    pub file_name: String,
    pub document: std::result::Result<Value, String>,
}

impl TemplateFile {
    pub fn load(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))
            .and_then(|contents| {
                serde_yaml::from_str::<Value>(&contents)
                    .map_err(|e| format!("invalid YAML in {}: {}", file_name, e))
            });
        Self {
            path: path.to_path_buf(),
            file_name,
            document,
        }
    }

    fn parsed(&self, ctx: &SpecContext) -> std::result::Result<&Value, Abort> {
        match &self.document {
            Ok(Value::Null) => Err(ctx.fail(format!("Empty template file: {}", self.file_name))),
            Ok(document) => Ok(document),
            Err(e) => Err(ctx.fail(e.clone())),
        }
    }

    /// Like `parsed`, but an empty file skips the spec instead of failing it.
    fn parsed_or_skip(&self, ctx: &SpecContext) -> std::result::Result<&Value, Abort> {
        match &self.document {
            Ok(Value::Null) => Err(ctx.skip(format!("Empty template file: {}", self.file_name))),
            _ => self.parsed(ctx),
        }
    }
}

/// Files directly under `dir`, sorted by name.
fn template_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SuiteError::Config(format!(
            "templates directory not found: {}",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn template_name(template: &Value) -> Option<&str> {
    template["metadata"]["name"].as_str()
}

pub fn param_value<'a>(template: &'a Value, name: &str) -> Option<&'a str> {
    template["parameters"]
        .as_sequence()?
        .iter()
        .find(|param| param["name"].as_str() == Some(name))
        .and_then(|param| param["value"].as_str())
}

pub fn os_labels(template: &Value) -> Vec<String> {
    template["metadata"]["labels"]
        .as_mapping()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, _)| k.as_str())
                .filter(|k| k.contains(OS_LABEL_PREFIX))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse the `validations` annotation as JSON.
pub fn validations(template: &Value) -> std::result::Result<serde_json::Value, String> {
    let raw = template["metadata"]["annotations"]["validations"]
        .as_str()
        .ok_or_else(|| "missing validations annotation".to_string())?;
    serde_json::from_str(raw).map_err(|e| format!("Validation is not json: {}", e))
}

/// OS part of the highest OS label, e.g. `fedora39`.
pub fn newest_os(template: &Value) -> Option<String> {
    os_labels(template)
        .into_iter()
        .max()
        .and_then(|label| label.rsplit('/').next().map(str::to_string))
}

/// `min` of the template's own minimal-required-memory validation.
pub fn validation_min_memory(template: &Value) -> Option<u64> {
    let parsed = validations(template).ok()?;
    parsed
        .as_array()?
        .iter()
        .find(|rule| rule["name"] == MIN_MEMORY_VALIDATION)
        .and_then(|rule| rule["min"].as_u64())
}

/// Memory request of the first object, in bytes. Only `Gi` quantities are accepted.
pub fn memory_request_bytes(template: &Value) -> std::result::Result<u64, String> {
    let raw = template["objects"][0]["spec"]["template"]["spec"]["domain"]["resources"]["requests"]["memory"]
        .as_str()
        .ok_or_else(|| "missing memory request".to_string())?;
    let gi = raw
        .strip_suffix("Gi")
        .ok_or_else(|| format!("memory request '{}' is not expressed in Gi", raw))?
        .parse::<f64>()
        .map_err(|e| format!("memory request '{}' is not a number: {}", raw, e))?;
    if !gi.is_finite() || gi <= 0.0 {
        return Err(format!("memory request '{}' must be positive", raw));
    }
    Ok((gi * 1024.0 * 1024.0 * 1024.0) as u64)
}

/// Differences in source PVC parameters against the baseline template.
pub fn pvc_drift(template: &Value, baseline: &Value) -> Vec<String> {
    let name = template_name(template).unwrap_or("<unnamed>");
    let mut errors = Vec::new();

    let pvc_name = param_value(template, PVC_NAME_PARAM);
    if pvc_name != param_value(baseline, PVC_NAME_PARAM) {
        errors.push(format!("PVC name: {} was modified in: {}", pvc_name.unwrap_or("<unset>"), name));
    }
    let pvc_namespace = param_value(template, PVC_NAMESPACE_PARAM);
    if pvc_namespace != param_value(baseline, PVC_NAMESPACE_PARAM) {
        errors.push(format!(
            "PVC namespace: {} was modified in: {}",
            pvc_namespace.unwrap_or("<unset>"),
            name
        ));
    }
    errors
}

fn load_baseline(dir: &Path) -> Result<HashMap<String, Value>> {
    let mut baseline = HashMap::new();
    for path in template_paths(dir)? {
        let file = TemplateFile::load(&path);
        let document = file.document.map_err(SuiteError::Template)?;
        if let Some(name) = template_name(&document) {
            baseline.insert(name.to_string(), document.clone());
        }
    }
    info!("Loaded {} baseline template(s) from {}", baseline.len(), dir.display());
    Ok(baseline)
}

/// Fails when the memory request is below the minimum for the newest OS.
/// The configured table wins over the template's own validation rule.
pub fn check_min_memory(
    template: &Value,
    file_name: &str,
    min_memory: &HashMap<String, u64>,
) -> std::result::Result<(), String> {
    let requested = memory_request_bytes(template)?;
    let os = newest_os(template).unwrap_or_default();
    let minimum = match min_memory.get(&os).copied().or_else(|| validation_min_memory(template)) {
        Some(minimum) => minimum,
        None => {
            debug!("No minimum memory known for {} in {}", os, file_name);
            return Ok(());
        }
    };
    if requested < minimum {
        return Err(format!(
            "Memory requirements for OS: {} are not compatible with the requirements set in: {}",
            os, file_name
        ));
    }
    Ok(())
}

/// Register one container of checks per template file.
pub fn register(tree: &mut SpecTree, config: &TemplatesConfig) -> Result<()> {
    let paths = template_paths(&config.dir)?;
    let baseline = match &config.baseline_dir {
        Some(dir) => Some(Arc::new(load_baseline(dir)?)),
        None => None,
    };
    let min_memory = Arc::new(config.min_memory.clone());
    info!("Registering checks for {} template(s) in {}", paths.len(), config.dir.display());

    for path in paths {
        let file = Arc::new(TemplateFile::load(&path));
        debug!("Registering template {}", file.path.display());
        let baseline = baseline.clone();

        tree.describe(&format!("Template {}", file.file_name), |t| {
            let f = file.clone();
            t.it("should be a non-empty template with a name", move |ctx| {
                let document = f.parsed(ctx)?;
                ctx.expect(template_name(document).is_some(), "metadata.name is missing")
            });

            let f = file.clone();
            t.it("should carry validations that parse as JSON", move |ctx| {
                let document = f.parsed_or_skip(ctx)?;
                ctx.succeed(validations(document)).map(|_| ())
            });

            let f = file.clone();
            let min_memory = min_memory.clone();
            t.it("should request at least the minimum memory of its newest OS", move |ctx| {
                let document = f.parsed_or_skip(ctx)?;
                if os_labels(document).is_empty() {
                    return Err(ctx.skip("no OS labels, deprecated template"));
                }
                match check_min_memory(document, &f.file_name, &min_memory) {
                    Ok(()) => Ok(()),
                    Err(message) => Err(ctx.fail(message)),
                }
            });

            let f = file.clone();
            t.it("should keep its source PVC parameters stable", move |ctx| {
                let baseline = match &baseline {
                    Some(baseline) => baseline,
                    None => return Err(ctx.skip("no baseline directory configured")),
                };
                let document = f.parsed(ctx)?;
                let name = template_name(document).unwrap_or_default();
                let previous = match baseline.get(name) {
                    Some(previous) => previous,
                    None => return Err(ctx.skip(format!("Missing baseline template for {}", name))),
                };
                let drift = pvc_drift(document, previous);
                ctx.expect(drift.is_empty(), drift.join("\n"))
            });
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use indoc::indoc;
    use crate::core::config::RunConfig;
    use crate::core::runner::{SpecRunner, Suite};
    use crate::core::spec::{SetupSummary, SpecState, SpecSummary, SuiteSummary};
    use crate::reporters::Reporter;

    const TEMPLATE: &str = indoc! {r#"
        metadata:
          name: fedora-server-small
          labels:
            os.template.kubevirt.io/fedora38: "true"
            os.template.kubevirt.io/fedora39: "true"
            workload.template.kubevirt.io/server: "true"
          annotations:
            validations: |
              [{"name": "minimal-required-memory", "path": "jsonpath::.spec.domain.resources.requests.memory", "rule": "integer", "min": 1073741824}]
        parameters:
          - name: NAME
            generate: expression
          - name: SRC_PVC_NAME
            value: fedora
          - name: SRC_PVC_NAMESPACE
            value: kubevirt-os-images
        objects:
          - spec:
              template:
                spec:
                  domain:
                    resources:
                      requests:
                        memory: 1.5Gi
    "#};

    fn template() -> Value {
        serde_yaml::from_str(TEMPLATE).unwrap()
    }

    #[test]
    fn test_template_accessors() {
        let t = template();
        assert_eq!(template_name(&t), Some("fedora-server-small"));
        assert_eq!(param_value(&t, "SRC_PVC_NAME"), Some("fedora"));
        assert_eq!(param_value(&t, "NAME"), None);
        assert_eq!(os_labels(&t).len(), 2);
    }

    #[test]
    fn test_validations_parse() {
        let parsed = validations(&template()).unwrap();
        assert_eq!(parsed[0]["name"], "minimal-required-memory");

        let broken: Value = serde_yaml::from_str("metadata:\n  annotations:\n    validations: '[{'\n").unwrap();
        assert!(validations(&broken).unwrap_err().starts_with("Validation is not json"));
    }

    #[test]
    fn test_memory_request_bytes() {
        assert_eq!(memory_request_bytes(&template()).unwrap(), 1_610_612_736);

        let mi: Value = serde_yaml::from_str(&TEMPLATE.replace("1.5Gi", "512Mi")).unwrap();
        assert!(memory_request_bytes(&mi).is_err());
    }

    #[test]
    fn test_memory_request_rejects_non_finite() {
        for raw in ["NaNGi", "infGi", "-1Gi", "0Gi"] {
            let t: Value = serde_yaml::from_str(&TEMPLATE.replace("1.5Gi", raw)).unwrap();
            assert!(memory_request_bytes(&t).is_err(), "{} accepted", raw);
        }
    }

    #[test]
    fn test_newest_os_and_validation_minimum() {
        let t = template();
        assert_eq!(newest_os(&t).as_deref(), Some("fedora39"));
        assert_eq!(validation_min_memory(&t), Some(1_073_741_824));
    }

    #[test]
    fn test_check_min_memory() {
        let t = template();
        let none = HashMap::new();
        assert!(check_min_memory(&t, "fedora.yaml", &none).is_ok());

        let tiny: Value = serde_yaml::from_str(&TEMPLATE.replace("1.5Gi", "0.000001Gi")).unwrap();
        assert_eq!(
            check_min_memory(&tiny, "fedora.yaml", &none).unwrap_err(),
            "Memory requirements for OS: fedora39 are not compatible with the requirements set in: fedora.yaml"
        );

        let table = HashMap::from([("fedora39".to_string(), 2_147_483_648)]);
        assert!(check_min_memory(&t, "fedora.yaml", &table).is_err());

        let older = HashMap::from([("fedora38".to_string(), 2_147_483_648)]);
        assert!(check_min_memory(&t, "fedora.yaml", &older).is_ok());
    }

    #[test]
    fn test_pvc_drift() {
        let current = template();
        assert!(pvc_drift(&current, &current).is_empty());

        let renamed: Value = serde_yaml::from_str(&TEMPLATE.replace("value: fedora\n", "value: fedora-new\n")).unwrap();
        assert_eq!(
            pvc_drift(&renamed, &current),
            vec!["PVC name: fedora-new was modified in: fedora-server-small".to_string()]
        );
    }

    #[derive(Default)]
    struct StateReporter {
        states: Mutex<Vec<(String, SpecState)>>,
    }

    impl StateReporter {
        fn state_of(&self, text: &str) -> SpecState {
            self.states
                .lock()
                .unwrap()
                .iter()
                .find(|(t, _)| t == text)
                .map(|(_, state)| *state)
                .unwrap()
        }
    }

    impl Reporter for StateReporter {
        fn report_suite_start(&self, _config: &RunConfig, _summary: &SuiteSummary) {}
        fn report_before_suite(&self, _setup: &SetupSummary) {}
        fn report_spec_start(&self, _spec: &SpecSummary) {}
        fn report_spec_result(&self, spec: &SpecSummary) {
            self.states.lock().unwrap().push((spec.full_text(), spec.state));
        }
        fn report_after_suite(&self, _setup: &SetupSummary) {}
        fn report_suite_result(&self, _summary: &SuiteSummary) -> Result<()> {
            Ok(())
        }
    }

    fn run_tree(tree: SpecTree) -> Arc<StateReporter> {
        let reporter = Arc::new(StateReporter::default());
        let mut suite = Suite::new(tree, RunConfig::default()).with_default_reporter(reporter.clone());
        let handler = suite.fail_handler();
        suite.register_fail_handler(handler);
        suite.run_specs("Templates", Vec::new()).unwrap();
        reporter
    }

    #[test]
    fn test_register_builds_one_container_per_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.yaml"), TEMPLATE).unwrap();
        fs::write(dir.path().join("a.yaml"), "").unwrap();

        let mut tree = SpecTree::new();
        let config = TemplatesConfig { dir: dir.path().to_path_buf(), ..TemplatesConfig::default() };
        register(&mut tree, &config).unwrap();

        let specs = tree.flatten();
        assert_eq!(specs.len(), 8);
        assert_eq!(specs[0].component_texts[0], "Template a.yaml");
        assert_eq!(specs[4].component_texts[0], "Template b.yaml");

        let reporter = run_tree(tree);
        assert_eq!(reporter.state_of("Template a.yaml should be a non-empty template with a name"), SpecState::Failed);
        assert_eq!(reporter.state_of("Template a.yaml should carry validations that parse as JSON"), SpecState::Skipped);
        assert_eq!(
            reporter.state_of("Template a.yaml should request at least the minimum memory of its newest OS"),
            SpecState::Skipped
        );
        assert_eq!(
            reporter.state_of("Template b.yaml should request at least the minimum memory of its newest OS"),
            SpecState::Passed
        );
    }

    #[test]
    fn test_memory_below_configured_minimum_fails_spec() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fedora.yaml"), TEMPLATE).unwrap();

        let mut tree = SpecTree::new();
        let config = TemplatesConfig {
            dir: dir.path().to_path_buf(),
            min_memory: HashMap::from([("fedora39".to_string(), 2 * 1024 * 1024 * 1024)]),
            ..TemplatesConfig::default()
        };
        register(&mut tree, &config).unwrap();

        let reporter = run_tree(tree);
        assert_eq!(
            reporter.state_of("Template fedora.yaml should request at least the minimum memory of its newest OS"),
            SpecState::Failed
        );
    }

    #[test]
    fn test_register_missing_dir() {
        let mut tree = SpecTree::new();
        let config = TemplatesConfig { dir: PathBuf::from("/nonexistent/templates"), ..TemplatesConfig::default() };
        assert!(matches!(register(&mut tree, &config), Err(SuiteError::Config(_))));
    }
}
