//! Service configuration: YAML file plus environment overrides.
//!
//! ```yaml
//! listen: 0.0.0.0:8787
//! app_path: https://reports.example.com
//! datasources:
//!   sites: { path: data/sites.db, busy_timeout_ms: 500 }
//! reports:
//!   - { name: Site Summary, type: Template, script_file: reports/site_summary.hbs, datasources: [sites] }
//! workflows:
//!   - { code: approve_site, name: Approve site, script_file: workflows/approve_site.rhai }
//! workflow_source: sites
//! actions: { store: sqlite, path: data/actions.db }
//! ```
//!
//! Relative paths resolve against the directory of the config file.

use indexmap::IndexMap;
use rpt_core::{ReportError, ReportResult};
use rpt_output::{CommandSpec, PdfSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "RPT_CONFIG";
pub const ADDR_ENV: &str = "RPT_ADDR";
pub const APP_PATH_ENV: &str = "RPT_APP_PATH";
pub const DEFAULT_CONFIG: &str = "reporting.yaml";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8787";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasourceConfig {
    /// SQLite file; absent means a private in-memory database per connection
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: Option<u64>,
    pub init_sql: Option<String>,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub report_type: String,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub script_file: Option<PathBuf>,
    #[serde(default)]
    pub description: Option<String>,
    /// Datasource names bound in slot order, primary first
    #[serde(default)]
    pub datasources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEntry {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub script_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStoreKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionStoreConfig {
    pub store: ActionStoreKind,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    pub flattener: Option<CommandSpec>,
    pub writer: Option<CommandSpec>,
    pub settings: PdfSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen: String,
    pub app_path: String,
    pub script_override_dir: Option<PathBuf>,
    pub datasources: IndexMap<String, DatasourceConfig>,
    pub reports: Vec<ReportEntry>,
    pub workflows: Vec<WorkflowEntry>,
    /// Datasource bound as `Source` in workflows
    pub workflow_source: Option<String>,
    pub actions: ActionStoreConfig,
    pub pdf: PdfConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            app_path: "http://localhost:8787".to_string(),
            script_override_dir: None,
            datasources: IndexMap::new(),
            reports: Vec::new(),
            workflows: Vec::new(),
            workflow_source: None,
            actions: ActionStoreConfig::default(),
            pdf: PdfConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl ServiceConfig {
    /// Reads `$RPT_CONFIG` (default `reporting.yaml`) and applies the
    /// environment overrides. A missing file gives the defaults.
    pub fn load() -> ReportResult<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
        let mut config = Self::load_file(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_file(path: &Path) -> ReportResult<Self> {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReportError::Configuration(format!("Cannot read {} - {}", path.display(), e)))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let config = Self::from_yaml(&text, base_dir)?;
        tracing::info!(
            path = %path.display(),
            reports = config.reports.len(),
            workflows = config.workflows.len(),
            "config loaded"
        );
        Ok(config)
    }

    pub fn from_yaml(text: &str, base_dir: impl Into<PathBuf>) -> ReportResult<Self> {
        let mut config: ServiceConfig = serde_yaml::from_str(text)
            .map_err(|e| ReportError::Configuration(format!("Invalid config - {}", e)))?;
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(ADDR_ENV).filter(|v| !v.trim().is_empty()) {
            self.listen = addr;
        }
        if let Some(app_path) = lookup(APP_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.app_path = app_path;
        }
    }

    /// `path` as given when absolute, otherwise under the config directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Inline script, or the contents of the script file
    pub fn script_text(&self, what: &str, script: Option<&str>, script_file: Option<&Path>) -> ReportResult<String> {
        match (script, script_file) {
            (Some(text), _) => Ok(text.to_string()),
            (None, Some(file)) => {
                let path = self.resolve(file);
                std::fs::read_to_string(&path).map_err(|e| {
                    ReportError::Configuration(format!("Cannot read the script of {} from {} - {}", what, path.display(), e))
                })
            }
            (None, None) => Err(ReportError::Configuration(format!("{} has no script", what))),
        }
    }
}
