//! Shared application state built from the service configuration
use indexmap::IndexMap;
use rpt_core::{ReportDefinition, ReportError, ReportResult};
use rpt_datasource::{DatasourceBindings, DatasourceProvider, SqliteProvider};
use rpt_output::{CommandSpec, HtmlFlattener, PassthroughFlattener, PdfPipeline, PdfWriter};
use rpt_reports::{Report, ReportOptions, ReportRegistry};
use rpt_workflow::{
    ActionRedeemer, ActionStore, MemoryActionStore, SqliteActionStore, WorkflowCatalog, WorkflowDefinition,
    WorkflowExecutor,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ActionStoreKind, DatasourceConfig, ServiceConfig};
use crate::metrics::Metrics;

/// A report definition with its datasources, ready to be built per request
pub struct ConfiguredReport {
    pub definition: ReportDefinition,
    pub datasource_names: Vec<String>,
    providers: Vec<Arc<dyn DatasourceProvider>>,
}

impl ConfiguredReport {
    /// Fresh report with its datasources bound. Runs the declaration pass.
    pub fn build(&self, options: &ReportOptions) -> ReportResult<Box<dyn Report>> {
        let mut report = ReportRegistry::global().create(self.definition.clone(), options)?;
        report.set_datasources(DatasourceBindings::from_list(self.providers.clone())?);
        Ok(report)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<IndexMap<String, ConfiguredReport>>,
    pub options: ReportOptions,
    pub workflows: Arc<WorkflowCatalog>,
    pub redeemer: ActionRedeemer,
    pub metrics: Metrics,
}

fn provider(name: &str, config: &DatasourceConfig, service: &ServiceConfig) -> SqliteProvider {
    let mut provider = match &config.path {
        Some(path) => SqliteProvider::file(name, service.resolve(path)),
        None => SqliteProvider::memory(name),
    };
    if let Some(ms) = config.busy_timeout_ms {
        provider = provider.with_busy_timeout(Duration::from_millis(ms));
    }
    if let Some(sql) = &config.init_sql {
        provider = provider.with_init_sql(sql.clone());
    }
    provider.read_only(config.read_only)
}

fn lookup(
    providers: &IndexMap<String, Arc<dyn DatasourceProvider>>,
    name: &str,
    user: &str,
) -> ReportResult<Arc<dyn DatasourceProvider>> {
    providers
        .get(name)
        .cloned()
        .ok_or_else(|| ReportError::Configuration(format!("Unknown datasource [{}] used by {}", name, user)))
}

fn pdf_pipeline(config: &ServiceConfig) -> PdfPipeline {
    let flattener: Arc<dyn HtmlFlattener> = match &config.pdf.flattener {
        Some(spec) => Arc::new(spec.clone()),
        None => Arc::new(PassthroughFlattener),
    };
    let writer: Arc<dyn PdfWriter> = Arc::new(config.pdf.writer.clone().unwrap_or_else(CommandSpec::wkhtmltopdf));
    PdfPipeline::new(flattener, writer).with_settings(config.pdf.settings.clone())
}

impl AppState {
    pub fn from_config(config: &ServiceConfig) -> ReportResult<Self> {
        let providers: IndexMap<String, Arc<dyn DatasourceProvider>> = config
            .datasources
            .iter()
            .map(|(name, ds)| (name.clone(), Arc::new(provider(name, ds, config)) as Arc<dyn DatasourceProvider>))
            .collect();

        let mut reports = IndexMap::new();
        for entry in &config.reports {
            let user = format!("report [{}]", entry.name);
            if !ReportRegistry::global().supports(&entry.report_type) {
                return Err(ReportError::Configuration(format!(
                    "The report [{}] is not supported",
                    entry.report_type
                )));
            }
            let script = config.script_text(&user, entry.script.as_deref(), entry.script_file.as_deref())?;
            let mut definition = ReportDefinition::new(&entry.name, &entry.report_type, script);
            definition.description = entry.description.clone();
            let report_providers = entry
                .datasources
                .iter()
                .map(|name| lookup(&providers, name, &user))
                .collect::<ReportResult<Vec<_>>>()?;

            reports.insert(
                entry.name.to_lowercase(),
                ConfiguredReport {
                    definition,
                    datasource_names: entry.datasources.clone(),
                    providers: report_providers,
                },
            );
        }

        let store: Arc<dyn ActionStore> = match config.actions.store {
            ActionStoreKind::Memory => Arc::new(MemoryActionStore::new()),
            ActionStoreKind::Sqlite => {
                let path = config
                    .actions
                    .path
                    .as_deref()
                    .ok_or_else(|| ReportError::Configuration("The sqlite action store needs a path".into()))?;
                Arc::new(SqliteActionStore::open(config.resolve(path))?)
            }
        };

        let mut executor = WorkflowExecutor::new(&config.app_path, store);
        if let Some(name) = &config.workflow_source {
            executor = executor.with_source(lookup(&providers, name, "workflows")?);
        }
        let mut catalog = WorkflowCatalog::new(executor);
        for entry in &config.workflows {
            let script = config.script_text(
                &format!("workflow [{}]", entry.code),
                entry.script.as_deref(),
                entry.script_file.as_deref(),
            )?;
            catalog.register(WorkflowDefinition::new(&entry.code, &entry.name, script));
        }
        let workflows = Arc::new(catalog);

        let mut options = ReportOptions::new(&config.app_path).with_pdf(pdf_pipeline(config));
        if let Some(dir) = &config.script_override_dir {
            options = options.with_override_dir(config.resolve(dir));
        }

        let metrics = Metrics::new().map_err(|e| ReportError::Configuration(format!("Metrics registry - {}", e)))?;

        tracing::info!(
            reports = reports.len(),
            workflows = workflows.definitions().count(),
            datasources = providers.len(),
            "application state ready"
        );
        Ok(Self {
            reports: Arc::new(reports),
            options,
            redeemer: ActionRedeemer::new(workflows.clone()),
            workflows,
            metrics,
        })
    }

    pub fn report(&self, name: &str) -> Option<&ConfiguredReport> {
        self.reports.get(&name.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_datasource() {
        let config = ServiceConfig::from_yaml(
            "reports:\n  - { name: A, type: Template, script: x, datasources: [nowhere] }\n",
            ".",
        )
        .unwrap();
        let err = AppState::from_config(&config).err().unwrap();
        assert_eq!(err.to_string(), "CONFIG/Unknown datasource [nowhere] used by report [A]");
    }

    #[test]
    fn test_unsupported_type() {
        let config = ServiceConfig::from_yaml("reports:\n  - { name: A, type: Jasper, script: x }\n", ".").unwrap();
        assert!(AppState::from_config(&config).is_err());
    }

    #[test]
    fn test_lookup_ignores_case() {
        let config = ServiceConfig::from_yaml(
            "datasources: { main: {} }\nreports:\n  - { name: Site List, type: Template, script: '<p/>', datasources: [main] }\n",
            ".",
        )
        .unwrap();
        let state = AppState::from_config(&config).unwrap();
        let report = state.report("site list").unwrap().build(&state.options).unwrap();
        assert_eq!(report.name(), "Site List");
    }
}
