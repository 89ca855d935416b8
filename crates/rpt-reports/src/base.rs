//! State and export flow shared by every report type
use rpt_core::{
    ExecutionContext, ExecutionResults, ParameterSchema, Recipient, ReportDefinition, ReportError,
    ReportResult, RuntimeParameter, RuntimeParameters, Task,
};
use rpt_datasource::{DatasourceBindings, DatasourceSet, SlotId};
use rpt_engine::declare::{count_datasources, declare_parameters};
use rpt_engine::ScriptHost;
use rpt_output::{write_compressed, OutputOptions};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use crate::options::ReportOptions;
use crate::phase::{ExportPhase, PhaseTracker};
use crate::{ExportRequest, ReportKind};

pub(crate) struct ReportBase {
    pub name: String,
    pub kind: ReportKind,
    /// Snapshot taken at construction
    pub script: Arc<str>,
    pub schema: ParameterSchema,
    pub datasources: usize,
    pub app_path: String,
    pub parameters: RuntimeParameters,
    pub bindings: DatasourceBindings,
    pub recipient: Option<Recipient>,
    pub job: Option<Task>,
}

impl ReportBase {
    /// Snapshots the script and runs the declaration pass
    pub fn new(definition: &ReportDefinition, kind: ReportKind, options: &ReportOptions) -> ReportResult<Self> {
        let script = options.script_for(definition, kind)?;
        let schema = declare_parameters(&definition.name, kind.dialect(), &script)?;
        let datasources = count_datasources(kind.dialect(), &script);
        tracing::debug!(
            report = %definition.name,
            kind = %kind,
            parameters = schema.len(),
            datasources,
            "report created"
        );

        Ok(Self {
            name: definition.name.clone(),
            kind,
            script: Arc::from(script),
            schema,
            datasources,
            app_path: options.app_path.clone(),
            parameters: RuntimeParameters::new(),
            bindings: DatasourceBindings::new(),
            recipient: None,
            job: None,
        })
    }

    pub fn parameter(&self, name: &str) -> Option<&RuntimeParameter> {
        self.parameters.get(name)
    }

    /// Fresh context for one export call
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.name.as_str())
            .with_app_path(self.app_path.as_str())
            .with_parameters(self.parameters.aligned_to(&self.schema))
            .with_recipient(self.recipient.clone())
            .with_job(self.job.clone())
    }

    /// Request options completed from the runtime parameters
    pub fn output_options(&self, request: &ExportRequest) -> OutputOptions {
        request.options.clone().merge_parameters(&self.parameters)
    }

    /// Context bindings for a template, with a `SourceN` object per slot
    /// that helpers accept as their first argument
    pub fn template_bindings(&self, ctx: &ExecutionContext) -> Map<String, Value> {
        let mut vars = ctx.bindings();
        for slot in SlotId::ALL {
            vars.insert(
                slot.binding_name().to_string(),
                json!({"slot": slot.binding_name(), "bound": self.bindings.is_bound(slot)}),
            );
        }
        vars
    }

    /// Runs one export: opens the datasources, lets `render` produce the
    /// artifact through a running host, closes the datasources and only
    /// then writes the artifact.
    pub fn run_export<F>(
        &self,
        request: &ExportRequest,
        out: &mut dyn Write,
        results: &mut ExecutionResults,
        render: F,
    ) -> ReportResult<()>
    where
        F: FnOnce(&ExecutionContext, &ScriptHost) -> ReportResult<Vec<u8>>,
    {
        if !request.format.is(self.kind.supported_formats()) {
            return Err(ReportError::UnsupportedFormat {
                format: request.format,
                report: self.name.clone(),
            });
        }

        let span = tracing::info_span!("export", report = %self.name, format = %request.format);
        let _guard = span.enter();
        let started = Instant::now();
        let mut phases = PhaseTracker::new(self.name.as_str());

        phases.advance(ExportPhase::DatasourcesOpening);
        let sources = match DatasourceSet::open(&self.bindings) {
            Ok(sources) => sources,
            Err(e) => {
                phases.fail();
                tracing::error!(report = %self.name, error = %e, "cannot open datasources");
                return Err(e);
            }
        };

        phases.advance(ExportPhase::Executing);
        let host = ScriptHost::running(self.name.as_str(), sources, std::mem::take(results));
        let ctx = self.context();
        let rendered = render(&ctx, &host);
        if rendered.is_ok() {
            phases.advance(ExportPhase::OutputCaptured);
        }

        phases.advance(ExportPhase::DatasourcesClosing);
        let outcome = host.finish();
        *results = outcome.results;
        let mut sources = outcome.sources;
        sources.close();

        let written = rendered.and_then(|bytes| {
            write_compressed(&bytes, request.compression, out)?;
            Ok(bytes.len())
        });
        match written {
            Ok(bytes) => {
                phases.advance(ExportPhase::Done);
                tracing::info!(
                    report = %self.name,
                    format = %request.format,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "report exported"
                );
                Ok(())
            }
            Err(e) => {
                phases.fail();
                tracing::error!(report = %self.name, error = %e, "report export failed");
                Err(e)
            }
        }
    }
}
