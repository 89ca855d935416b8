//! Shared state between a hosted engine and the report that runs it
use parking_lot::Mutex;
use rpt_core::{ExecutionResults, ParameterDeclaration, ParameterSchema, ReportResult};
use rpt_datasource::{CellValue, DatasourceSet, RowSet, SlotId};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMode {
    /// Dry run collecting `declareParameter` calls; datasources are deferred
    Declare,
    Run,
}

struct HostState {
    report: String,
    mode: HostMode,
    schema: ParameterSchema,
    sources: DatasourceSet,
    results: ExecutionResults,
}

/// What a host hands back once evaluation is over
pub struct HostOutcome {
    pub schema: ParameterSchema,
    pub sources: DatasourceSet,
    pub results: ExecutionResults,
}

/// Capability object shared by template helpers and script bindings.
/// Cloning shares the same state.
#[derive(Clone)]
pub struct ScriptHost {
    inner: Arc<Mutex<HostState>>,
}

impl ScriptHost {
    /// Host for the declaration pass: every slot answers with no rows
    pub fn declaring(report: impl Into<String>) -> Self {
        Self::build(report.into(), HostMode::Declare, DatasourceSet::deferred(), ExecutionResults::new())
    }

    pub fn running(report: impl Into<String>, sources: DatasourceSet, results: ExecutionResults) -> Self {
        Self::build(report.into(), HostMode::Run, sources, results)
    }

    fn build(report: String, mode: HostMode, sources: DatasourceSet, results: ExecutionResults) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HostState {
                report,
                mode,
                schema: ParameterSchema::new(),
                sources,
                results,
            })),
        }
    }

    pub fn mode(&self) -> HostMode {
        self.inner.lock().mode
    }

    pub fn report(&self) -> String {
        self.inner.lock().report.clone()
    }

    pub fn declare_parameter(&self, declaration: ParameterDeclaration) {
        let mut state = self.inner.lock();
        tracing::debug!(report = %state.report, parameter = %declaration.name, "parameter declared");
        state.schema.declare(declaration);
    }

    pub fn query(&self, slot: SlotId, sql: &str) -> ReportResult<RowSet> {
        let mut state = self.inner.lock();
        state.sources.get(slot, sql)?.find(sql, None)
    }

    /// First column of the first row, `Null` when nothing came back
    pub fn scalar(&self, slot: SlotId, sql: &str) -> ReportResult<CellValue> {
        let mut state = self.inner.lock();
        let rows = state.sources.get(slot, sql)?.find(sql, Some(1))?;
        Ok(rows.first_value().cloned().unwrap_or(CellValue::Null))
    }

    pub fn execute(&self, slot: SlotId, sql: &str) -> ReportResult<usize> {
        let mut state = self.inner.lock();
        state.sources.get(slot, sql)?.execute(sql)
    }

    pub fn set_value(&self, key: &str, value: &str) {
        self.inner.lock().results.set_value(key, value);
    }

    /// Script logger, scoped by report name
    pub fn log(&self, level: &str, message: &str) {
        let report = self.report();
        match level.to_ascii_lowercase().as_str() {
            "error" => tracing::error!(target: "rpt::script", report = %report, "{}", message),
            "warn" | "warning" => tracing::warn!(target: "rpt::script", report = %report, "{}", message),
            "debug" => tracing::debug!(target: "rpt::script", report = %report, "{}", message),
            "trace" => tracing::trace!(target: "rpt::script", report = %report, "{}", message),
            _ => tracing::info!(target: "rpt::script", report = %report, "{}", message),
        }
    }

    /// Takes the schema, open sources and results out of the host. The host
    /// is left with an empty source set.
    pub fn finish(&self) -> HostOutcome {
        let mut state = self.inner.lock();
        HostOutcome {
            schema: std::mem::take(&mut state.schema),
            sources: std::mem::take(&mut state.sources),
            results: std::mem::take(&mut state.results),
        }
    }
}
