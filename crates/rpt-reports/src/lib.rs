//! RPT Reports: tipos de relatório e despacho por tipo
//!
//! A report is built once per run request from its stored definition:
//! the script is snapshotted, the declaration pass collects its parameter
//! schema, then runtime parameters and datasources are set before
//! [`Report::export`] runs it. [`ReportJob`] drives that sequence for a
//! scheduled task, once per recipient group.
//!
//! # Report types
//!
//! ```text
//! Template  ── handlebars ──▶ HTML ──▶ HTML | TEXT | XML | JSON | PDF
//! SqlDump   ── handlebars ──▶ directives + SQL ──▶ sections ──▶ XLS(X) | CSV | TSV
//! Script    ── rhai ───────▶ printed HTML ──▶ HTML | TEXT
//! ```

mod base;
mod dump;
mod job;
mod options;
mod phase;
mod registry;
mod script;
mod template;

pub use dump::{split_commands, Directive, SqlDumpReport};
pub use job::{GroupOutput, ReportJob, TaskRun};
pub use options::ReportOptions;
pub use phase::{ExportPhase, PhaseTracker};
pub use registry::{ReportConstructor, ReportRegistry};
pub use script::ScriptReport;
pub use template::TemplateReport;

use rpt_core::{
    Compression, ExecutionResults, ExportFormat, ParameterSchema, Recipient, ReportResult,
    RuntimeParameter, RuntimeParameters, Task,
};
use rpt_datasource::DatasourceBindings;
use rpt_engine::ScriptDialect;
use rpt_output::OutputOptions;
use std::fmt;
use std::io::Write;

// ============================================================================
// REPORT KINDS
// ============================================================================

/// The three report types the registry knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Template,
    SqlDump,
    Script,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [Self::Template, Self::SqlDump, Self::Script];

    /// Type tag stored in report definitions
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Template => "Template",
            Self::SqlDump => "SqlDump",
            Self::Script => "Script",
        }
    }

    pub fn dialect(&self) -> ScriptDialect {
        match self {
            Self::Template => ScriptDialect::Template,
            Self::SqlDump => ScriptDialect::SqlDump,
            Self::Script => ScriptDialect::Script,
        }
    }

    /// Extension of a script override file
    pub fn script_extension(&self) -> &'static str {
        match self {
            Self::Template => "hbs",
            Self::SqlDump => "sql",
            Self::Script => "rhai",
        }
    }

    pub fn supported_formats(&self) -> &'static [ExportFormat] {
        match self {
            Self::Template => &[
                ExportFormat::Pdf,
                ExportFormat::Html,
                ExportFormat::Text,
                ExportFormat::Xml,
                ExportFormat::Json,
            ],
            Self::SqlDump => &[
                ExportFormat::Excel97,
                ExportFormat::Excel2010,
                ExportFormat::Csv,
                ExportFormat::Tsv,
            ],
            Self::Script => &[ExportFormat::Html, ExportFormat::Text],
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ============================================================================
// EXPORT REQUEST
// ============================================================================

/// What one export call should produce
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub compression: Compression,
    /// Destination name hint; a `.tsv` name switches the delimiter to TAB
    pub filename: Option<String>,
    /// Adapter options. Unset ones are read from the runtime parameters.
    pub options: OutputOptions,
}

impl ExportRequest {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            compression: Compression::None,
            filename: None,
            options: OutputOptions::new(),
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_option(mut self, name: &str, value: impl Into<String>) -> Self {
        self.options.set(name, value);
        self
    }
}

// ============================================================================
// REPORT TRAIT
// ============================================================================

/// A report instance built from a definition
pub trait Report: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> ReportKind;

    /// Parameters collected by the declaration pass
    fn parameter_schema(&self) -> &ParameterSchema;

    /// Primary datasource plus every numbered slot the script references
    fn required_datasources(&self) -> usize;

    fn supported_formats(&self) -> &'static [ExportFormat] {
        self.kind().supported_formats()
    }

    fn set_parameters(&mut self, parameters: RuntimeParameters);

    fn set_datasources(&mut self, bindings: DatasourceBindings);

    fn set_recipient(&mut self, recipient: Option<Recipient>);

    fn set_job(&mut self, job: Option<Task>);

    /// Runtime parameter by name, case-insensitively
    fn parameter(&self, name: &str) -> Option<&RuntimeParameter>;

    /// Runs the report and writes the artifact to `out`. Nothing is
    /// written unless the run succeeds; datasources are closed either way.
    fn export(
        &mut self,
        request: &ExportRequest,
        out: &mut dyn Write,
        results: &mut ExecutionResults,
    ) -> ReportResult<()>;
}

impl fmt::Debug for dyn Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
