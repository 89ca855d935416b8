//! SQL-dump report: a template that renders to directives and SQL whose
//! results are written as sections (worksheets or delimited text)
use lazy_static::lazy_static;
use regex::Regex;
use rpt_core::{
    ExecutionResults, ParameterSchema, Recipient, ReportDefinition, ReportError, ReportResult,
    RuntimeParameter, RuntimeParameters, Task,
};
use rpt_datasource::{DatasourceBindings, SlotId};
use rpt_engine::{ScriptHost, TemplateEngine};
use rpt_output::{section_sink, SectionSink};
use std::io::Write;

use crate::base::ReportBase;
use crate::options::ReportOptions;
use crate::{ExportRequest, Report, ReportKind};

lazy_static! {
    static ref COMMAND_SPLIT: Regex = Regex::new(r"\s*;\t* *\r?\n\s*").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"[\n\r\t ]+").unwrap();
    static ref NEWSHEET: Regex = Regex::new(r#"(?is)^newsheet\s+"([^"]+)"$"#).unwrap();
    static ref SUPPRESS: Regex = Regex::new(r"(?is)^suppressnewsheets$").unwrap();
    static ref SETVALUE: Regex = Regex::new(r"(?is)^setvalue (.+=.+)$").unwrap();
    static ref USE_SOURCE: Regex = Regex::new(r"(?is)^use\s+((?:datasource|database)[1-4]?)\s*$").unwrap();
    static ref SELECT: Regex = Regex::new(r"(?is)^select\s.*$").unwrap();
}

/// Splits rendered script text into single-line commands. Blank commands
/// are dropped and runs of whitespace become one space.
pub fn split_commands(text: &str) -> Vec<String> {
    COMMAND_SPLIT
        .split(text)
        .map(|command| {
            let command = command.trim().trim_end_matches(';');
            WHITESPACE.replace_all(command, " ").trim().to_string()
        })
        .filter(|command| !command.is_empty())
        .collect()
}

/// One command of a dump script, first match wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    /// `newsheet "<name>"`
    NewSheet(&'a str),
    /// `suppressnewsheets`
    SuppressNewSheets,
    /// `setvalue <key>=<value>`
    SetValue { key: &'a str, value: &'a str },
    /// `setvalue` with more than one `=`; ignored
    Malformed(&'a str),
    /// `use datasource[1-4]` or `use database[1-4]`
    Use(SlotId),
    Select(&'a str),
    /// Anything else, run for effect
    Statement(&'a str),
}

impl<'a> Directive<'a> {
    pub fn parse(command: &'a str) -> Self {
        if let Some(caps) = NEWSHEET.captures(command) {
            if let Some(name) = caps.get(1) {
                return Directive::NewSheet(name.as_str());
            }
        }
        if SUPPRESS.is_match(command) {
            return Directive::SuppressNewSheets;
        }
        if let Some(pair) = SETVALUE.captures(command).and_then(|caps| caps.get(1)) {
            let parts: Vec<&str> = pair.as_str().split('=').collect();
            return match parts.as_slice() {
                [key, value] => Directive::SetValue {
                    key: key.trim(),
                    value: value.trim(),
                },
                _ => Directive::Malformed(command),
            };
        }
        if let Some(source) = USE_SOURCE.captures(command).and_then(|caps| caps.get(1)) {
            if let Some(slot) = SlotId::parse(source.as_str()) {
                return Directive::Use(slot);
            }
        }
        if SELECT.is_match(command) {
            return Directive::Select(command);
        }
        Directive::Statement(command)
    }
}

/// Runs the commands of one export against the host, feeding the sink
struct DumpRun<'a> {
    host: &'a ScriptHost,
    bindings: &'a DatasourceBindings,
    sink: Box<dyn SectionSink>,
    slot: SlotId,
    section_created: bool,
    create_new_sheets: bool,
}

impl<'a> DumpRun<'a> {
    fn new(host: &'a ScriptHost, bindings: &'a DatasourceBindings, sink: Box<dyn SectionSink>) -> Self {
        Self {
            host,
            bindings,
            sink,
            slot: SlotId::Primary,
            section_created: false,
            create_new_sheets: true,
        }
    }

    fn run(&mut self, command: &str) -> ReportResult<()> {
        match Directive::parse(command) {
            Directive::NewSheet(name) => {
                tracing::debug!(section = name, "adding a section");
                self.sink.start_section(Some(name))?;
                self.section_created = true;
                self.create_new_sheets = true;
            }
            Directive::SuppressNewSheets => {
                tracing::debug!("new sheets turned off");
                self.create_new_sheets = false;
            }
            Directive::SetValue { key, value } => {
                tracing::debug!(key, value, "setting value");
                self.host.set_value(key, value);
            }
            Directive::Malformed(command) => {
                tracing::warn!(command, "setvalue needs exactly one key=value pair");
            }
            Directive::Use(slot) => {
                if !self.bindings.is_bound(slot) {
                    tracing::error!(slot = %slot, "changed to an unbound datasource");
                    return Err(ReportError::DatasourceUnbound {
                        slot: slot.to_string(),
                        command: command.to_string(),
                    });
                }
                tracing::debug!(slot = %slot, "changed datasource");
                self.slot = slot;
            }
            Directive::Select(sql) => {
                let rows = self.host.query(self.slot, sql).map_err(|e| command_error(command, e))?;
                tracing::debug!(rows = rows.len(), "select done");
                if !self.section_created {
                    self.sink.start_section(None)?;
                }
                self.sink.write_rows(&rows)?;
                if self.create_new_sheets {
                    self.section_created = true;
                }
            }
            Directive::Statement(sql) => {
                let affected = self.host.execute(self.slot, sql).map_err(|e| command_error(command, e))?;
                tracing::debug!(affected, "statement done");
            }
        }
        Ok(())
    }

    fn finish(self) -> ReportResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.sink.finish(&mut bytes)?;
        Ok(bytes)
    }
}

fn command_error(command: &str, e: ReportError) -> ReportError {
    match e {
        ReportError::DatasourceUnbound { .. } => e,
        other => ReportError::Execution(format!("Problem running command [{}] - {}", command, other.message())),
    }
}

pub struct SqlDumpReport {
    base: ReportBase,
}

impl SqlDumpReport {
    pub fn new(definition: ReportDefinition, options: &ReportOptions) -> ReportResult<Self> {
        Ok(Self {
            base: ReportBase::new(&definition, ReportKind::SqlDump, options)?,
        })
    }
}

impl Report for SqlDumpReport {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn kind(&self) -> ReportKind {
        ReportKind::SqlDump
    }

    fn parameter_schema(&self) -> &ParameterSchema {
        &self.base.schema
    }

    fn required_datasources(&self) -> usize {
        self.base.datasources
    }

    fn set_parameters(&mut self, parameters: RuntimeParameters) {
        self.base.parameters = parameters;
    }

    fn set_datasources(&mut self, bindings: DatasourceBindings) {
        self.base.bindings = bindings;
    }

    fn set_recipient(&mut self, recipient: Option<Recipient>) {
        self.base.recipient = recipient;
    }

    fn set_job(&mut self, job: Option<Task>) {
        self.base.job = job;
    }

    fn parameter(&self, name: &str) -> Option<&RuntimeParameter> {
        self.base.parameter(name)
    }

    fn export(
        &mut self,
        request: &ExportRequest,
        out: &mut dyn Write,
        results: &mut ExecutionResults,
    ) -> ReportResult<()> {
        let base = &self.base;
        base.run_export(request, out, results, |ctx, host| {
            let text = TemplateEngine::plain(host.clone())
                .render(&base.script, &base.template_bindings(ctx))
                .map_err(|e| e.into_execution(&base.name))?;

            let commands = split_commands(&text);
            if commands.is_empty() {
                return Err(ReportError::Execution(format!("No commands to run for {}", base.name)));
            }

            let options = base.output_options(request);
            let sink = section_sink(request.format, request.filename.as_deref(), &options)?;
            let mut run = DumpRun::new(host, &base.bindings, sink);
            for command in &commands {
                run.run(command)?;
            }
            run.finish()
        })
    }
}
