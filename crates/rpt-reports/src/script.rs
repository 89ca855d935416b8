//! Script report: a Rhai script whose printed output is the report body
use rpt_core::{
    ExecutionResults, ExportFormat, ParameterSchema, Recipient, ReportDefinition, ReportResult,
    RuntimeParameter, RuntimeParameters, Task,
};
use rpt_datasource::DatasourceBindings;
use rpt_engine::ScriptEngine;
use rpt_output::clean_html;
use std::io::Write;

use crate::base::ReportBase;
use crate::options::ReportOptions;
use crate::{ExportRequest, Report, ReportKind};

pub struct ScriptReport {
    base: ReportBase,
}

impl ScriptReport {
    pub fn new(definition: ReportDefinition, options: &ReportOptions) -> ReportResult<Self> {
        Ok(Self {
            base: ReportBase::new(&definition, ReportKind::Script, options)?,
        })
    }
}

impl Report for ScriptReport {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn kind(&self) -> ReportKind {
        ReportKind::Script
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
            let mut engine = ScriptEngine::new(host.clone());
            engine.bind_all(&ctx.bindings());
            let output = engine.run(&base.script).map_err(|e| e.into_execution(&base.name))?;

            Ok(match request.format {
                ExportFormat::Text => clean_html(&output).into_bytes(),
                _ => output.into_bytes(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rpt_core::ReportError;
    use rpt_datasource::{SlotId, SqliteProvider};
    use std::sync::Arc;

    const SCRIPT: &str = r#"ReportHelper.declareParameter("limit", "Limit", "Rows to show", "2", false, "integer");
let rows = Source.query(`select name from site order by id limit ${limit}`);
print(`<h1>${rows.len()} of ${Source1.scalar("select count(*) from site")}</h1>`);
for row in rows {
    print(`<p>${row.name}</p>`);
}
ExecutionResults.setValue("shown", rows.len());
"#;

    fn bindings() -> DatasourceBindings {
        let sites = Arc::new(SqliteProvider::memory("sites").with_init_sql(
            "create table site (id integer, name text);
             insert into site values (1, 'Acme');
             insert into site values (2, 'Bolt');
             insert into site values (3, 'Crane');",
        ));
        DatasourceBindings::primary(sites.clone()).bind(SlotId::Source1, sites)
    }

    fn report(script: &str) -> ScriptReport {
        let mut report =
            ScriptReport::new(ReportDefinition::new("Sites", "Script", script), &ReportOptions::default()).unwrap();
        report.set_datasources(bindings());
        report
    }

    #[test]
    fn test_schema_and_sources() {
        let report = report(SCRIPT);
        assert_eq!(report.parameter_schema().names(), vec!["limit"]);
        assert_eq!(report.required_datasources(), 2);
        assert_eq!(report.supported_formats(), &[ExportFormat::Html, ExportFormat::Text]);
    }

    #[test]
    fn test_html_and_text() {
        let mut report = report(SCRIPT);
        report.set_parameters(RuntimeParameters::new().with("limit", 2));

        let mut out = Vec::new();
        let mut results = ExecutionResults::new();
        report
            .export(&ExportRequest::new(ExportFormat::Html), &mut out, &mut results)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<h1>2 of 3</h1>\n<p>Acme</p>\n<p>Bolt</p>\n"
        );
        assert_eq!(results.value("shown"), Some("2"));

        let mut out = Vec::new();
        report
            .export(&ExportRequest::new(ExportFormat::Text), &mut out, &mut ExecutionResults::new())
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2 of 3\n\nAcme\n\nBolt");
    }

    #[test]
    fn test_context_bindings() {
        let mut report = report(r#"print(`${InRunMode} ${type_of(Job)} ${Recipient.name}`);"#);
        report.set_recipient(Some(Recipient::parse("Ops <ops@example.com>")));
        let mut out = Vec::new();
        report
            .export(&ExportRequest::new(ExportFormat::Html), &mut out, &mut ExecutionResults::new())
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "true () ops@example.com\n");
    }

    #[test]
    fn test_error_names_the_line() {
        let mut report = report("let a = 1;\nlet b = a +;\n");
        let err = report
            .export(&ExportRequest::new(ExportFormat::Html), &mut Vec::new(), &mut ExecutionResults::new())
            .unwrap_err();
        assert!(matches!(err, ReportError::Execution(_)));
        assert!(err.message().contains("\n\t[let b = a +;]"));
    }
}
