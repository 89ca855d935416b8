//! Template report: Handlebars rendering HTML, text, XML or JSON
use rpt_core::{
    ExecutionResults, ExportFormat, ParameterSchema, Recipient, ReportDefinition, ReportResult,
    RuntimeParameter, RuntimeParameters, Task,
};
use rpt_datasource::DatasourceBindings;
use rpt_engine::TemplateEngine;
use rpt_output::{clean_html, PdfPipeline};
use std::io::Write;

use crate::base::ReportBase;
use crate::options::ReportOptions;
use crate::{ExportRequest, Report, ReportKind};

pub struct TemplateReport {
    base: ReportBase,
    pdf: PdfPipeline,
}

impl TemplateReport {
    pub fn new(definition: ReportDefinition, options: &ReportOptions) -> ReportResult<Self> {
        Ok(Self {
            base: ReportBase::new(&definition, ReportKind::Template, options)?,
            pdf: options.pdf.clone(),
        })
    }
}

impl Report for TemplateReport {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn kind(&self) -> ReportKind {
        ReportKind::Template
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
        let pdf = &self.pdf;
        base.run_export(request, out, results, |ctx, host| {
            let html = TemplateEngine::new(host.clone())
                .render(&base.script, &base.template_bindings(ctx))
                .map_err(|e| e.into_execution(&base.name))?;

            match request.format {
                ExportFormat::Text => Ok(clean_html(&html).into_bytes()),
                ExportFormat::Pdf => {
                    let mut bytes = Vec::new();
                    pdf.render(&html, &mut bytes)?;
                    Ok(bytes)
                }
                _ => Ok(html.into_bytes()),
            }
        })
    }
}
