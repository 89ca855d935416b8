//! Scheduled task run: parameters resolved per recipient group, one export each
use rpt_core::{ExecutionResults, Recipient, ReportResult, Task};
use rpt_engine::ParameterResolver;

use crate::{ExportRequest, Report};

/// Artifact produced for one recipient group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutput {
    pub recipients: Vec<Recipient>,
    pub artifact: Vec<u8>,
    pub results: ExecutionResults,
}

/// Outcome of [`ReportJob::publish`]. A failed group leaves its message in
/// `errors` and does not stop the groups after it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRun {
    pub outputs: Vec<GroupOutput>,
    pub errors: Vec<String>,
}

impl TaskRun {
    pub fn in_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Runs a report for a scheduled task. Raw parameter values are kept as the
/// task stores them and resolved again for every run.
#[derive(Clone)]
pub struct ReportJob {
    task: Task,
    resolver: ParameterResolver,
    parameters: Vec<(String, Option<String>)>,
}

impl ReportJob {
    pub fn new(task: Task, resolver: ParameterResolver) -> Self {
        Self {
            task,
            resolver,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, raw: Option<&str>) -> Self {
        self.parameters.push((name.into(), raw.map(String::from)));
        self
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Single export with task-level substitution only
    pub fn run(&self, report: &mut dyn Report, request: &ExportRequest) -> ReportResult<GroupOutput> {
        let parameters = self.resolver.resolve_all(&self.parameters, &self.task, None)?;
        report.set_job(Some(self.task.clone()));
        report.set_recipient(None);
        report.set_parameters(parameters);
        Self::export(report, request, Vec::new())
    }

    /// One export per recipient group; substitution uses the first
    /// recipient of each group
    pub fn publish(&self, report: &mut dyn Report, request: &ExportRequest, groups: &[Vec<Recipient>]) -> TaskRun {
        tracing::debug!(task = %self.task.name, groups = groups.len(), "publishing to recipient groups");
        let mut run = TaskRun::default();
        for group in groups {
            match self.publish_group(report, request, group) {
                Ok(output) => run.outputs.push(output),
                Err(e) => {
                    tracing::error!(task = %self.task.name, report = %report.name(), error = %e, "Problem running scheduled task");
                    run.errors.push(e.message());
                }
            }
        }
        tracing::info!(
            task = %self.task.name,
            produced = run.outputs.len(),
            failed = run.errors.len(),
            "scheduled task finished"
        );
        run
    }

    fn publish_group(
        &self,
        report: &mut dyn Report,
        request: &ExportRequest,
        group: &[Recipient],
    ) -> ReportResult<GroupOutput> {
        let parameters = self.resolver.resolve_all(&self.parameters, &self.task, Some(group))?;
        report.set_job(Some(self.task.clone()));
        report.set_recipient(group.first().cloned());
        report.set_parameters(parameters);
        Self::export(report, request, group.to_vec())
    }

    fn export(report: &mut dyn Report, request: &ExportRequest, recipients: Vec<Recipient>) -> ReportResult<GroupOutput> {
        let mut artifact = Vec::new();
        let mut results = ExecutionResults::new();
        report.export(request, &mut artifact, &mut results)?;
        Ok(GroupOutput {
            recipients,
            artifact,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReportOptions, ScriptReport, SqlDumpReport};
    use pretty_assertions::assert_eq;
    use rpt_core::{ExportFormat, ReportDefinition};
    use rpt_datasource::{DatasourceBindings, SqliteProvider};
    use std::sync::Arc;

    fn sites() -> Arc<SqliteProvider> {
        Arc::new(SqliteProvider::memory("sites").with_init_sql(
            "create table site (id integer, name text, region text);
             insert into site values (1, 'Acme', 'north');
             insert into site values (2, 'Bolt', 'south');
             insert into site values (3, 'Crane', 'north');",
        ))
    }

    fn dump_report() -> SqlDumpReport {
        let script = "{{declareParameter \"region\" \"Region\" \"\"}}\nselect name from site where region = '{{region}}' order by id;\n";
        let mut report =
            SqlDumpReport::new(ReportDefinition::new("Regions", "SqlDump", script), &ReportOptions::default()).unwrap();
        report.set_datasources(DatasourceBindings::primary(sites()));
        report
    }

    fn job() -> ReportJob {
        let mut task = Task::new("t1", "Nightly");
        task.variables.insert("Fallback".into(), "south".into());
        ReportJob::new(task, ParameterResolver::new("http://rpt.local").with_lookup(sites()))
    }

    fn csv() -> ExportRequest {
        ExportRequest::new(ExportFormat::Csv).with_option("Header", "no")
    }

    fn text(output: &GroupOutput) -> String {
        String::from_utf8(output.artifact.clone()).unwrap()
    }

    #[test]
    fn test_run_resolves_task_variables() {
        let job = job().with_parameter("Region", Some(" $Fallback "));
        let output = job.run(&mut dump_report(), &csv()).unwrap();
        assert_eq!(text(&output), "Bolt\r\n");
        assert!(output.recipients.is_empty());
    }

    #[test]
    fn test_run_with_select_lookup() {
        let job = job().with_parameter("region", Some("select region from site where id = 3"));
        let output = job.run(&mut dump_report(), &csv()).unwrap();
        assert_eq!(text(&output), "Acme\r\nCrane\r\n");
    }

    #[test]
    fn test_publish_per_recipient_group() {
        let groups = vec![
            vec![Recipient::new("ann@x.org", None).with_value("Area", "north")],
            vec![
                Recipient::new("bob@x.org", None).with_value("Area", "south"),
                Recipient::new("cy@x.org", None).with_value("Area", "north"),
            ],
        ];
        let job = job().with_parameter("region", Some("$Area"));
        let run = job.publish(&mut dump_report(), &csv(), &groups);

        assert!(!run.in_error());
        assert_eq!(run.outputs.len(), 2);
        assert_eq!(text(&run.outputs[0]), "Acme\r\nCrane\r\n");
        assert_eq!(text(&run.outputs[1]), "Bolt\r\n");
        assert_eq!(run.outputs[1].recipients.len(), 2);
    }

    #[test]
    fn test_failed_group_does_not_stop_the_rest() {
        let groups = vec![
            vec![Recipient::new("ann@x.org", None).with_value("Site", "9")],
            vec![Recipient::new("bob@x.org", None).with_value("Site", "1")],
        ];
        let job = job().with_parameter("region", Some("select region from site where id = $Site"));
        let run = job.publish(&mut dump_report(), &csv(), &groups);

        assert_eq!(run.errors.len(), 1);
        assert!(run.errors[0].starts_with("The parameter lookup for [region] is empty"));
        assert_eq!(run.outputs.len(), 1);
        assert_eq!(text(&run.outputs[0]), "Acme\r\nCrane\r\n");
    }

    #[test]
    fn test_recipient_is_bound_for_scripts() {
        let script = "print(`<p>${Recipient.name} ${greeting}</p>`);";
        let mut report =
            ScriptReport::new(ReportDefinition::new("Hello", "Script", script), &ReportOptions::default()).unwrap();
        let groups = vec![vec![Recipient::parse("Ann <ann@x.org>")]];
        let job = job().with_parameter("greeting", Some("for ${Recipient.descriptiveName}"));
        let run = job.publish(&mut report, &ExportRequest::new(ExportFormat::Html), &groups);

        assert_eq!(run.errors, Vec::<String>::new());
        assert_eq!(text(&run.outputs[0]), "<p>ann@x.org for Ann</p>\n");
    }
}
