//! Report Registry: despacho do tipo de relatório para o construtor
use once_cell::sync::Lazy;
use rpt_core::{ReportDefinition, ReportError, ReportResult};
use std::collections::BTreeMap;

use crate::dump::SqlDumpReport;
use crate::options::ReportOptions;
use crate::script::ScriptReport;
use crate::template::TemplateReport;
use crate::{Report, ReportKind};

pub type ReportConstructor = fn(ReportDefinition, &ReportOptions) -> ReportResult<Box<dyn Report>>;

static GLOBAL: Lazy<ReportRegistry> = Lazy::new(ReportRegistry::standard);

fn template_report(definition: ReportDefinition, options: &ReportOptions) -> ReportResult<Box<dyn Report>> {
    Ok(Box::new(TemplateReport::new(definition, options)?))
}

fn sql_dump_report(definition: ReportDefinition, options: &ReportOptions) -> ReportResult<Box<dyn Report>> {
    Ok(Box::new(SqlDumpReport::new(definition, options)?))
}

fn script_report(definition: ReportDefinition, options: &ReportOptions) -> ReportResult<Box<dyn Report>> {
    Ok(Box::new(ScriptReport::new(definition, options)?))
}

/// Maps report type tags to constructors. Tags match case-insensitively,
/// with or without a `Report` suffix.
#[derive(Clone, Default)]
pub struct ReportRegistry {
    constructors: BTreeMap<String, (String, ReportConstructor)>,
}

impl std::fmt::Debug for ReportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRegistry").field("types", &self.types()).finish()
    }
}

fn key(tag: &str) -> String {
    let lower = tag.trim().to_ascii_lowercase();
    match lower.strip_suffix("report") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template, SqlDump and Script
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(ReportKind::Template.tag(), template_report);
        registry.register(ReportKind::SqlDump.tag(), sql_dump_report);
        registry.register(ReportKind::Script.tag(), script_report);
        registry
    }

    /// Process-wide standard registry, built on first use
    pub fn global() -> &'static ReportRegistry {
        &GLOBAL
    }

    pub fn register(&mut self, tag: &str, constructor: ReportConstructor) {
        self.constructors.insert(key(tag), (tag.to_string(), constructor));
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.constructors.contains_key(&key(tag))
    }

    /// Registered tags, as registered
    pub fn types(&self) -> Vec<&str> {
        self.constructors.values().map(|(tag, _)| tag.as_str()).collect()
    }

    /// Builds the report for `definition`. Constructor failures, such as a
    /// broken declaration pass, come back unchanged.
    pub fn create(&self, definition: ReportDefinition, options: &ReportOptions) -> ReportResult<Box<dyn Report>> {
        let Some((_, constructor)) = self.constructors.get(&key(&definition.report_type)) else {
            return Err(ReportError::Configuration(format!(
                "The report [{}] is not supported",
                definition.report_type
            )));
        };
        constructor(definition, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        let registry = ReportRegistry::standard();
        assert_eq!(registry.types(), vec!["Script", "SqlDump", "Template"]);
        assert!(registry.supports("sqldumpreport"));
        assert!(registry.supports(" TEMPLATE "));
        assert!(!registry.supports("Report"));
        assert!(!registry.supports("Jasper"));
    }

    #[test]
    fn test_create_by_tag() {
        let options = ReportOptions::default();
        let report = ReportRegistry::global()
            .create(ReportDefinition::new("Dump", "SqlDumpReport", "select 1;"), &options)
            .unwrap();
        assert_eq!(report.kind(), ReportKind::SqlDump);
        assert_eq!(report.name(), "Dump");
    }

    #[test]
    fn test_unknown_tag() {
        let err = ReportRegistry::standard()
            .create(ReportDefinition::new("x", "Jasper", ""), &ReportOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "CONFIG/The report [Jasper] is not supported");
    }

    #[test]
    fn test_declaration_failure_propagates() {
        let err = ReportRegistry::standard()
            .create(
                ReportDefinition::new("Broken", "Template", "{{declareParameter \"a\"}}"),
                &ReportOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "DECLARE");
        assert!(err.message().starts_with("Problem parsing Broken"));
    }
}
