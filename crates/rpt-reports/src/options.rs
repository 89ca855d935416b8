//! Settings shared by every report a registry builds
use rpt_core::{ReportDefinition, ReportResult};
use rpt_output::PdfPipeline;
use std::path::PathBuf;

use crate::ReportKind;

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Base URL handed to scripts as `AppPath`
    pub app_path: String,
    /// Directory whose `<name>.<ext>` files replace stored scripts
    pub script_override_dir: Option<PathBuf>,
    pub pdf: PdfPipeline,
}

impl ReportOptions {
    pub fn new(app_path: impl Into<String>) -> Self {
        Self {
            app_path: app_path.into(),
            ..Self::default()
        }
    }

    pub fn with_override_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_override_dir = Some(dir.into());
        self
    }

    pub fn with_pdf(mut self, pdf: PdfPipeline) -> Self {
        self.pdf = pdf;
        self
    }

    /// Script text for `definition`: the override file when one exists,
    /// otherwise the stored script
    pub fn script_for(&self, definition: &ReportDefinition, kind: ReportKind) -> ReportResult<String> {
        if let Some(dir) = self.script_override_dir.as_ref().filter(|d| d.is_dir()) {
            let file = dir.join(format!("{}.{}", definition.name, kind.script_extension()));
            if file.is_file() {
                tracing::warn!(report = %definition.name, file = %file.display(), "overriding stored script");
                return Ok(std::fs::read_to_string(file)?);
            }
        }
        Ok(definition.script.clone())
    }
}
