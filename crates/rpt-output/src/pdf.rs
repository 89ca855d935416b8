//! HTML to PDF pipeline
//!
//! The captured HTML is written to a temporary directory, flattened by an
//! [`HtmlFlattener`] and converted by a [`PdfWriter`]. Both stages default
//! to external programs described by a [`CommandSpec`].
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use rpt_core::{ReportError, ReportResult};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

lazy_static! {
    static ref HEAD_END: Regex = Regex::new(r"(?i)</head\s*>").unwrap();
}

/// Page setup handed to both stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    pub page_size: String,
    pub inset_mm: u32,
    pub html_width: u32,
    pub outlines: bool,
    pub user_style: String,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            page_size: "A4".to_string(),
            inset_mm: 10,
            html_width: 1300,
            outlines: true,
            user_style: "BODY {margin:0}".to_string(),
        }
    }
}

impl PdfSettings {
    /// Adds the user style to `html`, inside `<head>` when there is one
    pub fn inject_style(&self, html: &str) -> String {
        let style = format!("<style>{}</style>", self.user_style);
        if HEAD_END.is_match(html) {
            HEAD_END
                .replacen(html, 1, |caps: &Captures| format!("{}{}", style, &caps[0]))
                .into_owned()
        } else {
            format!("{}{}", style, html)
        }
    }
}

/// Renders an HTML file into flattened, self-contained HTML
pub trait HtmlFlattener: Send + Sync {
    fn flatten(&self, input: &Path, output: &Path, settings: &PdfSettings) -> ReportResult<()>;
}

/// Converts flattened HTML into a PDF file
pub trait PdfWriter: Send + Sync {
    fn write_pdf(&self, input: &Path, output: &Path, settings: &PdfSettings) -> ReportResult<()>;
}

/// Flattener for HTML that needs no rendering
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFlattener;

impl HtmlFlattener for PassthroughFlattener {
    fn flatten(&self, input: &Path, output: &Path, _settings: &PdfSettings) -> ReportResult<()> {
        std::fs::copy(input, output)?;
        Ok(())
    }
}

/// External program run for a pipeline stage.
///
/// Arguments may hold placeholders: `{input}`, `{output}`, `{width}`,
/// `{page_size}`, `{inset_mm}` and `{outline}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// `wkhtmltopdf` with the standard page setup
    pub fn wkhtmltopdf() -> Self {
        Self::new(
            "wkhtmltopdf",
            &[
                "--quiet",
                "--page-size",
                "{page_size}",
                "--margin-top",
                "{inset_mm}mm",
                "--margin-bottom",
                "{inset_mm}mm",
                "--margin-left",
                "{inset_mm}mm",
                "--margin-right",
                "{inset_mm}mm",
                "--viewport-size",
                "{width}x1024",
                "{outline}",
                "{input}",
                "{output}",
            ],
        )
    }

    fn expand(&self, input: &Path, output: &Path, settings: &PdfSettings) -> Vec<String> {
        let outline = if settings.outlines { "--outline" } else { "--no-outline" };
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{width}", &settings.html_width.to_string())
                    .replace("{page_size}", &settings.page_size)
                    .replace("{inset_mm}", &settings.inset_mm.to_string())
                    .replace("{outline}", outline)
            })
            .collect()
    }

    pub fn run(&self, input: &Path, output: &Path, settings: &PdfSettings) -> ReportResult<()> {
        let args = self.expand(input, output, settings);
        tracing::debug!(program = %self.program, ?args, "running pdf stage");

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| ReportError::Output(format!("Cannot start {} - {}", self.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ReportError::Output(format!(
                "{} failed ({}) - {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl HtmlFlattener for CommandSpec {
    fn flatten(&self, input: &Path, output: &Path, settings: &PdfSettings) -> ReportResult<()> {
        self.run(input, output, settings)
    }
}

impl PdfWriter for CommandSpec {
    fn write_pdf(&self, input: &Path, output: &Path, settings: &PdfSettings) -> ReportResult<()> {
        self.run(input, output, settings)
    }
}

/// Flattener and writer run in sequence over temporary files
#[derive(Clone)]
pub struct PdfPipeline {
    flattener: Arc<dyn HtmlFlattener>,
    writer: Arc<dyn PdfWriter>,
    settings: PdfSettings,
}

impl Default for PdfPipeline {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughFlattener), Arc::new(CommandSpec::wkhtmltopdf()))
    }
}

impl std::fmt::Debug for PdfPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfPipeline").field("settings", &self.settings).finish_non_exhaustive()
    }
}

impl PdfPipeline {
    pub fn new(flattener: Arc<dyn HtmlFlattener>, writer: Arc<dyn PdfWriter>) -> Self {
        Self {
            flattener,
            writer,
            settings: PdfSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PdfSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &PdfSettings {
        &self.settings
    }

    /// Converts `html` and writes the PDF bytes to `out`. Temporary files
    /// are removed whether or not a stage fails.
    pub fn render(&self, html: &str, out: &mut dyn Write) -> ReportResult<()> {
        let dir = tempfile::Builder::new().prefix("rpt-pdf").tempdir()?;
        let source = dir.path().join("report.html");
        let flat = dir.path().join("report.flat.html");
        let pdf = dir.path().join("report.pdf");

        std::fs::write(&source, self.settings.inject_style(html))?;
        self.flattener.flatten(&source, &flat, &self.settings)?;
        self.writer.write_pdf(&flat, &pdf, &self.settings)?;

        let bytes = std::fs::read(&pdf)
            .map_err(|e| ReportError::Output(format!("PDF writer produced no output - {}", e)))?;
        out.write_all(&bytes)?;
        tracing::debug!(bytes = bytes.len(), "pdf rendered");
        Ok(())
    }
}
