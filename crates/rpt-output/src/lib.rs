//! RPT Output: adaptadores de saída dos relatórios
//!
//! Report bodies leave the engine either as captured text (HTML, text) or as
//! row sections (SQL-dump reports). This crate turns them into artifacts:
//! - [`TextOutput`]: CSV/TSV through the `csv` crate
//! - [`ExcelOutput`]: one worksheet per section through `rust_xlsxwriter`
//! - [`clean_html`]: text rendition of an HTML body
//! - [`PdfPipeline`]: HTML to PDF through pluggable external tools
//! - [`write_compressed`]: optional gzip of the final bytes
//!
//! Sinks buffer until [`SectionSink::finish`] so a failed run writes
//! nothing to the destination.

pub mod compress;
pub mod excel;
pub mod html;
pub mod options;
pub mod pdf;
pub mod text;

pub use compress::write_compressed;
pub use excel::ExcelOutput;
pub use html::clean_html;
pub use options::OutputOptions;
pub use pdf::{CommandSpec, HtmlFlattener, PassthroughFlattener, PdfPipeline, PdfSettings, PdfWriter};
pub use text::{TextOutput, TextSettings};

use rpt_core::{ExportFormat, ReportResult};
use rpt_datasource::RowSet;
use std::io::Write;

/// Destination for row sections
pub trait SectionSink {
    /// Starts a new section; `None` for an unnamed one
    fn start_section(&mut self, name: Option<&str>) -> ReportResult<()>;

    /// Appends rows to the current section, opening an unnamed section
    /// first when none exists
    fn write_rows(&mut self, rows: &RowSet) -> ReportResult<()>;

    fn section_count(&self) -> usize;

    /// Writes the finished artifact to `out`
    fn finish(self: Box<Self>, out: &mut dyn Write) -> ReportResult<()>;
}

/// Sink for a row-section export format
pub fn section_sink(
    format: ExportFormat,
    filename: Option<&str>,
    options: &OutputOptions,
) -> ReportResult<Box<dyn SectionSink>> {
    if format.is_spreadsheet() {
        Ok(Box::new(ExcelOutput::new(options.header())))
    } else {
        Ok(Box::new(TextOutput::new(TextSettings::for_format(format, filename, options))))
    }
}
