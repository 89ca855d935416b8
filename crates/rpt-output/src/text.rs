//! Delimited text output (CSV/TSV)
use csv::{QuoteStyle, Terminator, WriterBuilder};
use rpt_core::{ExportFormat, ReportError, ReportResult};
use rpt_datasource::RowSet;
use std::io::Write;

use crate::options::OutputOptions;
use crate::SectionSink;

const DEFAULT_LINE_END: &str = "\r\n";

/// How records are written
#[derive(Debug, Clone, PartialEq)]
pub struct TextSettings {
    pub delimiter: u8,
    /// `None` never quotes
    pub quote: Option<u8>,
    /// `None` doubles the quote character
    pub escape: Option<u8>,
    pub line_end: String,
    pub header: bool,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: Some(b'"'),
            escape: None,
            line_end: DEFAULT_LINE_END.to_string(),
            header: true,
        }
    }
}

impl TextSettings {
    /// Settings for `format`. The delimiter defaults to TAB for TSV or a
    /// `.tsv` filename, options override every default.
    pub fn for_format(format: ExportFormat, filename: Option<&str>, options: &OutputOptions) -> Self {
        let mut settings = Self {
            header: options.header(),
            ..Self::default()
        };

        let tsv = format == ExportFormat::Tsv
            || filename.is_some_and(|f| f.to_ascii_lowercase().ends_with(".tsv"));
        if tsv {
            settings.delimiter = b'\t';
        }
        if let Some(d) = options.get("Delimiter").and_then(first_byte) {
            settings.delimiter = d;
        }
        if let Some(q) = options.get("Quote") {
            settings.quote = first_byte(q);
        }
        if let Some(e) = options.get("Escape") {
            settings.escape = first_byte(e);
        }
        if let Some(l) = options.get("LineEnd") {
            settings.line_end = unescape_line_end(l);
        }
        settings
    }

    fn builder(&self) -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .terminator(Terminator::Any(b'\n'));
        match self.quote {
            Some(q) => {
                builder.quote(q);
                match self.escape {
                    Some(e) if e != q => {
                        builder.double_quote(false).escape(e);
                    }
                    _ => {
                        builder.double_quote(true);
                    }
                }
            }
            None => {
                builder.quote_style(QuoteStyle::Never);
            }
        }
        builder
    }
}

fn first_byte(value: &str) -> Option<u8> {
    let unescaped = unescape_line_end(value);
    unescaped.bytes().next()
}

/// `\t`, `\n` and `\r` written as two characters become the control
/// characters
fn unescape_line_end(value: &str) -> String {
    value.replace("\\t", "\t").replace("\\n", "\n").replace("\\r", "\r")
}

/// Delimited text sink. Sections are not marked in the data; the header is
/// repeated at the start of each section.
pub struct TextOutput {
    settings: TextSettings,
    builder: WriterBuilder,
    buffer: Vec<u8>,
    sections: usize,
    header_pending: bool,
    rows: usize,
}

impl TextOutput {
    pub fn new(settings: TextSettings) -> Self {
        let builder = settings.builder();
        Self {
            settings,
            builder,
            buffer: Vec::new(),
            sections: 0,
            header_pending: false,
            rows: 0,
        }
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    fn write_record<I, T>(&mut self, record: I) -> ReportResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut writer = self.builder.from_writer(Vec::new());
        writer
            .write_record(record)
            .map_err(|e| ReportError::Output(format!("Cannot write delimited record - {}", e)))?;
        let mut bytes = writer
            .into_inner()
            .map_err(|e| ReportError::Output(format!("Cannot write delimited record - {}", e)))?;
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
        }
        self.buffer.extend_from_slice(&bytes);
        self.buffer.extend_from_slice(self.settings.line_end.as_bytes());
        Ok(())
    }
}

impl SectionSink for TextOutput {
    fn start_section(&mut self, name: Option<&str>) -> ReportResult<()> {
        tracing::trace!(section = ?name, "text section");
        self.sections += 1;
        self.header_pending = self.settings.header;
        Ok(())
    }

    fn write_rows(&mut self, rows: &RowSet) -> ReportResult<()> {
        if self.sections == 0 {
            self.start_section(None)?;
        }
        if self.header_pending {
            self.header_pending = false;
            self.write_record(rows.columns.iter().map(String::as_bytes))?;
        }
        for row in &rows.rows {
            let cells: Vec<String> = row.iter().map(|c| c.to_text()).collect();
            self.write_record(cells.iter().map(String::as_bytes))?;
            self.rows += 1;
        }
        Ok(())
    }

    fn section_count(&self) -> usize {
        self.sections
    }

    fn finish(self: Box<Self>, out: &mut dyn Write) -> ReportResult<()> {
        out.write_all(&self.buffer)?;
        Ok(())
    }
}
