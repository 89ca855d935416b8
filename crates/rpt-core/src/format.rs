//! Export formats, column types and output compression
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format requested from a report export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Excel97,
    Excel2010,
    Word,
    Xml,
    Json,
    Rpt,
    Printer,
    Tsv,
    Csv,
    Html,
    Text,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 12] = [
        ExportFormat::Excel97,
        ExportFormat::Excel2010,
        ExportFormat::Word,
        ExportFormat::Xml,
        ExportFormat::Json,
        ExportFormat::Rpt,
        ExportFormat::Printer,
        ExportFormat::Tsv,
        ExportFormat::Csv,
        ExportFormat::Html,
        ExportFormat::Text,
        ExportFormat::Pdf,
    ];

    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Excel97 => "xls",
            Self::Excel2010 => "xlsx",
            Self::Word => "rtf",
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Rpt => "rpt",
            Self::Printer => "printer",
            Self::Tsv => "tsv",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Text => "txt",
            Self::Pdf => "pdf",
        }
    }

    /// Variant name as used in configuration (`EXCEL2010`)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Excel97 => "EXCEL97",
            Self::Excel2010 => "EXCEL2010",
            Self::Word => "WORD",
            Self::Xml => "XML",
            Self::Json => "JSON",
            Self::Rpt => "RPT",
            Self::Printer => "PRINTER",
            Self::Tsv => "TSV",
            Self::Csv => "CSV",
            Self::Html => "HTML",
            Self::Text => "TEXT",
            Self::Pdf => "PDF",
        }
    }

    /// Resolves a format from an extension or a variant name, ignoring case.
    /// Anything unrecognised falls back to [`ExportFormat::Text`].
    pub fn get_type(value: &str) -> ExportFormat {
        let value = value.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.extension().eq_ignore_ascii_case(value) || f.name().eq_ignore_ascii_case(value))
            .unwrap_or(ExportFormat::Text)
    }

    pub fn is(&self, formats: &[ExportFormat]) -> bool {
        formats.contains(self)
    }

    pub fn is_spreadsheet(&self) -> bool {
        matches!(self, Self::Excel97 | Self::Excel2010)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Excel97 => "application/vnd.ms-excel",
            Self::Excel2010 => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Word => "application/rtf",
            Self::Xml => "application/xml",
            Self::Json => "application/json",
            Self::Tsv => "text/tab-separated-values",
            Self::Csv => "text/csv",
            Self::Html => "text/html; charset=utf-8",
            Self::Text => "text/plain; charset=utf-8",
            Self::Pdf => "application/pdf",
            Self::Rpt | Self::Printer => "application/octet-stream",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Logical column types used by the spreadsheet writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Boolean,
    Integer,
    Double,
    String,
    Text,
    Blob,
    Date,
}

/// Compression applied to an exported artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    /// `gzip` and `compress` both select gzip, anything else is uncompressed
    pub fn from_name(name: Option<&str>) -> Compression {
        match name.map(|n| n.trim().to_ascii_lowercase()) {
            Some(n) if n == "gzip" || n == "compress" || n == "gz" => Compression::Gzip,
            _ => Compression::None,
        }
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
        }
    }
}
