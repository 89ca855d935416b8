//! Spreadsheet output: one worksheet per section
use rpt_core::{ReportError, ReportResult};
use rpt_datasource::{CellValue, RowSet};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::io::Write;

use crate::SectionSink;

/// Longest string written to a cell
pub const MAX_CELL_TEXT: usize = 5000;
const TRUNCATED_SUFFIX: &str = "...(truncated)";
const MAX_SHEET_NAME: usize = 31;
const MAX_ROWS: u32 = 1_048_576;
const MAX_COLUMNS: u16 = 16_384;
const DEFAULT_ROW_HEIGHT: f64 = 15.0;

/// Number format family of a column, taken from the first row of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Real,
    Date,
    Timestamp,
    Time,
    Other,
}

impl ColumnKind {
    fn of(cell: &CellValue) -> Self {
        match cell {
            CellValue::Integer(_) => Self::Integer,
            CellValue::Double(_) => Self::Real,
            CellValue::Date(_) => Self::Date,
            CellValue::Timestamp(_) => Self::Timestamp,
            CellValue::Time(_) => Self::Time,
            _ => Self::Other,
        }
    }
}

struct Formats {
    header: Format,
    integer: Format,
    real: Format,
    date: Format,
    timestamp: Format,
    time: Format,
    plain: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            integer: Format::new().set_num_format("0"),
            real: Format::new().set_num_format("#,##0.00"),
            date: Format::new().set_num_format("dd/mm/yyyy"),
            timestamp: Format::new().set_num_format("dd/mm/yyyy hh:mm"),
            time: Format::new().set_num_format("hh:mm:ss"),
            plain: Format::new(),
        }
    }

    fn number(&self, kind: ColumnKind) -> &Format {
        match kind {
            ColumnKind::Real => &self.real,
            _ => &self.integer,
        }
    }
}

struct Section {
    sheet: Worksheet,
    next_row: u32,
    kinds: Option<Vec<ColumnKind>>,
}

/// Workbook sink. The header row is bold, taller than the default and
/// frozen; columns are auto-fitted when the workbook is finished.
pub struct ExcelOutput {
    header: bool,
    formats: Formats,
    finished: Vec<Worksheet>,
    names: Vec<String>,
    current: Option<Section>,
}

impl ExcelOutput {
    pub fn new(header: bool) -> Self {
        Self {
            header,
            formats: Formats::new(),
            finished: Vec::new(),
            names: Vec::new(),
            current: None,
        }
    }

    fn close_current(&mut self) {
        if let Some(mut section) = self.current.take() {
            section.sheet.autofit();
            self.finished.push(section.sheet);
        }
    }

    fn write_header(formats: &Formats, section: &mut Section, columns: &[String]) -> ReportResult<()> {
        let row = section.next_row;
        for (col, name) in columns.iter().enumerate() {
            section
                .sheet
                .write_string_with_format(row, column(col)?, name.as_str(), &formats.header)
                .map_err(xlsx_error)?;
        }
        section
            .sheet
            .set_row_height(row, DEFAULT_ROW_HEIGHT * 1.5)
            .map_err(xlsx_error)?;
        section.sheet.set_freeze_panes(row + 1, 0).map_err(xlsx_error)?;
        section.next_row += 1;
        Ok(())
    }

    fn write_cell(
        formats: &Formats,
        sheet: &mut Worksheet,
        row: u32,
        col: u16,
        kind: ColumnKind,
        cell: &CellValue,
    ) -> Result<(), XlsxError> {
        match cell {
            CellValue::Null => {}
            CellValue::Bool(b) => {
                sheet.write_boolean_with_format(row, col, *b, &formats.plain)?;
            }
            CellValue::Integer(i) => {
                sheet.write_number_with_format(row, col, *i as f64, formats.number(kind))?;
            }
            CellValue::Double(d) => {
                let format = if kind == ColumnKind::Integer { &formats.real } else { formats.number(kind) };
                sheet.write_number_with_format(row, col, *d, format)?;
            }
            CellValue::Date(d) => {
                sheet.write_datetime_with_format(row, col, d, &formats.date)?;
            }
            CellValue::Timestamp(t) => {
                sheet.write_datetime_with_format(row, col, t, &formats.timestamp)?;
            }
            CellValue::Time(t) => {
                sheet.write_datetime_with_format(row, col, t, &formats.time)?;
            }
            CellValue::Text(_) | CellValue::Blob(_) => {
                sheet.write_string_with_format(row, col, truncate_text(cell.to_text()), &formats.plain)?;
            }
        }
        Ok(())
    }
}

fn xlsx_error(e: XlsxError) -> ReportError {
    ReportError::Output(format!("Cannot write workbook - {}", e))
}

/// Worksheet column index, refusing results wider than a sheet
fn column(index: usize) -> ReportResult<u16> {
    u16::try_from(index)
        .ok()
        .filter(|col| *col < MAX_COLUMNS)
        .ok_or_else(|| ReportError::Output(format!("Worksheet column limit of {} reached", MAX_COLUMNS)))
}

/// Caps cell text at [`MAX_CELL_TEXT`] characters, marking the cut
pub fn truncate_text(text: String) -> String {
    if text.chars().count() <= MAX_CELL_TEXT {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_CELL_TEXT).collect();
    cut.push_str(TRUNCATED_SUFFIX);
    cut
}

/// Worksheet name that Excel accepts and that is not in `taken`
pub fn sheet_name(requested: Option<&str>, index: usize, taken: &[String]) -> String {
    let cleaned = requested.map(|name| {
        let replaced: String = name
            .chars()
            .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
            .collect();
        // no leading or trailing apostrophe, also after the cut
        let trimmed = replaced.trim().trim_matches('\'').trim();
        let cut: String = trimmed.chars().take(MAX_SHEET_NAME).collect();
        cut.trim_end().trim_end_matches('\'').trim_end().to_string()
    });
    let base = match cleaned.filter(|n| !n.is_empty()) {
        Some(name) if name.eq_ignore_ascii_case("History") => format!("{}_", name),
        Some(name) => name,
        None => format!("Sheet{}", index),
    };

    let is_taken = |candidate: &str| taken.iter().any(|t| t.eq_ignore_ascii_case(candidate));
    if !is_taken(&base) {
        return base;
    }
    (2..)
        .map(|n| {
            let suffix = format!(" ({})", n);
            let stem: String = base.chars().take(MAX_SHEET_NAME - suffix.len()).collect();
            format!("{}{}", stem, suffix)
        })
        .find(|candidate| !is_taken(candidate))
        .unwrap_or(base)
}

impl SectionSink for ExcelOutput {
    fn start_section(&mut self, name: Option<&str>) -> ReportResult<()> {
        self.close_current();
        let name = sheet_name(name, self.names.len() + 1, &self.names);
        let mut sheet = Worksheet::new();
        sheet.set_name(name.as_str()).map_err(xlsx_error)?;
        tracing::trace!(sheet = %name, "worksheet opened");
        self.names.push(name);
        self.current = Some(Section {
            sheet,
            next_row: 0,
            kinds: None,
        });
        Ok(())
    }

    fn write_rows(&mut self, rows: &RowSet) -> ReportResult<()> {
        if self.current.is_none() {
            self.start_section(None)?;
        }
        let header = self.header;
        let formats = &self.formats;
        let Some(section) = self.current.as_mut() else {
            return Ok(());
        };

        if section.kinds.is_none() {
            if header {
                Self::write_header(formats, section, &rows.columns)?;
            }
            let kinds = match rows.rows.first() {
                Some(first) => first.iter().map(ColumnKind::of).collect(),
                None => vec![ColumnKind::Other; rows.columns.len()],
            };
            section.kinds = Some(kinds);
        }

        for row in &rows.rows {
            if section.next_row >= MAX_ROWS {
                return Err(ReportError::Output(format!(
                    "Worksheet row limit of {} reached",
                    MAX_ROWS
                )));
            }
            for (col, cell) in row.iter().enumerate() {
                let kind = section
                    .kinds
                    .as_ref()
                    .and_then(|k| k.get(col).copied())
                    .unwrap_or(ColumnKind::Other);
                Self::write_cell(formats, &mut section.sheet, section.next_row, column(col)?, kind, cell)
                    .map_err(xlsx_error)?;
            }
            section.next_row += 1;
        }
        Ok(())
    }

    fn section_count(&self) -> usize {
        self.names.len()
    }

    fn finish(mut self: Box<Self>, out: &mut dyn Write) -> ReportResult<()> {
        if self.names.is_empty() {
            self.start_section(None)?;
        }
        self.close_current();

        let mut workbook = Workbook::new();
        for sheet in self.finished.drain(..) {
            workbook.push_worksheet(sheet);
        }
        let bytes = workbook.save_to_buffer().map_err(xlsx_error)?;
        out.write_all(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sheet_names() {
        assert_eq!(sheet_name(Some("Q1/Q2: [draft]"), 1, &[]), "Q1_Q2_ _draft_");
        assert_eq!(sheet_name(None, 3, &[]), "Sheet3");
        assert_eq!(sheet_name(Some(" "), 2, &[]), "Sheet2");

        let long = "x".repeat(40);
        assert_eq!(sheet_name(Some(&long), 1, &[]).len(), 31);

        let taken = vec!["Sites".to_string(), "Sites (2)".to_string()];
        assert_eq!(sheet_name(Some("sites"), 3, &taken), "sites (3)");
        let taken = vec!["x".repeat(31)];
        let renamed = sheet_name(Some(&long), 2, &taken);
        assert_eq!(renamed.chars().count(), 31);
        assert!(renamed.ends_with(" (2)"));
    }

    #[test]
    fn test_sheet_names_without_edge_apostrophes() {
        assert_eq!(sheet_name(Some("'Q1'"), 1, &[]), "Q1");
        assert_eq!(sheet_name(Some("Bob's sites"), 1, &[]), "Bob's sites");
        assert_eq!(sheet_name(Some("''"), 4, &[]), "Sheet4");
        assert_eq!(sheet_name(Some("history"), 1, &[]), "history_");

        let cut_at_quote = format!("{}'x", "a".repeat(30));
        assert_eq!(sheet_name(Some(&cut_at_quote), 1, &[]), "a".repeat(30));
    }

    #[test]
    fn test_quoted_sheet_name_is_written() {
        let mut rows = RowSet::new(vec!["id".into()]);
        rows.push(vec![CellValue::Integer(1)]);
        let mut sink = Box::new(ExcelOutput::new(true));
        sink.start_section(Some("'Q1'")).unwrap();
        sink.write_rows(&rows).unwrap();
        let mut out = Vec::new();
        sink.finish(&mut out).unwrap();
        assert_eq!(&out[..2], b"PK");
    }

    #[test]
    fn test_column_limit() {
        assert_eq!(column(3).unwrap(), 3);
        let err = column(70_000).unwrap_err();
        assert_eq!(err.code(), "OUTPUT");
        assert!(column(usize::from(MAX_COLUMNS)).is_err());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short".into()), "short");
        let long = "é".repeat(MAX_CELL_TEXT + 10);
        let cut = truncate_text(long);
        assert_eq!(cut.chars().count(), MAX_CELL_TEXT + TRUNCATED_SUFFIX.len());
        assert!(cut.ends_with(TRUNCATED_SUFFIX));
    }

    #[test]
    fn test_sections_become_sheets() {
        let mut rows = RowSet::new(vec!["id".into(), "name".into()]);
        rows.push(vec![CellValue::Integer(1), "a".into()]);

        let mut sink = Box::new(ExcelOutput::new(true));
        sink.write_rows(&rows).unwrap();
        sink.start_section(Some("Second")).unwrap();
        sink.write_rows(&rows).unwrap();
        sink.write_rows(&rows).unwrap();
        assert_eq!(sink.section_count(), 2);

        let mut out = Vec::new();
        sink.finish(&mut out).unwrap();
        assert_eq!(&out[..2], b"PK");
    }

    #[test]
    fn test_empty_workbook_has_one_sheet() {
        let mut out = Vec::new();
        Box::new(ExcelOutput::new(false)).finish(&mut out).unwrap();
        assert!(!out.is_empty());
    }
}
