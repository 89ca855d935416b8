//! Datasource contracts
use rpt_core::ReportResult;

use crate::value::RowSet;

/// A live connection-like handle. One per slot per execution.
pub trait Datasource: Send {
    fn name(&self) -> &str;

    /// Runs a query, stopping after `max_rows` rows when given
    fn find(&mut self, sql: &str, max_rows: Option<usize>) -> ReportResult<RowSet>;

    /// Runs a statement for effect, returning affected rows
    fn execute(&mut self, sql: &str) -> ReportResult<usize>;

    /// Releases the connection. Calling it again is a no-op.
    fn close(&mut self) -> ReportResult<()>;

    fn is_open(&self) -> bool;
}

/// Something that can open a [`Datasource`]; what bindings refer to
pub trait DatasourceProvider: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self) -> ReportResult<Box<dyn Datasource>>;
}
