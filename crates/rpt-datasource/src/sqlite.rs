//! SQLite connector behind the datasource traits.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rpt_core::{ReportError, ReportResult};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::{Datasource, DatasourceProvider};
use crate::value::{CellValue, RowSet};

const BUSY_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Clone)]
enum SqliteTarget {
    File(PathBuf),
    Memory,
}

/// Opens SQLite connections for a named datasource
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    name: String,
    target: SqliteTarget,
    busy_timeout: Duration,
    read_only: bool,
    init_sql: Option<String>,
}

impl SqliteProvider {
    pub fn file(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            target: SqliteTarget::File(path.as_ref().to_path_buf()),
            busy_timeout: Duration::from_millis(BUSY_TIMEOUT_MS),
            read_only: false,
            init_sql: None,
        }
    }

    /// Private in-memory database per opened connection
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: SqliteTarget::Memory,
            busy_timeout: Duration::from_millis(BUSY_TIMEOUT_MS),
            read_only: false,
            init_sql: None,
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Batch executed on every newly opened connection
    pub fn with_init_sql(mut self, sql: impl Into<String>) -> Self {
        self.init_sql = Some(sql.into());
        self
    }
}

impl DatasourceProvider for SqliteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> ReportResult<Box<dyn Datasource>> {
        let conn = match &self.target {
            SqliteTarget::File(path) => {
                let flags = if self.read_only {
                    OpenFlags::SQLITE_OPEN_READ_ONLY
                } else {
                    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
                };
                Connection::open_with_flags(path, flags)
            }
            SqliteTarget::Memory => Connection::open_in_memory(),
        }
        .map_err(|e| db_error(&self.name, e))?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| db_error(&self.name, e))?;
        if self.read_only {
            conn.pragma_update(None, "query_only", 1)
                .map_err(|e| db_error(&self.name, e))?;
        }
        if let Some(sql) = &self.init_sql {
            conn.execute_batch(sql).map_err(|e| db_error(&self.name, e))?;
        }
        tracing::debug!(datasource = %self.name, "opened sqlite connection");
        Ok(Box::new(SqliteDatasource {
            name: self.name.clone(),
            conn: Some(conn),
        }))
    }
}

pub struct SqliteDatasource {
    name: String,
    conn: Option<Connection>,
}

impl SqliteDatasource {
    fn connection(&self) -> ReportResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| ReportError::Datasource(format!("datasource [{}] is closed", self.name)))
    }
}

impl Datasource for SqliteDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&mut self, sql: &str, max_rows: Option<usize>) -> ReportResult<RowSet> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql).map_err(|e| db_error(&self.name, e))?;
        let (columns, decl_types): (Vec<String>, Vec<Option<String>>) = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_ascii_uppercase)))
            .unzip();

        let mut result = RowSet::new(columns);
        let mut rows = stmt.query([]).map_err(|e| db_error(&self.name, e))?;
        while let Some(row) = rows.next().map_err(|e| db_error(&self.name, e))? {
            if max_rows.is_some_and(|max| result.len() >= max) {
                break;
            }
            let mut cells = Vec::with_capacity(decl_types.len());
            for (i, decl) in decl_types.iter().enumerate() {
                let value = row.get_ref(i).map_err(|e| db_error(&self.name, e))?;
                cells.push(convert(value, decl.as_deref()));
            }
            result.push(cells);
        }
        Ok(result)
    }

    fn execute(&mut self, sql: &str) -> ReportResult<usize> {
        let conn = self.connection()?;
        conn.execute(sql, []).map_err(|e| db_error(&self.name, e))
    }

    fn close(&mut self) -> ReportResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| db_error(&self.name, e))?;
            tracing::debug!(datasource = %self.name, "closed sqlite connection");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }
}

fn db_error(name: &str, e: rusqlite::Error) -> ReportError {
    ReportError::Datasource(format!("{}: {}", name, e))
}

/// Maps a SQLite value using the declared column type to recover
/// booleans and temporal values stored as integers or text.
fn convert(value: ValueRef<'_>, decl: Option<&str>) -> CellValue {
    let decl = decl.unwrap_or("");
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) if decl.contains("BOOL") => CellValue::Bool(i != 0),
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(r) => CellValue::Double(r),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            parse_temporal(&text, decl).unwrap_or(CellValue::Text(text))
        }
        ValueRef::Blob(bytes) => CellValue::Blob(bytes.to_vec()),
    }
}

fn parse_temporal(text: &str, decl: &str) -> Option<CellValue> {
    if decl.contains("DATETIME") || decl.contains("TIMESTAMP") {
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
            .map(CellValue::Timestamp)
    } else if decl.contains("DATE") {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(CellValue::Date)
    } else if decl.contains("TIME") {
        ["%H:%M:%S%.f", "%H:%M"]
            .iter()
            .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
            .map(CellValue::Time)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seeded() -> SqliteProvider {
        SqliteProvider::memory("main").with_init_sql(
            "create table site (id integer, name text, active boolean, opened date, seen timestamp, rating real);
             insert into site values (1, 'Acme', 1, '2024-01-31', '2024-01-31 10:15:00', 4.5);
             insert into site values (2, 'Bolt', 0, null, null, null);",
        )
    }

    #[test]
    fn test_find_maps_declared_types() {
        let mut ds = seeded().open().unwrap();
        let rs = ds.find("select * from site order by id", None).unwrap();
        assert_eq!(rs.columns, vec!["id", "name", "active", "opened", "seen", "rating"]);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows[0][2], CellValue::Bool(true));
        assert_eq!(
            rs.rows[0][3],
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        assert!(matches!(rs.rows[0][4], CellValue::Timestamp(_)));
        assert_eq!(rs.rows[1][3], CellValue::Null);
    }

    #[test]
    fn test_max_rows_limits_result() {
        let mut ds = seeded().open().unwrap();
        let rs = ds.find("select name from site", Some(1)).unwrap();
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn test_execute_and_close_twice() {
        let mut ds = seeded().open().unwrap();
        assert_eq!(ds.execute("delete from site where id = 2").unwrap(), 1);
        ds.close().unwrap();
        ds.close().unwrap();
        assert!(!ds.is_open());
        assert!(ds.find("select 1", None).is_err());
    }

    #[test]
    fn test_file_database_shared_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SqliteProvider::file("disk", dir.path().join("r.db"));
        let mut a = provider.open().unwrap();
        a.execute("create table t (x integer)").unwrap();
        a.execute("insert into t values (42)").unwrap();
        a.close().unwrap();

        let mut b = provider.open().unwrap();
        let rs = b.find("select x from t", None).unwrap();
        assert_eq!(rs.first_value(), Some(&CellValue::Integer(42)));
    }
}
