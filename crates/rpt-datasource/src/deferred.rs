//! Placeholder handle that never opens a connection
use rpt_core::ReportResult;

use crate::slots::SlotId;
use crate::source::Datasource;
use crate::value::RowSet;

/// Stands in for a slot during the declaration pass: queries return no
/// rows and statements touch nothing.
#[derive(Debug)]
pub struct DeferredDatasource {
    name: String,
}

impl DeferredDatasource {
    pub fn new(slot: SlotId) -> Self {
        Self {
            name: format!("{} (deferred)", slot),
        }
    }
}

impl Datasource for DeferredDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&mut self, sql: &str, _max_rows: Option<usize>) -> ReportResult<RowSet> {
        tracing::trace!(datasource = %self.name, sql, "deferred query skipped");
        Ok(RowSet::default())
    }

    fn execute(&mut self, sql: &str) -> ReportResult<usize> {
        tracing::trace!(datasource = %self.name, sql, "deferred statement skipped");
        Ok(0)
    }

    fn close(&mut self) -> ReportResult<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::DatasourceSet;

    #[test]
    fn test_deferred_set_answers_every_slot() {
        let mut set = DatasourceSet::deferred();
        for slot in SlotId::ALL {
            let handle = set.get(slot, "select 1").unwrap();
            assert!(handle.find("select 1", None).unwrap().is_empty());
            assert_eq!(handle.execute("delete from x").unwrap(), 0);
        }
        assert_eq!(set.open_count(), 0);
    }
}
