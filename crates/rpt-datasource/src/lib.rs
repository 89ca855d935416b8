//! RPT Datasource: connection slots used by report and workflow scripts
//!
//! A script can reach up to five datasources: the primary `Source` and the
//! numbered `Source1..Source4`. Bindings name *providers*; the live
//! connections only exist inside a [`DatasourceSet`] for one execution and
//! are closed when the set is closed or dropped.

mod deferred;
mod set;
mod slots;
mod source;
mod sqlite;
mod value;

pub use deferred::DeferredDatasource;
pub use set::DatasourceSet;
pub use slots::{DatasourceBindings, SlotId};
pub use source::{Datasource, DatasourceProvider};
pub use sqlite::{SqliteDatasource, SqliteProvider};
pub use value::{CellValue, RowSet};
