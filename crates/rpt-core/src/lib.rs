//! RPT Core: modelo de dados, parâmetros e erros do motor de relatórios
//!
//! Shared vocabulary for every other crate in the workspace: report
//! definitions, declared/runtime parameters, export formats, result sinks
//! and the unified error model.

pub mod context;
pub mod data_model;
pub mod error;
pub mod format;
pub mod parameters;

pub use context::ExecutionContext;
pub use data_model::{ExecutionResults, Recipient, ReportDefinition, Task, WorkflowResult};
pub use error::{ReportError, ReportResult};
pub use format::{ColumnType, Compression, ExportFormat};
pub use parameters::{
    ParameterDeclaration, ParameterSchema, RuntimeParameter, RuntimeParameters, DROP_DOWN,
};

/// Versão do motor de relatórios
pub const RPT_VERSION: &str = "1.0.0";
