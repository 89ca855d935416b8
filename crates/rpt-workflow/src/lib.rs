//! RPT Workflow: scripts de workflow, tokens de ação e resgate
//!
//! - [`WorkflowExecutor`] runs a Rhai workflow script and collects a
//!   [`rpt_core::WorkflowResult`]
//! - [`WorkflowCatalog`] finds workflows by code
//! - [`ActionToken`]s are created by scripts through `Workflow.createAction`
//!   and kept in an [`ActionStore`]
//! - [`ActionRedeemer`] spends a token and runs its workflow

pub mod action;
pub mod catalog;
pub mod executor;
pub mod redeem;
pub mod store;

pub use action::{expiry_after, ActionToken};
pub use catalog::{WorkflowCatalog, WorkflowDefinition};
pub use executor::{action_url, WorkflowExecutor};
pub use redeem::ActionRedeemer;
pub use store::{ActionStore, MemoryActionStore, SqliteActionStore};
