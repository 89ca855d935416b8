//! RPT Engine: hosted template and script evaluation
//!
//! Two engines run report scripts:
//! - [`TemplateEngine`]: Handlebars with report helpers (`declareParameter`,
//!   `query`, `scalar`, `execute`, `setValue`, `log`), used by template and
//!   SQL-dump reports
//! - [`ScriptEngine`]: embedded Rhai, used by script reports and workflows
//!
//! Both talk to the datasources and result sink through a shared
//! [`ScriptHost`]. The declaration pass, runtime parameter resolution and
//! structured literal parsing live here too.
//!
//! # Example
//!
//! ```ignore
//! use rpt_engine::{declare, ScriptDialect};
//!
//! let schema = declare::declare_parameters(
//!     "Sites",
//!     ScriptDialect::Template,
//!     r#"{{declareParameter "region" "Region" "Limit by region"}}"#,
//! )?;
//! assert!(schema.contains("region"));
//! ```

pub mod backtrace;
pub mod declare;
pub mod host;
pub mod literal;
pub mod resolve;
pub mod script;
pub mod template;
pub mod variables;

pub use declare::ScriptDialect;
pub use host::{HostMode, HostOutcome, ScriptHost};
pub use resolve::ParameterResolver;
pub use script::ScriptEngine;
pub use template::TemplateEngine;
