//! Runtime parameter resolution.
//!
//! A raw value goes through up to two substitution stages (system, then
//! recipient) and is then classified:
//! 1. `select ...` - scalar lookup on the task datasource
//! 2. `[...]` / `{...}` - structured literal
//! 3. anything else - the substituted text

use lazy_static::lazy_static;
use regex::Regex;
use rpt_core::{Recipient, ReportError, ReportResult, RuntimeParameter, RuntimeParameters, Task};
use rpt_datasource::{DatasourceBindings, DatasourceProvider, DatasourceSet, SlotId};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::literal;
use crate::variables::{recipient_variables, substitute, system_variables};

lazy_static! {
    static ref SELECT: Regex = Regex::new(r"(?is)^\s*select\s.+").unwrap();
    static ref STRUCTURED: Regex = Regex::new(r"(?s)^\s*[\[{].+[\]}]\s*$").unwrap();
}

/// Turns raw parameter text into runtime values
#[derive(Clone, Default)]
pub struct ParameterResolver {
    app_path: String,
    lookup: Option<Arc<dyn DatasourceProvider>>,
}

impl ParameterResolver {
    pub fn new(app_path: impl Into<String>) -> Self {
        Self {
            app_path: app_path.into(),
            lookup: None,
        }
    }

    /// Datasource `select` parameters are looked up on
    pub fn with_lookup(mut self, provider: Arc<dyn DatasourceProvider>) -> Self {
        self.lookup = Some(provider);
        self
    }

    /// Value that needs no resolution
    pub fn direct(name: &str, value: impl Into<Value>) -> RuntimeParameter {
        RuntimeParameter::new(name, value)
    }

    /// Value typed into a form, kept as written
    pub fn from_form(name: &str, raw: Option<&str>) -> RuntimeParameter {
        RuntimeParameter::new(name, raw.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null))
    }

    /// Value configured on a task: trimmed, system-substituted, classified
    pub fn from_task(&self, task: &Task, name: &str, raw: Option<&str>) -> ReportResult<RuntimeParameter> {
        let Some(raw) = raw else {
            return Ok(RuntimeParameter::new(name, Value::Null));
        };
        let mut vars = system_variables(task, &self.app_path);
        let text = substitute(raw.trim(), &vars);
        let value = self.classify(name, &text, &mut vars)?;
        Ok(RuntimeParameter::new(name, value))
    }

    /// Value configured on a task that is run per recipient: trimmed, then
    /// substituted with the system variables and the first recipient of the
    /// list, then classified
    pub fn from_task_for_recipients(
        &self,
        task: &Task,
        name: &str,
        raw: Option<&str>,
        recipients: &[Recipient],
    ) -> ReportResult<RuntimeParameter> {
        let Some(recipient) = recipients.first() else {
            return Err(ReportError::Resolution(format!(
                "An empty recipients list was passed to the runtime parameter [{}]",
                name
            )));
        };
        let Some(raw) = raw else {
            return Ok(RuntimeParameter::new(name, Value::Null));
        };

        let mut vars = system_variables(task, &self.app_path);
        let text = substitute(raw.trim(), &vars);
        let recipient_vars = recipient_variables(recipient);
        let text = substitute(&text, &recipient_vars);
        vars.extend(recipient_vars);

        let value = self.classify(name, &text, &mut vars)?;
        Ok(RuntimeParameter::new(name, value))
    }

    /// Resolves every `(name, raw)` pair of a task, per recipient when a
    /// recipient list is given
    pub fn resolve_all(
        &self,
        pairs: &[(String, Option<String>)],
        task: &Task,
        recipients: Option<&[Recipient]>,
    ) -> ReportResult<RuntimeParameters> {
        let mut parameters = RuntimeParameters::new();
        for (name, raw) in pairs {
            let parameter = match recipients {
                Some(list) => self.from_task_for_recipients(task, name, raw.as_deref(), list)?,
                None => self.from_task(task, name, raw.as_deref())?,
            };
            tracing::debug!(parameter = %name, value = %parameter.value, "runtime parameter resolved");
            parameters.insert(parameter);
        }
        Ok(parameters)
    }

    fn classify(&self, name: &str, text: &str, vars: &mut Map<String, Value>) -> ReportResult<Value> {
        if SELECT.is_match(text) {
            self.lookup_scalar(name, text)
        } else if STRUCTURED.is_match(text) {
            literal::evaluate_literal(name, text, vars)
        } else {
            Ok(Value::String(text.to_string()))
        }
    }

    fn lookup_scalar(&self, name: &str, sql: &str) -> ReportResult<Value> {
        let provider = self.lookup.clone().ok_or_else(|| {
            ReportError::Resolution(format!("No datasource to look up the parameter [{}]", name))
        })?;

        let mut sources = DatasourceSet::open(&DatasourceBindings::primary(provider))?;
        let rows = sources.get(SlotId::Primary, sql)?.find(sql, Some(2));
        sources.close();
        let rows = rows?;

        if rows.is_empty() {
            return Err(ReportError::Resolution(format!(
                "The parameter lookup for [{}] is empty - using select statement [{}]",
                name, sql
            )));
        }
        if rows.len() > 1 {
            return Err(ReportError::Resolution(format!(
                "The parameter lookup for [{}] returns more than one row - using select statement [{}]",
                name, sql
            )));
        }
        match rows.first_value() {
            Some(value) if !rows.columns.is_empty() && !value.is_empty() => Ok(value.to_json()),
            _ => Err(ReportError::Resolution(format!("The parameter for [{}] is empty", name))),
        }
    }
}
