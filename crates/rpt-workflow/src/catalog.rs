//! Workflow Catalog: workflows por código
use indexmap::IndexMap;
use rpt_core::{ReportError, ReportResult, WorkflowResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::executor::WorkflowExecutor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub script: String,
}

impl WorkflowDefinition {
    pub fn new(code: impl Into<String>, name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            script: script.into(),
        }
    }
}

/// Workflows keyed by lowercase code, in registration order
#[derive(Debug, Clone)]
pub struct WorkflowCatalog {
    executor: WorkflowExecutor,
    workflows: IndexMap<String, WorkflowDefinition>,
}

impl WorkflowCatalog {
    pub fn new(executor: WorkflowExecutor) -> Self {
        Self {
            executor,
            workflows: IndexMap::new(),
        }
    }

    /// Adds or replaces the workflow with the same code
    pub fn register(&mut self, definition: WorkflowDefinition) {
        self.workflows.insert(definition.code.to_lowercase(), definition);
    }

    pub fn get(&self, code: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(&code.trim().to_lowercase())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.workflows.values()
    }

    pub fn executor(&self) -> &WorkflowExecutor {
        &self.executor
    }

    pub fn run(&self, code: &str, settings: &Map<String, Value>, return_output: bool) -> ReportResult<WorkflowResult> {
        let definition = self
            .get(code)
            .ok_or_else(|| ReportError::Configuration(format!("No workflow found with code [{}]", code)))?;
        Ok(self
            .executor
            .execute(&definition.code, &definition.script, settings, return_output))
    }
}
