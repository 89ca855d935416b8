//! Execution Context: estado de uma única execução
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::data_model::{Recipient, Task};
use crate::parameters::RuntimeParameters;

/// Per-invocation bindings handed to a script. Built fresh for every
/// declaration pass, export or workflow run and dropped afterwards.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub report: String,
    pub trace_id: String,
    pub app_path: String,
    /// False during the declaration pass
    pub in_run_mode: bool,
    pub recipient: Option<Recipient>,
    pub job: Option<Task>,
    pub parameters: RuntimeParameters,
    pub started: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(report: impl Into<String>) -> Self {
        Self {
            report: report.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
            app_path: String::new(),
            in_run_mode: true,
            recipient: None,
            job: None,
            parameters: RuntimeParameters::new(),
            started: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Context for the dry-run declaration pass
    pub fn declaring(report: impl Into<String>) -> Self {
        Self {
            in_run_mode: false,
            ..Self::new(report)
        }
    }

    pub fn with_app_path(mut self, app_path: impl Into<String>) -> Self {
        self.app_path = app_path.into();
        self
    }

    pub fn with_recipient(mut self, recipient: Option<Recipient>) -> Self {
        self.recipient = recipient;
        self
    }

    pub fn with_job(mut self, job: Option<Task>) -> Self {
        self.job = job;
        self
    }

    pub fn with_parameters(mut self, parameters: RuntimeParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Scalar bindings shared by every script host: `AppPath`, `InRunMode`,
    /// `Recipient`, `Job`, extra metadata and then the runtime parameters.
    pub fn bindings(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("AppPath".into(), Value::String(self.app_path.clone()));
        map.insert("InRunMode".into(), Value::Bool(self.in_run_mode));
        map.insert(
            "Recipient".into(),
            self.recipient.as_ref().map(Recipient::to_json).unwrap_or(Value::Null),
        );
        map.insert(
            "Job".into(),
            self.job.as_ref().map(Task::to_json).unwrap_or(Value::Null),
        );
        for (k, v) in &self.metadata {
            map.insert(k.clone(), v.clone());
        }
        for p in self.parameters.iter() {
            map.insert(p.name.clone(), p.value.clone());
        }
        map
    }
}
