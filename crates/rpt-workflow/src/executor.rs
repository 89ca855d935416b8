//! Workflow script execution.
//!
//! A workflow is a Rhai script run for its side effects. On top of the
//! report bindings (`Source`..`Source4`, `Logger`) it sees:
//! - `Settings`: the settings map, with every entry also bound by name
//! - `AppPath`
//! - `WorkflowResult`: `setError`, `setInformation`, `putData`
//! - `Workflow`: `createAction(workflow, tag, days, hours, minutes, seconds, settings)`

use chrono::Utc;
use parking_lot::Mutex;
use rhai::{Dynamic, EvalAltResult};
use rpt_core::{ExecutionResults, ReportError, WorkflowResult};
use rpt_datasource::{DatasourceBindings, DatasourceProvider, DatasourceSet};
use rpt_engine::script::{dynamic_text, from_dynamic};
use rpt_engine::{ScriptEngine, ScriptHost};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::action::{expiry_after, ActionToken};
use crate::store::ActionStore;

/// Names a setting may not take over
const RESERVED: [&str; 11] = [
    "Source", "Source1", "Source2", "Source3", "Source4", "Logger", "ReportHelper", "ExecutionResults",
    "Settings", "WorkflowResult", "Workflow",
];

#[derive(Clone)]
pub struct WorkflowExecutor {
    app_path: String,
    bindings: DatasourceBindings,
    actions: Arc<dyn ActionStore>,
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("app_path", &self.app_path)
            .field("sources", &self.bindings.bound_slots())
            .finish()
    }
}

impl WorkflowExecutor {
    pub fn new(app_path: impl Into<String>, actions: Arc<dyn ActionStore>) -> Self {
        Self {
            app_path: app_path.into(),
            bindings: DatasourceBindings::new(),
            actions,
        }
    }

    /// Binds `provider` as the workflow's `Source`
    pub fn with_source(mut self, provider: Arc<dyn DatasourceProvider>) -> Self {
        self.bindings = DatasourceBindings::primary(provider);
        self
    }

    pub fn with_bindings(mut self, bindings: DatasourceBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn app_path(&self) -> &str {
        &self.app_path
    }

    pub fn actions(&self) -> &Arc<dyn ActionStore> {
        &self.actions
    }

    /// Runs `script`. Failures never escape: they are logged and land in
    /// the result's `error`.
    pub fn execute(&self, name: &str, script: &str, settings: &Map<String, Value>, return_output: bool) -> WorkflowResult {
        let span = tracing::info_span!("workflow", workflow = %name);
        let _guard = span.enter();

        let result = Arc::new(Mutex::new(WorkflowResult::new()));
        let sources = match DatasourceSet::open(&self.bindings) {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!(error = %e, "workflow datasources could not be opened");
                let mut failed = WorkflowResult::new();
                failed.set_error(e.message());
                return failed;
            }
        };

        let host = ScriptHost::running(name, sources, ExecutionResults::new());
        let mut engine = ScriptEngine::new(host.clone());
        register_workflow_api(&mut engine);

        for (key, value) in settings {
            if RESERVED.contains(&key.as_str()) {
                tracing::warn!(setting = %key, "setting shadows a workflow binding and is only available in Settings");
                continue;
            }
            engine.bind_json(key, value);
        }
        engine.bind_json("Settings", &Value::Object(settings.clone()));
        engine.bind_json("AppPath", &Value::String(self.app_path.clone()));
        engine.bind("WorkflowResult", WorkflowResultApi { result: result.clone() });
        engine.bind(
            "Workflow",
            WorkflowApi {
                app_path: self.app_path.clone(),
                actions: self.actions.clone(),
            },
        );

        let outcome = engine.run(script);
        host.finish().sources.close();

        let mut result = std::mem::take(&mut *result.lock());
        match outcome {
            Ok(output) => {
                if return_output && !output.is_empty() {
                    result.set_information(output);
                }
                tracing::info!(error = result.in_error(), "workflow finished");
            }
            Err(e) => {
                let e = e.into_execution(name);
                tracing::error!(error = %e, "workflow failed");
                result.set_error(e.message());
            }
        }
        result
    }
}

// ============================================================================
// Bound objects
// ============================================================================

type FnResult<T> = Result<T, Box<EvalAltResult>>;

#[derive(Clone)]
struct WorkflowResultApi {
    result: Arc<Mutex<WorkflowResult>>,
}

#[derive(Clone)]
struct WorkflowApi {
    app_path: String,
    actions: Arc<dyn ActionStore>,
}

impl WorkflowApi {
    #[allow(clippy::too_many_arguments)]
    fn create_action(
        &self,
        workflow: &str,
        tag: &Dynamic,
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
        settings: &Dynamic,
    ) -> Result<String, ReportError> {
        let expiry = expiry_after(Utc::now(), days, hours, minutes, seconds)?;
        let settings = match from_dynamic(settings) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(other) => {
                return Err(ReportError::Execution(format!(
                    "Action settings must be a map, not [{}]",
                    other
                )))
            }
            Err(e) => return Err(ReportError::Execution(e.to_string())),
        };

        let token = ActionToken::new(workflow, dynamic_text(tag), expiry, settings);
        self.actions.insert(&token)?;
        tracing::debug!(workflow = %workflow, guid = %token.guid, expiry = %token.expiry, "action created");
        Ok(action_url(&self.app_path, &token.guid))
    }
}

/// `<app_path>/action/<guid>`
pub fn action_url(app_path: &str, guid: &str) -> String {
    format!("{}/action/{}", app_path.trim_end_matches('/'), guid)
}

fn register_workflow_api(engine: &mut ScriptEngine) {
    let engine = engine.engine_mut();

    engine
        .register_type_with_name::<WorkflowResultApi>("WorkflowResult")
        .register_fn("setError", |r: &mut WorkflowResultApi, error: Dynamic| {
            r.result.lock().set_error(dynamic_text(&error).unwrap_or_default())
        })
        .register_fn("setInformation", |r: &mut WorkflowResultApi, information: Dynamic| {
            r.result.lock().set_information(dynamic_text(&information).unwrap_or_default())
        })
        .register_fn("putData", |r: &mut WorkflowResultApi, key: &str, value: Dynamic| -> FnResult<()> {
            let value = from_dynamic(&value)?;
            r.result.lock().put_data(key, value);
            Ok(())
        });

    engine.register_type_with_name::<WorkflowApi>("Workflow").register_fn(
        "createAction",
        |w: &mut WorkflowApi,
         workflow: &str,
         tag: Dynamic,
         days: i64,
         hours: i64,
         minutes: i64,
         seconds: i64,
         settings: Dynamic|
         -> FnResult<String> {
            w.create_action(workflow, &tag, days, hours, minutes, seconds, &settings)
                .map_err(|e| e.message().into())
        },
    );
}
