//! Embedded Rhai host for script reports and workflows.
//!
//! Objects bound into every script:
//! - `ReportHelper`: `declareParameter(..)` plus `query`/`scalar`/`execute`
//!   on the primary datasource
//! - `Source`, `Source1`..`Source4`: datasource handles
//! - `Logger`: `info`, `warn`, `error`, `trace`, `log(level, msg)`
//! - `ExecutionResults`: `setValue(key, value)`
//!
//! `print` output is captured and returned by [`ScriptEngine::run`].

use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, Variant};
use rpt_core::{ParameterDeclaration, ReportError};
use rpt_datasource::SlotId;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::backtrace::{self, EvalFailure};
use crate::host::ScriptHost;

type FnResult<T> = Result<T, Box<EvalAltResult>>;

/// Rhai engine plus the scope every binding lives in
pub struct ScriptEngine {
    engine: Engine,
    scope: Scope<'static>,
    output: Arc<Mutex<String>>,
    host: ScriptHost,
}

impl ScriptEngine {
    pub fn new(host: ScriptHost) -> Self {
        let mut engine = Engine::new();
        let output = Arc::new(Mutex::new(String::new()));

        let sink = output.clone();
        engine.on_print(move |text| {
            let mut out = sink.lock();
            out.push_str(text);
            out.push('\n');
        });
        let report = host.report();
        engine.on_debug(move |text, _source, pos| {
            tracing::debug!(target: "rpt::script", report = %report, line = ?pos.line(), "{}", text);
        });

        register_report_api(&mut engine);

        let mut scope = Scope::new();
        scope.push("ReportHelper", ReportHelperApi { host: host.clone() });
        for slot in SlotId::ALL {
            scope.push(slot.binding_name(), SourceApi { host: host.clone(), slot });
        }
        scope.push("Logger", LoggerApi { host: host.clone() });
        scope.push("ExecutionResults", ResultsApi { host: host.clone() });

        Self {
            engine,
            scope,
            output,
            host,
        }
    }

    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    /// Binds a JSON value; objects become maps and `null` becomes `()`
    pub fn bind_json(&mut self, name: &str, value: &Value) {
        let dynamic = to_dynamic(value).unwrap_or_else(|e| {
            tracing::warn!(binding = %name, error = %e, "binding could not be converted");
            Dynamic::UNIT
        });
        self.scope.push_dynamic(name.to_string(), dynamic);
    }

    /// Binds every entry of `bindings` by name
    pub fn bind_all(&mut self, bindings: &Map<String, Value>) {
        for (name, value) in bindings {
            self.bind_json(name, value);
        }
    }

    /// Binds a registered custom type
    pub fn bind<T: Variant + Clone>(&mut self, name: &str, value: T) {
        self.scope.push(name.to_string(), value);
    }

    /// For callers that register their own types and functions
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Runs `script` and returns what it printed. Failures carry the engine
    /// message and the failing script line when known.
    pub fn run(&mut self, script: &str) -> Result<String, EvalFailure> {
        self.output.lock().clear();
        self.engine
            .run_with_scope(&mut self.scope, script)
            .map_err(|e| EvalFailure::new(backtrace::annotate(&e.to_string(), e.position().line(), script)))?;
        Ok(std::mem::take(&mut *self.output.lock()))
    }
}

// ============================================================================
// Conversions
// ============================================================================

pub fn to_dynamic(value: &Value) -> FnResult<Dynamic> {
    rhai::serde::to_dynamic(value)
}

pub fn from_dynamic(value: &Dynamic) -> FnResult<Value> {
    rhai::serde::from_dynamic(value)
}

/// Text form of a script value; `()` is `None`
pub fn dynamic_text(value: &Dynamic) -> Option<String> {
    if value.is_unit() {
        None
    } else {
        Some(value.to_string())
    }
}

fn flag(value: &Dynamic) -> FnResult<bool> {
    if value.is_unit() {
        return Ok(true);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(b);
    }
    if let Ok(i) = value.as_int() {
        return Ok(i != 0);
    }
    match value.to_string().trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        other => Err(format!("'{}' is not a valid optional flag", other).into()),
    }
}

fn host_error(e: ReportError) -> Box<EvalAltResult> {
    e.message().into()
}

// ============================================================================
// Bound objects
// ============================================================================

#[derive(Clone)]
struct ReportHelperApi {
    host: ScriptHost,
}

impl ReportHelperApi {
    fn declare(
        &self,
        name: &str,
        label: &str,
        description: &str,
        default_value: Option<String>,
        optional: bool,
        display_type: Option<&str>,
    ) {
        self.host.declare_parameter(ParameterDeclaration::new(
            name,
            label,
            description,
            default_value,
            optional,
            display_type,
        ));
    }
}

#[derive(Clone)]
struct SourceApi {
    host: ScriptHost,
    slot: SlotId,
}

impl SourceApi {
    fn query(&self, sql: &str) -> FnResult<Dynamic> {
        let rows = self.host.query(self.slot, sql).map_err(host_error)?;
        to_dynamic(&Value::Array(rows.to_json_rows()))
    }

    fn scalar(&self, sql: &str) -> FnResult<Dynamic> {
        let value = self.host.scalar(self.slot, sql).map_err(host_error)?;
        to_dynamic(&value.to_json())
    }

    fn execute(&self, sql: &str) -> FnResult<i64> {
        let count = self.host.execute(self.slot, sql).map_err(host_error)?;
        Ok(count as i64)
    }
}

#[derive(Clone)]
struct LoggerApi {
    host: ScriptHost,
}

#[derive(Clone)]
struct ResultsApi {
    host: ScriptHost,
}

fn register_report_api(engine: &mut Engine) {
    engine
        .register_type_with_name::<ReportHelperApi>("ReportHelper")
        .register_fn("declareParameter", |h: &mut ReportHelperApi, name: &str, label: &str, description: &str| {
            h.declare(name, label, description, None, true, None)
        })
        .register_fn(
            "declareParameter",
            |h: &mut ReportHelperApi, name: &str, label: &str, description: &str, default: Dynamic, optional: Dynamic| -> FnResult<()> {
                h.declare(name, label, description, dynamic_text(&default), flag(&optional)?, None);
                Ok(())
            },
        )
        .register_fn(
            "declareParameter",
            |h: &mut ReportHelperApi,
             name: &str,
             label: &str,
             description: &str,
             default: Dynamic,
             optional: Dynamic,
             display_type: &str|
             -> FnResult<()> {
                h.declare(name, label, description, dynamic_text(&default), flag(&optional)?, Some(display_type));
                Ok(())
            },
        )
        .register_fn("query", |h: &mut ReportHelperApi, sql: &str| {
            SourceApi { host: h.host.clone(), slot: SlotId::Primary }.query(sql)
        })
        .register_fn("scalar", |h: &mut ReportHelperApi, sql: &str| {
            SourceApi { host: h.host.clone(), slot: SlotId::Primary }.scalar(sql)
        })
        .register_fn("execute", |h: &mut ReportHelperApi, sql: &str| {
            SourceApi { host: h.host.clone(), slot: SlotId::Primary }.execute(sql)
        })
        .register_fn("setValue", |h: &mut ReportHelperApi, key: &str, value: Dynamic| {
            h.host.set_value(key, &dynamic_text(&value).unwrap_or_default())
        });

    engine
        .register_type_with_name::<SourceApi>("DataSource")
        .register_fn("query", |s: &mut SourceApi, sql: &str| s.query(sql))
        .register_fn("scalar", |s: &mut SourceApi, sql: &str| s.scalar(sql))
        .register_fn("execute", |s: &mut SourceApi, sql: &str| s.execute(sql))
        .register_get("name", |s: &mut SourceApi| s.slot.binding_name().to_string());

    engine
        .register_type_with_name::<LoggerApi>("Logger")
        .register_fn("info", |l: &mut LoggerApi, msg: &str| l.host.log("info", msg))
        .register_fn("warn", |l: &mut LoggerApi, msg: &str| l.host.log("warn", msg))
        .register_fn("error", |l: &mut LoggerApi, msg: &str| l.host.log("error", msg))
        .register_fn("trace", |l: &mut LoggerApi, msg: &str| l.host.log("trace", msg))
        .register_fn("log", |l: &mut LoggerApi, level: &str, msg: &str| l.host.log(level, msg));

    engine
        .register_type_with_name::<ResultsApi>("ExecutionResults")
        .register_fn("setValue", |r: &mut ResultsApi, key: &str, value: Dynamic| {
            r.host.set_value(key, &dynamic_text(&value).unwrap_or_default())
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpt_core::ExecutionResults;
    use rpt_datasource::{DatasourceBindings, DatasourceSet, SqliteProvider};
    use serde_json::json;

    fn running_host() -> ScriptHost {
        let main = SqliteProvider::memory("main").with_init_sql(
            "create table account (id integer, owner text);
             insert into account values (1, 'ann');
             insert into account values (2, 'bob');",
        );
        let archive = SqliteProvider::memory("archive").with_init_sql("create table old (v text); insert into old values ('z');");
        let bindings = DatasourceBindings::primary(Arc::new(main)).bind(SlotId::Source2, Arc::new(archive));
        ScriptHost::running("accounts", DatasourceSet::open(&bindings).unwrap(), ExecutionResults::new())
    }

    #[test]
    fn test_print_is_captured() {
        let mut engine = ScriptEngine::new(running_host());
        let out = engine
            .run(
                r#"
for row in Source.query("select id, owner from account order by id") {
    print(`${row.id}:${row.owner}`);
}
print(Source2.scalar("select v from old"));
"#,
            )
            .unwrap();
        assert_eq!(out, "1:ann\n2:bob\nz\n");
    }

    #[test]
    fn test_bindings_and_results() {
        let host = running_host();
        let mut engine = ScriptEngine::new(host.clone());
        engine.bind_json("Recipient", &json!({"name": "ann@x.org", "values": {"team": "ops"}}));
        engine.bind_json("owner", &json!("bob"));
        engine.bind_json("Job", &Value::Null);
        engine
            .run(
                r#"
let n = ReportHelper.execute(`delete from account where owner = '${owner}'`);
ExecutionResults.setValue("deleted", n);
ReportHelper.setValue("team", Recipient.values.team);
if type_of(Job) == "()" { Logger.info("no job"); }
"#,
            )
            .unwrap();
        let results = host.finish().results;
        assert_eq!(results.value("deleted"), Some("1"));
        assert_eq!(results.value("team"), Some("ops"));
    }

    #[test]
    fn test_unbound_source() {
        let mut engine = ScriptEngine::new(running_host());
        let err = engine.run("let x = 1;\nSource4.query(\"select 1\");").unwrap_err();
        assert!(err.message.contains("data source Source4 unknown"), "{}", err.message);
        assert!(err.message.ends_with("[Source4.query(\"select 1\");]"), "{}", err.message);
    }

    #[test]
    fn test_error_reports_line() {
        let mut engine = ScriptEngine::new(ScriptHost::declaring("r"));
        let err = engine.run("let a = 1;\nlet b = missing_fn(a);\nprint(b);").unwrap_err();
        assert!(err.message.contains("missing_fn"));
        assert!(err.message.ends_with("\n\t[let b = missing_fn(a);]"), "{}", err.message);
    }

    #[test]
    fn test_declare_overloads() {
        let host = ScriptHost::declaring("r");
        let mut engine = ScriptEngine::new(host.clone());
        engine
            .run(
                r#"
ReportHelper.declareParameter("a", "A", "first");
ReportHelper.declareParameter("b", "B", "second", 5, "no");
ReportHelper.declareParameter("c", "C", "third", (), true, "date");
"#,
            )
            .unwrap();
        let schema = host.finish().schema;
        assert_eq!(schema.get("b").unwrap().default_value.as_deref(), Some("5"));
        assert!(schema.get("b").unwrap().required);
        assert_eq!(schema.get("c").unwrap().display_type, "date");
        assert_eq!(schema.get("c").unwrap().default_value, None);
    }
}
