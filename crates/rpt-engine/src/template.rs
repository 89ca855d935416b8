//! Template evaluation for template and SQL-dump reports.
//!
//! Uses Handlebars with report helpers:
//! - declareParameter: record a parameter (3, 5 or 6 arguments)
//! - query / scalar / execute: run SQL on `Source` or a passed `SourceN`
//! - setValue: write to the execution results
//! - log: write to the report logger
//! - default / join / truncate / concat: formatting conveniences

use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason, ScopedJson,
};
use rpt_core::{ParameterDeclaration, ReportError};
use rpt_datasource::SlotId;
use serde_json::{Map, Value};

use crate::backtrace::{self, EvalFailure};
use crate::host::ScriptHost;

/// Handlebars registry wired to one [`ScriptHost`]
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    host: ScriptHost,
}

impl TemplateEngine {
    /// HTML-escaping engine for report bodies
    pub fn new(host: ScriptHost) -> Self {
        Self::build(host, true)
    }

    /// Non-escaping engine, for text that is not HTML (SQL scripts)
    pub fn plain(host: ScriptHost) -> Self {
        Self::build(host, false)
    }

    fn build(host: ScriptHost, escape: bool) -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.set_strict_mode(false);
        if !escape {
            handlebars.register_escape_fn(handlebars::no_escape);
        }

        handlebars.register_helper("declareParameter", Box::new(DeclareHelper { host: host.clone() }));
        handlebars.register_helper("query", Box::new(QueryHelper { host: host.clone(), scalar: false }));
        handlebars.register_helper("scalar", Box::new(QueryHelper { host: host.clone(), scalar: true }));
        handlebars.register_helper("execute", Box::new(ExecuteHelper { host: host.clone() }));
        handlebars.register_helper("setValue", Box::new(SetValueHelper { host: host.clone() }));
        handlebars.register_helper("log", Box::new(LogHelper { host: host.clone() }));
        handlebars.register_helper("default", Box::new(DefaultHelper));
        handlebars.register_helper("join", Box::new(JoinHelper));
        handlebars.register_helper("truncate", Box::new(TruncateHelper));
        handlebars.register_helper("concat", Box::new(ConcatHelper));

        TemplateEngine { handlebars, host }
    }

    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    /// Evaluates `script` against `bindings`. Failures carry the engine
    /// message and, when the line is known, the offending script line.
    pub fn render(&self, script: &str, bindings: &Map<String, Value>) -> Result<String, EvalFailure> {
        self.handlebars.render_template(script, bindings).map_err(|e| {
            let line = e.line_no.or_else(|| match e.reason() {
                RenderErrorReason::TemplateError(t) => t.pos().map(|(line, _)| line),
                _ => None,
            });
            EvalFailure::new(backtrace::annotate(&e.reason().to_string(), line, script))
        })
    }
}

// ============================================================================
// Parameter helpers
// ============================================================================

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn param_text(h: &Helper<'_>, index: usize) -> Option<String> {
    h.param(index).and_then(|p| json_text(p.value()))
}

fn required_text(h: &Helper<'_>, index: usize, helper: &'static str) -> Result<String, RenderError> {
    param_text(h, index).ok_or_else(|| RenderErrorReason::ParamNotFoundForIndex(helper, index).into())
}

fn flag(value: &Value, helper: &'static str) -> Result<bool, RenderError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(true),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(true),
            "false" | "no" | "n" | "0" => Ok(false),
            _ => Err(RenderErrorReason::InvalidParamType(helper).into()),
        },
        Value::Number(n) => Ok(n.as_i64() != Some(0)),
        _ => Err(RenderErrorReason::InvalidParamType(helper).into()),
    }
}

/// A `SourceN` binding object passed as the first parameter
fn slot_of(value: &Value) -> Option<SlotId> {
    value.get("slot").and_then(Value::as_str).and_then(SlotId::parse)
}

fn slot_and_sql(h: &Helper<'_>, helper: &'static str) -> Result<(SlotId, String), RenderError> {
    match h.param(0).and_then(|p| slot_of(p.value())) {
        Some(slot) => Ok((slot, required_text(h, 1, helper)?)),
        None => Ok((SlotId::Primary, required_text(h, 0, helper)?)),
    }
}

fn host_error(e: ReportError) -> RenderError {
    RenderErrorReason::Other(e.message()).into()
}

// ============================================================================
// Report helpers
// ============================================================================

/// `{{declareParameter name label description [default optional [displayType]]}}`
struct DeclareHelper {
    host: ScriptHost,
}

impl HelperDef for DeclareHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        _out: &mut dyn Output,
    ) -> HelperResult {
        const NAME: &str = "declareParameter";
        let count = h.params().len();
        if !matches!(count, 3 | 5 | 6) {
            return Err(RenderErrorReason::Other(format!(
                "declareParameter expects 3, 5 or 6 arguments, got {}",
                count
            ))
            .into());
        }

        let name = required_text(h, 0, NAME)?;
        let label = param_text(h, 1).unwrap_or_default();
        let description = param_text(h, 2).unwrap_or_default();
        let (default_value, optional, display_type) = if count >= 5 {
            let optional = flag(h.param(4).map(|p| p.value()).unwrap_or(&Value::Null), NAME)?;
            (param_text(h, 3), optional, param_text(h, 5))
        } else {
            (None, true, None)
        };

        self.host.declare_parameter(ParameterDeclaration::new(
            name,
            label,
            description,
            default_value,
            optional,
            display_type.as_deref(),
        ));
        Ok(())
    }
}

/// `(query [SourceN] sql)` returns rows as objects; `scalar` returns the
/// first value of the first row
struct QueryHelper {
    host: ScriptHost,
    scalar: bool,
}

impl HelperDef for QueryHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let helper = if self.scalar { "scalar" } else { "query" };
        let (slot, sql) = slot_and_sql(h, helper)?;
        let value = if self.scalar {
            self.host.scalar(slot, &sql).map_err(host_error)?.to_json()
        } else {
            Value::Array(self.host.query(slot, &sql).map_err(host_error)?.to_json_rows())
        };
        Ok(ScopedJson::Derived(value))
    }
}

/// `{{execute [SourceN] sql}}` runs a statement; writes nothing, but yields
/// the affected row count as a subexpression
struct ExecuteHelper {
    host: ScriptHost,
}

impl HelperDef for ExecuteHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let (slot, sql) = slot_and_sql(h, "execute")?;
        let count = self.host.execute(slot, &sql).map_err(host_error)?;
        Ok(ScopedJson::Derived(Value::from(count as u64)))
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        _out: &mut dyn Output,
    ) -> HelperResult {
        self.call_inner(h, r, ctx, rc).map(|_| ())
    }
}

/// `{{setValue key value}}`
struct SetValueHelper {
    host: ScriptHost,
}

impl HelperDef for SetValueHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        _out: &mut dyn Output,
    ) -> HelperResult {
        let key = required_text(h, 0, "setValue")?;
        let value = param_text(h, 1).unwrap_or_default();
        self.host.set_value(&key, &value);
        Ok(())
    }
}

/// `{{log message}}` or `{{log level message}}`
struct LogHelper {
    host: ScriptHost,
}

impl HelperDef for LogHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        _out: &mut dyn Output,
    ) -> HelperResult {
        match (param_text(h, 0), param_text(h, 1)) {
            (Some(level), Some(message)) => self.host.log(&level, &message),
            (Some(message), None) => self.host.log("info", &message),
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// Formatting helpers
// ============================================================================

/// Default value helper
struct DefaultHelper;

impl HelperDef for DefaultHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = h.param(0).and_then(|v| json_text(v.value())).filter(|s| !s.is_empty());
        let default = param_text(h, 1).unwrap_or_default();
        out.write(&value.unwrap_or(default))?;
        Ok(())
    }
}

/// Join an array with a separator
struct JoinHelper;

impl HelperDef for JoinHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let separator = param_text(h, 1).unwrap_or_else(|| ", ".to_string());
        if let Some(items) = h.param(0).and_then(|v| v.value().as_array()) {
            let strings: Vec<String> = items.iter().filter_map(json_text).collect();
            out.write(&strings.join(&separator))?;
        }
        Ok(())
    }
}

/// Truncate to a number of characters with an ellipsis
struct TruncateHelper;

impl HelperDef for TruncateHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let text = param_text(h, 0).unwrap_or_default();
        let max_len = h.param(1).and_then(|v| v.value().as_u64()).unwrap_or(100) as usize;

        if text.chars().count() > max_len {
            let cut: String = text.chars().take(max_len).collect();
            out.write(&cut)?;
            out.write("...")?;
        } else {
            out.write(&text)?;
        }
        Ok(())
    }
}

/// Concatenates every parameter; used to build SQL inside subexpressions
struct ConcatHelper;

impl HelperDef for ConcatHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let text: String = h.params().iter().filter_map(|p| json_text(p.value())).collect();
        Ok(ScopedJson::Derived(Value::String(text)))
    }
}
