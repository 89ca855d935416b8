//! `$name` / `${name.path}` substitution for runtime parameter values
use chrono::Local;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use rpt_core::{Recipient, Task};
use serde_json::{Map, Value};

lazy_static! {
    static ref VAR_REF: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\}|\$([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)")
            .unwrap();
}

/// Looks a name up exactly, then ignoring case
pub fn lookup<'a>(vars: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    vars.get(name)
        .or_else(|| vars.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v))
}

/// Resolves `a.b.c` against `vars`; object keys and array indexes
pub fn resolve_path<'a>(vars: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = lookup(vars, parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => lookup(map, part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Replaces every resolvable reference. Unknown or null references stay as
/// written so a later stage can fill them.
pub fn substitute(text: &str, vars: &Map<String, Value>) -> String {
    if !text.contains('$') {
        return text.to_string();
    }
    VAR_REF
        .replace_all(text, |caps: &Captures| {
            let path = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            resolve_path(vars, path)
                .and_then(render)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// System stage bindings: task, paths and clock
pub fn system_variables(task: &Task, app_path: &str) -> Map<String, Value> {
    let now = Local::now();
    let mut vars = Map::new();
    vars.insert("Task".into(), task.to_json());
    vars.insert("TaskName".into(), Value::String(task.name.clone()));
    vars.insert("AppPath".into(), Value::String(app_path.to_string()));
    vars.insert(
        "TmpDir".into(),
        Value::String(std::env::temp_dir().to_string_lossy().into_owned()),
    );
    vars.insert("Today".into(), Value::String(now.format("%d/%m/%Y").to_string()));
    vars.insert("Now".into(), Value::String(now.format("%d/%m/%Y %H:%M:%S").to_string()));
    for (k, v) in &task.variables {
        vars.insert(k.clone(), Value::String(v.clone()));
    }
    vars
}

/// Recipient stage bindings: the recipient, its column list, and each value
/// under its own key and its lower-cased key
pub fn recipient_variables(recipient: &Recipient) -> Map<String, Value> {
    let mut vars = Map::new();
    vars.insert("Recipient".into(), recipient.to_json());
    let columns: Vec<&str> = recipient.values.keys().map(String::as_str).collect();
    let values: Vec<&str> = recipient.values.values().map(String::as_str).collect();
    vars.insert("ColumnList".into(), Value::String(columns.join(",")));
    vars.insert("ColumnValues".into(), Value::String(values.join(",")));
    for (k, v) in &recipient.values {
        vars.insert(k.clone(), Value::String(v.clone()));
        vars.insert(k.to_lowercase(), Value::String(v.clone()));
    }
    vars
}
