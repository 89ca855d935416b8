//! List and map parameter literals, e.g. `['a', 'b']`, `[1..5]`,
//! `{region: 'north', max = 10}`
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use rpt_core::{ReportError, ReportResult};
use serde_json::{Map, Number, Value};

use crate::variables::resolve_path;

/// Longest list a range literal may expand to
pub const MAX_RANGE: usize = 100_000;

#[derive(Parser)]
#[grammar = "literal.pest"]
struct LiteralParser;

/// Evaluates `text`, assigns it to `name` in `vars` and returns the value
/// read back from there
pub fn evaluate_literal(name: &str, text: &str, vars: &mut Map<String, Value>) -> ReportResult<Value> {
    let value = parse_literal(text, vars).map_err(|cause| {
        ReportError::Resolution(format!("Problem parsing map/list parameter {} - {}", name, cause))
    })?;
    vars.insert(name.to_string(), value);
    Ok(vars.get(name).cloned().unwrap_or(Value::Null))
}

/// Parses a literal; `$var` references resolve against `vars` and are null
/// when missing
pub fn parse_literal(text: &str, vars: &Map<String, Value>) -> Result<Value, String> {
    let mut pairs = LiteralParser::parse(Rule::literal, text).map_err(compact_error)?;
    let value = pairs
        .next()
        .and_then(|literal| literal.into_inner().next())
        .ok_or_else(|| "empty literal".to_string())?;
    build(value, vars)
}

fn compact_error(e: pest::error::Error<Rule>) -> String {
    e.to_string()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "|")
        .collect::<Vec<_>>()
        .join(" ")
}

fn build(pair: Pair<'_, Rule>, vars: &Map<String, Value>) -> Result<Value, String> {
    match pair.as_rule() {
        Rule::list => pair
            .into_inner()
            .map(|p| build(p, vars))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Rule::range => {
            let mut bounds = pair.into_inner();
            let from = bound(bounds.next(), vars)?;
            let to = bound(bounds.next(), vars)?;
            expand_range(from, to)
        }
        Rule::map => {
            let mut map = Map::new();
            for entry in pair.into_inner() {
                let mut parts = entry.into_inner();
                let key = parts.next().ok_or("map entry without key")?;
                let key = match key.as_rule() {
                    Rule::string => unescape(inner_text(key)),
                    _ => key.as_str().to_string(),
                };
                let value = parts.next().ok_or("map entry without value")?;
                map.insert(key, build(value, vars)?);
            }
            Ok(Value::Object(map))
        }
        Rule::string => Ok(Value::String(unescape(inner_text(pair)))),
        Rule::number | Rule::integer => Ok(number(pair.as_str())),
        Rule::boolean => Ok(Value::Bool(pair.as_str() == "true")),
        Rule::null => Ok(Value::Null),
        Rule::reference => Ok(reference(pair, vars).cloned().unwrap_or(Value::Null)),
        other => Err(format!("unexpected {:?}", other)),
    }
}

fn inner_text(pair: Pair<'_, Rule>) -> &str {
    pair.into_inner().next().map(|p| p.as_str()).unwrap_or("")
}

fn reference<'a>(pair: Pair<'_, Rule>, vars: &'a Map<String, Value>) -> Option<&'a Value> {
    let path = pair.into_inner().next()?;
    resolve_path(vars, path.as_str())
}

fn bound(pair: Option<Pair<'_, Rule>>, vars: &Map<String, Value>) -> Result<i64, String> {
    let pair = pair.ok_or("range without bounds")?;
    match pair.as_rule() {
        Rule::integer => pair.as_str().parse::<i64>().map_err(|e| e.to_string()),
        Rule::reference => {
            let text = pair.as_str().to_string();
            match reference(pair, vars) {
                Some(Value::Number(n)) => n.as_i64().ok_or_else(|| format!("{} is not an integer", text)),
                Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| format!("{} is not an integer", text)),
                _ => Err(format!("{} is not an integer", text)),
            }
        }
        other => Err(format!("unexpected {:?} in range", other)),
    }
}

fn expand_range(from: i64, to: i64) -> Result<Value, String> {
    let size = from.abs_diff(to).saturating_add(1);
    if size > MAX_RANGE as u64 {
        return Err(format!("range [{}..{}] is larger than {} items", from, to, MAX_RANGE));
    }
    let items: Vec<Value> = if from <= to {
        (from..=to).map(Value::from).collect()
    } else {
        (to..=from).rev().map(Value::from).collect()
    };
    Ok(Value::Array(items))
}

fn number(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(text: &str) -> Value {
        parse_literal(text, &Map::new()).unwrap()
    }

    #[test]
    fn test_lists() {
        assert_eq!(parse("['a', \"b\", 3, 1.5, true, null]"), json!(["a", "b", 3, 1.5, true, null]));
        assert_eq!(parse("[]"), json!([]));
        assert_eq!(parse(" [ [1, 2], [3] ] "), json!([[1, 2], [3]]));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(parse("[1..4]"), json!([1, 2, 3, 4]));
        assert_eq!(parse("[3..1]"), json!([3, 2, 1]));
        assert!(parse_literal("[0..1000000]", &Map::new()).is_err());
    }

    #[test]
    fn test_maps() {
        assert_eq!(
            parse("{region: 'north', \"max\" = 10, nested: {ok: true}}"),
            json!({"region": "north", "max": 10, "nested": {"ok": true}})
        );
        assert_eq!(parse("{}"), json!({}));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(parse(r#"['it\'s', "a\"b", 'tab\there']"#), json!(["it's", "a\"b", "tab\there"]));
    }

    #[test]
    fn test_references() {
        let vars = json!({"top": 3, "name": "Acme", "Task": {"id": 9}})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(parse_literal("[1..$top]", &vars).unwrap(), json!([1, 2, 3]));
        assert_eq!(
            parse_literal("{who: $name, task: ${Task.id}, gone: $missing}", &vars).unwrap(),
            json!({"who": "Acme", "task": 9, "gone": null})
        );
    }

    #[test]
    fn test_evaluate_assigns_variable() {
        let mut vars = Map::new();
        let value = evaluate_literal("ids", "[1, 2]", &mut vars).unwrap();
        assert_eq!(value, json!([1, 2]));
        assert_eq!(vars["ids"], json!([1, 2]));
    }

    #[test]
    fn test_parse_failure() {
        let err = evaluate_literal("ids", "[1, 2", &mut Map::new()).unwrap_err();
        assert!(matches!(err, ReportError::Resolution(_)));
        assert!(err.to_string().starts_with("RESOLVE/Problem parsing map/list parameter ids - "));
    }
}
