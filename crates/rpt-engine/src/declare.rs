//! Declaration pass: dry-run a report script to collect its parameters
use lazy_static::lazy_static;
use regex::Regex;
use rpt_core::{ParameterSchema, ReportResult};
use rpt_datasource::SlotId;
use serde_json::{json, Map, Value};

use crate::host::ScriptHost;
use crate::script::ScriptEngine;
use crate::template::TemplateEngine;

lazy_static! {
    static ref DECLARE_LINE: Regex =
        Regex::new(r"^\s*ReportHelper\.declareParameter\s*\(.*\)\s*;?\s*$").unwrap();
    static ref TEMPLATE_SOURCES: [Regex; 4] = slot_patterns(|i| format!(r"\bSource{}\b", i));
    static ref DUMP_SOURCES: [Regex; 4] =
        slot_patterns(|i| format!(r"(?ims)use\s+(datasource|database){}\s*;", i));
    static ref SCRIPT_SOURCES: [Regex; 4] = slot_patterns(|i| format!(r"\bSource{}\.[a-zA-Z]+", i));
}

fn slot_patterns(pattern: impl Fn(usize) -> String) -> [Regex; 4] {
    [1, 2, 3, 4].map(|i| Regex::new(&pattern(i)).unwrap())
}

/// Script language a report is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDialect {
    Template,
    SqlDump,
    Script,
}

/// Number of datasources the script needs: the primary slot plus every
/// numbered slot it references at least once
pub fn count_datasources(dialect: ScriptDialect, script: &str) -> usize {
    let patterns: &[Regex; 4] = match dialect {
        ScriptDialect::Template => &TEMPLATE_SOURCES,
        ScriptDialect::SqlDump => &DUMP_SOURCES,
        ScriptDialect::Script => &SCRIPT_SOURCES,
    };
    1 + patterns.iter().filter(|p| p.is_match(script)).count()
}

/// `ReportHelper.declareParameter(...)` lines of a script, in order
pub fn extract_declarations(script: &str) -> Vec<&str> {
    script.lines().filter(|line| DECLARE_LINE.is_match(line)).collect()
}

/// Bindings a declaration pass evaluates against: every slot reads as bound
/// and `InRunMode` is false
pub fn declare_bindings() -> Map<String, Value> {
    let mut bindings = Map::new();
    for slot in SlotId::ALL {
        bindings.insert(
            slot.binding_name().to_string(),
            json!({"slot": slot.binding_name(), "bound": true}),
        );
    }
    bindings.insert("InRunMode".into(), Value::Bool(false));
    bindings
}

/// Runs the declaration pass for `report` and returns its schema.
/// Any engine failure is a `Declaration` error.
pub fn declare_parameters(report: &str, dialect: ScriptDialect, script: &str) -> ReportResult<ParameterSchema> {
    let host = ScriptHost::declaring(report);

    match dialect {
        ScriptDialect::Template => {
            if !script.contains("declareParameter") {
                return Ok(ParameterSchema::new());
            }
            TemplateEngine::new(host.clone())
                .render(script, &declare_bindings())
                .map_err(|e| e.into_declaration(report))?;
        }
        ScriptDialect::SqlDump => {
            TemplateEngine::plain(host.clone())
                .render(script, &declare_bindings())
                .map_err(|e| e.into_declaration(report))?;
        }
        ScriptDialect::Script => {
            let lines = extract_declarations(script);
            if lines.is_empty() {
                return Ok(ParameterSchema::new());
            }
            let mut engine = ScriptEngine::new(host.clone());
            engine.bind_json("InRunMode", &Value::Bool(false));
            let statements: Vec<&str> = lines.iter().map(|l| l.trim().trim_end_matches(';')).collect();
            engine
                .run(&statements.join(";\n"))
                .map_err(|e| e.into_declaration(report))?;
        }
    }

    let schema = host.finish().schema;
    tracing::debug!(report = %report, parameters = schema.len(), "declaration pass done");
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rpt_core::ReportError;

    #[test]
    fn test_template_declarations() {
        let script = r#"<h1>Sites</h1>
{{declareParameter "region" "Region" "Limit by region"}}
{{declareParameter "max" "Max" "Row limit" "10" false "integer"}}
{{#each (query "select * from site")}}<p>{{name}}</p>{{/each}}"#;
        let schema = declare_parameters("Sites", ScriptDialect::Template, script).unwrap();
        assert_eq!(schema.names(), vec!["region", "max"]);
        let max = schema.get("MAX").unwrap();
        assert_eq!(max.display_type, "integer");
        assert!(max.required);
    }

    #[test]
    fn test_template_without_declarations_is_not_evaluated() {
        // would fail to parse if evaluated
        let schema = declare_parameters("r", ScriptDialect::Template, "{{#if}}").unwrap();
        assert!(schema.is_empty());
    }

    #[test]
    fn test_redeclare_keeps_position_and_takes_last_attributes() {
        let script = r#"{{declareParameter "a" "First" "x"}}{{declareParameter "b" "B" "y"}}{{declareParameter "a" "Second" "z" "d" false}}"#;
        let schema = declare_parameters("r", ScriptDialect::Template, script).unwrap();
        assert_eq!(schema.names(), vec!["a", "b"]);
        let a = schema.get("a").unwrap();
        assert_eq!(a.label, "Second");
        assert_eq!(a.default_value.as_deref(), Some("d"));
    }

    #[test]
    fn test_sql_dump_declarations() {
        let script = "{{declareParameter \"since\" \"Since\" \"Start date\"}}\nnewsheet \"Sites\";\nselect * from site where created > '{{since}}';\n";
        let schema = declare_parameters("Dump", ScriptDialect::SqlDump, script).unwrap();
        assert!(schema.contains("since"));
    }

    #[test]
    fn test_sql_dump_declare_error() {
        let err = declare_parameters("Dump", ScriptDialect::SqlDump, "{{#each x}}\nselect 1;").unwrap_err();
        assert!(matches!(err, ReportError::Declaration(_)));
        assert!(err.to_string().starts_with("DECLARE/Problem parsing Dump - "));
    }

    #[test]
    fn test_script_declarations_only_run_declare_lines() {
        let script = r#"
ReportHelper.declareParameter("owner", "Owner", "Account owner");
let rows = Source.query("select * from account");
this_function_does_not_exist();
  ReportHelper.declareParameter("status", "Status", "Status filter", "'O:Open','C:Closed'", true, "drop_down")
"#;
        let schema = declare_parameters("Accounts", ScriptDialect::Script, script).unwrap();
        assert_eq!(schema.names(), vec!["owner", "status"]);
        let status = schema.get("status").unwrap();
        assert!(status.is_drop_down());
        assert_eq!(status.default_value, None);
        assert_eq!(status.choice_list().len(), 2);
    }

    #[test]
    fn test_script_declare_error() {
        let script = "ReportHelper.declareParameter(\"a\", \"A\");";
        let err = declare_parameters("Bad", ScriptDialect::Script, script).unwrap_err();
        assert!(matches!(err, ReportError::Declaration(_)));
    }

    #[test]
    fn test_datasource_count() {
        let template = "{{scalar Source2 \"select 1\"}} {{scalar Source3 \"select 2\"}} {{Source2}}";
        assert_eq!(count_datasources(ScriptDialect::Template, template), 3);
        assert_eq!(count_datasources(ScriptDialect::Template, "{{query \"select 1\"}}"), 1);
        assert_eq!(count_datasources(ScriptDialect::Template, "Source21"), 1);

        let dump = "use datasource4;\nselect 1;\nUSE   database1 ;\nselect 2;";
        assert_eq!(count_datasources(ScriptDialect::SqlDump, dump), 3);

        let script = "let a = Source1.query(\"x\");\nlet b = Source1;";
        assert_eq!(count_datasources(ScriptDialect::Script, script), 2);
        assert_eq!(count_datasources(ScriptDialect::Script, "let b = Source3;"), 1);
    }

    proptest! {
        #[test]
        fn test_count_ignores_order_and_repetition(refs in proptest::collection::vec(prop_oneof![Just(2usize), Just(3usize)], 1..12)) {
            let script: String = refs
                .iter()
                .map(|i| format!("{{{{scalar Source{} \"select 1\"}}}}\n", i))
                .collect();
            let expected = if refs.contains(&2) && refs.contains(&3) { 3 } else { 2 };
            prop_assert_eq!(count_datasources(ScriptDialect::Template, &script), expected);
        }

        #[test]
        fn test_schema_matches_declared_names(names in proptest::collection::vec("[a-z]{1,6}", 1..8)) {
            let script: String = names
                .iter()
                .map(|n| format!("{{{{declareParameter \"{}\" \"L\" \"D\"}}}}", n))
                .collect();
            let schema = declare_parameters("p", ScriptDialect::Template, &script).unwrap();
            let mut expected: Vec<String> = Vec::new();
            for n in &names {
                if !expected.contains(n) {
                    expected.push(n.clone());
                }
            }
            prop_assert_eq!(schema.names(), expected);
        }
    }
}
