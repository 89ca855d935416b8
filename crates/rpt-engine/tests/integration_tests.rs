//! Integration tests for rpt-engine with the report scripts under
//! `fixtures/reports`.

use rpt_core::{ExecutionContext, ExecutionResults, RuntimeParameters, Task};
use rpt_datasource::{DatasourceBindings, DatasourceSet, SlotId, SqliteProvider};
use rpt_engine::declare::{count_datasources, declare_parameters};
use rpt_engine::{ParameterResolver, ScriptDialect, ScriptEngine, ScriptHost, TemplateEngine};
use serde_json::{json, Value};
use std::sync::Arc;

fn fixture(name: &str) -> String {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = std::path::Path::new(&manifest_dir).parent().unwrap().parent().unwrap();
    std::fs::read_to_string(workspace_root.join("fixtures/reports").join(name)).unwrap()
}

fn sites() -> SqliteProvider {
    SqliteProvider::memory("sites").with_init_sql(
        "create table site (id integer, name text, region text, status text);
         insert into site values (1, 'Acme', 'north', 'C');
         insert into site values (2, 'Bolt', 'south', 'C');
         insert into site values (3, 'Crane', 'north', 'A');",
    )
}

fn archive() -> SqliteProvider {
    SqliteProvider::memory("archive").with_init_sql(
        "create table archive (id integer, note text);
         insert into archive values (1, 'moved');",
    )
}

fn bindings() -> DatasourceBindings {
    DatasourceBindings::primary(Arc::new(sites())).bind(SlotId::Source1, Arc::new(archive()))
}

// =============================================================================
// Declaration pass
// =============================================================================

#[test]
fn test_template_fixture_schema() {
    let script = fixture("site_summary.hbs");
    let schema = declare_parameters("Site Summary", ScriptDialect::Template, &script).unwrap();
    assert_eq!(schema.names(), vec!["region", "status"]);
    assert!(schema.get("region").unwrap().required);
    assert_eq!(schema.get("status").unwrap().choice_list().len(), 2);
    assert_eq!(count_datasources(ScriptDialect::Template, &script), 2);
}

#[test]
fn test_dump_fixture_schema() {
    let script = fixture("site_dump.sql");
    let schema = declare_parameters("Site Dump", ScriptDialect::SqlDump, &script).unwrap();
    assert!(schema.contains("region"));
    assert_eq!(count_datasources(ScriptDialect::SqlDump, &script), 2);
}

#[test]
fn test_script_fixture_schema() {
    let script = fixture("site_script.rhai");
    let schema = declare_parameters("Site Script", ScriptDialect::Script, &script).unwrap();
    assert_eq!(schema.names(), vec!["region"]);
    assert_eq!(count_datasources(ScriptDialect::Script, &script), 1);
}

// =============================================================================
// Run mode
// =============================================================================

#[test]
fn test_template_fixture_renders() {
    let params = RuntimeParameters::new().with("region", "north");
    let ctx = ExecutionContext::new("Site Summary").with_parameters(params);
    let mut vars = ctx.bindings();
    for slot in SlotId::ALL {
        vars.insert(
            slot.binding_name().to_string(),
            json!({"slot": slot.binding_name(), "bound": bindings().is_bound(slot)}),
        );
    }

    let host = ScriptHost::running(
        "Site Summary",
        DatasourceSet::open(&bindings()).unwrap(),
        ExecutionResults::new(),
    );
    let html = TemplateEngine::new(host.clone())
        .render(&fixture("site_summary.hbs"), &vars)
        .unwrap();

    assert!(html.contains("<h1>Sites in north</h1>"));
    assert!(html.contains("<td>Acme</td>"));
    assert!(html.contains("<td>Crane</td>"));
    assert!(!html.contains("Bolt"));
    assert!(html.contains("Archived: 1"));

    let outcome = host.finish();
    assert_eq!(outcome.results.value("rendered"), Some("yes"));
}

#[test]
fn test_script_fixture_runs() {
    let params = RuntimeParameters::new().with("region", "south");
    let ctx = ExecutionContext::new("Site Script").with_parameters(params);
    let host = ScriptHost::running(
        "Site Script",
        DatasourceSet::open(&bindings()).unwrap(),
        ExecutionResults::new(),
    );

    let mut engine = ScriptEngine::new(host.clone());
    engine.bind_all(&ctx.bindings());
    let out = engine.run(&fixture("site_script.rhai")).unwrap();

    assert_eq!(out, "<h1>1 sites in south</h1>\n<p>2: Bolt</p>\n");
    assert_eq!(host.finish().results.value("count"), Some("1"));
}

// =============================================================================
// Resolution feeding a run
// =============================================================================

#[test]
fn test_resolved_parameters_feed_template() {
    let mut task = Task::new("t9", "Weekly");
    task.variables.insert("Home".into(), "north".into());
    let resolver = ParameterResolver::new("http://reports").with_lookup(Arc::new(sites()));

    let pairs = vec![
        ("region".to_string(), Some("select region from site where id = 3".to_string())),
        ("ids".to_string(), Some("[1..2]".to_string())),
        ("title".to_string(), Some("$TaskName for $Home".to_string())),
    ];
    let params = resolver.resolve_all(&pairs, &task, None).unwrap();
    assert_eq!(params.get("ids").unwrap().value, json!([1, 2]));

    let ctx = ExecutionContext::new("r").with_parameters(params);
    let host = ScriptHost::declaring("r");
    let out = TemplateEngine::plain(host)
        .render("{{title}}: {{region}} {{join ids \"+\"}}", &ctx.bindings())
        .unwrap();
    assert_eq!(out, "Weekly for north: north 1+2");
    assert_eq!(ctx.bindings().get("InRunMode"), Some(&Value::Bool(true)));
}
