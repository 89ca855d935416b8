//! Integration tests for rpt-reports: registry-built reports over the
//! fixtures, cleanup on failure and section exports.

use parking_lot::Mutex;
use rpt_core::{
    Compression, ExecutionResults, ExportFormat, ReportDefinition, ReportError, ReportResult,
    RuntimeParameters,
};
use rpt_datasource::{Datasource, DatasourceBindings, DatasourceProvider, RowSet, SlotId, SqliteProvider};
use rpt_reports::{ExportRequest, ReportOptions, ReportRegistry};
use std::io::{Cursor, Read};
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
         insert into archive values (1, 'moved');
         insert into archive values (2, 'merged');",
    )
}

// =============================================================================
// Counting provider
// =============================================================================

#[derive(Default)]
struct Counts {
    opened: usize,
    closed: usize,
}

/// Wraps a provider and counts opens and real closes
struct CountingProvider {
    inner: SqliteProvider,
    counts: Arc<Mutex<Counts>>,
    fail_open: bool,
}

impl CountingProvider {
    fn new(inner: SqliteProvider) -> (Arc<Self>, Arc<Mutex<Counts>>) {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let provider = Arc::new(Self {
            inner,
            counts: counts.clone(),
            fail_open: false,
        });
        (provider, counts)
    }
}

struct CountingDatasource {
    inner: Box<dyn Datasource>,
    counts: Arc<Mutex<Counts>>,
}

impl DatasourceProvider for CountingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open(&self) -> ReportResult<Box<dyn Datasource>> {
        if self.fail_open {
            return Err(ReportError::Datasource("refused".into()));
        }
        let inner = self.inner.open()?;
        self.counts.lock().opened += 1;
        Ok(Box::new(CountingDatasource {
            inner,
            counts: self.counts.clone(),
        }))
    }
}

impl Datasource for CountingDatasource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn find(&mut self, sql: &str, max_rows: Option<usize>) -> ReportResult<RowSet> {
        self.inner.find(sql, max_rows)
    }

    fn execute(&mut self, sql: &str) -> ReportResult<usize> {
        self.inner.execute(sql)
    }

    fn close(&mut self) -> ReportResult<()> {
        if self.inner.is_open() {
            self.counts.lock().closed += 1;
        }
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

// =============================================================================
// Cleanup on failure
// =============================================================================

#[test]
fn test_failing_script_closes_every_handle_once() {
    let scripts = [
        ("Template", "{{scalar Source1 \"select count(*) from archive\"}}{{query \"select * from nowhere\"}}"),
        ("SqlDump", "use datasource1;\nselect * from archive;\nselect * from nowhere;\n"),
        ("Script", "Source1.query(\"select * from archive\");\nthrow \"stop\";\n"),
    ];

    for (kind, script) in scripts {
        let (primary, primary_counts) = CountingProvider::new(sites());
        let (secondary, secondary_counts) = CountingProvider::new(archive());
        let format = if kind == "SqlDump" { ExportFormat::Csv } else { ExportFormat::Html };

        let mut report = ReportRegistry::global()
            .create(ReportDefinition::new("Failing", kind, script), &ReportOptions::default())
            .unwrap();
        report.set_datasources(DatasourceBindings::primary(primary).bind(SlotId::Source1, secondary));

        let mut out = Vec::new();
        let result = report.export(&ExportRequest::new(format), &mut out, &mut ExecutionResults::new());
        assert!(result.is_err(), "{} should fail", kind);
        assert!(out.is_empty());

        for counts in [primary_counts, secondary_counts] {
            let counts = counts.lock();
            assert_eq!(counts.opened, 1, "{}", kind);
            assert_eq!(counts.closed, 1, "{}", kind);
        }
    }
}

#[test]
fn test_failed_open_closes_the_opened_ones() {
    let (primary, primary_counts) = CountingProvider::new(sites());
    let refusing = Arc::new(CountingProvider {
        inner: archive(),
        counts: Arc::new(Mutex::new(Counts::default())),
        fail_open: true,
    });

    let mut report = ReportRegistry::global()
        .create(ReportDefinition::new("Open", "Template", "<p/>"), &ReportOptions::default())
        .unwrap();
    report.set_datasources(DatasourceBindings::primary(primary).bind(SlotId::Source2, refusing));

    let err = report
        .export(&ExportRequest::new(ExportFormat::Html), &mut Vec::new(), &mut ExecutionResults::new())
        .unwrap_err();
    assert_eq!(err.code(), "DB");
    let counts = primary_counts.lock();
    assert_eq!((counts.opened, counts.closed), (1, 1));
}

// =============================================================================
// Fixtures
// =============================================================================

fn sheet_names(xlsx: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(xlsx)).unwrap();
    let mut workbook = String::new();
    archive.by_name("xl/workbook.xml").unwrap().read_to_string(&mut workbook).unwrap();
    workbook
}

#[test]
fn test_dump_fixture_to_workbook() {
    let definition = ReportDefinition::new("Site Dump", "SqlDump", fixture("site_dump.sql"));
    let mut report = ReportRegistry::global().create(definition, &ReportOptions::default()).unwrap();
    assert_eq!(report.required_datasources(), 2);

    report.set_datasources(DatasourceBindings::primary(Arc::new(sites())).bind(SlotId::Source1, Arc::new(archive())));
    report.set_parameters(RuntimeParameters::new().with("region", "north"));

    let mut out = Vec::new();
    let mut results = ExecutionResults::new();
    report
        .export(&ExportRequest::new(ExportFormat::Excel2010), &mut out, &mut results)
        .unwrap();

    let workbook = sheet_names(&out);
    assert!(workbook.contains(r#"name="Sites""#));
    assert!(workbook.contains(r#"name="Archive""#));
    assert_eq!(results.value("exported"), Some("sites"));
}

#[test]
fn test_dump_fixture_to_gzipped_csv() {
    let definition = ReportDefinition::new("Site Dump", "SqlDump", fixture("site_dump.sql"));
    let mut report = ReportRegistry::global().create(definition, &ReportOptions::default()).unwrap();
    report.set_datasources(DatasourceBindings::primary(Arc::new(sites())).bind(SlotId::Source1, Arc::new(archive())));
    report.set_parameters(RuntimeParameters::new().with("region", "south"));

    let request = ExportRequest::new(ExportFormat::Csv).with_compression(Compression::Gzip);
    let mut out = Vec::new();
    report.export(&request, &mut out, &mut ExecutionResults::new()).unwrap();

    let mut csv = String::new();
    flate2::read::GzDecoder::new(out.as_slice()).read_to_string(&mut csv).unwrap();
    assert_eq!(csv, "id,name,region\r\n2,Bolt,south\r\nid,note\r\n1,moved\r\n2,merged\r\n");
}

#[test]
fn test_template_fixture_to_text() {
    let definition = ReportDefinition::new("Site Summary", "TemplateReport", fixture("site_summary.hbs"));
    let mut report = ReportRegistry::global()
        .create(definition, &ReportOptions::new("http://rpt.local"))
        .unwrap();
    report.set_datasources(DatasourceBindings::primary(Arc::new(sites())).bind(SlotId::Source1, Arc::new(archive())));
    report.set_parameters(RuntimeParameters::new().with("region", "north"));

    let mut out = Vec::new();
    let mut results = ExecutionResults::new();
    report.export(&ExportRequest::new(ExportFormat::Text), &mut out, &mut results).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("Sites in north"));
    assert!(text.contains("1\tAcme"));
    assert!(text.contains("3\tCrane"));
    assert!(text.contains("Archived: 2"));
    assert_eq!(results.value("rendered"), Some("yes"));
}

#[test]
fn test_script_fixture_to_html() {
    let definition = ReportDefinition::new("Site Script", "Script", fixture("site_script.rhai"));
    let mut report = ReportRegistry::global().create(definition, &ReportOptions::default()).unwrap();
    report.set_datasources(DatasourceBindings::primary(Arc::new(sites())));
    report.set_parameters(RuntimeParameters::new().with("region", "north"));

    let mut out = Vec::new();
    let mut results = ExecutionResults::new();
    report.export(&ExportRequest::new(ExportFormat::Html), &mut out, &mut results).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "<h1>2 sites in north</h1>\n<p>1: Acme</p>\n<p>3: Crane</p>\n"
    );
    assert_eq!(results.value("count"), Some("2"));
}
