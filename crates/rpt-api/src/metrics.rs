//! Prometheus registry behind `/metrics`
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Counters shared by every handler. Cloning shares the collectors.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    exports: IntCounterVec,
    export_seconds: Histogram,
    workflow_runs: IntCounterVec,
    redemptions: IntCounterVec,
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let exports = IntCounterVec::new(
            Opts::new("rpt_report_exports_total", "Report exports by type, format and outcome"),
            &["type", "format", "outcome"],
        )?;
        let export_seconds = Histogram::with_opts(HistogramOpts::new(
            "rpt_report_export_seconds",
            "Wall time of report exports",
        ))?;
        let workflow_runs = IntCounterVec::new(
            Opts::new("rpt_workflow_runs_total", "Workflow runs by outcome"),
            &["outcome"],
        )?;
        let redemptions = IntCounterVec::new(
            Opts::new("rpt_action_redemptions_total", "Action redemptions by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(exports.clone()))?;
        registry.register(Box::new(export_seconds.clone()))?;
        registry.register(Box::new(workflow_runs.clone()))?;
        registry.register(Box::new(redemptions.clone()))?;

        Ok(Self {
            registry,
            exports,
            export_seconds,
            workflow_runs,
            redemptions,
        })
    }

    pub fn record_export(&self, report_type: &str, format: &str, ok: bool, seconds: f64) {
        self.exports.with_label_values(&[report_type, format, outcome(ok)]).inc();
        self.export_seconds.observe(seconds);
    }

    pub fn record_workflow(&self, ok: bool) {
        self.workflow_runs.with_label_values(&[outcome(ok)]).inc();
    }

    /// `invalid` is counted apart from runs that ended in a workflow error
    pub fn record_redemption(&self, outcome: &str) {
        self.redemptions.with_label_values(&[outcome]).inc();
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_counts() {
        let metrics = Metrics::new().unwrap();
        metrics.record_export("Template", "html", true, 0.25);
        metrics.record_export("Template", "html", true, 0.5);
        metrics.record_workflow(false);
        metrics.record_redemption("invalid");

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"rpt_report_exports_total{format="html",outcome="ok",type="Template"} 2"#));
        assert!(text.contains("rpt_report_export_seconds_count 2"));
        assert!(text.contains(r#"rpt_workflow_runs_total{outcome="error"} 1"#));
        assert!(text.contains(r#"rpt_action_redemptions_total{outcome="invalid"} 1"#));
    }
}
