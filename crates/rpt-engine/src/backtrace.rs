//! Script line context for engine errors
use lazy_static::lazy_static;
use regex::Regex;
use rpt_core::ReportError;
use std::fmt;

lazy_static! {
    /// Line reference inside an engine message, e.g. `(line 4, position 9)`
    static ref LINE_REF: Regex = Regex::new(r"line ([0-9]+),").unwrap();
}

/// Engine failure message, already annotated with script context
#[derive(Debug, Clone, PartialEq)]
pub struct EvalFailure {
    pub message: String,
}

impl EvalFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn into_execution(self, report: &str) -> ReportError {
        ReportError::Execution(format!("Problem running report {} - {}", report, self.message))
    }

    pub fn into_declaration(self, report: &str) -> ReportError {
        ReportError::Declaration(format!("Problem parsing {} - {}", report, self.message))
    }
}

impl fmt::Display for EvalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Appends `\n\t[<script line>]` for the failing line. The line comes from
/// the engine when it reports one, otherwise it is read from the message.
pub fn annotate(message: &str, line: Option<usize>, script: &str) -> String {
    let line = line.or_else(|| {
        LINE_REF
            .captures(message)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
    });

    match line.and_then(|n| n.checked_sub(1)).and_then(|i| script.lines().nth(i)) {
        Some(text) if !text.trim().is_empty() => format!("{}\n\t[{}]", message, text.trim()),
        _ => message.to_string(),
    }
}
