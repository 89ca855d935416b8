//! Export state machine
use std::fmt;

/// Where an export call is. Every call walks
/// `Idle → DatasourcesOpening → Executing → OutputCaptured → DatasourcesClosing → Done`,
/// dropping to `Failed` from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Idle,
    DatasourcesOpening,
    Executing,
    OutputCaptured,
    DatasourcesClosing,
    Done,
    Failed,
}

impl ExportPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` may follow `self`
    pub fn can_move_to(&self, next: ExportPhase) -> bool {
        use ExportPhase::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Idle, DatasourcesOpening)
            | (DatasourcesOpening, Executing)
            | (Executing, OutputCaptured)
            | (Executing, DatasourcesClosing)
            | (OutputCaptured, DatasourcesClosing)
            | (DatasourcesClosing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Records the phases of one export and traces each move
#[derive(Debug)]
pub struct PhaseTracker {
    report: String,
    current: ExportPhase,
    history: Vec<ExportPhase>,
}

impl PhaseTracker {
    pub fn new(report: impl Into<String>) -> Self {
        Self {
            report: report.into(),
            current: ExportPhase::Idle,
            history: vec![ExportPhase::Idle],
        }
    }

    pub fn current(&self) -> ExportPhase {
        self.current
    }

    pub fn history(&self) -> &[ExportPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: ExportPhase) {
        if !self.current.can_move_to(next) {
            tracing::warn!(report = %self.report, from = %self.current, to = %next, "unexpected export phase");
        }
        tracing::debug!(report = %self.report, from = %self.current, to = %next, "export phase");
        self.current = next;
        self.history.push(next);
    }

    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.advance(ExportPhase::Failed);
        }
    }
}
