//! Unified Error Model
use thiserror::Error;

use crate::format::ExportFormat;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    /// Script could not be parsed to extract its parameter schema
    #[error("DECLARE/{0}")]
    Declaration(String),

    /// A runtime parameter could not be resolved
    #[error("RESOLVE/{0}")]
    Resolution(String),

    #[error("EXEC/{0}")]
    Execution(String),

    #[error("FORMAT/Unsupported export format [{format}] for report [{report}]")]
    UnsupportedFormat { format: ExportFormat, report: String },

    #[error("SOURCE/Problem running command [{command}] - data source {slot} unknown")]
    DatasourceUnbound { slot: String, command: String },

    #[error("DB/{0}")]
    Datasource(String),

    #[error("CONFIG/{0}")]
    Configuration(String),

    #[error("OUTPUT/{0}")]
    Output(String),

    #[error("ACTION/Invalid action specified")]
    InvalidAction,

    #[error("IO/{0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// Short code prefix, e.g. `EXEC`
    pub fn code(&self) -> &'static str {
        match self {
            Self::Declaration(_) => "DECLARE",
            Self::Resolution(_) => "RESOLVE",
            Self::Execution(_) => "EXEC",
            Self::UnsupportedFormat { .. } => "FORMAT",
            Self::DatasourceUnbound { .. } => "SOURCE",
            Self::Datasource(_) => "DB",
            Self::Configuration(_) => "CONFIG",
            Self::Output(_) => "OUTPUT",
            Self::InvalidAction => "ACTION",
            Self::Io(_) => "IO",
        }
    }

    /// Message without the code prefix
    pub fn message(&self) -> String {
        let text = self.to_string();
        match text.split_once('/') {
            Some((_, rest)) => rest.to_string(),
            None => text,
        }
    }

    /// True for errors caused by the caller's request rather than the run
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. } | Self::InvalidAction | Self::Resolution(_)
        )
    }
}
