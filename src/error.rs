use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Why a single input row was skipped. Row failures never abort a request on
/// their own; they surface through `skipped_rows` or the empty-semester error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssueKind {
    MalformedRow,
    InvalidMarks,
}

/// One skipped row. `line` is 1-based over the raw input (the header is line 1)
/// for CSV input, and the 1-based subject position for transcript input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub line: usize,
    pub kind: RowIssueKind,
    pub message: String,
}

impl RowIssue {
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            kind: RowIssueKind::MalformedRow,
            message: message.into(),
        }
    }

    pub fn invalid_marks(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            kind: RowIssueKind::InvalidMarks,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no valid subjects left in {}", .labels.join(", "))]
    EmptySemester {
        labels: Vec<String>,
        issues: Vec<RowIssue>,
    },

    #[error("no subjects were entered")]
    EmptyRecord { issues: Vec<RowIssue> },

    #[error("registration number must not be empty")]
    InvalidRegistrationNumber,

    #[error("no result record found for registration number {reg_number}")]
    RecordNotFound { reg_number: String },

    #[error("result source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("result source returned an unexpected page: {reason}")]
    UpstreamFormat { reason: String },

    #[error("percentage {0} is outside 0..=100")]
    OutOfRange(f64),

    #[error(transparent)]
    InvalidScale(#[from] crate::scale::ScaleError),

    #[error("internal consistency check failed: {0}")]
    InternalConsistency(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Stable wire code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::EmptySemester { .. } => "empty_semester",
            EngineError::EmptyRecord { .. } => "empty_record",
            EngineError::InvalidRegistrationNumber => "invalid_registration_number",
            EngineError::RecordNotFound { .. } => "record_not_found",
            EngineError::SourceUnavailable { .. } => "source_unavailable",
            EngineError::UpstreamFormat { .. } => "upstream_format",
            EngineError::OutOfRange(_) => "out_of_range",
            EngineError::InvalidScale(_) => "invalid_scale",
            EngineError::InternalConsistency(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::SourceUnavailable { .. })
    }

    /// Errors that mean the engine itself is broken rather than the input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            EngineError::InternalConsistency(_)
                | EngineError::OutOfRange(_)
                | EngineError::InvalidScale(_)
        )
    }

    /// Message shown to the user. Internal failures are not described in detail.
    pub fn user_message(&self) -> String {
        if self.is_internal() {
            "the result could not be computed".to_string()
        } else {
            self.to_string()
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::EmptySemester { labels, issues } => Some(json!({
                "semesters": labels,
                "skipped_rows": issues,
            })),
            EngineError::EmptyRecord { issues } if !issues.is_empty() => {
                Some(json!({ "skipped_rows": issues }))
            }
            EngineError::RecordNotFound { .. }
            | EngineError::SourceUnavailable { .. }
            | EngineError::UpstreamFormat { .. } => {
                Some(json!({ "retryable": self.is_retryable() }))
            }
            _ => None,
        }
    }
}
