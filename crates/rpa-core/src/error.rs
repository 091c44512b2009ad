use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failure, used for policy decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Expression text failed to resolve to a typed value.
    Evaluation,
    /// A leaf command raised.
    Command,
    /// A nested script run finished in error and nobody acknowledged it.
    Propagation,
    /// The script tree or engine options are inconsistent.
    Configuration,
    /// Cooperative exit. Never recorded as an error.
    Cancellation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Evaluation => "evaluation",
            Self::Command => "command",
            Self::Propagation => "propagation",
            Self::Configuration => "configuration",
            Self::Cancellation => "cancellation",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct EngineError {
    pub code: String,
    pub message: String,
    pub kind: ErrorKind,
    /// Line of the action the error was recorded against. `None` until the
    /// dispatch loop records it.
    pub line: Option<usize>,
}

impl EngineError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Command, code, message)
    }

    pub fn with_kind(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
            line: None,
        }
    }

    pub fn evaluation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Evaluation, code, message)
    }

    pub fn configuration(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Configuration, code, message)
    }

    pub fn propagation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Propagation, code, message)
    }

    pub fn cancelled() -> Self {
        Self::with_kind(
            ErrorKind::Cancellation,
            "ENGINE_CANCELLED",
            "Execution was cancelled.",
        )
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == ErrorKind::Cancellation
    }
}

/// An error as it lands in the run's error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptError {
    pub source_file: String,
    pub line: usize,
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub stack_trace: String,
}

impl ScriptError {
    pub fn from_engine_error(
        error: &EngineError,
        source_file: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            line: error.line.unwrap_or(0),
            kind: error.kind,
            code: error.code.clone(),
            message: error.message.clone(),
            stack_trace: stack_trace.into(),
        }
    }

    pub fn to_engine_error(&self) -> EngineError {
        EngineError::with_kind(self.kind, self.code.clone(), self.message.clone()).at_line(self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_code_and_message() {
        let error = EngineError::new("ENGINE_THROWN", "boom");
        assert_eq!(error.to_string(), "ENGINE_THROWN: boom");
        assert_eq!(error.kind, ErrorKind::Command);
        assert_eq!(error.line, None);
    }

    #[test]
    fn script_error_keeps_line_and_kind() {
        let error = EngineError::evaluation("ENGINE_EVAL_ERROR", "bad expr").at_line(7);
        let recorded = ScriptError::from_engine_error(&error, "main.script.json", "  at main:7");
        assert_eq!(recorded.line, 7);
        assert_eq!(recorded.kind, ErrorKind::Evaluation);
        assert_eq!(recorded.source_file, "main.script.json");

        let back = recorded.to_engine_error();
        assert_eq!(back.line, Some(7));
        assert_eq!(back.code, "ENGINE_EVAL_ERROR");
    }

    #[test]
    fn cancellation_is_flagged() {
        assert!(EngineError::cancelled().is_cancellation());
        assert!(!EngineError::new("X", "y").is_cancellation());
        assert_eq!(ErrorKind::Propagation.as_str(), "propagation");
    }
}
