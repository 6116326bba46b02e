//! Backend-independent scripting interface.
//!
//! The runner only needs two things from a scripting backend: check that a
//! protocol compiles, and run it to completion with a [`ProtocolContext`]
//! bound as the global `ctx`. Everything else (function registration,
//! safety limits) is backend configuration.
//!
//! [`ProtocolContext`]: super::context::ProtocolContext

use super::context::ProtocolContext;
use async_trait::async_trait;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while compiling or running a protocol script.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// Parsing failed. Positions are 1-based when the backend knows them.
    #[error("Compilation error: {message}{}", format_position(.line, .column))]
    CompilationError {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    /// The script raised, or a protocol call it made failed.
    #[error("Runtime error: {message}")]
    RuntimeError { message: String },

    #[error("Type conversion error: expected {expected}, found {found}")]
    TypeConversionError { expected: String, found: String },

    /// Script ran past its operation budget.
    #[error("Safety limit exceeded: maximum {0} operations")]
    OperationLimit(u64),

    #[error("Async error: {message}")]
    AsyncError { message: String },
}

fn format_position(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" at line {}, column {}", line, column),
        (Some(line), None) => format!(" at line {}", line),
        _ => String::new(),
    }
}

// =============================================================================
// ScriptEngine Trait
// =============================================================================

/// A scripting backend able to run protocol scripts.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Compile without running.
    async fn validate_script(&self, script: &str) -> Result<(), ScriptError>;

    /// Run a protocol to completion with `context` bound as `ctx`.
    ///
    /// Protocol calls block the script until the engine finishes the
    /// corresponding command, so implementations must not run the script on
    /// an async worker thread.
    async fn execute_protocol(
        &self,
        script: &str,
        context: ProtocolContext,
    ) -> Result<(), ScriptError>;

    fn backend_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::CompilationError {
            message: "Unexpected token".to_string(),
            line: Some(10),
            column: Some(5),
        };
        assert_eq!(
            err.to_string(),
            "Compilation error: Unexpected token at line 10, column 5"
        );

        let err = ScriptError::CompilationError {
            message: "Unexpected end of input".to_string(),
            line: None,
            column: None,
        };
        assert_eq!(err.to_string(), "Compilation error: Unexpected end of input");
    }

    #[test]
    fn test_script_error_runtime() {
        let err = ScriptError::RuntimeError {
            message: "Aspirate command failed".to_string(),
        };
        assert!(err.to_string().contains("Aspirate command failed"));
        assert_eq!(
            ScriptError::OperationLimit(100).to_string(),
            "Safety limit exceeded: maximum 100 operations"
        );
    }
}
