//! Rhai implementation of [`ScriptEngine`].
//!
//! Scripts run on a blocking thread (`spawn_blocking`) because every
//! protocol call parks the script until the engine has finished the command.
//! An operation budget guards against scripts that never terminate.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = RhaiEngine::with_limit(100_000);
//! engine.validate_script(&source).await?;
//! engine.execute_protocol(&source, ProtocolContext::new(engine_arc, Handle::current())).await?;
//! ```

use super::context::{register_protocol_api, ProtocolContext};
use super::script_engine::{ScriptEngine, ScriptError};
use async_trait::async_trait;
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use std::sync::Arc;
use tracing::{debug, info};

/// Default per-run operation budget.
pub const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

// =============================================================================
// RhaiEngine Implementation
// =============================================================================

/// Rhai backend with the protocol API registered.
///
/// Each protocol run gets a fresh scope, so runs never share variables.
pub struct RhaiEngine {
    engine: Arc<Engine>,
    max_operations: u64,
}

impl RhaiEngine {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_OPERATIONS)
    }

    /// Build an engine that aborts scripts after `max_operations` steps.
    pub fn with_limit(max_operations: u64) -> Self {
        let mut engine = Engine::new();

        engine.on_progress(move |count| {
            if count > max_operations {
                Some(Dynamic::from(count))
            } else {
                None
            }
        });
        engine.on_print(|text| info!(target: "protocol_script", "{}", text));
        engine.on_debug(|text, source, pos| {
            debug!(target: "protocol_script", ?source, %pos, "{}", text)
        });
        register_protocol_api(&mut engine);

        Self {
            engine: Arc::new(engine),
            max_operations,
        }
    }

    pub fn max_operations(&self) -> u64 {
        self.max_operations
    }
}

impl Default for RhaiEngine {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ScriptEngine Trait Implementation
// =============================================================================

#[async_trait]
impl ScriptEngine for RhaiEngine {
    async fn validate_script(&self, script: &str) -> Result<(), ScriptError> {
        let max_operations = self.max_operations;
        self.engine
            .compile(script)
            .map_err(|err| convert_rhai_error(err.into(), max_operations))?;
        Ok(())
    }

    async fn execute_protocol(
        &self,
        script: &str,
        context: ProtocolContext,
    ) -> Result<(), ScriptError> {
        let engine = Arc::clone(&self.engine);
        let max_operations = self.max_operations;
        let script = script.to_string();

        // Protocol calls block on the engine, keep them off the async workers.
        tokio::task::spawn_blocking(move || {
            let mut scope = Scope::new();
            scope.push("ctx", context);

            engine
                .run_with_scope(&mut scope, &script)
                .map_err(|err| convert_rhai_error(err, max_operations))
        })
        .await
        .map_err(|e| ScriptError::AsyncError {
            message: format!("Task join error: {}", e),
        })?
    }

    fn backend_name(&self) -> &str {
        "Rhai"
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Convert Rhai's EvalAltResult to our ScriptError type
fn convert_rhai_error(error: Box<EvalAltResult>, max_operations: u64) -> ScriptError {
    match *error {
        EvalAltResult::ErrorParsing(parse_error, pos) => ScriptError::CompilationError {
            message: format!("{}", parse_error),
            line: pos.line(),
            column: pos.position(),
        },
        EvalAltResult::ErrorTerminated(_, _) => ScriptError::OperationLimit(max_operations),
        EvalAltResult::ErrorRuntime(message, _) => ScriptError::RuntimeError {
            message: message.to_string(),
        },
        EvalAltResult::ErrorMismatchDataType(expected, actual, _) => {
            ScriptError::TypeConversionError {
                expected,
                found: actual,
            }
        }
        // Errors raised inside a registered function arrive wrapped.
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => {
            convert_rhai_error(inner, max_operations)
        }
        other => ScriptError::RuntimeError {
            message: format!("{}", other),
        },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
