//! Run control commands.

use serde::{Deserialize, Serialize};

/// Pause the run once this command completes. Resumed by `play`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PauseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PauseResult {}
