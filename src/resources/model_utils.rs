//! Id and timestamp generation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

/// Generate a new unique id.
pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Issues ids and timestamps for commands and loaded equipment.
///
/// Timestamps never go backwards, even if the wall clock does, so command
/// `createdAt <= startedAt <= completedAt` holds regardless of clock skew.
#[derive(Debug)]
pub struct ModelUtils {
    last_timestamp: Mutex<DateTime<Utc>>,
}

impl ModelUtils {
    pub fn new() -> Self {
        Self {
            last_timestamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn generate_id(&self) -> String {
        new_uid()
    }

    /// Current time, clamped to be no earlier than the last issued timestamp.
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last_timestamp.lock();
        let now = Utc::now().max(*last);
        *last = now;
        now
    }
}

impl Default for ModelUtils {
    fn default() -> Self {
        Self::new()
    }
}
