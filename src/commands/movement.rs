//! Gantry movement commands.

use crate::types::WellLocation;
use serde::{Deserialize, Serialize};

/// Move a pipette to a location inside a well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveToWellData {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
    #[serde(default)]
    pub well_location: WellLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveToWellResult {}
