//! Liquid handling and tip commands.

use crate::types::WellLocation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspirateData {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
    #[serde(default)]
    pub well_location: WellLocation,
    /// Volume in µL.
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AspirateResult {
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseData {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
    #[serde(default)]
    pub well_location: WellLocation,
    /// Volume in µL.
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispenseResult {
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickUpTipData {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickUpTipResult {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTipData {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropTipResult {}
