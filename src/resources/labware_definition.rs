//! Labware definition schema and the built-in definitions.
//!
//! Definitions use the same camelCase JSON layout as the standard labware
//! library, so user-supplied definitions can be deserialized directly.

use crate::types::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quirk marking labware whose wells should be targeted by a multichannel's
/// row center rather than its front nozzle.
pub const CENTER_MULTICHANNEL_ON_WELLS: &str = "centerMultichannelOnWells";

/// Quirk marking the deck's fixed trash.
pub const FIXED_TRASH: &str = "fixedTrash";

/// Build a definition URI of the form `namespace/loadName/version`.
pub fn definition_uri(namespace: &str, load_name: &str, version: u32) -> String {
    format!("{}/{}/{}", namespace, load_name, version)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareDefinition {
    pub namespace: String,
    pub version: u32,
    pub parameters: LabwareParameters,
    #[serde(default)]
    pub metadata: LabwareMetadata,
    pub dimensions: LabwareDimensions,
    #[serde(default)]
    pub corner_offset_from_slot: Point,
    pub wells: BTreeMap<String, WellDefinition>,
    #[serde(default)]
    pub ordering: Vec<Vec<String>>,
}

impl LabwareDefinition {
    pub fn uri(&self) -> String {
        definition_uri(&self.namespace, &self.parameters.load_name, self.version)
    }

    pub fn load_name(&self) -> &str {
        &self.parameters.load_name
    }

    pub fn has_quirk(&self, quirk: &str) -> bool {
        self.parameters.quirks.iter().any(|q| q == quirk)
    }

    pub fn well(&self, well_name: &str) -> Option<&WellDefinition> {
        self.wells.get(well_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareParameters {
    pub load_name: String,
    #[serde(default)]
    pub is_tiprack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_length: Option<f64>,
    #[serde(default)]
    pub quirks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareMetadata {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareDimensions {
    pub x_dimension: f64,
    pub y_dimension: f64,
    pub z_dimension: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellShape {
    Circular,
    Rectangular,
}

/// Well geometry relative to the labware origin. `z` is the well bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellDefinition {
    pub depth: f64,
    pub total_liquid_volume: f64,
    pub shape: WellShape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_dimension: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_dimension: Option<f64>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

// =============================================================================
// Built-in definitions
// =============================================================================

const ROWS: [&str; 8] = ["A", "B", "C", "D", "E", "F", "G", "H"];

/// Lay out a standard 8x12 grid of identical wells, A1 at the back left.
fn grid_96(template: &WellDefinition) -> (BTreeMap<String, WellDefinition>, Vec<Vec<String>>) {
    let mut wells = BTreeMap::new();
    let mut ordering = Vec::with_capacity(12);
    for column in 0..12 {
        let mut column_names = Vec::with_capacity(ROWS.len());
        for (row_index, row) in ROWS.iter().enumerate() {
            let name = format!("{}{}", row, column + 1);
            let well = WellDefinition {
                x: template.x + 9.0 * f64::from(column),
                y: template.y - 9.0 * row_index as f64,
                ..template.clone()
            };
            wells.insert(name.clone(), well);
            column_names.push(name);
        }
        ordering.push(column_names);
    }
    (wells, ordering)
}

fn sbs_dimensions(z_dimension: f64) -> LabwareDimensions {
    LabwareDimensions {
        x_dimension: 127.76,
        y_dimension: 85.48,
        z_dimension,
    }
}

pub fn opentrons_96_tiprack_300ul() -> LabwareDefinition {
    let (wells, ordering) = grid_96(&WellDefinition {
        depth: 59.3,
        total_liquid_volume: 300.0,
        shape: WellShape::Circular,
        diameter: Some(5.23),
        x_dimension: None,
        y_dimension: None,
        x: 14.38,
        y: 74.24,
        z: 5.39,
    });
    LabwareDefinition {
        namespace: "opentrons".into(),
        version: 1,
        parameters: LabwareParameters {
            load_name: "opentrons_96_tiprack_300ul".into(),
            is_tiprack: true,
            tip_length: Some(59.3),
            quirks: Vec::new(),
        },
        metadata: LabwareMetadata {
            display_name: "Opentrons 96 Tip Rack 300 uL".into(),
        },
        dimensions: sbs_dimensions(64.69),
        corner_offset_from_slot: Point::default(),
        wells,
        ordering,
    }
}

pub fn corning_96_wellplate_360ul_flat() -> LabwareDefinition {
    let (wells, ordering) = grid_96(&WellDefinition {
        depth: 10.67,
        total_liquid_volume: 360.0,
        shape: WellShape::Circular,
        diameter: Some(6.86),
        x_dimension: None,
        y_dimension: None,
        x: 14.38,
        y: 74.24,
        z: 3.55,
    });
    LabwareDefinition {
        namespace: "opentrons".into(),
        version: 1,
        parameters: LabwareParameters {
            load_name: "corning_96_wellplate_360ul_flat".into(),
            is_tiprack: false,
            tip_length: None,
            quirks: Vec::new(),
        },
        metadata: LabwareMetadata {
            display_name: "Corning 96 Well Plate 360 uL Flat".into(),
        },
        dimensions: sbs_dimensions(14.22),
        corner_offset_from_slot: Point::default(),
        wells,
        ordering,
    }
}

pub fn nest_12_reservoir_15ml() -> LabwareDefinition {
    let mut wells = BTreeMap::new();
    let mut ordering = Vec::with_capacity(12);
    for column in 0..12u32 {
        let name = format!("A{}", column + 1);
        wells.insert(
            name.clone(),
            WellDefinition {
                depth: 26.85,
                total_liquid_volume: 15000.0,
                shape: WellShape::Rectangular,
                diameter: None,
                x_dimension: Some(8.2),
                y_dimension: Some(71.2),
                x: 14.38 + 9.0 * f64::from(column),
                y: 42.78,
                z: 4.55,
            },
        );
        ordering.push(vec![name]);
    }
    LabwareDefinition {
        namespace: "opentrons".into(),
        version: 1,
        parameters: LabwareParameters {
            load_name: "nest_12_reservoir_15ml".into(),
            is_tiprack: false,
            tip_length: None,
            quirks: vec![CENTER_MULTICHANNEL_ON_WELLS.into()],
        },
        metadata: LabwareMetadata {
            display_name: "NEST 12 Well Reservoir 15 mL".into(),
        },
        dimensions: sbs_dimensions(31.4),
        corner_offset_from_slot: Point::default(),
        wells,
        ordering,
    }
}

pub fn opentrons_1_trash_1100ml_fixed() -> LabwareDefinition {
    let mut wells = BTreeMap::new();
    wells.insert(
        "A1".to_string(),
        WellDefinition {
            depth: 0.0,
            total_liquid_volume: 1_100_000.0,
            shape: WellShape::Rectangular,
            diameter: None,
            x_dimension: Some(172.86),
            y_dimension: Some(165.86),
            x: 82.84,
            y: 80.0,
            z: 82.0,
        },
    );
    LabwareDefinition {
        namespace: "opentrons".into(),
        version: 1,
        parameters: LabwareParameters {
            load_name: "opentrons_1_trash_1100ml_fixed".into(),
            is_tiprack: false,
            tip_length: None,
            quirks: vec![
                CENTER_MULTICHANNEL_ON_WELLS.into(),
                FIXED_TRASH.into(),
            ],
        },
        metadata: LabwareMetadata {
            display_name: "Opentrons Fixed Trash".into(),
        },
        dimensions: LabwareDimensions {
            x_dimension: 172.86,
            y_dimension: 165.86,
            z_dimension: 82.0,
        },
        corner_offset_from_slot: Point::default(),
        wells,
        ordering: vec![vec!["A1".into()]],
    }
}

/// Every definition that ships with the engine.
pub fn builtin_definitions() -> Vec<LabwareDefinition> {
    vec![
        opentrons_96_tiprack_300ul(),
        corning_96_wellplate_360ul_flat(),
        nest_12_reservoir_15ml(),
        opentrons_1_trash_1100ml_fixed(),
    ]
}
