//! Shared value types for the protocol engine.
//!
//! Everything in here is plain data: positions, mounts, deck slots and the
//! loaded-equipment records that the state store hands out to readers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

// =============================================================================
// Geometry
// =============================================================================

/// Absolute or relative position in deck coordinates (mm).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Same x/y, different height.
    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Geometric reference point on a pipette used for positioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriticalPoint {
    /// Nozzle of a bare pipette
    Nozzle,
    /// End of an attached tip
    Tip,
    /// Center of a multichannel's nozzle row
    XyCenter,
    /// Frontmost nozzle of a multichannel
    FrontNozzle,
}

/// One intermediate target of a planned movement.
///
/// A `critical_point` of `None` means "keep whichever critical point the
/// hardware currently has active".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub position: Point,
    pub critical_point: Option<CriticalPoint>,
}

impl Waypoint {
    pub fn new(position: Point, critical_point: Option<CriticalPoint>) -> Self {
        Self {
            position,
            critical_point,
        }
    }
}

// =============================================================================
// Mounts & pipettes
// =============================================================================

/// Pipette attachment point on the gantry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    Left,
    Right,
}

impl Mount {
    /// The other mount.
    pub fn other(self) -> Mount {
        match self {
            Mount::Left => Mount::Right,
            Mount::Right => Mount::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mount::Left => "left",
            Mount::Right => "right",
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Mount::Left),
            "right" => Ok(Mount::Right),
            other => Err(format!("unknown mount '{}'", other)),
        }
    }
}

/// Supported pipette models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipetteName {
    P10Single,
    P10Multi,
    P20SingleGen2,
    P20MultiGen2,
    P50Single,
    P50Multi,
    P300Single,
    P300Multi,
    P300SingleGen2,
    P300MultiGen2,
    P1000Single,
    P1000SingleGen2,
}

impl PipetteName {
    const ALL: [PipetteName; 12] = [
        PipetteName::P10Single,
        PipetteName::P10Multi,
        PipetteName::P20SingleGen2,
        PipetteName::P20MultiGen2,
        PipetteName::P50Single,
        PipetteName::P50Multi,
        PipetteName::P300Single,
        PipetteName::P300Multi,
        PipetteName::P300SingleGen2,
        PipetteName::P300MultiGen2,
        PipetteName::P1000Single,
        PipetteName::P1000SingleGen2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipetteName::P10Single => "p10_single",
            PipetteName::P10Multi => "p10_multi",
            PipetteName::P20SingleGen2 => "p20_single_gen2",
            PipetteName::P20MultiGen2 => "p20_multi_gen2",
            PipetteName::P50Single => "p50_single",
            PipetteName::P50Multi => "p50_multi",
            PipetteName::P300Single => "p300_single",
            PipetteName::P300Multi => "p300_multi",
            PipetteName::P300SingleGen2 => "p300_single_gen2",
            PipetteName::P300MultiGen2 => "p300_multi_gen2",
            PipetteName::P1000Single => "p1000_single",
            PipetteName::P1000SingleGen2 => "p1000_single_gen2",
        }
    }

    /// Nominal maximum volume in µL.
    pub fn max_volume(&self) -> f64 {
        match self {
            PipetteName::P10Single | PipetteName::P10Multi => 10.0,
            PipetteName::P20SingleGen2 | PipetteName::P20MultiGen2 => 20.0,
            PipetteName::P50Single | PipetteName::P50Multi => 50.0,
            PipetteName::P300Single
            | PipetteName::P300Multi
            | PipetteName::P300SingleGen2
            | PipetteName::P300MultiGen2 => 300.0,
            PipetteName::P1000Single | PipetteName::P1000SingleGen2 => 1000.0,
        }
    }

    pub fn is_multichannel(&self) -> bool {
        self.as_str().contains("multi")
    }
}

impl fmt::Display for PipetteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipetteName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown pipette name '{}'", s))
    }
}

// =============================================================================
// Deck & wells
// =============================================================================

/// Named slot on the deck surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeckSlotName {
    #[serde(rename = "1")]
    Slot1,
    #[serde(rename = "2")]
    Slot2,
    #[serde(rename = "3")]
    Slot3,
    #[serde(rename = "4")]
    Slot4,
    #[serde(rename = "5")]
    Slot5,
    #[serde(rename = "6")]
    Slot6,
    #[serde(rename = "7")]
    Slot7,
    #[serde(rename = "8")]
    Slot8,
    #[serde(rename = "9")]
    Slot9,
    #[serde(rename = "10")]
    Slot10,
    #[serde(rename = "11")]
    Slot11,
    #[serde(rename = "12")]
    Slot12,
}

impl DeckSlotName {
    /// All slots in numeric order.
    pub const ALL: [DeckSlotName; 12] = [
        DeckSlotName::Slot1,
        DeckSlotName::Slot2,
        DeckSlotName::Slot3,
        DeckSlotName::Slot4,
        DeckSlotName::Slot5,
        DeckSlotName::Slot6,
        DeckSlotName::Slot7,
        DeckSlotName::Slot8,
        DeckSlotName::Slot9,
        DeckSlotName::Slot10,
        DeckSlotName::Slot11,
        DeckSlotName::Slot12,
    ];

    /// Slot reserved for the fixed trash.
    pub const FIXED_TRASH: DeckSlotName = DeckSlotName::Slot12;

    pub fn number(&self) -> u8 {
        match self {
            DeckSlotName::Slot1 => 1,
            DeckSlotName::Slot2 => 2,
            DeckSlotName::Slot3 => 3,
            DeckSlotName::Slot4 => 4,
            DeckSlotName::Slot5 => 5,
            DeckSlotName::Slot6 => 6,
            DeckSlotName::Slot7 => 7,
            DeckSlotName::Slot8 => 8,
            DeckSlotName::Slot9 => 9,
            DeckSlotName::Slot10 => 10,
            DeckSlotName::Slot11 => 11,
            DeckSlotName::Slot12 => 12,
        }
    }

    pub fn from_number(number: i64) -> Option<DeckSlotName> {
        Self::ALL
            .iter()
            .copied()
            .find(|slot| i64::from(slot.number()) == number)
    }
}

impl fmt::Display for DeckSlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for DeckSlotName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .ok()
            .and_then(DeckSlotName::from_number)
            .ok_or_else(|| format!("unknown deck slot '{}'", s))
    }
}

/// Where a piece of labware sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareLocation {
    pub slot_name: DeckSlotName,
}

impl LabwareLocation {
    pub fn slot(slot_name: DeckSlotName) -> Self {
        Self { slot_name }
    }
}

/// Reference height inside a well that an offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellOrigin {
    #[default]
    Top,
    Bottom,
    Center,
}

/// Relative address inside a well.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellLocation {
    #[serde(default)]
    pub origin: WellOrigin,
    #[serde(default)]
    pub offset: Point,
}

impl WellLocation {
    pub fn new(origin: WellOrigin, offset: Point) -> Self {
        Self { origin, offset }
    }

    pub fn top() -> Self {
        Self::default()
    }

    pub fn bottom(z_offset: f64) -> Self {
        Self::new(WellOrigin::Bottom, Point::new(0.0, 0.0, z_offset))
    }
}

/// Per-labware calibration correction applied on top of nominal geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationOffset {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<CalibrationOffset> for Point {
    fn from(offset: CalibrationOffset) -> Point {
        Point::new(offset.x, offset.y, offset.z)
    }
}

// =============================================================================
// Loaded equipment records
// =============================================================================

/// Labware that a LoadLabware command placed on the deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedLabware {
    pub id: String,
    pub location: LabwareLocation,
    pub load_name: String,
    pub definition_uri: String,
}

/// Pipette that a LoadPipette command attached to a mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedPipette {
    pub id: String,
    pub pipette_name: PipetteName,
    pub mount: Mount,
}

/// Last well a pipette deliberately moved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWell {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
}

impl CurrentWell {
    pub fn new(
        pipette_id: impl Into<String>,
        labware_id: impl Into<String>,
        well_name: impl Into<String>,
    ) -> Self {
        Self {
            pipette_id: pipette_id.into(),
            labware_id: labware_id.into(),
            well_name: well_name.into(),
        }
    }
}

/// Tip dimensions resolved from a tiprack for a given pipette.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TipGeometry {
    pub effective_length: f64,
    pub diameter: f64,
    pub volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_parsing() {
        assert_eq!("3".parse::<DeckSlotName>().unwrap(), DeckSlotName::Slot3);
        assert_eq!(DeckSlotName::from_number(12), Some(DeckSlotName::Slot12));
        assert!("13".parse::<DeckSlotName>().is_err());
        assert_eq!(
            serde_json::to_string(&DeckSlotName::Slot10).unwrap(),
            "\"10\""
        );
    }

    #[test]
    fn test_pipette_name_strings() {
        let name: PipetteName = "p300_single_gen2".parse().unwrap();
        assert_eq!(name, PipetteName::P300SingleGen2);
        assert_eq!(
            serde_json::to_string(&PipetteName::P20MultiGen2).unwrap(),
            "\"p20_multi_gen2\""
        );
        assert!(PipetteName::P300Multi.is_multichannel());
        assert_eq!(PipetteName::P1000Single.max_volume(), 1000.0);
    }

    #[test]
    fn test_well_location_defaults_to_top() {
        let location: WellLocation = serde_json::from_str("{}").unwrap();
        assert_eq!(location, WellLocation::top());

        let bottom: WellLocation =
            serde_json::from_str(r#"{"origin": "bottom", "offset": {"x": 0, "y": 0, "z": 1}}"#)
                .unwrap();
        assert_eq!(bottom, WellLocation::bottom(1.0));
    }

    #[test]
    fn test_critical_point_serialization() {
        assert_eq!(
            serde_json::to_string(&CriticalPoint::XyCenter).unwrap(),
            "\"XY_CENTER\""
        );
    }
}
