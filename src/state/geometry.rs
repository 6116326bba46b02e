//! Deck geometry derived from loaded labware.
//!
//! Positions compose as
//!
//! ```text
//! slot position + cornerOffsetFromSlot + calibration offset = labware position
//! labware position + well (x, y, z) + origin depth + offset  = well position
//! ```

use super::labware::LabwareView;
use crate::error::{EngineError, EngineResult};
use crate::hardware::PipetteConfig;
use crate::resources::FIXED_TRASH;
use crate::types::{Point, TipGeometry, WellLocation, WellOrigin};

#[derive(Debug, Clone, Copy)]
pub struct GeometryView<'a> {
    labware: LabwareView<'a>,
}

impl<'a> GeometryView<'a> {
    pub(super) fn new(labware: LabwareView<'a>) -> Self {
        Self { labware }
    }

    /// Position of the slot the labware sits in.
    pub fn get_labware_parent_position(&self, labware_id: &str) -> EngineResult<Point> {
        let labware = self.labware.get(labware_id)?;
        Ok(self.labware.get_slot_position(labware.location.slot_name))
    }

    /// Nominal labware origin, before calibration.
    pub fn get_labware_origin_position(&self, labware_id: &str) -> EngineResult<Point> {
        let definition = self.labware.get_labware_definition(labware_id)?;
        Ok(self.get_labware_parent_position(labware_id)? + definition.corner_offset_from_slot)
    }

    /// Calibrated labware origin.
    pub fn get_labware_position(&self, labware_id: &str) -> EngineResult<Point> {
        let calibration = self.labware.get_calibration_offset(labware_id)?;
        Ok(self.get_labware_origin_position(labware_id)? + Point::from(calibration))
    }

    pub fn get_labware_highest_z(&self, labware_id: &str) -> EngineResult<f64> {
        let definition = self.labware.get_labware_definition(labware_id)?;
        Ok(self.get_labware_position(labware_id)?.z + definition.dimensions.z_dimension)
    }

    /// Tallest point of any loaded labware, 0 on an empty deck.
    pub fn get_all_labware_highest_z(&self) -> EngineResult<f64> {
        self.labware
            .get_all()
            .iter()
            .try_fold(0.0_f64, |highest, labware| {
                Ok(highest.max(self.get_labware_highest_z(&labware.id)?))
            })
    }

    pub fn get_well_position(
        &self,
        labware_id: &str,
        well_name: &str,
        well_location: &WellLocation,
    ) -> EngineResult<Point> {
        let labware_position = self.get_labware_position(labware_id)?;
        let well = self.labware.get_well_definition(labware_id, well_name)?;

        let origin_z = match well_location.origin {
            WellOrigin::Top => well.depth,
            WellOrigin::Center => well.depth / 2.0,
            WellOrigin::Bottom => 0.0,
        };

        Ok(labware_position
            + Point::new(well.x, well.y, well.z + origin_z)
            + well_location.offset)
    }

    /// Tip length minus how far the tip slides onto the nozzle.
    pub fn get_effective_tip_length(
        &self,
        labware_id: &str,
        pipette_config: &PipetteConfig,
    ) -> EngineResult<f64> {
        let tip_length = self.labware.get_tip_length(labware_id)?;
        let uri = self.labware.get_definition_uri(labware_id)?;
        Ok(tip_length - pipette_config.tip_overlap_for(uri))
    }

    pub fn get_tip_geometry(
        &self,
        labware_id: &str,
        well_name: &str,
        pipette_config: &PipetteConfig,
    ) -> EngineResult<TipGeometry> {
        let effective_length = self.get_effective_tip_length(labware_id, pipette_config)?;
        let well = self.labware.get_well_definition(labware_id, well_name)?;
        let diameter = well
            .diameter
            .ok_or_else(|| EngineError::LabwareIsNotTiprack(labware_id.to_string()))?;

        Ok(TipGeometry {
            effective_length,
            diameter,
            volume: well.total_liquid_volume,
        })
    }

    /// Where to release a tip: the top of a trash, or partway down a tiprack.
    pub fn get_tip_drop_location(
        &self,
        labware_id: &str,
        pipette_config: &PipetteConfig,
    ) -> EngineResult<WellLocation> {
        if self.labware.get_has_quirk(labware_id, FIXED_TRASH)? {
            return Ok(WellLocation::top());
        }

        let tip_length = self.get_effective_tip_length(labware_id, pipette_config)?;
        Ok(WellLocation::new(
            WellOrigin::Top,
            Point::new(0.0, 0.0, -tip_length * pipette_config.return_tip_height),
        ))
    }
}
