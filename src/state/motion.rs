//! Motion queries: where a pipette is, and how to get it somewhere else.

use super::geometry::GeometryView;
use super::labware::LabwareView;
use super::pipettes::PipetteView;
use crate::error::{EngineError, EngineResult};
use crate::motion_planning::{get_waypoints, MoveType, WaypointRequest};
use crate::resources::CENTER_MULTICHANNEL_ON_WELLS;
use crate::types::{CriticalPoint, CurrentWell, Mount, Point, WellLocation, Waypoint};

/// Mount and critical point a pipette is currently positioned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipetteLocationData {
    pub mount: Mount,
    pub critical_point: Option<CriticalPoint>,
}

/// Arguments for [`MotionPlanning::get_movement_waypoints`].
#[derive(Debug, Clone, Copy)]
pub struct MovementRequest<'r> {
    pub pipette_id: &'r str,
    pub labware_id: &'r str,
    pub well_name: &'r str,
    pub well_location: &'r WellLocation,
    pub origin: Point,
    pub origin_cp: Option<CriticalPoint>,
    pub max_travel_z: f64,
    /// Overrides the stored current well when planning.
    pub current_well: Option<&'r CurrentWell>,
}

/// Movement queries used by the movement handler.
pub trait MotionPlanning {
    fn get_pipette_location(
        &self,
        pipette_id: &str,
        current_well: Option<&CurrentWell>,
    ) -> EngineResult<PipetteLocationData>;

    /// Fails if the labware or the well does not exist.
    fn validate_destination(&self, labware_id: &str, well_name: &str) -> EngineResult<()>;

    fn get_movement_waypoints(&self, request: &MovementRequest<'_>) -> EngineResult<Vec<Waypoint>>;
}

#[derive(Debug, Clone, Copy)]
pub struct MotionView<'a> {
    labware: LabwareView<'a>,
    pipettes: PipetteView<'a>,
    geometry: GeometryView<'a>,
}

impl<'a> MotionView<'a> {
    pub(super) fn new(
        labware: LabwareView<'a>,
        pipettes: PipetteView<'a>,
        geometry: GeometryView<'a>,
    ) -> Self {
        Self {
            labware,
            pipettes,
            geometry,
        }
    }

    fn effective_current_well<'w>(
        &self,
        current_well: Option<&'w CurrentWell>,
    ) -> Option<&'w CurrentWell>
    where
        'a: 'w,
    {
        current_well.or_else(|| self.pipettes.get_current_well())
    }
}

impl MotionPlanning for MotionView<'_> {
    fn get_pipette_location(
        &self,
        pipette_id: &str,
        current_well: Option<&CurrentWell>,
    ) -> EngineResult<PipetteLocationData> {
        let pipette = self.pipettes.get(pipette_id)?;

        let critical_point = match self.effective_current_well(current_well) {
            Some(location)
                if location.pipette_id == pipette_id
                    && self
                        .labware
                        .get_has_quirk(&location.labware_id, CENTER_MULTICHANNEL_ON_WELLS)? =>
            {
                Some(CriticalPoint::XyCenter)
            }
            _ => None,
        };

        Ok(PipetteLocationData {
            mount: pipette.mount,
            critical_point,
        })
    }

    fn validate_destination(&self, labware_id: &str, well_name: &str) -> EngineResult<()> {
        self.labware.get_well_definition(labware_id, well_name)?;
        Ok(())
    }

    fn get_movement_waypoints(&self, request: &MovementRequest<'_>) -> EngineResult<Vec<Waypoint>> {
        let center_dest = self
            .labware
            .get_has_quirk(request.labware_id, CENTER_MULTICHANNEL_ON_WELLS)?;
        let dest = self.geometry.get_well_position(
            request.labware_id,
            request.well_name,
            request.well_location,
        )?;
        let dest_cp = center_dest.then_some(CriticalPoint::XyCenter);

        let (move_type, min_travel_z) = match self.effective_current_well(request.current_well) {
            Some(location)
                if location.pipette_id == request.pipette_id
                    && location.labware_id == request.labware_id =>
            {
                let move_type = if location.well_name == request.well_name {
                    MoveType::Direct
                } else {
                    MoveType::InLabwareArc
                };
                (move_type, self.geometry.get_labware_highest_z(request.labware_id)?)
            }
            _ => (MoveType::GeneralArc, self.geometry.get_all_labware_highest_z()?),
        };

        get_waypoints(WaypointRequest {
            origin: request.origin,
            origin_cp: request.origin_cp,
            dest,
            dest_cp,
            min_travel_z,
            max_travel_z: request.max_travel_z,
            move_type,
        })
        .map_err(|err| EngineError::FailedToPlanMove(err.to_string()))
    }
}
