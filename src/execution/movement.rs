//! Moving a pipette to a well.

use crate::error::EngineResult;
use crate::hardware::HardwareApi;
use crate::state::{MotionPlanning, MovementRequest};
use crate::types::{CurrentWell, WellLocation};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct MovementHandler {
    hardware: Arc<dyn HardwareApi>,
}

impl MovementHandler {
    pub fn new(hardware: Arc<dyn HardwareApi>) -> Self {
        Self { hardware }
    }

    /// Plan from the live gantry position and issue one `move_to` per
    /// waypoint, in order. Unknown ids fail before the hardware is queried.
    ///
    /// `current_well` overrides the stored location when planning, for
    /// callers that have just moved the pipette themselves.
    pub async fn move_to_well<M>(
        &self,
        motion: &M,
        pipette_id: &str,
        labware_id: &str,
        well_name: &str,
        well_location: &WellLocation,
        current_well: Option<&CurrentWell>,
    ) -> EngineResult<()>
    where
        M: MotionPlanning + Sync + ?Sized,
    {
        let location = motion.get_pipette_location(pipette_id, current_well)?;
        motion.validate_destination(labware_id, well_name)?;
        let origin = self
            .hardware
            .gantry_position(location.mount, location.critical_point)
            .await?;
        let max_travel_z = self
            .hardware
            .get_instrument_max_height(location.mount)
            .await?;

        let waypoints = motion.get_movement_waypoints(&MovementRequest {
            pipette_id,
            labware_id,
            well_name,
            well_location,
            origin,
            origin_cp: location.critical_point,
            max_travel_z,
            current_well,
        })?;
        debug!(pipette_id, labware_id, well_name, waypoints = waypoints.len(), "Moving to well");

        for waypoint in waypoints {
            self.hardware
                .move_to(location.mount, waypoint.position, waypoint.critical_point)
                .await?;
        }
        Ok(())
    }
}
