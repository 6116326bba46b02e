//! Arc motion planning.
//!
//! Pure geometry: given an origin, a destination and height limits, produce
//! the ordered waypoints a pipette should travel through so it never drags
//! across labware.
//!
//! ```text
//!        travel_z  ┌────────────┐
//!                  │            │
//!          origin  ●            ● dest
//! ```

use crate::types::{CriticalPoint, Point, Waypoint};
use thiserror::Error;

/// Clearance above the tallest labware for moves between labware.
pub const GENERAL_ARC_Z_MARGIN: f64 = 10.0;
/// Clearance above the current labware for moves within it.
pub const IN_LABWARE_ARC_Z_MARGIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    /// Same well: go straight to the destination.
    Direct,
    /// Different well in the same labware: shallow arc.
    InLabwareArc,
    /// Anything else: arc over all labware on the deck.
    GeneralArc,
}

impl MoveType {
    fn z_margin(self) -> f64 {
        match self {
            MoveType::Direct => 0.0,
            MoveType::InLabwareArc => IN_LABWARE_ARC_Z_MARGIN,
            MoveType::GeneralArc => GENERAL_ARC_Z_MARGIN,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionPlanningError {
    #[error("Destination out of bounds in the Z-axis: {0}")]
    DestinationOutOfBounds(String),
}

/// Inputs for [`get_waypoints`].
#[derive(Debug, Clone, Copy)]
pub struct WaypointRequest {
    pub origin: Point,
    pub origin_cp: Option<CriticalPoint>,
    pub dest: Point,
    pub dest_cp: Option<CriticalPoint>,
    pub min_travel_z: f64,
    pub max_travel_z: f64,
    pub move_type: MoveType,
}

/// Plan the waypoints from `origin` to `dest`. The last waypoint is always
/// the destination itself.
pub fn get_waypoints(request: WaypointRequest) -> Result<Vec<Waypoint>, MotionPlanningError> {
    let WaypointRequest {
        origin,
        origin_cp,
        dest,
        dest_cp,
        min_travel_z,
        max_travel_z,
        move_type,
    } = request;

    if move_type == MoveType::Direct {
        return Ok(vec![Waypoint::new(dest, dest_cp)]);
    }

    if dest.z > max_travel_z || min_travel_z > max_travel_z {
        return Err(MotionPlanningError::DestinationOutOfBounds(format!(
            "dest z {:.2}, min travel z {:.2}, max travel z {:.2}",
            dest.z, min_travel_z, max_travel_z
        )));
    }

    let travel_z = (min_travel_z + move_type.z_margin())
        .max(origin.z)
        .max(dest.z)
        .min(max_travel_z);

    let mut waypoints = Vec::with_capacity(3);
    if travel_z > origin.z {
        waypoints.push(Waypoint::new(origin.with_z(travel_z), origin_cp));
    }
    if travel_z > dest.z {
        waypoints.push(Waypoint::new(dest.with_z(travel_z), dest_cp));
    }
    waypoints.push(Waypoint::new(dest, dest_cp));

    Ok(waypoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(move_type: MoveType, min_travel_z: f64, max_travel_z: f64) -> WaypointRequest {
        WaypointRequest {
            origin: Point::new(1.0, 2.0, 3.0),
            origin_cp: None,
            dest: Point::new(4.0, 5.0, 6.0),
            dest_cp: None,
            min_travel_z,
            max_travel_z,
            move_type,
        }
    }

    #[test]
    fn test_direct_move_is_single_waypoint() {
        let waypoints = get_waypoints(request(MoveType::Direct, 100.0, 50.0)).unwrap();
        assert_eq!(waypoints, vec![Waypoint::new(Point::new(4.0, 5.0, 6.0), None)]);
    }

    #[test]
    fn test_general_arc() {
        let waypoints = get_waypoints(request(MoveType::GeneralArc, 20.0, 100.0)).unwrap();
        assert_eq!(
            waypoints,
            vec![
                Waypoint::new(Point::new(1.0, 2.0, 30.0), None),
                Waypoint::new(Point::new(4.0, 5.0, 30.0), None),
                Waypoint::new(Point::new(4.0, 5.0, 6.0), None),
            ]
        );
    }

    #[test]
    fn test_in_labware_arc_uses_smaller_margin() {
        let waypoints = get_waypoints(request(MoveType::InLabwareArc, 20.0, 100.0)).unwrap();
        assert_eq!(waypoints[0].position.z, 25.0);
        assert_eq!(waypoints[1].position.z, 25.0);
    }

    #[test]
    fn test_travel_height_clamped_to_max() {
        let waypoints = get_waypoints(request(MoveType::GeneralArc, 20.0, 25.0)).unwrap();
        assert_eq!(waypoints[0].position.z, 25.0);
    }

    #[test]
    fn test_no_rise_when_origin_is_high() {
        let mut req = request(MoveType::GeneralArc, 0.0, 100.0);
        req.origin = Point::new(1.0, 2.0, 50.0);
        let waypoints = get_waypoints(req).unwrap();
        assert_eq!(
            waypoints,
            vec![
                Waypoint::new(Point::new(4.0, 5.0, 50.0), None),
                Waypoint::new(Point::new(4.0, 5.0, 6.0), None),
            ]
        );
    }

    #[test]
    fn test_critical_points_follow_their_end() {
        let mut req = request(MoveType::GeneralArc, 20.0, 100.0);
        req.origin_cp = Some(CriticalPoint::FrontNozzle);
        req.dest_cp = Some(CriticalPoint::XyCenter);
        let waypoints = get_waypoints(req).unwrap();
        assert_eq!(waypoints[0].critical_point, Some(CriticalPoint::FrontNozzle));
        assert_eq!(waypoints[1].critical_point, Some(CriticalPoint::XyCenter));
        assert_eq!(waypoints[2].critical_point, Some(CriticalPoint::XyCenter));
    }

    #[test]
    fn test_out_of_bounds() {
        assert!(get_waypoints(request(MoveType::GeneralArc, 20.0, 5.0)).is_err());
        assert!(get_waypoints(request(MoveType::GeneralArc, 60.0, 50.0)).is_err());
    }
}
