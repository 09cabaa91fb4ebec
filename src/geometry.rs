//! Geometric helpers for 3D collision detection and space planning.
//!
//! Every test takes the run's epsilon so the candidate generator and the
//! validators agree on what "touching" and "overlapping" mean.

use crate::model::PlacedItem;
use crate::types::{BoundingBox, Vec3};

/// Checks whether a candidate box collides with any placed item.
///
/// Boxes that only touch on a face, edge or corner do not collide.
///
/// # Parameters
/// * `candidate` - Box of the prospective placement
/// * `placed` - Committed items
/// * `epsilon` - Numerical tolerance
///
/// # Returns
/// `true` if some item overlaps the candidate by more than `epsilon` on every axis
pub fn collides_with_any(candidate: &BoundingBox, placed: &[PlacedItem], epsilon: f64) -> bool {
    placed
        .iter()
        .any(|p| candidate.intersects(&p.bounding_box(), epsilon))
}

/// Checks whether a candidate box lies inside the vehicle envelope.
pub fn fits_in_vehicle(candidate: &BoundingBox, vehicle_dims: &Vec3, epsilon: f64) -> bool {
    candidate.is_within(vehicle_dims, epsilon)
}

/// Area of the XY overlap between a candidate and a placed item.
pub fn footprint_overlap(candidate: &BoundingBox, placed: &PlacedItem) -> f64 {
    candidate.overlap_area_xy(&placed.bounding_box())
}

/// Checks whether a point lies in occupied space (half-open containment).
///
/// Points on the minimum faces of an item count as occupied, points on its
/// maximum faces do not.
pub fn point_occupied(point: &Vec3, placed: &[PlacedItem], epsilon: f64) -> bool {
    placed
        .iter()
        .any(|p| p.bounding_box().contains_point_half_open(point, epsilon))
}

/// Checks whether a point lies outside the usable vehicle space.
///
/// A coordinate equal to the vehicle dimension leaves no room for any item.
pub fn point_outside_vehicle(point: &Vec3, vehicle_dims: &Vec3, epsilon: f64) -> bool {
    point.x < -epsilon
        || point.y < -epsilon
        || point.z < -epsilon
        || point.x >= vehicle_dims.x - epsilon
        || point.y >= vehicle_dims.y - epsilon
        || point.z >= vehicle_dims.z - epsilon
}

/// Indices of placed items whose top face carries a box at `base_z`.
///
/// # Parameters
/// * `candidate` - Bounding box of the proposed placement
/// * `placed` - Already committed items
/// * `epsilon` - Numerical tolerance for the height match and the footprint
pub fn direct_supporters(candidate: &BoundingBox, placed: &[PlacedItem], epsilon: f64) -> Vec<usize> {
    let base_z = candidate.min.z;
    placed
        .iter()
        .enumerate()
        .filter(|(_, p)| (p.top_z() - base_z).abs() <= epsilon)
        .filter(|(_, p)| candidate.footprints_overlap(&p.bounding_box(), epsilon))
        .map(|(idx, _)| idx)
        .collect()
}
