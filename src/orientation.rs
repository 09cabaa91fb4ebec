//! Enumeration of the legal axis-aligned orientations of an item.

use crate::model::{Item, RotationPermission, Stackability};
use crate::types::Vec3;

/// Oriented dimensions for the given rotation permission.
///
/// The order is fixed so placement search stays reproducible:
/// `(l,w,h) (w,l,h) (l,h,w) (h,l,w) (w,h,l) (h,w,l)`. Permutations that equal
/// an earlier one within `epsilon` are dropped, so a cube yields one entry.
///
/// # Examples
/// ```
/// use load_planner::model::RotationPermission;
/// use load_planner::orientation::orientations;
/// use load_planner::types::Vec3;
///
/// let cube = orientations(Vec3::new(5.0, 5.0, 5.0), RotationPermission::Any, 1e-6);
/// assert_eq!(cube.len(), 1);
/// ```
pub fn orientations(dims: Vec3, permission: RotationPermission, epsilon: f64) -> Vec<Vec3> {
    let Vec3 { x: l, y: w, z: h } = dims;
    let all = [
        Vec3::new(l, w, h),
        Vec3::new(w, l, h),
        Vec3::new(l, h, w),
        Vec3::new(h, l, w),
        Vec3::new(w, h, l),
        Vec3::new(h, w, l),
    ];
    let allowed: &[Vec3] = match permission {
        RotationPermission::Fixed => &all[..1],
        RotationPermission::Upright => &all[..2],
        RotationPermission::Any => &all[..],
    };

    let mut unique: Vec<Vec3> = Vec::with_capacity(allowed.len());
    for candidate in allowed {
        if !unique.iter().any(|seen| seen.approx_eq(candidate, epsilon)) {
            unique.push(*candidate);
        }
    }
    unique
}

/// Orientations an item may use in a run.
///
/// # Parameters
/// * `item` - The item to orient
/// * `rotation_enabled` - Global rotation switch of the configuration
/// * `lay_flat_unstackable` - Keep unstackable items on their lowest side
/// * `epsilon` - Numerical tolerance
pub fn item_orientations(
    item: &Item,
    rotation_enabled: bool,
    lay_flat_unstackable: bool,
    epsilon: f64,
) -> Vec<Vec3> {
    let permission = item.effective_rotation(rotation_enabled);
    let mut result = orientations(item.dims, permission, epsilon);

    if lay_flat_unstackable && item.stackability == Stackability::Unstackable {
        let lowest = item.dims.min_component();
        let flat: Vec<Vec3> = result
            .iter()
            .copied()
            .filter(|o| (o.z - lowest).abs() <= epsilon)
            .collect();
        // Fixed or upright items may have no flat orientation; they keep theirs.
        if !flat.is_empty() {
            result = flat;
        }
    }
    result
}
