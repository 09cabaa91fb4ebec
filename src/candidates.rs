//! Candidate anchor points ("collision points") for new placements.
//!
//! The set starts with the vehicle origin. Every committed item contributes
//! its three extreme corners and their projections onto the nearest surface,
//! and every point that ended up outside the vehicle or inside occupied space
//! is pruned. The size therefore grows with the number of placed items, never
//! with the vehicle volume.

use std::collections::{BTreeMap, BTreeSet};

use crate::geometry::{point_occupied, point_outside_vehicle};
use crate::model::PlacedItem;
use crate::types::Vec3;

/// What generated a candidate point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PointSource {
    /// Vehicle floor or walls.
    Wall,
    /// A placed item, by index into the placement list.
    Item(usize),
}

/// An anchor where the minimum corner of a new item may start.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidatePoint {
    pub position: Vec3,
    pub sources: BTreeSet<PointSource>,
}

/// Quantized key ordered by depth (x), then height (z), then width (y).
type PointKey = (i64, i64, i64);

/// Ordered, de-duplicated set of candidate points.
///
/// Iteration sweeps from the closed end towards the door, bottom to top
/// inside a slice, so rear slices fill before the load front advances.
#[derive(Clone, Debug)]
pub struct CandidatePoints {
    points: BTreeMap<PointKey, CandidatePoint>,
    vehicle_dims: Vec3,
    epsilon: f64,
}

impl CandidatePoints {
    /// Creates the set for an empty vehicle: just the origin.
    pub fn new(vehicle_dims: Vec3, epsilon: f64) -> Self {
        let mut set = Self {
            points: BTreeMap::new(),
            vehicle_dims,
            epsilon,
        };
        set.insert(Vec3::zero(), PointSource::Wall);
        set
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in deterministic search order.
    pub fn iter(&self) -> impl Iterator<Item = &CandidatePoint> {
        self.points.values()
    }

    /// Positions in deterministic search order.
    pub fn positions(&self) -> Vec<Vec3> {
        self.points.values().map(|p| p.position).collect()
    }

    fn key(&self, p: &Vec3) -> PointKey {
        let q = |v: f64| (v / self.epsilon).round() as i64;
        (q(p.x), q(p.z), q(p.y))
    }

    /// Adds a point; an existing point at the same spot gains the source.
    pub fn insert(&mut self, position: Vec3, source: PointSource) {
        let key = self.key(&position);
        self.points
            .entry(key)
            .or_insert_with(|| CandidatePoint {
                position,
                sources: BTreeSet::new(),
            })
            .sources
            .insert(source);
    }

    /// Updates the set after `placed[index]` was committed.
    ///
    /// # Parameters
    /// * `placed` - All committed items, the new one included
    /// * `index` - Index of the item just committed
    pub fn on_commit(&mut self, placed: &[PlacedItem], index: usize) {
        let Some(item) = placed.get(index) else {
            return;
        };
        let source = PointSource::Item(index);
        let Vec3 { x, y, z } = item.position;
        let Vec3 { x: l, y: w, z: h } = item.dims;

        let along_x = Vec3::new(x + l, y, z);
        self.insert(along_x, source);
        self.insert_projection(project_down(along_x, placed, self.epsilon));
        self.insert_projection(project_back_y(along_x, placed, self.epsilon));

        let along_y = Vec3::new(x, y + w, z);
        self.insert(along_y, source);
        self.insert_projection(project_down(along_y, placed, self.epsilon));
        self.insert_projection(project_back_x(along_y, placed, self.epsilon));

        // Nothing rests on semi-stackable or unstackable items.
        if item.item.stackability.carries_load() {
            let on_top = Vec3::new(x, y, z + h);
            self.insert(on_top, source);
            self.insert_projection(project_back_x(on_top, placed, self.epsilon));
            self.insert_projection(project_back_y(on_top, placed, self.epsilon));
        }

        self.prune(placed);
    }

    fn insert_projection(&mut self, projected: (Vec3, PointSource)) {
        self.insert(projected.0, projected.1);
    }

    /// Drops points outside the vehicle or inside occupied space.
    pub fn prune(&mut self, placed: &[PlacedItem]) {
        let dims = self.vehicle_dims;
        let eps = self.epsilon;
        self.points.retain(|_, p| {
            !point_outside_vehicle(&p.position, &dims, eps)
                && !point_occupied(&p.position, placed, eps)
        });
    }
}

fn within_half_open(value: f64, min: f64, max: f64, eps: f64) -> bool {
    value >= min - eps && value < max - eps
}

/// Drops a point onto the highest surface below it (floor if none).
fn project_down(p: Vec3, placed: &[PlacedItem], eps: f64) -> (Vec3, PointSource) {
    let mut best = (0.0, PointSource::Wall);
    for (idx, other) in placed.iter().enumerate() {
        let bb = other.bounding_box();
        let top = bb.max.z;
        if top <= p.z + eps
            && top > best.0 + eps
            && within_half_open(p.x, bb.min.x, bb.max.x, eps)
            && within_half_open(p.y, bb.min.y, bb.max.y, eps)
        {
            best = (top, PointSource::Item(idx));
        }
    }
    (Vec3::new(p.x, p.y, best.0), best.1)
}

/// Slides a point towards `y = 0` until it meets an item or the wall.
fn project_back_y(p: Vec3, placed: &[PlacedItem], eps: f64) -> (Vec3, PointSource) {
    let mut best = (0.0, PointSource::Wall);
    for (idx, other) in placed.iter().enumerate() {
        let bb = other.bounding_box();
        let face = bb.max.y;
        if face <= p.y + eps
            && face > best.0 + eps
            && within_half_open(p.x, bb.min.x, bb.max.x, eps)
            && within_half_open(p.z, bb.min.z, bb.max.z, eps)
        {
            best = (face, PointSource::Item(idx));
        }
    }
    (Vec3::new(p.x, best.0, p.z), best.1)
}

/// Slides a point towards the closed end (`x = 0`).
fn project_back_x(p: Vec3, placed: &[PlacedItem], eps: f64) -> (Vec3, PointSource) {
    let mut best = (0.0, PointSource::Wall);
    for (idx, other) in placed.iter().enumerate() {
        let bb = other.bounding_box();
        let face = bb.max.x;
        if face <= p.x + eps
            && face > best.0 + eps
            && within_half_open(p.y, bb.min.y, bb.max.y, eps)
            && within_half_open(p.z, bb.min.z, bb.max.z, eps)
        {
            best = (face, PointSource::Item(idx));
        }
    }
    (Vec3::new(best.0, p.y, p.z), best.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Item, Stackability};

    const EPS: f64 = 1e-6;

    fn placed(pos: (f64, f64, f64), dims: (f64, f64, f64), stack: Stackability) -> PlacedItem {
        let item = Item::unchecked("p", dims.into(), 1.0).with_stackability(stack);
        PlacedItem::new(item, dims.into(), pos.into())
    }

    #[test]
    fn starts_with_origin() {
        let set = CandidatePoints::new(Vec3::new(10.0, 10.0, 10.0), EPS);
        assert_eq!(set.positions(), vec![Vec3::zero()]);
        let origin = set.iter().next().unwrap();
        assert!(origin.sources.contains(&PointSource::Wall));
    }

    #[test]
    fn commit_adds_three_corners_and_prunes_anchor() {
        let mut set = CandidatePoints::new(Vec3::new(10.0, 10.0, 10.0), EPS);
        let items = vec![placed((0.0, 0.0, 0.0), (2.0, 3.0, 4.0), Stackability::Stackable)];
        set.on_commit(&items, 0);

        assert_eq!(
            set.positions(),
            vec![
                Vec3::new(0.0, 3.0, 0.0),
                Vec3::new(0.0, 0.0, 4.0),
                Vec3::new(2.0, 0.0, 0.0),
            ]
        );
    }

    #[test]
    fn no_top_point_for_items_that_carry_nothing() {
        let mut set = CandidatePoints::new(Vec3::new(10.0, 10.0, 10.0), EPS);
        let items = vec![placed((0.0, 0.0, 0.0), (2.0, 3.0, 4.0), Stackability::SemiStackable)];
        set.on_commit(&items, 0);

        assert!(set.iter().all(|p| p.position.z == 0.0));
        assert_eq!(set.len(), 2);
    }

    fn commit_all(set: &mut CandidatePoints, items: &[PlacedItem]) {
        for idx in 0..items.len() {
            set.on_commit(&items[..=idx], idx);
        }
    }

    #[test]
    fn overhanging_corner_drops_to_the_floor() {
        let mut set = CandidatePoints::new(Vec3::new(10.0, 10.0, 10.0), EPS);
        let items = vec![
            placed((0.0, 0.0, 0.0), (4.0, 4.0, 2.0), Stackability::Stackable),
            placed((0.0, 0.0, 2.0), (6.0, 2.0, 2.0), Stackability::Stackable),
        ];
        commit_all(&mut set, &items);

        let positions = set.positions();
        assert!(positions.contains(&Vec3::new(6.0, 0.0, 2.0)));
        assert!(positions.contains(&Vec3::new(6.0, 0.0, 0.0)));
        assert!(positions.contains(&Vec3::new(0.0, 2.0, 2.0)));
        // The old top anchor is now inside the upper item.
        assert!(!positions.contains(&Vec3::new(0.0, 0.0, 2.0)));
    }

    #[test]
    fn top_corner_slides_back_to_the_nearest_face() {
        let mut set = CandidatePoints::new(Vec3::new(10.0, 10.0, 10.0), EPS);
        let items = vec![
            placed((0.0, 0.0, 0.0), (2.0, 4.0, 4.0), Stackability::Stackable),
            placed((5.0, 0.0, 0.0), (1.0, 1.0, 1.0), Stackability::Stackable),
        ];
        commit_all(&mut set, &items);

        let slid = set
            .iter()
            .find(|p| p.position == Vec3::new(2.0, 0.0, 1.0))
            .unwrap();
        assert!(slid.sources.contains(&PointSource::Item(0)));
    }

    #[test]
    fn projection_merges_sources() {
        let mut set = CandidatePoints::new(Vec3::new(10.0, 10.0, 10.0), EPS);
        let items = vec![
            placed((0.0, 0.0, 0.0), (5.0, 5.0, 2.0), Stackability::Stackable),
            placed((0.0, 0.0, 2.0), (1.0, 1.0, 1.0), Stackability::Stackable),
        ];
        commit_all(&mut set, &items);

        let corner = set
            .iter()
            .find(|p| p.position == Vec3::new(1.0, 0.0, 2.0))
            .unwrap();
        assert!(corner.sources.contains(&PointSource::Item(1)));
        assert!(corner.sources.contains(&PointSource::Item(0)));
    }

    #[test]
    fn ordering_is_depth_then_height_then_width() {
        let mut set = CandidatePoints::new(Vec3::new(10.0, 10.0, 10.0), EPS);
        set.insert(Vec3::new(1.0, 0.0, 0.0), PointSource::Wall);
        set.insert(Vec3::new(0.0, 5.0, 0.0), PointSource::Wall);
        set.insert(Vec3::new(0.0, 0.0, 5.0), PointSource::Wall);

        assert_eq!(
            set.positions(),
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 5.0, 0.0),
                Vec3::new(0.0, 0.0, 5.0),
                Vec3::new(1.0, 0.0, 0.0),
            ]
        );
    }

    #[test]
    fn duplicate_points_merge_sources() {
        let mut set = CandidatePoints::new(Vec3::new(10.0, 10.0, 10.0), EPS);
        set.insert(Vec3::zero(), PointSource::Item(3));
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().sources.len(), 2);
    }

    #[test]
    fn points_on_far_walls_are_pruned() {
        let mut set = CandidatePoints::new(Vec3::new(2.0, 3.0, 4.0), EPS);
        let items = vec![placed((0.0, 0.0, 0.0), (2.0, 3.0, 4.0), Stackability::Stackable)];
        set.on_commit(&items, 0);
        assert!(set.is_empty());
    }
}
