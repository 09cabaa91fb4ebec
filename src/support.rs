//! Support and stacking validation for candidate placements.
//!
//! A candidate is physically acceptable when enough of its base rests on the
//! floor or on top faces at exactly its base height, when nothing it rests on
//! refuses load, and when the stack it joins stays within the configured
//! height and weight limits.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::config::AlgorithmConfig;
use crate::geometry::{direct_supporters, footprint_overlap};
use crate::model::{Item, PlacedItem};
use crate::types::BoundingBox;

/// Per-placement stacking data kept alongside the placed items.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackInfo {
    /// Layer within the stack, 1 on the floor.
    pub level: u32,
    /// Position of the item's stop in unloading order (0 unloads first).
    pub unload_rank: usize,
    /// Indices of the items this one rests on.
    pub supporters: Vec<usize>,
}

/// Why a candidate failed the support rules.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SupportRejection {
    #[error("only {fraction:.3} of the base is supported, {required:.3} required")]
    InsufficientSupport { fraction: f64, required: f64 },
    #[error("unstackable items must stand on the floor")]
    NotOnFloor,
    #[error("item {index} below does not accept load")]
    SupporterRefusesLoad { index: usize },
    #[error("stack level {level} exceeds the limit of {limit}")]
    StackTooHigh { level: u32, limit: u32 },
    #[error("stack weight {weight:.1} exceeds the limit of {limit:.1}")]
    StackTooHeavy { weight: f64, limit: f64 },
    #[error("item {index} below is unloaded earlier")]
    UnloadOrder { index: usize },
    #[error("placement would slide under item {index}")]
    TucksUnder { index: usize },
}

/// Accepted support situation of a candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct SupportCheck {
    /// Supported share of the base area in `[0, 1]`.
    pub fraction: f64,
    /// Stack level the item would occupy.
    pub level: u32,
    /// Direct supporters (indices into the placement list).
    pub supporters: Vec<usize>,
    /// Weight of the transitive chain below plus the candidate.
    pub chain_weight: f64,
}

/// Support and stacking limits of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SupportRules {
    pub required_fraction: f64,
    pub max_stack_height: u32,
    pub max_weight_per_stack: f64,
    pub enforce_unload_order: bool,
    pub epsilon: f64,
}

impl SupportRules {
    pub fn from_config(config: &AlgorithmConfig) -> Self {
        Self {
            required_fraction: config.support_percentage / 100.0,
            max_stack_height: config.max_stack_height,
            max_weight_per_stack: config.max_weight_per_stack,
            enforce_unload_order: config.enforce_unload_order,
            epsilon: config.epsilon,
        }
    }

    /// Validates one candidate placement.
    ///
    /// # Parameters
    /// * `candidate` - Bounding box of the oriented item at the anchor
    /// * `item` - The item to place
    /// * `unload_rank` - Unload rank of the item's stop
    /// * `placed` - Committed items
    /// * `stacks` - Stacking data, parallel to `placed`
    ///
    /// # Returns
    /// The support situation, or the first rule the candidate breaks
    pub fn evaluate(
        &self,
        candidate: &BoundingBox,
        item: &Item,
        unload_rank: usize,
        placed: &[PlacedItem],
        stacks: &[StackInfo],
    ) -> Result<SupportCheck, SupportRejection> {
        let eps = self.epsilon;

        if let Some(index) = self.item_above(candidate, placed) {
            return Err(SupportRejection::TucksUnder { index });
        }

        let on_floor = candidate.min.z <= eps;
        if !on_floor && item.stackability.requires_floor() {
            return Err(SupportRejection::NotOnFloor);
        }

        let supporters = if on_floor {
            Vec::new()
        } else {
            direct_supporters(candidate, placed, eps)
        };

        let fraction = if on_floor {
            1.0
        } else {
            support_fraction(candidate, placed, &supporters)
        };
        if fraction + eps < self.required_fraction {
            return Err(SupportRejection::InsufficientSupport {
                fraction,
                required: self.required_fraction,
            });
        }

        if let Some(&index) = supporters
            .iter()
            .find(|&&idx| !placed[idx].item.stackability.carries_load())
        {
            return Err(SupportRejection::SupporterRefusesLoad { index });
        }

        let level = 1 + supporters
            .iter()
            .filter_map(|&idx| stacks.get(idx))
            .map(|s| s.level)
            .max()
            .unwrap_or(0);
        if level > self.max_stack_height {
            return Err(SupportRejection::StackTooHigh {
                level,
                limit: self.max_stack_height,
            });
        }

        let chain_weight = item.weight
            + chain_below(&supporters, stacks)
                .iter()
                .map(|&idx| placed[idx].item.weight)
                .sum::<f64>();
        if chain_weight > self.max_weight_per_stack + eps {
            return Err(SupportRejection::StackTooHeavy {
                weight: chain_weight,
                limit: self.max_weight_per_stack,
            });
        }

        if self.enforce_unload_order {
            if let Some(index) = self.earlier_stop_below(candidate, unload_rank, placed, stacks) {
                return Err(SupportRejection::UnloadOrder { index });
            }
        }

        Ok(SupportCheck {
            fraction,
            level,
            supporters,
            chain_weight,
        })
    }

    /// First placed item lying above the candidate's footprint.
    fn item_above(&self, candidate: &BoundingBox, placed: &[PlacedItem]) -> Option<usize> {
        placed.iter().position(|p| {
            let bb = p.bounding_box();
            bb.min.z >= candidate.max.z - self.epsilon
                && candidate.footprints_overlap(&bb, self.epsilon)
        })
    }

    /// First item below the candidate whose stop is unloaded before the candidate's.
    fn earlier_stop_below(
        &self,
        candidate: &BoundingBox,
        unload_rank: usize,
        placed: &[PlacedItem],
        stacks: &[StackInfo],
    ) -> Option<usize> {
        placed.iter().enumerate().find_map(|(idx, p)| {
            let bb = p.bounding_box();
            let below = bb.max.z <= candidate.min.z + self.epsilon
                && candidate.footprints_overlap(&bb, self.epsilon);
            let earlier = stacks
                .get(idx)
                .is_some_and(|s| s.unload_rank < unload_rank);
            (below && earlier).then_some(idx)
        })
    }
}

/// Supported share of the candidate's base.
pub fn support_fraction(candidate: &BoundingBox, placed: &[PlacedItem], supporters: &[usize]) -> f64 {
    let base_area = (candidate.max.x - candidate.min.x) * (candidate.max.y - candidate.min.y);
    if base_area <= 0.0 {
        return 0.0;
    }
    let supported: f64 = supporters
        .iter()
        .map(|&idx| footprint_overlap(candidate, &placed[idx]))
        .sum();
    (supported / base_area).min(1.0)
}

/// All items transitively below the given supporters, each counted once.
pub fn chain_below(supporters: &[usize], stacks: &[StackInfo]) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<usize> = supporters.to_vec();
    while let Some(idx) = pending.pop() {
        if seen.insert(idx) {
            if let Some(info) = stacks.get(idx) {
                pending.extend(info.supporters.iter().copied());
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stackability;
    use crate::types::Vec3;

    fn rules() -> SupportRules {
        SupportRules {
            required_fraction: 1.0,
            max_stack_height: 3,
            max_weight_per_stack: 1000.0,
            enforce_unload_order: true,
            epsilon: 1e-6,
        }
    }

    fn item(weight: f64) -> Item {
        Item::unchecked("c", Vec3::new(10.0, 10.0, 10.0), weight)
    }

    fn bbox(pos: (f64, f64, f64), dims: (f64, f64, f64)) -> BoundingBox {
        BoundingBox::from_position_and_dims(pos.into(), dims.into())
    }

    fn place(
        placed: &mut Vec<PlacedItem>,
        stacks: &mut Vec<StackInfo>,
        item: Item,
        pos: (f64, f64, f64),
        rank: usize,
    ) {
        let dims = item.dims;
        let candidate = BoundingBox::from_position_and_dims(pos.into(), dims);
        let supporters = if pos.2 > 0.0 {
            direct_supporters(&candidate, placed, 1e-6)
        } else {
            Vec::new()
        };
        let level = 1 + supporters.iter().map(|&i| stacks[i].level).max().unwrap_or(0);
        placed.push(PlacedItem::new(item, dims, pos.into()));
        stacks.push(StackInfo {
            level,
            unload_rank: rank,
            supporters,
        });
    }

    #[test]
    fn floor_placement_is_fully_supported() {
        let check = rules()
            .evaluate(&bbox((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)), &item(5.0), 0, &[], &[])
            .unwrap();
        assert_eq!(check.fraction, 1.0);
        assert_eq!(check.level, 1);
        assert!(check.supporters.is_empty());
    }

    #[test]
    fn wide_item_on_narrow_item_is_rejected() {
        let (mut placed, mut stacks) = (Vec::new(), Vec::new());
        let narrow = Item::unchecked("n", Vec3::new(5.0, 10.0, 10.0), 5.0);
        place(&mut placed, &mut stacks, narrow, (0.0, 0.0, 0.0), 0);

        let result = rules().evaluate(
            &bbox((0.0, 0.0, 10.0), (10.0, 10.0, 10.0)),
            &item(5.0),
            0,
            &placed,
            &stacks,
        );
        assert!(matches!(
            result,
            Err(SupportRejection::InsufficientSupport { .. })
        ));

        let relaxed = SupportRules {
            required_fraction: 0.5,
            ..rules()
        };
        let check = relaxed
            .evaluate(
                &bbox((0.0, 0.0, 10.0), (10.0, 10.0, 10.0)),
                &item(5.0),
                0,
                &placed,
                &stacks,
            )
            .unwrap();
        assert!((check.fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn nothing_rests_on_semi_or_unstackable_items() {
        for stackability in [Stackability::SemiStackable, Stackability::Unstackable] {
            let (mut placed, mut stacks) = (Vec::new(), Vec::new());
            place(
                &mut placed,
                &mut stacks,
                item(50.0).with_stackability(stackability),
                (0.0, 0.0, 0.0),
                0,
            );
            let result = rules().evaluate(
                &bbox((0.0, 0.0, 10.0), (10.0, 10.0, 10.0)),
                &item(5.0),
                0,
                &placed,
                &stacks,
            );
            assert_eq!(result, Err(SupportRejection::SupporterRefusesLoad { index: 0 }));
        }
    }

    #[test]
    fn unstackable_items_need_the_floor() {
        let (mut placed, mut stacks) = (Vec::new(), Vec::new());
        place(&mut placed, &mut stacks, item(50.0), (0.0, 0.0, 0.0), 0);
        let result = rules().evaluate(
            &bbox((0.0, 0.0, 10.0), (10.0, 10.0, 10.0)),
            &item(5.0).with_stackability(Stackability::Unstackable),
            0,
            &placed,
            &stacks,
        );
        assert_eq!(result, Err(SupportRejection::NotOnFloor));
    }

    #[test]
    fn stack_height_is_limited() {
        let (mut placed, mut stacks) = (Vec::new(), Vec::new());
        for level in 0..3 {
            place(
                &mut placed,
                &mut stacks,
                item(10.0),
                (0.0, 0.0, level as f64 * 10.0),
                0,
            );
        }
        assert_eq!(stacks[2].level, 3);

        let result = rules().evaluate(
            &bbox((0.0, 0.0, 30.0), (10.0, 10.0, 10.0)),
            &item(5.0),
            0,
            &placed,
            &stacks,
        );
        assert_eq!(result, Err(SupportRejection::StackTooHigh { level: 4, limit: 3 }));
    }

    #[test]
    fn chain_weight_includes_everything_below() {
        let (mut placed, mut stacks) = (Vec::new(), Vec::new());
        place(&mut placed, &mut stacks, item(600.0), (0.0, 0.0, 0.0), 0);
        place(&mut placed, &mut stacks, item(300.0), (0.0, 0.0, 10.0), 0);

        let ok = rules()
            .evaluate(
                &bbox((0.0, 0.0, 20.0), (10.0, 10.0, 10.0)),
                &item(100.0),
                0,
                &placed,
                &stacks,
            )
            .unwrap();
        assert!((ok.chain_weight - 1000.0).abs() < 1e-9);

        let heavy = rules().evaluate(
            &bbox((0.0, 0.0, 20.0), (10.0, 10.0, 10.0)),
            &item(101.0),
            0,
            &placed,
            &stacks,
        );
        assert!(matches!(heavy, Err(SupportRejection::StackTooHeavy { .. })));
    }

    #[test]
    fn earlier_stop_may_not_sit_below_later_stop() {
        let (mut placed, mut stacks) = (Vec::new(), Vec::new());
        // Item below is unloaded first (rank 0).
        place(&mut placed, &mut stacks, item(50.0), (0.0, 0.0, 0.0), 0);

        let blocked = rules().evaluate(
            &bbox((0.0, 0.0, 10.0), (10.0, 10.0, 10.0)),
            &item(5.0),
            1,
            &placed,
            &stacks,
        );
        assert_eq!(blocked, Err(SupportRejection::UnloadOrder { index: 0 }));

        let relaxed = SupportRules {
            enforce_unload_order: false,
            ..rules()
        };
        assert!(
            relaxed
                .evaluate(
                    &bbox((0.0, 0.0, 10.0), (10.0, 10.0, 10.0)),
                    &item(5.0),
                    1,
                    &placed,
                    &stacks,
                )
                .is_ok()
        );
    }

    #[test]
    fn placements_below_existing_cargo_are_rejected() {
        let (mut placed, mut stacks) = (Vec::new(), Vec::new());
        place(&mut placed, &mut stacks, item(50.0), (0.0, 0.0, 20.0), 0);

        let result = rules().evaluate(
            &bbox((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)),
            &item(5.0),
            0,
            &placed,
            &stacks,
        );
        assert_eq!(result, Err(SupportRejection::TucksUnder { index: 0 }));
    }

    #[test]
    fn chain_below_follows_all_supporters_once() {
        let stacks = vec![
            StackInfo::default(),
            StackInfo::default(),
            StackInfo {
                level: 2,
                unload_rank: 0,
                supporters: vec![0, 1],
            },
        ];
        let chain = chain_below(&[2, 0], &stacks);
        assert_eq!(chain.into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
