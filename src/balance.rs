//! Weight tracking for the vehicle, the stack columns and the load centroid.
//!
//! A stack column is the lineage below an item: its direct supporters and,
//! transitively, everything they rest on. Siblings sharing a base are not
//! part of each other's column.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::config::AlgorithmConfig;
use crate::model::Vehicle;
use crate::types::{CenterOfMassCalculator, Vec3};

/// Hard weight violation of a candidate.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BalanceRejection {
    #[error("vehicle load {total:.1} would exceed the limit of {limit:.1}")]
    VehicleOverweight { total: f64, limit: f64 },
    #[error("stack column weight {weight:.1} would exceed the limit of {limit:.1}")]
    ColumnOverweight { weight: f64, limit: f64 },
}

/// Weight situation after a hypothetical placement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalanceCheck {
    /// Centroid of all placed weight including the candidate.
    pub centroid: Vec3,
    /// `|cy - W/2| / (W/2)`, 0 on the center line, 1 at a side wall.
    pub lateral_ratio: f64,
    /// Whether the lateral ratio stays within the configured tolerance.
    pub within_tolerance: bool,
    /// Weight of the candidate plus its lineage below.
    pub column_weight: f64,
}

/// Tracks placed weight for one packing run.
#[derive(Clone, Debug)]
pub struct WeightBalancer {
    vehicle_width: f64,
    max_total: f64,
    max_per_column: f64,
    tolerance: f64,
    epsilon: f64,
    total: f64,
    /// Weight of every committed placement.
    weights: Vec<f64>,
    /// Direct supporters of every committed placement.
    below: Vec<Vec<usize>>,
    centroid: CenterOfMassCalculator,
}

impl WeightBalancer {
    pub fn new(vehicle: &Vehicle, config: &AlgorithmConfig) -> Self {
        Self {
            vehicle_width: vehicle.dims.y,
            max_total: vehicle.max_weight,
            max_per_column: config.max_weight_per_stack,
            tolerance: config.balance_tolerance_ratio,
            epsilon: config.epsilon,
            total: 0.0,
            weights: Vec::new(),
            below: Vec::new(),
            centroid: CenterOfMassCalculator::new(),
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.total
    }

    /// Whether an item of `weight` could still be loaded at all.
    pub fn can_carry(&self, weight: f64) -> bool {
        self.total + weight <= self.max_total + self.epsilon
    }

    pub fn centroid(&self) -> Option<Vec3> {
        self.centroid.compute()
    }

    /// Lateral offset ratio of the current load (0 when empty).
    pub fn lateral_ratio(&self) -> f64 {
        self.centroid
            .compute()
            .map(|c| self.lateral_ratio_of(c))
            .unwrap_or(0.0)
    }

    fn lateral_ratio_of(&self, centroid: Vec3) -> f64 {
        let half = self.vehicle_width / 2.0;
        if half <= 0.0 {
            return 0.0;
        }
        ((centroid.y - half).abs() / half).min(1.0)
    }

    /// Placements transitively below `supporters`, each counted once.
    fn lineage(&self, supporters: &[usize]) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<usize> = supporters
            .iter()
            .copied()
            .filter(|&idx| idx < self.weights.len())
            .collect();
        while let Some(idx) = pending.pop() {
            if seen.insert(idx) {
                pending.extend(self.below[idx].iter().copied());
            }
        }
        seen
    }

    /// Weight of a new item plus everything below it.
    pub fn column_weight_with(&self, supporters: &[usize], weight: f64) -> f64 {
        weight
            + self
                .lineage(supporters)
                .iter()
                .map(|&idx| self.weights[idx])
                .sum::<f64>()
    }

    /// Checks a candidate against the hard limits and measures its balance impact.
    ///
    /// # Parameters
    /// * `center` - Geometric center of the candidate placement
    /// * `weight` - Item weight
    /// * `supporters` - Direct supporters of the candidate
    pub fn evaluate(
        &self,
        center: Vec3,
        weight: f64,
        supporters: &[usize],
    ) -> Result<BalanceCheck, BalanceRejection> {
        if !self.can_carry(weight) {
            return Err(BalanceRejection::VehicleOverweight {
                total: self.total + weight,
                limit: self.max_total,
            });
        }

        let column_weight = self.column_weight_with(supporters, weight);
        if column_weight > self.max_per_column + self.epsilon {
            return Err(BalanceRejection::ColumnOverweight {
                weight: column_weight,
                limit: self.max_per_column,
            });
        }

        let centroid = self
            .centroid
            .with_point(center, weight)
            .compute()
            .unwrap_or(center);
        let lateral_ratio = self.lateral_ratio_of(centroid);

        Ok(BalanceCheck {
            centroid,
            lateral_ratio,
            within_tolerance: lateral_ratio <= self.tolerance + self.epsilon,
            column_weight,
        })
    }

    /// Records a committed placement; its index is the next placement index.
    pub fn commit(&mut self, center: Vec3, weight: f64, supporters: &[usize]) {
        self.weights.push(weight);
        self.below.push(supporters.to_vec());
        self.total += weight;
        self.centroid.add_point(center, weight);
    }
}
