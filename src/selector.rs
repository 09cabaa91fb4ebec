//! Scoring of feasible (point, orientation) pairs and selection of the best one.

use crate::balance::BalanceCheck;
use crate::config::AlgorithmConfig;
use crate::support::SupportCheck;
use crate::types::Vec3;

/// Factor applied to the weight term when the centroid leaves the tolerance band.
pub const OUT_OF_TOLERANCE_PENALTY: f64 = 0.25;

/// Score model of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoringModel {
    pub volume_priority: f64,
    pub weight_priority: f64,
    pub vehicle_dims: Vec3,
}

impl ScoringModel {
    pub fn new(config: &AlgorithmConfig, vehicle_dims: Vec3) -> Self {
        Self {
            volume_priority: config.priority_volume_weight,
            weight_priority: config.priority_weight_weight,
            vehicle_dims,
        }
    }

    /// Density of the loaded prefix after the placement, in `(0, 1]`.
    ///
    /// The prefix reaches from the closed end to the load front, so a
    /// placement that leaves voids behind the front scores lower.
    ///
    /// # Parameters
    /// * `position` - Anchor of the candidate
    /// * `dims` - Oriented dimensions
    /// * `used_volume` - Volume already placed
    /// * `load_front` - Largest `x + length` of the placed items
    pub fn volume_term(&self, position: Vec3, dims: Vec3, used_volume: f64, load_front: f64) -> f64 {
        let front = load_front.max(position.x + dims.x);
        let prefix = self.vehicle_dims.y * self.vehicle_dims.z * front;
        if prefix <= 0.0 {
            return 0.0;
        }
        ((used_volume + dims.volume()) / prefix).clamp(0.0, 1.0)
    }

    /// Weight distribution quality in `[0, 1]`: centered and low is best.
    pub fn weight_term(&self, balance: &BalanceCheck) -> f64 {
        let height_ratio = if self.vehicle_dims.z > 0.0 {
            (balance.centroid.z / self.vehicle_dims.z).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let term = 1.0 - 0.5 * (balance.lateral_ratio + height_ratio);
        if balance.within_tolerance {
            term
        } else {
            term * OUT_OF_TOLERANCE_PENALTY
        }
    }

    pub fn score(
        &self,
        position: Vec3,
        dims: Vec3,
        used_volume: f64,
        load_front: f64,
        balance: &BalanceCheck,
    ) -> f64 {
        self.volume_priority * self.volume_term(position, dims, used_volume, load_front)
            + self.weight_priority * self.weight_term(balance)
    }
}

/// A feasible placement with everything needed to commit it.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementCandidate {
    pub position: Vec3,
    pub dims: Vec3,
    pub score: f64,
    pub support: SupportCheck,
    pub balance: BalanceCheck,
}

/// Keeps the best candidate seen so far.
///
/// Candidates must be offered in search order; a later candidate only wins
/// with a score higher by more than `epsilon`.
#[derive(Clone, Debug)]
pub struct Selector {
    best: Option<PlacementCandidate>,
    epsilon: f64,
}

impl Selector {
    pub fn new(epsilon: f64) -> Self {
        Self {
            best: None,
            epsilon,
        }
    }

    /// Offers a candidate; returns `true` when it became the best one.
    pub fn offer(&mut self, candidate: PlacementCandidate) -> bool {
        let better = match &self.best {
            None => true,
            Some(current) => candidate.score > current.score + self.epsilon,
        };
        if better {
            self.best = Some(candidate);
        }
        better
    }

    pub fn into_best(self) -> Option<PlacementCandidate> {
        self.best
    }
}
