//! Packing orchestration for loading one vehicle.
//!
//! This module drives a packing run:
//! - validation of the vehicle, the configuration and every item
//! - loading order by delivery stop ([`crate::sequencer`])
//! - per item: orientations, candidate points, support and weight filters,
//!   scoring, then commit or rejection
//! - aggregation of the placements into a [`PackingResult`]
//!
//! Placements are never revisited once committed. All mutable state of a run
//! lives in one [`PackingContext`] that is dropped when the run ends.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::balance::WeightBalancer;
use crate::candidates::CandidatePoints;
use crate::config::AlgorithmConfig;
use crate::error::{PackingError, Result, UnplacedReason};
use crate::geometry::{collides_with_any, fits_in_vehicle};
use crate::model::{Item, PlacedItem, UnplacedItem, Vehicle};
use crate::orientation::item_orientations;
use crate::selector::{PlacementCandidate, ScoringModel, Selector};
use crate::sequencer::{SequencedItem, sequence};
use crate::support::{StackInfo, SupportRules};
use crate::types::{BoundingBox, Dimensional, Vec3};

/// Input of one packing run.
///
/// # Fields
/// * `vehicle` - Cargo envelope
/// * `items` - Expanded items in request order
/// * `rejected` - Entries already refused while reading the request
/// * `route` - Stop labels in visiting order (may be empty)
#[derive(Clone, Debug, Default)]
pub struct PackingInput {
    pub vehicle: Option<Vehicle>,
    pub items: Vec<Item>,
    pub rejected: Vec<UnplacedItem>,
    pub route: Vec<String>,
}

impl PackingInput {
    pub fn new(vehicle: Vehicle, items: Vec<Item>) -> Self {
        Self {
            vehicle: Some(vehicle),
            items,
            rejected: Vec::new(),
            route: Vec::new(),
        }
    }

    pub fn with_route(mut self, route: Vec<String>) -> Self {
        self.route = route;
        self
    }

    pub fn with_rejected(mut self, rejected: Vec<UnplacedItem>) -> Self {
        self.rejected = rejected;
        self
    }

    /// Number of submitted item instances, refused ones included.
    pub fn total_items(&self) -> usize {
        self.items.len() + self.rejected.len()
    }
}

/// Lifecycle of a packing run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingPhase {
    Pending,
    Sequencing,
    Placing,
    Aggregating,
    Completed,
    Failed,
}

/// Events emitted during packing, suitable for a live visualisation feed.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PackEvent {
    /// The run entered a new phase.
    PhaseChanged { phase: PackingPhase },
    /// An item was committed.
    ItemPlaced {
        id: String,
        pos: (f64, f64, f64),
        dims: (f64, f64, f64),
        weight: f64,
        total_weight: f64,
    },
    /// An item could not be placed.
    ItemRejected {
        id: String,
        weight: f64,
        dims: (f64, f64, f64),
        reason_code: String,
        reason_text: String,
    },
    /// Packing finished.
    Finished {
        placed: usize,
        unplaced: usize,
        efficiency_percent: f64,
    },
}

/// Search statistics of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PackingDiagnostics {
    /// (point, orientation) pairs evaluated.
    pub evaluations: u64,
    /// Items whose search hit the per-item evaluation cap.
    pub truncated_items: usize,
    /// Candidate points left at the end of the run.
    pub remaining_points: usize,
    /// Centroid of the placed weight.
    pub centroid: Option<(f64, f64, f64)>,
    /// Lateral centroid offset as a share of half the vehicle width.
    pub lateral_ratio: f64,
    /// Highest stack level reached.
    pub max_stack_level: u32,
}

/// Outcome of a completed packing run.
#[derive(Clone, Debug)]
pub struct PackingResult {
    pub vehicle: Vehicle,
    pub placed: Vec<PlacedItem>,
    pub unplaced: Vec<UnplacedItem>,
    /// The time or evaluation budget ran out before every item was tried.
    pub budget_exceeded: bool,
    pub diagnostics: PackingDiagnostics,
    pub elapsed: Duration,
}

impl PackingResult {
    /// Indicates whether all items were placed.
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.placed.len() + self.unplaced.len()
    }

    pub fn used_volume(&self) -> f64 {
        self.placed.iter().map(|p| p.volume()).sum()
    }

    /// Used volume as a fraction of the vehicle volume.
    pub fn efficiency(&self) -> f64 {
        let capacity = self.vehicle.volume();
        if capacity <= 0.0 {
            0.0
        } else {
            self.used_volume() / capacity
        }
    }

    /// Efficiency in percent, rounded to two decimals.
    pub fn efficiency_percent(&self) -> f64 {
        (self.efficiency() * 10_000.0).round() / 100.0
    }

    /// Total weight of all placed items.
    pub fn total_weight(&self) -> f64 {
        self.placed.iter().map(|p| p.item.weight).sum()
    }
}

/// Packs items with the given configuration.
pub fn pack_items(input: PackingInput, config: &AlgorithmConfig) -> Result<PackingResult> {
    let never = AtomicBool::new(false);
    pack_items_with_progress(input, config, &never, |_| {})
}

/// Packing with cancellation and a live progress callback.
///
/// `cancel` is checked before every item; once set, the run fails with
/// [`PackingError::Cancelled`] and its partial state is dropped.
///
/// # Parameters
/// * `input` - Vehicle, items and route
/// * `config` - Validated or unvalidated configuration (validated here)
/// * `cancel` - Cancellation flag shared with the caller
/// * `on_event` - Receives every [`PackEvent`]
pub fn pack_items_with_progress(
    input: PackingInput,
    config: &AlgorithmConfig,
    cancel: &AtomicBool,
    mut on_event: impl FnMut(&PackEvent),
) -> Result<PackingResult> {
    on_event(&PackEvent::PhaseChanged {
        phase: PackingPhase::Pending,
    });
    let outcome = run(input, config, cancel, &mut on_event);
    match &outcome {
        Ok(result) => {
            on_event(&PackEvent::PhaseChanged {
                phase: PackingPhase::Completed,
            });
            info!(
                "✅ Packing completed: {} placed, {} unplaced, {:.2}% volume in {} ms",
                result.placed.len(),
                result.unplaced.len(),
                result.efficiency_percent(),
                result.elapsed.as_millis()
            );
        }
        Err(err) => {
            on_event(&PackEvent::PhaseChanged {
                phase: PackingPhase::Failed,
            });
            warn!("❌ Packing failed: {}", err);
        }
    }
    outcome
}

fn run(
    input: PackingInput,
    config: &AlgorithmConfig,
    cancel: &AtomicBool,
    on_event: &mut impl FnMut(&PackEvent),
) -> Result<PackingResult> {
    let started = Instant::now();
    config.validate()?;

    let total_items = input.total_items();
    let PackingInput {
        vehicle,
        items,
        rejected,
        route,
    } = input;
    let vehicle = vehicle.ok_or_else(|| PackingError::InvalidVehicle("no vehicle given".into()))?;
    vehicle
        .validate()
        .map_err(|err| PackingError::InvalidVehicle(err.to_string()))?;
    if total_items == 0 {
        return Err(PackingError::EmptyRequest);
    }

    let (valid, mut unplaced) = split_valid_items(items, rejected);
    if valid.is_empty() {
        return Err(PackingError::NoValidItems(total_items));
    }
    for refused in &unplaced {
        emit_rejection(on_event, refused);
    }

    info!(
        "📦 Packing {} items ({} refused) into {} ({:.0} x {:.0} x {:.0}, max {:.0} kg)",
        valid.len(),
        unplaced.len(),
        vehicle.name.as_deref().unwrap_or("vehicle"),
        vehicle.dims.x,
        vehicle.dims.y,
        vehicle.dims.z,
        vehicle.max_weight
    );

    on_event(&PackEvent::PhaseChanged {
        phase: PackingPhase::Sequencing,
    });
    let route = (!route.is_empty()).then_some(route.as_slice());
    let sequenced = sequence(valid, route, config.unlabeled_policy);

    on_event(&PackEvent::PhaseChanged {
        phase: PackingPhase::Placing,
    });
    let mut ctx = PackingContext::new(&vehicle, config);
    let mut budget_exceeded = false;
    let time_budget = config.time_budget_ms.map(Duration::from_millis);

    for SequencedItem {
        item, unload_rank, ..
    } in sequenced
    {
        if cancel.load(Ordering::Relaxed) {
            info!("🛑 Packing cancelled after {} placements", ctx.placed.len());
            return Err(PackingError::Cancelled);
        }

        if !budget_exceeded {
            let out_of_time = time_budget.is_some_and(|limit| started.elapsed() >= limit);
            let out_of_evaluations = config
                .evaluation_budget
                .is_some_and(|limit| ctx.evaluations >= limit);
            if out_of_time || out_of_evaluations {
                warn!(
                    "⏱️ Packing budget exhausted after {} evaluations; remaining items stay unplaced",
                    ctx.evaluations
                );
                budget_exceeded = true;
            }
        }

        let outcome = if budget_exceeded {
            Err(UnplacedReason::BudgetExceeded)
        } else {
            ctx.place(&item, unload_rank)
        };

        match outcome {
            Ok(index) => {
                let placed = &ctx.placed[index];
                debug!(
                    "Placed {} at ({:.1}, {:.1}, {:.1}) as {:.0} x {:.0} x {:.0}",
                    placed.item.id,
                    placed.position.x,
                    placed.position.y,
                    placed.position.z,
                    placed.dims.x,
                    placed.dims.y,
                    placed.dims.z
                );
                on_event(&PackEvent::ItemPlaced {
                    id: placed.item.id.clone(),
                    pos: placed.position.as_tuple(),
                    dims: placed.dims.as_tuple(),
                    weight: placed.item.weight,
                    total_weight: ctx.balancer.total_weight(),
                });
            }
            Err(reason) => {
                debug!("Could not place {}: {}", item.id, reason);
                let entry = UnplacedItem { item, reason };
                emit_rejection(on_event, &entry);
                unplaced.push(entry);
            }
        }
    }

    on_event(&PackEvent::PhaseChanged {
        phase: PackingPhase::Aggregating,
    });
    let diagnostics = ctx.diagnostics();
    let result = PackingResult {
        vehicle: vehicle.clone(),
        placed: ctx.placed,
        unplaced,
        budget_exceeded,
        diagnostics,
        elapsed: started.elapsed(),
    };
    on_event(&PackEvent::Finished {
        placed: result.placed.len(),
        unplaced: result.unplaced.len(),
        efficiency_percent: result.efficiency_percent(),
    });
    Ok(result)
}

/// Separates usable items from invalid ones and duplicate ids.
fn split_valid_items(
    items: Vec<Item>,
    mut rejected: Vec<UnplacedItem>,
) -> (Vec<Item>, Vec<UnplacedItem>) {
    let mut seen: BTreeSet<String> = rejected.iter().map(|r| r.item.id.clone()).collect();
    let mut valid = Vec::with_capacity(items.len());

    for item in items {
        if let Err(err) = item.validate() {
            rejected.push(UnplacedItem {
                item,
                reason: UnplacedReason::InvalidInput(err.to_string()),
            });
        } else if !seen.insert(item.id.clone()) {
            let reason = UnplacedReason::InvalidInput(format!("duplicate item id '{}'", item.id));
            rejected.push(UnplacedItem { item, reason });
        } else {
            valid.push(item);
        }
    }
    (valid, rejected)
}

fn emit_rejection(on_event: &mut impl FnMut(&PackEvent), entry: &UnplacedItem) {
    on_event(&PackEvent::ItemRejected {
        id: entry.item.id.clone(),
        weight: entry.item.weight,
        dims: entry.item.dims.as_tuple(),
        reason_code: entry.reason.code().to_string(),
        reason_text: entry.reason.to_string(),
    });
}

/// Mutable state of one packing run.
///
/// Created per run and never shared; the validators, the balancer and the
/// selector all read the same placements through it.
pub struct PackingContext<'a> {
    vehicle: &'a Vehicle,
    config: &'a AlgorithmConfig,
    rules: SupportRules,
    scoring: ScoringModel,
    placed: Vec<PlacedItem>,
    stacks: Vec<StackInfo>,
    points: CandidatePoints,
    balancer: WeightBalancer,
    used_volume: f64,
    load_front: f64,
    evaluations: u64,
    truncated_items: usize,
}

impl<'a> PackingContext<'a> {
    pub fn new(vehicle: &'a Vehicle, config: &'a AlgorithmConfig) -> Self {
        Self {
            vehicle,
            config,
            rules: SupportRules::from_config(config),
            scoring: ScoringModel::new(config, vehicle.dims),
            placed: Vec::new(),
            stacks: Vec::new(),
            points: CandidatePoints::new(vehicle.dims, config.epsilon),
            balancer: WeightBalancer::new(vehicle, config),
            used_volume: 0.0,
            load_front: 0.0,
            evaluations: 0,
            truncated_items: 0,
        }
    }

    /// Tries to place one item; returns its index in the placement list.
    pub fn place(&mut self, item: &Item, unload_rank: usize) -> std::result::Result<usize, UnplacedReason> {
        let eps = self.config.epsilon;
        let orientations = item_orientations(
            item,
            self.config.enable_rotation,
            self.config.lay_flat_unstackable,
            eps,
        );

        if !orientations
            .iter()
            .any(|dims| dims.fits_within(&self.vehicle.dims, eps))
        {
            return Err(UnplacedReason::CapacityExceeded);
        }
        if !self.balancer.can_carry(item.weight) {
            return Err(UnplacedReason::WeightLimitExceeded);
        }

        let candidate = self
            .search(item, unload_rank, &orientations)
            .ok_or(UnplacedReason::NoFeasiblePosition)?;
        Ok(self.commit(item, unload_rank, candidate))
    }

    /// Evaluates (orientation, point) pairs in search order and keeps the best.
    fn search(
        &mut self,
        item: &Item,
        unload_rank: usize,
        orientations: &[Vec3],
    ) -> Option<PlacementCandidate> {
        let eps = self.config.epsilon;
        let cap = self.config.max_evaluations_per_item;
        let points = self.points.positions();
        let mut selector = Selector::new(eps);
        let mut evaluated: u64 = 0;

        'search: for &dims in orientations {
            for &position in &points {
                if cap.is_some_and(|limit| evaluated >= limit) {
                    self.truncated_items += 1;
                    trace!("Evaluation cap reached for {}", item.id);
                    break 'search;
                }
                evaluated += 1;

                let bbox = BoundingBox::from_position_and_dims(position, dims);
                if !fits_in_vehicle(&bbox, &self.vehicle.dims, eps)
                    || collides_with_any(&bbox, &self.placed, eps)
                {
                    continue;
                }

                let support =
                    match self
                        .rules
                        .evaluate(&bbox, item, unload_rank, &self.placed, &self.stacks)
                    {
                        Ok(support) => support,
                        Err(rejection) => {
                            trace!("{} at {:?}: {}", item.id, position.as_tuple(), rejection);
                            continue;
                        }
                    };

                let balance =
                    match self
                        .balancer
                        .evaluate(bbox.center(), item.weight, &support.supporters)
                    {
                        Ok(balance) => balance,
                        Err(rejection) => {
                            trace!("{} at {:?}: {}", item.id, position.as_tuple(), rejection);
                            continue;
                        }
                    };

                let score =
                    self.scoring
                        .score(position, dims, self.used_volume, self.load_front, &balance);
                selector.offer(PlacementCandidate {
                    position,
                    dims,
                    score,
                    support,
                    balance,
                });
            }
        }

        self.evaluations += evaluated;
        selector.into_best()
    }

    fn commit(&mut self, item: &Item, unload_rank: usize, candidate: PlacementCandidate) -> usize {
        let index = self.placed.len();
        let placed = PlacedItem::new(item.clone(), candidate.dims, candidate.position);

        self.balancer
            .commit(placed.center(), item.weight, &candidate.support.supporters);
        self.stacks.push(StackInfo {
            level: candidate.support.level,
            unload_rank,
            supporters: candidate.support.supporters,
        });
        self.used_volume += placed.volume();
        self.load_front = self.load_front.max(placed.position.x + placed.dims.x);
        self.placed.push(placed);
        self.points.on_commit(&self.placed, index);
        index
    }

    fn diagnostics(&self) -> PackingDiagnostics {
        PackingDiagnostics {
            evaluations: self.evaluations,
            truncated_items: self.truncated_items,
            remaining_points: self.points.len(),
            centroid: self.balancer.centroid().map(|c| c.as_tuple()),
            lateral_ratio: self.balancer.lateral_ratio(),
            max_stack_level: self.stacks.iter().map(|s| s.level).max().unwrap_or(0),
        }
    }
}
