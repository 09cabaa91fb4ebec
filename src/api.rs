//! Request and response records of the packing service.
//!
//! Transport-agnostic: callers deserialize a [`PackRequest`] from whatever
//! they receive and serialize the [`PackResponse`] back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AlgorithmConfig, AlgorithmConfigOverride, ConfigRegistry};
use crate::error::{Result, UnplacedReason};
use crate::model::{Item, RotationPermission, Stackability, UnplacedItem, Vehicle};
use crate::optimizer::{PackingDiagnostics, PackingInput, PackingResult};
use crate::types::Vec3;

/// Vehicle as sent by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Length, width, height of the cargo space.
    pub dims: (f64, f64, f64),
    pub max_weight: f64,
}

impl VehicleRequest {
    /// Converts without validation; the packing run rejects bad envelopes.
    fn into_vehicle(self) -> Vehicle {
        Vehicle {
            name: self.name,
            dims: self.dims.into(),
            max_weight: self.max_weight,
        }
    }
}

impl From<&Vehicle> for VehicleRequest {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            name: vehicle.name.clone(),
            dims: vehicle.dims.as_tuple(),
            max_weight: vehicle.max_weight,
        }
    }
}

/// One line of the item list.
///
/// `rotation` wins over `can_rotate` when both are given.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub dims: (f64, f64, f64),
    pub weight: f64,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub can_rotate: Option<bool>,
    #[serde(default)]
    pub rotation: Option<RotationPermission>,
    #[serde(default)]
    pub stackability: Stackability,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub palletized: bool,
}

impl ItemRequest {
    pub fn new(id: impl Into<String>, dims: (f64, f64, f64), weight: f64) -> Self {
        Self {
            id: Some(id.into()),
            dims,
            weight,
            quantity: None,
            can_rotate: None,
            rotation: None,
            stackability: Stackability::default(),
            destination: None,
            palletized: false,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_stackability(mut self, stackability: Stackability) -> Self {
        self.stackability = stackability;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationPermission) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn palletized(mut self, palletized: bool) -> Self {
        self.palletized = palletized;
        self
    }

    fn rotation_permission(&self) -> RotationPermission {
        self.rotation
            .or_else(|| self.can_rotate.map(RotationPermission::from))
            .unwrap_or_default()
    }

    fn to_item(&self, id: String) -> Item {
        Item {
            id,
            dims: Vec3::from(self.dims),
            weight: self.weight,
            rotation: self.rotation_permission(),
            stackability: self.stackability,
            destination: self.destination.clone(),
            palletized: self.palletized,
        }
    }
}

/// Packing request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackRequest {
    pub vehicle: VehicleRequest,
    pub items: Vec<ItemRequest>,
    /// Stop labels in visiting order.
    #[serde(default)]
    pub route: Vec<String>,
    /// Registered configuration to use; the default one when absent.
    #[serde(default)]
    pub config_name: Option<String>,
    #[serde(default)]
    pub config_override: Option<AlgorithmConfigOverride>,
}

impl PackRequest {
    /// Largest number of instances one request line may ask for.
    pub const MAX_QUANTITY: u32 = 10_000;

    pub fn new(vehicle: &Vehicle, items: Vec<ItemRequest>) -> Self {
        Self {
            vehicle: vehicle.into(),
            items,
            route: Vec::new(),
            config_name: None,
            config_override: None,
        }
    }

    /// Expands quantities and assigns ids.
    ///
    /// Lines without an id are named `item-<n>` after their 1-based position.
    /// A quantity above one yields `<id>-1` to `<id>-<k>`. A quantity of zero
    /// or above [`PackRequest::MAX_QUANTITY`] refuses the line as invalid input.
    pub fn into_input(self) -> PackingInput {
        let mut items = Vec::with_capacity(self.items.len());
        let mut rejected = Vec::new();

        for (idx, line) in self.items.iter().enumerate() {
            let base = line
                .id
                .clone()
                .unwrap_or_else(|| format!("item-{}", idx + 1));
            match line.quantity.unwrap_or(1) {
                0 => rejected.push(UnplacedItem {
                    item: line.to_item(base),
                    reason: UnplacedReason::InvalidInput("quantity must be at least 1".into()),
                }),
                count if count > Self::MAX_QUANTITY => rejected.push(UnplacedItem {
                    item: line.to_item(base),
                    reason: UnplacedReason::InvalidInput(format!(
                        "quantity {} exceeds the limit of {}",
                        count,
                        Self::MAX_QUANTITY
                    )),
                }),
                1 => items.push(line.to_item(base)),
                count => items.extend((1..=count).map(|k| line.to_item(format!("{}-{}", base, k)))),
            }
        }

        PackingInput {
            vehicle: Some(self.vehicle.into_vehicle()),
            items,
            rejected,
            route: self.route,
        }
    }

    /// Looks up the named configuration and applies the request override.
    pub fn resolve_config(&self, registry: &ConfigRegistry) -> Result<AlgorithmConfig> {
        let base = registry.resolve(self.config_name.as_deref())?;
        let config = match &self.config_override {
            Some(patch) if !patch.is_empty() => patch.apply(base),
            _ => base.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Placed item in the response.
///
/// # Fields
/// * `id` - Item id
/// * `pos` - Minimum corner (x, y, z) in the vehicle
/// * `dims` - Oriented dimensions
/// * `weight` - Weight in kg
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackedItem {
    pub id: String,
    pub pos: (f64, f64, f64),
    pub dims: (f64, f64, f64),
    pub weight: f64,
    pub destination: Option<String>,
}

/// Item left out of the load, with its submitted dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackedUnplacedItem {
    pub id: String,
    pub dims: (f64, f64, f64),
    pub weight: f64,
    pub reason_code: String,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackStatistics {
    pub placed: usize,
    pub unplaced: usize,
    pub total: usize,
}

/// Response of a packing run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PackResponse {
    pub success: bool,
    pub is_complete: bool,
    pub efficiency_percent: f64,
    pub total_weight: f64,
    pub vehicle: VehicleRequest,
    pub placed: Vec<PackedItem>,
    pub unplaced: Vec<PackedUnplacedItem>,
    pub statistics: PackStatistics,
    pub budget_exceeded: bool,
    pub diagnostics: PackingDiagnostics,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl PackResponse {
    /// Creates a PackResponse from a PackingResult.
    pub fn from_packing_result(result: PackingResult) -> Self {
        let efficiency_percent = result.efficiency_percent();
        let total_weight = result.total_weight();
        let statistics = PackStatistics {
            placed: result.placed.len(),
            unplaced: result.unplaced.len(),
            total: result.total_items(),
        };
        let PackingResult {
            vehicle,
            placed,
            unplaced,
            budget_exceeded,
            diagnostics,
            elapsed,
        } = result;

        Self {
            success: true,
            is_complete: unplaced.is_empty(),
            efficiency_percent,
            total_weight,
            vehicle: VehicleRequest::from(&vehicle),
            placed: placed
                .into_iter()
                .map(|p| PackedItem {
                    pos: p.position.as_tuple(),
                    dims: p.dims.as_tuple(),
                    weight: p.item.weight,
                    destination: p.item.destination,
                    id: p.item.id,
                })
                .collect(),
            unplaced: unplaced
                .into_iter()
                .map(|entry| PackedUnplacedItem {
                    reason_code: entry.reason.code().to_string(),
                    reason: entry.reason.to_string(),
                    dims: entry.item.dims.as_tuple(),
                    weight: entry.item.weight,
                    id: entry.item.id,
                })
                .collect(),
            statistics,
            budget_exceeded,
            diagnostics,
            execution_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            timestamp: Utc::now(),
        }
    }
}
