//! Data models for truck load planning.
//!
//! This module defines the fundamental data structures of a packing run:
//! - `Vehicle`: The cargo envelope with its weight capacity
//! - `Item`: A cargo item with dimensions, weight and handling rules
//! - `PlacedItem`: An item with its chosen orientation and position
//! - `UnplacedItem`: An item the engine had to leave behind, with the reason
//!
//! All structures implement the traits from the `types` module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::UnplacedReason;
use crate::types::{BoundingBox, Dimensional, Positioned, Vec3, Weighted, validation};

/// Validation error for item and vehicle data.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
}

/// Validates dimensions and weight together.
fn validate_params(dims: Vec3, weight: f64) -> Result<(), ValidationError> {
    validation::validate_dimensions_3d(dims.as_tuple()).map_err(ValidationError::InvalidDimension)?;
    validation::validate_weight(weight).map_err(ValidationError::InvalidWeight)?;
    Ok(())
}

/// Stacking behaviour of an item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stackability {
    /// Can carry items and rest on other items.
    #[default]
    Stackable,
    /// May rest on other items, but nothing may be placed on top of it.
    SemiStackable,
    /// Must stand on the floor and nothing may be placed on top of it.
    Unstackable,
}

impl Stackability {
    /// Whether other items may rest on this one.
    pub fn carries_load(self) -> bool {
        matches!(self, Stackability::Stackable)
    }

    /// Whether the item has to stand on the vehicle floor.
    pub fn requires_floor(self) -> bool {
        matches!(self, Stackability::Unstackable)
    }
}

/// Which axis-aligned rotations an item allows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPermission {
    /// Only the given orientation.
    Fixed,
    /// Length and width may be swapped, height stays vertical.
    Upright,
    /// All six axis permutations.
    #[default]
    Any,
}

impl From<bool> for RotationPermission {
    fn from(can_rotate: bool) -> Self {
        if can_rotate {
            RotationPermission::Any
        } else {
            RotationPermission::Fixed
        }
    }
}

/// A cargo item to be loaded.
///
/// # Fields
/// * `id` - Identifier, unique within one run
/// * `dims` - Dimensions (length, width, height) as given
/// * `weight` - Weight in kg
/// * `rotation` - Allowed rotations
/// * `stackability` - Stacking behaviour
/// * `destination` - Delivery stop label, if any
/// * `palletized` - Item sits on a pallet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub dims: Vec3,
    pub weight: f64,
    #[serde(default)]
    pub rotation: RotationPermission,
    #[serde(default)]
    pub stackability: Stackability,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub palletized: bool,
}

impl Item {
    /// Creates a new stackable, freely rotatable item with validation.
    ///
    /// # Examples
    /// ```
    /// use load_planner::model::Item;
    /// use load_planner::types::Vec3;
    ///
    /// let ok = Item::new("box-1", Vec3::new(1000.0, 800.0, 600.0), 50.0);
    /// assert!(ok.is_ok());
    ///
    /// let invalid = Item::new("box-2", Vec3::new(-10.0, 20.0, 30.0), 5.0);
    /// assert!(invalid.is_err());
    /// ```
    pub fn new(id: impl Into<String>, dims: Vec3, weight: f64) -> Result<Self, ValidationError> {
        validate_params(dims, weight)?;
        Ok(Self::unchecked(id, dims, weight))
    }

    /// Builds an item without validation; [`Item::validate`] reports problems later.
    pub fn unchecked(id: impl Into<String>, dims: Vec3, weight: f64) -> Self {
        Self {
            id: id.into(),
            dims,
            weight,
            rotation: RotationPermission::default(),
            stackability: Stackability::default(),
            destination: None,
            palletized: false,
        }
    }

    pub fn with_rotation(mut self, rotation: RotationPermission) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_stackability(mut self, stackability: Stackability) -> Self {
        self.stackability = stackability;
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn palletized(mut self, palletized: bool) -> Self {
        self.palletized = palletized;
        self
    }

    /// Checks dimensions and weight.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_params(self.dims, self.weight)
    }

    /// Rotations actually available in a run.
    ///
    /// Rotation disabled in the configuration pins every item. A palletized
    /// item keeps its pallet base horizontal.
    pub fn effective_rotation(&self, rotation_enabled: bool) -> RotationPermission {
        if !rotation_enabled {
            return RotationPermission::Fixed;
        }
        match self.rotation {
            RotationPermission::Any if self.palletized => RotationPermission::Upright,
            other => other,
        }
    }
}

impl Dimensional for Item {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

impl Weighted for Item {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// An item committed to a position inside the vehicle.
///
/// # Fields
/// * `item` - The original item
/// * `dims` - Oriented dimensions (length, width, height after rotation)
/// * `position` - Minimum corner inside the vehicle frame
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedItem {
    pub item: Item,
    pub dims: Vec3,
    pub position: Vec3,
}

impl PlacedItem {
    pub fn new(item: Item, dims: Vec3, position: Vec3) -> Self {
        Self {
            item,
            dims,
            position,
        }
    }

    /// Returns the top Z coordinate of the placed item.
    pub fn top_z(&self) -> f64 {
        self.position.z + self.dims.z
    }

    /// Calculates the bounding box of the placed item.
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(self.position, self.dims)
    }

    /// Returns the geometric center (uniform density assumed).
    pub fn center(&self) -> Vec3 {
        self.bounding_box().center()
    }
}

impl Positioned for PlacedItem {
    fn position(&self) -> Vec3 {
        self.position
    }
}

impl Dimensional for PlacedItem {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

impl Weighted for PlacedItem {
    fn weight(&self) -> f64 {
        self.item.weight
    }
}

/// Item that could not be placed.
#[derive(Clone, Debug, PartialEq)]
pub struct UnplacedItem {
    pub item: Item,
    pub reason: UnplacedReason,
}

/// The vehicle's cargo envelope.
///
/// # Fields
/// * `name` - Optional display name / reference
/// * `dims` - Length, width, height of the cargo space
/// * `max_weight` - Maximum total payload in kg
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(default)]
    pub name: Option<String>,
    pub dims: Vec3,
    pub max_weight: f64,
}

impl Vehicle {
    /// Creates a vehicle with validation.
    pub fn new(dims: Vec3, max_weight: f64) -> Result<Self, ValidationError> {
        let vehicle = Self {
            name: None,
            dims,
            max_weight,
        };
        vehicle.validate()?;
        Ok(vehicle)
    }

    /// EU Euroliner trailer: 13.62 m × 2.48 m × 2.70 m, 24 t, in millimeters.
    pub fn euroliner() -> Self {
        Self {
            name: Some("EU Euroliner".to_string()),
            dims: Vec3::new(13620.0, 2480.0, 2700.0),
            max_weight: 24000.0,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_params(self.dims, self.max_weight)
    }
}

impl Dimensional for Vehicle {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EPSILON_GENERAL;

    #[test]
    fn item_validation_rejects_non_positive_values() {
        assert!(Item::new("a", Vec3::new(1.0, 1.0, 1.0), 1.0).is_ok());
        assert!(matches!(
            Item::new("a", Vec3::new(0.0, 1.0, 1.0), 1.0),
            Err(ValidationError::InvalidDimension(_))
        ));
        assert!(matches!(
            Item::new("a", Vec3::new(1.0, 1.0, 1.0), -2.0),
            Err(ValidationError::InvalidWeight(_))
        ));
        assert!(Item::unchecked("a", Vec3::new(1.0, f64::NAN, 1.0), 1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn palletized_items_stay_upright() {
        let item = Item::unchecked("p", Vec3::new(1200.0, 800.0, 150.0), 200.0).palletized(true);
        assert_eq!(item.effective_rotation(true), RotationPermission::Upright);
        assert_eq!(item.effective_rotation(false), RotationPermission::Fixed);

        let fixed = item.clone().with_rotation(RotationPermission::Fixed);
        assert_eq!(fixed.effective_rotation(true), RotationPermission::Fixed);
    }

    #[test]
    fn stackability_rules() {
        assert!(Stackability::Stackable.carries_load());
        assert!(!Stackability::SemiStackable.carries_load());
        assert!(!Stackability::Unstackable.carries_load());
        assert!(Stackability::Unstackable.requires_floor());
        assert!(!Stackability::SemiStackable.requires_floor());
    }

    #[test]
    fn stackability_parses_snake_case() {
        let parsed: Stackability = serde_json::from_str("\"semi_stackable\"").unwrap();
        assert_eq!(parsed, Stackability::SemiStackable);
    }

    #[test]
    fn placed_item_geometry() {
        let item = Item::unchecked("a", Vec3::new(2.0, 3.0, 4.0), 10.0);
        let placed = PlacedItem::new(item, Vec3::new(3.0, 2.0, 4.0), Vec3::new(1.0, 1.0, 1.0));

        assert!((placed.top_z() - 5.0).abs() < EPSILON_GENERAL);
        assert!((placed.volume() - 24.0).abs() < EPSILON_GENERAL);
        assert_eq!(placed.center(), Vec3::new(2.5, 2.0, 3.0));
        assert_eq!(placed.weight(), 10.0);
    }

    #[test]
    fn euroliner_is_valid() {
        let vehicle = Vehicle::euroliner();
        assert!(vehicle.validate().is_ok());
        assert_eq!(vehicle.volume(), 13620.0 * 2480.0 * 2700.0);
        assert!(Vehicle::new(Vec3::new(10.0, 0.0, 10.0), 100.0).is_err());
    }
}
