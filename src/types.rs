//! Common types and traits for 3D geometry.
//!
//! The vehicle frame uses `x` along the length (0 is the closed end, the
//! door sits at `x = length`), `y` across the width and `z` upwards.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Global numerical tolerance for floating-point comparisons.
///
/// Used as the default epsilon of the algorithm configuration. The candidate
/// generator and the validators share it so they agree on "touching" versus
/// "overlapping".
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Represents a 3D vector or point in space.
///
/// Used for positions, dimensions, and calculations in 3D space.
///
/// # Examples
/// ```
/// use load_planner::types::Vec3;
///
/// let position = Vec3::new(1.0, 2.0, 3.0);
/// let dimensions = Vec3::new(10.0, 20.0, 30.0);
/// let far_corner = position + dimensions;
/// assert_eq!(far_corner, Vec3::new(11.0, 22.0, 33.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new 3D vector.
    ///
    /// # Parameters
    /// * `x` - X component (length axis)
    /// * `y` - Y component (width axis)
    /// * `z` - Z component (height axis)
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a zero vector (origin).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Converts to tuple format for record compatibility.
    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    /// Calculates the volume (product of all components).
    ///
    /// Useful for dimension vectors.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Calculates the base area (X × Y product).
    #[inline]
    pub fn base_area(&self) -> f64 {
        self.x * self.y
    }

    /// Smallest of the three components.
    #[inline]
    pub fn min_component(&self) -> f64 {
        self.x.min(self.y).min(self.z)
    }

    /// Checks if all components are positive and finite.
    #[inline]
    pub fn is_valid_dimension(&self) -> bool {
        self.x > 0.0
            && self.y > 0.0
            && self.z > 0.0
            && self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
    }

    /// Checks if the vector fits within another vector (component-wise <=).
    ///
    /// # Parameters
    /// * `envelope` - The outer vector (e.g., vehicle dimensions)
    /// * `tolerance` - Numerical tolerance for the comparison
    #[inline]
    pub fn fits_within(&self, envelope: &Self, tolerance: f64) -> bool {
        self.x <= envelope.x + tolerance
            && self.y <= envelope.y + tolerance
            && self.z <= envelope.z + tolerance
    }

    /// Component-wise comparison with tolerance.
    #[inline]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    #[inline]
    fn from(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

impl From<Vec3> for (f64, f64, f64) {
    #[inline]
    fn from(vec: Vec3) -> Self {
        vec.as_tuple()
    }
}

/// Trait for objects with 3D dimensions.
///
/// Provides a common interface for everything with spatial extent.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Vec3;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Calculates the base area.
    fn base_area(&self) -> f64 {
        self.dimensions().base_area()
    }

    /// Checks if this object fits in an envelope with the given dimensions.
    fn fits_in(&self, envelope: &Vec3, tolerance: f64) -> bool {
        self.dimensions().fits_within(envelope, tolerance)
    }
}

/// Trait for objects with a position in 3D space.
pub trait Positioned {
    /// Returns the position (minimum corner).
    fn position(&self) -> Vec3;
}

/// Trait for objects with weight.
pub trait Weighted {
    /// Returns the weight in kg.
    fn weight(&self) -> f64;
}

/// Represents an Axis-Aligned Bounding Box (AABB).
///
/// Used for collision detection, support and footprint calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner (position)
    pub min: Vec3,
    /// Maximum corner (position + dimensions)
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a bounding box from position and dimensions.
    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Calculates the overlap length in one dimension.
    #[inline]
    pub fn overlap_1d(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> f64 {
        (a_max.min(b_max) - a_min.max(b_min)).max(0.0)
    }

    /// Checks if two bounding boxes share a positive-volume intersection.
    ///
    /// Every axis must overlap by more than `epsilon`; boxes that merely touch
    /// on a face, edge or corner do not intersect.
    #[inline]
    pub fn intersects(&self, other: &Self, epsilon: f64) -> bool {
        Self::overlap_1d(self.min.x, self.max.x, other.min.x, other.max.x) > epsilon
            && Self::overlap_1d(self.min.y, self.max.y, other.min.y, other.max.y) > epsilon
            && Self::overlap_1d(self.min.z, self.max.z, other.min.z, other.max.z) > epsilon
    }

    /// Calculates the overlap area in the XY plane.
    #[inline]
    pub fn overlap_area_xy(&self, other: &Self) -> f64 {
        let overlap_x = Self::overlap_1d(self.min.x, self.max.x, other.min.x, other.max.x);
        let overlap_y = Self::overlap_1d(self.min.y, self.max.y, other.min.y, other.max.y);
        overlap_x * overlap_y
    }

    /// Checks whether the XY footprints overlap with positive area.
    #[inline]
    pub fn footprints_overlap(&self, other: &Self, epsilon: f64) -> bool {
        Self::overlap_1d(self.min.x, self.max.x, other.min.x, other.max.x) > epsilon
            && Self::overlap_1d(self.min.y, self.max.y, other.min.y, other.max.y) > epsilon
    }

    /// Half-open containment test: `min <= p < max` on every axis (with tolerance).
    ///
    /// A point on the minimum faces is inside, a point on the maximum faces is
    /// not. An item anchored at such a point would start in occupied space.
    #[inline]
    pub fn contains_point_half_open(&self, point: &Vec3, epsilon: f64) -> bool {
        point.x >= self.min.x - epsilon
            && point.x < self.max.x - epsilon
            && point.y >= self.min.y - epsilon
            && point.y < self.max.y - epsilon
            && point.z >= self.min.z - epsilon
            && point.z < self.max.z - epsilon
    }

    /// Checks that this box lies within `[0, envelope]` on every axis.
    #[inline]
    pub fn is_within(&self, envelope: &Vec3, epsilon: f64) -> bool {
        self.min.x >= -epsilon
            && self.min.y >= -epsilon
            && self.min.z >= -epsilon
            && self.max.fits_within(envelope, epsilon)
    }

    /// Returns the top (Z maximum).
    #[inline]
    pub fn top_z(&self) -> f64 {
        self.max.z
    }

    /// Returns the center point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }
}

/// Validation functions shared by the data records.
pub mod validation {

    /// Validates a single dimension.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the dimension for error messages
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates a weight.
    pub fn validate_weight(value: f64) -> Result<(), String> {
        if value.is_nan() {
            return Err("Weight must not be NaN".to_string());
        }
        if value.is_infinite() {
            return Err("Weight must not be infinite".to_string());
        }
        if value <= 0.0 {
            return Err(format!("Weight must be positive, got: {}", value));
        }
        Ok(())
    }

    /// Validates all three dimensions of a 3D object.
    ///
    /// # Parameters
    /// * `dims` - The dimensions to validate (length, width, height)
    pub fn validate_dimensions_3d(dims: (f64, f64, f64)) -> Result<(), String> {
        validate_dimension(dims.0, "Length")?;
        validate_dimension(dims.1, "Width")?;
        validate_dimension(dims.2, "Height")?;
        Ok(())
    }
}

/// Center of mass calculation helper.
///
/// Accumulates weighted positions for center of mass calculation.
#[derive(Clone, Debug, Default)]
pub struct CenterOfMassCalculator {
    weighted_x: f64,
    weighted_y: f64,
    weighted_z: f64,
    total_weight: f64,
}

impl CenterOfMassCalculator {
    /// Creates a new calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a weighted point.
    ///
    /// # Parameters
    /// * `point` - Position of the point (usually the center of a box)
    /// * `weight` - Weight of the point
    pub fn add_point(&mut self, point: Vec3, weight: f64) {
        self.weighted_x += point.x * weight;
        self.weighted_y += point.y * weight;
        self.weighted_z += point.z * weight;
        self.total_weight += weight;
    }

    /// Returns a copy of the accumulator with one additional point.
    pub fn with_point(&self, point: Vec3, weight: f64) -> Self {
        let mut next = self.clone();
        next.add_point(point, weight);
        next
    }

    /// Calculates the center of mass.
    ///
    /// # Returns
    /// `Some(center)` for valid center of mass, `None` if no weight present
    pub fn compute(&self) -> Option<Vec3> {
        if self.total_weight <= 0.0 {
            None
        } else {
            Some(Vec3::new(
                self.weighted_x / self.total_weight,
                self.weighted_y / self.total_weight,
                self.weighted_z / self.total_weight,
            ))
        }
    }

    /// Total weight accumulated so far.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(b.min_component(), 4.0);
    }

    #[test]
    fn test_vec3_volume_and_area() {
        let dims = Vec3::new(10.0, 20.0, 30.0);
        assert!((dims.volume() - 6000.0).abs() < EPSILON_GENERAL);
        assert!((dims.base_area() - 200.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn test_vec3_fits_within() {
        let small = Vec3::new(5.0, 5.0, 5.0);
        let large = Vec3::new(10.0, 10.0, 10.0);

        assert!(small.fits_within(&large, EPSILON_GENERAL));
        assert!(!large.fits_within(&small, EPSILON_GENERAL));
    }

    #[test]
    fn test_bounding_box_intersects() {
        let a = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(10.0, 10.0, 10.0));
        let b = BoundingBox::from_position_and_dims(
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(10.0, 10.0, 10.0),
        );
        let c = BoundingBox::from_position_and_dims(
            Vec3::new(20.0, 20.0, 20.0),
            Vec3::new(10.0, 10.0, 10.0),
        );

        assert!(a.intersects(&b, EPSILON_GENERAL));
        assert!(!a.intersects(&c, EPSILON_GENERAL));
    }

    #[test]
    fn test_touching_faces_do_not_intersect() {
        let a = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(10.0, 10.0, 10.0));
        let beside = BoundingBox::from_position_and_dims(
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 10.0, 10.0),
        );
        // Floating-point noise just inside the shared face is still "touching".
        let nearly = BoundingBox::from_position_and_dims(
            Vec3::new(10.0 - 1e-9, 0.0, 0.0),
            Vec3::new(10.0, 10.0, 10.0),
        );

        assert!(!a.intersects(&beside, EPSILON_GENERAL));
        assert!(!a.intersects(&nearly, EPSILON_GENERAL));
    }

    #[test]
    fn test_bounding_box_overlap_area() {
        let a = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(10.0, 10.0, 10.0));
        let b = BoundingBox::from_position_and_dims(
            Vec3::new(5.0, 5.0, 0.0),
            Vec3::new(10.0, 10.0, 10.0),
        );

        let overlap = a.overlap_area_xy(&b);
        assert!((overlap - 25.0).abs() < EPSILON_GENERAL); // 5x5 overlap
        assert!(a.footprints_overlap(&b, EPSILON_GENERAL));
    }

    #[test]
    fn test_half_open_containment() {
        let a = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(10.0, 10.0, 10.0));

        assert!(a.contains_point_half_open(&Vec3::zero(), EPSILON_GENERAL));
        assert!(a.contains_point_half_open(&Vec3::new(5.0, 5.0, 5.0), EPSILON_GENERAL));
        assert!(!a.contains_point_half_open(&Vec3::new(10.0, 0.0, 0.0), EPSILON_GENERAL));
        assert!(!a.contains_point_half_open(&Vec3::new(0.0, 0.0, 10.0), EPSILON_GENERAL));
    }

    #[test]
    fn test_center_of_mass_calculator() {
        let mut calc = CenterOfMassCalculator::new();
        calc.add_point(Vec3::new(0.0, 0.0, 0.0), 10.0);
        calc.add_point(Vec3::new(10.0, 0.0, 4.0), 10.0);

        let center = calc.compute().unwrap();
        assert!((center.x - 5.0).abs() < EPSILON_GENERAL);
        assert!((center.y - 0.0).abs() < EPSILON_GENERAL);
        assert!((center.z - 2.0).abs() < EPSILON_GENERAL);
        assert!(CenterOfMassCalculator::new().compute().is_none());
    }

    #[test]
    fn test_validation_dimension() {
        assert!(validation::validate_dimension(10.0, "Width").is_ok());
        assert!(validation::validate_dimension(0.0, "Width").is_err());
        assert!(validation::validate_dimension(-1.0, "Width").is_err());
        assert!(validation::validate_dimension(f64::NAN, "Width").is_err());
        assert!(validation::validate_dimension(f64::INFINITY, "Width").is_err());
    }

    #[test]
    fn test_validation_weight() {
        assert!(validation::validate_weight(10.0).is_ok());
        assert!(validation::validate_weight(0.0).is_err());
        assert!(validation::validate_weight(-1.0).is_err());
    }
}
