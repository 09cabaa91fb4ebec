//! Truck load planning engine.
//!
//! Places rectangular cargo items into a vehicle's cargo space, honouring
//! weight limits, stacking support, rotation permissions and the unloading
//! order of multi-stop routes. [`optimizer::pack_items`] runs the engine
//! directly; [`service::PackingService`] adds jobs, caching and concurrency.

pub mod api;
pub mod balance;
pub mod cache;
pub mod candidates;
pub mod config;
pub mod error;
pub mod geometry;
pub mod job;
pub mod model;
pub mod optimizer;
pub mod orientation;
pub mod selector;
pub mod sequencer;
pub mod service;
pub mod support;
pub mod types;

pub use error::{PackingError, Result, UnplacedReason};
pub use model::{Item, PlacedItem, UnplacedItem, Vehicle};
pub use optimizer::{PackingInput, PackingResult, pack_items, pack_items_with_progress};
