//! # phasefield core
//!
//! The numerical backbone of phasefield: everything needed to describe one
//! electronically steered array and evaluate it synchronously, without any
//! threads or I/O.
//!
//! ## Modules
//!
//! - [`types`]: Points, bounds, element records, pattern samples, configs.
//! - [`medium`]: Propagation media and their speeds of sound.
//! - [`steering`]: Wavenumber and steering-vector helpers shared with the
//!   multi-array field job.
//! - [`layout`]: Linear and curved element placement.
//! - [`fields`]: Field-at-point, intensity maps, and beam-pattern sweeps.
//! - [`array_unit`]: The cached single-array engine, [`ArrayUnit`].

pub mod array_unit;
pub mod fields;
pub mod layout;
pub mod medium;
pub mod steering;
pub mod types;

pub use array_unit::ArrayUnit;
pub use medium::Medium;
pub use types::{ArrayGeometry, ArrayUnitConfig, BeamSample, Bounds, ElementPosition, Point2};
