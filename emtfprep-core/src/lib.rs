//! emtfprep-core: Core types for trigger-primitive data preparation.
//!
//! This crate provides the foundational records (trigger primitives,
//! simulated hits, particles), end-sector arithmetic, the geometry
//! classification interface, and the ragged array container used for
//! the prepared datasets.
//!

pub mod error;
pub mod geometry;
pub mod hit;
pub mod ragged;
pub mod sector;
pub mod trigger;

pub use error::{Error, Result};
pub use geometry::{
    ClassifiedHit, Classification, GeometryClassifier, FEATURE_NAMES, NUM_CHAMBERS,
    NUM_CSC_CHAMBERS, NUM_FEATURES, NUM_HOSTS,
};
pub use hit::{Event, Particle, SimHit, Subsystem, TriggerPrimitive};
pub use ragged::{row_splits_from_segment_ids, RaggedArray};
pub use sector::{EndSector, NUM_END_SECTORS, NUM_SECTORS};
