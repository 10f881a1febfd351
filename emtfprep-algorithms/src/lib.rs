//! emtfprep-algorithms: Sector ranking, chamber aggregation and the event
//! pipeline.
//!
//! - **Ranking** - per end-sector layer-class bitmasks and best sector choice
//! - **Aggregation** - (bx, chamber) buckets with CSC ghost removal
//! - **Pipeline** - signal and background preparations, sequential or
//!   partitioned across the rayon pool
//! - **Tables** - reference geometry classifier
//!
#![warn(missing_docs)]

mod aggregator;
mod processing;
mod ranking;
mod simhits;
mod tables;

pub use aggregator::{
    AggregatorConfig, ChamberAggregator, ChamberClass, DedupMode, StationCoverage,
    MAX_CSC_SEGMENTS,
};
pub use processing::{
    run_background_partitioned, run_signal_partitioned, BackgroundOutput, EventPipeline,
    PipelineConfig, RunStatistics, SignalOutput, NUM_AUX_FIELDS, NUM_PART_FIELDS,
};
pub use ranking::{rank_bit, SectorRanking};
pub use simhits::route_simhit;
pub use tables::{Algorithm, TableGeometry};

// Re-export the classifier interface
pub use emtfprep_core::{ClassifiedHit, Classification, GeometryClassifier};
