//! Geometry classification interface.
//!
//! Classifying a primitive maps its (technology, station, ring, chamber)
//! onto the canonical site/host/chamber numbering of the sector processor
//! and extracts the feature values the aggregator stores. The mapping
//! tables belong to the geometry collaborator; this crate only fixes the
//! interface and the numbering ranges the aggregation rules rely on.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::hit::{Particle, Subsystem, TriggerPrimitive};
use crate::Result;

/// Number of hosts (chamber types) known to the host table.
pub const NUM_HOSTS: usize = 19;

/// Number of canonical chamber slots (native and neighbor, all technologies).
pub const NUM_CHAMBERS: usize = 115;

/// Chamber ids below this value are CSC chambers.
pub const NUM_CSC_CHAMBERS: u8 = 54;

/// Host ids in host-table order.
pub mod host {
    pub const ME1_1: u8 = 0;
    pub const ME1_2: u8 = 1;
    pub const ME1_3: u8 = 2;
    pub const ME2_1: u8 = 3;
    pub const ME2_2: u8 = 4;
    pub const ME3_1: u8 = 5;
    pub const ME3_2: u8 = 6;
    pub const ME4_1: u8 = 7;
    pub const ME4_2: u8 = 8;
    pub const GE1_1: u8 = 9;
    pub const RE1_2: u8 = 10;
    pub const RE1_3: u8 = 11;
    pub const GE2_1: u8 = 12;
    pub const RE2_2: u8 = 13;
    pub const RE3_1: u8 = 14;
    pub const RE3_2: u8 = 15;
    pub const RE4_1: u8 = 16;
    pub const RE4_2: u8 = 17;
    pub const ME0: u8 = 18;
}

/// Canonical identifiers and feature values of one primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Classification {
    pub site: u8,
    pub host: u8,
    pub chamber: u8,
    /// Bitmask of readout zones covering the primitive's theta.
    pub zones: i32,
    /// Bitmask of timezones the primitive's bx is consistent with.
    pub timezones: i32,
    pub phi: i32,
    pub bend: i32,
    pub theta: i32,
    pub qual: i32,
    pub time: i32,
}

/// Geometry collaborator used by the ranking and aggregation stages.
///
/// Implementations must be pure: the same primitive always classifies the
/// same way.
pub trait GeometryClassifier: Send + Sync {
    /// Host id of a primitive, or `None` if the table has no entry.
    fn find_host(&self, hit: &TriggerPrimitive) -> Option<u8>;

    /// Full classification of a primitive.
    ///
    /// # Errors
    /// Returns an error if any table lookup fails.
    fn classify(&self, hit: &TriggerPrimitive) -> Result<Classification>;

    /// Whether the primitive is used by the active algorithm configuration.
    fn is_legit(&self, hit: &TriggerPrimitive) -> bool;

    /// Readout zone of a particle at the given (propagated) eta.
    fn find_particle_zone(&self, eta: f64) -> Option<u8>;

    /// Rewrites the numbering of a legit primitive before it is ranked or
    /// routed. The default leaves the primitive unchanged.
    fn remap(&self, _hit: &mut TriggerPrimitive) {}

    /// Inclusive bx window of legit primitives, if the classifier has one.
    fn legit_bx_window(&self) -> Option<(i8, i8)> {
        None
    }

    /// Pseudorapidity of the particle at the reference station.
    ///
    /// The default assumes a straight trajectory and returns the vertex eta.
    fn etastar(&self, particle: &Particle) -> f64 {
        particle.eta
    }
}

/// Number of features emitted per kept primitive.
pub const NUM_FEATURES: usize = 18;

/// Feature names in serialization order.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "emtf_site",
    "emtf_host",
    "emtf_chamber",
    "emtf_segment",
    "zones",
    "timezones",
    "emtf_phi",
    "emtf_bend",
    "emtf_theta",
    "emtf_theta_alt",
    "emtf_qual",
    "emtf_qual_alt",
    "emtf_time",
    "strip",
    "wire",
    "fr",
    "detlayer",
    "bx",
];

/// A primitive annotated with its classification and aggregation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedHit {
    pub primitive: TriggerPrimitive,
    pub geometry: Classification,
    /// Position among the survivors of its chamber.
    pub segment: i32,
    pub theta_alt: i32,
    pub qual_alt: i32,
}

impl ClassifiedHit {
    /// Wraps a classified primitive with the alternate fields equal to the
    /// primary ones and a zero segment.
    #[must_use]
    pub fn new(primitive: TriggerPrimitive, geometry: Classification) -> Self {
        Self {
            primitive,
            geometry,
            segment: 0,
            theta_alt: geometry.theta,
            qual_alt: geometry.qual,
        }
    }

    #[inline]
    #[must_use]
    pub fn subsystem(&self) -> Subsystem {
        self.primitive.subsystem
    }

    #[inline]
    #[must_use]
    pub fn chamber(&self) -> u8 {
        self.geometry.chamber
    }

    #[inline]
    #[must_use]
    pub fn phi(&self) -> i32 {
        self.geometry.phi
    }

    #[inline]
    #[must_use]
    pub fn theta(&self) -> i32 {
        self.geometry.theta
    }

    #[inline]
    #[must_use]
    pub fn detlayer(&self) -> i32 {
        self.primitive.layer
    }

    /// Feature vector in [`FEATURE_NAMES`] order.
    #[must_use]
    pub fn features(&self) -> [i32; NUM_FEATURES] {
        let g = &self.geometry;
        let p = &self.primitive;
        [
            i32::from(g.site),
            i32::from(g.host),
            i32::from(g.chamber),
            self.segment,
            g.zones,
            g.timezones,
            g.phi,
            g.bend,
            g.theta,
            self.theta_alt,
            g.qual,
            self.qual_alt,
            g.time,
            p.strip,
            p.wire,
            i32::from(p.fr),
            p.layer,
            i32::from(p.bx),
        ]
    }
}
