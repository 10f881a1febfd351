//! Chamber aggregation and ghost removal.
//!
//! Hits are bucketed by (bx, chamber) in a flat arena. The slot index is
//! bx-major, so walking the arena front to back visits buckets in ascending
//! (bx, chamber) order. `get_hits` resolves each bucket to its surviving
//! primitives and serializes them as fixed-width feature vectors.

use emtfprep_core::{
    ClassifiedHit, Error, GeometryClassifier, Result, Subsystem, TriggerPrimitive, NUM_CHAMBERS,
    NUM_CSC_CHAMBERS, NUM_FEATURES,
};

/// Maximum number of CSC segments kept per chamber.
pub const MAX_CSC_SEGMENTS: i32 = 2;

/// Deduplication policy applied by [`ChamberAggregator::get_hits`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DedupMode {
    /// Trigger primitives: CSC ghost removal, occupancy caps elsewhere.
    #[default]
    TriggerPrimitive,
    /// Simulated hits: one representative per bucket.
    Simulation,
}

/// Aggregator configuration.
#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// Deduplication policy.
    pub mode: DedupMode,
    /// Lowest bx the arena holds.
    pub bx_min: i8,
    /// Highest bx the arena holds.
    pub bx_max: i8,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            mode: DedupMode::TriggerPrimitive,
            bx_min: -3,
            bx_max: 3,
        }
    }
}

impl AggregatorConfig {
    /// Configuration for simulated hits.
    #[must_use]
    pub fn simulation() -> Self {
        Self {
            mode: DedupMode::Simulation,
            ..Self::default()
        }
    }

    /// Sets the deduplication policy.
    #[must_use]
    pub fn with_mode(mut self, mode: DedupMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the bx window of the arena. An inverted window is collapsed
    /// onto `bx_min`.
    #[must_use]
    pub fn with_bx_range(mut self, bx_min: i8, bx_max: i8) -> Self {
        self.bx_min = bx_min;
        self.bx_max = bx_max.max(bx_min);
        self
    }

    /// Number of bx values the arena holds.
    #[must_use]
    pub fn num_bx(&self) -> usize {
        usize::try_from(i32::from(self.bx_max) - i32::from(self.bx_min) + 1).unwrap_or(1)
    }
}

/// Occupancy class of a non-CSC chamber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChamberClass {
    /// Any CSC chamber (ids below 54).
    Csc,
    /// ME0.
    Me0,
    /// GE1/1.
    Ge11,
    /// GE2/1.
    Ge21,
    /// RE3/1.
    Re31,
    /// RE4/1.
    Re41,
    /// RE2/2, RE3/2 and RE4/2.
    ReRing2,
    /// RE1/2 and RE1/3.
    Re1,
}

impl ChamberClass {
    /// Class of a canonical chamber id.
    #[must_use]
    pub fn of(chamber: u8) -> Option<Self> {
        match chamber {
            0..=53 => Some(Self::Csc),
            54..=56 | 63..=65 | 99 => Some(Self::Ge11),
            72..=74 | 102 => Some(Self::Ge21),
            81..=83 | 104 => Some(Self::Re31),
            90..=92 | 106 => Some(Self::Re41),
            75..=80 | 84..=89 | 93..=98 | 103 | 105 | 107 => Some(Self::ReRing2),
            57..=62 | 66..=71 | 100 | 101 => Some(Self::Re1),
            108..=114 => Some(Self::Me0),
            _ => None,
        }
    }

    /// Physical hit multiplicity of a non-CSC chamber. CSC buckets are
    /// checked separately.
    #[must_use]
    pub fn max_hits(self) -> usize {
        match self {
            Self::Csc => 4,
            Self::Me0 => 20,
            Self::Ge11 | Self::Ge21 => 8,
            Self::Re31 | Self::Re41 | Self::ReRing2 => 4,
            Self::Re1 => 2,
        }
    }
}

/// Stations and technologies present among bucketed hits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StationCoverage {
    /// Lowest station, or 5 when empty.
    pub min_station: i8,
    /// Highest station, or 0 when empty.
    pub max_station: i8,
    /// Any CSC hit present.
    pub has_csc: bool,
    /// Any ME0 hit present.
    pub has_me0: bool,
}

impl Default for StationCoverage {
    fn default() -> Self {
        Self {
            min_station: 5,
            max_station: 0,
            has_csc: false,
            has_me0: false,
        }
    }
}

impl StationCoverage {
    /// Whether the stations are consistent with a track crossing at least
    /// two stations, counting ME0 plus ME1 as two.
    #[must_use]
    pub fn is_admissible(&self) -> bool {
        (self.min_station <= 1 && self.max_station >= 2)
            || (self.min_station == 2 && self.max_station >= 3)
            || (self.max_station == 1 && self.has_me0 && self.has_csc)
    }
}

/// Buckets classified hits of one end-sector and resolves duplicates.
pub struct ChamberAggregator<'g, G: GeometryClassifier + ?Sized> {
    geometry: &'g G,
    config: AggregatorConfig,
    buckets: Vec<Vec<ClassifiedHit>>,
    touched: Vec<usize>,
    num_hits: usize,
}

impl<'g, G: GeometryClassifier + ?Sized> ChamberAggregator<'g, G> {
    /// Create an empty aggregator.
    pub fn new(geometry: &'g G, config: AggregatorConfig) -> Self {
        let slots = config.num_bx() * NUM_CHAMBERS;
        Self {
            geometry,
            config,
            buckets: vec![Vec::new(); slots],
            touched: Vec::new(),
            num_hits: 0,
        }
    }

    /// Aggregator configuration.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Clears every bucket touched since the last reset.
    pub fn reset(&mut self) {
        for &slot in &self.touched {
            self.buckets[slot].clear();
        }
        self.touched.clear();
        self.num_hits = 0;
    }

    /// Classifies `hit` and appends it to its (bx, chamber) bucket.
    ///
    /// # Errors
    /// Returns an error if classification fails, the chamber id is outside
    /// the chamber table, or the bx is outside the arena window.
    pub fn add(&mut self, hit: &TriggerPrimitive) -> Result<()> {
        let geometry = self.geometry.classify(hit)?;
        let slot = self.slot(hit.bx, geometry.chamber)?;
        let bucket = &mut self.buckets[slot];
        if bucket.is_empty() {
            self.touched.push(slot);
        }
        bucket.push(ClassifiedHit::new(*hit, geometry));
        self.num_hits += 1;
        Ok(())
    }

    /// Number of hits added since the last reset.
    #[must_use]
    pub fn num_hits(&self) -> usize {
        self.num_hits
    }

    /// Returns true if no hit was added since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_hits == 0
    }

    /// Stations and technologies of every bucketed hit.
    #[must_use]
    pub fn station_coverage(&self) -> StationCoverage {
        self.touched
            .iter()
            .flat_map(|&slot| &self.buckets[slot])
            .fold(StationCoverage::default(), |mut cov, hit| {
                let station = hit.primitive.station;
                cov.min_station = cov.min_station.min(station);
                cov.max_station = cov.max_station.max(station);
                match hit.subsystem() {
                    Subsystem::Csc => cov.has_csc = true,
                    Subsystem::Me0 => cov.has_me0 = true,
                    _ => {}
                }
                cov
            })
    }

    /// Surviving hits as feature vectors in (bx, chamber) order.
    ///
    /// # Errors
    /// Returns an error if a CSC bucket holds other than 1, 2 or 4 hits, or
    /// a non-CSC bucket other than ME0 exceeds its occupancy limit.
    pub fn get_hits(&self) -> Result<Vec<[i32; NUM_FEATURES]>> {
        let mut out = Vec::with_capacity(self.num_hits);
        for bucket in self.buckets.iter().filter(|b| !b.is_empty()) {
            match self.config.mode {
                DedupMode::Simulation => out.push(select_representative(bucket).features()),
                DedupMode::TriggerPrimitive => {
                    let chamber = bucket[0].chamber();
                    if chamber < NUM_CSC_CHAMBERS {
                        remove_csc_ghosts(bucket, &mut out)?;
                    } else {
                        keep_all(bucket, &mut out)?;
                    }
                }
            }
        }
        Ok(out)
    }

    fn slot(&self, bx: i8, chamber: u8) -> Result<usize> {
        let (min, max) = (self.config.bx_min, self.config.bx_max);
        if !(min..=max).contains(&bx) {
            return Err(Error::BxOutOfRange { bx, min, max });
        }
        if usize::from(chamber) >= NUM_CHAMBERS {
            return Err(Error::UnknownChamber(i32::from(chamber)));
        }
        let bx_offset = usize::try_from(i32::from(bx) - i32::from(min))
            .map_err(|_| Error::BxOutOfRange { bx, min, max })?;
        Ok(bx_offset * NUM_CHAMBERS + usize::from(chamber))
    }
}

/// Sorts by sublayer (stable) and picks the first RPC/GEM hit or the lower
/// median otherwise.
fn select_representative(bucket: &[ClassifiedHit]) -> ClassifiedHit {
    if bucket.len() == 1 {
        return bucket[0];
    }
    let mut sorted = bucket.to_vec();
    sorted.sort_by_key(ClassifiedHit::detlayer);
    let index = match sorted[0].subsystem() {
        Subsystem::Rpc | Subsystem::Gem => 0,
        Subsystem::Csc | Subsystem::Me0 | Subsystem::Dt => (sorted.len() - 1) / 2,
    };
    sorted[index]
}

/// Keeps the (phi_min, theta_min) and (phi_max, theta_max) primitives of a
/// CSC chamber. Each survivor records the opposite theta extreme.
fn remove_csc_ghosts(bucket: &[ClassifiedHit], out: &mut Vec<[i32; NUM_FEATURES]>) -> Result<()> {
    let first = &bucket[0];
    if !matches!(bucket.len(), 1 | 2 | 4) {
        return Err(Error::CscOccupancy {
            chamber: first.chamber(),
            bx: first.primitive.bx,
            hits: bucket.len(),
        });
    }

    let (phi_min, phi_max, theta_min, theta_max) = bucket.iter().fold(
        (i32::MAX, i32::MIN, i32::MAX, i32::MIN),
        |(pmin, pmax, tmin, tmax), hit| {
            (
                pmin.min(hit.phi()),
                pmax.max(hit.phi()),
                tmin.min(hit.theta()),
                tmax.max(hit.theta()),
            )
        },
    );

    let mut segment = 0;
    for hit in bucket {
        let theta_alt = if hit.phi() == phi_min && hit.theta() == theta_min {
            theta_max
        } else if hit.phi() == phi_max && hit.theta() == theta_max {
            theta_min
        } else {
            continue;
        };
        let mut kept = *hit;
        kept.theta_alt = theta_alt;
        kept.segment = segment;
        out.push(kept.features());
        segment += 1;

        if phi_min == phi_max || segment == MAX_CSC_SEGMENTS {
            break;
        }
    }
    Ok(())
}

/// Keeps every primitive of a non-CSC chamber after the occupancy check.
fn keep_all(bucket: &[ClassifiedHit], out: &mut Vec<[i32; NUM_FEATURES]>) -> Result<()> {
    let first = &bucket[0];
    let chamber = first.chamber();
    let class = ChamberClass::of(chamber).ok_or(Error::UnknownChamber(i32::from(chamber)))?;
    let limit = class.max_hits();
    if bucket.len() > limit {
        if class == ChamberClass::Me0 {
            log::warn!(
                "chamber {chamber} at bx {} has {} hits (limit {limit})",
                first.primitive.bx,
                bucket.len()
            );
        } else {
            return Err(Error::ChamberOccupancy {
                chamber,
                bx: first.primitive.bx,
                hits: bucket.len(),
                limit,
            });
        }
    }

    for (segment, hit) in (0..).zip(bucket) {
        let mut kept = *hit;
        kept.segment = segment;
        out.push(kept.features());
    }
    Ok(())
}
