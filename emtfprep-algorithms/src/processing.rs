//! Event pipeline for the signal and background preparations.
//!
//! A signal event yields one particle row, one hit row and one simhit row
//! for its best end-sector. A background event yields one aux row and one
//! hit row per end-sector. Rows of every output stay in event order, so the
//! partitioned runners concatenate per-partition outputs in partition order.
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use crate::aggregator::{AggregatorConfig, ChamberAggregator};
use crate::ranking::SectorRanking;
use crate::simhits::route_simhit;
use emtfprep_core::{
    EndSector, Event, GeometryClassifier, Particle, RaggedArray, Result, TriggerPrimitive,
    NUM_FEATURES,
};
use rayon::prelude::*;

/// Number of fields in a particle row.
pub const NUM_PART_FIELDS: usize = 9;

/// Number of fields in a background aux row.
pub const NUM_AUX_FIELDS: usize = 3;

/// Pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Job id written to the aux rows.
    pub job_id: i32,
    /// Maximum number of events read; `None` reads all.
    pub max_events: Option<usize>,
    /// Drop the rows of signal events whose simhits cover fewer than two
    /// stations.
    pub require_two_stations: bool,
    /// Log progress every this many events.
    pub progress_interval: usize,
    /// Lowest bx of the chamber arenas.
    pub bx_min: i8,
    /// Highest bx of the chamber arenas.
    pub bx_max: i8,
    /// Background events with an in-time particle above this pT (GeV) in a
    /// veto zone are dropped.
    pub veto_min_pt: f64,
    /// Highest particle zone that triggers the background veto.
    pub veto_max_zone: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_id: 0,
            max_events: None,
            require_two_stations: true,
            progress_interval: 1000,
            bx_min: -3,
            bx_max: 3,
            veto_min_pt: 14.0,
            veto_max_zone: 3,
        }
    }
}

impl PipelineConfig {
    /// Sets the job id.
    #[must_use]
    pub fn with_job_id(mut self, job_id: i32) -> Self {
        self.job_id = job_id;
        self
    }

    /// Sets the event cap.
    #[must_use]
    pub fn with_max_events(mut self, max_events: Option<usize>) -> Self {
        self.max_events = max_events;
        self
    }

    /// Enables or disables the station coverage rule.
    #[must_use]
    pub fn with_require_two_stations(mut self, require: bool) -> Self {
        self.require_two_stations = require;
        self
    }

    /// Sets the progress interval (clamped to at least 1).
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Sets the arena bx window. An inverted window collapses onto `bx_min`.
    /// The pipeline widens it to cover the legit window of its geometry.
    #[must_use]
    pub fn with_bx_range(mut self, bx_min: i8, bx_max: i8) -> Self {
        self.bx_min = bx_min;
        self.bx_max = bx_max.max(bx_min);
        self
    }

    /// Sets the background veto thresholds.
    #[must_use]
    pub fn with_veto(mut self, min_pt: f64, max_zone: u8) -> Self {
        self.veto_min_pt = min_pt;
        self.veto_max_zone = max_zone;
        self
    }

    /// Arena configuration covering both the configured range and the
    /// legit window, so no legit primitive falls outside the arena.
    fn aggregator(&self, legit_window: Option<(i8, i8)>) -> AggregatorConfig {
        let (bx_min, bx_max) = legit_window.map_or((self.bx_min, self.bx_max), |(lo, hi)| {
            (self.bx_min.min(lo), self.bx_max.max(hi))
        });
        AggregatorConfig::default().with_bx_range(bx_min, bx_max)
    }

    fn take(&self, events: &[Event]) -> usize {
        self.max_events.map_or(events.len(), |max| max.min(events.len()))
    }
}

/// Event counters of one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStatistics {
    /// Events read, including skipped and vetoed ones.
    pub events_read: usize,
    /// Events that produced output rows.
    pub events_written: usize,
    /// Signal events without a truth particle.
    pub skipped_no_particle: usize,
    /// Signal events written with empty rows by the station rule.
    pub rejected_coverage: usize,
    /// Background events dropped by the particle veto.
    pub vetoed: usize,
    /// Hit records written.
    pub hits_written: usize,
    /// Simhit records written.
    pub simhits_written: usize,
}

impl RunStatistics {
    /// Adds the counters of another run.
    pub fn merge(&mut self, other: &Self) {
        self.events_read += other.events_read;
        self.events_written += other.events_written;
        self.skipped_no_particle += other.skipped_no_particle;
        self.rejected_coverage += other.rejected_coverage;
        self.vetoed += other.vetoed;
        self.hits_written += other.hits_written;
        self.simhits_written += other.simhits_written;
    }
}

/// Output of the signal preparation.
#[derive(Clone, Debug)]
pub struct SignalOutput {
    /// invpt, eta, phi, vx, vy, vz, d0, best end-sector, particle zone.
    pub part: Vec<[f32; NUM_PART_FIELDS]>,
    /// Trigger primitive features, one row per event.
    pub hits: RaggedArray<i32>,
    /// Simhit features, one row per event.
    pub simhits: RaggedArray<i32>,
    /// Run counters.
    pub stats: RunStatistics,
}

impl Default for SignalOutput {
    fn default() -> Self {
        Self {
            part: Vec::new(),
            hits: RaggedArray::new(NUM_FEATURES),
            simhits: RaggedArray::new(NUM_FEATURES),
            stats: RunStatistics::default(),
        }
    }
}

impl SignalOutput {
    /// Number of events written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.part.len()
    }

    /// Returns true if no row was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.part.is_empty()
    }

    /// Appends the rows of `other` after the rows of `self`.
    ///
    /// # Errors
    /// Returns an error if the feature widths differ.
    pub fn append(&mut self, other: &Self) -> Result<()> {
        self.part.extend_from_slice(&other.part);
        self.hits.concat(&other.hits)?;
        self.simhits.concat(&other.simhits)?;
        self.stats.merge(&other.stats);
        Ok(())
    }
}

/// Output of the background preparation.
#[derive(Clone, Debug)]
pub struct BackgroundOutput {
    /// job id, event index, end-sector.
    pub aux: Vec<[i32; NUM_AUX_FIELDS]>,
    /// Trigger primitive features, one row per (event, end-sector).
    pub hits: RaggedArray<i32>,
    /// Run counters.
    pub stats: RunStatistics,
}

impl Default for BackgroundOutput {
    fn default() -> Self {
        Self {
            aux: Vec::new(),
            hits: RaggedArray::new(NUM_FEATURES),
            stats: RunStatistics::default(),
        }
    }
}

impl BackgroundOutput {
    /// Number of rows written (12 per kept event).
    #[must_use]
    pub fn len(&self) -> usize {
        self.aux.len()
    }

    /// Returns true if no row was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aux.is_empty()
    }

    /// Appends the rows of `other` after the rows of `self`.
    ///
    /// # Errors
    /// Returns an error if the feature widths differ.
    pub fn append(&mut self, other: &Self) -> Result<()> {
        self.aux.extend_from_slice(&other.aux);
        self.hits.concat(&other.hits)?;
        self.stats.merge(&other.stats);
        Ok(())
    }
}

/// Per-event orchestration of ranking and aggregation.
pub struct EventPipeline<'g, G: GeometryClassifier + ?Sized> {
    geometry: &'g G,
    config: PipelineConfig,
    ranking: SectorRanking<'g, G>,
    chambers: ChamberAggregator<'g, G>,
    chambers_sim: ChamberAggregator<'g, G>,
    legit: Vec<TriggerPrimitive>,
}

impl<'g, G: GeometryClassifier + ?Sized> EventPipeline<'g, G> {
    /// Create a pipeline with fresh ranking and aggregation state.
    pub fn new(geometry: &'g G, config: PipelineConfig) -> Self {
        let aggregator = config.aggregator(geometry.legit_bx_window());
        let simulation =
            AggregatorConfig::simulation().with_bx_range(aggregator.bx_min, aggregator.bx_max);
        Self {
            geometry,
            ranking: SectorRanking::new(geometry),
            chambers: ChamberAggregator::new(geometry, aggregator),
            chambers_sim: ChamberAggregator::new(geometry, simulation),
            legit: Vec::new(),
            config,
        }
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the signal preparation over `events`.
    ///
    /// # Errors
    /// Returns the first classification or occupancy error.
    pub fn run_signal(&mut self, events: &[Event]) -> Result<SignalOutput> {
        let mut out = SignalOutput::default();
        let n = self.config.take(events);
        self.accumulate_signal(0, &events[..n], &mut out)?;
        log_summary("signal", &out.stats);
        Ok(out)
    }

    /// Runs the background preparation over `events`.
    ///
    /// # Errors
    /// Returns the first classification or occupancy error.
    pub fn run_background(&mut self, events: &[Event]) -> Result<BackgroundOutput> {
        let mut out = BackgroundOutput::default();
        let n = self.config.take(events);
        self.accumulate_background(0, &events[..n], &mut out)?;
        log_summary("background", &out.stats);
        Ok(out)
    }

    /// Processes signal events whose first index is `first_index`,
    /// appending their rows to `out`.
    ///
    /// # Errors
    /// Returns the first classification or occupancy error.
    pub fn accumulate_signal(
        &mut self,
        first_index: usize,
        events: &[Event],
        out: &mut SignalOutput,
    ) -> Result<()> {
        for (index, event) in (first_index..).zip(events) {
            self.log_progress(index);
            out.stats.events_read += 1;

            self.ranking.reset();
            self.chambers.reset();
            self.chambers_sim.reset();

            // Particle gun: one particle per event.
            let Some(particle) = event.particles.first() else {
                log::debug!("event {index}: no particle, skipped");
                out.stats.skipped_no_particle += 1;
                continue;
            };

            let geometry = self.geometry;
            self.legit.clear();
            self.legit.extend(event.hits.iter().filter(|h| geometry.is_legit(h)).map(|h| {
                let mut hit = *h;
                geometry.remap(&mut hit);
                hit
            }));

            for hit in &self.legit {
                self.ranking.add(hit)?;
            }
            let (best, rank) = self.ranking.best_sector();

            for hit in &self.legit {
                if hit.end_sector()? == best {
                    self.chambers.add(hit)?;
                }
            }
            for simhit in &event.simhits {
                if let Some(hit) = route_simhit(self.geometry, simhit, best) {
                    self.chambers_sim.add(&hit)?;
                }
            }

            let part = self.particle_info(particle, best);
            let mut hits = self.chambers.get_hits()?;
            let mut simhits = self.chambers_sim.get_hits()?;

            if self.config.require_two_stations
                && !self.chambers_sim.station_coverage().is_admissible()
            {
                log::debug!("event {index}: insufficient station coverage");
                out.stats.rejected_coverage += 1;
                hits.clear();
                simhits.clear();
            }

            log::debug!(
                "event {index}: best sector {best} rank {rank:#010b}, {} hits, {} simhits",
                hits.len(),
                simhits.len()
            );
            log::trace!("event {index}: hits {hits:?}");
            log::trace!("event {index}: simhits {simhits:?}");

            out.part.push(part);
            out.hits.append_records(&hits)?;
            out.simhits.append_records(&simhits)?;
            out.stats.events_written += 1;
            out.stats.hits_written += hits.len();
            out.stats.simhits_written += simhits.len();
        }
        Ok(())
    }

    /// Processes background events whose first index is `first_index`,
    /// appending one row per end-sector to `out`.
    ///
    /// # Errors
    /// Returns the first classification or occupancy error.
    pub fn accumulate_background(
        &mut self,
        first_index: usize,
        events: &[Event],
        out: &mut BackgroundOutput,
    ) -> Result<()> {
        for (index, event) in (first_index..).zip(events) {
            self.log_progress(index);
            out.stats.events_read += 1;

            if event.particles.iter().any(|p| self.is_vetoed(p)) {
                log::debug!("event {index}: vetoed");
                out.stats.vetoed += 1;
                continue;
            }

            let event_index = i32::try_from(index).unwrap_or(i32::MAX);
            for endsec in EndSector::all() {
                self.chambers.reset();
                for hit in event.hits.iter().filter(|h| self.geometry.is_legit(h)) {
                    if hit.end_sector()? == endsec {
                        self.chambers.add(hit)?;
                    }
                }
                let hits = self.chambers.get_hits()?;
                log::trace!("event {index}: sector {endsec} hits {hits:?}");

                let endsec_index = i32::try_from(endsec.index()).unwrap_or_default();
                out.aux.push([self.config.job_id, event_index, endsec_index]);
                out.hits.append_records(&hits)?;
                out.stats.hits_written += hits.len();
            }
            out.stats.events_written += 1;
        }
        Ok(())
    }

    fn particle_info(&self, particle: &Particle, best: EndSector) -> [f32; NUM_PART_FIELDS] {
        let etastar = self.geometry.etastar(particle);
        let zone = self
            .geometry
            .find_particle_zone(etastar)
            .map_or(-1.0, f32::from);
        [
            particle.invpt as f32,
            particle.eta as f32,
            particle.phi as f32,
            particle.vx as f32,
            particle.vy as f32,
            particle.vz as f32,
            particle.d0 as f32,
            best.index() as f32,
            zone,
        ]
    }

    fn is_vetoed(&self, particle: &Particle) -> bool {
        particle.bx == 0
            && particle.pt > self.config.veto_min_pt
            && self
                .geometry
                .find_particle_zone(particle.eta)
                .is_some_and(|zone| zone <= self.config.veto_max_zone)
    }

    fn log_progress(&self, index: usize) {
        if index % self.config.progress_interval.max(1) == 0 {
            log::info!("Processing event {index}");
        }
    }
}

fn log_summary(analysis: &str, stats: &RunStatistics) {
    log::info!(
        "{analysis}: read {} events, wrote {} ({} hits, {} simhits); \
         {} without particle, {} below station coverage, {} vetoed",
        stats.events_read,
        stats.events_written,
        stats.hits_written,
        stats.simhits_written,
        stats.skipped_no_particle,
        stats.rejected_coverage,
        stats.vetoed
    );
}

fn partition_size(len: usize, partitions: usize) -> usize {
    len.div_ceil(partitions.max(1)).max(1)
}

/// Runs the signal preparation over contiguous partitions of `events` on
/// the rayon pool. The output equals [`EventPipeline::run_signal`].
///
/// # Errors
/// Returns the first error of any partition.
pub fn run_signal_partitioned<G: GeometryClassifier + ?Sized>(
    geometry: &G,
    config: &PipelineConfig,
    events: &[Event],
    partitions: usize,
) -> Result<SignalOutput> {
    let events = &events[..config.take(events)];
    let chunk = partition_size(events.len(), partitions);

    let parts: Vec<SignalOutput> = events
        .par_chunks(chunk)
        .enumerate()
        .map(|(i, chunk_events)| {
            let mut pipeline = EventPipeline::new(geometry, config.clone());
            let mut out = SignalOutput::default();
            pipeline.accumulate_signal(i * chunk, chunk_events, &mut out)?;
            Ok(out)
        })
        .collect::<Result<_>>()?;

    let mut out = SignalOutput::default();
    for part in &parts {
        out.append(part)?;
    }
    log_summary("signal", &out.stats);
    Ok(out)
}

/// Runs the background preparation over contiguous partitions of `events`
/// on the rayon pool. The output equals [`EventPipeline::run_background`].
///
/// # Errors
/// Returns the first error of any partition.
pub fn run_background_partitioned<G: GeometryClassifier + ?Sized>(
    geometry: &G,
    config: &PipelineConfig,
    events: &[Event],
    partitions: usize,
) -> Result<BackgroundOutput> {
    let events = &events[..config.take(events)];
    let chunk = partition_size(events.len(), partitions);

    let parts: Vec<BackgroundOutput> = events
        .par_chunks(chunk)
        .enumerate()
        .map(|(i, chunk_events)| {
            let mut pipeline = EventPipeline::new(geometry, config.clone());
            let mut out = BackgroundOutput::default();
            pipeline.accumulate_background(i * chunk, chunk_events, &mut out)?;
            Ok(out)
        })
        .collect::<Result<_>>()?;

    let mut out = BackgroundOutput::default();
    for part in &parts {
        out.append(part)?;
    }
    log_summary("background", &out.stats);
    Ok(out)
}
