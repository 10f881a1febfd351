#![allow(clippy::uninlined_format_args)]
use approx::assert_relative_eq;
use emtfprep_algorithms::{
    run_background_partitioned, run_signal_partitioned, EventPipeline, PipelineConfig,
    TableGeometry,
};
use emtfprep_core::{Event, Particle, SimHit, Subsystem, TriggerPrimitive, FEATURE_NAMES};

fn col(name: &str) -> usize {
    FEATURE_NAMES.iter().position(|n| *n == name).unwrap()
}

fn primitive(
    subsystem: Subsystem,
    station: i8,
    ring: i8,
    endcap: i8,
    sector: i8,
    subsector: i8,
    cscid: i16,
) -> TriggerPrimitive {
    let mut hit = TriggerPrimitive::new(subsystem, station, ring, endcap, sector);
    hit.subsector = subsector;
    hit.cscid = cscid;
    hit.emtf_theta = 30;
    hit
}

fn simhit(station: i8, ring: i8, chamber: i16) -> SimHit {
    SimHit {
        subsystem: Subsystem::Csc,
        station,
        ring,
        chamber,
        layer: 0,
        phi: 200f64.to_radians(),
        theta: 20f64.to_radians(),
        z: 700.0,
    }
}

fn particle() -> Particle {
    Particle {
        pt: 30.0,
        invpt: 1.0 / 30.0,
        eta: 1.6,
        phi: 3.5,
        ..Particle::default()
    }
}

/// Hits in end-sector 3 (ME1/1, ME2/1, RE1/2) and end-sector 7 (ME4/1).
fn two_sector_event() -> Event {
    Event {
        hits: vec![
            primitive(Subsystem::Csc, 4, 1, -1, 2, 0, 1),
            primitive(Subsystem::Csc, 1, 1, 1, 4, 1, 1),
            primitive(Subsystem::Rpc, 1, 2, 1, 4, 1, 4),
            primitive(Subsystem::Csc, 2, 1, 1, 4, 0, 1),
        ],
        // ME1/2 chamber 22 and ME2/1 chamber 11, both in sector 4.
        simhits: vec![simhit(1, 2, 22), simhit(2, 1, 11)],
        particles: vec![particle()],
    }
}

#[test]
fn test_best_sector_end_to_end() {
    let geometry = TableGeometry::default();
    let mut pipeline = EventPipeline::new(&geometry, PipelineConfig::default());
    let out = pipeline.run_signal(&[two_sector_event()]).unwrap();

    assert_eq!(out.len(), 1);
    assert_relative_eq!(out.part[0][0], 1.0 / 30.0);
    assert_relative_eq!(out.part[0][7], 3.0);
    assert_relative_eq!(out.part[0][8], 2.0);

    let chambers: Vec<_> = out
        .hits
        .row_records(0)
        .unwrap()
        .map(|r| r[col("emtf_chamber")])
        .collect();
    assert_eq!(chambers, vec![0, 18, 57]);

    let hosts: Vec<_> = out
        .simhits
        .row_records(0)
        .unwrap()
        .map(|r| r[col("emtf_host")])
        .collect();
    assert_eq!(hosts, vec![1, 3]);
    assert_eq!(out.stats.rejected_coverage, 0);
}

#[test]
fn test_station_rule_keeps_row_but_empties_it() {
    let geometry = TableGeometry::default();
    let mut event = two_sector_event();
    event.simhits.truncate(1);

    let mut pipeline = EventPipeline::new(&geometry, PipelineConfig::default());
    let out = pipeline.run_signal(&[event.clone()]).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out.hits.num_rows(), 1);
    assert_eq!(out.simhits.num_rows(), 1);
    assert_eq!(out.hits.row(0).map(<[i32]>::len), Some(0));
    assert_eq!(out.simhits.row(0).map(<[i32]>::len), Some(0));
    assert_eq!(out.stats.rejected_coverage, 1);

    let config = PipelineConfig::default().with_require_two_stations(false);
    let mut pipeline = EventPipeline::new(&geometry, config);
    let out = pipeline.run_signal(&[event]).unwrap();
    assert_eq!(out.hits.row_records(0).map(Iterator::count), Some(3));
}

#[test]
fn test_signal_rows_stay_aligned() {
    let geometry = TableGeometry::default();
    let events = vec![two_sector_event(), Event::default(), two_sector_event()];
    let mut pipeline = EventPipeline::new(&geometry, PipelineConfig::default());
    let out = pipeline.run_signal(&events).unwrap();

    assert_eq!(out.stats.events_read, 3);
    assert_eq!(out.stats.skipped_no_particle, 1);
    assert_eq!(out.part.len(), 2);
    assert_eq!(out.hits.num_rows(), 2);
    assert_eq!(out.simhits.num_rows(), 2);
    assert_eq!(out.hits.row(0), out.hits.row(1));
}

#[test]
fn test_fatal_error_aborts_run() {
    let geometry = TableGeometry::default();
    let mut event = two_sector_event();
    let me11 = primitive(Subsystem::Csc, 1, 1, 1, 4, 1, 1);
    event.hits.extend([me11, me11]);

    let mut pipeline = EventPipeline::new(&geometry, PipelineConfig::default());
    assert!(pipeline.run_signal(&[event]).is_err());
}

fn mixed_events() -> Vec<Event> {
    (0..9)
        .map(|i| {
            let mut event = two_sector_event();
            match i % 3 {
                0 => {}
                1 => event.particles.clear(),
                _ => {
                    event.simhits.truncate(1);
                    event.hits.rotate_left(i % 4);
                }
            }
            event
        })
        .collect()
}

#[test]
fn test_partitioned_signal_matches_sequential() {
    let geometry = TableGeometry::default();
    let config = PipelineConfig::default();
    let events = mixed_events();

    let sequential = EventPipeline::new(&geometry, config.clone())
        .run_signal(&events)
        .unwrap();
    for partitions in [1, 2, 4, 16] {
        let parallel = run_signal_partitioned(&geometry, &config, &events, partitions).unwrap();
        assert_eq!(parallel.part, sequential.part);
        assert_eq!(parallel.hits, sequential.hits);
        assert_eq!(parallel.simhits, sequential.simhits);
        assert_eq!(parallel.stats, sequential.stats);
    }
}

#[test]
fn test_partitioned_background_matches_sequential() {
    let geometry = TableGeometry::default();
    let config = PipelineConfig::default().with_job_id(4).with_max_events(Some(7));
    let events = mixed_events();

    let sequential = EventPipeline::new(&geometry, config.clone())
        .run_background(&events)
        .unwrap();
    // Only events 1 and 4 lack the in-time zone-2 particle.
    assert_eq!(sequential.stats.vetoed, 5);
    assert_eq!(sequential.len(), 2 * 12);
    assert_eq!(sequential.aux[13], [4, 4, 1]);

    let parallel = run_background_partitioned(&geometry, &config, &events, 3).unwrap();
    assert_eq!(parallel.aux, sequential.aux);
    assert_eq!(parallel.hits, sequential.hits);
    assert_eq!(parallel.stats, sequential.stats);
}

#[test]
fn test_background_rows_per_sector() {
    let geometry = TableGeometry::default();
    let mut event = two_sector_event();
    event.particles.clear();
    let mut pipeline = EventPipeline::new(&geometry, PipelineConfig::default());
    let out = pipeline.run_background(&[event]).unwrap();

    let lengths: Vec<_> = out.hits.row_lengths().collect();
    assert_eq!(lengths, vec![0, 0, 0, 3, 0, 0, 0, 1, 0, 0, 0, 0]);
    let sectors: Vec<_> = out.aux.iter().map(|aux| aux[2]).collect();
    assert_eq!(sectors, (0..12).collect::<Vec<_>>());
}

#[test]
fn test_wide_legit_window_fits_arena() {
    let geometry = TableGeometry::from_json(r#"{"bx_window": [-4, 0]}"#).unwrap();
    let mut event = two_sector_event();
    event.hits[3].bx = -4;

    let mut pipeline = EventPipeline::new(&geometry, PipelineConfig::default());
    let out = pipeline.run_signal(&[event.clone()]).unwrap();
    let records: Vec<_> = out
        .hits
        .row_records(0)
        .unwrap()
        .map(|r| (r[col("bx")], r[col("emtf_chamber")]))
        .collect();
    assert_eq!(records, vec![(-4, 18), (0, 0), (0, 57)]);

    let parallel =
        run_signal_partitioned(&geometry, &PipelineConfig::default(), &[event], 2).unwrap();
    assert_eq!(parallel.hits, out.hits);
}

fn me0_simhit(chamber: i16) -> SimHit {
    SimHit {
        subsystem: Subsystem::Me0,
        ..simhit(1, 1, chamber)
    }
}

#[test]
fn test_me0_and_me1_admitted() {
    let geometry = TableGeometry::default();
    let mut event = two_sector_event();
    // Detector chamber 12 is sector chamber 23, inside sector 4.
    event.simhits = vec![me0_simhit(12), simhit(1, 2, 22)];

    let mut pipeline = EventPipeline::new(&geometry, PipelineConfig::default());
    let out = pipeline.run_signal(&[event.clone()]).unwrap();
    assert_eq!(out.stats.rejected_coverage, 0);
    let hosts: Vec<_> = out
        .simhits
        .row_records(0)
        .unwrap()
        .map(|r| (r[col("emtf_host")], r[col("emtf_chamber")]))
        .collect();
    assert_eq!(hosts, vec![(1, 4), (18, 110)]);
    assert_eq!(out.hits.row_records(0).map(Iterator::count), Some(3));

    // ME0 alone covers a single station.
    event.simhits.truncate(1);
    let out = pipeline.run_signal(&[event.clone()]).unwrap();
    assert_eq!(out.stats.rejected_coverage, 1);

    // Detector chamber 6 is sector chamber 11, in sector 2.
    event.simhits = vec![me0_simhit(6), simhit(1, 2, 22)];
    let out = pipeline.run_signal(&[event]).unwrap();
    assert_eq!(out.stats.rejected_coverage, 1);
    assert_eq!(out.simhits.row(0).map(<[i32]>::len), Some(0));
}
