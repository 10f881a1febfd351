#![allow(clippy::uninlined_format_args)]
use emtfprep_algorithms::{
    AggregatorConfig, ChamberAggregator, SectorRanking, TableGeometry,
};
use emtfprep_core::{Error, Subsystem, TriggerPrimitive, FEATURE_NAMES, NUM_FEATURES};

fn col(name: &str) -> usize {
    FEATURE_NAMES.iter().position(|n| *n == name).unwrap()
}

/// ME2/1 primitive in sector 1 (chamber 18).
fn csc(phi: i32, theta: i32) -> TriggerPrimitive {
    let mut hit = TriggerPrimitive::new(Subsystem::Csc, 2, 1, 1, 1);
    hit.cscid = 1;
    hit.emtf_phi = phi;
    hit.emtf_theta = theta;
    hit
}

fn aggregate(hits: &[TriggerPrimitive], config: AggregatorConfig) -> Vec<[i32; NUM_FEATURES]> {
    let geometry = TableGeometry::default();
    let mut agg = ChamberAggregator::new(&geometry, config);
    for hit in hits {
        agg.add(hit).unwrap();
    }
    agg.get_hits().unwrap()
}

#[test]
fn test_csc_ghosts_removed() {
    let hits = [csc(10, 8), csc(10, 5), csc(20, 5), csc(20, 8)];
    let out = aggregate(&hits, AggregatorConfig::default());

    assert_eq!(out.len(), 2);
    assert_eq!((out[0][col("emtf_phi")], out[0][col("emtf_theta")]), (10, 5));
    assert_eq!((out[1][col("emtf_phi")], out[1][col("emtf_theta")]), (20, 8));
    assert_eq!(out[0][col("emtf_segment")], 0);
    assert_eq!(out[1][col("emtf_segment")], 1);
    assert_eq!(out[0][col("emtf_theta_alt")], 8);
    assert_eq!(out[1][col("emtf_theta_alt")], 5);
}

#[test]
fn test_csc_coincident_phi_keeps_one() {
    let out = aggregate(&[csc(10, 5), csc(10, 8)], AggregatorConfig::default());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0][col("emtf_theta")], 5);
    assert_eq!(out[0][col("emtf_theta_alt")], 8);

    let out = aggregate(&[csc(10, 8), csc(10, 5)], AggregatorConfig::default());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0][col("emtf_theta")], 8);
    assert_eq!(out[0][col("emtf_theta_alt")], 5);
}

#[test]
fn test_re12_occupancy_is_fatal() {
    let geometry = TableGeometry::default();
    let mut agg = ChamberAggregator::new(&geometry, AggregatorConfig::default());
    for _ in 0..3 {
        let mut hit = TriggerPrimitive::new(Subsystem::Rpc, 1, 2, 1, 1);
        hit.subsector = 1;
        hit.cscid = 4;
        agg.add(&hit).unwrap();
    }
    assert_eq!(
        agg.get_hits().unwrap_err(),
        Error::ChamberOccupancy {
            chamber: 57,
            bx: 0,
            hits: 3,
            limit: 2
        }
    );
}

#[test]
fn test_me0_overrun_is_kept() {
    let hits: Vec<_> = (0..25)
        .map(|i| {
            let mut hit = TriggerPrimitive::new(Subsystem::Me0, 1, 1, 1, 1);
            hit.cscid = 1;
            hit.emtf_phi = i;
            hit
        })
        .collect();
    let out = aggregate(&hits, AggregatorConfig::default());
    assert_eq!(out.len(), 25);
    for (i, row) in out.iter().enumerate() {
        assert_eq!(row[col("emtf_chamber")], 108);
        assert_eq!(row[col("emtf_segment")], i32::try_from(i).unwrap());
    }
}

#[test]
fn test_buckets_in_bx_chamber_order() {
    let mut late = csc(1, 1);
    late.cscid = 2; // chamber 19
    let mut early = TriggerPrimitive::new(Subsystem::Csc, 3, 1, 1, 1);
    early.cscid = 4; // chamber 30
    early.bx = -1;
    let mut me11 = TriggerPrimitive::new(Subsystem::Csc, 1, 1, 1, 1);
    me11.subsector = 1;
    me11.cscid = 1; // chamber 0

    let out = aggregate(&[late, early, me11], AggregatorConfig::default());
    let keys: Vec<_> = out
        .iter()
        .map(|row| (row[col("bx")], row[col("emtf_chamber")]))
        .collect();
    assert_eq!(keys, vec![(-1, 30), (0, 0), (0, 19)]);
}

#[test]
fn test_simulation_keeps_median_csc() {
    let hits: Vec<_> = [5, 1, 3, 2]
        .into_iter()
        .map(|layer| {
            let mut hit = csc(layer * 10, 20);
            hit.layer = layer;
            hit
        })
        .collect();
    let out = aggregate(&hits, AggregatorConfig::simulation());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0][col("detlayer")], 2);
    assert_eq!(out[0][col("emtf_segment")], 0);

    // Odd count: exact median.
    let out = aggregate(&hits[..3], AggregatorConfig::simulation());
    assert_eq!(out[0][col("detlayer")], 3);
}

#[test]
fn test_simulation_never_checks_occupancy() {
    let hits = [csc(1, 1), csc(2, 2), csc(3, 3)];
    let out = aggregate(&hits, AggregatorConfig::simulation());
    assert_eq!(out.len(), 1);
}

#[test]
fn test_ranking_is_order_independent() {
    let geometry = TableGeometry::default();
    let hits = [
        TriggerPrimitive::new(Subsystem::Csc, 1, 1, 1, 4),
        TriggerPrimitive::new(Subsystem::Csc, 2, 2, 1, 4),
        TriggerPrimitive::new(Subsystem::Rpc, 3, 1, -1, 2),
        TriggerPrimitive::new(Subsystem::Me0, 1, 1, 1, 4),
        TriggerPrimitive::new(Subsystem::Gem, 1, 1, -1, 6),
        TriggerPrimitive::new(Subsystem::Csc, 4, 1, -1, 2),
    ];

    let ranks_of = |order: &[usize]| {
        let mut ranking = SectorRanking::new(&geometry);
        for &i in order {
            ranking.add(&hits[i]).unwrap();
        }
        (*ranking.ranks(), ranking.best_sector())
    };

    let forward = ranks_of(&[0, 1, 2, 3, 4, 5]);
    assert_eq!(forward, ranks_of(&[5, 4, 3, 2, 1, 0]));
    assert_eq!(forward, ranks_of(&[2, 0, 5, 3, 1, 4]));
    assert_eq!(forward.0[3], 0b0000_1011);
    assert_eq!(forward.0[7], 0b1010_0000);
    assert_eq!(forward.0[11], 0b0100_0000);
    assert_eq!(forward.1 .0.index(), 7);
}
