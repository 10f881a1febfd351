//! Conversion of simulated hits into sector-local primitives.

use emtfprep_core::sector::{next_sector, prev_sector};
use emtfprep_core::trigger::{
    phi_loc_int, theta_int, trigger_cscid, trigger_neighid, trigger_sector, trigger_subsector,
};
use emtfprep_core::{EndSector, GeometryClassifier, SimHit, Subsystem, TriggerPrimitive};

/// Local phi above which an ME0 hit of the previous sector also belongs to
/// the next one. ME0 chambers start 5 degrees earlier than CSC chambers.
const ME0_SHARED_PHI: i32 = (55 + 22) * 60;

/// Converts a simulated hit into a primitive local to `best`.
///
/// Legit hits are remapped by the geometry before the sector formulas run.
/// Returns `None` when the hit is not legit, or when it belongs to another
/// end-sector and is not shared with `best` as a neighbor.
#[must_use]
pub fn route_simhit<G: GeometryClassifier + ?Sized>(
    geometry: &G,
    simhit: &SimHit,
    best: EndSector,
) -> Option<TriggerPrimitive> {
    let endcap = if simhit.z >= 0.0 { 1 } else { -1 };
    let mut hit = TriggerPrimitive::new(simhit.subsystem, simhit.station, simhit.ring, endcap, 1);
    hit.chamber = simhit.chamber;
    hit.layer = simhit.layer;
    if !geometry.is_legit(&hit) {
        return None;
    }
    geometry.remap(&mut hit);

    let (ring, station, chamber) = (hit.ring, hit.station, hit.chamber);
    hit.sector = trigger_sector(ring, station, chamber);
    hit.subsector = trigger_subsector(station, chamber);
    hit.cscid = trigger_cscid(ring, station, chamber);

    hit.emtf_phi = phi_loc_int(simhit.phi.to_degrees(), best.sector());
    hit.emtf_theta = theta_int(simhit.theta.to_degrees(), best.endcap());

    let in_best = |sector: i8| EndSector::from_endcap_sector(endcap, sector).ok() == Some(best);
    if in_best(hit.sector) {
        hit.neighbor = 0;
        Some(hit)
    } else if in_best(next_sector(hit.sector)) {
        (trigger_neighid(ring, station, chamber) == 1).then(|| {
            hit.neighbor = 1;
            hit.sector = next_sector(hit.sector);
            hit
        })
    } else if in_best(prev_sector(hit.sector)) {
        (simhit.subsystem == Subsystem::Me0 && hit.emtf_phi >= ME0_SHARED_PHI).then(|| {
            hit.neighbor = 0;
            hit.sector = prev_sector(hit.sector);
            hit
        })
    } else {
        None
    }
}
