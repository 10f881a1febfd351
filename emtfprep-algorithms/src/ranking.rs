//! Per-event end-sector ranking.
//!
//! Each legit hit sets the layer-class bit of its host in the bitmask of
//! its end-sector. The end-sector with the largest bitmask wins; outer bits
//! (RPC/GEM rings) weigh more than inner CSC stations, and ME0 weighs least.

use emtfprep_core::geometry::host;
use emtfprep_core::{EndSector, Error, GeometryClassifier, Result, TriggerPrimitive};
use emtfprep_core::{NUM_END_SECTORS, NUM_HOSTS};

/// Layer-class bit of each host (indexed by host id).
const RANK_BIT_LUT: [u8; NUM_HOSTS] = {
    let mut lut = [0u8; NUM_HOSTS];
    lut[host::ME0 as usize] = 0;
    lut[host::ME1_1 as usize] = 1;
    lut[host::ME1_2 as usize] = 2;
    lut[host::ME1_3 as usize] = 2;
    lut[host::ME2_1 as usize] = 3;
    lut[host::ME2_2 as usize] = 3;
    lut[host::ME3_1 as usize] = 4;
    lut[host::ME3_2 as usize] = 4;
    lut[host::ME4_1 as usize] = 5;
    lut[host::ME4_2 as usize] = 5;
    lut[host::GE1_1 as usize] = 6;
    lut[host::RE1_2 as usize] = 6;
    lut[host::RE1_3 as usize] = 6;
    lut[host::GE2_1 as usize] = 6;
    lut[host::RE2_2 as usize] = 6;
    lut[host::RE3_1 as usize] = 7;
    lut[host::RE3_2 as usize] = 7;
    lut[host::RE4_1 as usize] = 7;
    lut[host::RE4_2 as usize] = 7;
    lut
};

/// Layer-class bit position of a host, or `None` outside the host table.
#[inline]
#[must_use]
pub fn rank_bit(host: u8) -> Option<u8> {
    RANK_BIT_LUT.get(usize::from(host)).copied()
}

/// Accumulates the rank bitmask of every end-sector for one event.
pub struct SectorRanking<'g, G: GeometryClassifier + ?Sized> {
    geometry: &'g G,
    ranks: [u8; NUM_END_SECTORS],
}

impl<'g, G: GeometryClassifier + ?Sized> SectorRanking<'g, G> {
    /// Create an empty ranking bound to a geometry classifier.
    pub fn new(geometry: &'g G) -> Self {
        Self {
            geometry,
            ranks: [0; NUM_END_SECTORS],
        }
    }

    /// Zero every bitmask.
    pub fn reset(&mut self) {
        self.ranks = [0; NUM_END_SECTORS];
    }

    /// Sets the layer-class bit of `hit` in its end-sector.
    ///
    /// # Errors
    /// Returns an error if the hit has no host entry, an out-of-table host,
    /// or an invalid (endcap, sector).
    pub fn add(&mut self, hit: &TriggerPrimitive) -> Result<()> {
        let unknown = || Error::UnknownHost {
            subsystem: hit.subsystem.name(),
            station: hit.station,
            ring: hit.ring,
        };
        let host = self.geometry.find_host(hit).ok_or_else(unknown)?;
        let bit = rank_bit(host).ok_or_else(unknown)?;
        let endsec = hit.end_sector()?;
        self.ranks[endsec.index()] |= 1 << bit;
        Ok(())
    }

    /// Current bitmask of one end-sector.
    #[inline]
    #[must_use]
    pub fn rank(&self, endsec: EndSector) -> u8 {
        self.ranks[endsec.index()]
    }

    /// All bitmasks in end-sector order.
    #[must_use]
    pub fn ranks(&self) -> &[u8; NUM_END_SECTORS] {
        &self.ranks
    }

    /// End-sector with the largest bitmask and that bitmask.
    ///
    /// Ties go to the lowest end-sector index. With no hits added this is
    /// end-sector 0 with an empty mask.
    #[must_use]
    pub fn best_sector(&self) -> (EndSector, u8) {
        EndSector::all()
            .zip(self.ranks)
            .fold((EndSector::default(), 0), |best, (endsec, rank)| {
                if rank > best.1 {
                    (endsec, rank)
                } else {
                    best
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableGeometry;
    use emtfprep_core::Subsystem;

    fn hit(subsystem: Subsystem, station: i8, ring: i8, endcap: i8, sector: i8) -> TriggerPrimitive {
        TriggerPrimitive::new(subsystem, station, ring, endcap, sector)
    }

    #[test]
    fn test_rank_bits() {
        assert_eq!(rank_bit(host::ME0), Some(0));
        assert_eq!(rank_bit(host::ME1_1), Some(1));
        assert_eq!(rank_bit(host::ME1_3), Some(2));
        assert_eq!(rank_bit(host::ME4_2), Some(5));
        assert_eq!(rank_bit(host::GE2_1), Some(6));
        assert_eq!(rank_bit(host::RE4_2), Some(7));
        assert_eq!(rank_bit(19), None);
    }

    #[test]
    fn test_bitmask_accumulates() {
        let geometry = TableGeometry::default();
        let mut ranking = SectorRanking::new(&geometry);
        ranking.add(&hit(Subsystem::Csc, 1, 1, 1, 4)).unwrap();
        ranking.add(&hit(Subsystem::Csc, 2, 1, 1, 4)).unwrap();
        ranking.add(&hit(Subsystem::Csc, 2, 2, 1, 4)).unwrap();
        ranking.add(&hit(Subsystem::Rpc, 1, 2, 1, 4)).unwrap();

        let endsec = EndSector::from_endcap_sector(1, 4).unwrap();
        assert_eq!(ranking.rank(endsec), 0b0100_1010);
        assert_eq!(ranking.best_sector(), (endsec, 0b0100_1010));

        ranking.reset();
        assert!(ranking.ranks().iter().all(|&r| r == 0));
    }

    #[test]
    fn test_ties_prefer_lowest_index() {
        let geometry = TableGeometry::default();
        let mut ranking = SectorRanking::new(&geometry);
        ranking.add(&hit(Subsystem::Csc, 3, 1, -1, 2)).unwrap();
        ranking.add(&hit(Subsystem::Csc, 3, 2, 1, 5)).unwrap();
        let (best, rank) = ranking.best_sector();
        assert_eq!(best.index(), 4);
        assert_eq!(rank, 1 << 4);
    }

    #[test]
    fn test_empty_event() {
        let geometry = TableGeometry::default();
        let ranking = SectorRanking::new(&geometry);
        let (best, rank) = ranking.best_sector();
        assert_eq!(best.index(), 0);
        assert_eq!(rank, 0);
    }

    #[test]
    fn test_unknown_host_is_fatal() {
        let geometry = TableGeometry::default();
        let mut ranking = SectorRanking::new(&geometry);
        let err = ranking.add(&hit(Subsystem::Dt, 1, 1, 1, 1)).unwrap_err();
        assert!(matches!(err, Error::UnknownHost { .. }));
        let err = ranking.add(&hit(Subsystem::Csc, 1, 1, 0, 1)).unwrap_err();
        assert_eq!(err, Error::InvalidEndcap(0));
    }
}
