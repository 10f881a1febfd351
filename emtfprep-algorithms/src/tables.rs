//! Reference geometry tables.
//!
//! [`TableGeometry`] implements [`GeometryClassifier`] with the canonical
//! host, site and chamber numbering of the sector processor. Zone windows,
//! the legit bx window and the particle zone edges are tunable and can be
//! loaded from JSON.

use emtfprep_core::geometry::host;
use emtfprep_core::{
    Classification, Error, GeometryClassifier, Result, Subsystem, TriggerPrimitive, NUM_HOSTS,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Site of each host (indexed by host id).
const SITE_LUT: [u8; NUM_HOSTS] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 9, 5, 5, 10, 6, 7, 7, 8, 8, 11];

/// First CSC neighbor slot.
const CSC_NEIGHBOR_BASE: i32 = 45;
/// First RPC/GEM native slot.
const RPC_GEM_BASE: i32 = 54;
/// First RPC/GEM neighbor slot.
const RPC_GEM_NEIGHBOR_BASE: i32 = 99;
/// First ME0 slot.
const ME0_BASE: i32 = 108;
/// Native ME0 slots per sector; the neighbor copy takes the next one.
const ME0_NATIVE_SLOTS: i32 = 6;
/// ME0 chambers per endcap in the detector numbering (20 degrees each).
const ME0_DETECTOR_CHAMBERS: i16 = 18;

/// Algorithm configuration that decides which primitives are legit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Phase-2 track finder: CSC, RPC, GEM and ME0.
    #[default]
    Phase2,
    /// Run-3 track finder: CSC, RPC and GE1/1.
    Run3,
}

impl std::str::FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "phase2" | "default" => Ok(Self::Phase2),
            "run3" => Ok(Self::Run3),
            other => Err(Error::ConfigError(format!("unknown algorithm: {other}"))),
        }
    }
}

/// Table-driven geometry classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TableGeometry {
    /// Algorithm configuration.
    pub algorithm: Algorithm,
    /// Inclusive bx window of legit primitives.
    pub bx_window: [i8; 2],
    /// Inclusive theta window of each readout zone.
    pub zone_theta_windows: Vec<[i32; 2]>,
    /// Number of timezones; timezone `t` holds primitives at bx `-t`.
    pub num_timezones: u8,
    /// Descending |eta| edges; zone `i` spans `[edges[i + 1], edges[i])`.
    pub particle_zone_eta_edges: Vec<f64>,
}

impl Default for TableGeometry {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Phase2,
            bx_window: [-2, 0],
            zone_theta_windows: vec![[4, 26], [24, 53], [46, 88]],
            num_timezones: 3,
            particle_zone_eta_edges: vec![2.5, 2.15, 1.75, 1.45, 1.15, 0.8],
        }
    }
}

impl TableGeometry {
    /// Creates the default tables for an algorithm.
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    /// Sets the legit bx window.
    #[must_use]
    pub fn with_bx_window(mut self, min: i8, max: i8) -> Self {
        self.bx_window = [min, max];
        self
    }

    /// Load tables from a JSON file. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!("{}: {e}", path.as_ref().display()))
        })?;
        let tables: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        tables.validate()?;
        Ok(tables)
    }

    /// Load tables from a JSON string. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed or validated.
    pub fn from_json(json: &str) -> Result<Self> {
        let tables: Self =
            serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))?;
        tables.validate()?;
        Ok(tables)
    }

    /// Checks window ordering and edge monotonicity.
    ///
    /// # Errors
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.bx_window[0] > self.bx_window[1] {
            return Err(Error::ConfigError(format!(
                "bx window {:?} is inverted",
                self.bx_window
            )));
        }
        if let Some(zone) = self.zone_theta_windows.iter().position(|w| w[0] > w[1]) {
            return Err(Error::ConfigError(format!(
                "theta window of zone {zone} is inverted"
            )));
        }
        if self.zone_theta_windows.len() > 31 || self.num_timezones > 31 {
            return Err(Error::ConfigError(
                "zone and timezone masks hold at most 31 entries".to_string(),
            ));
        }
        if self
            .particle_zone_eta_edges
            .windows(2)
            .any(|w| w[1] >= w[0])
        {
            return Err(Error::ConfigError(
                "particle zone edges must be strictly descending".to_string(),
            ));
        }
        Ok(())
    }

    /// Host id of a (technology, station, ring) triple.
    #[must_use]
    pub fn host_of(subsystem: Subsystem, station: i8, ring: i8) -> Option<u8> {
        match (subsystem, station, ring) {
            (Subsystem::Csc, 1, 1 | 4) => Some(host::ME1_1),
            (Subsystem::Csc, 1, 2) => Some(host::ME1_2),
            (Subsystem::Csc, 1, 3) => Some(host::ME1_3),
            (Subsystem::Csc, 2, 1) => Some(host::ME2_1),
            (Subsystem::Csc, 2, 2) => Some(host::ME2_2),
            (Subsystem::Csc, 3, 1) => Some(host::ME3_1),
            (Subsystem::Csc, 3, 2) => Some(host::ME3_2),
            (Subsystem::Csc, 4, 1) => Some(host::ME4_1),
            (Subsystem::Csc, 4, 2) => Some(host::ME4_2),
            (Subsystem::Gem, 1, 1) => Some(host::GE1_1),
            (Subsystem::Gem, 2, 1) => Some(host::GE2_1),
            (Subsystem::Rpc, 1, 2) => Some(host::RE1_2),
            (Subsystem::Rpc, 1, 3) => Some(host::RE1_3),
            (Subsystem::Rpc, 2, 2 | 3) => Some(host::RE2_2),
            (Subsystem::Rpc, 3, 1) => Some(host::RE3_1),
            (Subsystem::Rpc, 3, 2 | 3) => Some(host::RE3_2),
            (Subsystem::Rpc, 4, 1) => Some(host::RE4_1),
            (Subsystem::Rpc, 4, 2 | 3) => Some(host::RE4_2),
            (Subsystem::Me0, _, _) => Some(host::ME0),
            _ => None,
        }
    }

    /// Site id of a host.
    #[must_use]
    pub fn site_of(host: u8) -> Option<u8> {
        SITE_LUT.get(usize::from(host)).copied()
    }

    /// Canonical chamber id of a primitive.
    ///
    /// # Errors
    /// Returns [`Error::UnknownChamber`] if the station, subsector or cscid
    /// fall outside the chamber layout.
    pub fn chamber_of(hit: &TriggerPrimitive) -> Result<u8> {
        let station = i32::from(hit.station);
        let cscid = i32::from(hit.cscid);
        let subsector = i32::from(hit.subsector);
        let neighbor = hit.is_neighbor();

        let id = match hit.subsystem {
            Subsystem::Me0 => {
                if neighbor {
                    ME0_BASE + ME0_NATIVE_SLOTS
                } else if (1..=ME0_NATIVE_SLOTS).contains(&cscid) {
                    ME0_BASE + cscid - 1
                } else {
                    return Err(Error::UnknownChamber(ME0_BASE + cscid - 1));
                }
            }
            Subsystem::Csc | Subsystem::Rpc | Subsystem::Gem => {
                if !(1..=9).contains(&cscid) || !(1..=4).contains(&station) {
                    return Err(Error::UnknownChamber(-1));
                }
                if station == 1 && !(1..=2).contains(&subsector) {
                    return Err(Error::UnknownChamber(-1));
                }
                let (native_base, neighbor_base) = if hit.subsystem == Subsystem::Csc {
                    (0, CSC_NEIGHBOR_BASE)
                } else {
                    (RPC_GEM_BASE, RPC_GEM_NEIGHBOR_BASE)
                };
                match (station, neighbor) {
                    (1, false) => native_base + (subsector - 1) * 9 + cscid - 1,
                    (_, false) => native_base + 18 + (station - 2) * 9 + cscid - 1,
                    (1, true) => neighbor_base + (cscid - 1) / 3,
                    (_, true) => neighbor_base + 3 + (station - 2) * 2 + i32::from(cscid > 3),
                }
            }
            Subsystem::Dt => return Err(Error::UnknownChamber(-1)),
        };
        u8::try_from(id).map_err(|_| Error::UnknownChamber(id))
    }

    fn zones_of(&self, theta: i32) -> i32 {
        self.zone_theta_windows
            .iter()
            .enumerate()
            .filter(|(_, w)| (w[0]..=w[1]).contains(&theta))
            .fold(0, |mask, (zone, _)| mask | (1 << zone))
    }

    fn timezones_of(&self, bx: i8) -> i32 {
        (0..self.num_timezones)
            .filter(|&tz| i32::from(bx) == -i32::from(tz))
            .fold(0, |mask, tz| mask | (1 << tz))
    }

    fn algorithm_accepts(&self, hit: &TriggerPrimitive, host_id: u8) -> bool {
        match self.algorithm {
            Algorithm::Phase2 => hit.subsystem != Subsystem::Dt,
            Algorithm::Run3 => match hit.subsystem {
                Subsystem::Csc | Subsystem::Rpc => true,
                Subsystem::Gem => host_id == host::GE1_1,
                Subsystem::Me0 | Subsystem::Dt => false,
            },
        }
    }
}

impl GeometryClassifier for TableGeometry {
    fn find_host(&self, hit: &TriggerPrimitive) -> Option<u8> {
        Self::host_of(hit.subsystem, hit.station, hit.ring)
    }

    fn classify(&self, hit: &TriggerPrimitive) -> Result<Classification> {
        let host = self.find_host(hit).ok_or(Error::UnknownHost {
            subsystem: hit.subsystem.name(),
            station: hit.station,
            ring: hit.ring,
        })?;
        let site = Self::site_of(host).ok_or(Error::UnknownHost {
            subsystem: hit.subsystem.name(),
            station: hit.station,
            ring: hit.ring,
        })?;
        let chamber = Self::chamber_of(hit)?;
        Ok(Classification {
            site,
            host,
            chamber,
            zones: self.zones_of(hit.emtf_theta),
            timezones: self.timezones_of(hit.bx),
            phi: hit.emtf_phi,
            bend: hit.bend,
            theta: hit.emtf_theta,
            qual: hit.quality,
            time: hit.time,
        })
    }

    fn is_legit(&self, hit: &TriggerPrimitive) -> bool {
        let in_window = (self.bx_window[0]..=self.bx_window[1]).contains(&hit.bx);
        in_window
            && self
                .find_host(hit)
                .is_some_and(|host_id| self.algorithm_accepts(hit, host_id))
    }

    /// Renumbers ME0 chambers from the 20-degree detector numbering onto
    /// the 10-degree numbering of the sector formulas: chamber `k` becomes
    /// `2k - 1`. Chambers outside `1..=18` are left as they are.
    fn remap(&self, hit: &mut TriggerPrimitive) {
        if hit.subsystem == Subsystem::Me0 && (1..=ME0_DETECTOR_CHAMBERS).contains(&hit.chamber) {
            hit.chamber = 2 * hit.chamber - 1;
        }
    }

    fn legit_bx_window(&self) -> Option<(i8, i8)> {
        Some((self.bx_window[0], self.bx_window[1]))
    }

    fn find_particle_zone(&self, eta: f64) -> Option<u8> {
        let eta = eta.abs();
        self.particle_zone_eta_edges
            .windows(2)
            .position(|w| eta < w[0] && eta >= w[1])
            .and_then(|zone| u8::try_from(zone).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csc(station: i8, ring: i8, subsector: i8, cscid: i16) -> TriggerPrimitive {
        let mut hit = TriggerPrimitive::new(Subsystem::Csc, station, ring, 1, 1);
        hit.subsector = subsector;
        hit.cscid = cscid;
        hit
    }

    #[test]
    fn test_host_table() {
        assert_eq!(TableGeometry::host_of(Subsystem::Csc, 1, 1), Some(0));
        assert_eq!(TableGeometry::host_of(Subsystem::Csc, 1, 4), Some(0));
        assert_eq!(TableGeometry::host_of(Subsystem::Csc, 4, 2), Some(8));
        assert_eq!(TableGeometry::host_of(Subsystem::Gem, 1, 1), Some(9));
        assert_eq!(TableGeometry::host_of(Subsystem::Rpc, 4, 1), Some(16));
        assert_eq!(TableGeometry::host_of(Subsystem::Me0, 1, 1), Some(18));
        assert_eq!(TableGeometry::host_of(Subsystem::Dt, 1, 1), None);
        assert_eq!(TableGeometry::host_of(Subsystem::Csc, 5, 1), None);
    }

    #[test]
    fn test_csc_chamber_layout() {
        assert_eq!(TableGeometry::chamber_of(&csc(1, 1, 1, 1)).unwrap(), 0);
        assert_eq!(TableGeometry::chamber_of(&csc(1, 3, 2, 9)).unwrap(), 17);
        assert_eq!(TableGeometry::chamber_of(&csc(2, 1, 0, 1)).unwrap(), 18);
        assert_eq!(TableGeometry::chamber_of(&csc(4, 2, 0, 9)).unwrap(), 44);

        let mut neighbor = csc(1, 1, 1, 3);
        neighbor.neighbor = 1;
        assert_eq!(TableGeometry::chamber_of(&neighbor).unwrap(), 45);
        let mut neighbor = csc(4, 2, 0, 9);
        neighbor.neighbor = 1;
        assert_eq!(TableGeometry::chamber_of(&neighbor).unwrap(), 53);
    }

    #[test]
    fn test_rpc_gem_me0_chamber_layout() {
        let mut ge11 = TriggerPrimitive::new(Subsystem::Gem, 1, 1, 1, 1);
        ge11.subsector = 2;
        ge11.cscid = 1;
        assert_eq!(TableGeometry::chamber_of(&ge11).unwrap(), 63);
        ge11.neighbor = 1;
        assert_eq!(TableGeometry::chamber_of(&ge11).unwrap(), 99);

        let mut re31 = TriggerPrimitive::new(Subsystem::Rpc, 3, 1, 1, 1);
        re31.cscid = 1;
        assert_eq!(TableGeometry::chamber_of(&re31).unwrap(), 81);
        re31.neighbor = 1;
        assert_eq!(TableGeometry::chamber_of(&re31).unwrap(), 104);

        let mut re42 = TriggerPrimitive::new(Subsystem::Rpc, 4, 2, 1, 1);
        re42.cscid = 9;
        re42.neighbor = 1;
        assert_eq!(TableGeometry::chamber_of(&re42).unwrap(), 107);

        let mut me0 = TriggerPrimitive::new(Subsystem::Me0, 1, 1, 1, 1);
        me0.cscid = 6;
        assert_eq!(TableGeometry::chamber_of(&me0).unwrap(), 113);
        me0.neighbor = 1;
        assert_eq!(TableGeometry::chamber_of(&me0).unwrap(), 114);
        me0.neighbor = 0;
        me0.cscid = 7;
        assert!(TableGeometry::chamber_of(&me0).is_err());
    }

    #[test]
    fn test_chamber_rejects_bad_ids() {
        assert!(TableGeometry::chamber_of(&csc(1, 1, 0, 1)).is_err());
        assert!(TableGeometry::chamber_of(&csc(2, 1, 0, 10)).is_err());
        let dt = TriggerPrimitive::new(Subsystem::Dt, 1, 1, 1, 1);
        assert!(TableGeometry::chamber_of(&dt).is_err());
    }

    #[test]
    fn test_classify_masks() {
        let geometry = TableGeometry::default();
        let mut hit = csc(2, 1, 0, 2);
        hit.emtf_theta = 25;
        hit.emtf_phi = 1234;
        hit.bx = -1;
        let c = geometry.classify(&hit).unwrap();
        assert_eq!(c.host, 3);
        assert_eq!(c.site, 2);
        assert_eq!(c.chamber, 19);
        assert_eq!(c.zones, 0b011);
        assert_eq!(c.timezones, 0b010);
        assert_eq!(c.phi, 1234);
    }

    #[test]
    fn test_legit_predicate() {
        let phase2 = TableGeometry::new(Algorithm::Phase2);
        let run3 = TableGeometry::new(Algorithm::Run3);

        let me0 = TriggerPrimitive::new(Subsystem::Me0, 1, 1, 1, 1);
        assert!(phase2.is_legit(&me0));
        assert!(!run3.is_legit(&me0));

        let ge21 = TriggerPrimitive::new(Subsystem::Gem, 2, 1, 1, 1);
        assert!(phase2.is_legit(&ge21));
        assert!(!run3.is_legit(&ge21));

        let mut late = csc(1, 1, 1, 1);
        late.bx = 1;
        assert!(!phase2.is_legit(&late));

        let dt = TriggerPrimitive::new(Subsystem::Dt, 1, 1, 1, 1);
        assert!(!phase2.is_legit(&dt));
    }

    #[test]
    fn test_me0_remap() {
        let geometry = TableGeometry::default();
        let mut me0 = TriggerPrimitive::new(Subsystem::Me0, 1, 1, 1, 1);
        for (detector, sector_numbering) in [(1, 1), (5, 9), (18, 35)] {
            me0.chamber = detector;
            geometry.remap(&mut me0);
            assert_eq!(me0.chamber, sector_numbering);
        }
        // Out of range and non-ME0 chambers keep their number.
        me0.chamber = 19;
        geometry.remap(&mut me0);
        assert_eq!(me0.chamber, 19);
        let mut me12 = csc(1, 2, 1, 4);
        me12.chamber = 5;
        geometry.remap(&mut me12);
        assert_eq!(me12.chamber, 5);

        assert_eq!(geometry.legit_bx_window(), Some((-2, 0)));
    }

    #[test]
    fn test_particle_zone() {
        let geometry = TableGeometry::default();
        assert_eq!(geometry.find_particle_zone(2.3), Some(0));
        assert_eq!(geometry.find_particle_zone(-1.6), Some(2));
        assert_eq!(geometry.find_particle_zone(2.6), None);
        assert_eq!(geometry.find_particle_zone(0.5), None);
    }

    #[test]
    fn test_json_tables() {
        let geometry = TableGeometry::from_json(r#"{"algorithm": "run3", "bx_window": [-1, 0]}"#)
            .unwrap();
        assert_eq!(geometry.algorithm, Algorithm::Run3);
        assert_eq!(geometry.bx_window, [-1, 0]);
        assert_eq!(geometry.num_timezones, 3);

        assert!(TableGeometry::from_json(r#"{"bx_window": [1, 0]}"#).is_err());
        assert!(TableGeometry::from_json(r#"{"particle_zone_eta_edges": [1.0, 2.0]}"#).is_err());
        assert!("Run3".parse::<Algorithm>().is_ok());
        assert!("nope".parse::<Algorithm>().is_err());
    }
}
