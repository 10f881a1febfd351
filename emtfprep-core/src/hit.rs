//! Trigger primitive, simulated hit and particle records.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::sector::EndSector;
use crate::Result;

/// Detector technology that produced a trigger primitive.
///
/// The discriminants match the ntuple encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
#[repr(u8)]
pub enum Subsystem {
    /// Drift tube.
    Dt = 0,
    /// Cathode strip chamber.
    Csc = 1,
    /// Resistive plate chamber.
    Rpc = 2,
    /// Gas electron multiplier.
    Gem = 3,
    /// ME0 (GEM-based station 0).
    Me0 = 4,
}

impl Subsystem {
    /// Short name used in logs and error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dt => "DT",
            Self::Csc => "CSC",
            Self::Rpc => "RPC",
            Self::Gem => "GEM",
            Self::Me0 => "ME0",
        }
    }
}

impl TryFrom<u8> for Subsystem {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dt),
            1 => Ok(Self::Csc),
            2 => Ok(Self::Rpc),
            3 => Ok(Self::Gem),
            4 => Ok(Self::Me0),
            other => Err(format!("unknown subsystem type: {other}")),
        }
    }
}

impl From<Subsystem> for u8 {
    fn from(value: Subsystem) -> Self {
        value as u8
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw trigger primitive as delivered by the event reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriggerPrimitive {
    /// Detector technology.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub subsystem: Subsystem,
    pub station: i8,
    pub ring: i8,
    /// +1 or -1.
    pub endcap: i8,
    /// Trigger sector, 1..=6.
    pub sector: i8,
    #[cfg_attr(feature = "serde", serde(default))]
    pub subsector: i8,
    #[cfg_attr(feature = "serde", serde(default))]
    pub chamber: i16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub cscid: i16,
    /// 1 when the primitive is a copy shared from the neighbor sector.
    #[cfg_attr(feature = "serde", serde(default))]
    pub neighbor: u8,
    /// Bunch crossing relative to the triggering crossing.
    #[cfg_attr(feature = "serde", serde(default))]
    pub bx: i8,
    #[cfg_attr(feature = "serde", serde(default))]
    pub strip: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub wire: i32,
    /// Front/rear flag.
    #[cfg_attr(feature = "serde", serde(default))]
    pub fr: i8,
    #[cfg_attr(feature = "serde", serde(default))]
    pub quality: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bend: i32,
    /// Detector sublayer; 0 when the technology has none.
    #[cfg_attr(feature = "serde", serde(default))]
    pub layer: i32,
    /// Local phi in trigger integer units.
    #[cfg_attr(feature = "serde", serde(default))]
    pub emtf_phi: i32,
    /// Theta in trigger integer units.
    #[cfg_attr(feature = "serde", serde(default))]
    pub emtf_theta: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub time: i32,
}

impl TriggerPrimitive {
    /// Creates a primitive with the identifying fields set and all
    /// measurements zeroed.
    #[must_use]
    pub fn new(subsystem: Subsystem, station: i8, ring: i8, endcap: i8, sector: i8) -> Self {
        Self {
            subsystem,
            station,
            ring,
            endcap,
            sector,
            subsector: 0,
            chamber: 0,
            cscid: 0,
            neighbor: 0,
            bx: 0,
            strip: 0,
            wire: 0,
            fr: 0,
            quality: 0,
            bend: 0,
            layer: 0,
            emtf_phi: 0,
            emtf_theta: 0,
            time: 0,
        }
    }

    /// End-sector this primitive is routed to.
    ///
    /// # Errors
    /// Returns an error if the endcap or sector is out of range.
    pub fn end_sector(&self) -> Result<EndSector> {
        EndSector::from_endcap_sector(self.endcap, self.sector)
    }

    /// Returns true for a neighbor-sector copy.
    #[inline]
    #[must_use]
    pub fn is_neighbor(&self) -> bool {
        self.neighbor != 0
    }
}

/// A simulated (truth-level) detector hit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimHit {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub subsystem: Subsystem,
    pub station: i8,
    pub ring: i8,
    /// Global chamber number.
    pub chamber: i16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub layer: i32,
    /// Global phi (radians).
    pub phi: f64,
    /// Global theta (radians).
    pub theta: f64,
    /// Global z (cm); its sign selects the endcap.
    pub z: f64,
}

/// A generator-level particle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Particle {
    pub pt: f64,
    /// Signed inverse transverse momentum (q/pT, 1/GeV).
    pub invpt: f64,
    pub eta: f64,
    pub phi: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    /// Transverse impact parameter (cm).
    pub d0: f64,
    pub bx: i32,
}

/// All records of one event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Event {
    pub hits: Vec<TriggerPrimitive>,
    pub simhits: Vec<SimHit>,
    pub particles: Vec<Particle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_round_trip() {
        for code in 0u8..5 {
            let subsystem = Subsystem::try_from(code).unwrap();
            assert_eq!(u8::from(subsystem), code);
        }
        assert!(Subsystem::try_from(5).is_err());
        assert_eq!(Subsystem::Me0.to_string(), "ME0");
    }

    #[test]
    fn test_primitive_end_sector() {
        let hit = TriggerPrimitive::new(Subsystem::Csc, 2, 1, -1, 4);
        assert_eq!(hit.end_sector().unwrap().index(), 9);
        assert!(!hit.is_neighbor());

        let bad = TriggerPrimitive::new(Subsystem::Csc, 2, 1, 0, 4);
        assert!(bad.end_sector().is_err());
    }
}
