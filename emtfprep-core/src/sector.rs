//! End-sector identifiers.
//!
//! The trigger is partitioned into 6 azimuthal sectors in each of the two
//! endcaps. An end-sector folds both into a single index: 0-5 in the
//! positive endcap, 6-11 in the negative endcap.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of trigger sectors per endcap.
pub const NUM_SECTORS: usize = 6;

/// Number of end-sectors (both endcaps).
pub const NUM_END_SECTORS: usize = 2 * NUM_SECTORS;

/// One of the 12 logical trigger partitions. Defaults to end-sector 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EndSector(u8);

impl EndSector {
    /// Builds the end-sector for an (endcap, sector) pair.
    ///
    /// # Errors
    /// Returns an error if `endcap` is not +1/-1 or `sector` is not in [1, 6].
    pub fn from_endcap_sector(endcap: i8, sector: i8) -> Result<Self> {
        if endcap != 1 && endcap != -1 {
            return Err(Error::InvalidEndcap(endcap));
        }
        if !(1..=6).contains(&sector) {
            return Err(Error::InvalidSector(sector));
        }
        #[allow(clippy::cast_sign_loss)]
        let base = (sector - 1) as u8;
        Ok(Self(if endcap == 1 { base } else { base + 6 }))
    }

    /// Builds an end-sector from its index.
    ///
    /// # Errors
    /// Returns an error if `index` is not in [0, 11].
    pub fn from_index(index: usize) -> Result<Self> {
        u8::try_from(index)
            .ok()
            .filter(|&i| usize::from(i) < NUM_END_SECTORS)
            .map(Self)
            .ok_or(Error::InvalidEndSector(index))
    }

    /// Iterates all end-sectors in index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUM_END_SECTORS as u8).map(Self)
    }

    /// Index in [0, 11].
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Endcap sign, +1 or -1.
    #[inline]
    #[must_use]
    pub fn endcap(self) -> i8 {
        if usize::from(self.0) < NUM_SECTORS {
            1
        } else {
            -1
        }
    }

    /// Trigger sector in [1, 6].
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn sector(self) -> i8 {
        (self.0 % NUM_SECTORS as u8) as i8 + 1
    }
}

impl std::fmt::Display for EndSector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Previous sector in azimuth (1 wraps to 6).
#[inline]
#[must_use]
pub fn prev_sector(sector: i8) -> i8 {
    if sector == 1 {
        6
    } else {
        sector - 1
    }
}

/// Next sector in azimuth (6 wraps to 1).
#[inline]
#[must_use]
pub fn next_sector(sector: i8) -> i8 {
    if sector == 6 {
        1
    } else {
        sector + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_sector_mapping() {
        assert_eq!(EndSector::from_endcap_sector(1, 1).unwrap().index(), 0);
        assert_eq!(EndSector::from_endcap_sector(1, 6).unwrap().index(), 5);
        assert_eq!(EndSector::from_endcap_sector(-1, 1).unwrap().index(), 6);
        assert_eq!(EndSector::from_endcap_sector(-1, 6).unwrap().index(), 11);
    }

    #[test]
    fn test_end_sector_rejects_bad_input() {
        assert_eq!(
            EndSector::from_endcap_sector(0, 1),
            Err(Error::InvalidEndcap(0))
        );
        assert_eq!(
            EndSector::from_endcap_sector(1, 7),
            Err(Error::InvalidSector(7))
        );
        assert!(EndSector::from_index(12).is_err());
    }

    #[test]
    fn test_end_sector_inverse() {
        for endsec in EndSector::all() {
            let rebuilt = EndSector::from_endcap_sector(endsec.endcap(), endsec.sector()).unwrap();
            assert_eq!(rebuilt, endsec);
        }
        assert_eq!(EndSector::all().count(), NUM_END_SECTORS);
    }

    #[test]
    fn test_sector_wrap() {
        assert_eq!(prev_sector(1), 6);
        assert_eq!(prev_sector(4), 3);
        assert_eq!(next_sector(6), 1);
        assert_eq!(next_sector(2), 3);
    }
}
