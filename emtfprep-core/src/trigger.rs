//! Trigger coordinate conversions.
//!
//! Maps global chamber numbering and global angles onto the integer
//! conventions used by the sector processors. Rounding is half-to-even.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

/// Local phi offset of a sector's lower edge (degrees).
const PHI_LOC_OFFSET_DEG: f64 = 22.0;
/// Phi units per degree.
const PHI_UNITS_PER_DEG: f64 = 60.0;
/// Theta range covered by the 7-bit theta word (degrees).
const THETA_MIN_DEG: f64 = 8.5;
const THETA_MAX_DEG: f64 = 45.0;
const THETA_UNITS: f64 = 128.0;

/// Wraps an angle in degrees into [-180, 180].
#[must_use]
pub fn wrap_phi_deg(x: f64) -> f64 {
    x - (x / 360.0).round_ties_even() * 360.0
}

/// Converts a global phi (degrees) to the local phi word of `sector` (1..=6).
#[must_use]
pub fn phi_loc_int(glob_deg: f64, sector: i8) -> i32 {
    let mut loc = wrap_phi_deg(glob_deg) - 15.0 - 60.0 * f64::from(sector - 1);
    if loc + PHI_LOC_OFFSET_DEG < 0.0 {
        loc += 360.0;
    }
    ((loc + PHI_LOC_OFFSET_DEG) * PHI_UNITS_PER_DEG).round_ties_even() as i32
}

/// Converts a local phi word back to degrees.
#[must_use]
pub fn phi_loc_deg(bits: i32) -> f64 {
    f64::from(bits) / PHI_UNITS_PER_DEG - PHI_LOC_OFFSET_DEG
}

/// Converts a global theta (degrees) to the theta word, folding the
/// negative endcap onto the positive one.
#[must_use]
pub fn theta_int(theta_deg: f64, endcap: i8) -> i32 {
    let theta = if endcap == -1 {
        180.0 - theta_deg
    } else {
        theta_deg
    };
    ((theta - THETA_MIN_DEG) * THETA_UNITS / (THETA_MAX_DEG - THETA_MIN_DEG)).round_ties_even()
        as i32
}

/// Converts a theta word back to degrees.
#[must_use]
pub fn theta_deg(theta_int: i32) -> f64 {
    f64::from(theta_int) * (THETA_MAX_DEG - THETA_MIN_DEG) / THETA_UNITS + THETA_MIN_DEG
}

/// Trigger sector (1..=6) of a global chamber number.
#[must_use]
pub fn trigger_sector(ring: i8, station: i8, chamber: i16) -> i8 {
    let chamber = i32::from(chamber);
    let sector = if station == 1 || ring > 1 {
        // ch 3-8 -> 1, 9-14 -> 2, ..., 1-2 -> 6
        (((chamber - 3) as u32 & 0x7f) / 6) + 1
    } else {
        // 20-degree chambers: ch 2-4 -> 1, 5-7 -> 2, ...
        (((chamber - 2) as u32 & 0x1f) / 3) + 1
    };
    sector.clamp(1, 6) as i8
}

/// Trigger subsector: 1 or 2 in station 1, 0 elsewhere.
#[must_use]
pub fn trigger_subsector(station: i8, chamber: i16) -> i8 {
    if station != 1 {
        0
    } else if chamber.rem_euclid(6) > 2 {
        1
    } else {
        2
    }
}

/// Chamber position inside its sector (1..=9).
#[must_use]
pub fn trigger_cscid(ring: i8, station: i8, chamber: i16) -> i16 {
    if station == 1 {
        let base = chamber.rem_euclid(3) + 1;
        match ring {
            2 => base + 3,
            3 => base + 6,
            _ => base,
        }
    } else if ring == 1 {
        (chamber + 1).rem_euclid(3) + 1
    } else {
        (chamber + 3).rem_euclid(6) + 4
    }
}

/// 1 when the chamber is also read out by the next sector, 0 otherwise.
#[must_use]
pub fn trigger_neighid(ring: i8, station: i8, chamber: i16) -> u8 {
    let last = if station != 1 && ring == 1 {
        (chamber + 1).rem_euclid(3) + 1 == 3
    } else {
        (chamber + 3).rem_euclid(6) + 1 == 6
    };
    u8::from(last)
}
