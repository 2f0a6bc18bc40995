//! Score aggregation, level mapping and personality labels.

/// Highest compliance level.
pub const MAX_LEVEL: u32 = 4;

/// Whole-number percentage of `score` over `max`, 0 when `max` is 0.
pub fn percentage(score: u32, max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    ((u64::from(score) * 100) / u64::from(max)) as u32
}

/// Map a percentage to a compliance level.
///
/// Only a perfect 100% reaches [`MAX_LEVEL`]; everything below is level 0.
pub fn level(percentage: u32) -> u32 {
    (percentage / 100) * MAX_LEVEL
}

/// A qualitative descriptor for a percentage band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Personality {
    /// Display name.
    pub name: &'static str,
    /// One-line tagline.
    pub tagline: &'static str,
}

const FAUCI: Personality = Personality {
    name: "Dr. Fauci",
    tagline: "Measured safety. YOLO FAIL!",
};
const LEEROY: Personality = Personality {
    name: "LeeRoy Jenkins",
    tagline: "Do your thang, LeeRoy!",
};
const JOAN: Personality = Personality {
    name: "Joan de Arc",
    tagline: "She did WHAT?",
};
const CARTER: Personality = Personality {
    name: "Jimmy Carter",
    tagline: "Walking into a failed nuclear reactor? That's just crazy.",
};
const POLLOCK: Personality = Personality {
    name: "Allan Pollock",
    tagline: "Borrowed a fighter jet, buzzed the Tower Bridge, and lived to tell the tale",
};

/// Personality band for a percentage.
///
/// Bands: `0`, `1..=25`, `26..=50`, `51..=75`, `76..`.
pub fn personality(percentage: u32) -> Personality {
    match percentage {
        0 => FAUCI,
        p if p > 75 => LEEROY,
        p if p > 50 => JOAN,
        p if p > 25 => CARTER,
        _ => POLLOCK,
    }
}

/// Short label for a percentage.
pub fn label(percentage: u32) -> &'static str {
    personality(percentage).name
}

/// Points deducted when `count` of `total` items meet a requirement.
///
/// Computes `ceil(max * count / total)` in integers; 0 when `total` is 0.
pub fn deficiency(max: u32, count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let numerator = u64::from(max) * count as u64;
    numerator.div_ceil(total as u64).min(u64::from(max)) as u32
}
