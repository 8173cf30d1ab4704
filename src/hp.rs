//! Health-point override rules.
//!
//! DESIGN
//! ======
//! `HpResolver::resolve` turns the user's HP mode and parameters into an
//! optional override. `Ok(None)` means "keep the bound entity's own HP":
//! inherit mode, or nothing entered yet. Invalid input and formula failures
//! come back as `HpError` so the session can decide how loudly to report
//! them; the commit itself always falls back to inherited HP.

#[cfg(test)]
#[path = "hp_test.rs"]
mod hp_test;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::collab::FormulaRoller;
use crate::consts::HP_PERCENT_MAX;
use crate::error::HpError;

/// How the placed instance's HP is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HpMode {
    /// Keep the bound entity's HP.
    #[default]
    Inherit,
    /// Roll a dice formula.
    Formula,
    /// Jitter the base HP by up to a percentage either way.
    Percent,
    /// A fixed value or a `low-high` range typed by the user.
    Static,
}

/// User-entered HP parameters. Only the field for the active mode is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HpParams {
    pub formula: String,
    pub percent: f64,
    pub static_input: String,
    /// Base HP for percent mode when the bound entity has none.
    pub base: Option<u32>,
}

impl Default for HpParams {
    fn default() -> Self {
        Self { formula: String::new(), percent: 10.0, static_input: String::new(), base: None }
    }
}

/// An HP value written at commit time. `value` always equals `max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpOverride {
    pub attribute_path: String,
    pub value: u32,
    pub max: u32,
}

impl HpOverride {
    #[must_use]
    pub fn full(attribute_path: &str, hp: u32) -> Self {
        let hp = hp.max(1);
        Self { attribute_path: attribute_path.to_string(), value: hp, max: hp }
    }
}

/// Parsed static HP input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticHp {
    Fixed(u32),
    /// Inclusive range with `low < high`.
    Range(u32, u32),
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Derives HP overrides for one game system's attribute path.
pub struct HpResolver<'a> {
    roller: &'a dyn FormulaRoller,
    attribute_path: &'a str,
}

impl<'a> HpResolver<'a> {
    #[must_use]
    pub fn new(roller: &'a dyn FormulaRoller, attribute_path: &'a str) -> Self {
        Self { roller, attribute_path }
    }

    /// Resolve an override for `mode`.
    ///
    /// `base_hp` is the bound entity's HP (or the user-supplied base) used by
    /// percent mode.
    ///
    /// # Errors
    ///
    /// Returns `HpError` for invalid static input, an out-of-range
    /// percentage, or a formula that fails to evaluate.
    pub async fn resolve(
        &self,
        mode: HpMode,
        params: &HpParams,
        base_hp: Option<u32>,
    ) -> Result<Option<HpOverride>, HpError> {
        match mode {
            HpMode::Inherit => Ok(None),
            HpMode::Formula => {
                let formula = params.formula.trim();
                if formula.is_empty() {
                    return Ok(None);
                }
                let total = self.roller.roll(formula).await?;
                Ok(Some(HpOverride::full(self.attribute_path, clamp_hp(total))))
            }
            HpMode::Percent => {
                let Some(base) = base_hp.filter(|b| *b >= 1) else {
                    return Ok(None);
                };
                let (lo, hi) = percent_bounds(base, params.percent)?;
                Ok(Some(HpOverride::full(self.attribute_path, draw_inclusive(lo, hi))))
            }
            HpMode::Static => {
                if params.static_input.trim().is_empty() {
                    return Ok(None);
                }
                let hp = match parse_static(&params.static_input)? {
                    StaticHp::Fixed(v) => v,
                    StaticHp::Range(lo, hi) => draw_inclusive(lo, hi),
                };
                Ok(Some(HpOverride::full(self.attribute_path, hp)))
            }
        }
    }
}

// =============================================================================
// RULES
// =============================================================================

/// Parse a positive integer or a `low-high` range. Dash variants are accepted
/// and inverted ranges are reordered.
///
/// # Errors
///
/// Returns `InvalidStatic` for non-numeric, zero, negative, or malformed input.
pub fn parse_static(input: &str) -> Result<StaticHp, HpError> {
    let invalid = || HpError::InvalidStatic(input.trim().to_string());
    let normalized: String = input
        .trim()
        .chars()
        .map(|c| if matches!(c, '\u{2010}'..='\u{2015}' | '\u{2212}') { '-' } else { c })
        .filter(|c| !c.is_whitespace())
        .collect();

    let parse = |s: &str| match s.parse::<u32>() {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(invalid()),
    };

    match normalized.split_once('-') {
        None => parse(&normalized).map(StaticHp::Fixed),
        Some((lo, hi)) => {
            let (lo, hi) = (parse(lo)?, parse(hi)?);
            match lo.cmp(&hi) {
                std::cmp::Ordering::Equal => Ok(StaticHp::Fixed(lo)),
                std::cmp::Ordering::Less => Ok(StaticHp::Range(lo, hi)),
                std::cmp::Ordering::Greater => Ok(StaticHp::Range(hi, lo)),
            }
        }
    }
}

/// Inclusive bounds for percent jitter around `base`, both floored at 1.
///
/// # Errors
///
/// Returns `InvalidPercent` when `percent` is not finite or outside `[0, 500]`.
pub fn percent_bounds(base: u32, percent: f64) -> Result<(u32, u32), HpError> {
    if !percent.is_finite() || !(0.0..=HP_PERCENT_MAX).contains(&percent) {
        return Err(HpError::InvalidPercent(percent));
    }
    let base = f64::from(base);
    let lo = round_hp(base * (1.0 - percent / 100.0));
    let hi = round_hp(base * (1.0 + percent / 100.0));
    Ok((lo, hi.max(lo)))
}

/// Uniform integer in `[lo, hi]`.
#[must_use]
pub fn draw_inclusive(lo: u32, hi: u32) -> u32 {
    if hi <= lo {
        return lo;
    }
    rand::rng().random_range(lo..=hi)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_hp(value: f64) -> u32 {
    let rounded = value.round();
    if rounded < 1.0 {
        1
    } else if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

fn clamp_hp(total: i64) -> u32 {
    u32::try_from(total.max(1)).unwrap_or(u32::MAX)
}
