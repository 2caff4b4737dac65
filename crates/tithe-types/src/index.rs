use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::{Circulating, Principal};
use crate::error::TypeError;

/// The global rebase multiplier converting principal units to circulating
/// units. Fixed-point with 9 fractional decimal digits; owned and advanced by
/// the external staking collaborator, read-only from the ledger's side.
///
/// Both conversions floor, matching the receipt token's own truncating
/// arithmetic. A zero index is invalid by construction.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RebaseIndex {
    #[serde(with = "crate::amount::u128_string")]
    raw: u128,
}

impl RebaseIndex {
    /// Fixed-point scale: `raw == SCALE` means an index of exactly 1.0.
    pub const SCALE: u128 = 1_000_000_000;

    /// The identity index (1.0): principal and circulating coincide.
    pub const ONE: RebaseIndex = RebaseIndex { raw: Self::SCALE };

    /// Construct from a raw fixed-point value. Rejects zero.
    pub fn from_raw(raw: u128) -> Result<Self, TypeError> {
        if raw == 0 {
            return Err(TypeError::ZeroIndex);
        }
        Ok(Self { raw })
    }

    /// Parse a decimal string such as `"1.05"` (at most 9 fractional digits).
    pub fn from_decimal_str(s: &str) -> Result<Self, TypeError> {
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(TypeError::InvalidDecimal(s.to_string()));
        }
        if frac.len() > 9 {
            return Err(TypeError::InvalidDecimal(s.to_string()));
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| TypeError::InvalidDecimal(s.to_string()))?
        };
        let frac: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<9}");
            padded
                .parse()
                .map_err(|_| TypeError::InvalidDecimal(s.to_string()))?
        };
        let raw = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| TypeError::InvalidDecimal(s.to_string()))?;
        Self::from_raw(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.raw
    }

    /// Convert principal units to circulating units, flooring.
    ///
    /// Returns `None` on arithmetic overflow of the intermediate product.
    pub fn to_circulating(&self, amount: Principal) -> Option<Circulating> {
        amount
            .raw()
            .checked_mul(self.raw)
            .map(|product| Circulating::new(product / Self::SCALE))
    }

    /// Convert circulating units to principal units, flooring.
    pub fn to_principal(&self, amount: Circulating) -> Option<Principal> {
        amount
            .raw()
            .checked_mul(Self::SCALE)
            .map(|product| Principal::new(product / self.raw))
    }
}

fn format_decimal(raw: u128, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let whole = raw / RebaseIndex::SCALE;
    let frac = raw % RebaseIndex::SCALE;
    if frac == 0 {
        write!(f, "{whole}.0")
    } else {
        let frac = format!("{frac:09}");
        write!(f, "{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl fmt::Debug for RebaseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RebaseIndex(")?;
        format_decimal(self.raw, f)?;
        write!(f, ")")
    }
}

impl fmt::Display for RebaseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_decimal(self.raw, f)
    }
}
