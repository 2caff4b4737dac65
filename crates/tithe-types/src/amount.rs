use std::fmt;

use serde::{Deserialize, Serialize};

/// An amount in principal units: the fixed-value space unaffected by rebase
/// (gons/shares). Every stored contribution lives in this space.
///
/// `Principal` and [`Circulating`] are deliberately distinct types; crossing
/// between the two always goes through an explicit index conversion.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Principal(#[serde(with = "u128_string")] u128);

impl Principal {
    pub const ZERO: Principal = Principal(0);

    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Principal) -> Option<Principal> {
        self.0.checked_add(other.0).map(Principal)
    }

    pub fn checked_sub(self, other: Principal) -> Option<Principal> {
        self.0.checked_sub(other.0).map(Principal)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An amount in circulating units: the externally visible, rebase-adjusted
/// token amount. Wallet balances, transfers, and yield payouts live here.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Circulating(#[serde(with = "u128_string")] u128);

impl Circulating {
    pub const ZERO: Circulating = Circulating(0);

    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Circulating) -> Option<Circulating> {
        self.0.checked_add(other.0).map(Circulating)
    }

    pub fn checked_sub(self, other: Circulating) -> Option<Circulating> {
        self.0.checked_sub(other.0).map(Circulating)
    }
}

impl fmt::Debug for Circulating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circulating({})", self.0)
    }
}

impl fmt::Display for Circulating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialize `u128` as a decimal string: exact, and safe for JSON consumers
/// that cannot represent 128-bit integers.
pub(crate) mod u128_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>().map_err(serde::de::Error::custom)
    }
}
