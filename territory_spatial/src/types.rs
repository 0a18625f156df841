// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types shared by every layer: region codes and granularity.

use core::fmt;
use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Canonical identifier of a postal region.
///
/// Codes are produced once, during dataset ingestion, and compared as plain
/// strings afterwards. Ordering is lexicographic, which for zero-padded numeric
/// codes matches numeric order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCode(String);

impl RegionCode {
    /// Wrap an already-normalized code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RegionCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RegionCode {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RegionCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Digit precision of the postal boundaries in use.
///
/// German postal regions are published at 1, 2, 3 and 5 digits; any value in
/// `1..=5` is accepted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Granularity(u8);

impl Granularity {
    /// Single-digit regions.
    pub const ONE: Self = Self(1);
    /// Two-digit regions.
    pub const TWO: Self = Self(2);
    /// Three-digit regions.
    pub const THREE: Self = Self(3);
    /// Full five-digit postal codes.
    pub const FIVE: Self = Self(5);

    /// Validate a digit count.
    pub const fn new(digits: u8) -> Option<Self> {
        if digits >= 1 && digits <= 5 {
            Some(Self(digits))
        } else {
            None
        }
    }

    /// Number of digits per code.
    pub const fn digits(self) -> u8 {
        self.0
    }

    /// Normalize a raw code to this granularity.
    ///
    /// Purely numeric codes shorter than the digit count are left-padded with
    /// zeros (`"1067"` becomes `"01067"` at five digits). Other codes are only
    /// trimmed. Returns `None` when a numeric code is too long.
    pub fn normalize(self, raw: &str) -> Option<RegionCode> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Some(RegionCode::from(raw));
        }
        let digits = usize::from(self.0);
        if raw.len() > digits {
            return None;
        }
        Some(RegionCode::new(format!("{raw:0>digits$}")))
    }
}

impl TryFrom<u8> for Granularity {
    type Error = String;

    fn try_from(digits: u8) -> Result<Self, Self::Error> {
        Self::new(digits).ok_or_else(|| format!("granularity must be 1..=5 digits, got {digits}"))
    }
}

impl From<Granularity> for u8 {
    fn from(g: Granularity) -> Self {
        g.0
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-digit", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_are_zero_padded() {
        assert_eq!(Granularity::FIVE.normalize("1067"), Some(RegionCode::from("01067")));
        assert_eq!(Granularity::TWO.normalize(" 8 "), Some(RegionCode::from("08")));
        assert_eq!(Granularity::TWO.normalize("80331"), None);
        assert_eq!(Granularity::FIVE.normalize(""), None);
    }

    #[test]
    fn non_numeric_codes_pass_through() {
        assert_eq!(Granularity::THREE.normalize("SW1A"), Some(RegionCode::from("SW1A")));
    }

    #[test]
    fn granularity_bounds() {
        assert!(Granularity::new(0).is_none());
        assert!(Granularity::new(6).is_none());
        assert_eq!(Granularity::new(4).map(Granularity::digits), Some(4));
        let g: Result<Granularity, _> = serde_json::from_str("3");
        assert_eq!(g.ok(), Some(Granularity::THREE));
        assert!(serde_json::from_str::<Granularity>("9").is_err());
    }
}
