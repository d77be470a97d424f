//! ABO/Rh blood types and the donor/recipient compatibility chart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One of the eight ABO/Rh categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BloodType {
    APos,
    ANeg,
    BPos,
    BNeg,
    AbPos,
    AbNeg,
    OPos,
    ONeg,
}

impl BloodType {
    /// All types, in the row/column order of [`COMPATIBILITY`].
    pub const ALL: [BloodType; 8] = [
        BloodType::APos,
        BloodType::ANeg,
        BloodType::BPos,
        BloodType::BNeg,
        BloodType::AbPos,
        BloodType::AbNeg,
        BloodType::OPos,
        BloodType::ONeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::APos => "A+",
            BloodType::ANeg => "A-",
            BloodType::BPos => "B+",
            BloodType::BNeg => "B-",
            BloodType::AbPos => "AB+",
            BloodType::AbNeg => "AB-",
            BloodType::OPos => "O+",
            BloodType::ONeg => "O-",
        }
    }

    /// Parse a type string, ignoring case and surrounding whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A+" => Some(BloodType::APos),
            "A-" => Some(BloodType::ANeg),
            "B+" => Some(BloodType::BPos),
            "B-" => Some(BloodType::BNeg),
            "AB+" => Some(BloodType::AbPos),
            "AB-" => Some(BloodType::AbNeg),
            "O+" => Some(BloodType::OPos),
            "O-" => Some(BloodType::ONeg),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            BloodType::APos => 0,
            BloodType::ANeg => 1,
            BloodType::BPos => 2,
            BloodType::BNeg => 3,
            BloodType::AbPos => 4,
            BloodType::AbNeg => 5,
            BloodType::OPos => 6,
            BloodType::ONeg => 7,
        }
    }

    /// Whether a donor of this type may give to `recipient`.
    pub fn can_donate_to(self, recipient: BloodType) -> bool {
        COMPATIBILITY[self.index()][recipient.index()]
    }

    /// Types this donor may give to.
    pub fn compatible_recipients(self) -> Vec<BloodType> {
        BloodType::ALL
            .into_iter()
            .filter(|r| self.can_donate_to(*r))
            .collect()
    }

    /// Types that may give to this recipient.
    pub fn compatible_donors(self) -> Vec<BloodType> {
        BloodType::ALL
            .into_iter()
            .filter(|d| d.can_donate_to(self))
            .collect()
    }
}

const T: bool = true;
const F: bool = false;

/// Donor (row) to recipient (column), both in [`BloodType::ALL`] order:
/// A+, A-, B+, B-, AB+, AB-, O+, O-.
#[rustfmt::skip]
pub const COMPATIBILITY: [[bool; 8]; 8] = [
    //         A+ A- B+ B- AB+ AB- O+ O-
    /* A+  */ [T, F, F, F, T,  F,  F, F],
    /* A-  */ [T, T, F, F, T,  T,  F, F],
    /* B+  */ [F, F, T, F, T,  F,  F, F],
    /* B-  */ [F, F, T, T, T,  T,  F, F],
    /* AB+ */ [F, F, F, F, T,  F,  F, F],
    /* AB- */ [F, F, F, F, T,  T,  F, F],
    /* O+  */ [T, F, T, F, T,  F,  T, F],
    /* O-  */ [T, T, T, T, T,  T,  T, T],
];

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the eight blood types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBloodType(pub String);

impl fmt::Display for UnknownBloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown blood type '{}'", self.0)
    }
}

impl std::error::Error for UnknownBloodType {}

impl FromStr for BloodType {
    type Err = UnknownBloodType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BloodType::parse(s).ok_or_else(|| UnknownBloodType(s.to_string()))
    }
}

impl Serialize for BloodType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BloodType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
