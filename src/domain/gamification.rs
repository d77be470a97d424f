//! Badges and donor levels.

use serde::{Deserialize, Serialize};

/// Donations needed per level.
pub const DONATIONS_PER_LEVEL: i64 = 5;

/// Achievement marker on a user profile. Never removed once granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Badge {
    #[serde(rename = "First Blood")]
    FirstBlood,
    #[serde(rename = "Committed Donor")]
    CommittedDonor,
    #[serde(rename = "Dedicated Donor")]
    DedicatedDonor,
    #[serde(rename = "Verified Donor")]
    VerifiedDonor,
}

/// Donation-count thresholds, lowest first.
const DONATION_BADGES: [(i64, Badge); 3] = [
    (1, Badge::FirstBlood),
    (5, Badge::CommittedDonor),
    (10, Badge::DedicatedDonor),
];

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::FirstBlood => "First Blood",
            Badge::CommittedDonor => "Committed Donor",
            Badge::DedicatedDonor => "Dedicated Donor",
            Badge::VerifiedDonor => "Verified Donor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "First Blood" => Some(Badge::FirstBlood),
            "Committed Donor" => Some(Badge::CommittedDonor),
            "Dedicated Donor" => Some(Badge::DedicatedDonor),
            "Verified Donor" => Some(Badge::VerifiedDonor),
            _ => None,
        }
    }
}

/// Add `badge` unless already present. Returns whether it was added.
pub fn grant_badge(badges: &mut Vec<Badge>, badge: Badge) -> bool {
    if badges.contains(&badge) {
        return false;
    }
    badges.push(badge);
    true
}

/// Grant every donation badge whose threshold `donations` has reached.
/// Returns the badges that were newly added, in threshold order.
pub fn award_donation_badges(badges: &mut Vec<Badge>, donations: i64) -> Vec<Badge> {
    DONATION_BADGES
        .iter()
        .filter(|(threshold, _)| donations >= *threshold)
        .filter_map(|(_, badge)| grant_badge(badges, *badge).then_some(*badge))
        .collect()
}

/// Level, starting at 1 and rising every [`DONATIONS_PER_LEVEL`] donations.
pub fn level(donations: i64) -> i64 {
    donations.max(0) / DONATIONS_PER_LEVEL + 1
}

/// Fraction of the way to the next level, in `0.0..1.0`.
pub fn level_progress(donations: i64) -> f64 {
    (donations.max(0) % DONATIONS_PER_LEVEL) as f64 / DONATIONS_PER_LEVEL as f64
}

/// Cumulative donation count at which the next level starts.
pub fn next_level_at(donations: i64) -> i64 {
    level(donations) * DONATIONS_PER_LEVEL
}
