//! Donation ledger entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Badge;

/// A completed donation. Never edited after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    pub donor_id: String,
    pub date: DateTime<Utc>,
    pub units: i64,
    #[serde(rename = "type")]
    pub donation_type: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request body for logging a donation by hand.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDonationRequest {
    pub units: i64,
    #[serde(rename = "type")]
    pub donation_type: String,
    pub location: String,
    #[serde(default)]
    pub certificate_ref: Option<String>,
}

/// Result of logging a donation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedDonation {
    pub donation: Donation,
    pub donations_count: i64,
    pub eligibility_date: DateTime<Utc>,
    pub new_badges: Vec<Badge>,
}
