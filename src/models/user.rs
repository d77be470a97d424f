//! User profile bound one-to-one to an identity-provider subject.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{self, Badge, BloodType, Coordinates, DeferralPolicy};

/// A donor/requester profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// Subject ID issued by the identity provider
    pub identity_id: String,
    pub full_name: String,
    pub email: String,
    pub blood_type: BloodType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub badges: Vec<Badge>,
    pub donations_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_donation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility_date: Option<DateTime<Utc>>,
    pub is_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }
}

/// Derived gamification and eligibility figures for the profile screen.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub level: i64,
    pub level_progress: f64,
    pub next_level_at: i64,
    pub donations_to_next_level: i64,
    pub eligibility_progress_percent: f64,
    pub days_until_eligible: i64,
    pub can_donate_to: Vec<BloodType>,
    pub can_receive_from: Vec<BloodType>,
}

impl ProfileStats {
    pub fn compute(user: &User, policy: &DeferralPolicy, now: DateTime<Utc>) -> Self {
        let count = user.donations_count;
        Self {
            level: domain::level(count),
            level_progress: domain::level_progress(count),
            next_level_at: domain::next_level_at(count),
            donations_to_next_level: domain::next_level_at(count) - count,
            eligibility_progress_percent: policy.progress_percent(user.last_donation_date, now),
            days_until_eligible: policy.days_until_eligible(user.eligibility_date, now),
            can_donate_to: user.blood_type.compatible_recipients(),
            can_receive_from: user.blood_type.compatible_donors(),
        }
    }
}

/// The caller's own profile with derived stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(flatten)]
    pub user: User,
    pub stats: ProfileStats,
}

/// What other users may see of a profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub identity_id: String,
    pub full_name: String,
    pub blood_type: BloodType,
    pub badges: Vec<Badge>,
    pub donations_count: i64,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            identity_id: user.identity_id,
            full_name: user.full_name,
            blood_type: user.blood_type,
            badges: user.badges,
            donations_count: user.donations_count,
        }
    }
}

/// Onboarding body: creates the profile or overwrites its core fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProfileRequest {
    pub full_name: String,
    pub email: String,
    pub blood_type: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Partial profile edit.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub medical_history: Option<serde_json::Value>,
}

/// Body for a one-shot location update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}
