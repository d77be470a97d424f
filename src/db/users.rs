//! User profile operations.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::notifications::notify_badges;
use super::repository::{
    badges_json, bump_revision, from_millis, new_id, now, parse_badges, parse_blood_type,
    require_text, to_millis, Repository,
};
use crate::auth::Caller;
use crate::domain::{grant_badge, Badge, BloodType, Coordinates, DeferralPolicy};
use crate::errors::AppError;
use crate::models::{UpdateLocationRequest, UpdateProfileRequest, UpsertProfileRequest, User};

const USER_COLUMNS: &str = "id, identity_id, full_name, email, blood_type, latitude, longitude, badges, donations_count, last_donation_at, eligibility_at, is_eligible, medical_history, created_at, updated_at";

impl Repository {
    /// Profile bound to an identity subject, with the eligibility flag
    /// refreshed against the current time.
    pub async fn get_user_by_identity(&self, identity_id: &str) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let user = fetch_user(&mut *conn, identity_id).await?;
        Ok(user.map(|u| refresh_eligibility(u, &self.policy, Utc::now())))
    }

    /// Like [`Repository::get_user_by_identity`] but a missing profile is an error.
    pub async fn require_user(&self, identity_id: &str) -> Result<User, AppError> {
        self.get_user_by_identity(identity_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Onboarding: create the caller's profile or overwrite its core fields.
    ///
    /// Supplying coordinates grants the "Verified Donor" badge the first time.
    pub async fn upsert_profile(
        &self,
        caller: &Caller,
        request: &UpsertProfileRequest,
    ) -> Result<User, AppError> {
        require_text(&request.full_name, "Full name")?;
        let blood_type: BloodType = request.blood_type.parse()?;
        let coordinates = validate_coordinates(request.latitude, request.longitude)?;

        let now = now();
        let mut tx = self.begin_write().await?;
        let existing = fetch_user(&mut *tx, caller.subject()).await?;

        let mut badges = existing.as_ref().map(|u| u.badges.clone()).unwrap_or_default();
        let mut new_badges = Vec::new();
        if coordinates.is_some() && grant_badge(&mut badges, Badge::VerifiedDonor) {
            new_badges.push(Badge::VerifiedDonor);
        }

        let user = match existing {
            Some(existing) => {
                let latitude = coordinates.map(|c| c.latitude).or(existing.latitude);
                let longitude = coordinates.map(|c| c.longitude).or(existing.longitude);

                sqlx::query(
                    "UPDATE users SET full_name = ?, email = ?, blood_type = ?, latitude = ?, longitude = ?, badges = ?, updated_at = ? WHERE id = ?"
                )
                .bind(request.full_name.trim())
                .bind(request.email.trim())
                .bind(blood_type.as_str())
                .bind(latitude)
                .bind(longitude)
                .bind(badges_json(&badges))
                .bind(to_millis(now))
                .bind(&existing.id)
                .execute(&mut *tx)
                .await?;

                User {
                    full_name: request.full_name.trim().to_string(),
                    email: request.email.trim().to_string(),
                    blood_type,
                    latitude,
                    longitude,
                    badges,
                    updated_at: now,
                    ..existing
                }
            }
            None => {
                let id = new_id();
                sqlx::query(
                    "INSERT INTO users (id, identity_id, full_name, email, blood_type, latitude, longitude, badges, donations_count, is_eligible, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 1, ?, ?)"
                )
                .bind(&id)
                .bind(caller.subject())
                .bind(request.full_name.trim())
                .bind(request.email.trim())
                .bind(blood_type.as_str())
                .bind(coordinates.map(|c| c.latitude))
                .bind(coordinates.map(|c| c.longitude))
                .bind(badges_json(&badges))
                .bind(to_millis(now))
                .bind(to_millis(now))
                .execute(&mut *tx)
                .await?;

                tracing::info!(identity_id = caller.subject(), "user profile created");

                User {
                    id,
                    identity_id: caller.subject().to_string(),
                    full_name: request.full_name.trim().to_string(),
                    email: request.email.trim().to_string(),
                    blood_type,
                    latitude: coordinates.map(|c| c.latitude),
                    longitude: coordinates.map(|c| c.longitude),
                    badges,
                    donations_count: 0,
                    last_donation_date: None,
                    eligibility_date: None,
                    is_eligible: true,
                    medical_history: None,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        notify_badges(&mut *tx, caller.subject(), &new_badges, now).await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(refresh_eligibility(user, &self.policy, now))
    }

    /// Partial edit of name, blood type and medical history.
    pub async fn update_profile(
        &self,
        caller: &Caller,
        request: &UpdateProfileRequest,
    ) -> Result<User, AppError> {
        let existing = self.require_user(caller.subject()).await?;

        if let Some(name) = &request.full_name {
            require_text(name, "Full name")?;
        }
        let blood_type = match &request.blood_type {
            Some(raw) => raw.parse::<BloodType>()?,
            None => existing.blood_type,
        };
        let full_name = request
            .full_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(existing.full_name.as_str())
            .to_string();
        let medical_history = request
            .medical_history
            .clone()
            .or(existing.medical_history.clone());
        let history_json = medical_history
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = now();

        sqlx::query(
            "UPDATE users SET full_name = ?, blood_type = ?, medical_history = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&full_name)
        .bind(blood_type.as_str())
        .bind(&history_json)
        .bind(to_millis(now))
        .bind(&existing.id)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(User {
            full_name,
            blood_type,
            medical_history,
            updated_at: now,
            ..existing
        })
    }

    /// Store a fresh one-shot location fix.
    pub async fn update_location(
        &self,
        caller: &Caller,
        request: &UpdateLocationRequest,
    ) -> Result<User, AppError> {
        let coordinates = Coordinates::new(request.latitude, request.longitude);
        if !coordinates.is_valid() {
            return Err(AppError::Validation("Coordinates out of range".to_string()));
        }

        let existing = self.require_user(caller.subject()).await?;
        let now = now();

        sqlx::query("UPDATE users SET latitude = ?, longitude = ?, updated_at = ? WHERE id = ?")
            .bind(coordinates.latitude)
            .bind(coordinates.longitude)
            .bind(to_millis(now))
            .bind(&existing.id)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;

        Ok(User {
            latitude: Some(coordinates.latitude),
            longitude: Some(coordinates.longitude),
            updated_at: now,
            ..existing
        })
    }
}

/// Read a profile on an existing connection (possibly inside a transaction).
pub(super) async fn fetch_user(
    conn: &mut SqliteConnection,
    identity_id: &str,
) -> Result<Option<User>, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE identity_id = ?",
        USER_COLUMNS
    ))
    .bind(identity_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Recompute the stored eligibility flag against `now`.
pub(super) fn refresh_eligibility(mut user: User, policy: &DeferralPolicy, now: DateTime<Utc>) -> User {
    user.is_eligible = policy.is_eligible(user.eligibility_date, now);
    user
}

fn validate_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<Coordinates>, AppError> {
    match (latitude, longitude) {
        (None, None) => Ok(None),
        (Some(lat), Some(lng)) => {
            let coordinates = Coordinates::new(lat, lng);
            if coordinates.is_valid() {
                Ok(Some(coordinates))
            } else {
                Err(AppError::Validation("Coordinates out of range".to_string()))
            }
        }
        _ => Err(AppError::Validation(
            "Latitude and longitude must be supplied together".to_string(),
        )),
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, AppError> {
    let blood_type: String = row.try_get("blood_type")?;
    let badges: String = row.try_get("badges")?;
    let is_eligible: i64 = row.try_get("is_eligible")?;
    let last_donation_at: Option<i64> = row.try_get("last_donation_at")?;
    let eligibility_at: Option<i64> = row.try_get("eligibility_at")?;
    let medical_history: Option<String> = row.try_get("medical_history")?;

    Ok(User {
        id: row.try_get("id")?,
        identity_id: row.try_get("identity_id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        blood_type: parse_blood_type(&blood_type)?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        badges: parse_badges(&badges),
        donations_count: row.try_get("donations_count")?,
        last_donation_date: last_donation_at.map(from_millis),
        eligibility_date: eligibility_at.map(from_millis),
        is_eligible: is_eligible != 0,
        medical_history: medical_history.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}
