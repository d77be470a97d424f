//! Donation ledger operations.
//!
//! Every donation updates the donor's count, badges and eligibility in the
//! same transaction that appends the ledger row.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::notifications::notify_badges;
use super::repository::{
    badges_json, bump_revision, from_millis, new_id, now, require_text, to_millis, Repository,
};
use super::users::fetch_user;
use crate::auth::Caller;
use crate::domain::{award_donation_badges, Badge, DeferralPolicy};
use crate::errors::AppError;
use crate::models::{Donation, LogDonationRequest, LoggedDonation, User};

impl Repository {
    /// Donation history of one donor, newest first.
    pub async fn list_donations(&self, donor_id: &str) -> Result<Vec<Donation>, AppError> {
        let rows = sqlx::query(
            "SELECT id, donor_id, date, units, donation_type, location, certificate_ref, created_at FROM donations WHERE donor_id = ? ORDER BY date DESC, rowid DESC"
        )
        .bind(donor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(donation_from_row).collect()
    }

    /// Record a donation the caller made outside the request board.
    pub async fn log_donation(
        &self,
        caller: &Caller,
        request: &LogDonationRequest,
    ) -> Result<LoggedDonation, AppError> {
        if request.units <= 0 {
            return Err(AppError::Validation("Units must be positive".to_string()));
        }
        require_text(&request.donation_type, "Donation type")?;
        require_text(&request.location, "Location")?;

        let now = now();
        let mut tx = self.begin_write().await?;

        let donor = fetch_user(&mut *tx, caller.subject())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(
                    "Donor profile not found. Please complete onboarding.".to_string(),
                )
            })?;

        let donation = insert_donation(
            &mut *tx,
            NewDonation {
                donor_id: caller.subject(),
                units: request.units,
                donation_type: request.donation_type.trim(),
                location: request.location.trim(),
                certificate_ref: request.certificate_ref.as_deref(),
            },
            now,
        )
        .await?;
        let update = apply_donation_to_donor(&mut *tx, &self.policy, &donor, now).await?;

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        tracing::info!(
            donor_id = caller.subject(),
            donations = update.donations_count,
            "donation logged"
        );

        Ok(LoggedDonation {
            donation,
            donations_count: update.donations_count,
            eligibility_date: update.eligibility_date,
            new_badges: update.new_badges,
        })
    }
}

pub(super) struct NewDonation<'a> {
    pub donor_id: &'a str,
    pub units: i64,
    pub donation_type: &'a str,
    pub location: &'a str,
    pub certificate_ref: Option<&'a str>,
}

pub(super) async fn insert_donation(
    conn: &mut SqliteConnection,
    new: NewDonation<'_>,
    now: DateTime<Utc>,
) -> Result<Donation, AppError> {
    let id = new_id();
    sqlx::query(
        "INSERT INTO donations (id, donor_id, date, units, donation_type, location, certificate_ref, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&id)
    .bind(new.donor_id)
    .bind(to_millis(now))
    .bind(new.units)
    .bind(new.donation_type)
    .bind(new.location)
    .bind(new.certificate_ref)
    .bind(to_millis(now))
    .execute(conn)
    .await?;

    Ok(Donation {
        id,
        donor_id: new.donor_id.to_string(),
        date: now,
        units: new.units,
        donation_type: new.donation_type.to_string(),
        location: new.location.to_string(),
        certificate_ref: new.certificate_ref.map(str::to_string),
        created_at: now,
    })
}

pub(super) struct DonorUpdate {
    pub donations_count: i64,
    pub eligibility_date: DateTime<Utc>,
    pub new_badges: Vec<Badge>,
}

/// Count the donation against the donor: bump the count, defer eligibility,
/// grant threshold badges and notify about them.
pub(super) async fn apply_donation_to_donor(
    conn: &mut SqliteConnection,
    policy: &DeferralPolicy,
    donor: &User,
    now: DateTime<Utc>,
) -> Result<DonorUpdate, AppError> {
    let donations_count = donor.donations_count + 1;
    let eligibility_date = policy.eligibility_date(now);
    let mut badges = donor.badges.clone();
    let new_badges = award_donation_badges(&mut badges, donations_count);

    sqlx::query(
        "UPDATE users SET donations_count = ?, last_donation_at = ?, eligibility_at = ?, is_eligible = 0, badges = ?, updated_at = ? WHERE id = ?"
    )
    .bind(donations_count)
    .bind(to_millis(now))
    .bind(to_millis(eligibility_date))
    .bind(badges_json(&badges))
    .bind(to_millis(now))
    .bind(&donor.id)
    .execute(&mut *conn)
    .await?;

    notify_badges(conn, &donor.identity_id, &new_badges, now).await?;

    Ok(DonorUpdate {
        donations_count,
        eligibility_date,
        new_badges,
    })
}

fn donation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Donation, AppError> {
    Ok(Donation {
        id: row.try_get("id")?,
        donor_id: row.try_get("donor_id")?,
        date: from_millis(row.try_get("date")?),
        units: row.try_get("units")?,
        donation_type: row.try_get("donation_type")?,
        location: row.try_get("location")?,
        certificate_ref: row.try_get("certificate_ref")?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}
