//! Blood request board and the fulfillment transaction.

use sqlx::{Row, SqliteConnection};

use super::donations::{apply_donation_to_donor, insert_donation, NewDonation};
use super::notifications::insert_notification;
use super::repository::{
    bump_revision, from_millis, new_id, now, parse_blood_type, require_text, to_millis, Repository,
};
use super::users::fetch_user;
use crate::auth::Caller;
use crate::domain::{distance_between, sort_by_distance, BloodType, Coordinates};
use crate::errors::AppError;
use crate::models::{
    BloodRequest, CreateBloodRequest, FulfillmentReceipt, NotificationType, RequestWithDistance,
    UpdateBloodRequest,
};

const REQUEST_COLUMNS: &str = "id, patient_name, hospital_name, blood_type, units_required, requester_id, is_fulfilled, latitude, longitude, created_at, updated_at";

impl Repository {
    /// Every request, newest first.
    pub async fn list_requests(&self) -> Result<Vec<BloodRequest>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM blood_requests ORDER BY created_at DESC, rowid DESC",
            REQUEST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    /// Open requests needing exactly `blood_type`, newest first.
    pub async fn list_open_requests_by_type(
        &self,
        blood_type: BloodType,
    ) -> Result<Vec<BloodRequest>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM blood_requests WHERE blood_type = ? AND is_fulfilled = 0 ORDER BY created_at DESC, rowid DESC",
            REQUEST_COLUMNS
        ))
        .bind(blood_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    /// Open requests the caller's blood type can donate to, nearest first
    /// from the caller's stored coordinates.
    pub async fn list_matching_requests(
        &self,
        caller: &Caller,
    ) -> Result<Vec<RequestWithDistance>, AppError> {
        let donor = self.require_user(caller.subject()).await?;
        let origin = donor.coordinates();

        let rows = sqlx::query(&format!(
            "SELECT {} FROM blood_requests WHERE is_fulfilled = 0 ORDER BY created_at DESC, rowid DESC",
            REQUEST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut matching = Vec::new();
        for row in &rows {
            let request = request_from_row(row)?;
            if donor.blood_type.can_donate_to(request.blood_type) {
                matching.push(RequestWithDistance {
                    distance_km: distance_between(origin, request.coordinates()),
                    request,
                });
            }
        }
        sort_by_distance(&mut matching, |r| r.distance_km);
        Ok(matching)
    }

    pub async fn get_request(&self, id: &str) -> Result<BloodRequest, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_request(&mut *conn, id).await
    }

    /// Post a new open request on behalf of the caller.
    pub async fn create_request(
        &self,
        caller: &Caller,
        request: &CreateBloodRequest,
    ) -> Result<BloodRequest, AppError> {
        require_text(&request.patient_name, "Patient name")?;
        require_text(&request.hospital_name, "Hospital name")?;
        let blood_type: BloodType = request.blood_type.parse()?;
        validate_units(request.units_required)?;
        let coordinates = request_coordinates(request.latitude, request.longitude)?;

        let id = new_id();
        let now = now();

        sqlx::query(
            "INSERT INTO blood_requests (id, patient_name, hospital_name, blood_type, units_required, requester_id, is_fulfilled, latitude, longitude, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(request.patient_name.trim())
        .bind(request.hospital_name.trim())
        .bind(blood_type.as_str())
        .bind(request.units_required)
        .bind(caller.subject())
        .bind(coordinates.map(|c| c.latitude))
        .bind(coordinates.map(|c| c.longitude))
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        tracing::info!(request_id = %id, blood_type = blood_type.as_str(), "blood request created");

        Ok(BloodRequest {
            id,
            patient_name: request.patient_name.trim().to_string(),
            hospital_name: request.hospital_name.trim().to_string(),
            blood_type,
            units_required: request.units_required,
            requester_id: caller.subject().to_string(),
            is_fulfilled: false,
            latitude: coordinates.map(|c| c.latitude),
            longitude: coordinates.map(|c| c.longitude),
            created_at: now,
            updated_at: now,
        })
    }

    /// Edit an open request. Only its creator may do this.
    pub async fn update_request(
        &self,
        caller: &Caller,
        id: &str,
        update: &UpdateBloodRequest,
    ) -> Result<BloodRequest, AppError> {
        let existing = self.get_request(id).await?;
        if existing.requester_id != caller.subject() {
            return Err(AppError::Forbidden(
                "Not authorized to update this request".to_string(),
            ));
        }
        if existing.is_fulfilled {
            return Err(fulfilled_not_editable());
        }

        if let Some(name) = &update.patient_name {
            require_text(name, "Patient name")?;
        }
        if let Some(name) = &update.hospital_name {
            require_text(name, "Hospital name")?;
        }
        let blood_type = match &update.blood_type {
            Some(raw) => raw.parse::<BloodType>()?,
            None => existing.blood_type,
        };
        let units_required = update.units_required.unwrap_or(existing.units_required);
        validate_units(units_required)?;
        let coordinates = match request_coordinates(update.latitude, update.longitude)? {
            Some(c) => Some(c),
            None => existing.coordinates(),
        };

        let updated = BloodRequest {
            patient_name: update
                .patient_name
                .as_deref()
                .map(str::trim)
                .unwrap_or(existing.patient_name.as_str())
                .to_string(),
            hospital_name: update
                .hospital_name
                .as_deref()
                .map(str::trim)
                .unwrap_or(existing.hospital_name.as_str())
                .to_string(),
            blood_type,
            units_required,
            latitude: coordinates.map(|c| c.latitude),
            longitude: coordinates.map(|c| c.longitude),
            updated_at: now(),
            ..existing
        };

        let result = sqlx::query(
            "UPDATE blood_requests SET patient_name = ?, hospital_name = ?, blood_type = ?, units_required = ?, latitude = ?, longitude = ?, updated_at = ? WHERE id = ? AND is_fulfilled = 0"
        )
        .bind(&updated.patient_name)
        .bind(&updated.hospital_name)
        .bind(updated.blood_type.as_str())
        .bind(updated.units_required)
        .bind(updated.latitude)
        .bind(updated.longitude)
        .bind(to_millis(updated.updated_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        // Fulfilled between the read above and this write.
        if result.rows_affected() == 0 {
            return Err(fulfilled_not_editable());
        }

        self.increment_revision().await?;

        Ok(updated)
    }

    /// Manual status change by the creator. Only open -> fulfilled is allowed;
    /// asking for "open" on an open request is a no-op.
    pub async fn set_request_status(
        &self,
        caller: &Caller,
        id: &str,
        is_fulfilled: bool,
    ) -> Result<BloodRequest, AppError> {
        let existing = self.get_request(id).await?;
        if existing.requester_id != caller.subject() {
            return Err(AppError::Forbidden(
                "Not authorized to update this request".to_string(),
            ));
        }

        match (existing.is_fulfilled, is_fulfilled) {
            (false, false) => Ok(existing),
            (true, false) => Err(AppError::RuleViolation(
                "A fulfilled request cannot be reopened".to_string(),
            )),
            (true, true) => Err(already_fulfilled()),
            (false, true) => {
                let now = now();
                let result = sqlx::query(
                    "UPDATE blood_requests SET is_fulfilled = 1, updated_at = ? WHERE id = ? AND is_fulfilled = 0",
                )
                .bind(to_millis(now))
                .bind(id)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(already_fulfilled());
                }
                self.increment_revision().await?;

                Ok(BloodRequest {
                    is_fulfilled: true,
                    updated_at: now,
                    ..existing
                })
            }
        }
    }

    /// Remove a request. Only its creator may do this.
    pub async fn delete_request(&self, caller: &Caller, id: &str) -> Result<(), AppError> {
        let existing = self.get_request(id).await?;
        if existing.requester_id != caller.subject() {
            return Err(AppError::Forbidden(
                "Not authorized to delete this request".to_string(),
            ));
        }

        sqlx::query("DELETE FROM blood_requests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;
        tracing::info!(request_id = id, "blood request deleted");
        Ok(())
    }

    /// The caller volunteers to donate for a request.
    ///
    /// Marks the request fulfilled, appends the donation, notifies the
    /// requester and updates the donor's stats in one transaction; any
    /// failure leaves nothing behind.
    pub async fn fulfill_request(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<FulfillmentReceipt, AppError> {
        let now = now();
        let mut tx = self.begin_write().await?;

        let request = fetch_request(&mut *tx, id).await?;
        if request.is_fulfilled {
            return Err(already_fulfilled());
        }

        let donor = fetch_user(&mut *tx, caller.subject())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(
                    "Donor profile not found. Please complete onboarding.".to_string(),
                )
            })?;

        if !donor.blood_type.can_donate_to(request.blood_type) {
            return Err(AppError::RuleViolation(format!(
                "Blood type {} cannot donate to {}",
                donor.blood_type.as_str(),
                request.blood_type.as_str()
            )));
        }

        // Conditional on the flag so a concurrent donor loses cleanly.
        let claimed = sqlx::query(
            "UPDATE blood_requests SET is_fulfilled = 1, updated_at = ? WHERE id = ? AND is_fulfilled = 0",
        )
        .bind(to_millis(now))
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Err(already_fulfilled());
        }

        let donation = insert_donation(
            &mut *tx,
            NewDonation {
                donor_id: caller.subject(),
                units: request.units_required,
                donation_type: donor.blood_type.as_str(),
                location: &request.hospital_name,
                certificate_ref: None,
            },
            now,
        )
        .await?;

        let message = format!(
            "Great news! {} has volunteered to donate for your request.",
            donor.full_name
        );
        let notification_id = insert_notification(
            &mut *tx,
            &request.requester_id,
            NotificationType::RequestFulfilled,
            &message,
            Some(request.id.as_str()),
            now,
        )
        .await?;

        let update = apply_donation_to_donor(&mut *tx, &self.policy, &donor, now).await?;

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        tracing::info!(
            request_id = id,
            donor_id = caller.subject(),
            donations = update.donations_count,
            "blood request fulfilled"
        );

        Ok(FulfillmentReceipt {
            request: BloodRequest {
                is_fulfilled: true,
                updated_at: now,
                ..request
            },
            donation,
            notification_id,
            new_badges: update.new_badges,
        })
    }
}

async fn fetch_request(conn: &mut SqliteConnection, id: &str) -> Result<BloodRequest, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM blood_requests WHERE id = ?",
        REQUEST_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    match row {
        Some(row) => request_from_row(&row),
        None => Err(AppError::NotFound(format!("Request {} not found", id))),
    }
}

fn fulfilled_not_editable() -> AppError {
    AppError::RuleViolation("A fulfilled request can no longer be edited".to_string())
}

fn already_fulfilled() -> AppError {
    AppError::RuleViolation("This request has already been fulfilled".to_string())
}

fn validate_units(units: i64) -> Result<(), AppError> {
    if units <= 0 {
        return Err(AppError::Validation(
            "Units required must be positive".to_string(),
        ));
    }
    Ok(())
}

fn request_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<Coordinates>, AppError> {
    match Coordinates::from_parts(latitude, longitude) {
        Some(c) if !c.is_valid() => Err(AppError::Validation("Coordinates out of range".to_string())),
        Some(c) => Ok(Some(c)),
        None if latitude.is_some() || longitude.is_some() => Err(AppError::Validation(
            "Latitude and longitude must be supplied together".to_string(),
        )),
        None => Ok(None),
    }
}

fn request_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BloodRequest, AppError> {
    let blood_type: String = row.try_get("blood_type")?;
    let is_fulfilled: i64 = row.try_get("is_fulfilled")?;
    Ok(BloodRequest {
        id: row.try_get("id")?,
        patient_name: row.try_get("patient_name")?,
        hospital_name: row.try_get("hospital_name")?,
        blood_type: parse_blood_type(&blood_type)?,
        units_required: row.try_get("units_required")?,
        requester_id: row.try_get("requester_id")?,
        is_fulfilled: is_fulfilled != 0,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;
    use crate::domain::Badge;
    use crate::models::UpsertProfileRequest;

    async fn onboard(repo: &Repository, subject: &str, name: &str, blood_type: &str) -> Caller {
        let caller = Caller(subject.to_string());
        repo.upsert_profile(
            &caller,
            &UpsertProfileRequest {
                full_name: name.to_string(),
                email: format!("{}@example.com", subject),
                blood_type: blood_type.to_string(),
                latitude: None,
                longitude: None,
            },
        )
        .await
        .unwrap();
        caller
    }

    fn new_request(blood_type: &str) -> CreateBloodRequest {
        CreateBloodRequest {
            patient_name: "Jane Roe".to_string(),
            hospital_name: "St. Mary Hospital".to_string(),
            blood_type: blood_type.to_string(),
            units_required: 2,
            latitude: None,
            longitude: None,
        }
    }

    async fn donation_count(repo: &Repository) -> i64 {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM donations")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        row.get("n")
    }

    async fn notification_count(repo: &Repository) -> i64 {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM notifications")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        row.get("n")
    }

    #[tokio::test]
    async fn test_fulfillment_writes_all_side_effects() {
        let (repo, _dir) = test_support::repository().await;
        let requester = Caller("requester".to_string());
        let donor = onboard(&repo, "donor", "Olu Donor", "O-").await;
        let request = repo.create_request(&requester, &new_request("AB+")).await.unwrap();
        let revision_before = repo.get_revision_id().await.unwrap();

        let receipt = repo.fulfill_request(&donor, &request.id).await.unwrap();
        assert!(receipt.request.is_fulfilled);
        assert_eq!(receipt.donation.units, 2);
        assert_eq!(receipt.donation.donation_type, "O-");
        assert_eq!(receipt.donation.location, "St. Mary Hospital");
        assert_eq!(receipt.new_badges, vec![Badge::FirstBlood]);

        assert!(repo.get_request(&request.id).await.unwrap().is_fulfilled);

        let inbox = repo.list_notifications("requester").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::RequestFulfilled);
        assert_eq!(inbox[0].related_id.as_deref(), Some(request.id.as_str()));
        assert!(inbox[0].message.contains("Olu Donor"));

        let stats = repo.require_user("donor").await.unwrap();
        assert_eq!(stats.donations_count, 1);
        assert!(!stats.is_eligible);
        assert!(repo.get_revision_id().await.unwrap() > revision_before);
    }

    #[tokio::test]
    async fn test_already_fulfilled_request_adds_nothing() {
        let (repo, _dir) = test_support::repository().await;
        let requester = Caller("requester".to_string());
        let first = onboard(&repo, "first", "First Donor", "O-").await;
        let second = onboard(&repo, "second", "Second Donor", "A+").await;
        let request = repo.create_request(&requester, &new_request("A+")).await.unwrap();

        repo.fulfill_request(&first, &request.id).await.unwrap();
        let donations = donation_count(&repo).await;
        let notifications = notification_count(&repo).await;

        let err = repo.fulfill_request(&second, &request.id).await.unwrap_err();
        assert!(matches!(err, AppError::RuleViolation(_)));
        assert_eq!(donation_count(&repo).await, donations);
        assert_eq!(notification_count(&repo).await, notifications);
        assert_eq!(repo.require_user("second").await.unwrap().donations_count, 0);
    }

    #[tokio::test]
    async fn test_incompatible_donor_leaves_no_side_effects() {
        let (repo, _dir) = test_support::repository().await;
        let requester = Caller("requester".to_string());
        let donor = onboard(&repo, "donor", "AB Donor", "AB+").await;
        let request = repo.create_request(&requester, &new_request("O-")).await.unwrap();
        let revision_before = repo.get_revision_id().await.unwrap();

        let err = repo.fulfill_request(&donor, &request.id).await.unwrap_err();
        assert!(matches!(err, AppError::RuleViolation(_)));

        assert!(!repo.get_request(&request.id).await.unwrap().is_fulfilled);
        assert_eq!(donation_count(&repo).await, 0);
        assert_eq!(notification_count(&repo).await, 0);
        assert_eq!(repo.require_user("donor").await.unwrap().donations_count, 0);
        assert_eq!(repo.get_revision_id().await.unwrap(), revision_before);
    }

    #[tokio::test]
    async fn test_fulfillment_without_profile_or_request() {
        let (repo, _dir) = test_support::repository().await;
        let requester = Caller("requester".to_string());
        let request = repo.create_request(&requester, &new_request("A+")).await.unwrap();

        let err = repo
            .fulfill_request(&Caller("stranger".to_string()), &request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!repo.get_request(&request.id).await.unwrap().is_fulfilled);

        let donor = onboard(&repo, "donor", "Donor", "O-").await;
        let err = repo.fulfill_request(&donor, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_only_creator_modifies_request() {
        let (repo, _dir) = test_support::repository().await;
        let owner = Caller("owner".to_string());
        let intruder = Caller("intruder".to_string());
        let request = repo.create_request(&owner, &new_request("B-")).await.unwrap();

        let edit = UpdateBloodRequest {
            units_required: Some(4),
            ..Default::default()
        };
        let err = repo.update_request(&intruder, &request.id, &edit).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = repo.delete_request(&intruder, &request.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = repo.set_request_status(&intruder, &request.id, true).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let edited = repo.update_request(&owner, &request.id, &edit).await.unwrap();
        assert_eq!(edited.units_required, 4);
        assert_eq!(edited.patient_name, "Jane Roe");

        repo.delete_request(&owner, &request.id).await.unwrap();
        let err = repo.get_request(&request.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let (repo, _dir) = test_support::repository().await;
        let owner = Caller("owner".to_string());
        let request = repo.create_request(&owner, &new_request("A-")).await.unwrap();

        let unchanged = repo.set_request_status(&owner, &request.id, false).await.unwrap();
        assert!(!unchanged.is_fulfilled);

        let closed = repo.set_request_status(&owner, &request.id, true).await.unwrap();
        assert!(closed.is_fulfilled);

        let err = repo.set_request_status(&owner, &request.id, false).await.unwrap_err();
        assert!(matches!(err, AppError::RuleViolation(_)));
        let err = repo.set_request_status(&owner, &request.id, true).await.unwrap_err();
        assert!(matches!(err, AppError::RuleViolation(_)));

        let edit = UpdateBloodRequest {
            patient_name: Some("Changed".to_string()),
            ..Default::default()
        };
        let err = repo.update_request(&owner, &request.id, &edit).await.unwrap_err();
        assert!(matches!(err, AppError::RuleViolation(_)));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (repo, _dir) = test_support::repository().await;
        let owner = Caller("owner".to_string());

        let mut bad_units = new_request("A+");
        bad_units.units_required = 0;
        assert!(matches!(
            repo.create_request(&owner, &bad_units).await.unwrap_err(),
            AppError::Validation(_)
        ));

        assert!(matches!(
            repo.create_request(&owner, &new_request("Z+")).await.unwrap_err(),
            AppError::Validation(_)
        ));

        let mut bad_coords = new_request("A+");
        bad_coords.latitude = Some(120.0);
        bad_coords.longitude = Some(0.0);
        assert!(matches!(
            repo.create_request(&owner, &bad_coords).await.unwrap_err(),
            AppError::Validation(_)
        ));

        assert!(repo.list_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_by_type_and_matching_lists() {
        let (repo, _dir) = test_support::repository().await;
        let owner = Caller("owner".to_string());
        let a_pos = repo.create_request(&owner, &new_request("A+")).await.unwrap();
        let o_neg = repo.create_request(&owner, &new_request("O-")).await.unwrap();
        let ab_pos = repo.create_request(&owner, &new_request("AB+")).await.unwrap();

        let by_type = repo.list_open_requests_by_type(BloodType::APos).await.unwrap();
        assert_eq!(by_type.len(), 1);
        assert_eq!(by_type[0].id, a_pos.id);

        onboard(&repo, "a-neg", "A Neg", "A-").await;
        let matching = repo
            .list_matching_requests(&Caller("a-neg".to_string()))
            .await
            .unwrap();
        let ids: Vec<&str> = matching.iter().map(|r| r.request.id.as_str()).collect();
        assert!(ids.contains(&a_pos.id.as_str()));
        assert!(ids.contains(&ab_pos.id.as_str()));
        assert!(!ids.contains(&o_neg.id.as_str()));

        let listed = repo.list_requests().await.unwrap();
        assert_eq!(listed[0].id, ab_pos.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_donors_fulfil_once() {
        let (repo, _dir) = test_support::repository().await;
        let requester = onboard(&repo, "requester", "Rita Requester", "A+").await;
        let request = repo.create_request(&requester, &new_request("A+")).await.unwrap();

        let mut donors = Vec::new();
        for i in 0..8 {
            donors.push(onboard(&repo, &format!("donor-{}", i), "Universal Donor", "O-").await);
        }

        let handles: Vec<_> = donors
            .into_iter()
            .map(|donor| {
                let repo = repo.clone();
                let id = request.id.clone();
                tokio::spawn(async move { repo.fulfill_request(&donor, &id).await })
            })
            .collect();

        let mut fulfilled = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => fulfilled += 1,
                Err(AppError::RuleViolation(_)) => rejected += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(fulfilled, 1);
        assert_eq!(rejected, 7);

        assert!(repo.get_request(&request.id).await.unwrap().is_fulfilled);
        assert_eq!(donation_count(&repo).await, 1);
        assert_eq!(notification_count(&repo).await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_edit_racing_fulfillment_is_rejected() {
        let (repo, _dir) = test_support::repository().await;
        let requester = onboard(&repo, "requester", "Rita Requester", "A+").await;
        let request = repo.create_request(&requester, &new_request("A+")).await.unwrap();

        // Fulfil under a held write lock while the edit is in flight.
        let mut tx = repo.begin_write().await.unwrap();
        sqlx::query("UPDATE blood_requests SET is_fulfilled = 1 WHERE id = ?")
            .bind(&request.id)
            .execute(&mut *tx)
            .await
            .unwrap();

        let edit = {
            let repo = repo.clone();
            let requester = requester.clone();
            let id = request.id.clone();
            tokio::spawn(async move {
                let update = UpdateBloodRequest {
                    units_required: Some(5),
                    ..Default::default()
                };
                repo.update_request(&requester, &id, &update).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.commit().await.unwrap();

        let err = edit.await.unwrap().unwrap_err();
        assert!(matches!(err, AppError::RuleViolation(_)));

        let stored = repo.get_request(&request.id).await.unwrap();
        assert!(stored.is_fulfilled);
        assert_eq!(stored.units_required, 2);
    }
}
