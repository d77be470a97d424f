//! Appointment booking operations.

use sqlx::Row;

use super::repository::{from_millis, new_id, now, require_text, to_millis, Repository};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentStatus, AppointmentType, BookAppointmentRequest};

impl Repository {
    /// The caller's appointments, latest date first.
    pub async fn list_appointments(&self, donor_id: &str) -> Result<Vec<Appointment>, AppError> {
        let rows = sqlx::query(
            "SELECT id, donor_id, center_name, date, status, appointment_type, created_at FROM appointments WHERE donor_id = ? ORDER BY date DESC, rowid DESC"
        )
        .bind(donor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(appointment_from_row).collect()
    }

    pub async fn get_appointment(&self, id: &str) -> Result<Appointment, AppError> {
        let row = sqlx::query(
            "SELECT id, donor_id, center_name, date, status, appointment_type, created_at FROM appointments WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => appointment_from_row(&row),
            None => Err(AppError::NotFound(format!("Appointment {} not found", id))),
        }
    }

    /// Book a slot for the caller.
    pub async fn book_appointment(
        &self,
        caller: &Caller,
        request: &BookAppointmentRequest,
    ) -> Result<Appointment, AppError> {
        require_text(&request.center_name, "Center name")?;
        let now = now();
        if request.date < now {
            return Err(AppError::Validation(
                "Appointment date must be in the future".to_string(),
            ));
        }

        let appointment = Appointment {
            id: new_id(),
            donor_id: caller.subject().to_string(),
            center_name: request.center_name.trim().to_string(),
            date: request.date,
            status: AppointmentStatus::Scheduled,
            appointment_type: request.appointment_type,
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO appointments (id, donor_id, center_name, date, status, appointment_type, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&appointment.id)
        .bind(&appointment.donor_id)
        .bind(&appointment.center_name)
        .bind(to_millis(appointment.date))
        .bind(appointment.status.as_str())
        .bind(appointment.appointment_type.as_str())
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        tracing::info!(
            appointment_id = %appointment.id,
            center = %appointment.center_name,
            "appointment booked"
        );

        Ok(appointment)
    }

    /// Cancel one of the caller's scheduled appointments.
    pub async fn cancel_appointment(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<Appointment, AppError> {
        let appointment = self.get_appointment(id).await?;
        if appointment.donor_id != caller.subject() {
            return Err(AppError::Forbidden(
                "Not authorized to cancel this appointment".to_string(),
            ));
        }
        if appointment.status != AppointmentStatus::Scheduled {
            return Err(AppError::RuleViolation(format!(
                "Cannot cancel an appointment that is {}",
                appointment.status.as_str()
            )));
        }

        sqlx::query("UPDATE appointments SET status = ? WHERE id = ? AND status = ?")
            .bind(AppointmentStatus::Cancelled.as_str())
            .bind(id)
            .bind(AppointmentStatus::Scheduled.as_str())
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;

        Ok(Appointment {
            status: AppointmentStatus::Cancelled,
            ..appointment
        })
    }
}

fn appointment_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Appointment, AppError> {
    let status: String = row.try_get("status")?;
    let kind: String = row.try_get("appointment_type")?;
    Ok(Appointment {
        id: row.try_get("id")?,
        donor_id: row.try_get("donor_id")?,
        center_name: row.try_get("center_name")?,
        date: from_millis(row.try_get("date")?),
        status: AppointmentStatus::from_str(&status)
            .ok_or_else(|| AppError::Internal(format!("Corrupt appointment status: {}", status)))?,
        appointment_type: AppointmentType::from_str(&kind)
            .ok_or_else(|| AppError::Internal(format!("Corrupt appointment type: {}", kind)))?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;
    use chrono::{Duration, Utc};

    fn booking(days_ahead: i64) -> BookAppointmentRequest {
        BookAppointmentRequest {
            center_name: "North Clinic".to_string(),
            date: Utc::now() + Duration::days(days_ahead),
            appointment_type: AppointmentType::Platelets,
        }
    }

    #[tokio::test]
    async fn test_book_list_and_cancel() {
        let (repo, _dir) = test_support::repository().await;
        let donor = Caller("donor".to_string());

        let soon = repo.book_appointment(&donor, &booking(2)).await.unwrap();
        let later = repo.book_appointment(&donor, &booking(5)).await.unwrap();
        assert_eq!(soon.status, AppointmentStatus::Scheduled);

        let listed = repo.list_appointments("donor").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, later.id);
        assert_eq!(listed[1].appointment_type, AppointmentType::Platelets);

        let cancelled = repo.cancel_appointment(&donor, &soon.id).await.unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(
            repo.get_appointment(&soon.id).await.unwrap().status,
            AppointmentStatus::Cancelled
        );

        let err = repo.cancel_appointment(&donor, &soon.id).await.unwrap_err();
        assert!(matches!(err, AppError::RuleViolation(_)));
    }

    #[tokio::test]
    async fn test_cancel_is_owner_only() {
        let (repo, _dir) = test_support::repository().await;
        let booked = repo
            .book_appointment(&Caller("donor".to_string()), &booking(1))
            .await
            .unwrap();

        let err = repo
            .cancel_appointment(&Caller("other".to_string()), &booked.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_booking_in_the_past_rejected() {
        let (repo, _dir) = test_support::repository().await;
        let err = repo
            .book_appointment(&Caller("donor".to_string()), &booking(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(repo.list_appointments("donor").await.unwrap().is_empty());
    }
}
