//! Appointment model.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }
}

/// What the donor is booked to give.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    WholeBlood,
    Platelets,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::WholeBlood => "whole_blood",
            AppointmentType::Platelets => "platelets",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "whole_blood" => Some(AppointmentType::WholeBlood),
            "platelets" => Some(AppointmentType::Platelets),
            _ => None,
        }
    }
}

/// A booked donation slot. Overlaps are not checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub donor_id: String,
    pub center_name: String,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub created_at: DateTime<Utc>,
}

/// Request body for booking.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentRequest {
    pub center_name: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type", default = "default_appointment_type")]
    pub appointment_type: AppointmentType,
}

fn default_appointment_type() -> AppointmentType {
    AppointmentType::WholeBlood
}

/// Bookable times on one day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySlots {
    pub date: DateTime<Utc>,
    pub slots: Vec<String>,
}

/// Fixed daily times offered at every center, UTC.
pub const DAILY_SLOTS: [&str; 4] = ["10:00", "11:00", "14:00", "16:00"];

/// How many days ahead slots are offered, starting tomorrow.
pub const BOOKING_WINDOW_DAYS: i64 = 7;

/// Bookable days after `now`, each at midnight UTC with the fixed slots.
pub fn upcoming_slots(now: DateTime<Utc>) -> Vec<DaySlots> {
    let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    (1..=BOOKING_WINDOW_DAYS)
        .map(|offset| DaySlots {
            date: today + Duration::days(offset),
            slots: DAILY_SLOTS.iter().map(|s| s.to_string()).collect(),
        })
        .collect()
}
