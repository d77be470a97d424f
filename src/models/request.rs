//! Blood request model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{distance_between, sort_by_distance, Badge, BloodType, Coordinates};

use super::Donation;

/// A request for blood on behalf of a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequest {
    pub id: String,
    pub patient_name: String,
    pub hospital_name: String,
    pub blood_type: BloodType,
    pub units_required: i64,
    pub requester_id: String,
    pub is_fulfilled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BloodRequest {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }

    /// Case-insensitive substring match on patient or hospital name.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty()
            || self.patient_name.to_lowercase().contains(&term)
            || self.hospital_name.to_lowercase().contains(&term)
    }
}

/// A request annotated with its distance from the viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWithDistance {
    #[serde(flatten)]
    pub request: BloodRequest,
    /// `None` when either side has no coordinates
    pub distance_km: Option<f64>,
}

/// Request board filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestFilter {
    #[default]
    All,
    Open,
    Fulfilled,
    Mine,
    Near,
}

/// Query string for `GET /api/requests`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestListQuery {
    #[serde(default)]
    pub filter: RequestFilter,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl RequestListQuery {
    pub fn viewer(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.lat, self.lng).filter(Coordinates::is_valid)
    }
}

/// Apply a board filter and search term to requests already ordered newest
/// first, annotating each with its distance from `viewer`.
///
/// `near` keeps only open requests and orders them by distance; requests
/// whose distance is unknown stay at the end in their original order.
pub fn build_board(
    requests: Vec<BloodRequest>,
    filter: RequestFilter,
    search: Option<&str>,
    viewer: Option<Coordinates>,
    caller_id: &str,
) -> Vec<RequestWithDistance> {
    let mut board: Vec<RequestWithDistance> = requests
        .into_iter()
        .filter(|r| match filter {
            RequestFilter::All => true,
            RequestFilter::Open | RequestFilter::Near => !r.is_fulfilled,
            RequestFilter::Fulfilled => r.is_fulfilled,
            RequestFilter::Mine => r.requester_id == caller_id,
        })
        .filter(|r| search.map_or(true, |term| r.matches_search(term)))
        .map(|request| RequestWithDistance {
            distance_km: distance_between(viewer, request.coordinates()),
            request,
        })
        .collect();

    if filter == RequestFilter::Near {
        sort_by_distance(&mut board, |r| r.distance_km);
    }
    board
}

/// Request body for creating a blood request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBloodRequest {
    pub patient_name: String,
    pub hospital_name: String,
    pub blood_type: String,
    pub units_required: i64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Request body for editing an open blood request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBloodRequest {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub hospital_name: Option<String>,
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub units_required: Option<i64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Body for `PUT /api/requests/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestStatus {
    pub is_fulfilled: bool,
}

/// Everything the fulfillment transaction wrote.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentReceipt {
    pub request: BloodRequest,
    pub donation: Donation,
    pub notification_id: String,
    pub new_badges: Vec<Badge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, patient: &str, hospital: &str, coords: Option<(f64, f64)>) -> BloodRequest {
        BloodRequest {
            id: id.to_string(),
            patient_name: patient.to_string(),
            hospital_name: hospital.to_string(),
            blood_type: BloodType::APos,
            units_required: 2,
            requester_id: "requester".to_string(),
            is_fulfilled: false,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ids(board: &[RequestWithDistance]) -> Vec<&str> {
        board.iter().map(|r| r.request.id.as_str()).collect()
    }

    #[test]
    fn test_search_is_case_insensitive_on_both_names() {
        let r = request("1", "Jane Roe", "St. Mary Hospital", None);
        assert!(r.matches_search("jane"));
        assert!(r.matches_search("MARY"));
        assert!(r.matches_search("  "));
        assert!(!r.matches_search("general"));
    }

    #[test]
    fn test_status_and_mine_filters() {
        let mut fulfilled = request("f", "A", "H", None);
        fulfilled.is_fulfilled = true;
        let mut other = request("o", "B", "H", None);
        other.requester_id = "someone-else".to_string();
        let all = vec![fulfilled, other, request("m", "C", "H", None)];

        let open = build_board(all.clone(), RequestFilter::Open, None, None, "requester");
        assert_eq!(ids(&open), vec!["o", "m"]);

        let done = build_board(all.clone(), RequestFilter::Fulfilled, None, None, "requester");
        assert_eq!(ids(&done), vec!["f"]);

        let mine = build_board(all, RequestFilter::Mine, None, None, "requester");
        assert_eq!(ids(&mine), vec!["f", "m"]);
    }

    #[test]
    fn test_near_sorts_by_distance_with_unknown_last() {
        let viewer = Some(Coordinates::new(51.5074, -0.1278));
        let all = vec![
            request("none-1", "A", "H", None),
            request("paris", "B", "H", Some((48.8566, 2.3522))),
            request("none-2", "C", "H", None),
            request("oxford", "D", "H", Some((51.752, -1.2577))),
        ];

        let near = build_board(all.clone(), RequestFilter::Near, None, viewer, "x");
        assert_eq!(ids(&near), vec!["oxford", "paris", "none-1", "none-2"]);
        assert!(near[0].distance_km.unwrap() < 100.0);
        assert!(near[2].distance_km.is_none());

        // Other filters annotate but keep the incoming order.
        let plain = build_board(all, RequestFilter::All, None, viewer, "x");
        assert_eq!(ids(&plain), vec!["none-1", "paris", "none-2", "oxford"]);
        assert!(plain[1].distance_km.is_some());
    }

    #[test]
    fn test_near_without_viewer_keeps_order() {
        let all = vec![
            request("a", "A", "H", Some((1.0, 1.0))),
            request("b", "B", "H", None),
        ];
        let near = build_board(all, RequestFilter::Near, Some("a"), None, "x");
        assert_eq!(ids(&near), vec!["a"]);
        assert!(near[0].distance_km.is_none());
    }
}
