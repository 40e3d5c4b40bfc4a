use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::http::ApiClient;

use super::path_segment;

/// `GET /api/v1/parking-reservations/{lotId}?<request>`: free spaces in a lot.
pub async fn available_spaces<Q: Serialize + ?Sized>(
    api: &ApiClient,
    parking_lot_id: &str,
    request: &Q,
) -> Result<Value> {
    let lot = path_segment("parking lot id", parking_lot_id)?;
    api.get_with_query(&format!("/api/v1/parking-reservations/{lot}"), request)
        .await
}

/// `POST /api/v1/parking-lots/{lotId}/reservation`.
pub async fn create_reservation<B: Serialize + ?Sized>(
    api: &ApiClient,
    parking_lot_id: &str,
    request: &B,
) -> Result<Value> {
    let lot = path_segment("parking lot id", parking_lot_id)?;
    api.post(&format!("/api/v1/parking-lots/{lot}/reservation"), request)
        .await
}

/// `GET /api/v1/parking-reservations/me`.
pub async fn my_reservations(api: &ApiClient) -> Result<Value> {
    api.get("/api/v1/parking-reservations/me").await
}

/// `DELETE /api/v1/parking-reservations/{id}`.
pub async fn cancel_reservation(api: &ApiClient, reservation_id: &str) -> Result<Value> {
    let id = path_segment("reservation id", reservation_id)?;
    api.delete(&format!("/api/v1/parking-reservations/{id}")).await
}
