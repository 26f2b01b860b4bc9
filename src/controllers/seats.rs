//! seats.rs
//!
//! HTTP-граница движка бронирования: список мест, бронь и подтверждение.
//! Обработчики только разбирают запрос и переводят результат в ответ, вся
//! логика переходов живёт в `ReservationEngine`.

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Query, State},
    http::{header::HeaderName, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ReservationError,
    models::{PaymentOutcome, PaymentStatus, Seat, SeatId, SeatStatus},
    AppState,
};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/seats", get(list_seats))
        .route("/seats/hold", post(hold_seats))
        // старое имя маршрута, оставлено для совместимости клиентов
        .route("/seats/book", post(hold_seats))
        .route("/seats/confirm", post(confirm_booking))
}

/* ---------- SEATS ---------- */

#[derive(Debug, Deserialize)]
pub struct SeatsQuery {
    pub status: Option<SeatStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub seat_id: SeatId,
    pub status: SeatStatus,
    pub payment_status: PaymentStatus,
}

impl From<Seat> for SeatView {
    fn from(seat: Seat) -> Self {
        Self {
            seat_id: seat.seat_id,
            status: seat.status,
            payment_status: seat.payment_status,
        }
    }
}

// GET /api/seats
async fn list_seats(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SeatsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ReservationError> {
    let Query(params) = query.map_err(|e| ReservationError::Validation(e.body_text()))?;

    // кешируется только полный снимок, фильтр применяем поверх
    let (seats, cache_status) = match &state.cache {
        Some(cache) => match cache.get_seats().await {
            Some(seats) => (seats, "HIT"),
            None => {
                let seen = cache.snapshot_version().await;
                let seats = state.engine.list_seats(None).await?;
                cache.save_seats(&seats, seen).await;
                (seats, "MISS")
            }
        },
        None => (state.engine.list_seats(None).await?, "BYPASS"),
    };

    let payload: Vec<SeatView> = seats
        .into_iter()
        .filter(|s| params.status.map_or(true, |status| s.status == status))
        .map(SeatView::from)
        .collect();

    Ok((StatusCode::OK, [(X_CACHE, cache_status)], Json(payload)))
}

/* ---------- HOLD ---------- */

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HoldSeatsRequest {
    #[serde(alias = "seats")]
    #[validate(length(min = 1, message = "seatIds must not be empty"))]
    pub seat_ids: Vec<String>,
    #[validate(length(min = 1, message = "userId must not be empty"))]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldSeatsResponse {
    pub message: String,
    pub seat_ids: Vec<SeatId>,
    pub expires_at: DateTime<Utc>,
}

// POST /api/seats/hold
async fn hold_seats(
    State(state): State<Arc<AppState>>,
    body: Result<Json<HoldSeatsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ReservationError> {
    let Json(req) = body.map_err(|e| ReservationError::Validation(e.body_text()))?;
    req.validate().map_err(|e| ReservationError::Validation(e.to_string()))?;

    let receipt = state.engine.hold_seats(&req.seat_ids, &req.user_id).await?;

    Ok((
        StatusCode::OK,
        Json(HoldSeatsResponse {
            message: "Seats held successfully".to_string(),
            seat_ids: receipt.seat_ids,
            expires_at: receipt.expires_at,
        }),
    ))
}

/* ---------- CONFIRM ---------- */

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBookingRequest {
    #[serde(alias = "seats")]
    #[validate(length(min = 1, message = "seatIds must not be empty"))]
    pub seat_ids: Vec<String>,
    #[validate(length(min = 1, message = "userId must not be empty"))]
    pub user_id: String,
    #[serde(alias = "paymentStatus")]
    pub payment_outcome: PaymentOutcome,
}

#[derive(Debug, Serialize)]
pub struct ConfirmBookingResponse {
    pub message: String,
    pub succeeded: Vec<SeatId>,
    pub rejected: Vec<SeatId>,
}

// POST /api/seats/confirm
async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ConfirmBookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ReservationError> {
    let Json(req) = body.map_err(|e| ReservationError::Validation(e.body_text()))?;
    req.validate().map_err(|e| ReservationError::Validation(e.to_string()))?;

    let report = state
        .engine
        .confirm_booking(&req.seat_ids, &req.user_id, req.payment_outcome)
        .await?;

    let message = match (report.outcome, report.rejected.is_empty()) {
        (PaymentOutcome::Completed, true) => "Booking confirmed successfully",
        (PaymentOutcome::Completed, false) => "Booking partially confirmed",
        (PaymentOutcome::Failed, _) => "Payment failed, seats released",
    };

    Ok((
        StatusCode::OK,
        Json(ConfirmBookingResponse {
            message: message.to_string(),
            succeeded: report.succeeded,
            rejected: report.rejected,
        }),
    ))
}
