//! Ошибки движка бронирования и их отображение в HTTP-ответы.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::SeatId;

/// Сбой хранилища мест. Ядро никогда не повторяет такие операции само.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt seat record {seat_id}: {reason}")]
    Corrupt { seat_id: String, reason: String },

    #[error("seat store lock poisoned")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    /// Пустой или некорректный список мест или пользователь.
    #[error("{0}")]
    Validation(String),

    /// Место не в том состоянии, которого требует переход.
    #[error("seats not available: {}", join_ids(.seats))]
    Conflict { seats: Vec<SeatId> },

    #[error("unknown seats: {}", join_ids(.seats))]
    NotFound { seats: Vec<SeatId> },

    /// Сбой хранилища. `seats` называет место, на котором операция
    /// прервалась, если сбой случился при записи конкретного места.
    #[error("seat store failure: {source}")]
    Store { source: StoreError, seats: Vec<SeatId> },
}

impl From<StoreError> for ReservationError {
    fn from(source: StoreError) -> Self {
        ReservationError::Store { source, seats: Vec::new() }
    }
}

fn join_ids(ids: &[SeatId]) -> String {
    ids.iter().map(SeatId::as_str).collect::<Vec<_>>().join(", ")
}

impl ReservationError {
    /// Сбой хранилища при записи конкретного места.
    pub fn store_at(seat_id: &SeatId, source: StoreError) -> Self {
        ReservationError::Store {
            source,
            seats: vec![seat_id.clone()],
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ReservationError::Validation(_) => StatusCode::BAD_REQUEST,
            ReservationError::Conflict { .. } => StatusCode::CONFLICT,
            ReservationError::NotFound { .. } => StatusCode::NOT_FOUND,
            ReservationError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Места, из-за которых запрос отклонён.
    pub fn seats(&self) -> &[SeatId] {
        match self {
            ReservationError::Conflict { seats }
            | ReservationError::NotFound { seats }
            | ReservationError::Store { seats, .. } => seats,
            ReservationError::Validation(_) => &[],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub conflicting_seats: Vec<SeatId>,
}

impl IntoResponse for ReservationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let ReservationError::Store { source, .. } = &self {
            tracing::error!("request failed on seat store: {}", source);
        }

        let body = ErrorBody {
            // детали сбоя хранилища наружу не отдаём
            message: match &self {
                ReservationError::Store { .. } => "Seat store is unavailable".to_string(),
                other => other.to_string(),
            },
            conflicting_seats: self.seats().to_vec(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            ReservationError::Validation("empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ReservationError::Conflict { seats: vec![SeatId::from("A1")] }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ReservationError::NotFound { seats: vec![SeatId::from("Z99")] }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ReservationError::from(StoreError::Poisoned).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn message_names_offending_seats() {
        let err = ReservationError::Conflict {
            seats: vec![SeatId::from("A1"), SeatId::from("A2")],
        };
        assert_eq!(err.to_string(), "seats not available: A1, A2");
        assert_eq!(err.seats().len(), 2);
    }

    #[test]
    fn store_failure_names_the_faulting_seat() {
        let err = ReservationError::store_at(&SeatId::from("R2"), StoreError::Poisoned);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.seats(), &[SeatId::from("R2")]);

        let bare: ReservationError = StoreError::Poisoned.into();
        assert!(bare.seats().is_empty());
    }
}
