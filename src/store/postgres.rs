use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::SeatStore;
use crate::database::Database;
use crate::error::StoreError;
use crate::models::{ExpectedState, PaymentStatus, Seat, SeatId, SeatStatus, SeatUpdate};

// Строка таблицы seats как она лежит в БД
#[derive(Debug, FromRow)]
struct SeatRow {
    seat_id: String,
    status: String,
    holder: Option<String>,
    hold_timestamp: Option<DateTime<Utc>>,
    payment_status: String,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            seat_id: row.seat_id.clone(),
            reason,
        };

        let status: SeatStatus = row.status.parse().map_err(corrupt)?;
        let payment_status: PaymentStatus = row.payment_status.parse().map_err(corrupt)?;

        let seat = Seat {
            seat_id: SeatId::new(row.seat_id.clone()),
            status,
            holder: row.holder,
            hold_timestamp: row.hold_timestamp,
            payment_status,
        };
        seat.check_invariants().map_err(|reason| StoreError::Corrupt {
            seat_id: row.seat_id,
            reason,
        })?;
        Ok(seat)
    }
}

const SEAT_COLUMNS: &str = "seat_id, status, holder, hold_timestamp, payment_status";

/// Хранилище мест в Postgres. Условное обновление выражено одним
/// `UPDATE ... WHERE`, так что атомарность обеспечивает сама БД.
#[derive(Clone)]
pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    fn into_seats(rows: Vec<SeatRow>) -> Result<Vec<Seat>, StoreError> {
        rows.into_iter().map(Seat::try_from).collect()
    }
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn find_all(&self) -> Result<Vec<Seat>, StoreError> {
        // один SELECT = один снимок
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats ORDER BY seat_id",
            SEAT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Self::into_seats(rows)
    }

    async fn find_by_ids(&self, ids: &[SeatId]) -> Result<Vec<Seat>, StoreError> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE seat_id = ANY($1) ORDER BY seat_id",
            SEAT_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Self::into_seats(rows)
    }

    async fn conditional_update(
        &self,
        seat_id: &SeatId,
        expected: &ExpectedState,
        update: &SeatUpdate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET status = $5,
                holder = $6,
                hold_timestamp = $7,
                payment_status = $8,
                updated_at = NOW()
            WHERE seat_id = $1
              AND status = $2
              AND ($3::TEXT IS NULL OR holder = $3)
              AND ($4::TIMESTAMPTZ IS NULL OR hold_timestamp = $4)
            "#,
        )
        .bind(seat_id.as_str())
        .bind(expected.status.as_str())
        .bind(expected.holder.as_deref())
        .bind(expected.hold_timestamp)
        .bind(update.status.as_str())
        .bind(update.holder.as_deref())
        .bind(update.hold_timestamp)
        .bind(update.payment_status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_if_absent(&self, seat: &Seat) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO seats (seat_id, status, holder, hold_timestamp, payment_status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (seat_id) DO NOTHING
            "#,
        )
        .bind(seat.seat_id.as_str())
        .bind(seat.status.as_str())
        .bind(seat.holder.as_deref())
        .bind(seat.hold_timestamp)
        .bind(seat.payment_status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_expired_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Seat>, StoreError> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats
             WHERE status = 'held'
               AND (hold_timestamp IS NULL OR hold_timestamp <= $1)
             ORDER BY seat_id",
            SEAT_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Self::into_seats(rows)
    }
}
