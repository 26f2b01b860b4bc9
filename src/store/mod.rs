//! Хранилище записей о местах.
//!
//! Единственный разделяемый изменяемый ресурс. Любое изменение идёт через
//! `conditional_update`: запись меняется только если её текущее состояние
//! совпадает с ожидаемым, иначе ничего не происходит.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{ExpectedState, Seat, SeatId, SeatStatus, SeatUpdate};

pub use memory::MemorySeatStore;
pub use postgres::PgSeatStore;

#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Согласованный снимок всех мест.
    async fn find_all(&self) -> Result<Vec<Seat>, StoreError>;

    /// Записи для указанных мест. Отсутствующие просто не попадают в ответ.
    async fn find_by_ids(&self, ids: &[SeatId]) -> Result<Vec<Seat>, StoreError>;

    /// Атомарное сравнение-и-запись одной записи. `Ok(false)` значит, что
    /// запись не найдена или её состояние уже другое.
    async fn conditional_update(
        &self,
        seat_id: &SeatId,
        expected: &ExpectedState,
        update: &SeatUpdate,
    ) -> Result<bool, StoreError>;

    /// Вставляет запись, если места ещё нет. `Ok(true)` если вставили.
    async fn upsert_if_absent(&self, seat: &Seat) -> Result<bool, StoreError>;

    /// Брони, поставленные не позже `cutoff`.
    async fn find_expired_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Seat>, StoreError> {
        let seats = self.find_all().await?;
        Ok(seats
            .into_iter()
            .filter(|s| {
                s.status == SeatStatus::Held && s.hold_timestamp.map_or(true, |ts| ts <= cutoff)
            })
            .collect())
    }
}
