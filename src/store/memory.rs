use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::SeatStore;
use crate::error::StoreError;
use crate::models::{ExpectedState, Seat, SeatId, SeatUpdate};

/// Хранилище в памяти процесса. Используется в тестах и для локального
/// запуска без Postgres (`SEAT_STORE=memory`).
#[derive(Debug, Default)]
pub struct MemorySeatStore {
    seats: RwLock<HashMap<SeatId, Seat>>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn find_all(&self) -> Result<Vec<Seat>, StoreError> {
        let seats = self.seats.read().map_err(|_| StoreError::Poisoned)?;
        Ok(seats.values().cloned().collect())
    }

    async fn find_by_ids(&self, ids: &[SeatId]) -> Result<Vec<Seat>, StoreError> {
        let seats = self.seats.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ids.iter().filter_map(|id| seats.get(id).cloned()).collect())
    }

    async fn conditional_update(
        &self,
        seat_id: &SeatId,
        expected: &ExpectedState,
        update: &SeatUpdate,
    ) -> Result<bool, StoreError> {
        let mut seats = self.seats.write().map_err(|_| StoreError::Poisoned)?;
        match seats.get_mut(seat_id) {
            Some(seat) if expected.matches(seat) => {
                *seat = seat.with_update(update);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_if_absent(&self, seat: &Seat) -> Result<bool, StoreError> {
        let mut seats = self.seats.write().map_err(|_| StoreError::Poisoned)?;
        if seats.contains_key(&seat.seat_id) {
            return Ok(false);
        }
        seats.insert(seat.seat_id.clone(), seat.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now_micros, SeatStatus};

    #[tokio::test]
    async fn upsert_does_not_overwrite() {
        let store = MemorySeatStore::new();
        let id = SeatId::from("A1");

        assert!(store.upsert_if_absent(&Seat::available(id.clone())).await.unwrap());
        let held = store
            .conditional_update(&id, &ExpectedState::available(), &SeatUpdate::hold("u1", now_micros()))
            .await
            .unwrap();
        assert!(held);

        assert!(!store.upsert_if_absent(&Seat::available(id.clone())).await.unwrap());
        let seats = store.find_by_ids(&[id]).await.unwrap();
        assert_eq!(seats[0].status, SeatStatus::Held);
    }

    #[tokio::test]
    async fn conditional_update_fails_on_state_mismatch() {
        let store = MemorySeatStore::new();
        let id = SeatId::from("B2");
        store.upsert_if_absent(&Seat::available(id.clone())).await.unwrap();

        let now = now_micros();
        assert!(store
            .conditional_update(&id, &ExpectedState::available(), &SeatUpdate::hold("u1", now))
            .await
            .unwrap());
        // второй захват того же места уже не проходит
        assert!(!store
            .conditional_update(&id, &ExpectedState::available(), &SeatUpdate::hold("u2", now))
            .await
            .unwrap());

        let seat = &store.find_by_ids(&[id]).await.unwrap()[0];
        assert_eq!(seat.holder.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn conditional_update_on_missing_seat_is_false() {
        let store = MemorySeatStore::new();
        let ok = store
            .conditional_update(&SeatId::from("Z1"), &ExpectedState::available(), &SeatUpdate::release())
            .await
            .unwrap();
        assert!(!ok);
    }
}
