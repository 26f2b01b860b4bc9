//! Общие помощники для интеграционных тестов.
#![allow(dead_code)]

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use seat_booking::models::{ExpectedState, Seat, SeatId, SeatUpdate, VenueLayout};
use seat_booking::services::{initialize_grid, ReservationEngine};
use seat_booking::store::{MemorySeatStore, SeatStore};

pub const HOLD_EXPIRY_MINUTES: i64 = 10;

/// Движок вместе с хранилищем под ним. Тесты читают и подготавливают
/// записи напрямую через `store`, сам движок хранилище наружу не отдаёт.
pub struct TestEngine {
    pub engine: ReservationEngine,
    pub store: Arc<dyn SeatStore>,
}

impl Deref for TestEngine {
    type Target = ReservationEngine;

    fn deref(&self) -> &ReservationEngine {
        &self.engine
    }
}

/// Движок поверх хранилища в памяти с полной сеткой 22 x 17.
pub async fn engine() -> Arc<TestEngine> {
    engine_with_store(Arc::new(MemorySeatStore::new())).await
}

pub async fn engine_with_store(store: Arc<dyn SeatStore>) -> Arc<TestEngine> {
    let layout = VenueLayout::default();
    initialize_grid(store.as_ref(), &layout).await.unwrap();
    let engine = ReservationEngine::new(store.clone(), layout, TimeDelta::minutes(HOLD_EXPIRY_MINUTES));
    Arc::new(TestEngine { engine, store })
}

pub fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

pub fn seat_ids(raw: &[&str]) -> Vec<SeatId> {
    raw.iter().map(|s| SeatId::from(*s)).collect()
}

pub async fn seat(engine: &TestEngine, id: &str) -> Seat {
    let found = engine.store.find_by_ids(&[SeatId::from(id)]).await.unwrap();
    found.into_iter().next().unwrap()
}

/// Ставит бронь напрямую в хранилище с заданным временем.
pub async fn seed_hold(engine: &TestEngine, id: &str, user: &str, held_at: DateTime<Utc>) {
    seed_hold_in(engine.store.as_ref(), id, user, held_at).await;
}

pub async fn seed_hold_in(store: &dyn SeatStore, id: &str, user: &str, held_at: DateTime<Utc>) {
    let ok = store
        .conditional_update(&SeatId::from(id), &ExpectedState::available(), &SeatUpdate::hold(user, held_at))
        .await
        .unwrap();
    assert!(ok, "seat {id} must be available to seed a hold");
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    seat_booking::models::now_micros() - TimeDelta::minutes(minutes)
}
