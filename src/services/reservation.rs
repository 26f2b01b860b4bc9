//! reservation.rs
//!
//! Движок бронирования мест. Единственный компонент, который меняет статусы
//! мест.
//!
//! Ключевые моменты:
//! 1.  **Пер-местные блокировки**: каждое место имеет свой мьютекс. Запрос
//!     блокирует только свои места и всегда в порядке сортировки `SeatId`,
//!     поэтому два пересекающихся запроса не могут взаимно заблокироваться.
//! 2.  **Условные обновления**: каждая запись в хранилище идёт как
//!     сравнение-и-запись от ожидаемого состояния. Даже если место изменил
//!     другой процесс, мы не перетрём чужой переход.
//! 3.  **Ленивое истечение**: просроченная бронь при проверке считается
//!     свободным местом, не дожидаясь фонового прохода.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::cache::CacheService;
use crate::error::{ReservationError, StoreError};
use crate::models::{
    now_micros, ExpectedState, PaymentOutcome, Seat, SeatId, SeatStatus, SeatUpdate, VenueLayout,
};
use crate::store::SeatStore;

/// Таблица мьютексов по местам. Набор мест фиксирован, поэтому таблица
/// строится один раз и дальше только читается.
struct SeatLocks {
    locks: HashMap<SeatId, Arc<Mutex<()>>>,
}

impl SeatLocks {
    fn new(layout: &VenueLayout) -> Self {
        let locks = layout
            .seat_ids()
            .map(|id| (id, Arc::new(Mutex::new(()))))
            .collect();
        Self { locks }
    }

    /// Захватывает мьютексы в порядке итерации `BTreeSet`, то есть по
    /// возрастанию `SeatId`.
    async fn acquire(&self, ids: &BTreeSet<SeatId>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(lock) = self.locks.get(id) {
                guards.push(lock.clone().lock_owned().await);
            }
        }
        guards
    }
}

/// Результат успешной брони.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldReceipt {
    pub seat_ids: Vec<SeatId>,
    pub holder: String,
    pub held_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Результат подтверждения: по каждому месту отдельно.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmReport {
    pub outcome: PaymentOutcome,
    pub succeeded: Vec<SeatId>,
    pub rejected: Vec<SeatId>,
}

// Что делать с местом при попытке брони
enum HoldCheck {
    Free,
    // просроченная бронь, перезахватываем именно её
    Expired(ExpectedState),
    Blocked,
}

pub struct ReservationEngine {
    store: Arc<dyn SeatStore>,
    layout: VenueLayout,
    hold_expiry: TimeDelta,
    locks: SeatLocks,
    cache: Option<CacheService>,
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn SeatStore>, layout: VenueLayout, hold_expiry: TimeDelta) -> Self {
        let locks = SeatLocks::new(&layout);
        Self {
            store,
            layout,
            hold_expiry,
            locks,
            cache: None,
        }
    }

    /// Подключает кеш снимка, который сбрасывается после каждого изменения.
    pub fn with_cache(mut self, cache: Option<CacheService>) -> Self {
        self.cache = cache;
        self
    }

    pub fn layout(&self) -> &VenueLayout {
        &self.layout
    }

    pub fn hold_expiry(&self) -> TimeDelta {
        self.hold_expiry
    }

    // --- Чтение ---

    /// Снимок всех мест в порядке сетки, опционально с фильтром по статусу.
    pub async fn list_seats(&self, filter: Option<SeatStatus>) -> Result<Vec<Seat>, ReservationError> {
        let mut seats = self.store.find_all().await?;

        for seat in &seats {
            seat.check_invariants().map_err(|reason| StoreError::Corrupt {
                seat_id: seat.seat_id.to_string(),
                reason,
            })?;
        }

        if let Some(status) = filter {
            seats.retain(|s| s.status == status);
        }
        seats.sort_by_key(|s| self.layout.position(&s.seat_id).unwrap_or((usize::MAX, u16::MAX)));
        Ok(seats)
    }

    // --- Бронь ---

    /// Ставит бронь на все места сразу или не трогает ни одного.
    pub async fn hold_seats(&self, seat_ids: &[String], user_id: &str) -> Result<HoldReceipt, ReservationError> {
        let user_id = validate_user(user_id)?;
        let ids = self.validate_seat_ids(seat_ids)?;

        let _guards = self.locks.acquire(&ids).await;
        let now = now_micros();

        let seats = self.load_seats(&ids).await?;
        let mut plan = Vec::with_capacity(seats.len());
        let mut conflicts = Vec::new();

        for seat in &seats {
            match self.check_hold(seat, now) {
                HoldCheck::Free => plan.push((seat.seat_id.clone(), ExpectedState::available())),
                HoldCheck::Expired(expected) => {
                    debug!("Seat {} hold by {:?} expired, reclaiming", seat.seat_id, seat.holder);
                    plan.push((seat.seat_id.clone(), expected));
                }
                HoldCheck::Blocked => conflicts.push(seat.seat_id.clone()),
            }
        }

        if !conflicts.is_empty() {
            warn!("Hold by {} rejected, unavailable seats: {:?}", user_id, conflicts);
            return Err(ReservationError::Conflict { seats: conflicts });
        }

        let update = SeatUpdate::hold(user_id, now);
        let mut applied: Vec<SeatId> = Vec::with_capacity(plan.len());

        for (seat_id, expected) in &plan {
            match self.store.conditional_update(seat_id, expected, &update).await {
                Ok(true) => applied.push(seat_id.clone()),
                Ok(false) => {
                    // место изменили в обход наших блокировок (другой процесс)
                    warn!("Seat {} changed concurrently, rolling back hold by {}", seat_id, user_id);
                    self.rollback_hold(&applied, user_id, now).await;
                    return Err(ReservationError::Conflict { seats: vec![seat_id.clone()] });
                }
                Err(e) => {
                    error!("Store failure while holding seat {}: {}", seat_id, e);
                    self.rollback_hold(&applied, user_id, now).await;
                    return Err(ReservationError::store_at(seat_id, e));
                }
            }
        }

        self.invalidate_snapshot().await;
        info!("Seats {:?} held by {}", applied, user_id);

        Ok(HoldReceipt {
            seat_ids: applied,
            holder: user_id.to_string(),
            held_at: now,
            expires_at: now + self.hold_expiry,
        })
    }

    fn check_hold(&self, seat: &Seat, now: DateTime<Utc>) -> HoldCheck {
        match seat.status {
            SeatStatus::Available => HoldCheck::Free,
            SeatStatus::Held if seat.is_hold_expired(now, self.hold_expiry) => {
                HoldCheck::Expired(ExpectedState::exact_hold(seat))
            }
            SeatStatus::Held | SeatStatus::Booked => HoldCheck::Blocked,
        }
    }

    /// Откатывает уже поставленные этим запросом брони. Ошибки только
    /// логируются: исходная ошибка важнее.
    async fn rollback_hold(&self, applied: &[SeatId], user_id: &str, held_at: DateTime<Utc>) {
        let expected = ExpectedState {
            status: SeatStatus::Held,
            holder: Some(user_id.to_string()),
            hold_timestamp: Some(held_at),
        };
        let release = SeatUpdate::release();

        for seat_id in applied {
            match self.store.conditional_update(seat_id, &expected, &release).await {
                Ok(true) => debug!("Rolled back hold on {}", seat_id),
                Ok(false) => warn!("Rollback of {} skipped, seat already changed", seat_id),
                Err(e) => error!("Failed to roll back hold on {}: {}", seat_id, e),
            }
        }
    }

    // --- Подтверждение ---

    /// Применяет итог оплаты к каждому месту независимо. Подходят только
    /// места с действующей бронью этого же пользователя.
    pub async fn confirm_booking(
        &self,
        seat_ids: &[String],
        user_id: &str,
        outcome: PaymentOutcome,
    ) -> Result<ConfirmReport, ReservationError> {
        let user_id = validate_user(user_id)?;
        let ids = self.validate_seat_ids(seat_ids)?;

        let _guards = self.locks.acquire(&ids).await;
        let now = now_micros();

        let seats = self.load_seats(&ids).await?;
        let mut succeeded = Vec::new();
        let mut rejected = Vec::new();
        // (до, после) для каждого применённого итога оплаты
        let mut applied: Vec<(Seat, Seat)> = Vec::new();
        let mut changed = false;

        for seat in &seats {
            if !seat.is_held_by(user_id) {
                rejected.push(seat.seat_id.clone());
                continue;
            }

            let expected = ExpectedState::exact_hold(seat);

            if seat.is_hold_expired(now, self.hold_expiry) {
                // бронь истекла до оплаты: место возвращается в продажу
                match self.store.conditional_update(&seat.seat_id, &expected, &SeatUpdate::release()).await {
                    Ok(true) => {
                        changed = true;
                        info!("Expired hold on {} by {} released at confirm", seat.seat_id, user_id);
                    }
                    Ok(false) => {}
                    Err(e) => return Err(self.abort_confirm(&applied, &seat.seat_id, e).await),
                }
                rejected.push(seat.seat_id.clone());
                continue;
            }

            let update = match outcome {
                PaymentOutcome::Completed => SeatUpdate::book(user_id, now),
                PaymentOutcome::Failed => SeatUpdate::release(),
            };

            match self.store.conditional_update(&seat.seat_id, &expected, &update).await {
                Ok(true) => {
                    changed = true;
                    succeeded.push(seat.seat_id.clone());
                    applied.push((seat.clone(), seat.with_update(&update)));
                }
                Ok(false) => {
                    warn!("Seat {} changed concurrently during confirm by {}", seat.seat_id, user_id);
                    rejected.push(seat.seat_id.clone());
                }
                Err(e) => return Err(self.abort_confirm(&applied, &seat.seat_id, e).await),
            }
        }

        if changed {
            self.invalidate_snapshot().await;
        }

        if succeeded.is_empty() {
            warn!("Confirm by {} rejected for all seats: {:?}", user_id, rejected);
            return Err(ReservationError::Conflict { seats: rejected });
        }

        match outcome {
            PaymentOutcome::Completed => info!("Seats {:?} booked by {}", succeeded, user_id),
            PaymentOutcome::Failed => info!("Payment failed, seats {:?} released by {}", succeeded, user_id),
        }
        if !rejected.is_empty() {
            info!("Seats {:?} rejected for {}", rejected, user_id);
        }

        Ok(ConfirmReport {
            outcome,
            succeeded,
            rejected,
        })
    }

    /// Сбой хранилища посреди подтверждения: уже применённые итоги оплаты
    /// откатываются к прочитанным бронями, запрос завершается ошибкой
    /// хранилища с местом, на котором случился сбой.
    async fn abort_confirm(&self, applied: &[(Seat, Seat)], failed: &SeatId, source: StoreError) -> ReservationError {
        error!("Store failure while confirming seat {}: {}", failed, source);

        for (before, after) in applied {
            let expected = ExpectedState::exact(after);
            match self
                .store
                .conditional_update(&after.seat_id, &expected, &SeatUpdate::restore(before))
                .await
            {
                Ok(true) => debug!("Rolled back confirm on {}", after.seat_id),
                Ok(false) => warn!("Rollback of {} skipped, seat already changed", after.seat_id),
                Err(e) => error!("Failed to roll back confirm on {}: {}", after.seat_id, e),
            }
        }

        self.invalidate_snapshot().await;
        ReservationError::store_at(failed, source)
    }

    // --- Истечение броней ---

    /// Возвращает в продажу все просроченные брони. Каждое место блокируется
    /// отдельно и ненадолго, соседние запросы не ждут весь проход.
    pub async fn sweep_expired(&self) -> Result<Vec<SeatId>, ReservationError> {
        let now = now_micros();
        let cutoff = now - self.hold_expiry;
        let candidates = self.store.find_expired_holds(cutoff).await?;
        let mut released = Vec::new();

        for candidate in candidates {
            let Some(lock) = self.locks.locks.get(&candidate.seat_id) else {
                warn!("Seat {} is outside the venue grid, skipping", candidate.seat_id);
                continue;
            };
            let _guard = lock.lock().await;

            // перечитываем под блокировкой: бронь могли уже подтвердить
            let current = self.store.find_by_ids(std::slice::from_ref(&candidate.seat_id)).await?;
            let Some(seat) = current.into_iter().next() else {
                continue;
            };
            if !seat.is_hold_expired(now, self.hold_expiry) {
                continue;
            }

            let expected = ExpectedState::exact_hold(&seat);
            if self.store.conditional_update(&seat.seat_id, &expected, &SeatUpdate::release()).await? {
                debug!("Hold on {} by {:?} expired", seat.seat_id, seat.holder);
                released.push(seat.seat_id);
            }
        }

        if !released.is_empty() {
            self.invalidate_snapshot().await;
        }
        Ok(released)
    }

    // --- Вспомогательные функции ---

    /// Пустые ID это ошибка валидации, ID вне сетки это `NotFound`.
    /// Дубликаты схлопываются, результат отсортирован.
    fn validate_seat_ids(&self, seat_ids: &[String]) -> Result<BTreeSet<SeatId>, ReservationError> {
        if seat_ids.is_empty() {
            return Err(ReservationError::Validation("seatIds must not be empty".into()));
        }

        let mut ids = BTreeSet::new();
        let mut unknown = Vec::new();
        for raw in seat_ids {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(ReservationError::Validation("seat id must not be empty".into()));
            }
            let id = SeatId::from(raw);
            if !self.layout.contains(&id) {
                unknown.push(id.clone());
            }
            ids.insert(id);
        }

        if !unknown.is_empty() {
            return Err(ReservationError::NotFound { seats: unknown });
        }
        Ok(ids)
    }

    /// Читает записи в порядке `ids`. Отсутствующая в хранилище запись для
    /// места из сетки значит, что сетка не инициализирована.
    async fn load_seats(&self, ids: &BTreeSet<SeatId>) -> Result<Vec<Seat>, ReservationError> {
        let wanted: Vec<SeatId> = ids.iter().cloned().collect();
        let mut by_id: HashMap<SeatId, Seat> = self
            .store
            .find_by_ids(&wanted)
            .await?
            .into_iter()
            .map(|s| (s.seat_id.clone(), s))
            .collect();

        let mut seats = Vec::with_capacity(wanted.len());
        let mut missing = Vec::new();
        for id in wanted {
            match by_id.remove(&id) {
                Some(seat) => seats.push(seat),
                None => missing.push(id),
            }
        }

        if !missing.is_empty() {
            error!("Seats {:?} are in the grid but missing from the store", missing);
            return Err(ReservationError::NotFound { seats: missing });
        }
        Ok(seats)
    }

    async fn invalidate_snapshot(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_seats().await;
        }
    }
}

fn validate_user(user_id: &str) -> Result<&str, ReservationError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ReservationError::Validation("userId must not be empty".into()));
    }
    Ok(user_id)
}
