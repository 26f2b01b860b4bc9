//! seat.rs
//!
//! Модель места и его машина состояний.
//!
//! Место живёт по пути `available -> held -> booked`. Из `held` можно
//! вернуться в `available` (отказ оплаты, истечение брони), из `booked`
//! только административным освобождением, которое ядро не открывает наружу,
//! но и не запрещает на уровне модели.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Идентификатор места: метка ряда + номер колонки (`A7`, `012`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(String);

impl SeatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Held,
    Booked,
}

impl SeatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Held => "held",
            SeatStatus::Booked => "booked",
        }
    }

    /// Разрешённые рёбра машины состояний.
    pub fn can_transition_to(self, next: SeatStatus) -> bool {
        matches!(
            (self, next),
            (SeatStatus::Available, SeatStatus::Held)
                | (SeatStatus::Held, SeatStatus::Booked)
                | (SeatStatus::Held, SeatStatus::Available)
                | (SeatStatus::Booked, SeatStatus::Available)
        )
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatStatus::Available),
            "held" => Ok(SeatStatus::Held),
            "booked" => Ok(SeatStatus::Booked),
            other => Err(format!("unknown seat status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    None,
    Pending,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::None => "none",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PaymentStatus::None),
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// Итог оплаты, который присылает вызывающая сторона. Сам платёжный шлюз
/// здесь не вызывается.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Completed,
    #[serde(alias = "cancelled")]
    Failed,
}

/// Запись о месте в хранилище.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub seat_id: SeatId,
    pub status: SeatStatus,
    pub holder: Option<String>,
    pub hold_timestamp: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
}

impl Seat {
    /// Свежая запись для инициализации сетки.
    pub fn available(seat_id: SeatId) -> Self {
        Self {
            seat_id,
            status: SeatStatus::Available,
            holder: None,
            hold_timestamp: None,
            payment_status: PaymentStatus::None,
        }
    }

    pub fn is_held_by(&self, user_id: &str) -> bool {
        self.status == SeatStatus::Held && self.holder.as_deref() == Some(user_id)
    }

    /// Бронь старше окна истечения. Для не-`held` всегда false.
    pub fn is_hold_expired(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        match (self.status, self.hold_timestamp) {
            (SeatStatus::Held, Some(held_at)) => now - held_at >= window,
            // held без метки времени не может быть продлена, считаем истёкшей
            (SeatStatus::Held, None) => true,
            _ => false,
        }
    }

    /// Проверка инвариантов записи.
    pub fn check_invariants(&self) -> Result<(), String> {
        match self.status {
            SeatStatus::Available => {
                if self.holder.is_some() || self.payment_status != PaymentStatus::None {
                    return Err("available seat must have no holder and payment status none".into());
                }
            }
            SeatStatus::Held => {
                if self.holder.as_deref().map_or(true, str::is_empty) {
                    return Err("held seat must have a holder".into());
                }
                if self.payment_status == PaymentStatus::None {
                    return Err("held seat must have a pending payment".into());
                }
            }
            SeatStatus::Booked => {
                if self.holder.as_deref().map_or(true, str::is_empty) {
                    return Err("booked seat must have a holder".into());
                }
                if self.payment_status == PaymentStatus::None {
                    return Err("booked seat must have a pending or completed payment".into());
                }
            }
        }
        Ok(())
    }

    /// Применяет изменение к копии записи.
    pub fn with_update(&self, update: &SeatUpdate) -> Seat {
        Seat {
            seat_id: self.seat_id.clone(),
            status: update.status,
            holder: update.holder.clone(),
            hold_timestamp: update.hold_timestamp,
            payment_status: update.payment_status,
        }
    }
}

/// Ожидаемое состояние для условного обновления. `holder` и
/// `hold_timestamp` проверяются только если заданы.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedState {
    pub status: SeatStatus,
    pub holder: Option<String>,
    pub hold_timestamp: Option<DateTime<Utc>>,
}

impl ExpectedState {
    pub fn available() -> Self {
        Self {
            status: SeatStatus::Available,
            holder: None,
            hold_timestamp: None,
        }
    }

    /// Ровно та бронь, которую мы только что прочитали.
    pub fn exact_hold(seat: &Seat) -> Self {
        Self {
            status: SeatStatus::Held,
            holder: seat.holder.clone(),
            hold_timestamp: seat.hold_timestamp,
        }
    }

    /// Точное текущее состояние записи, включая держателя и метку времени.
    pub fn exact(seat: &Seat) -> Self {
        Self {
            status: seat.status,
            holder: seat.holder.clone(),
            hold_timestamp: seat.hold_timestamp,
        }
    }

    pub fn matches(&self, seat: &Seat) -> bool {
        seat.status == self.status
            && self.holder.as_ref().map_or(true, |h| seat.holder.as_ref() == Some(h))
            && self.hold_timestamp.map_or(true, |ts| seat.hold_timestamp == Some(ts))
    }
}

/// Новые значения изменяемых полей. Собирается только через конструкторы,
/// чтобы каждое обновление сохраняло инварианты записи.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatUpdate {
    pub status: SeatStatus,
    pub holder: Option<String>,
    pub hold_timestamp: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
}

impl SeatUpdate {
    pub fn hold(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            status: SeatStatus::Held,
            holder: Some(user_id.to_string()),
            hold_timestamp: Some(now),
            payment_status: PaymentStatus::Pending,
        }
    }

    pub fn book(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            status: SeatStatus::Booked,
            holder: Some(user_id.to_string()),
            hold_timestamp: Some(now),
            payment_status: PaymentStatus::Completed,
        }
    }

    /// Возвращает запись к ранее прочитанному состоянию.
    pub fn restore(seat: &Seat) -> Self {
        Self {
            status: seat.status,
            holder: seat.holder.clone(),
            hold_timestamp: seat.hold_timestamp,
            payment_status: seat.payment_status,
        }
    }

    pub fn release() -> Self {
        Self {
            status: SeatStatus::Available,
            holder: None,
            hold_timestamp: None,
            payment_status: PaymentStatus::None,
        }
    }
}

/// Текущее время с точностью до микросекунд: столько хранит Postgres,
/// иначе сравнение `hold_timestamp` после записи не совпадёт.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
