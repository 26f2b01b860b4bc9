use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::models::SeatId;
use crate::services::reservation::ReservationEngine;

/// Фоновый процесс, возвращающий в продажу просроченные брони.
///
/// Дополняет ленивую проверку в `hold_seats`/`confirm_booking`: без него
/// брошенная бронь висела бы в списке мест, пока кто-то не попробует
/// занять это место.
pub struct HoldSweeper {
    engine: Arc<ReservationEngine>,
    interval: Duration,
}

impl HoldSweeper {
    pub fn new(engine: Arc<ReservationEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Один проход очистки. Ошибка хранилища логируется, следующий проход
    /// попробует снова.
    pub async fn run_once(&self) -> Vec<SeatId> {
        match self.engine.sweep_expired().await {
            Ok(released) if released.is_empty() => {
                info!("🧹 No expired holds to release");
                released
            }
            Ok(released) => {
                info!("🧹 Released {} expired holds: {:?}", released.len(), released);
                released
            }
            Err(e) => {
                error!("🧹 Hold sweep failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Запускает бесконечный цикл очистки в отдельной задаче.
    pub fn spawn(self) -> JoinHandle<()> {
        info!("🧹 Hold sweeper started, interval {:?}", self.interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
