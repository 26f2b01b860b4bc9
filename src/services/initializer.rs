use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::info;

use crate::error::StoreError;
use crate::models::{Seat, VenueLayout};
use crate::store::SeatStore;

// Сколько вставок держим в полёте одновременно
const INIT_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSummary {
    pub inserted: usize,
    pub existing: usize,
}

/// Создаёт по одной записи на каждое место сетки. Существующие записи не
/// трогаются, поэтому повторный запуск ничего не сбрасывает.
///
/// Любая ошибка хранилища прерывает инициализацию: работать с недосозданной
/// сеткой нельзя.
pub async fn initialize_grid(store: &dyn SeatStore, layout: &VenueLayout) -> Result<GridSummary, StoreError> {
    info!("🪑 Initializing venue grid: {} rows x {} columns", layout.row_labels().len(), layout.columns());

    let inserted = stream::iter(layout.seat_ids())
        .map(|seat_id| async move { store.upsert_if_absent(&Seat::available(seat_id)).await })
        .buffer_unordered(INIT_CONCURRENCY)
        .try_fold(0usize, |acc, created| async move { Ok(acc + usize::from(created)) })
        .await?;

    let summary = GridSummary {
        inserted,
        existing: layout.capacity() - inserted,
    };
    info!("🪑 Venue grid ready: {} seats created, {} already present", summary.inserted, summary.existing);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now_micros, ExpectedState, SeatId, SeatStatus, SeatUpdate};
    use crate::store::MemorySeatStore;

    #[tokio::test]
    async fn creates_every_seat_once() {
        let store = MemorySeatStore::new();
        let layout = VenueLayout::default();

        let first = initialize_grid(&store, &layout).await.unwrap();
        assert_eq!(first, GridSummary { inserted: 374, existing: 0 });

        let second = initialize_grid(&store, &layout).await.unwrap();
        assert_eq!(second, GridSummary { inserted: 0, existing: 374 });
        assert_eq!(store.find_all().await.unwrap().len(), 374);
    }

    #[tokio::test]
    async fn rerun_keeps_existing_state() {
        let store = MemorySeatStore::new();
        let layout = VenueLayout::default();
        initialize_grid(&store, &layout).await.unwrap();

        let id = SeatId::from("A5");
        store
            .conditional_update(&id, &ExpectedState::available(), &SeatUpdate::hold("u1", now_micros()))
            .await
            .unwrap();

        initialize_grid(&store, &layout).await.unwrap();
        let seat = &store.find_by_ids(&[id]).await.unwrap()[0];
        assert_eq!(seat.status, SeatStatus::Held);
        assert_eq!(seat.holder.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn fills_in_missing_seats_only() {
        let store = MemorySeatStore::new();
        let layout = VenueLayout::new("AB".chars(), 2).unwrap();
        store.upsert_if_absent(&Seat::available(SeatId::from("A1"))).await.unwrap();

        let summary = initialize_grid(&store, &layout).await.unwrap();
        assert_eq!(summary, GridSummary { inserted: 3, existing: 1 });
    }
}
