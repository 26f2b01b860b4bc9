pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use chrono::TimeDelta;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Config, StoreConfig};
use crate::services::{initialize_grid, ReservationEngine};
use crate::store::{MemorySeatStore, PgSeatStore, SeatStore};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub cache: Option<cache::CacheService>,
    pub config: Config,
}

impl AppState {
    /// Поднимает хранилище, инициализирует сетку мест и собирает движок.
    /// Ошибка инициализации сетки фатальна.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn SeatStore> = match &config.store {
            StoreConfig::Postgres { url, pool_size } => {
                let db = database::Database::connect(url, *pool_size)
                    .await
                    .context("failed to connect to database")?;
                db.migrate().await.context("failed to run migrations")?;
                Arc::new(PgSeatStore::new(&db))
            }
            StoreConfig::Memory => {
                warn!("Using in-memory seat store, state is lost on restart");
                Arc::new(MemorySeatStore::new())
            }
        };

        initialize_grid(store.as_ref(), &config.venue)
            .await
            .context("failed to initialize venue grid")?;

        // кеш опционален: без Redis просто ходим в хранилище
        let cache = match &config.redis.url {
            Some(url) => match cache::CacheService::connect(url, config.redis.seats_ttl_seconds).await {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("Redis unavailable, seats snapshot cache disabled: {}", e);
                    None
                }
            },
            None => None,
        };

        let hold_expiry = TimeDelta::from_std(config.reservation.hold_expiry)
            .context("hold expiry is out of range")?;
        let engine = ReservationEngine::new(store, config.venue.clone(), hold_expiry)
            .with_cache(cache.clone());

        info!(
            "Reservation engine ready: {} seats, hold expiry {}s",
            config.venue.capacity(),
            hold_expiry.num_seconds()
        );

        Ok(Arc::new(Self {
            engine: Arc::new(engine),
            cache,
            config,
        }))
    }
}

/// Главный роутер приложения.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Seat Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
