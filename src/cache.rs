use std::future::Future;
use std::sync::Arc;

use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::Seat;

const SEATS_SNAPSHOT_KEY: &str = "seats:snapshot";

/// Версия снимка мест внутри процесса. Растёт при каждой инвалидации.
///
/// Запись снимка и инвалидация выполняются под одной блокировкой: снимок,
/// прочитанный до изменения, либо увидит новую версию и не запишется, либо
/// будет записан раньше и удалён следующей инвалидацией.
#[derive(Debug, Clone, Default)]
pub struct SnapshotVersion {
    current: Arc<Mutex<u64>>,
}

impl SnapshotVersion {
    pub async fn current(&self) -> u64 {
        *self.current.lock().await
    }

    /// Выполняет `write`, только если версия всё ещё равна `seen`.
    pub async fn write_if_unchanged<F, Fut>(&self, seen: u64, write: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let version = self.current.lock().await;
        if *version != seen {
            return false;
        }
        write().await;
        true
    }

    /// Увеличивает версию и выполняет `invalidate` под той же блокировкой.
    pub async fn bump_with<F, Fut>(&self, invalidate: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut version = self.current.lock().await;
        *version += 1;
        invalidate().await;
    }
}

/// Кеш снимка мест в Redis для `GET /seats`.
///
/// Любая ошибка Redis только логируется: запрос уходит в хранилище, кеш
/// никогда не роняет обработку.
#[derive(Clone)]
pub struct CacheService {
    conn: ConnectionManager,
    ttl_seconds: u64,
    version: SnapshotVersion,
}

impl CacheService {
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        info!("Redis connected, seats snapshot TTL {}s", ttl_seconds);
        Ok(Self {
            conn,
            ttl_seconds,
            version: SnapshotVersion::default(),
        })
    }

    // Получить снимок мест из кеша
    pub async fn get_seats(&self) -> Option<Vec<Seat>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = match conn.get(SEATS_SNAPSHOT_KEY).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read seats snapshot from Redis: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&data?) {
            Ok(seats) => Some(seats),
            Err(e) => {
                warn!("Dropping unreadable seats snapshot: {}", e);
                self.invalidate_seats().await;
                None
            }
        }
    }

    /// Версию нужно прочитать до чтения мест из хранилища.
    pub async fn snapshot_version(&self) -> u64 {
        self.version.current().await
    }

    /// Сохраняет снимок, прочитанный при версии `seen`. Если с тех пор места
    /// менялись, снимок устарел и не сохраняется.
    pub async fn save_seats(&self, seats: &[Seat], seen: u64) -> bool {
        let data = match serde_json::to_string(seats) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to serialize seats snapshot: {}", e);
                return false;
            }
        };

        let saved = self
            .version
            .write_if_unchanged(seen, || async move {
                let mut conn = self.conn.clone();
                let result: redis::RedisResult<()> =
                    conn.set_ex(SEATS_SNAPSHOT_KEY, data, self.ttl_seconds).await;
                if let Err(e) = result {
                    warn!("Failed to cache seats snapshot: {}", e);
                }
            })
            .await;
        if !saved {
            debug!("Seats changed while building snapshot, not caching it");
        }
        saved
    }

    // Инвалидировать снимок после любого изменения мест
    pub async fn invalidate_seats(&self) {
        self.version
            .bump_with(|| async {
                let mut conn = self.conn.clone();
                let result: redis::RedisResult<()> = conn.del(SEATS_SNAPSHOT_KEY).await;
                match result {
                    Ok(()) => debug!("Invalidated seats snapshot"),
                    Err(e) => warn!("Failed to invalidate seats snapshot: {}", e),
                }
            })
            .await;
    }
}
