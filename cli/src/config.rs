use std::sync::Arc;

use ferrotrade_bus::{EventBus, InMemoryEventBus, RedisEventBus};
use ferrotrade_store::{CandleStore, InMemoryStore, PgStore, Stores};

use crate::CliError;

/// Process-wide configuration read from the environment (`spec.md` §9
/// "Global mutable state": no module-level singletons — the supervisor
/// reads config once and injects the resulting handles into each worker).
///
/// `database_url`/`redis_url` are optional: with neither set, `backend run`
/// falls back to the in-memory store and bus so the whole pipeline can be
/// exercised locally without standing up Postgres or Redis.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
}

/// Both views a command needs onto the same backing store: the bundled
/// [`Stores`] trait object most workers take, plus a standalone
/// [`CandleStore`] handle for [`ferrotrade_backtest::BacktestEngine`], which
/// only ever reads candles. Both are clones of the same `Arc<T>`, so there is
/// exactly one store instance regardless of how many trait objects point at
/// it.
#[derive(Clone)]
pub struct StoreHandles {
    pub stores: Arc<dyn Stores>,
    pub candles: Arc<dyn CandleStore>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
        }
    }

    pub async fn build_stores(&self) -> Result<StoreHandles, CliError> {
        match &self.database_url {
            Some(url) => {
                tracing::info!("connecting to postgres store");
                let store = Arc::new(PgStore::connect(url).await?);
                Ok(StoreHandles {
                    stores: store.clone(),
                    candles: store,
                })
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store (demo mode)");
                let store = Arc::new(InMemoryStore::new());
                Ok(StoreHandles {
                    stores: store.clone(),
                    candles: store,
                })
            }
        }
    }

    pub async fn build_bus(&self) -> Result<Arc<dyn EventBus>, CliError> {
        match &self.redis_url {
            Some(url) => {
                tracing::info!("connecting to redis bus");
                Ok(Arc::new(RedisEventBus::connect(url).await?))
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory bus (demo mode)");
                Ok(Arc::new(InMemoryEventBus::new()))
            }
        }
    }
}
