#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::{env, sync::Arc};

use crate::dao::models::{EventLogEntity, SimulationEntity};
use crate::dao::storage::{StorageError, StorageResult};
use futures::future::BoxFuture;
use tracing::warn;
use uuid::Uuid;

const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";

/// Abstraction over the persistence layer for simulation runs and their audit log.
pub trait SimStore: Send + Sync {
    /// Insert or replace the whole run aggregate.
    fn save_simulation(&self, simulation: SimulationEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch one run.
    fn find_simulation(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SimulationEntity>>>;
    /// Fetch every stored run.
    fn list_simulations(&self) -> BoxFuture<'static, StorageResult<Vec<SimulationEntity>>>;
    /// Remove a run and its audit trail, returning whether it existed.
    fn delete_simulation(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Append an audit entry.
    fn append_event(&self, event: EventLogEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Audit entries of a run, oldest first.
    fn list_events(&self, run_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<EventLogEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Persistence backend picked with `STORAGE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Mongo,
    Couch,
    Memory,
}

impl StorageBackend {
    /// Parse a backend name, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Some(Self::Mongo),
            "couch" | "couchdb" => Some(Self::Couch),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Backend named by `STORAGE_BACKEND`, MongoDB when unset or unknown.
    pub fn from_env() -> Self {
        match env::var(STORAGE_BACKEND_ENV) {
            Ok(value) => Self::parse(&value).unwrap_or_else(|| {
                warn!(value = %value, "unknown STORAGE_BACKEND; falling back to mongo");
                Self::Mongo
            }),
            Err(_) => Self::Mongo,
        }
    }

    /// Open a store for this backend using its environment settings.
    pub async fn connect(self) -> StorageResult<Arc<dyn SimStore>> {
        match self {
            Self::Memory => Ok(Arc::new(memory::MemorySimStore::new())),
            #[cfg(feature = "mongo-store")]
            Self::Mongo => {
                let config = self::mongodb::MongoConfig::from_env().await?;
                Ok(Arc::new(self::mongodb::MongoSimStore::connect(config).await?))
            }
            #[cfg(feature = "couch-store")]
            Self::Couch => {
                let config = self::couchdb::CouchConfig::from_env()?;
                Ok(Arc::new(self::couchdb::CouchSimStore::connect(config).await?))
            }
            #[allow(unreachable_patterns)]
            disabled => Err(StorageError::unavailable(
                format!("{disabled:?} backend is not compiled in"),
                std::io::Error::other("storage feature disabled"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_are_case_insensitive() {
        assert_eq!(StorageBackend::parse("Memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse(" couchdb "), Some(StorageBackend::Couch));
        assert_eq!(StorageBackend::parse("mongo"), Some(StorageBackend::Mongo));
        assert_eq!(StorageBackend::parse("redis"), None);
    }
}
