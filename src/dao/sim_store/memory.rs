//! Process-local store used by tests and by `STORAGE_BACKEND=memory`.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{EventLogEntity, SimulationEntity},
    sim_store::SimStore,
    storage::StorageResult,
};

/// Keeps every run in a concurrent map; data is lost on restart.
#[derive(Clone, Default)]
pub struct MemorySimStore {
    simulations: Arc<DashMap<Uuid, SimulationEntity>>,
    events: Arc<DashMap<Uuid, Vec<EventLogEntity>>>,
}

impl MemorySimStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SimStore for MemorySimStore {
    fn save_simulation(&self, simulation: SimulationEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.simulations.insert(simulation.id, simulation);
            Ok(())
        })
    }

    fn find_simulation(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SimulationEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.simulations.get(&id).map(|entry| entry.clone())) })
    }

    fn list_simulations(&self) -> BoxFuture<'static, StorageResult<Vec<SimulationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut simulations = store
                .simulations
                .iter()
                .map(|entry| entry.value().clone())
                .collect::<Vec<_>>();
            simulations.sort_by_key(|simulation| simulation.created_at);
            Ok(simulations)
        })
    }

    fn delete_simulation(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.events.remove(&id);
            Ok(store.simulations.remove(&id).is_some())
        })
    }

    fn append_event(&self, event: EventLogEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.events.entry(event.run_id).or_default().push(event);
            Ok(())
        })
    }

    fn list_events(&self, run_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<EventLogEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .events
                .get(&run_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
