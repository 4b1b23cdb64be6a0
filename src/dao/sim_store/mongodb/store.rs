use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoEventDocument, MongoSimulationDocument, doc_id, run_filter},
};
use crate::dao::{
    models::{EventLogEntity, SimulationEntity},
    sim_store::SimStore,
    storage::StorageResult,
};

const SIMULATION_COLLECTION_NAME: &str = "simulations";
const EVENT_COLLECTION_NAME: &str = "event_log";

/// MongoDB-backed [`SimStore`].
#[derive(Clone)]
pub struct MongoSimStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSimStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let simulations =
            database.collection::<mongodb::bson::Document>(SIMULATION_COLLECTION_NAME);
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"name": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("simulation_name_idx".to_owned()))
                    .build(),
            )
            .build();

        simulations
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SIMULATION_COLLECTION_NAME,
                index: "name",
                source,
            })?;

        let events = database.collection::<mongodb::bson::Document>(EVENT_COLLECTION_NAME);
        let event_index = mongodb::IndexModel::builder()
            .keys(doc! {"run_id": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("event_run_time_idx".to_owned()))
                    .build(),
            )
            .build();

        events
            .create_index(event_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: EVENT_COLLECTION_NAME,
                index: "run_id,created_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection(&self) -> Collection<MongoSimulationDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSimulationDocument>(SIMULATION_COLLECTION_NAME)
    }

    async fn event_collection(&self) -> Collection<MongoEventDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoEventDocument>(EVENT_COLLECTION_NAME)
    }

    async fn save_simulation(&self, simulation: SimulationEntity) -> MongoResult<()> {
        let id = simulation.id;
        let document: MongoSimulationDocument = simulation.into();
        let collection = self.collection().await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSimulation { id, source })?;

        Ok(())
    }

    async fn find_simulation(&self, id: Uuid) -> MongoResult<Option<SimulationEntity>> {
        let collection = self.collection().await;

        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSimulation { id, source })?;

        Ok(document.map(Into::into))
    }

    async fn list_simulations(&self) -> MongoResult<Vec<SimulationEntity>> {
        let collection = self.collection().await;

        let documents: Vec<MongoSimulationDocument> = collection
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::ListSimulations { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListSimulations { source })?;

        let mut simulations = documents
            .into_iter()
            .map(SimulationEntity::from)
            .collect::<Vec<_>>();
        simulations.sort_by_key(|simulation| simulation.created_at);
        Ok(simulations)
    }

    async fn delete_simulation(&self, id: Uuid) -> MongoResult<bool> {
        let collection = self.collection().await;
        let result = collection
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteSimulation { id, source })?;

        let events = self.event_collection().await;
        events
            .delete_many(run_filter(id))
            .await
            .map_err(|source| MongoDaoError::DeleteSimulation { id, source })?;

        Ok(result.deleted_count > 0)
    }

    async fn append_event(&self, event: EventLogEntity) -> MongoResult<()> {
        let run_id = event.run_id;
        let document: MongoEventDocument = event.into();
        let collection = self.event_collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::AppendEvent { run_id, source })?;
        Ok(())
    }

    async fn list_events(&self, run_id: Uuid) -> MongoResult<Vec<EventLogEntity>> {
        let collection = self.event_collection().await;

        let documents: Vec<MongoEventDocument> = collection
            .find(run_filter(run_id))
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::ListEvents { run_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListEvents { run_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl SimStore for MongoSimStore {
    fn save_simulation(&self, simulation: SimulationEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_simulation(simulation).await.map_err(Into::into) })
    }

    fn find_simulation(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SimulationEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_simulation(id).await.map_err(Into::into) })
    }

    fn list_simulations(&self) -> BoxFuture<'static, StorageResult<Vec<SimulationEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_simulations().await.map_err(Into::into) })
    }

    fn delete_simulation(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_simulation(id).await.map_err(Into::into) })
    }

    fn append_event(&self, event: EventLogEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_event(event).await.map_err(Into::into) })
    }

    fn list_events(&self, run_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<EventLogEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_events(run_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
