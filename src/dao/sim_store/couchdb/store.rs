use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use uuid::Uuid;

use crate::dao::{
    models::{EventLogEntity, SimulationEntity},
    sim_store::SimStore,
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, CouchEventDocument, CouchSimulationDocument,
        DeletedDocument, END_SUFFIX, SIMULATION_PREFIX, event_run_prefix, simulation_doc_id,
    },
};

/// CouchDB-backed [`SimStore`] speaking the HTTP document API.
#[derive(Clone)]
pub struct CouchSimStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchSimStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .credentials
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.with_auth(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    /// Create the database on first use.
    async fn ensure_database(&self) -> CouchResult<()> {
        let url = self.database_url();
        let status = match self.database_call(self.client.get(&url)).await?.status() {
            StatusCode::NOT_FOUND => self.database_call(self.client.put(&url)).await?.status(),
            status => status,
        };
        if status.is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::DatabaseStatus {
                database: self.database.to_string(),
                status,
            })
        }
    }

    async fn database_call(&self, builder: RequestBuilder) -> CouchResult<Response> {
        self.with_auth(builder)
            .send()
            .await
            .map_err(|source| CouchDaoError::Database {
                database: self.database.to_string(),
                source,
            })
    }

    /// Send `builder` and reject any non-2xx answer except the statuses in `tolerated`.
    async fn dispatch(
        &self,
        path: &str,
        builder: RequestBuilder,
        tolerated: &[StatusCode],
    ) -> CouchResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;
        let status = response.status();
        if status.is_success() || tolerated.contains(&status) {
            Ok(response)
        } else {
            Err(CouchDaoError::RequestStatus {
                path: path.to_string(),
                status,
            })
        }
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> CouchResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    async fn get_document<T: DeserializeOwned>(&self, doc_id: &str) -> CouchResult<Option<T>> {
        let response = self
            .dispatch(
                doc_id,
                self.request(Method::GET, doc_id),
                &[StatusCode::NOT_FOUND],
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(doc_id, response).await.map(Some)
    }

    async fn put_document<T: ?Sized + Serialize>(&self, doc_id: &str, document: &T) -> CouchResult<()> {
        self.dispatch(doc_id, self.request(Method::PUT, doc_id).json(document), &[])
            .await
            .map(drop)
    }

    /// Documents whose id starts with `prefix`, in id order.
    async fn list_documents<T: DeserializeOwned>(&self, prefix: &str) -> CouchResult<Vec<T>> {
        const ALL_DOCS: &str = "_all_docs";
        let range = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];
        let response = self
            .dispatch(ALL_DOCS, self.request(Method::GET, ALL_DOCS).query(&range), &[])
            .await?;
        let page: AllDocsResponse = Self::decode(ALL_DOCS, response).await?;

        page.rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn delete_documents(&self, docs: Vec<DeletedDocument>) -> CouchResult<()> {
        const BULK_DOCS: &str = "_bulk_docs";
        if docs.is_empty() {
            return Ok(());
        }
        let body = BulkDocsRequest { docs };
        self.dispatch(BULK_DOCS, self.request(Method::POST, BULK_DOCS).json(&body), &[])
            .await
            .map(drop)
    }
}

impl SimStore for CouchSimStore {
    fn save_simulation(&self, simulation: SimulationEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = simulation_doc_id(simulation.id);
            let rev = store
                .get_document::<CouchSimulationDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchSimulationDocument::from((simulation, rev));
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
    }

    fn find_simulation(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SimulationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = simulation_doc_id(id);
            let maybe_doc = store
                .get_document::<CouchSimulationDocument>(&doc_id)
                .await?;
            Ok(maybe_doc.map(|doc| doc.simulation))
        })
    }

    fn list_simulations(&self) -> BoxFuture<'static, StorageResult<Vec<SimulationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchSimulationDocument>(SIMULATION_PREFIX)
                .await?;
            let mut simulations = docs
                .into_iter()
                .map(|doc| doc.simulation)
                .collect::<Vec<_>>();
            simulations.sort_by_key(|simulation| simulation.created_at);
            Ok(simulations)
        })
    }

    fn delete_simulation(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = simulation_doc_id(id);
            let Some(existing) = store
                .get_document::<CouchSimulationDocument>(&doc_id)
                .await?
            else {
                return Ok(false);
            };

            let mut tombstones = store
                .list_documents::<CouchEventDocument>(&event_run_prefix(id))
                .await?
                .into_iter()
                .filter_map(|doc| {
                    doc.rev.map(|rev| DeletedDocument {
                        id: doc.id,
                        rev,
                        deleted: true,
                    })
                })
                .collect::<Vec<_>>();
            if let Some(rev) = existing.rev {
                tombstones.push(DeletedDocument {
                    id: existing.id,
                    rev,
                    deleted: true,
                });
            }

            store.delete_documents(tombstones).await?;
            Ok(true)
        })
    }

    fn append_event(&self, event: EventLogEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchEventDocument::from(event);
            store.put_document(&doc.id, &doc).await.map_err(Into::into)
        })
    }

    fn list_events(&self, run_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<EventLogEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchEventDocument>(&event_run_prefix(run_id))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.event).collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            store
                .dispatch(&url, store.with_auth(store.client.get(&url)), &[])
                .await
                .map(drop)
                .map_err(Into::into)
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
