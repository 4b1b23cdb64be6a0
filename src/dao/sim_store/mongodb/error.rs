use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save simulation `{id}`")]
    SaveSimulation {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load simulation `{id}`")]
    LoadSimulation {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete simulation `{id}`")]
    DeleteSimulation {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list simulations")]
    ListSimulations {
        #[source]
        source: MongoError,
    },
    #[error("failed to append event log entry for run `{run_id}`")]
    AppendEvent {
        run_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list event log of run `{run_id}`")]
    ListEvents {
        run_id: Uuid,
        #[source]
        source: MongoError,
    },
}
