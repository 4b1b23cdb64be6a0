use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{EventLogEntity, SimulationEntity};

pub const SIMULATION_PREFIX: &str = "simulation::";
pub const EVENT_PREFIX: &str = "event::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSimulationDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub simulation: SimulationEntity,
}

impl From<(SimulationEntity, Option<String>)> for CouchSimulationDocument {
    fn from((simulation, rev): (SimulationEntity, Option<String>)) -> Self {
        Self {
            id: simulation_doc_id(simulation.id),
            rev,
            simulation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchEventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub event: EventLogEntity,
}

impl From<EventLogEntity> for CouchEventDocument {
    fn from(event: EventLogEntity) -> Self {
        Self {
            id: event_doc_id(&event),
            rev: None,
            event,
        }
    }
}

/// Tombstone sent through `_bulk_docs`.
#[derive(Debug, Serialize)]
pub struct DeletedDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(rename = "_deleted")]
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest {
    pub docs: Vec<DeletedDocument>,
}

pub fn simulation_doc_id(id: Uuid) -> String {
    format!("{SIMULATION_PREFIX}{id}")
}

/// Prefix shared by every audit entry of a run.
pub fn event_run_prefix(run_id: Uuid) -> String {
    format!("{EVENT_PREFIX}{run_id}::")
}

/// Zero-padded timestamp keeps `_all_docs` key order chronological.
pub fn event_doc_id(event: &EventLogEntity) -> String {
    let nanos = event
        .created_at
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("{}{nanos:020}::{}", event_run_prefix(event.run_id), event.id)
}
