use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{EventLogEntity, SimulationEntity};

/// Run aggregate wrapped with top-level fields used for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSimulationDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    updated_at: DateTime,
    simulation: SimulationEntity,
}

impl From<SimulationEntity> for MongoSimulationDocument {
    fn from(value: SimulationEntity) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name.clone(),
            updated_at: DateTime::from_system_time(value.updated_at),
            simulation: value,
        }
    }
}

impl From<MongoSimulationDocument> for SimulationEntity {
    fn from(value: MongoSimulationDocument) -> Self {
        value.simulation
    }
}

/// Audit entry keyed for per-run, time-ordered scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    id: String,
    run_id: String,
    created_at: DateTime,
    event: EventLogEntity,
}

impl From<EventLogEntity> for MongoEventDocument {
    fn from(value: EventLogEntity) -> Self {
        Self {
            id: value.id.to_string(),
            run_id: value.run_id.to_string(),
            created_at: DateTime::from_system_time(value.created_at),
            event: value,
        }
    }
}

impl From<MongoEventDocument> for EventLogEntity {
    fn from(value: MongoEventDocument) -> Self {
        value.event
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn run_filter(run_id: Uuid) -> Document {
    doc! {"run_id": run_id.to_string()}
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use serde_json::json;

    use super::*;

    #[test]
    fn event_document_keeps_string_keys() {
        let run_id = Uuid::new_v4();
        let entity = EventLogEntity {
            id: Uuid::new_v4(),
            run_id,
            event_type: "vote_on_behalf".into(),
            payload: json!({"reason": "left the room"}),
            created_at: SystemTime::now(),
        };

        let document = MongoEventDocument::from(entity.clone());
        assert_eq!(document.run_id, run_id.to_string());
        assert_eq!(EventLogEntity::from(document), entity);
        assert_eq!(run_filter(run_id), doc! {"run_id": run_id.to_string()});
    }
}
