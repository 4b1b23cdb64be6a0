use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{dao::models::EventLogEntity, dto::format_system_time};

/// Audit entry as listed to the facilitator.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventLogDto {
    pub id: Uuid,
    pub run_id: Uuid,
    pub event_type: String,
    #[schema(value_type = Object)]
    pub payload: Value,
    pub created_at: String,
}

impl From<EventLogEntity> for EventLogDto {
    fn from(value: EventLogEntity) -> Self {
        Self {
            id: value.id,
            run_id: value.run_id,
            event_type: value.event_type,
            payload: value.payload,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Filter of the audit listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Run to list; the loaded run when omitted.
    pub run_id: Option<Uuid>,
}
