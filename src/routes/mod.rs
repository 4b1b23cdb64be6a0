use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod facilitator;
pub mod health;
pub mod participant;
pub mod public;
pub mod sse;

/// Every route tree of the backend, bound to the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(public::router())
        .merge(facilitator::router(state.clone()))
        .merge(participant::router(state.clone()))
        .merge(docs::router());

    api_router.with_state(state)
}
