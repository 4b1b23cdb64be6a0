use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{
    error::AppError,
    services::sse_service::{self, StreamKind},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Public SSE stream; opens with a phase snapshot", content_type = "text/event-stream", body = String))
)]
/// Stream room-wide events to the projector and participant screens.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (receiver, initial) = sse_service::subscribe_public(&state).await;
    info!("new public SSE connection");
    sse_service::to_sse_stream(receiver, initial, StreamKind::Public)
}

#[utoipa::path(
    get,
    path = "/sse/facilitator",
    tag = "sse",
    responses(
        (status = 200, description = "Facilitator SSE stream; opens with `facilitator_token`", content_type = "text/event-stream", body = String),
        (status = 401, description = "Another facilitator console is connected")
    )
)]
/// Stream facilitator events, issuing the token the facilitator routes expect.
pub async fn facilitator_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let (receiver, initial) = sse_service::subscribe_facilitator(&state).await?;
    info!("new facilitator SSE connection");
    Ok(sse_service::to_sse_stream(
        receiver,
        initial,
        StreamKind::Facilitator(state),
    ))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/public", get(public_stream))
        .route("/sse/facilitator", get(facilitator_stream))
}
