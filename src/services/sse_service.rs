use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt, stream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::{FacilitatorHandshake, Handshake, PhaseChangedEvent, ServerEvent},
    error::ServiceError,
    services::phase_service,
    state::SharedState,
};

const EVENT_FACILITATOR_TOKEN: &str = "facilitator_token";
const EVENT_PHASE_CHANGED: &str = "phase_changed";
const EVENT_INFO: &str = "info";

/// Subscribe to the room stream, with the current phase snapshot as first event.
pub async fn subscribe_public(
    state: &SharedState,
) -> (broadcast::Receiver<ServerEvent>, Vec<ServerEvent>) {
    let receiver = state.public_sse().subscribe();
    let snapshot = PhaseChangedEvent(phase_service::current_snapshot(state).await);

    let mut initial = Vec::with_capacity(2);
    push_json(&mut initial, EVENT_PHASE_CHANGED, &snapshot);
    push_json(
        &mut initial,
        EVENT_INFO,
        &Handshake {
            stream: "public".into(),
            message: "public stream connected".into(),
            degraded: state.is_degraded(),
            token: None,
        },
    );
    (receiver, initial)
}

/// Subscribe to the facilitator stream, claiming the single facilitator token.
pub async fn subscribe_facilitator(
    state: &SharedState,
) -> Result<(broadcast::Receiver<ServerEvent>, Vec<ServerEvent>), ServiceError> {
    let token = claim_facilitator_token(state).await?;
    let receiver = state.facilitator_sse().subscribe();
    let snapshot = PhaseChangedEvent(phase_service::current_snapshot(state).await);

    let mut initial = Vec::with_capacity(2);
    push_json(
        &mut initial,
        EVENT_FACILITATOR_TOKEN,
        &FacilitatorHandshake { token },
    );
    push_json(&mut initial, EVENT_PHASE_CHANGED, &snapshot);
    Ok((receiver, initial))
}

/// Identifies the target SSE stream so teardown can do stream-specific cleanup.
#[derive(Clone)]
pub enum StreamKind {
    Public,
    /// Holds the state so the facilitator token can be released on disconnect.
    Facilitator(SharedState),
}

/// Convert a broadcast receiver into an SSE response: `initial` goes out first,
/// then every broadcast event until the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    initial: Vec<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "SSE client lagged; dropping events");
                            continue;
                        }
                    }
                }
            }
        }

        match kind {
            StreamKind::Public => info!("public SSE stream disconnected"),
            StreamKind::Facilitator(state) => {
                reset_facilitator_token(state).await;
                info!("facilitator SSE stream disconnected");
            }
        }
    });

    let head = stream::iter(initial.into_iter().map(|event| Ok(to_event(event))));
    let body = head.chain(ReceiverStream::new(rx));
    Sse::new(body).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

fn push_json(target: &mut Vec<ServerEvent>, event: &str, payload: &impl serde::Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => target.push(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE handshake"),
    }
}

/// Reserve the facilitator token for a new stream, failing while another
/// console holds it.
async fn claim_facilitator_token(state: &SharedState) -> Result<String, ServiceError> {
    let mut guard = state.facilitator_token().lock().await;
    match &mut *guard {
        slot @ None => {
            let token = Uuid::new_v4().simple().to_string();
            slot.replace(token.clone());
            Ok(token)
        }
        Some(_) => Err(ServiceError::Unauthorized(
            "another facilitator SSE stream is already active".into(),
        )),
    }
}

/// Forget the token so the next console negotiates a fresh one.
async fn reset_facilitator_token(state: SharedState) {
    let mut guard = state.facilitator_token().lock().await;
    guard.take();
}

/// Compare `provided` with the token of the connected facilitator console.
pub async fn check_facilitator_token(
    state: &SharedState,
    provided: &str,
) -> Result<(), ServiceError> {
    let guard = state.facilitator_token().lock().await;
    match guard.as_deref() {
        Some(token) if token == provided => Ok(()),
        Some(_) => Err(ServiceError::Unauthorized("invalid facilitator token".into())),
        None => Err(ServiceError::Unauthorized(
            "facilitator SSE stream not initialised yet".into(),
        )),
    }
}
