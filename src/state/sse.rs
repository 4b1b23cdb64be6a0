use tokio::sync::{Mutex, broadcast};

use crate::dto::sse::ServerEvent;

/// SSE-specific sub-state carved out from [`AppState`](super::AppState).
pub struct SseState {
    public: SseHub,
    facilitator: FacilitatorSseState,
}

impl SseState {
    /// Build the SSE sub-tree with per-stream channel capacities.
    pub fn new(public_capacity: usize, facilitator_capacity: usize) -> Self {
        Self {
            public: SseHub::new(public_capacity),
            facilitator: FacilitatorSseState::new(facilitator_capacity),
        }
    }

    /// Hub fanning out room-wide events.
    pub fn public(&self) -> &SseHub {
        &self.public
    }

    /// Facilitator hub together with its session token.
    pub fn facilitator(&self) -> &FacilitatorSseState {
        &self.facilitator
    }
}

/// Facilitator hub and the token of the single connected console.
pub struct FacilitatorSseState {
    hub: SseHub,
    token: Mutex<Option<String>>,
}

impl FacilitatorSseState {
    fn new(capacity: usize) -> Self {
        Self {
            hub: SseHub::new(capacity),
            token: Mutex::new(None),
        }
    }

    /// Broadcast hub for facilitator-only events.
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    /// Token issued to the connected facilitator console, if any.
    pub fn token(&self) -> &Mutex<Option<String>> {
        &self.token
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of connected subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
