pub mod clock;
pub mod king;
pub mod simulation;
mod sse;
pub mod state_machine;
pub mod tally;
pub mod transitions;
pub mod vote_status;

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{models::SimulationEntity, sim_store::SimStore},
    error::ServiceError,
    state::{simulation::SimulationSession, state_machine::RunPhase},
};

pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::{
    sse::SseState,
    state_machine::{RunEvent, RunStateMachine},
};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Central application state: storage handle, SSE hubs and the live run.
pub struct AppState {
    config: AppConfig,
    sim_store: RwLock<Option<Arc<dyn SimStore>>>,
    sse: SseState,
    run: RwLock<RunStateMachine>,
    current_simulation: RwLock<Option<SimulationSession>>,
    degraded: watch::Sender<bool>,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            sim_store: RwLock::new(None),
            sse: SseState::new(64, 64),
            run: RwLock::new(RunStateMachine::new()),
            current_simulation: RwLock::new(None),
            degraded: degraded_tx,
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn sim_store(&self) -> Option<Arc<dyn SimStore>> {
        let guard = self.sim_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_sim_store(&self) -> Result<Arc<dyn SimStore>, ServiceError> {
        self.sim_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_sim_store(&self, store: Arc<dyn SimStore>) {
        {
            let mut guard = self.sim_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_sim_store(&self) {
        {
            let mut guard = self.sim_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub(crate) fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Broadcast hub used for the facilitator SSE stream.
    pub fn facilitator_sse(&self) -> &SseHub {
        self.sse.facilitator().hub()
    }

    /// Token guard that ensures a single facilitator console at a time.
    pub fn facilitator_token(&self) -> &Mutex<Option<String>> {
        self.sse.facilitator().token()
    }

    /// Current phase of the run state machine.
    pub async fn run_phase(&self) -> RunPhase {
        self.run.read().await.phase()
    }

    pub async fn snapshot(&self) -> Snapshot {
        let sm = self.run.read().await;
        sm.snapshot()
    }

    /// Read the live simulation through `f`.
    pub async fn read_simulation<R>(&self, f: impl FnOnce(Option<&SimulationSession>) -> R) -> R {
        let guard = self.current_simulation.read().await;
        f(guard.as_ref())
    }

    /// Run `f` against the live simulation, failing when none is loaded.
    pub async fn with_simulation<R>(
        &self,
        f: impl FnOnce(&SimulationSession) -> Result<R, ServiceError>,
    ) -> Result<R, ServiceError> {
        let guard = self.current_simulation.read().await;
        let simulation = guard.as_ref().ok_or_else(no_simulation)?;
        f(simulation)
    }

    /// Mutate the live simulation through `f`, failing when none is loaded.
    pub async fn with_simulation_mut<R>(
        &self,
        f: impl FnOnce(&mut SimulationSession) -> Result<R, ServiceError>,
    ) -> Result<R, ServiceError> {
        let mut guard = self.current_simulation.write().await;
        let simulation = guard.as_mut().ok_or_else(no_simulation)?;
        f(simulation)
    }

    /// Replace (or clear) the live simulation slot, returning the previous value.
    pub async fn replace_simulation(
        &self,
        simulation: Option<SimulationSession>,
    ) -> Option<SimulationSession> {
        let mut guard = self.current_simulation.write().await;
        std::mem::replace(&mut *guard, simulation)
    }

    /// Apply `f` to a copy of the live simulation, persist the copy, then swap it in.
    ///
    /// The live run is left untouched when `f` or the store fails.
    pub async fn commit_simulation<R>(
        &self,
        f: impl FnOnce(&mut SimulationSession) -> Result<R, ServiceError>,
    ) -> Result<R, ServiceError> {
        let mut draft = self
            .with_simulation(|simulation| Ok(simulation.clone()))
            .await?;
        let value = f(&mut draft)?;
        let store = self.require_sim_store().await?;
        store.save_simulation(SimulationEntity::from(&draft)).await?;
        self.replace_simulation(Some(draft)).await;
        Ok(value)
    }

    /// Plan a transition to the run state machine, returning the plan.
    async fn plan_transition(&self, event: RunEvent) -> Result<Plan, PlanError> {
        let mut sm = self.run.write().await;
        sm.plan(event)
    }

    /// Apply the planned transition, returning the next phase.
    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<RunPhase, ApplyError> {
        let mut sm = self.run.write().await;
        sm.apply(plan_id)
    }

    /// Abort a planned transition of the run state machine.
    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.run.write().await;
        sm.abort(plan_id)
    }

    /// Plan `event`, run `work`, then apply the plan, or abort it when the work fails or times out.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: RunEvent,
        work: F,
    ) -> Result<(T, RunPhase), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan { id: plan_id, .. } = self.plan_transition(event.clone()).await?;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }

    /// Run `work` under the transition gate without moving the state machine.
    ///
    /// Vote mutations go through here so they never interleave with phase changes.
    pub async fn run_exclusive<F, Fut, T>(&self, work: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let _gate = self.transition_gate.lock().await;
        match self.transition_timeout {
            Some(limit) => timeout(limit, work())
                .await
                .map_err(|_| ServiceError::Timeout)?,
            None => work().await,
        }
    }
}

fn no_simulation() -> ServiceError {
    ServiceError::InvalidState("no simulation is loaded".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::sim_store::memory::MemorySimStore;

    #[tokio::test]
    async fn starts_degraded_until_store_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_sim_store().await,
            Err(ServiceError::Degraded)
        ));

        state.install_sim_store(Arc::new(MemorySimStore::new())).await;
        assert!(!state.is_degraded());

        state.clear_sim_store().await;
        assert!(state.is_degraded());
    }

    #[tokio::test]
    async fn failed_work_aborts_the_plan() {
        let state = AppState::new(AppConfig::default());
        let err = state
            .run_transition(RunEvent::Load(RunPhase::Setup), || async {
                Err::<(), _>(ServiceError::InvalidInput("boom".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(state.run_phase().await, RunPhase::Idle);
        assert!(state.snapshot().await.pending.is_none());
    }

    #[tokio::test]
    async fn successful_work_applies_the_plan() {
        let state = AppState::new(AppConfig::default());
        let (value, next) = state
            .run_transition(RunEvent::Load(RunPhase::Setup), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(next, RunPhase::Setup);
        assert_eq!(state.snapshot().await.version, 1);
    }

    #[tokio::test]
    async fn failed_commit_leaves_live_run_untouched() {
        let state = AppState::new(AppConfig::default());
        state
            .replace_simulation(Some(
                crate::state::simulation::tests::sample_simulation(),
            ))
            .await;

        // No store installed: the save fails after the mutation ran on the draft.
        let err = state
            .commit_simulation(|sim| {
                sim.notes = Some("changed".into());
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
        let notes = state.read_simulation(|sim| sim.and_then(|s| s.notes.clone())).await;
        assert!(notes.is_none());

        state.install_sim_store(Arc::new(MemorySimStore::new())).await;
        state
            .commit_simulation(|sim| {
                sim.notes = Some("changed".into());
                Ok(())
            })
            .await
            .unwrap();
        let notes = state.read_simulation(|sim| sim.and_then(|s| s.notes.clone())).await;
        assert_eq!(notes.as_deref(), Some("changed"));
    }

    #[tokio::test]
    async fn simulation_access_requires_a_loaded_run() {
        let state = AppState::new(AppConfig::default());
        let err = state.with_simulation(|_| Ok(())).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
