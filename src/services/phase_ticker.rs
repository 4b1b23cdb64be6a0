//! Background loop pushing the running phase's clock to every SSE client.

use std::time::SystemTime;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::models::PhaseStatus,
    dto::{
        phase::PhaseClockDto,
        sse::{PhaseOvertimeEvent, PhaseTimerEvent},
    },
    services::sse_events,
    state::{SharedState, clock::PhaseClock},
};

/// Remembers which phase already had its overtime announced.
#[derive(Debug, Default)]
pub struct TickerState {
    overtime_announced: Option<Uuid>,
}

/// Broadcast `phase.timer` every tick and `phase.overtime` once per crossing.
pub async fn run(state: SharedState) {
    let period = state.config().tick_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticker_state = TickerState::default();
    info!(period_ms = period.as_millis() as u64, "phase ticker started");

    loop {
        ticker.tick().await;
        tick(&state, &mut ticker_state, SystemTime::now()).await;
    }
}

/// One pass of the ticker at `now`.
pub async fn tick(state: &SharedState, ticker_state: &mut TickerState, now: SystemTime) {
    let thresholds = state.config().timer_thresholds();
    let reading = state
        .read_simulation(|maybe| {
            let phase = maybe?
                .running_phase()
                .filter(|phase| phase.status == PhaseStatus::Active)?;
            let clock = PhaseClock::read(phase, now, &thresholds)?;
            Some((phase.id, phase.name.clone(), clock))
        })
        .await;

    let Some((phase_id, phase_name, clock)) = reading else {
        return;
    };

    let crossed = clock.overtime;
    let planned_minutes = clock.planned_minutes;
    sse_events::broadcast_phase_timer(
        state,
        &PhaseTimerEvent {
            phase_id,
            phase_name: phase_name.clone(),
            clock: PhaseClockDto::from(clock),
        },
    );

    match (crossed, ticker_state.overtime_announced == Some(phase_id)) {
        (true, false) => {
            info!(%phase_id, phase = %phase_name, planned_minutes, "phase ran over its planned time");
            ticker_state.overtime_announced = Some(phase_id);
            sse_events::broadcast_phase_overtime(
                state,
                &PhaseOvertimeEvent {
                    phase_id,
                    phase_name,
                    planned_minutes,
                },
            );
        }
        // An extension pulled the phase back into its plan.
        (false, true) => {
            debug!(%phase_id, "overtime cleared");
            ticker_state.overtime_announced = None;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, simulation::tests::sample_simulation},
    };

    #[tokio::test]
    async fn overtime_is_announced_once() {
        let state = AppState::new(AppConfig::default());
        let mut sim = sample_simulation();
        let first = *sim.phases.keys().next().unwrap();
        let started = SystemTime::now() - Duration::from_secs(11 * 60);
        sim.start_phase(first, started).unwrap();
        state.replace_simulation(Some(sim)).await;

        let mut public = state.public_sse().subscribe();
        let mut ticker_state = TickerState::default();
        let now = SystemTime::now();

        tick(&state, &mut ticker_state, now).await;
        tick(&state, &mut ticker_state, now).await;

        let names: Vec<_> = std::iter::from_fn(|| public.try_recv().ok())
            .filter_map(|event| event.event)
            .collect();
        assert_eq!(
            names,
            ["phase.timer", "phase.overtime", "phase.timer"]
        );
    }

    #[tokio::test]
    async fn extension_rearms_the_overtime_notice() {
        let state = AppState::new(AppConfig::default());
        let mut sim = sample_simulation();
        let first = *sim.phases.keys().next().unwrap();
        let started = SystemTime::now() - Duration::from_secs(11 * 60);
        sim.start_phase(first, started).unwrap();
        state.replace_simulation(Some(sim)).await;

        let mut public = state.public_sse().subscribe();
        let mut ticker_state = TickerState::default();
        let now = SystemTime::now();

        tick(&state, &mut ticker_state, now).await;
        assert_eq!(ticker_state.overtime_announced, Some(first));

        state
            .with_simulation_mut(|sim| {
                sim.extend_phase(5, now)?;
                Ok(())
            })
            .await
            .unwrap();
        tick(&state, &mut ticker_state, now).await;
        assert_eq!(ticker_state.overtime_announced, None);

        tick(&state, &mut ticker_state, now + Duration::from_secs(5 * 60)).await;
        assert_eq!(ticker_state.overtime_announced, Some(first));

        let names: Vec<_> = std::iter::from_fn(|| public.try_recv().ok())
            .filter_map(|event| event.event)
            .collect();
        assert_eq!(
            names,
            ["phase.timer", "phase.overtime", "phase.timer", "phase.timer", "phase.overtime"]
        );
    }

    #[tokio::test]
    async fn nothing_is_sent_without_an_active_phase() {
        let state = AppState::new(AppConfig::default());
        state.replace_simulation(Some(sample_simulation())).await;
        let mut public = state.public_sse().subscribe();

        tick(&state, &mut TickerState::default(), SystemTime::now()).await;
        assert!(public.try_recv().is_err());
    }
}
