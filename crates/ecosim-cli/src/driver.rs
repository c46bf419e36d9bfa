//! Paces engine cycles and reports progress on the console.

use anyhow::Result;
use ecosim_core::{Neighborhood, RunId};
use ecosim_world::{Simulation, SimulationObserver, SimulationState, StatsSnapshot};
use serde::Serialize;
use std::fmt;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Pause between cycles; zero runs flat out
    pub delay: Duration,
    pub max_cycles: Option<u64>,
    /// Print the grid after every cycle
    pub render: bool,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Unbalanced,
    Stopped,
    MaxCycles,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Unbalanced => write!(f, "ecosystem unbalanced"),
            EndReason::Stopped => write!(f, "stopped"),
            EndReason::MaxCycles => write!(f, "maximum cycle count reached"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub reason: EndReason,
    pub state: SimulationState,
    pub neighborhood: Neighborhood,
    pub stats: StatsSnapshot,
}

/// Step `simulation` until it reports an unbalanced ecosystem, is stopped,
/// or reaches `max_cycles`.
///
/// Each cycle runs on the blocking pool; cycles never overlap.
pub async fn run(mut simulation: Simulation, options: DriverOptions) -> Result<RunSummary> {
    let observer = simulation.observer();
    let mut ticker = pacing(options.delay);

    info!(
        event = "run_started",
        run_id = %observer.run_id(),
        delay_ms = options.delay.as_millis() as u64,
        max_cycles = ?options.max_cycles,
        "Starting simulation run"
    );

    if options.render {
        print_frame(&observer);
    }

    let reason = loop {
        if let Some(max) = options.max_cycles {
            if observer.current_cycle() >= max {
                break EndReason::MaxCycles;
            }
        }

        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }

        let (returned, verdict) = tokio::task::spawn_blocking(move || {
            let verdict = simulation.execute_cycle();
            (simulation, verdict)
        })
        .await?;
        simulation = returned;
        let balanced = verdict?;

        if observer.state() == SimulationState::Stopped {
            break EndReason::Stopped;
        }

        if options.render {
            print_frame(&observer);
        }
        debug!(cycle = observer.current_cycle(), balanced, "Cycle finished");

        if !balanced {
            break EndReason::Unbalanced;
        }
    };

    let summary = RunSummary {
        run_id: observer.run_id(),
        reason,
        state: observer.state(),
        neighborhood: observer.neighborhood(),
        stats: observer.stats(),
    };

    info!(
        event = "run_finished",
        run_id = %summary.run_id,
        reason = %summary.reason,
        cycles = summary.stats.cycles,
        births = summary.stats.births,
        deaths = summary.stats.deaths,
        "Simulation run finished"
    );

    Ok(summary)
}

fn pacing(delay: Duration) -> Option<Interval> {
    if delay.is_zero() {
        return None;
    }
    let mut ticker = interval(delay);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

fn print_frame(observer: &SimulationObserver) {
    let stats = observer.stats();
    println!(
        "Cycle {} | Animals {} | Plants {} | Births {} | Deaths {} | {}",
        stats.cycles,
        observer.animal_count(),
        observer.plant_count(),
        observer.births(),
        observer.deaths(),
        observer.neighborhood()
    );
    print!("{}", observer.render());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosim_core::{SimulationConfig, WorldConfig};
    use ecosim_world::StatsSink;

    fn simulation(seed: u64) -> Simulation {
        let world = WorldConfig {
            seed: Some(seed),
            ..Default::default()
        };
        let mut sim =
            Simulation::new(world, SimulationConfig::default().shared(), StatsSink::in_memory())
                .unwrap();
        sim.initialize().unwrap();
        sim
    }

    fn options(max_cycles: Option<u64>) -> DriverOptions {
        DriverOptions {
            delay: Duration::ZERO,
            max_cycles,
            render: false,
        }
    }

    #[tokio::test]
    async fn test_run_stops_at_max_cycles() {
        let summary = run(simulation(3), options(Some(2))).await.unwrap();

        assert_eq!(summary.reason, EndReason::MaxCycles);
        assert_eq!(summary.stats.cycles, 2);
        assert_eq!(summary.state, SimulationState::Running);
    }

    #[tokio::test]
    async fn test_run_ends_when_unbalanced() {
        // Plants never outlive the default max age
        let summary = run(simulation(3), options(None)).await.unwrap();

        assert_eq!(summary.reason, EndReason::Unbalanced);
        assert_eq!(summary.state, SimulationState::Completed);
        assert!(summary.stats.cycles <= 8);
    }

    #[tokio::test]
    async fn test_stop_request_ends_run() {
        let sim = simulation(3);
        sim.stop_handle().stop();

        let summary = run(sim, options(None)).await.unwrap();

        assert_eq!(summary.reason, EndReason::Stopped);
        assert_eq!(summary.stats.cycles, 0);
    }

    #[tokio::test]
    async fn test_paced_run() {
        let options = DriverOptions {
            delay: Duration::from_millis(20),
            ..options(Some(3))
        };

        let summary = run(simulation(9), options).await.unwrap();

        assert_eq!(summary.stats.cycles, 3);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["reason"], "max_cycles");
        assert_eq!(json["neighborhood"], "von_neumann");
    }
}
