//! Periodic fill-level polling

use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{PeriodicTask, StateEvent, TickOutcome};
use embedded_hal::delay::DelayNs;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::monitor::LevelMonitor;

/// Back-off after a panicked measurement round
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Runs `measure_all` on the blocking pool and publishes the result
pub struct LevelMonitorTask<D> {
    monitor: Arc<Mutex<LevelMonitor<D>>>,
    events: mpsc::Sender<StateEvent>,
    period: Duration,
}

impl<D: DelayNs + Send + 'static> LevelMonitorTask<D> {
    pub fn new(monitor: LevelMonitor<D>, events: mpsc::Sender<StateEvent>, period: Duration) -> Self {
        Self {
            monitor: Arc::new(Mutex::new(monitor)),
            events,
            period,
        }
    }

    /// Shared access to the monitor (e.g. for temperature updates)
    pub fn monitor(&self) -> Arc<Mutex<LevelMonitor<D>>> {
        self.monitor.clone()
    }
}

impl<D: DelayNs + Send + 'static> PeriodicTask for LevelMonitorTask<D> {
    fn name(&self) -> &str {
        "level_monitor"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn tick(&mut self) -> TickOutcome {
        let monitor = self.monitor.clone();
        let measured = tokio::task::spawn_blocking(move || {
            monitor
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .measure_all()
        })
        .await;

        let levels = match measured {
            Ok(levels) => levels,
            Err(e) => {
                error!(error = %e, "level measurement panicked");
                return TickOutcome::Delay(ERROR_BACKOFF);
            }
        };

        debug!(compartments = levels.len(), "fill levels measured");
        if self.events.send(StateEvent::FillLevels(levels)).await.is_err() {
            info!("state aggregator gone, level monitor exiting");
            return TickOutcome::Stop;
        }
        TickOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SimulatedRangeSensor;
    use crate::monitor::MonitorSettings;
    use contracts::{spawn_periodic, RangeSensor, StopSignal, WorkerExit};

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn task(events: mpsc::Sender<StateEvent>) -> LevelMonitorTask<NoDelay> {
        let sensors: Vec<Box<dyn RangeSensor>> = vec![
            Box::new(SimulatedRangeSensor::new("Metal", 10.0)),
            Box::new(SimulatedRangeSensor::new("Glass", 50.0)),
        ];
        let settings = MonitorSettings {
            bin_depth_cm: 50.0,
            sound_speed_cm_s: 34_300.0,
            temperature_compensation: false,
            temperature_c: 20.0,
            readings_per_measurement: 3,
            read_retries: 1,
            measurement_timeout: Duration::from_millis(500),
            stabilization: Duration::ZERO,
        };
        LevelMonitorTask::new(
            LevelMonitor::new(sensors, settings, NoDelay),
            events,
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_tick_publishes_levels() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut task = task(tx);

        assert_eq!(task.tick().await, TickOutcome::Continue);
        match rx.recv().await.unwrap() {
            StateEvent::FillLevels(levels) => {
                assert_eq!(levels.len(), 2);
                assert_eq!(levels[0].percentage, Some(80.0));
                assert_eq!(levels[1].percentage, Some(0.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stops_when_aggregator_gone() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let handle = spawn_periodic(task(tx), StopSignal::new());
        assert_eq!(handle.join(Duration::from_secs(1)).await, WorkerExit::Completed);
    }
}
