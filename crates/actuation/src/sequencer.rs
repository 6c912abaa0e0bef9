//! ActuatorSequencer - move, dwell, return home
//!
//! Each accepted job runs the full sort sequence on the blocking pool. The
//! job's permit is dropped after the sequence ends whatever the outcome, and
//! during unwinding if the sequence panics.
//!
//! A sequence that leaves the gate away from home (recovery failed, or the
//! sequence panicked) is reported as an `error` system status when the worker
//! was given a state channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use contracts::{
    ActuationRequest, ActuatorConfig, ContractError, StateEvent, StepperDriver, StopSignal,
    SystemStatus, WorkerHandle,
};
use embedded_hal::delay::DelayNs;
use observability::{RunningStats, StatsSummary};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::arbiter::ActuationJob;
use crate::motor::StepperMotor;

/// Where the sequencer is in a sort cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerPhase {
    #[default]
    Idle,
    MovingToTarget,
    Dwell,
    ReturningHome,
    ErrorRecovery,
}

/// How a sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    Completed,
    /// Failed, but the motor made it back home
    Recovered,
    /// Failed and the home move failed too
    Unrecovered,
}

impl SequenceOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Completed
    }
}

/// Sequence timing
#[derive(Debug, Clone, Copy)]
pub struct SequenceSettings {
    pub home_steps: i64,
    pub drop_delay: Duration,
    pub return_pause: Duration,
}

impl From<&ActuatorConfig> for SequenceSettings {
    fn from(config: &ActuatorConfig) -> Self {
        Self {
            home_steps: config.home_position_steps,
            drop_delay: Duration::from_secs_f64(config.drop_delay_s),
            return_pause: Duration::from_secs_f64(config.return_pause_s),
        }
    }
}

/// Read-only view of the current phase
#[derive(Debug, Clone, Default)]
pub struct PhaseHandle {
    phase: Arc<Mutex<SequencerPhase>>,
}

impl PhaseHandle {
    pub fn get(&self) -> SequencerPhase {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, phase: SequencerPhase) {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = phase;
    }
}

/// Owns the motor and runs sort sequences
pub struct ActuatorSequencer<D, T> {
    motor: StepperMotor<D, T>,
    settings: SequenceSettings,
    phase: PhaseHandle,
}

impl<D: StepperDriver, T: DelayNs> ActuatorSequencer<D, T> {
    pub fn new(motor: StepperMotor<D, T>, settings: SequenceSettings) -> Self {
        Self {
            motor,
            settings,
            phase: PhaseHandle::default(),
        }
    }

    pub fn phase(&self) -> PhaseHandle {
        self.phase.clone()
    }

    pub fn motor(&self) -> &StepperMotor<D, T> {
        &self.motor
    }

    /// Run one job; the permit is released when this returns
    pub fn execute(&mut self, job: ActuationJob) -> SequenceOutcome {
        let ActuationJob { request, permit } = job;
        let outcome = self.run(&request);
        drop(permit);
        outcome
    }

    /// Full sequence with best-effort recovery
    #[instrument(
        name = "sort_sequence",
        skip(self, request),
        fields(class = %request.class_name, target = request.target_steps)
    )]
    pub fn run(&mut self, request: &ActuationRequest) -> SequenceOutcome {
        info!("sort sequence started");
        let outcome = match self.try_sequence(request) {
            Ok(()) => {
                info!("sort sequence completed");
                SequenceOutcome::Completed
            }
            Err(e) => {
                error!(phase = ?self.phase.get(), error = %e, "sort sequence failed");
                self.recover()
            }
        };
        self.phase.set(SequencerPhase::Idle);
        outcome
    }

    /// Disable the driver outputs
    pub fn shutdown(&mut self) -> Result<(), ContractError> {
        self.motor.disable()
    }

    fn try_sequence(&mut self, request: &ActuationRequest) -> Result<(), ContractError> {
        let home = self.settings.home_steps;

        self.phase.set(SequencerPhase::MovingToTarget);
        self.motor.move_to(request.target_steps)?;

        self.phase.set(SequencerPhase::Dwell);
        debug!(seconds = self.settings.drop_delay.as_secs_f64(), "waiting for item to drop");
        self.motor.dwell(self.settings.drop_delay);

        if request.target_steps != home {
            self.phase.set(SequencerPhase::ReturningHome);
            self.motor.move_to(home)?;
            self.motor.dwell(self.settings.return_pause);
        } else {
            debug!("target is home, no return move");
        }
        Ok(())
    }

    fn recover(&mut self) -> SequenceOutcome {
        self.phase.set(SequencerPhase::ErrorRecovery);
        warn!(home = self.settings.home_steps, "attempting return to home");
        match self.motor.move_to(self.settings.home_steps) {
            Ok(()) => SequenceOutcome::Recovered,
            Err(e) => {
                error!(error = %e, "return to home failed");
                SequenceOutcome::Unrecovered
            }
        }
    }
}

/// Sequencer counters
#[derive(Debug, Default)]
pub struct ActuationStats {
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    duration_ms: Mutex<RunningStats>,
}

impl ActuationStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Failed sequences, including panicked ones
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    pub fn duration(&self) -> StatsSummary {
        let stats = self
            .duration_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        StatsSummary::from(&*stats)
    }

    fn record(&self, success: bool, duration_ms: f64) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.duration_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration_ms);
        observability::metrics::record_actuation_completed(success, duration_ms);
    }
}

/// Consumes jobs and runs each sequence on the blocking pool
pub struct SequencerWorker<D, T> {
    sequencer: Arc<Mutex<ActuatorSequencer<D, T>>>,
    jobs: mpsc::Receiver<ActuationJob>,
    stats: Arc<ActuationStats>,
    status: Option<mpsc::Sender<StateEvent>>,
}

impl<D, T> SequencerWorker<D, T>
where
    D: StepperDriver + 'static,
    T: DelayNs + Send + 'static,
{
    pub fn new(sequencer: ActuatorSequencer<D, T>, jobs: mpsc::Receiver<ActuationJob>) -> Self {
        Self {
            sequencer: Arc::new(Mutex::new(sequencer)),
            jobs,
            stats: Arc::new(ActuationStats::default()),
            status: None,
        }
    }

    /// Publish an `error` status when the gate is left away from home
    pub fn with_status(mut self, events: mpsc::Sender<StateEvent>) -> Self {
        self.status = Some(events);
        self
    }

    pub fn stats(&self) -> Arc<ActuationStats> {
        self.stats.clone()
    }

    pub fn spawn(self, stop: StopSignal) -> WorkerHandle {
        let signal = stop.clone();
        WorkerHandle::spawn("actuator_sequencer", stop, self.run(signal))
    }

    async fn run(mut self, stop: StopSignal) {
        loop {
            let job = tokio::select! {
                _ = stop.stopped() => break,
                job = self.jobs.recv() => job,
            };
            let Some(job) = job else {
                break;
            };

            let class_name = job.request.class_name.clone();
            let sequencer = self.sequencer.clone();
            let started = Instant::now();
            let result = tokio::task::spawn_blocking(move || {
                let mut sequencer = sequencer
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                sequencer.execute(job)
            })
            .await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(outcome) => {
                    self.stats.record(outcome.is_success(), duration_ms);
                    if outcome == SequenceOutcome::Unrecovered {
                        self.report_fault("actuator failed to return home").await;
                    }
                }
                Err(e) => {
                    error!(class = %class_name, error = %e, "sort sequence panicked");
                    self.stats.panicked.fetch_add(1, Ordering::Relaxed);
                    self.stats.record(false, duration_ms);
                    self.report_fault("sort sequence panicked, gate position unknown")
                        .await;
                }
            }
        }

        let sequencer = self.sequencer.clone();
        let disabled = tokio::task::spawn_blocking(move || {
            sequencer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .shutdown()
        })
        .await;
        match disabled {
            Ok(Ok(())) => info!("actuator sequencer stopped, driver disabled"),
            Ok(Err(e)) => error!(error = %e, "failed to disable motor driver"),
            Err(e) => error!(error = %e, "driver shutdown panicked"),
        }
    }

    async fn report_fault(&self, message: &str) {
        let Some(events) = &self.status else {
            return;
        };
        if events
            .send(StateEvent::Status(SystemStatus::error(message)))
            .await
            .is_err()
        {
            warn!("state aggregator gone, actuator fault not published");
        }
    }
}
