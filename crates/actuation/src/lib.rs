//! # Actuation
//!
//! Detection arbitration and the sorting motor.
//!
//! Responsibilities:
//! - Debounce detections into at most one in-flight actuation request
//! - Drive the stepper through a ramped move, dwell and return-home sequence
//! - Release the actuator unconditionally when a sequence ends
//!
//! ## Usage Example
//!
//! ```ignore
//! let gate = ActuationGate::new();
//! let arbiter = Arc::new(DetectionArbiter::from_blueprint(gate, &blueprint));
//! let (job_tx, job_rx) = mpsc::channel(1);
//!
//! let motor = StepperMotor::from_config(driver, ThreadDelay, &blueprint.actuator)?;
//! let sequencer = ActuatorSequencer::new(motor, (&blueprint.actuator).into());
//! let sequencer_handle = SequencerWorker::new(sequencer, job_rx)
//!     .with_status(state_tx.clone())
//!     .spawn(stop.clone());
//! let arbiter_handle = ArbiterWorker::new(arbiter, detection_rx, job_tx, state_tx).spawn(stop.clone());
//! ```

mod arbiter;
mod error;
mod gate;
mod gpio;
mod mock;
mod motor;
mod ramp;
mod sequencer;

pub use arbiter::{ActuationJob, ArbiterDecision, ArbiterWorker, ClassificationCounts, DetectionArbiter};
pub use error::{ActuationError, Result};
pub use gate::{ActuationGate, ActuationPermit};
pub use gpio::GpioStepperDriver;
pub use mock::{DriverLog, RecordingDelay, SimulatedStepperDriver};
pub use motor::StepperMotor;
pub use ramp::RampProfile;
pub use sequencer::{
    ActuationStats, ActuatorSequencer, PhaseHandle, SequenceOutcome, SequenceSettings,
    SequencerPhase, SequencerWorker,
};
