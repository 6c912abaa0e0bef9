//! DetectionArbiter - debounced actuation decisions
//!
//! A new request fires only when the actuator is idle, the class has a
//! target slot and the class differs from the last triggered one. An empty
//! frame while idle clears the debounce memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use contracts::{
    ActuationRequest, DetectionEvent, DetectionSummary, SorterBlueprint, StateEvent, StopSignal,
    WorkerHandle,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::error::ActuationError;
use crate::gate::{ActuationGate, ActuationPermit};

/// Request paired with the permit that keeps the actuator busy
#[derive(Debug)]
pub struct ActuationJob {
    pub request: ActuationRequest,
    pub permit: ActuationPermit,
}

/// Outcome of one detection event
#[derive(Debug)]
pub enum ArbiterDecision {
    /// Nothing to do
    Idle,
    /// Empty frame reset the debounce memory; clear any class hint
    ClearHint,
    /// Detection shown, no actuation
    Surfaced(DetectionSummary),
    /// New actuation accepted
    Triggered {
        detection: DetectionSummary,
        job: ActuationJob,
    },
}

impl ArbiterDecision {
    pub fn is_triggered(&self) -> bool {
        matches!(self, Self::Triggered { .. })
    }
}

/// Accepted triggers per class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationCounts {
    pub per_class: BTreeMap<String, u64>,
    pub total: u64,
}

impl ClassificationCounts {
    fn record(&mut self, class_name: &str) {
        *self.per_class.entry(class_name.to_string()).or_default() += 1;
        self.total += 1;
    }

    pub fn get(&self, class_name: &str) -> u64 {
        self.per_class.get(class_name).copied().unwrap_or(0)
    }
}

/// Turns detection events into at most one in-flight actuation
#[derive(Debug)]
pub struct DetectionArbiter {
    gate: ActuationGate,
    targets: HashMap<usize, i64>,
    counts: Mutex<ClassificationCounts>,
}

impl DetectionArbiter {
    pub fn new(gate: ActuationGate, targets: HashMap<usize, i64>) -> Self {
        Self {
            gate,
            targets,
            counts: Mutex::new(ClassificationCounts::default()),
        }
    }

    pub fn from_blueprint(gate: ActuationGate, blueprint: &SorterBlueprint) -> Self {
        Self::new(gate, blueprint.target_steps_map())
    }

    pub fn gate(&self) -> &ActuationGate {
        &self.gate
    }

    /// Snapshot of accepted trigger counts
    pub fn counts(&self) -> ClassificationCounts {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Decide on one detection event
    ///
    /// The best detection is always surfaced in the decision. A trigger
    /// additionally needs:
    /// 1. the gate idle,
    /// 2. a target slot for the class,
    /// 3. a class different from the last triggered one.
    ///
    /// An empty event clears the last triggered class while idle, so the same
    /// class can trigger again once the item has left the frame.
    pub fn on_detection(&self, event: &DetectionEvent) -> ArbiterDecision {
        let Some(best) = event.best() else {
            let mut state = self.gate.lock();
            if !state.busy && state.last_triggered.is_some() {
                state.last_triggered = None;
                debug!("no detection, arbitration reset");
                return ArbiterDecision::ClearHint;
            }
            return ArbiterDecision::Idle;
        };

        let summary = DetectionSummary::from(best);
        let Some(&target_steps) = self.targets.get(&best.class_index) else {
            return ArbiterDecision::Surfaced(summary);
        };

        let permit = {
            let mut state = self.gate.lock();
            if state.busy || state.last_triggered == Some(best.class_index) {
                return ArbiterDecision::Surfaced(summary);
            }
            state.last_triggered = Some(best.class_index);
            self.gate.acquire(&mut state)
        };

        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(&best.class_name);
        observability::metrics::record_actuation_triggered(&best.class_name);
        info!(
            class = %best.class_name,
            confidence = best.confidence,
            target_steps,
            frame_id = event.frame_id,
            "actuation triggered"
        );

        ArbiterDecision::Triggered {
            detection: summary,
            job: ActuationJob {
                request: ActuationRequest {
                    target_steps,
                    class_index: best.class_index,
                    class_name: best.class_name.clone(),
                },
                permit,
            },
        }
    }
}

/// Feeds detection events through the arbiter into the sequencer queue
pub struct ArbiterWorker {
    arbiter: Arc<DetectionArbiter>,
    detections: mpsc::Receiver<DetectionEvent>,
    jobs: mpsc::Sender<ActuationJob>,
    events: mpsc::Sender<StateEvent>,
}

impl ArbiterWorker {
    pub fn new(
        arbiter: Arc<DetectionArbiter>,
        detections: mpsc::Receiver<DetectionEvent>,
        jobs: mpsc::Sender<ActuationJob>,
        events: mpsc::Sender<StateEvent>,
    ) -> Self {
        Self {
            arbiter,
            detections,
            jobs,
            events,
        }
    }

    pub fn spawn(self, stop: StopSignal) -> WorkerHandle {
        let signal = stop.clone();
        WorkerHandle::spawn("detection_arbiter", stop, self.run(signal))
    }

    async fn run(mut self, stop: StopSignal) {
        loop {
            let event = tokio::select! {
                _ = stop.stopped() => break,
                event = self.detections.recv() => event,
            };
            let Some(event) = event else {
                info!("detection stream closed");
                break;
            };

            if let ArbiterDecision::Triggered { detection, job } = self.arbiter.on_detection(&event)
            {
                if self.events.send(StateEvent::Detection(detection)).await.is_err() {
                    warn!("state aggregator gone, detection update lost");
                }
                if let Err(e) = self.dispatch(job) {
                    error!(error = %e, "actuation request dropped");
                }
            }
        }
        debug!("arbiter worker stopped");
    }

    /// The permit drops with the job on failure, releasing the actuator
    fn dispatch(&self, job: ActuationJob) -> Result<(), ActuationError> {
        match self.jobs.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(job)) | Err(TrySendError::Full(job)) => {
                Err(ActuationError::QueueClosed {
                    class_name: job.request.class_name,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BoundingBox, Detection};
    use proptest::prelude::*;

    const NAMES: [&str; 4] = ["Metal", "Glass", "Plastic", "Carton"];

    fn arbiter() -> DetectionArbiter {
        let targets = HashMap::from([(0, 0), (1, 50), (2, 100), (3, 150)]);
        DetectionArbiter::new(ActuationGate::new(), targets)
    }

    fn event(class_index: Option<usize>) -> DetectionEvent {
        DetectionEvent {
            frame_id: 1,
            timestamp: 0.0,
            detections: class_index
                .map(|class_index| {
                    vec![Detection {
                        bbox: BoundingBox {
                            x1: 0,
                            y1: 0,
                            x2: 10,
                            y2: 10,
                        },
                        confidence: 0.9,
                        class_index,
                        class_name: NAMES.get(class_index).unwrap_or(&"Unknown").to_string(),
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn take_job(decision: ArbiterDecision) -> ActuationJob {
        match decision {
            ArbiterDecision::Triggered { job, .. } => job,
            other => panic!("expected trigger, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_class_triggers_once() {
        let arbiter = arbiter();

        let job = take_job(arbiter.on_detection(&event(Some(2))));
        assert_eq!(job.request.target_steps, 100);
        assert_eq!(job.request.class_name, "Plastic");
        drop(job);

        for _ in 0..10 {
            assert!(matches!(
                arbiter.on_detection(&event(Some(2))),
                ArbiterDecision::Surfaced(_)
            ));
        }
        assert_eq!(arbiter.counts().get("Plastic"), 1);
    }

    #[test]
    fn test_class_change_retriggers() {
        let arbiter = arbiter();
        drop(take_job(arbiter.on_detection(&event(Some(2)))));
        drop(take_job(arbiter.on_detection(&event(Some(1)))));
        drop(take_job(arbiter.on_detection(&event(Some(2)))));
        assert_eq!(arbiter.counts().total, 3);
    }

    #[test]
    fn test_empty_frame_resets_when_idle() {
        let arbiter = arbiter();
        drop(take_job(arbiter.on_detection(&event(Some(2)))));

        assert!(matches!(arbiter.on_detection(&event(None)), ArbiterDecision::ClearHint));
        assert!(matches!(arbiter.on_detection(&event(None)), ArbiterDecision::Idle));
        assert!(arbiter.on_detection(&event(Some(2))).is_triggered());
    }

    #[test]
    fn test_busy_blocks_and_keeps_memory() {
        let arbiter = arbiter();
        let job = take_job(arbiter.on_detection(&event(Some(0))));

        // Busy: no new trigger, empty frames do not reset
        assert!(!arbiter.on_detection(&event(Some(3))).is_triggered());
        assert!(matches!(arbiter.on_detection(&event(None)), ArbiterDecision::Idle));
        assert_eq!(arbiter.gate().last_triggered(), Some(0));

        drop(job);
        assert!(arbiter.on_detection(&event(Some(3))).is_triggered());
    }

    #[test]
    fn test_unmapped_class_is_only_surfaced() {
        let targets = HashMap::from([(0, 0)]);
        let arbiter = DetectionArbiter::new(ActuationGate::new(), targets);
        assert!(matches!(
            arbiter.on_detection(&event(Some(1))),
            ArbiterDecision::Surfaced(_)
        ));
        assert!(!arbiter.gate().is_busy());
    }

    #[test]
    fn test_concurrent_callbacks_single_flight() {
        let arbiter = Arc::new(arbiter());
        let triggered = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let arbiter = arbiter.clone();
                let triggered = triggered.clone();
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for i in 0..200 {
                        let decision = arbiter.on_detection(&event(Some((t + i) % 4)));
                        if let ArbiterDecision::Triggered { job, .. } = decision {
                            triggered.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            held.push(job);
                        }
                    }
                    held.len()
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // Permits are never released, so exactly one trigger can have won
        assert_eq!(total, 1);
        assert_eq!(triggered.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_worker_dispatches_and_publishes() {
        let arbiter = Arc::new(arbiter());
        let (det_tx, det_rx) = mpsc::channel(8);
        let (job_tx, mut job_rx) = mpsc::channel(1);
        let (state_tx, mut state_rx) = mpsc::channel(8);
        let stop = StopSignal::new();
        let handle = ArbiterWorker::new(arbiter.clone(), det_rx, job_tx, state_tx).spawn(stop);

        det_tx.send(event(Some(1))).await.unwrap();
        det_tx.send(event(Some(1))).await.unwrap();

        let job = job_rx.recv().await.unwrap();
        assert_eq!(job.request.class_name, "Glass");
        match state_rx.recv().await.unwrap() {
            StateEvent::Detection(summary) => assert_eq!(summary.class_name, "Glass"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(arbiter.gate().is_busy());
        drop(job);
        assert!(!arbiter.gate().is_busy());

        drop(det_tx);
        handle.join(std::time::Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_closed_queue_releases_permit() {
        let arbiter = Arc::new(arbiter());
        let (det_tx, det_rx) = mpsc::channel(8);
        let (job_tx, job_rx) = mpsc::channel(1);
        let (state_tx, _state_rx) = mpsc::channel(8);
        drop(job_rx);
        let handle =
            ArbiterWorker::new(arbiter.clone(), det_rx, job_tx, state_tx).spawn(StopSignal::new());

        det_tx.send(event(Some(3))).await.unwrap();
        drop(det_tx);
        handle.join(std::time::Duration::from_secs(1)).await;
        assert!(!arbiter.gate().is_busy());
        assert_eq!(arbiter.gate().last_triggered(), Some(3));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Detect(Option<usize>),
        Finish,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => proptest::option::of(0usize..5).prop_map(Op::Detect),
            1 => Just(Op::Finish),
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_request_in_flight(ops in proptest::collection::vec(op(), 1..200)) {
            let arbiter = arbiter();
            let mut in_flight: Vec<ActuationJob> = Vec::new();
            let mut last: Option<usize> = None;

            for op in ops {
                match op {
                    Op::Detect(class) => {
                        let idle = in_flight.is_empty();
                        let decision = arbiter.on_detection(&event(class));
                        let expect_trigger = matches!(class, Some(c) if c < 4 && idle && last != Some(c));
                        prop_assert_eq!(decision.is_triggered(), expect_trigger);

                        match (class, decision) {
                            (_, ArbiterDecision::Triggered { job, .. }) => {
                                last = Some(job.request.class_index);
                                in_flight.push(job);
                            }
                            (None, _) if idle => last = None,
                            _ => {}
                        }
                    }
                    Op::Finish => in_flight.clear(),
                }
                prop_assert!(in_flight.len() <= 1);
                prop_assert_eq!(arbiter.gate().is_busy(), !in_flight.is_empty());
            }
        }
    }
}
