//! Stand-in classifiers
//!
//! `ScriptedClassifier` replays a fixed script for tests; `SimulatedClassifier`
//! emits a deterministic stream of detections for running without a model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use contracts::{Classifier, ContractError, Frame, RawDetection};

#[derive(Debug, Clone)]
enum Step {
    Detect(Vec<RawDetection>),
    Fail(String),
    Panic,
}

/// Classifier replaying queued results, then a fallback
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    steps: Mutex<VecDeque<Step>>,
    fallback: Vec<RawDetection>,
    calls: AtomicU64,
}

impl ScriptedClassifier {
    /// Empty script: every call returns no detections
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `detections` on every call
    pub fn repeating(detections: Vec<RawDetection>) -> Self {
        Self {
            fallback: detections,
            ..Self::default()
        }
    }

    pub fn then_detect(self, detections: Vec<RawDetection>) -> Self {
        self.push(Step::Detect(detections))
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Step::Fail(message.into()))
    }

    pub fn then_panic(self) -> Self {
        self.push(Step::Panic)
    }

    /// Number of `classify` calls so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(self, step: Step) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(step);
        self
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    fn classify(&self, frame: &Frame) -> Result<Vec<RawDetection>, ContractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();

        match step {
            Some(Step::Detect(detections)) => Ok(detections),
            Some(Step::Fail(message)) => Err(ContractError::classifier(frame.frame_id, message)),
            Some(Step::Panic) => panic!("scripted classifier panic on frame {}", frame.frame_id),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Deterministic detection stream
///
/// Every `every`-th frame carries one centered detection, cycling through
/// `classes` class indices; all other frames are empty.
#[derive(Debug, Clone)]
pub struct SimulatedClassifier {
    classes: usize,
    every: u64,
    confidence: f32,
}

impl SimulatedClassifier {
    pub fn new(classes: usize, every: u64, confidence: f32) -> Self {
        Self {
            classes: classes.max(1),
            every: every.max(1),
            confidence,
        }
    }
}

impl Classifier for SimulatedClassifier {
    fn name(&self) -> &str {
        "simulated"
    }

    fn classify(&self, frame: &Frame) -> Result<Vec<RawDetection>, ContractError> {
        if frame.frame_id == 0 || frame.frame_id % self.every != 0 {
            return Ok(Vec::new());
        }

        let class_index = (frame.frame_id / self.every) as usize % self.classes;
        let (w, h) = (frame.width as f32, frame.height as f32);
        Ok(vec![RawDetection {
            xyxy: [w * 0.25, h * 0.25, w * 0.75, h * 0.75],
            confidence: self.confidence,
            class_index: class_index as i64,
        }])
    }
}
