//! Detection - InferenceWorker output / DetectionArbiter input

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates (x1, y1) .. (x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Round a float xyxy box and clamp it into a `width` x `height` frame
    pub fn clamped(xyxy: [f32; 4], width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1) as i32;
        let max_y = height.saturating_sub(1) as i32;
        let clamp = |v: f32, max: i32| (v.round() as i32).clamp(0, max);
        Self {
            x1: clamp(xyxy[0], max_x),
            y1: clamp(xyxy[1], max_y),
            x2: clamp(xyxy[2], max_x),
            y2: clamp(xyxy[3], max_y),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// Unfiltered classifier output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Box as (x1, y1, x2, y2), may fall outside the frame
    pub xyxy: [f32; 4],

    /// Score in [0, 1]
    pub confidence: f32,

    /// Model class index, not yet range-checked
    pub class_index: i64,
}

/// Validated detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box clamped to frame bounds
    pub bbox: BoundingBox,

    /// Score in [0, 1]
    pub confidence: f32,

    /// Index into the configured class list
    pub class_index: usize,

    /// Class display name
    pub class_name: String,
}

/// Result of one inference cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Source frame
    pub frame_id: u64,

    /// Source frame timestamp (unix seconds)
    pub timestamp: f64,

    /// Detections sorted by descending confidence
    pub detections: Vec<Detection>,
}

impl DetectionEvent {
    /// Highest-confidence detection, if any
    pub fn best(&self) -> Option<&Detection> {
        self.detections.first()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Request to sort one item into a slot
///
/// Created by the arbiter and consumed exactly once by the sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationRequest {
    /// Target motor position in steps
    pub target_steps: i64,

    /// Class that triggered the request
    pub class_index: usize,

    /// Class display name
    pub class_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_box_stays_inside_frame() {
        let bbox = BoundingBox::clamped([-12.4, 5.6, 700.0, 479.9], 640, 480);
        assert_eq!(
            bbox,
            BoundingBox {
                x1: 0,
                y1: 6,
                x2: 639,
                y2: 479
            }
        );
        assert_eq!(bbox.width(), 639);
    }

    #[test]
    fn best_is_first_detection() {
        let event = DetectionEvent {
            frame_id: 3,
            timestamp: 0.0,
            detections: vec![
                Detection {
                    bbox: BoundingBox::default(),
                    confidence: 0.9,
                    class_index: 2,
                    class_name: "Plastic".into(),
                },
                Detection {
                    bbox: BoundingBox::default(),
                    confidence: 0.6,
                    class_index: 0,
                    class_name: "Metal".into(),
                },
            ],
        };
        assert_eq!(event.best().map(|d| d.class_index), Some(2));
        assert!(DetectionEvent::default().best().is_none());
    }
}
