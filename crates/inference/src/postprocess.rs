//! Detection post-processing
//!
//! Pure functions applied to raw classifier output: confidence filter, class
//! range check, box clamping and ranking.

use contracts::{BoundingBox, Detection, Frame, RawDetection};

/// Turn raw classifier output into ranked detections
///
/// Keeps detections with `confidence >= min_confidence` and a class index
/// inside `class_names`, clamps boxes to the frame, and sorts by descending
/// confidence (stable for ties).
pub fn postprocess(
    raw: &[RawDetection],
    frame: &Frame,
    class_names: &[String],
    min_confidence: f32,
) -> Vec<Detection> {
    let mut detections: Vec<Detection> = raw
        .iter()
        .filter(|r| r.confidence >= min_confidence)
        .filter_map(|r| {
            let class_index = usize::try_from(r.class_index).ok()?;
            let class_name = class_names.get(class_index)?;
            Some(Detection {
                bbox: BoundingBox::clamped(r.xyxy, frame.width, frame.height),
                confidence: r.confidence,
                class_index,
                class_name: class_name.clone(),
            })
        })
        .collect();

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}

/// Every `(skip + 1)`-th frame passes
#[derive(Debug, Clone)]
pub struct FrameSkipper {
    skip: u32,
    counter: u64,
}

impl FrameSkipper {
    pub fn new(skip: u32) -> Self {
        Self { skip, counter: 0 }
    }

    /// Count a frame; `true` if it should be classified
    pub fn should_process(&mut self) -> bool {
        self.counter += 1;
        self.counter % (u64::from(self.skip) + 1) == 0
    }

    /// Frames counted so far
    pub fn counted(&self) -> u64 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classes() -> Vec<String> {
        ["Metal", "Glass", "Plastic", "Carton"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn raw(conf: f32, class_index: i64) -> RawDetection {
        RawDetection {
            xyxy: [10.0, 10.0, 50.0, 50.0],
            confidence: conf,
            class_index,
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let frame = Frame::blank(0, 0.0, 64, 64);
        let out = postprocess(&[raw(0.5, 0), raw(0.49, 1)], &frame, &classes(), 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_name, "Metal");
    }

    #[test]
    fn test_out_of_range_classes_rejected() {
        let frame = Frame::blank(0, 0.0, 64, 64);
        let out = postprocess(&[raw(0.9, 4), raw(0.9, -1), raw(0.8, 3)], &frame, &classes(), 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_index, 3);
    }

    #[test]
    fn test_sorted_by_descending_confidence() {
        let frame = Frame::blank(0, 0.0, 64, 64);
        let out = postprocess(
            &[raw(0.6, 0), raw(0.95, 2), raw(0.7, 1)],
            &frame,
            &classes(),
            0.5,
        );
        let order: Vec<usize> = out.iter().map(|d| d.class_index).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_boxes_clamped_to_frame() {
        let frame = Frame::blank(0, 0.0, 32, 24);
        let r = RawDetection {
            xyxy: [-5.0, -1.0, 100.0, 30.0],
            confidence: 0.9,
            class_index: 0,
        };
        let out = postprocess(&[r], &frame, &classes(), 0.5);
        assert_eq!(
            out[0].bbox,
            BoundingBox {
                x1: 0,
                y1: 0,
                x2: 31,
                y2: 23
            }
        );
    }

    #[test]
    fn test_skipper_every_other_frame() {
        let mut skipper = FrameSkipper::new(1);
        let picks: Vec<bool> = (0..6).map(|_| skipper.should_process()).collect();
        assert_eq!(picks, vec![false, true, false, true, false, true]);
        assert_eq!(skipper.counted(), 6);
    }

    #[test]
    fn test_skipper_zero_processes_all() {
        let mut skipper = FrameSkipper::new(0);
        assert!((0..5).all(|_| skipper.should_process()));
    }

    proptest! {
        #[test]
        fn postprocess_output_is_valid(
            dets in proptest::collection::vec(
                (
                    -100.0f32..800.0, -100.0f32..600.0, -100.0f32..800.0, -100.0f32..600.0,
                    0.0f32..=1.0, -2i64..6,
                ),
                0..20,
            ),
            threshold in 0.0f32..=1.0,
        ) {
            let frame = Frame::blank(0, 0.0, 640, 480);
            let raw: Vec<RawDetection> = dets
                .iter()
                .map(|&(x1, y1, x2, y2, confidence, class_index)| RawDetection {
                    xyxy: [x1, y1, x2, y2],
                    confidence,
                    class_index,
                })
                .collect();

            let out = postprocess(&raw, &frame, &classes(), threshold);

            for d in &out {
                prop_assert!(d.confidence >= threshold);
                prop_assert!(d.class_index < 4);
                prop_assert!((0..640).contains(&d.bbox.x1) && (0..640).contains(&d.bbox.x2));
                prop_assert!((0..480).contains(&d.bbox.y1) && (0..480).contains(&d.bbox.y2));
            }
            for pair in out.windows(2) {
                prop_assert!(pair[0].confidence >= pair[1].confidence);
            }
        }
    }
}
