use super::preprocess::LetterboxGeometry;
use super::{Detection, DetectionError, DetectionSettings};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How prediction rows are laid out in the raw model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[1, boxes, 5 + classes]`: xywh, objectness, class scores (YOLOv5).
    Anchors { boxes: usize, stride: usize },
    /// `[1, 4 + classes, boxes]`: xywh, class scores, no objectness (YOLOv8).
    Channels { boxes: usize, channels: usize },
}

impl OutputLayout {
    /// Picks the layout whose box count matches the three detection heads
    /// (strides 8, 16, 32) at `input_size`. YOLOv5 predicts three anchors per
    /// grid cell, YOLOv8 one. Exports with other heads fall back to comparing
    /// the two dimensions.
    pub fn from_shape(shape: &[i64], input_size: u32) -> Result<Self, DetectionError> {
        let (a, b) = match shape {
            [1, a, b] | [a, b] if *a > 0 && *b > 0 => (*a as usize, *b as usize),
            _ => return Err(DetectionError::OutputShape(shape.to_vec())),
        };

        let cells = grid_cells(input_size);
        if b == cells && a >= 5 {
            return Ok(OutputLayout::Channels {
                boxes: b,
                channels: a,
            });
        }
        if a == 3 * cells && b >= 6 {
            return Ok(OutputLayout::Anchors { boxes: a, stride: b });
        }

        match (a, b) {
            (channels, boxes) if channels >= 5 && boxes > channels => Ok(OutputLayout::Channels {
                boxes,
                channels,
            }),
            (boxes, stride) if stride >= 6 => Ok(OutputLayout::Anchors { boxes, stride }),
            _ => Err(DetectionError::OutputShape(shape.to_vec())),
        }
    }

    fn len(&self) -> usize {
        match *self {
            OutputLayout::Anchors { boxes, stride } => boxes * stride,
            OutputLayout::Channels { boxes, channels } => boxes * channels,
        }
    }
}

/// Grid cells summed over the stride 8, 16 and 32 heads.
fn grid_cells(input_size: u32) -> usize {
    [8, 16, 32]
        .iter()
        .map(|stride| (input_size as usize / stride).pow(2))
        .sum()
}

/// Turns raw predictions into boxes in input-canvas coordinates.
pub fn decode(output: &[f32], layout: OutputLayout, confidence_threshold: f32) -> Vec<Detection> {
    let mut detections = Vec::new();

    match layout {
        OutputLayout::Anchors { stride, .. } => {
            for row in output.chunks_exact(stride) {
                let objectness = row[4];
                if objectness < confidence_threshold {
                    continue;
                }
                let Some((class_id, score)) = best_class(row[5..].iter().copied()) else {
                    continue;
                };
                let confidence = objectness * score;
                if confidence < confidence_threshold {
                    continue;
                }
                detections.push(from_xywh(row[0], row[1], row[2], row[3], confidence, class_id));
            }
        }
        OutputLayout::Channels { boxes, channels } => {
            let at = |channel: usize, index: usize| output[channel * boxes + index];
            for index in 0..boxes {
                let Some((class_id, confidence)) =
                    best_class((4..channels).map(|channel| at(channel, index)))
                else {
                    continue;
                };
                if confidence < confidence_threshold {
                    continue;
                }
                detections.push(from_xywh(
                    at(0, index),
                    at(1, index),
                    at(2, index),
                    at(3, index),
                    confidence,
                    class_id,
                ));
            }
        }
    }

    detections
}

fn best_class(scores: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
    scores
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

fn from_xywh(x: f32, y: f32, w: f32, h: f32, confidence: f32, class_id: usize) -> Detection {
    Detection {
        x1: x - w / 2.0,
        y1: y - h / 2.0,
        x2: x + w / 2.0,
        y2: y + h / 2.0,
        confidence,
        class_id,
    }
}

/// Class-aware NMS. Keeps at most `max_detections`, highest confidence first.
pub fn non_max_suppression(
    detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    let mut by_class: BTreeMap<usize, Vec<Detection>> = BTreeMap::new();
    for detection in detections {
        by_class.entry(detection.class_id).or_default().push(detection);
    }

    let mut kept = Vec::new();
    for (_, mut candidates) in by_class {
        candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

        let mut suppressed = vec![false; candidates.len()];
        for i in 0..candidates.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..candidates.len() {
                if !suppressed[j] && candidates[i].iou(&candidates[j]) > iou_threshold {
                    suppressed[j] = true;
                }
            }
            kept.push(candidates[i].clone());
        }
    }

    // Ties keep the lower class id so truncation is deterministic.
    kept.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then(a.class_id.cmp(&b.class_id))
    });
    kept.truncate(max_detections);
    kept
}

/// Maps boxes from the letterboxed canvas back onto the original image, clipped to its bounds.
pub fn scale_to_original(
    detections: Vec<Detection>,
    geometry: &LetterboxGeometry,
    width: u32,
    height: u32,
) -> Vec<Detection> {
    let (max_x, max_y) = (width as f32, height as f32);
    detections
        .into_iter()
        .map(|detection| {
            let (x1, y1) = geometry.restore(detection.x1, detection.y1);
            let (x2, y2) = geometry.restore(detection.x2, detection.y2);
            Detection {
                x1: x1.clamp(0.0, max_x),
                y1: y1.clamp(0.0, max_y),
                x2: x2.clamp(0.0, max_x),
                y2: y2.clamp(0.0, max_y),
                ..detection
            }
        })
        .filter(|detection| detection.area() > 0.0)
        .collect()
}

pub fn postprocess(
    output: &[f32],
    shape: &[i64],
    geometry: &LetterboxGeometry,
    (width, height): (u32, u32),
    settings: &DetectionSettings,
) -> Result<Vec<Detection>, DetectionError> {
    let layout = OutputLayout::from_shape(shape, settings.input_size)?;
    if output.len() != layout.len() {
        return Err(DetectionError::OutputShape(shape.to_vec()));
    }

    let candidates = decode(output, layout, settings.confidence_threshold);
    let kept = non_max_suppression(candidates, settings.iou_threshold, settings.max_detections);
    Ok(scale_to_original(kept, geometry, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: DetectionSettings = DetectionSettings {
        input_size: 64,
        confidence_threshold: 0.25,
        iou_threshold: 0.45,
        max_detections: 1000,
    };

    const IDENTITY: LetterboxGeometry = LetterboxGeometry {
        gain: 1.0,
        pad_x: 0.0,
        pad_y: 0.0,
    };

    fn detection(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: usize) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    #[test]
    fn layout_is_detected_from_shape() {
        assert_eq!(
            OutputLayout::from_shape(&[1, 25200, 85], 640).unwrap(),
            OutputLayout::Anchors { boxes: 25200, stride: 85 }
        );
        assert_eq!(
            OutputLayout::from_shape(&[1, 84, 8400], 640).unwrap(),
            OutputLayout::Channels { boxes: 8400, channels: 84 }
        );
        assert!(OutputLayout::from_shape(&[1, 3, 640, 640], 640).is_err());
        assert!(OutputLayout::from_shape(&[2, 4], 640).is_err());
    }

    #[test]
    fn small_inputs_use_the_expected_box_count() {
        // 64px: 8x8 + 4x4 + 2x2 = 84 cells, square v8 output.
        assert_eq!(
            OutputLayout::from_shape(&[1, 84, 84], 64).unwrap(),
            OutputLayout::Channels { boxes: 84, channels: 84 }
        );
        // 32px: 3 anchors x (16 + 4 + 1) cells, fewer boxes than the v5 row stride.
        assert_eq!(
            OutputLayout::from_shape(&[1, 63, 85], 32).unwrap(),
            OutputLayout::Anchors { boxes: 63, stride: 85 }
        );
        assert_eq!(
            OutputLayout::from_shape(&[1, 85, 21], 32).unwrap(),
            OutputLayout::Channels { boxes: 21, channels: 85 }
        );
    }

    #[test]
    fn anchor_rows_multiply_objectness_and_class_score() {
        // xywh, obj, class0, class1
        let output = [
            32.0, 32.0, 20.0, 10.0, 0.9, 0.1, 0.8, // kept: 0.72 for class 1
            10.0, 10.0, 4.0, 4.0, 0.2, 0.9, 0.1, // objectness below threshold
            10.0, 10.0, 4.0, 4.0, 0.5, 0.4, 0.3, // 0.2 after multiplying
        ];
        let layout = OutputLayout::Anchors { boxes: 3, stride: 7 };
        let detections = decode(&output, layout, 0.25);

        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.class_id, 1);
        assert!((d.confidence - 0.72).abs() < 1e-6);
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (22.0, 27.0, 42.0, 37.0));
    }

    #[test]
    fn channel_major_output_has_no_objectness() {
        // 2 boxes, 4 + 2 channels, laid out channel by channel.
        let output = [
            10.0, 40.0, // x
            10.0, 40.0, // y
            4.0, 8.0, // w
            4.0, 8.0, // h
            0.1, 0.6, // class 0
            0.2, 0.3, // class 1
        ];
        let layout = OutputLayout::Channels { boxes: 2, channels: 6 };
        let detections = decode(&output, layout, 0.25);

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 0);
        assert_eq!(detections[0].x1, 36.0);
        assert_eq!(detections[0].confidence, 0.6);
    }

    #[test]
    fn nms_suppresses_overlaps_within_a_class_only() {
        let detections = vec![
            detection(0.0, 0.0, 10.0, 10.0, 0.8, 0),
            detection(1.0, 1.0, 11.0, 11.0, 0.9, 0),
            detection(1.0, 1.0, 11.0, 11.0, 0.7, 1),
            detection(50.0, 50.0, 60.0, 60.0, 0.3, 0),
        ];
        let kept = non_max_suppression(detections, 0.45, 1000);

        let summary: Vec<(usize, f32)> = kept.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(summary, vec![(0, 0.9), (1, 0.7), (0, 0.3)]);
    }

    #[test]
    fn nms_breaks_confidence_ties_by_class_id() {
        for _ in 0..8 {
            let detections = vec![
                detection(0.0, 0.0, 10.0, 10.0, 0.5, 5),
                detection(20.0, 20.0, 30.0, 30.0, 0.5, 2),
                detection(40.0, 40.0, 50.0, 50.0, 0.5, 9),
            ];
            let kept = non_max_suppression(detections, 0.45, 1);
            assert_eq!(kept.len(), 1);
            assert_eq!(kept[0].class_id, 2);
        }
    }

    #[test]
    fn nms_caps_the_number_of_boxes() {
        let detections = (0..10)
            .map(|i| detection(i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0, 0.5 + i as f32 * 0.01, 0))
            .collect();
        let kept = non_max_suppression(detections, 0.45, 3);
        assert_eq!(kept.len(), 3);
        assert!((kept[0].confidence - 0.59).abs() < 1e-6);
    }

    #[test]
    fn boxes_are_restored_and_clipped() {
        let geometry = LetterboxGeometry {
            gain: 0.5,
            pad_x: 0.0,
            pad_y: 8.0,
        };
        let detections = vec![
            detection(-4.0, 8.0, 20.0, 28.0, 0.9, 0),
            detection(0.0, 0.0, 10.0, 4.0, 0.9, 0), // entirely inside the padding
        ];
        let scaled = scale_to_original(detections, &geometry, 40, 30);

        assert_eq!(scaled.len(), 1);
        assert_eq!((scaled[0].x1, scaled[0].y1, scaled[0].x2, scaled[0].y2), (0.0, 0.0, 40.0, 30.0));
    }

    #[test]
    fn postprocess_rejects_mismatched_buffers() {
        let err = postprocess(&[0.0; 10], &[1, 2, 7], &IDENTITY, (64, 64), &SETTINGS).unwrap_err();
        assert!(matches!(err, DetectionError::OutputShape(_)));
    }

    #[test]
    fn postprocess_runs_the_whole_chain() {
        let output = [
            32.0, 32.0, 20.0, 20.0, 0.9, 0.9, // strong box
            33.0, 33.0, 20.0, 20.0, 0.8, 0.9, // duplicate of the first
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, // empty anchor
        ];
        let detections = postprocess(&output, &[1, 3, 6], &IDENTITY, (64, 64), &SETTINGS).unwrap();
        assert_eq!(detections.len(), 1);
        assert!((detections[0].confidence - 0.81).abs() < 1e-6);
    }
}
