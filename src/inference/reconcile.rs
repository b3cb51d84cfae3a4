//! Translating model output back into per-instance detections.

use std::collections::BTreeMap;

use super::controller::InferenceResult;
use super::error::ModelError;
use super::request::InferenceRequest;
use super::task::{FrameInferenceOutput, InferenceOutput};
use crate::model::{Detection, FrameId, InstanceId};
use crate::state::{InstanceRegistry, InstanceUpdate};

/// Check that every array of a frame result has one row per mask.
pub fn check_frame_output(frame: &FrameInferenceOutput) -> Result<(), ModelError> {
    let rows = frame.instance_ids.len();
    let (masks, _, _) = frame.masks.dim();
    let (boxes, box_cols) = frame.boxes.dim();
    if masks != rows || boxes != rows || frame.scores.len() != rows {
        return Err(ModelError::malformed(format!(
            "frame {}: {} object ids, {} masks, {} boxes, {} scores",
            frame.frame_index,
            rows,
            masks,
            boxes,
            frame.scores.len()
        )));
    }
    if box_cols != 4 {
        return Err(ModelError::malformed(format!(
            "frame {}: boxes have {} columns, expected 4",
            frame.frame_index, box_cols
        )));
    }
    Ok(())
}

/// Group the rows of `output` into one detection per (instance, frame).
///
/// Rows whose object number or frame index is not in the request's mappings
/// are skipped. When several rows land on the same (instance, frame), the
/// last one wins. Misaligned arrays in any frame fail the whole output.
pub fn reconcile(
    request: &InferenceRequest,
    output: &InferenceOutput,
) -> Result<BTreeMap<InstanceId, BTreeMap<FrameId, Detection>>, ModelError> {
    for frame in output.frames.values() {
        check_frame_output(frame)?;
    }

    let mut grouped: BTreeMap<InstanceId, BTreeMap<FrameId, Detection>> = BTreeMap::new();

    for (frame_index, frame) in &output.frames {
        let Some(&frame_id) = request.frame_mapping.get(frame_index) else {
            log::warn!(
                "{}: result for unmapped frame index {}",
                request.request_id,
                frame_index
            );
            continue;
        };

        for (row, &numeric_id) in frame.instance_ids.iter().enumerate() {
            let Some(&instance_id) = request.instance_mapping.get(&numeric_id) else {
                log::debug!(
                    "{}: no instance for object {}",
                    request.request_id,
                    numeric_id
                );
                continue;
            };

            let bbox = frame.boxes.row(row);
            let detection = Detection::new(
                frame_id,
                (bbox[0], bbox[1]),
                (bbox[2], bbox[3]),
                Some(frame.masks.index_axis(ndarray::Axis(0), row).to_owned()),
            );

            if grouped
                .entry(instance_id)
                .or_default()
                .insert(frame_id, detection)
                .is_some()
            {
                log::warn!(
                    "{}: several results for instance {} on frame {}, keeping the last",
                    request.request_id,
                    instance_id,
                    frame_id
                );
            }
        }
    }

    Ok(grouped)
}

/// Fold a finished inference into the registry.
///
/// A failed run, or output whose arrays do not line up, leaves the registry
/// untouched and hands the error back.
/// Otherwise every touched instance gets its detections replaced, and the
/// ids of the updated instances are returned.
pub fn apply_inference_result(
    registry: &mut InstanceRegistry,
    result: &InferenceResult,
) -> Result<Vec<InstanceId>, ModelError> {
    let output = match &result.output {
        Ok(output) => output,
        Err(e) => {
            log::error!("Inference {} failed: {}", result.request.request_id, e);
            return Err(e.clone());
        }
    };

    let grouped = match reconcile(&result.request, output) {
        Ok(grouped) => grouped,
        Err(e) => {
            log::error!("Inference {} failed: {}", result.request.request_id, e);
            return Err(e);
        }
    };

    for frame in output.frames.values() {
        if let Some(message) = &frame.message {
            log::info!(
                "{}: frame {}: {}",
                result.request.request_id,
                frame.frame_index,
                message
            );
        }
    }

    let mut updated = Vec::new();
    for (instance_id, detections) in grouped {
        match registry.update(instance_id, InstanceUpdate::new().detections(detections)) {
            Ok(_) => updated.push(instance_id),
            Err(e) => log::warn!(
                "{}: dropping detections: {}",
                result.request.request_id,
                e
            ),
        }
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Cud, InstanceEvent};
    use crate::inference::task::{
        FrameInferenceOutput, InferenceInput, MaskOutputOptions, PvsTask,
    };
    use ndarray::{Array1, Array2, Array3};
    use std::path::PathBuf;

    fn request(instances: &[InstanceId]) -> InferenceRequest {
        InferenceRequest {
            request_id: "pvs_image:0".into(),
            frame_mapping: BTreeMap::from([(0, FrameId(4))]),
            instance_mapping: instances
                .iter()
                .enumerate()
                .map(|(n, &id)| (n as u32, id))
                .collect(),
            input: InferenceInput {
                task: PvsTask {
                    frame_prompts: Vec::new(),
                    video_options: None,
                    output_options: MaskOutputOptions::default(),
                },
                frame_paths: vec![PathBuf::from("frame.png")],
            },
        }
    }

    /// One row per entry of `ids`, row `i` a single pixel at `(i, i)`.
    fn output(ids: &[u32]) -> InferenceOutput {
        let n = ids.len();
        let masks = Array3::from_shape_fn((n, 6, 6), |(i, y, x)| x == i && y == i);
        let boxes = Array2::from_shape_fn((n, 4), |(i, _)| i as i32);
        InferenceOutput::single(FrameInferenceOutput {
            frame_index: 0,
            masks,
            scores: Array1::from_elem(n, 0.5),
            boxes,
            instance_ids: Array1::from(ids.to_vec()),
            message: None,
        })
    }

    #[test]
    fn test_rows_map_back_to_instances_and_frames() {
        let a = InstanceId(3);
        let b = InstanceId(8);
        let grouped = reconcile(&request(&[a, b]), &output(&[0, 1])).unwrap();

        assert_eq!(grouped.len(), 2);
        let det_b = &grouped[&b][&FrameId(4)];
        assert_eq!(det_b.frame_id, FrameId(4));
        assert_eq!(det_b.top_left, (1, 1));
        assert_eq!(det_b.bottom_right, (1, 1));
        let mask = det_b.mask.as_ref().unwrap();
        assert!(mask[[1, 1]]);
        assert_eq!(mask.iter().filter(|&&v| v).count(), 1);
    }

    #[test]
    fn test_duplicate_rows_keep_the_last() {
        let a = InstanceId(0);
        let grouped = reconcile(&request(&[a]), &output(&[0, 0, 0])).unwrap();
        assert_eq!(grouped[&a].len(), 1);
        assert_eq!(grouped[&a][&FrameId(4)].top_left, (2, 2));
    }

    #[test]
    fn test_unmapped_rows_are_skipped() {
        let a = InstanceId(0);
        let grouped = reconcile(&request(&[a]), &output(&[5, 0])).unwrap();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&a][&FrameId(4)].top_left, (1, 1));

        let mut out = output(&[0]);
        let frame = out.frames.remove(&0).unwrap();
        out.frames.insert(9, FrameInferenceOutput { frame_index: 9, ..frame });
        assert!(reconcile(&request(&[a]), &out).unwrap().is_empty());
    }

    #[test]
    fn test_apply_updates_each_touched_instance_once() {
        let mut registry = InstanceRegistry::new();
        let a = registry.create("A", None, None);
        let b = registry.create("B", None, None);
        let untouched = registry.create("C", None, None);
        registry.take_events();

        let result = InferenceResult {
            request: request(&[a, b]),
            output: Ok(output(&[0, 1, 1])),
        };
        let updated = apply_inference_result(&mut registry, &result).unwrap();

        assert_eq!(updated, vec![a, b]);
        assert_eq!(
            registry.take_events(),
            vec![
                InstanceEvent::Changed(a, Cud::Updated),
                InstanceEvent::Changed(b, Cud::Updated),
            ]
        );
        assert!(registry.mask_for(a, FrameId(4)).is_some());
        assert!(registry.mask_for(untouched, FrameId(4)).is_none());
    }

    #[test]
    fn test_failed_run_leaves_registry_untouched() {
        let mut registry = InstanceRegistry::new();
        let a = registry.create("A", None, None);
        let ok = InferenceResult {
            request: request(&[a]),
            output: Ok(output(&[0])),
        };
        apply_inference_result(&mut registry, &ok).unwrap();
        let before = registry.get(a).unwrap().clone();
        registry.take_events();

        let failed = InferenceResult {
            request: request(&[a]),
            output: Err(ModelError::RunFailed("out of memory".into())),
        };
        assert_eq!(
            apply_inference_result(&mut registry, &failed),
            Err(ModelError::RunFailed("out of memory".into()))
        );
        assert!(registry.take_events().is_empty());
        assert_eq!(registry.get(a), Some(&before));
    }

    #[test]
    fn test_deleted_instance_is_skipped() {
        let mut registry = InstanceRegistry::new();
        let a = registry.create("A", None, None);
        let gone = InstanceId(42);
        let result = InferenceResult {
            request: request(&[gone, a]),
            output: Ok(output(&[0, 1])),
        };
        assert_eq!(apply_inference_result(&mut registry, &result), Ok(vec![a]));
    }

    #[test]
    fn test_misaligned_rows_are_malformed() {
        let mut registry = InstanceRegistry::new();
        let a = registry.create("A", None, None);
        registry.take_events();

        // Two object ids but only one box and one mask
        let mut out = output(&[0]);
        let frame = out.frames.get_mut(&0).unwrap();
        frame.instance_ids = Array1::from(vec![0, 0]);
        frame.scores = Array1::from(vec![0.5, 0.5]);
        let result = InferenceResult {
            request: request(&[a]),
            output: Ok(out),
        };

        assert!(matches!(
            apply_inference_result(&mut registry, &result),
            Err(ModelError::MalformedOutput(_))
        ));
        assert!(registry.take_events().is_empty());
        assert!(registry.mask_for(a, FrameId(4)).is_none());
    }

    #[test]
    fn test_boxes_need_four_columns() {
        let mut out = output(&[0]);
        out.frames.get_mut(&0).unwrap().boxes = Array2::zeros((1, 3));
        assert!(matches!(
            reconcile(&request(&[InstanceId(0)]), &out),
            Err(ModelError::MalformedOutput(_))
        ));
    }
}
