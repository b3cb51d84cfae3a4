//! Post-processing of raw model output: per-object score sort, top-k,
//! flattening, box derivation and merging of batches.

use std::cmp::Ordering;

use ndarray::{Array2, Array3, Array4, ArrayView2, Axis, s};

use super::error::ModelError;
use super::task::{FrameInferenceOutput, MaskOutputOptions};

/// Tight `[x_min, y_min, x_max, y_max]` box around the true pixels of a
/// `(H, W)` mask. An all-false mask yields `[0, 0, 0, 0]`.
pub fn bbox_from_mask(mask: ArrayView2<'_, bool>) -> [i32; 4] {
    let mut bounds: Option<[usize; 4]> = None;
    for ((y, x), &set) in mask.indexed_iter() {
        if !set {
            continue;
        }
        bounds = Some(match bounds {
            None => [x, y, x, y],
            Some([x0, y0, x1, y1]) => [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
        });
    }
    match bounds {
        Some(b) => b.map(|v| v as i32),
        None => [0; 4],
    }
}

/// Boxes for every mask of an `(N, H, W)` stack, shaped `(N, 4)`.
pub fn boxes_from_masks(masks: &Array3<bool>) -> Array2<i32> {
    let rows: Vec<[i32; 4]> = masks.outer_iter().map(bbox_from_mask).collect();
    Array2::from_shape_fn((rows.len(), 4), |(i, j)| rows[i][j])
}

/// Order for a descending score sort. NaN ranks below every real score.
fn descending_nan_last(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Sort each object's masks by descending score, keep the best
/// `max_masks_per_object`, and flatten to one row per kept mask.
///
/// `masks` is `(objects, masks_per_object, H, W)`, `scores` is
/// `(objects, masks_per_object)` and `instance_ids` has one entry per object.
/// The sort is stable, so equal scores keep the model's order. Rows of one
/// object stay contiguous and objects keep their input order.
pub fn sort_and_flatten(
    frame_index: usize,
    masks: &Array4<bool>,
    scores: &Array2<f32>,
    instance_ids: &[u32],
    options: &MaskOutputOptions,
) -> Result<FrameInferenceOutput, ModelError> {
    let (objects, per_object, height, width) = masks.dim();
    if scores.dim() != (objects, per_object) {
        return Err(ModelError::malformed(format!(
            "scores shaped {:?} do not match masks shaped {:?}",
            scores.dim(),
            masks.dim()
        )));
    }
    if instance_ids.len() != objects {
        return Err(ModelError::malformed(format!(
            "{} object ids for {} objects",
            instance_ids.len(),
            objects
        )));
    }

    let keep = options.max_masks_per_object.min(per_object);
    if masks.is_empty() || keep == 0 {
        return Ok(FrameInferenceOutput::empty(
            frame_index,
            "No masks after sorting/flattening",
        ));
    }

    let total = objects * keep;
    let mut flat_masks = Array3::from_elem((total, height, width), false);
    let mut flat_scores = Vec::with_capacity(total);
    let mut flat_ids = Vec::with_capacity(total);

    for (object, object_scores) in scores.outer_iter().enumerate() {
        let mut order: Vec<usize> = (0..per_object).collect();
        order.sort_by(|&a, &b| descending_nan_last(object_scores[a], object_scores[b]));

        for (slot, &m) in order.iter().take(keep).enumerate() {
            flat_masks
                .index_axis_mut(Axis(0), object * keep + slot)
                .assign(&masks.slice(s![object, m, .., ..]));
            flat_scores.push(object_scores[m]);
            flat_ids.push(instance_ids[object]);
        }
    }

    let boxes = boxes_from_masks(&flat_masks);
    Ok(FrameInferenceOutput {
        frame_index,
        masks: flat_masks,
        scores: flat_scores.into(),
        boxes,
        instance_ids: flat_ids.into(),
        message: None,
    })
}

/// Concatenate per-batch results for one frame, skipping empty ones.
pub fn merge_frame_outputs(
    frame_index: usize,
    parts: &[FrameInferenceOutput],
) -> Result<FrameInferenceOutput, ModelError> {
    let parts: Vec<&FrameInferenceOutput> = parts.iter().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Ok(FrameInferenceOutput::empty(
            frame_index,
            "No masks produced by model",
        ));
    }

    let shape_error = |e: ndarray::ShapeError| ModelError::malformed(format!("cannot merge batches: {}", e));

    let masks = ndarray::concatenate(
        Axis(0),
        &parts.iter().map(|p| p.masks.view()).collect::<Vec<_>>(),
    )
    .map_err(shape_error)?;
    let scores = ndarray::concatenate(
        Axis(0),
        &parts.iter().map(|p| p.scores.view()).collect::<Vec<_>>(),
    )
    .map_err(shape_error)?;
    let boxes = ndarray::concatenate(
        Axis(0),
        &parts.iter().map(|p| p.boxes.view()).collect::<Vec<_>>(),
    )
    .map_err(shape_error)?;
    let instance_ids = ndarray::concatenate(
        Axis(0),
        &parts.iter().map(|p| p.instance_ids.view()).collect::<Vec<_>>(),
    )
    .map_err(shape_error)?;

    Ok(FrameInferenceOutput {
        frame_index,
        masks,
        scores,
        boxes,
        instance_ids,
        message: None,
    })
}
