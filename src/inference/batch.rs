//! Grouping of per-object prompts into model batches.
//!
//! A batched model call either carries a box for every object or for none,
//! so objects are split into a "with box" and a "no box" batch.

use super::task::InstancePrompt;

/// Point used for objects that have a box but no clicks.
pub const PADDING_POINT: [f32; 2] = [0.0, 0.0];

/// Label of [`PADDING_POINT`]: ignored by the model.
pub const PADDING_LABEL: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    WithBox,
    NoBox,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::WithBox => "with_box",
            BatchKind::NoBox => "no_box",
        }
    }
}

/// Parallel per-object arrays for one model call on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBatch {
    pub kind: BatchKind,
    pub frame_index: usize,
    /// `(objects, points_per_object, 2)`, ragged
    pub points: Vec<Vec<[f32; 2]>>,
    /// `(objects, points_per_object)`: 1 positive, 0 negative, -1 padding
    pub labels: Vec<Vec<i32>>,
    /// `(objects, 4)`, present only for [`BatchKind::WithBox`]
    pub boxes: Option<Vec<[f32; 4]>>,
    /// `(objects,)` request-local object numbers
    pub instance_ids: Vec<u32>,
}

impl PromptBatch {
    fn new(kind: BatchKind, frame_index: usize, instances: &[&InstancePrompt]) -> Self {
        let mut points = Vec::with_capacity(instances.len());
        let mut labels = Vec::with_capacity(instances.len());
        let mut boxes = Vec::with_capacity(instances.len());
        let mut instance_ids = Vec::with_capacity(instances.len());

        for instance in instances {
            instance_ids.push(instance.instance_id);

            if instance.points.is_empty() {
                points.push(vec![PADDING_POINT]);
                labels.push(vec![PADDING_LABEL]);
            } else {
                points.push(
                    instance
                        .points
                        .iter()
                        .map(|p| [p.x as f32, p.y as f32])
                        .collect(),
                );
                labels.push(
                    instance
                        .points
                        .iter()
                        .map(|p| i32::from(p.is_positive))
                        .collect(),
                );
            }

            if let Some(b) = instance.bbox {
                boxes.push([
                    b.x_min as f32,
                    b.y_min as f32,
                    b.x_max as f32,
                    b.y_max as f32,
                ]);
            }
        }

        let boxes = match kind {
            BatchKind::WithBox => Some(boxes),
            BatchKind::NoBox => None,
        };

        Self {
            kind,
            frame_index,
            points,
            labels,
            boxes,
            instance_ids,
        }
    }

    /// Number of objects in the batch.
    pub fn len(&self) -> usize {
        self.instance_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_ids.is_empty()
    }
}

/// Build up to two batches for a frame, "with box" first.
///
/// Objects with neither points nor box are dropped. Object order inside each
/// batch follows the input order.
pub fn build_prompt_batches(frame_index: usize, instances: &[InstancePrompt]) -> Vec<PromptBatch> {
    let (with_box, no_box): (Vec<&InstancePrompt>, Vec<&InstancePrompt>) = instances
        .iter()
        .filter(|instance| !instance.is_empty())
        .partition(|instance| instance.bbox.is_some());

    let mut batches = Vec::with_capacity(2);
    if !with_box.is_empty() {
        batches.push(PromptBatch::new(BatchKind::WithBox, frame_index, &with_box));
    }
    if !no_box.is_empty() {
        batches.push(PromptBatch::new(BatchKind::NoBox, frame_index, &no_box));
    }
    batches
}
