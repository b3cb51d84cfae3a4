//! Building inference requests from the annotation store.
//!
//! A request replaces stable instance ids with request-local numbers
//! `0..N`, assigned in the order of the ids' string form so that identical
//! annotations always number the same way. The mappings travel with the
//! request and are used to translate the result back.

use std::collections::BTreeMap;

use super::batch::{PromptBatch, build_prompt_batches};
use super::error::RequestError;
use super::task::{
    BoxPrompt, FramePrompt, InferenceInput, InstancePrompt, MaskOutputOptions, PointPrompt,
    PvsTask, VideoOptions,
};
use crate::model::{FrameId, InstanceId};
use crate::state::{AnnotationStore, Frame};

/// A request ready for the model worker, plus what is needed to map the
/// answer back onto stable ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub request_id: String,
    /// Frame index in `input.frame_paths` to frame id.
    pub frame_mapping: BTreeMap<usize, FrameId>,
    /// Request-local object number to instance id.
    pub instance_mapping: BTreeMap<u32, InstanceId>,
    pub input: InferenceInput,
}

impl InferenceRequest {
    /// Model batches for every prompted frame, in frame order.
    pub fn batches(&self) -> Vec<PromptBatch> {
        self.input
            .task
            .frame_prompts
            .iter()
            .flat_map(|fp| build_prompt_batches(fp.frame_index, &fp.instances))
            .collect()
    }
}

/// Hands out request ids of the form `"<model>:<n>"`.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: u64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, model_name: &str) -> String {
        let id = format!("{}:{}", model_name, self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Default)]
struct CollectedPrompts {
    points: Vec<PointPrompt>,
    bbox: Option<BoxPrompt>,
}

/// Points and the positive box of each instance annotated on a frame.
fn collect_frame_prompts(
    store: &AnnotationStore,
    frame_id: FrameId,
) -> Result<BTreeMap<InstanceId, CollectedPrompts>, RequestError> {
    let mut by_instance: BTreeMap<InstanceId, CollectedPrompts> = BTreeMap::new();

    for point in store.points_for_frame(frame_id) {
        let (x, y) = point.position;
        by_instance
            .entry(point.instance_id)
            .or_default()
            .points
            .push(PointPrompt {
                x,
                y,
                is_positive: point.kind.is_positive(),
            });
    }

    for bbox in store.boxes_for_frame(frame_id) {
        if !bbox.kind().is_positive() {
            log::warn!(
                "Ignoring negative box {} of instance {} on frame {}",
                bbox.id,
                bbox.instance_id,
                frame_id
            );
            continue;
        }
        let entry = by_instance.entry(bbox.instance_id).or_default();
        if entry.bbox.is_some() {
            return Err(RequestError::MultipleBoxes {
                instance_id: bbox.instance_id,
                frame_id,
            });
        }
        let ((x_min, y_min), (x_max, y_max)) = (bbox.top_left(), bbox.bottom_right());
        entry.bbox = Some(BoxPrompt {
            x_min,
            y_min,
            x_max,
            y_max,
        });
    }

    by_instance.retain(|_, prompts| !prompts.points.is_empty() || prompts.bbox.is_some());
    Ok(by_instance)
}

/// Number instances `0..N` in the order of their ids' string form.
pub fn assign_numeric_ids<I>(instance_ids: I) -> BTreeMap<u32, InstanceId>
where
    I: IntoIterator<Item = InstanceId>,
{
    let mut ids: Vec<InstanceId> = instance_ids.into_iter().collect();
    ids.sort_by_cached_key(|id| id.to_string());
    ids.dedup();
    ids.into_iter()
        .enumerate()
        .map(|(n, id)| (n as u32, id))
        .collect()
}

fn frame_prompt(
    frame_index: usize,
    mut prompts: BTreeMap<InstanceId, CollectedPrompts>,
    instance_mapping: &BTreeMap<u32, InstanceId>,
) -> FramePrompt {
    let instances = instance_mapping
        .iter()
        .filter_map(|(numeric_id, instance_id)| {
            let collected = prompts.remove(instance_id)?;
            Some(InstancePrompt {
                instance_id: *numeric_id,
                points: collected.points,
                bbox: collected.bbox,
            })
        })
        .collect();
    FramePrompt {
        frame_index,
        instances,
    }
}

/// Build a single-image request for one frame.
///
/// Fails with [`RequestError::NoPrompts`] when no instance has a point or a
/// positive box on the frame.
pub fn build_image_request(
    request_id: impl Into<String>,
    frame: &Frame,
    store: &AnnotationStore,
    output_options: MaskOutputOptions,
) -> Result<InferenceRequest, RequestError> {
    let prompts = collect_frame_prompts(store, frame.id)?;
    if prompts.is_empty() {
        return Err(RequestError::NoPrompts(frame.id));
    }

    let instance_mapping = assign_numeric_ids(prompts.keys().copied());
    let fp = frame_prompt(0, prompts, &instance_mapping);

    log::debug!(
        "Built image request for frame {}: {} objects, {} points",
        frame.id,
        fp.instances.len(),
        fp.instances.iter().map(|i| i.points.len()).sum::<usize>()
    );

    Ok(InferenceRequest {
        request_id: request_id.into(),
        frame_mapping: BTreeMap::from([(0, frame.id)]),
        instance_mapping,
        input: InferenceInput {
            task: PvsTask {
                frame_prompts: vec![fp],
                video_options: None,
                output_options,
            },
            frame_paths: vec![frame.path.clone()],
        },
    })
}

/// Build a video request over a whole frame sequence.
///
/// Frame indices are positions in `frames`. Object numbers are assigned over
/// every instance annotated anywhere in the sequence, so one instance keeps
/// its number on every frame.
pub fn build_video_request(
    request_id: impl Into<String>,
    frames: &[Frame],
    store: &AnnotationStore,
    output_options: MaskOutputOptions,
    video_options: VideoOptions,
) -> Result<InferenceRequest, RequestError> {
    if frames.is_empty() {
        return Err(RequestError::NoFrames);
    }

    let mut per_frame = Vec::new();
    for (index, frame) in frames.iter().enumerate() {
        let prompts = collect_frame_prompts(store, frame.id)?;
        if !prompts.is_empty() {
            per_frame.push((index, prompts));
        }
    }
    if per_frame.is_empty() {
        return Err(RequestError::NoPromptsInSequence);
    }

    let instance_mapping = assign_numeric_ids(
        per_frame
            .iter()
            .flat_map(|(_, prompts)| prompts.keys().copied()),
    );
    let frame_prompts = per_frame
        .into_iter()
        .map(|(index, prompts)| frame_prompt(index, prompts, &instance_mapping))
        .collect::<Vec<_>>();

    log::debug!(
        "Built video request over {} frames: {} prompted frames, {} objects",
        frames.len(),
        frame_prompts.len(),
        instance_mapping.len()
    );

    Ok(InferenceRequest {
        request_id: request_id.into(),
        frame_mapping: frames.iter().enumerate().map(|(i, f)| (i, f.id)).collect(),
        instance_mapping,
        input: InferenceInput {
            task: PvsTask {
                frame_prompts,
                video_options: Some(video_options),
                output_options,
            },
            frame_paths: frames.iter().map(|f| f.path.clone()).collect(),
        },
    })
}
