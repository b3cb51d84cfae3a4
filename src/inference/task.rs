//! Model-facing task description and output.
//!
//! Everything here uses request-local numbering: frames are positions in
//! `InferenceInput::frame_paths` and objects are small integers assigned by
//! the request builder. Stable application ids never cross the model
//! boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ndarray::{Array1, Array2, Array3};

use crate::constants::DEFAULT_MAX_MASKS_PER_OBJECT;

/// Click in image pixels, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointPrompt {
    pub x: i32,
    pub y: i32,
    pub is_positive: bool,
}

/// Positive box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxPrompt {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

/// Prompts for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePrompt {
    /// Request-local object number.
    pub instance_id: u32,
    pub points: Vec<PointPrompt>,
    pub bbox: Option<BoxPrompt>,
}

impl InstancePrompt {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.bbox.is_none()
    }
}

/// Prompts for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePrompt {
    /// Position in the request's frame list. Always 0 for a single image.
    pub frame_index: usize,
    pub instances: Vec<InstancePrompt>,
}

/// Propagation settings for video tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoOptions {
    pub start_frame_index: Option<usize>,
    pub max_frames: Option<usize>,
    pub reverse: bool,
}

/// How many masks to keep per object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskOutputOptions {
    pub max_masks_per_object: usize,
}

impl MaskOutputOptions {
    /// Whether the model should produce several candidate masks per object.
    pub fn multimask(&self) -> bool {
        self.max_masks_per_object > 1
    }
}

impl Default for MaskOutputOptions {
    fn default() -> Self {
        Self {
            max_masks_per_object: DEFAULT_MAX_MASKS_PER_OBJECT,
        }
    }
}

/// Promptable visual segmentation task, for an image or a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvsTask {
    pub frame_prompts: Vec<FramePrompt>,
    /// `None` for an image task.
    pub video_options: Option<VideoOptions>,
    pub output_options: MaskOutputOptions,
}

/// Everything a model needs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceInput {
    pub task: PvsTask,
    pub frame_paths: Vec<PathBuf>,
}

/// Flattened result for one frame, all arrays index-aligned on axis 0.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInferenceOutput {
    pub frame_index: usize,
    /// `(N, H, W)`
    pub masks: Array3<bool>,
    /// `(N,)`
    pub scores: Array1<f32>,
    /// `(N, 4)` as `[x_min, y_min, x_max, y_max]`
    pub boxes: Array2<i32>,
    /// `(N,)` request-local object numbers
    pub instance_ids: Array1<u32>,
    /// Why the frame is empty, when it is.
    pub message: Option<String>,
}

impl FrameInferenceOutput {
    pub fn empty(frame_index: usize, message: impl Into<String>) -> Self {
        Self {
            frame_index,
            masks: Array3::from_elem((0, 0, 0), false),
            scores: Array1::zeros(0),
            boxes: Array2::zeros((0, 4)),
            instance_ids: Array1::zeros(0),
            message: Some(message.into()),
        }
    }

    /// Number of masks.
    pub fn len(&self) -> usize {
        self.instance_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_ids.is_empty()
    }
}

/// Per-frame results of one run, keyed by frame index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceOutput {
    pub frames: BTreeMap<usize, FrameInferenceOutput>,
}

impl InferenceOutput {
    pub fn single(frame: FrameInferenceOutput) -> Self {
        Self {
            frames: BTreeMap::from([(frame.frame_index, frame)]),
        }
    }
}
