//! Inference pipeline: request building, the model boundary, the worker
//! thread and reconciliation of results into instance detections.

mod batch;
mod controller;
mod error;
mod model;
mod postprocess;
mod reconcile;
mod request;
mod task;
mod video;
mod worker;

pub use batch::{BatchKind, PADDING_LABEL, PADDING_POINT, PromptBatch, build_prompt_batches};
pub use controller::{InferenceResult, ModelController};
pub use error::{ControllerError, ModelError, RequestError};
pub use model::{MaskPredictor, ModelBuilder, PvsImageModel, RawMasks, SegmentationModel};
pub use postprocess::{bbox_from_mask, boxes_from_masks, merge_frame_outputs, sort_and_flatten};
pub use reconcile::{apply_inference_result, check_frame_output, reconcile};
pub use request::{
    InferenceRequest, RequestIdGenerator, assign_numeric_ids, build_image_request,
    build_video_request,
};
pub use task::{
    BoxPrompt, FrameInferenceOutput, FramePrompt, InferenceInput, InferenceOutput,
    InstancePrompt, MaskOutputOptions, PointPrompt, PvsTask, VideoOptions,
};
pub use video::{Propagation, PvsVideoModel, TrackedFrame, VideoPredictor};
pub use worker::{ModelWorker, WorkerCommand, WorkerEvent};

#[cfg(test)]
pub(crate) use model::tests::SquarePredictor;
#[cfg(test)]
pub(crate) use video::tests::DriftTracker;
