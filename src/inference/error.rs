//! Error types for request building, model runs and the model controller.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{FrameId, InstanceId};

/// Reasons a request could not be built from the current annotations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Nothing to send: routine user state, not a fault
    #[error("No clicks or bounding boxes on frame {0}")]
    NoPrompts(FrameId),

    /// Nothing to send for any frame of the sequence
    #[error("No clicks or bounding boxes on any frame")]
    NoPromptsInSequence,

    /// No frame is open
    #[error("No frames loaded")]
    NoFrames,

    /// Frame id is not part of the sequence
    #[error("Unknown frame {0}")]
    UnknownFrame(FrameId),

    /// Promptable segmentation takes at most one box per object
    #[error("More than one box for instance {instance_id} on frame {frame_id}")]
    MultipleBoxes {
        instance_id: InstanceId,
        frame_id: FrameId,
    },
}

/// Failures reported by a model run.
///
/// These are always surfaced to the user; they never turn into an empty
/// success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No model loaded, or it is not ready
    #[error("No model loaded")]
    NotLoaded,

    /// Model weights could not be loaded
    #[error("Failed to load model: {0}")]
    LoadFailed(String),

    /// The task is not something this model handles
    #[error("Unsupported task: {0}")]
    UnsupportedTask(String),

    /// Frame image could not be opened
    #[error("Failed to open image {path:?}: {message}")]
    ImageOpen { path: PathBuf, message: String },

    /// Model output is missing fields or has inconsistent shapes
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// The model reported an error while running
    #[error("Model run failed: {0}")]
    RunFailed(String),

    /// The model panicked while running
    #[error("Model panicked: {0}")]
    Panicked(String),
}

impl ModelError {
    pub fn image_open(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ImageOpen {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedTask(message.into())
    }
}

/// Synchronous rejections from the model controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// `run` called without a worker
    #[error("No model loaded")]
    NoModelLoaded,

    /// A request is still waiting for its result
    #[error("Inference request {request_id} is still running")]
    Busy { request_id: String },

    /// No builder registered under this model type
    #[error("Unknown model type '{0}'")]
    UnknownModelType(String),

    /// The builder could not create a model from the path
    #[error("Model builder for '{model_type}' failed at {path:?}")]
    BuilderFailed { model_type: String, path: PathBuf },

    /// Worker thread could not be started
    #[error("Failed to spawn model worker: {0}")]
    Spawn(String),

    /// Worker thread is gone
    #[error("Model worker disconnected")]
    WorkerGone,
}
