//! Video promptable segmentation.
//!
//! [`VideoPredictor`] is the opaque tracker: it holds a session over a frame
//! sequence, takes prompt batches on any frame and propagates them through
//! the sequence. [`PvsVideoModel`] drives it from a [`PvsTask`] with video
//! options and post-processes every tracked frame.

use std::path::PathBuf;

use image::RgbImage;
use ndarray::{Array2, Array4};

use super::batch::{PromptBatch, build_prompt_batches};
use super::error::ModelError;
use super::model::SegmentationModel;
use super::postprocess::sort_and_flatten;
use super::task::{FrameInferenceOutput, InferenceInput, InferenceOutput, PvsTask, VideoOptions};

/// Resolved propagation range over a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Propagation {
    pub start_frame_index: usize,
    /// Number of frames to track, the start frame included.
    pub max_frames: usize,
    pub reverse: bool,
}

impl Propagation {
    /// Fill in the defaults of `options` for a sequence of `num_frames`:
    /// start at frame 0 and track the whole sequence.
    pub fn resolve(options: &VideoOptions, num_frames: usize) -> Result<Self, ModelError> {
        let start_frame_index = options.start_frame_index.unwrap_or(0);
        if start_frame_index >= num_frames {
            return Err(ModelError::unsupported(format!(
                "start frame {} outside a sequence of {} frames",
                start_frame_index, num_frames
            )));
        }
        Ok(Self {
            start_frame_index,
            max_frames: options.max_frames.unwrap_or(num_frames),
            reverse: options.reverse,
        })
    }

    /// Frame indices visited, in tracking order.
    pub fn frame_indices(&self, num_frames: usize) -> Vec<usize> {
        if self.max_frames == 0 || self.start_frame_index >= num_frames {
            return Vec::new();
        }
        if self.reverse {
            let first = (self.start_frame_index + 1).saturating_sub(self.max_frames);
            (first..=self.start_frame_index).rev().collect()
        } else {
            let end = self
                .start_frame_index
                .saturating_add(self.max_frames)
                .min(num_frames);
            (self.start_frame_index..end).collect()
        }
    }
}

/// Raw tracker output for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedFrame {
    pub frame_index: usize,
    /// Object numbers, in the row order of `masks`
    pub object_ids: Vec<u32>,
    /// `(objects, masks_per_object, H, W)`
    pub masks: Option<Array4<bool>>,
    /// `(objects, masks_per_object)`. Trackers without a quality head leave
    /// this empty.
    pub scores: Option<Array2<f32>>,
}

/// The opaque tracking call.
pub trait VideoPredictor: Send {
    fn load(&mut self, device: &str) -> Result<(), ModelError>;

    fn unload(&mut self);

    /// Open a tracking session over `frames`.
    fn init_session(&mut self, frames: Vec<RgbImage>) -> Result<(), ModelError>;

    /// Forget all prompts and tracking state, keeping the session's frames.
    fn reset_session(&mut self);

    /// Add the prompts of one batch on `batch.frame_index`.
    fn add_prompts(&mut self, batch: &PromptBatch) -> Result<(), ModelError>;

    /// Track every prompted object through `propagation`.
    fn propagate(&mut self, propagation: &Propagation) -> Result<Vec<TrackedFrame>, ModelError>;
}

struct VideoSession {
    frame_paths: Vec<PathBuf>,
    size: (u32, u32),
}

/// Video-only promptable segmentation on top of a [`VideoPredictor`].
///
/// The tracking session is kept while the frame list stays the same, so
/// repeated runs over one sequence decode the frames once. Prompts are
/// always re-applied from scratch.
pub struct PvsVideoModel<P> {
    name: String,
    predictor: P,
    device: Option<String>,
    session: Option<VideoSession>,
}

impl<P: VideoPredictor> PvsVideoModel<P> {
    pub fn new(name: impl Into<String>, predictor: P) -> Self {
        Self {
            name: name.into(),
            predictor,
            device: None,
            session: None,
        }
    }

    fn ensure_session(&mut self, frame_paths: &[PathBuf]) -> Result<(u32, u32), ModelError> {
        if let Some(session) = &self.session {
            if session.frame_paths == frame_paths {
                return Ok(session.size);
            }
        }
        self.session = None;

        let mut frames = Vec::with_capacity(frame_paths.len());
        for path in frame_paths {
            let frame = image::open(path)
                .map_err(|e| ModelError::image_open(path, e))?
                .to_rgb8();
            frames.push(frame);
        }
        let size = frames[0].dimensions();
        if let Some(odd) = frames.iter().position(|f| f.dimensions() != size) {
            return Err(ModelError::unsupported(format!(
                "frame {:?} is {}x{} but the sequence is {}x{}",
                frame_paths[odd],
                frames[odd].width(),
                frames[odd].height(),
                size.0,
                size.1
            )));
        }

        self.predictor.init_session(frames)?;
        log::info!(
            "{}: opened session over {} frames ({}x{})",
            self.name,
            frame_paths.len(),
            size.0,
            size.1
        );
        self.session = Some(VideoSession {
            frame_paths: frame_paths.to_vec(),
            size,
        });
        Ok(size)
    }

    fn apply_prompts(&mut self, task: &PvsTask) -> Result<(), ModelError> {
        for frame_prompt in &task.frame_prompts {
            for batch in build_prompt_batches(frame_prompt.frame_index, &frame_prompt.instances) {
                log::debug!(
                    "{}: frame {}: adding batch '{}' with {} objects",
                    self.name,
                    batch.frame_index,
                    batch.kind.as_str(),
                    batch.len()
                );
                self.predictor.add_prompts(&batch)?;
            }
        }
        Ok(())
    }

    fn process_frame(
        tracked: TrackedFrame,
        size: (u32, u32),
        task: &PvsTask,
    ) -> Result<FrameInferenceOutput, ModelError> {
        let masks = tracked
            .masks
            .ok_or_else(|| ModelError::malformed(format!("frame {}: no pred_masks", tracked.frame_index)))?;
        let (objects, per_object, height, width) = masks.dim();
        if (width as u32, height as u32) != size && !masks.is_empty() {
            return Err(ModelError::malformed(format!(
                "frame {}: masks are {}x{} but the video is {}x{}",
                tracked.frame_index, width, height, size.0, size.1
            )));
        }
        let scores = tracked
            .scores
            .unwrap_or_else(|| Array2::ones((objects, per_object)));

        sort_and_flatten(
            tracked.frame_index,
            &masks,
            &scores,
            &tracked.object_ids,
            &task.output_options,
        )
    }
}

impl<P: VideoPredictor> SegmentationModel for PvsVideoModel<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn ready(&self) -> bool {
        self.device.is_some()
    }

    fn load(&mut self, device: &str) -> Result<(), ModelError> {
        if self.device.as_deref() == Some(device) {
            return Ok(());
        }
        if self.ready() {
            self.unload();
        }
        self.predictor.load(device)?;
        self.device = Some(device.to_string());
        self.session = None;
        log::info!("{}: loaded on {}", self.name, device);
        Ok(())
    }

    fn unload(&mut self) {
        self.predictor.unload();
        self.device = None;
        self.session = None;
    }

    fn run(&mut self, input: &InferenceInput) -> Result<InferenceOutput, ModelError> {
        if !self.ready() {
            return Err(ModelError::NotLoaded);
        }
        if input.frame_paths.is_empty() {
            return Err(ModelError::unsupported(format!(
                "{}: no frames provided",
                self.name
            )));
        }
        let Some(options) = &input.task.video_options else {
            return Err(ModelError::unsupported(format!(
                "{} needs video options",
                self.name
            )));
        };

        let num_frames = input.frame_paths.len();
        let propagation = Propagation::resolve(options, num_frames)?;
        let size = self.ensure_session(&input.frame_paths)?;

        self.predictor.reset_session();
        self.apply_prompts(&input.task)?;

        let tracked = self.predictor.propagate(&propagation)?;
        let total = tracked.len();
        let mut output = InferenceOutput::default();
        for (step, frame) in tracked.into_iter().enumerate() {
            if frame.frame_index >= num_frames {
                return Err(ModelError::malformed(format!(
                    "tracked frame {} outside a sequence of {} frames",
                    frame.frame_index, num_frames
                )));
            }
            log::debug!(
                "{}: tracked frame {} ({}/{})",
                self.name,
                frame.frame_index,
                step + 1,
                total
            );
            let result = Self::process_frame(frame, size, &input.task)?;
            output.frames.insert(result.frame_index, result);
        }
        Ok(output)
    }
}
