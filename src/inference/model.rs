//! Model boundary.
//!
//! [`SegmentationModel`] is what the worker thread drives: load, unload and
//! run a whole [`InferenceInput`]. [`MaskPredictor`] is the opaque tensor
//! call underneath (one batch in, raw multi-mask output out).
//! [`PvsImageModel`] adapts a predictor into an image-only segmentation
//! model and owns the batching and post-processing around it.

use std::path::Path;

use image::RgbImage;
use ndarray::{Array2, Array4};

use super::batch::{PromptBatch, build_prompt_batches};
use super::error::ModelError;
use super::postprocess::{merge_frame_outputs, sort_and_flatten};
use super::task::{FrameInferenceOutput, FramePrompt, InferenceInput, InferenceOutput, MaskOutputOptions, PvsTask};

/// A model the worker thread can load and run.
///
/// All methods are called from the worker thread only.
pub trait SegmentationModel: Send {
    fn name(&self) -> &str;

    fn ready(&self) -> bool;

    /// Set up heavy resources on `device`.
    fn load(&mut self, device: &str) -> Result<(), ModelError>;

    /// Free heavy resources.
    fn unload(&mut self);

    fn run(&mut self, input: &InferenceInput) -> Result<InferenceOutput, ModelError>;
}

/// Creates a model from a weights location.
pub type ModelBuilder = Box<dyn Fn(&Path) -> Option<Box<dyn SegmentationModel>>>;

/// Raw output of one predictor call.
///
/// Either field may be missing when the underlying model produced nothing
/// for it; that is reported as malformed output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMasks {
    /// `(objects, masks_per_object, H, W)` at the input image's size
    pub masks: Option<Array4<bool>>,
    /// `(objects, masks_per_object)`
    pub scores: Option<Array2<f32>>,
}

/// The opaque promptable-segmentation call.
pub trait MaskPredictor: Send {
    fn load(&mut self, device: &str) -> Result<(), ModelError>;

    fn unload(&mut self);

    /// Segment the objects of one batch. With `multimask` the predictor
    /// returns several candidates per object, otherwise one.
    fn predict(
        &mut self,
        image: &RgbImage,
        batch: &PromptBatch,
        multimask: bool,
    ) -> Result<RawMasks, ModelError>;
}

/// Image-only promptable segmentation on top of a [`MaskPredictor`].
///
/// Accepts single-frame tasks without video options, with exactly one frame
/// prompt at index 0.
pub struct PvsImageModel<P> {
    name: String,
    predictor: P,
    device: Option<String>,
}

impl<P: MaskPredictor> PvsImageModel<P> {
    pub fn new(name: impl Into<String>, predictor: P) -> Self {
        Self {
            name: name.into(),
            predictor,
            device: None,
        }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    fn select_frame_prompt(task: &PvsTask) -> Result<&FramePrompt, ModelError> {
        let mut candidates = task.frame_prompts.iter().filter(|fp| fp.frame_index == 0);
        match (candidates.next(), candidates.next()) {
            (Some(fp), None) => Ok(fp),
            (None, _) => Err(ModelError::unsupported(
                "no frame prompt with frame index 0 for image input",
            )),
            (Some(_), Some(_)) => Err(ModelError::unsupported(
                "several frame prompts with frame index 0 for image input",
            )),
        }
    }

    fn run_frame(
        &mut self,
        image: &RgbImage,
        frame_prompt: &FramePrompt,
        options: &MaskOutputOptions,
    ) -> Result<FrameInferenceOutput, ModelError> {
        let frame_index = frame_prompt.frame_index;
        if frame_prompt.instances.is_empty() {
            return Ok(FrameInferenceOutput::empty(
                frame_index,
                "No instances provided in frame prompt",
            ));
        }

        let batches = build_prompt_batches(frame_index, &frame_prompt.instances);
        if batches.is_empty() {
            return Ok(FrameInferenceOutput::empty(
                frame_index,
                "No valid instances found after preprocessing",
            ));
        }

        let mut parts = Vec::with_capacity(batches.len());
        for batch in &batches {
            log::info!(
                "{}: running batch '{}' with {} objects",
                self.name,
                batch.kind.as_str(),
                batch.len()
            );
            let raw = self.predictor.predict(image, batch, options.multimask())?;
            let masks = raw
                .masks
                .ok_or_else(|| ModelError::malformed("no pred_masks"))?;
            let scores = raw
                .scores
                .ok_or_else(|| ModelError::malformed("no iou_scores"))?;

            let (_, _, height, width) = masks.dim();
            if (width as u32, height as u32) != image.dimensions() && !masks.is_empty() {
                return Err(ModelError::malformed(format!(
                    "masks are {}x{} but the image is {}x{}",
                    width,
                    height,
                    image.width(),
                    image.height()
                )));
            }

            parts.push(sort_and_flatten(
                batch.frame_index,
                &masks,
                &scores,
                &batch.instance_ids,
                options,
            )?);
        }

        merge_frame_outputs(frame_index, &parts)
    }
}

impl<P: MaskPredictor> SegmentationModel for PvsImageModel<P> {
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
        log::info!("{}: loaded on {}", self.name, device);
        Ok(())
    }

    fn unload(&mut self) {
        self.predictor.unload();
        self.device = None;
    }

    fn run(&mut self, input: &InferenceInput) -> Result<InferenceOutput, ModelError> {
        if !self.ready() {
            return Err(ModelError::NotLoaded);
        }
        if input.frame_paths.len() != 1 {
            return Err(ModelError::unsupported(format!(
                "{} takes a single frame, got {}",
                self.name,
                input.frame_paths.len()
            )));
        }
        if input.task.video_options.is_some() {
            return Err(ModelError::unsupported(format!(
                "{} does not support video options",
                self.name
            )));
        }

        let path = &input.frame_paths[0];
        let image = image::open(path)
            .map_err(|e| ModelError::image_open(path, e))?
            .to_rgb8();

        let frame_prompt = Self::select_frame_prompt(&input.task)?;
        log::debug!(
            "{}: image {:?} ({}x{}), {} instances",
            self.name,
            path,
            image.width(),
            image.height(),
            frame_prompt.instances.len()
        );

        let output = self.run_frame(&image, frame_prompt, &input.task.output_options)?;
        Ok(InferenceOutput::single(output))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inference::batch::BatchKind;
    use crate::inference::task::{BoxPrompt, InstancePrompt, PointPrompt};
    use crate::test_support::TempDir;
    use ndarray::Array1;
    use std::path::PathBuf;

    /// Predictor double: each object's candidate `m` is a square of side
    /// `m + 1` anchored at the object's first prompt. Scores rise with `m`.
    pub(crate) struct SquarePredictor {
        pub loaded: bool,
        pub drop_scores: bool,
        pub calls: Vec<(BatchKind, bool)>,
    }

    impl SquarePredictor {
        pub fn new() -> Self {
            Self {
                loaded: false,
                drop_scores: false,
                calls: Vec::new(),
            }
        }
    }

    impl MaskPredictor for SquarePredictor {
        fn load(&mut self, _device: &str) -> Result<(), ModelError> {
            self.loaded = true;
            Ok(())
        }

        fn unload(&mut self) {
            self.loaded = false;
        }

        fn predict(
            &mut self,
            image: &RgbImage,
            batch: &PromptBatch,
            multimask: bool,
        ) -> Result<RawMasks, ModelError> {
            self.calls.push((batch.kind, multimask));
            let per_object = if multimask { 3 } else { 1 };
            let (w, h) = (image.width() as usize, image.height() as usize);

            let anchors: Vec<(usize, usize)> = (0..batch.len())
                .map(|o| match &batch.boxes {
                    Some(boxes) => (boxes[o][0] as usize, boxes[o][1] as usize),
                    None => (batch.points[o][0][0] as usize, batch.points[o][0][1] as usize),
                })
                .collect();

            let masks = Array4::from_shape_fn((batch.len(), per_object, h, w), |(o, m, y, x)| {
                let (ax, ay) = anchors[o];
                x >= ax && y >= ay && x <= ax + m && y <= ay + m
            });
            let scores = Array2::from_shape_fn((batch.len(), per_object), |(_, m)| m as f32 * 0.1);

            Ok(RawMasks {
                masks: Some(masks),
                scores: if self.drop_scores { None } else { Some(scores) },
            })
        }
    }

    fn task(instances: Vec<InstancePrompt>, max_masks: usize) -> PvsTask {
        PvsTask {
            frame_prompts: vec![FramePrompt {
                frame_index: 0,
                instances,
            }],
            video_options: None,
            output_options: MaskOutputOptions {
                max_masks_per_object: max_masks,
            },
        }
    }

    fn prompts() -> Vec<InstancePrompt> {
        vec![
            InstancePrompt {
                instance_id: 0,
                points: vec![PointPrompt {
                    x: 2,
                    y: 3,
                    is_positive: true,
                }],
                bbox: None,
            },
            InstancePrompt {
                instance_id: 1,
                points: Vec::new(),
                bbox: Some(BoxPrompt {
                    x_min: 10,
                    y_min: 10,
                    x_max: 14,
                    y_max: 14,
                }),
            },
        ]
    }

    fn loaded_model() -> PvsImageModel<SquarePredictor> {
        let mut model = PvsImageModel::new("pvs_image", SquarePredictor::new());
        model.load("cpu").unwrap();
        model
    }

    #[test]
    fn test_run_requires_load() {
        let mut model = PvsImageModel::new("pvs_image", SquarePredictor::new());
        let input = InferenceInput {
            task: task(prompts(), 1),
            frame_paths: vec![PathBuf::from("x.png")],
        };
        assert_eq!(model.run(&input), Err(ModelError::NotLoaded));
    }

    #[test]
    fn test_rejects_video_and_multi_frame_tasks() {
        let mut model = loaded_model();

        let mut video = task(prompts(), 1);
        video.video_options = Some(Default::default());
        let input = InferenceInput {
            task: video,
            frame_paths: vec![PathBuf::from("x.png")],
        };
        assert!(matches!(model.run(&input), Err(ModelError::UnsupportedTask(_))));

        let input = InferenceInput {
            task: task(prompts(), 1),
            frame_paths: vec![PathBuf::from("x.png"), PathBuf::from("y.png")],
        };
        assert!(matches!(model.run(&input), Err(ModelError::UnsupportedTask(_))));
    }

    #[test]
    fn test_unreadable_image_is_a_failure() {
        let dir = TempDir::new("model_open");
        let broken = dir.file("broken.png", b"nope");
        let mut model = loaded_model();
        let input = InferenceInput {
            task: task(prompts(), 1),
            frame_paths: vec![broken],
        };
        assert!(matches!(model.run(&input), Err(ModelError::ImageOpen { .. })));
    }

    #[test]
    fn test_runs_one_call_per_batch_and_merges() {
        let dir = TempDir::new("model_run");
        let path = dir.png("frame.png", 20, 20);
        let mut model = loaded_model();
        let input = InferenceInput {
            task: task(prompts(), 1),
            frame_paths: vec![path],
        };

        let output = model.run(&input).unwrap();
        let frame = &output.frames[&0];

        assert_eq!(
            model.predictor.calls,
            vec![(BatchKind::WithBox, false), (BatchKind::NoBox, false)]
        );
        assert_eq!(frame.instance_ids, Array1::from(vec![1u32, 0]));
        assert_eq!(frame.masks.dim(), (2, 20, 20));
        assert_eq!(frame.boxes.row(0).to_vec(), vec![10, 10, 10, 10]);
        assert_eq!(frame.boxes.row(1).to_vec(), vec![2, 3, 2, 3]);
    }

    #[test]
    fn test_multimask_keeps_best_scoring_candidates() {
        let dir = TempDir::new("model_multi");
        let path = dir.png("frame.png", 20, 20);
        let mut model = loaded_model();
        let input = InferenceInput {
            task: task(prompts(), 2),
            frame_paths: vec![path],
        };

        let output = model.run(&input).unwrap();
        let frame = &output.frames[&0];

        assert!(model.predictor.calls.iter().all(|(_, multi)| *multi));
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.instance_ids, Array1::from(vec![1u32, 1, 0, 0]));
        // Highest score is the largest square (m = 2)
        assert_eq!(frame.boxes.row(2).to_vec(), vec![2, 3, 4, 5]);
        assert_eq!(frame.boxes.row(3).to_vec(), vec![2, 3, 3, 4]);
    }

    #[test]
    fn test_missing_scores_is_a_failure() {
        let dir = TempDir::new("model_missing");
        let path = dir.png("frame.png", 20, 20);
        let mut model = loaded_model();
        model.predictor.drop_scores = true;
        let input = InferenceInput {
            task: task(prompts(), 1),
            frame_paths: vec![path],
        };
        assert_eq!(
            model.run(&input),
            Err(ModelError::malformed("no iou_scores"))
        );
    }

    #[test]
    fn test_empty_prompt_is_an_ordinary_result() {
        let dir = TempDir::new("model_empty");
        let path = dir.png("frame.png", 8, 8);
        let mut model = loaded_model();
        let input = InferenceInput {
            task: task(Vec::new(), 1),
            frame_paths: vec![path],
        };

        let output = model.run(&input).unwrap();
        let frame = &output.frames[&0];
        assert!(frame.is_empty());
        assert_eq!(
            frame.message.as_deref(),
            Some("No instances provided in frame prompt")
        );
    }
}
