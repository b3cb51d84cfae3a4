//! Application controller.
//!
//! `Session` owns the frame sequence, the annotation store, the instance
//! registry and the model controller, and wires the operations that span
//! them: cascading deletes, placing prompts on the current frame for the
//! current instance, running inference and folding results back, and
//! saving/loading projects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::config::{AppConfig, UserPreferences};
use crate::events::{AnnotationEvent, FrameEvent, InstanceEvent};
use crate::format::{FormatError, ProjectRecord, RestoreSummary, restore_detections, write_masks};
use crate::inference::{
    ControllerError, InferenceRequest, InferenceResult, ModelBuilder, ModelController, ModelError,
    RequestError, RequestIdGenerator, VideoOptions, apply_inference_result, build_image_request,
    build_video_request,
};
use crate::model::{
    BoxAnnotation, BoxCorners, FrameId, InstanceId, PointAnnotation, PointKind, PointXY,
};
use crate::state::{
    AnnotationError, AnnotationStore, FrameSequencer, InstanceError, InstanceRegistry,
    InstanceUpdate,
};

/// Everything a session operation can fail with.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No frame selected")]
    NoCurrentFrame,

    #[error("No instance selected")]
    NoCurrentInstance,

    #[error("No model named '{0}' in the configuration")]
    UnknownModel(String),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one finished inference once applied to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceReport {
    pub request_id: String,
    /// Instances whose detections were replaced, or why the run failed
    pub outcome: Result<Vec<InstanceId>, ModelError>,
}

pub struct Session {
    config: AppConfig,
    frames: FrameSequencer,
    annotations: AnnotationStore,
    instances: InstanceRegistry,
    models: ModelController,
    request_ids: RequestIdGenerator,
}

impl Session {
    pub fn new(config: AppConfig) -> Self {
        let instances = InstanceRegistry::with_marker_size(config.preferences.marker_size);
        Self {
            config,
            frames: FrameSequencer::new(),
            annotations: AnnotationStore::new(),
            instances,
            models: ModelController::new(),
            request_ids: RequestIdGenerator::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.config.preferences
    }

    pub fn frames(&self) -> &FrameSequencer {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut FrameSequencer {
        &mut self.frames
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    /// Direct access for edits that need no cross-store wiring (moves,
    /// kind toggles, single deletes).
    pub fn annotations_mut(&mut self) -> &mut AnnotationStore {
        &mut self.annotations
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn models(&self) -> &ModelController {
        &self.models
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Open image files as the new sequence. Existing annotations are dropped.
    pub fn open_images<P: AsRef<Path>>(&mut self, paths: &[P]) -> usize {
        let filter = self.config.preferences.extension_filter();
        self.annotations.reset();
        self.frames.open_images(paths, &filter)
    }

    /// Open every image in a folder as the new sequence. Existing
    /// annotations are dropped.
    pub fn open_folder(&mut self, dir: &Path) -> Result<usize, SessionError> {
        let filter = self.config.preferences.extension_filter();
        let count = self.frames.open_folder(dir, &filter)?;
        self.annotations.reset();
        Ok(count)
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Create an instance and make it current.
    pub fn create_instance(
        &mut self,
        name: impl Into<String>,
        category: Option<String>,
    ) -> InstanceId {
        let id = self.instances.create(name, None, category);
        if let Err(e) = self.instances.set_current(Some(id)) {
            log::error!("Cannot select new instance {}: {}", id, e);
        }
        id
    }

    /// Delete an instance together with all of its annotations.
    pub fn delete_instance(&mut self, id: InstanceId) -> Result<(), SessionError> {
        if self.instances.delete(id).is_none() {
            return Err(InstanceError::Unknown(id).into());
        }
        let (points, boxes) = self.annotations.delete_instance(id);
        log::info!(
            "Deleted instance {} with {} points and {} boxes",
            id,
            points.len(),
            boxes.len()
        );
        Ok(())
    }

    pub fn update_instance(
        &mut self,
        id: InstanceId,
        update: InstanceUpdate,
    ) -> Result<bool, SessionError> {
        Ok(self.instances.update(id, update)?)
    }

    pub fn set_current_instance(&mut self, id: Option<InstanceId>) -> Result<bool, SessionError> {
        Ok(self.instances.set_current(id)?)
    }

    // =========================================================================
    // Annotations
    // =========================================================================

    fn current_target(&self) -> Result<(FrameId, InstanceId), SessionError> {
        let frame_id = self.frames.current_id().ok_or(SessionError::NoCurrentFrame)?;
        let instance_id = self
            .instances
            .current_instance_id()
            .ok_or(SessionError::NoCurrentInstance)?;
        Ok((frame_id, instance_id))
    }

    /// Click on the current frame for the current instance.
    ///
    /// `Ok(None)` when the pixel already holds a point.
    pub fn add_point(
        &mut self,
        position: PointXY,
        kind: PointKind,
    ) -> Result<Option<PointAnnotation>, SessionError> {
        let (frame_id, instance_id) = self.current_target()?;
        Ok(self
            .annotations
            .create_point(frame_id, instance_id, position, kind))
    }

    /// Drag a positive box on the current frame for the current instance,
    /// replacing the instance's previous box.
    pub fn add_box(&mut self, a: PointXY, b: PointXY) -> Result<BoxAnnotation, SessionError> {
        let (frame_id, instance_id) = self.current_target()?;
        Ok(self.annotations.create_box(
            frame_id,
            instance_id,
            BoxCorners::from_corners(a, b, PointKind::Positive),
        ))
    }

    // =========================================================================
    // Inference
    // =========================================================================

    pub fn register_model_builder(&mut self, model_type: impl Into<String>, builder: ModelBuilder) {
        self.models.register_builder(model_type, builder);
    }

    /// Load a model listed in the configuration on the configured device.
    pub fn load_model(&mut self, name: &str) -> Result<(), SessionError> {
        let entry = self
            .config
            .model(name)
            .ok_or_else(|| SessionError::UnknownModel(name.to_string()))?;
        self.models
            .load_model(&entry.name, &entry.path, &self.config.preferences.device)?;
        Ok(())
    }

    pub fn unload_model(&mut self) {
        self.models.unload_model();
    }

    fn loaded_model_name(&self) -> Result<String, SessionError> {
        Ok(self
            .models
            .model_name()
            .ok_or(ControllerError::NoModelLoaded)?
            .to_string())
    }

    fn current_frame_request(&mut self, model_name: &str) -> Result<InferenceRequest, SessionError> {
        let frame = self
            .frames
            .current_frame()
            .ok_or(SessionError::NoCurrentFrame)?;
        let mut request = build_image_request(
            String::new(),
            frame,
            &self.annotations,
            self.config.preferences.mask_options(),
        )?;
        // Only requests that were actually built consume an id
        request.request_id = self.request_ids.next_id(model_name);
        Ok(request)
    }

    /// Segment the current frame. Returns the request id.
    pub fn run_inference(&mut self) -> Result<String, SessionError> {
        let model_name = self.loaded_model_name()?;
        let request = self.current_frame_request(&model_name)?;
        let request_id = request.request_id.clone();
        self.models.run_inference(request)?;
        log::info!("Started inference {}", request_id);
        Ok(request_id)
    }

    /// Segment the whole sequence as a video. Returns the request id.
    pub fn run_video_inference(&mut self, options: VideoOptions) -> Result<String, SessionError> {
        let model_name = self.loaded_model_name()?;
        let mut request = build_video_request(
            String::new(),
            self.frames.frames(),
            &self.annotations,
            self.config.preferences.mask_options(),
            options,
        )?;
        request.request_id = self.request_ids.next_id(&model_name);
        let request_id = request.request_id.clone();
        self.models.run_inference(request)?;
        log::info!("Started video inference {}", request_id);
        Ok(request_id)
    }

    fn apply(&mut self, result: InferenceResult) -> InferenceReport {
        let outcome = apply_inference_result(&mut self.instances, &result);
        if let Ok(updated) = &outcome {
            log::info!(
                "Inference {} updated {} instances",
                result.request.request_id,
                updated.len()
            );
        }
        InferenceReport {
            request_id: result.request.request_id,
            outcome,
        }
    }

    /// Apply every finished inference. Non-blocking.
    pub fn poll(&mut self) -> Vec<InferenceReport> {
        let results = self.models.poll();
        results.into_iter().map(|r| self.apply(r)).collect()
    }

    /// Wait up to `timeout` for the outstanding inference and apply it.
    pub fn wait_for_inference(&mut self, timeout: Duration) -> Option<InferenceReport> {
        let result = self.models.wait_for_result(timeout)?;
        Some(self.apply(result))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write `annotations.json` and the mask images into `dir`.
    pub fn save_project(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let record = ProjectRecord::capture(&self.frames, &self.annotations, &self.instances);
        let path = record.save(dir)?;
        write_masks(dir, &self.instances)?;
        Ok(path)
    }

    /// Replace the session state with the project saved in `dir`.
    pub fn load_project(&mut self, dir: &Path) -> Result<RestoreSummary, SessionError> {
        let record = ProjectRecord::load(dir)?;
        let summary = record.restore(&mut self.frames, &mut self.annotations, &mut self.instances);

        let frames = &self.frames;
        let detections =
            restore_detections(dir, &mut self.instances, |id| frames.frame(id).is_some())?;
        log::info!("Restored {} detections from {:?}", detections, dir);
        Ok(summary)
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn take_annotation_events(&mut self) -> Vec<AnnotationEvent> {
        self.annotations.take_events()
    }

    pub fn take_instance_events(&mut self) -> Vec<InstanceEvent> {
        self.instances.take_events()
    }

    pub fn take_frame_events(&mut self) -> Vec<FrameEvent> {
        self.frames.take_events()
    }
}
