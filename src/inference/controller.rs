//! Control-thread side of the model boundary.
//!
//! `ModelController` owns the [`ModelWorker`] and the map correlating
//! outstanding request ids with the requests that produced them. Only one
//! request may be outstanding at a time. Results are collected by polling
//! from the control thread, so the correlation map is never shared across
//! threads.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use web_time::Instant;

use super::error::{ControllerError, ModelError};
use super::model::{ModelBuilder, SegmentationModel};
use super::request::InferenceRequest;
use super::task::InferenceOutput;
use super::worker::{ModelWorker, WorkerCommand, WorkerEvent};

/// A finished request paired with what the model returned.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub request: InferenceRequest,
    pub output: Result<InferenceOutput, ModelError>,
}

#[derive(Default)]
pub struct ModelController {
    worker: Option<ModelWorker>,
    builders: HashMap<String, ModelBuilder>,
    active_requests: HashMap<String, InferenceRequest>,
    model_name: Option<String>,
}

impl ModelController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register how to build models of a given type.
    pub fn register_builder(&mut self, model_type: impl Into<String>, builder: ModelBuilder) {
        self.builders.insert(model_type.into(), builder);
    }

    pub fn model_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Build a model of `model_type` from `path` and load it on `device`.
    pub fn load_model(
        &mut self,
        model_type: &str,
        path: &Path,
        device: &str,
    ) -> Result<(), ControllerError> {
        let builder = self
            .builders
            .get(model_type)
            .ok_or_else(|| ControllerError::UnknownModelType(model_type.to_string()))?;
        let model = builder(path).ok_or_else(|| ControllerError::BuilderFailed {
            model_type: model_type.to_string(),
            path: path.to_path_buf(),
        })?;
        self.load(model, device)
    }

    /// Load an already built model on a fresh worker.
    ///
    /// Any previous worker is shut down first and its outstanding requests
    /// are aborted.
    pub fn load(
        &mut self,
        model: Box<dyn SegmentationModel>,
        device: &str,
    ) -> Result<(), ControllerError> {
        self.stop_worker();

        let worker = ModelWorker::spawn()?;
        let name = model.name().to_string();
        worker.send(WorkerCommand::Load(model, device.to_string()))?;
        log::info!("Loading model '{}' on {}", name, device);

        self.worker = Some(worker);
        self.model_name = Some(name);
        Ok(())
    }

    /// Shut the worker down, dropping outstanding requests.
    pub fn unload_model(&mut self) {
        if self.worker.is_some() {
            self.stop_worker();
            log::info!("Model unloaded");
        }
    }

    fn stop_worker(&mut self) {
        for request_id in self.active_requests.keys() {
            log::warn!(
                "Aborting active inference request {} due to model unload",
                request_id
            );
        }
        if let Some(worker) = self.worker.take() {
            if self.active_requests.is_empty() {
                // Idle: unload the model and join the thread
                drop(worker);
            } else {
                // A run is in flight, its late result is discarded
                worker.detach();
            }
        }
        self.active_requests.clear();
        self.model_name = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.worker.is_some()
    }

    /// Name of the loaded model.
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    // =========================================================================
    // Inference
    // =========================================================================

    /// Hand a request to the worker.
    ///
    /// Rejected without a worker, or while another request is outstanding.
    pub fn run_inference(&mut self, request: InferenceRequest) -> Result<(), ControllerError> {
        let Some(worker) = &self.worker else {
            return Err(ControllerError::NoModelLoaded);
        };
        if let Some(request_id) = self.active_requests.keys().next() {
            return Err(ControllerError::Busy {
                request_id: request_id.clone(),
            });
        }

        worker.send(WorkerCommand::Run {
            request_id: request.request_id.clone(),
            input: request.input.clone(),
        })?;
        log::debug!("Sent inference request {}", request.request_id);
        self.active_requests
            .insert(request.request_id.clone(), request);
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        !self.active_requests.is_empty()
    }

    pub fn active_request_ids(&self) -> Vec<&str> {
        self.active_requests.keys().map(String::as_str).collect()
    }

    /// Collect every result that is ready. Non-blocking.
    pub fn poll(&mut self) -> Vec<InferenceResult> {
        let mut results = Vec::new();
        while let Some(event) = self.worker.as_ref().and_then(ModelWorker::try_next_event) {
            if let Some(result) = self.handle_event(event) {
                results.push(result);
            }
        }
        results
    }

    /// Block until a result arrives or `timeout` elapses.
    pub fn wait_for_result(&mut self, timeout: Duration) -> Option<InferenceResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let event = self.worker.as_ref()?.next_event_timeout(remaining)?;
            if let Some(result) = self.handle_event(event) {
                return Some(result);
            }
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) -> Option<InferenceResult> {
        match event {
            WorkerEvent::Log(message) => {
                log::info!("Worker: {}", message);
                None
            }
            WorkerEvent::Inference { request_id, output } => {
                match self.active_requests.remove(&request_id) {
                    Some(request) => Some(InferenceResult { request, output }),
                    None => {
                        log::warn!(
                            "Received inference result for unknown request ID '{}'",
                            request_id
                        );
                        None
                    }
                }
            }
        }
    }
}
