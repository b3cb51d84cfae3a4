//! Background thread that owns the segmentation model.
//!
//! `ModelWorker` runs load, unload and inference on a dedicated thread so a
//! multi-second model call never blocks the control thread. Commands go in
//! over one channel and events come back over another. Nothing else is
//! shared between the two sides.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use web_time::Instant;

use super::error::{ControllerError, ModelError};
use super::model::SegmentationModel;
use super::task::{InferenceInput, InferenceOutput};

/// Message sent to the worker thread.
pub enum WorkerCommand {
    /// Take ownership of a model and load it on a device
    Load(Box<dyn SegmentationModel>, String),
    /// Unload and drop the current model
    Unload,
    /// Run inference
    Run {
        request_id: String,
        input: InferenceInput,
    },
    /// Stop the thread
    Shutdown,
}

/// Message sent back from the worker thread.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Diagnostic to forward to the user
    Log(String),
    /// Answer to a `Run` command
    Inference {
        request_id: String,
        output: Result<InferenceOutput, ModelError>,
    },
}

/// Handle to the model thread.
pub struct ModelWorker {
    command_tx: Sender<WorkerCommand>,
    event_rx: Receiver<WorkerEvent>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ModelWorker {
    /// Spawn a new worker thread with no model.
    pub fn spawn() -> Result<Self, ControllerError> {
        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>();

        let thread_handle = thread::Builder::new()
            .name("model-worker".to_string())
            .spawn(move || {
                log::info!("Model worker thread started");
                Self::thread_loop(command_rx, event_tx);
                log::info!("Model worker thread exiting");
            })
            .map_err(|e| ControllerError::Spawn(e.to_string()))?;

        Ok(Self {
            command_tx,
            event_rx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Worker thread main loop.
    fn thread_loop(command_rx: Receiver<WorkerCommand>, event_tx: Sender<WorkerEvent>) {
        let mut model: Option<Box<dyn SegmentationModel>> = None;

        loop {
            let event = match command_rx.recv() {
                Ok(WorkerCommand::Load(mut new_model, device)) => {
                    if let Some(mut old) = model.take() {
                        old.unload();
                    }
                    let name = new_model.name().to_string();
                    let started = Instant::now();
                    let loaded = catch_model_panic(|| new_model.load(&device));
                    model = Some(new_model);
                    match loaded {
                        Ok(()) => {
                            log::info!(
                                "Loaded model '{}' on {} in {:?}",
                                name,
                                device,
                                started.elapsed()
                            );
                            None
                        }
                        Err(e) => Some(WorkerEvent::Log(format!(
                            "Loading model '{}' failed: {}",
                            name, e
                        ))),
                    }
                }
                Ok(WorkerCommand::Unload) => {
                    if let Some(mut old) = model.take() {
                        old.unload();
                        log::info!("Unloaded model '{}'", old.name());
                    }
                    None
                }
                Ok(WorkerCommand::Run { request_id, input }) => {
                    let output = match model.as_mut() {
                        Some(m) if m.ready() => {
                            let started = Instant::now();
                            let output = catch_model_panic(|| m.run(&input));
                            log::info!(
                                "Inference {} finished in {:?}",
                                request_id,
                                started.elapsed()
                            );
                            output
                        }
                        _ => Err(ModelError::NotLoaded),
                    };
                    Some(WorkerEvent::Inference { request_id, output })
                }
                Ok(WorkerCommand::Shutdown) => {
                    log::debug!("Received shutdown signal");
                    break;
                }
                Err(_) => {
                    log::debug!("Command channel closed, model worker exiting");
                    break;
                }
            };

            if let Some(event) = event {
                if event_tx.send(event).is_err() {
                    log::debug!("Event channel closed, model worker exiting");
                    break;
                }
            }
        }

        if let Some(mut old) = model.take() {
            old.unload();
        }
    }

    /// Queue a command for the worker.
    pub fn send(&self, command: WorkerCommand) -> Result<(), ControllerError> {
        self.command_tx
            .send(command)
            .map_err(|_| ControllerError::WorkerGone)
    }

    /// Take one event if available. Non-blocking.
    pub fn try_next_event(&self) -> Option<WorkerEvent> {
        match self.event_rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::warn!("Model worker disconnected");
                None
            }
        }
    }

    /// Wait up to `timeout` for one event.
    pub fn next_event_timeout(&self, timeout: Duration) -> Option<WorkerEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("Model worker disconnected");
                None
            }
        }
    }

    /// Ask the thread to stop without waiting for it.
    ///
    /// Used while a run is in flight: the thread finishes the current model
    /// call, finds the event channel closed and exits on its own.
    pub fn detach(mut self) {
        if let Some(handle) = self.thread_handle.take() {
            log::debug!("Detaching model worker");
            let _ = self.command_tx.send(WorkerCommand::Shutdown);
            drop(handle);
        }
    }
}

impl Drop for ModelWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            log::debug!("Shutting down model worker");
            let _ = self.command_tx.send(WorkerCommand::Unload);
            let _ = self.command_tx.send(WorkerCommand::Shutdown);

            if let Err(e) = handle.join() {
                log::error!("Model worker thread panicked: {:?}", e);
            }
        }
    }
}

/// Run a model call, turning a panic into [`ModelError::Panicked`].
fn catch_model_panic<T>(
    f: impl FnOnce() -> Result<T, ModelError>,
) -> Result<T, ModelError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ModelError::Panicked(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::task::{FrameInferenceOutput, MaskOutputOptions, PvsTask};
    use std::path::PathBuf;

    struct EchoModel {
        loaded: bool,
        panic_on_run: bool,
        delay: Duration,
    }

    impl EchoModel {
        fn new() -> Self {
            Self {
                loaded: false,
                panic_on_run: false,
                delay: Duration::ZERO,
            }
        }
    }

    impl SegmentationModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        fn ready(&self) -> bool {
            self.loaded
        }

        fn load(&mut self, _device: &str) -> Result<(), ModelError> {
            self.loaded = true;
            Ok(())
        }

        fn unload(&mut self) {
            self.loaded = false;
        }

        fn run(&mut self, input: &InferenceInput) -> Result<InferenceOutput, ModelError> {
            if self.panic_on_run {
                panic!("tensor exploded");
            }
            thread::sleep(self.delay);
            Ok(InferenceOutput::single(FrameInferenceOutput::empty(
                input.frame_paths.len(),
                "echo",
            )))
        }
    }

    fn input() -> InferenceInput {
        InferenceInput {
            task: PvsTask {
                frame_prompts: Vec::new(),
                video_options: None,
                output_options: MaskOutputOptions::default(),
            },
            frame_paths: vec![PathBuf::from("a.png")],
        }
    }

    fn run(worker: &ModelWorker, id: &str) -> Result<InferenceOutput, ModelError> {
        worker
            .send(WorkerCommand::Run {
                request_id: id.to_string(),
                input: input(),
            })
            .unwrap();
        loop {
            match worker.next_event_timeout(Duration::from_secs(5)) {
                Some(WorkerEvent::Inference { request_id, output }) => {
                    assert_eq!(request_id, id);
                    return output;
                }
                Some(WorkerEvent::Log(_)) => continue,
                None => panic!("no answer from worker"),
            }
        }
    }

    #[test]
    fn test_run_without_model() {
        let worker = ModelWorker::spawn().unwrap();
        assert_eq!(run(&worker, "r:0"), Err(ModelError::NotLoaded));
    }

    #[test]
    fn test_load_then_run() {
        let worker = ModelWorker::spawn().unwrap();
        let model = EchoModel::new();
        worker
            .send(WorkerCommand::Load(Box::new(model), "cpu".into()))
            .unwrap();

        let output = run(&worker, "r:1").unwrap();
        assert_eq!(output.frames[&1].message.as_deref(), Some("echo"));

        worker.send(WorkerCommand::Unload).unwrap();
        assert_eq!(run(&worker, "r:2"), Err(ModelError::NotLoaded));
    }

    #[test]
    fn test_panic_is_reported() {
        let worker = ModelWorker::spawn().unwrap();
        let model = EchoModel {
            panic_on_run: true,
            ..EchoModel::new()
        };
        worker
            .send(WorkerCommand::Load(Box::new(model), "cpu".into()))
            .unwrap();

        assert_eq!(
            run(&worker, "r:3"),
            Err(ModelError::Panicked("tensor exploded".into()))
        );
        // Thread survives the panic
        assert!(matches!(run(&worker, "r:4"), Err(ModelError::Panicked(_))));
    }

    #[test]
    fn test_detach_does_not_wait_for_a_running_model() {
        let worker = ModelWorker::spawn().unwrap();
        let model = EchoModel {
            delay: Duration::from_secs(2),
            ..EchoModel::new()
        };
        worker
            .send(WorkerCommand::Load(Box::new(model), "cpu".into()))
            .unwrap();
        worker
            .send(WorkerCommand::Run {
                request_id: "r:5".into(),
                input: input(),
            })
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        worker.detach();
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
