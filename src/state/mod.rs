//! Application state: frames, annotations and instances.
//!
//! All three stores are single-writer and meant to be driven from one
//! control thread. Each owns its identifier counter and an outbound event
//! queue drained with `take_events()`.

mod annotations;
mod error;
mod frames;
mod instances;

pub use annotations::AnnotationStore;
pub use error::{AnnotationError, InstanceError};
pub use frames::{ExtensionFilter, Frame, FrameSequencer, FrameStub, ImageInfo, frame_stubs_from_paths};
pub use instances::{InstanceInfo, InstanceRegistry, InstanceUpdate};
