//! Data models for the labeling core.

mod annotation;
mod ids;
mod instance;

pub use annotation::{BoxAnnotation, BoxCorners, PointAnnotation, PointKind, PointXY};
pub use ids::{BoxId, FrameId, IdAllocator, InstanceId, PointId, RawId};
pub use instance::{Detection, Instance};
