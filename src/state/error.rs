//! Error types for the annotation store and instance registry.

use thiserror::Error;

use crate::model::{BoxId, FrameId, InstanceId, PointId, PointXY};

/// Rejected annotation operations.
///
/// These indicate a caller bug: the UI is expected to check `can_move`
/// and only reference live ids.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    /// Destination pixel already holds another point on that frame
    #[error("Position {position:?} on frame {frame_id} is occupied by point {occupant}")]
    Occupied {
        frame_id: FrameId,
        position: PointXY,
        occupant: PointId,
    },

    /// Point id does not exist
    #[error("Unknown point {0}")]
    UnknownPoint(PointId),

    /// Box id does not exist
    #[error("Unknown box {0}")]
    UnknownBox(BoxId),

    /// Replayed point id is already live
    #[error("Point {0} already exists")]
    DuplicatePoint(PointId),

    /// Replayed box id is already live
    #[error("Box {0} already exists")]
    DuplicateBox(BoxId),
}

impl AnnotationError {
    pub fn occupied(frame_id: FrameId, position: PointXY, occupant: PointId) -> Self {
        Self::Occupied {
            frame_id,
            position,
            occupant,
        }
    }
}

/// Rejected instance registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    /// Instance id does not exist
    #[error("Unknown instance {0}")]
    Unknown(InstanceId),

    /// Replayed instance id is already live
    #[error("Instance {0} already exists")]
    Duplicate(InstanceId),
}
