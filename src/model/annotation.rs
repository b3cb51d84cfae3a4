//! Point and box prompt annotations.

use serde::{Deserialize, Serialize};

use super::ids::{BoxId, FrameId, InstanceId, PointId};

/// Pixel position `(x, y)` from the top-left corner of the image.
pub type PointXY = (i32, i32);

/// Whether a prompt marks the object (positive) or the background (negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PointKind {
    Negative,
    Positive,
}

impl PointKind {
    /// The other kind.
    pub fn flipped(self) -> Self {
        match self {
            PointKind::Negative => PointKind::Positive,
            PointKind::Positive => PointKind::Negative,
        }
    }

    /// Label used by the model: 1 for positive, 0 for negative.
    pub fn label(self) -> i32 {
        match self {
            PointKind::Negative => 0,
            PointKind::Positive => 1,
        }
    }

    pub fn is_positive(self) -> bool {
        self == PointKind::Positive
    }
}

impl From<PointKind> for u8 {
    fn from(kind: PointKind) -> Self {
        match kind {
            PointKind::Negative => 0,
            PointKind::Positive => 1,
        }
    }
}

impl TryFrom<u8> for PointKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PointKind::Negative),
            1 => Ok(PointKind::Positive),
            other => Err(format!("invalid point kind {}", other)),
        }
    }
}

/// Axis-aligned box given by two inclusive pixel corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxCorners {
    pub top_left: PointXY,
    pub bottom_right: PointXY,
    pub kind: PointKind,
}

impl BoxCorners {
    pub fn new(top_left: PointXY, bottom_right: PointXY, kind: PointKind) -> Self {
        Self {
            top_left,
            bottom_right,
            kind,
        }
    }

    /// Build a box from two arbitrary corners, normalising their order.
    pub fn from_corners(a: PointXY, b: PointXY, kind: PointKind) -> Self {
        Self {
            top_left: (a.0.min(b.0), a.1.min(b.1)),
            bottom_right: (a.0.max(b.0), a.1.max(b.1)),
            kind,
        }
    }
}

/// A user click tied to one frame and one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointAnnotation {
    pub id: PointId,
    pub frame_id: FrameId,
    pub instance_id: InstanceId,
    pub position: PointXY,
    pub kind: PointKind,
}

impl PointAnnotation {
    /// Copy of this annotation at another position.
    pub fn with_position(self, position: PointXY) -> Self {
        Self { position, ..self }
    }

    /// Copy of this annotation with another kind.
    pub fn with_kind(self, kind: PointKind) -> Self {
        Self { kind, ..self }
    }
}

/// A user-drawn box tied to one frame and one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxAnnotation {
    pub id: BoxId,
    pub frame_id: FrameId,
    pub instance_id: InstanceId,
    pub corners: BoxCorners,
}

impl BoxAnnotation {
    pub fn top_left(&self) -> PointXY {
        self.corners.top_left
    }

    pub fn bottom_right(&self) -> PointXY {
        self.corners.bottom_right
    }

    pub fn kind(&self) -> PointKind {
        self.corners.kind
    }
}
