//! Instances (tracked objects) and the detections inference attaches to them.

use std::collections::BTreeMap;

use ndarray::Array2;

use super::annotation::PointXY;
use super::ids::{FrameId, InstanceId};

/// Model-produced box and optional mask for one instance on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub frame_id: FrameId,
    pub top_left: PointXY,
    pub bottom_right: PointXY,
    /// Boolean mask shaped `(height, width)`.
    pub mask: Option<Array2<bool>>,
}

impl Detection {
    pub fn new(
        frame_id: FrameId,
        top_left: PointXY,
        bottom_right: PointXY,
        mask: Option<Array2<bool>>,
    ) -> Self {
        Self {
            frame_id,
            top_left,
            bottom_right,
            mask,
        }
    }
}

/// An object the user tracks across frames.
///
/// Records are replaced wholesale on every change; the registry never hands
/// out mutable references to a stored instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub category: Option<String>,
    pub detections: BTreeMap<FrameId, Detection>,
}

impl Instance {
    pub fn new(id: InstanceId, name: impl Into<String>, category: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            detections: BTreeMap::new(),
        }
    }

    /// Detection for a frame, if inference produced one.
    pub fn detection(&self, frame_id: FrameId) -> Option<&Detection> {
        self.detections.get(&frame_id)
    }

    /// Mask for a frame, if inference produced one.
    pub fn mask(&self, frame_id: FrameId) -> Option<&Array2<bool>> {
        self.detections.get(&frame_id)?.mask.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_lookup() {
        let mut instance = Instance::new(InstanceId(0), "cell", None);
        assert!(instance.mask(FrameId(0)).is_none());

        let mask = Array2::from_elem((4, 4), true);
        instance.detections.insert(
            FrameId(0),
            Detection::new(FrameId(0), (0, 0), (3, 3), Some(mask.clone())),
        );
        instance
            .detections
            .insert(FrameId(1), Detection::new(FrameId(1), (1, 1), (2, 2), None));

        assert_eq!(instance.mask(FrameId(0)), Some(&mask));
        assert!(instance.mask(FrameId(1)).is_none());
        assert!(instance.detection(FrameId(1)).is_some());
    }
}
