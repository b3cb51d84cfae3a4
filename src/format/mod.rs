//! Project persistence: `annotations.json` plus rendered mask images.

mod error;
mod masks;
mod project;

pub use error::FormatError;
pub use masks::{
    frame_mask_path, instance_mask_dir, instance_mask_path, mask_from_image, mask_to_image,
    read_detections, restore_detections, write_masks,
};
pub use project::{BoxRecord, InstanceRecord, PointRecord, ProjectRecord, RestoreSummary};
