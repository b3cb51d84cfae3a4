//! Mask images next to `annotations.json`.
//!
//! Layout under the project folder:
//!
//! - `masks/frame_<frame id>.png`: union of every instance's mask on the frame
//! - `masks/instance_<instance id>/frame_<frame id>.png`: one instance's mask
//!
//! Masks are 8-bit greyscale, 255 inside and 0 outside.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use ndarray::Array2;

use super::error::FormatError;
use crate::constants::MASKS_DIRNAME;
use crate::inference::bbox_from_mask;
use crate::model::{Detection, FrameId, InstanceId};
use crate::state::{InstanceRegistry, InstanceUpdate};

pub fn frame_mask_path(project_dir: &Path, frame_id: FrameId) -> PathBuf {
    project_dir
        .join(MASKS_DIRNAME)
        .join(format!("frame_{}.png", frame_id))
}

pub fn instance_mask_dir(project_dir: &Path, instance_id: InstanceId) -> PathBuf {
    project_dir
        .join(MASKS_DIRNAME)
        .join(format!("instance_{}", instance_id))
}

pub fn instance_mask_path(project_dir: &Path, instance_id: InstanceId, frame_id: FrameId) -> PathBuf {
    instance_mask_dir(project_dir, instance_id).join(format!("frame_{}.png", frame_id))
}

/// Render a `(height, width)` mask as a greyscale image.
pub fn mask_to_image(mask: &Array2<bool>) -> GrayImage {
    let (height, width) = mask.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if mask[[y as usize, x as usize]] {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Read a greyscale mask back; anything brighter than mid-grey is inside.
pub fn mask_from_image(image: &GrayImage) -> Array2<bool> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        image.get_pixel(x as u32, y as u32).0[0] > 127
    })
}

/// Write every instance mask plus the per-frame unions.
///
/// Returns the paths written. Masks whose size differs from the first mask
/// seen on the same frame are left out of that frame's union.
pub fn write_masks(project_dir: &Path, instances: &InstanceRegistry) -> Result<Vec<PathBuf>, FormatError> {
    let mut written = Vec::new();
    let mut unions: BTreeMap<FrameId, Array2<bool>> = BTreeMap::new();

    for info in instances.iter() {
        for (frame_id, detection) in &info.instance.detections {
            let Some(mask) = &detection.mask else {
                continue;
            };

            let path = instance_mask_path(project_dir, info.id(), *frame_id);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            mask_to_image(mask).save_with_format(&path, image::ImageFormat::Png)?;
            written.push(path);

            match unions.get_mut(frame_id) {
                Some(union) if union.dim() == mask.dim() => {
                    union.zip_mut_with(mask, |u, &m| *u |= m);
                }
                Some(union) => log::warn!(
                    "Mask of instance {} on frame {} is {:?}, expected {:?}; left out of the frame mask",
                    info.id(),
                    frame_id,
                    mask.dim(),
                    union.dim()
                ),
                None => {
                    unions.insert(*frame_id, mask.clone());
                }
            }
        }
    }

    for (frame_id, union) in &unions {
        let path = frame_mask_path(project_dir, *frame_id);
        mask_to_image(union).save_with_format(&path, image::ImageFormat::Png)?;
        written.push(path);
    }

    log::info!("Wrote {} mask images to {:?}", written.len(), project_dir);
    Ok(written)
}

/// Parse `frame_<id>.png`.
fn frame_id_from_file_name(path: &Path) -> Option<FrameId> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix("frame_")?.strip_suffix(".png")?;
    id.parse().ok().map(FrameId)
}

/// Rebuild one instance's detections from its saved masks.
///
/// A missing mask folder yields no detections.
pub fn read_detections(
    project_dir: &Path,
    instance_id: InstanceId,
) -> Result<BTreeMap<FrameId, Detection>, FormatError> {
    let dir = instance_mask_dir(project_dir, instance_id);
    let mut detections = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(detections);
    }

    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        let Some(frame_id) = frame_id_from_file_name(&path) else {
            log::debug!("Ignoring {:?} in mask folder", path);
            continue;
        };
        let mask = mask_from_image(&image::open(&path)?.to_luma8());
        let [x_min, y_min, x_max, y_max] = bbox_from_mask(mask.view());
        detections.insert(
            frame_id,
            Detection::new(frame_id, (x_min, y_min), (x_max, y_max), Some(mask)),
        );
    }
    Ok(detections)
}

/// Put saved detections back on every instance in the registry.
///
/// Detections for frames not in `open_frames` are dropped. Returns the
/// number of detections restored.
pub fn restore_detections(
    project_dir: &Path,
    instances: &mut InstanceRegistry,
    open_frames: impl Fn(FrameId) -> bool,
) -> Result<usize, FormatError> {
    let mut restored = 0;
    for instance_id in instances.all_ids() {
        let mut detections = read_detections(project_dir, instance_id)?;
        detections.retain(|frame_id, _| open_frames(*frame_id));
        if detections.is_empty() {
            continue;
        }
        restored += detections.len();
        if let Err(e) = instances.update(instance_id, InstanceUpdate::new().detections(detections)) {
            log::warn!("Cannot restore detections: {}", e);
        }
    }
    Ok(restored)
}
