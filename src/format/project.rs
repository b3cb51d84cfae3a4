//! The saved project: `annotations.json` in a project folder.
//!
//! # Versioning
//!
//! The record uses semantic versioning (MAJOR.MINOR.PATCH). Version 0.x.x is
//! unstable: any 0.x file is read, but only a matching minor version is
//! considered fully compatible.
//!
//! Only frames that carry annotations are saved. Instances are saved by id,
//! name and category; colours and display toggles are not persisted.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::FormatError;
use crate::constants::PROJECT_FILENAME;
use crate::model::{
    BoxAnnotation, BoxCorners, BoxId, FrameId, InstanceId, PointAnnotation, PointId, PointKind,
};
use crate::state::{AnnotationStore, FrameSequencer, FrameStub, InstanceRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: InstanceId,
    pub instance_name: String,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRecord {
    pub point_id: PointId,
    pub frame_id: FrameId,
    pub instance_id: InstanceId,
    pub position: [i32; 2],
    pub kind: PointKind,
}

impl From<&PointAnnotation> for PointRecord {
    fn from(point: &PointAnnotation) -> Self {
        Self {
            point_id: point.id,
            frame_id: point.frame_id,
            instance_id: point.instance_id,
            position: [point.position.0, point.position.1],
            kind: point.kind,
        }
    }
}

impl From<PointRecord> for PointAnnotation {
    fn from(record: PointRecord) -> Self {
        Self {
            id: record.point_id,
            frame_id: record.frame_id,
            instance_id: record.instance_id,
            position: (record.position[0], record.position[1]),
            kind: record.kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub bbox_id: BoxId,
    pub frame_id: FrameId,
    pub instance_id: InstanceId,
    pub top_left: [i32; 2],
    pub bottom_right: [i32; 2],
    pub kind: PointKind,
}

impl From<&BoxAnnotation> for BoxRecord {
    fn from(bbox: &BoxAnnotation) -> Self {
        let (top_left, bottom_right) = (bbox.top_left(), bbox.bottom_right());
        Self {
            bbox_id: bbox.id,
            frame_id: bbox.frame_id,
            instance_id: bbox.instance_id,
            top_left: [top_left.0, top_left.1],
            bottom_right: [bottom_right.0, bottom_right.1],
            kind: bbox.kind(),
        }
    }
}

impl From<BoxRecord> for BoxAnnotation {
    fn from(record: BoxRecord) -> Self {
        Self {
            id: record.bbox_id,
            frame_id: record.frame_id,
            instance_id: record.instance_id,
            corners: BoxCorners::new(
                (record.top_left[0], record.top_left[1]),
                (record.bottom_right[0], record.bottom_right[1]),
                record.kind,
            ),
        }
    }
}

/// What a restore put back, and what it had to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub frames: usize,
    pub instances: usize,
    pub points: usize,
    pub boxes: usize,
    pub skipped_frames: Vec<FrameId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub version: String,
    /// Load descriptor of every frame with annotations.
    pub frames: BTreeMap<FrameId, PathBuf>,
    pub instances: BTreeMap<InstanceId, InstanceRecord>,
    pub point_annotations: BTreeMap<FrameId, Vec<PointRecord>>,
    #[serde(default)]
    pub box_annotations: BTreeMap<FrameId, Vec<BoxRecord>>,
}

impl ProjectRecord {
    pub const CURRENT_VERSION: &'static str = "0.1.0";

    /// Parse a version string into (major, minor, patch) components.
    pub fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
        let parts: Vec<&str> = version.split('.').collect();
        if parts.len() != 3 {
            return None;
        }
        Some((
            parts[0].parse().ok()?,
            parts[1].parse().ok()?,
            parts[2].parse().ok()?,
        ))
    }

    /// Whether a file of this version can be read at all.
    pub fn is_version_readable(file_version: &str) -> bool {
        matches!(Self::parse_version(file_version), Some((0, _, _)))
    }

    /// Whether a file of this version is read without loss.
    pub fn is_version_compatible(file_version: &str) -> bool {
        match (
            Self::parse_version(file_version),
            Self::parse_version(Self::CURRENT_VERSION),
        ) {
            (Some((major, minor, _)), Some((cur_major, cur_minor, _))) => {
                major == cur_major && minor == cur_minor
            }
            _ => false,
        }
    }

    /// Snapshot the annotated part of a session.
    pub fn capture(
        frames: &FrameSequencer,
        annotations: &AnnotationStore,
        instances: &InstanceRegistry,
    ) -> Self {
        let mut record = Self {
            version: Self::CURRENT_VERSION.to_string(),
            frames: BTreeMap::new(),
            instances: BTreeMap::new(),
            point_annotations: BTreeMap::new(),
            box_annotations: BTreeMap::new(),
        };

        for frame_id in annotations.frames_with_annotations() {
            let Some(path) = frames.frame_load_info(frame_id) else {
                log::warn!("Annotations on frame {} which is not open, not saved", frame_id);
                continue;
            };
            record.frames.insert(frame_id, path.to_path_buf());
            record.point_annotations.insert(
                frame_id,
                annotations
                    .points_for_frame(frame_id)
                    .iter()
                    .map(PointRecord::from)
                    .collect(),
            );
            let boxes = annotations.boxes_for_frame(frame_id);
            if !boxes.is_empty() {
                record
                    .box_annotations
                    .insert(frame_id, boxes.iter().map(BoxRecord::from).collect());
            }
        }

        for info in instances.iter() {
            record.instances.insert(
                info.id(),
                InstanceRecord {
                    instance_id: info.id(),
                    instance_name: info.name().to_string(),
                    category_name: info.category().map(str::to_string),
                },
            );
        }

        record
    }

    pub fn point_count(&self) -> usize {
        self.point_annotations.values().map(Vec::len).sum()
    }

    pub fn box_count(&self) -> usize {
        self.box_annotations.values().map(Vec::len).sum()
    }

    /// Write `annotations.json` into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, FormatError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(PROJECT_FILENAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        log::info!(
            "Saved {} frames, {} instances, {} points and {} boxes to {:?}",
            self.frames.len(),
            self.instances.len(),
            self.point_count(),
            self.box_count(),
            path
        );
        Ok(path)
    }

    /// Read `annotations.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, FormatError> {
        let path = dir.join(PROJECT_FILENAME);
        log::info!("Loading project from {:?}", path);

        let json = std::fs::read_to_string(&path)?;
        let record: Self = serde_json::from_str(&json)?;

        if !Self::is_version_readable(&record.version) {
            return Err(FormatError::VersionMismatch {
                expected: Self::CURRENT_VERSION.to_string(),
                found: record.version,
            });
        }
        if !Self::is_version_compatible(&record.version) {
            log::warn!(
                "Project version {} may not be fully compatible with current version {}",
                record.version,
                Self::CURRENT_VERSION
            );
        }
        record.validate()?;
        Ok(record)
    }

    /// Check that every annotation sits under the frame it names.
    fn validate(&self) -> Result<(), FormatError> {
        for (frame_id, points) in &self.point_annotations {
            if let Some(p) = points.iter().find(|p| p.frame_id != *frame_id) {
                return Err(FormatError::invalid_format(format!(
                    "point {} of frame {} listed under frame {}",
                    p.point_id, p.frame_id, frame_id
                )));
            }
        }
        for (frame_id, boxes) in &self.box_annotations {
            if let Some(b) = boxes.iter().find(|b| b.frame_id != *frame_id) {
                return Err(FormatError::invalid_format(format!(
                    "box {} of frame {} listed under frame {}",
                    b.bbox_id, b.frame_id, frame_id
                )));
            }
        }
        for (id, instance) in &self.instances {
            if instance.instance_id != *id {
                return Err(FormatError::invalid_format(format!(
                    "instance {} stored under key {}",
                    instance.instance_id, id
                )));
            }
        }
        Ok(())
    }

    /// Replace the session state with this record, keeping persisted ids.
    ///
    /// Frames whose image can no longer be read are skipped together with
    /// their annotations. Annotations that reference an unknown instance or
    /// collide with one already restored are dropped with a warning.
    pub fn restore(
        self,
        frames: &mut FrameSequencer,
        annotations: &mut AnnotationStore,
        instances: &mut InstanceRegistry,
    ) -> RestoreSummary {
        let mut summary = RestoreSummary::default();

        annotations.reset();
        instances.reset();

        let mut stubs = Vec::with_capacity(self.frames.len());
        for (frame_id, path) in &self.frames {
            match FrameStub::probe(path) {
                Some(stub) => stubs.push((*frame_id, stub)),
                None => summary.skipped_frames.push(*frame_id),
            }
        }
        summary.frames = stubs.len();
        let open: BTreeSet<FrameId> = stubs.iter().map(|(id, _)| *id).collect();
        frames.restore(stubs);

        for record in self.instances.into_values() {
            match instances.restore(
                record.instance_id,
                record.instance_name,
                record.category_name,
            ) {
                Ok(()) => summary.instances += 1,
                Err(e) => log::warn!("Skipping instance: {}", e),
            }
        }

        let points = self
            .point_annotations
            .into_iter()
            .filter(|(frame_id, _)| open.contains(frame_id))
            .flat_map(|(_, points)| points);
        for record in points {
            if !instances.contains(record.instance_id) {
                log::warn!(
                    "Skipping point {} of unknown instance {}",
                    record.point_id,
                    record.instance_id
                );
                continue;
            }
            match annotations.restore_point(record.into()) {
                Ok(()) => summary.points += 1,
                Err(e) => log::warn!("Skipping point {}: {}", record.point_id, e),
            }
        }

        let boxes = self
            .box_annotations
            .into_iter()
            .filter(|(frame_id, _)| open.contains(frame_id))
            .flat_map(|(_, boxes)| boxes);
        for record in boxes {
            if !instances.contains(record.instance_id) {
                log::warn!(
                    "Skipping box {} of unknown instance {}",
                    record.bbox_id,
                    record.instance_id
                );
                continue;
            }
            match annotations.restore_box(record.into()) {
                Ok(()) => summary.boxes += 1,
                Err(e) => log::warn!("Skipping box {}: {}", record.bbox_id, e),
            }
        }

        log::info!(
            "Restored {} frames, {} instances, {} points and {} boxes ({} frames skipped)",
            summary.frames,
            summary.instances,
            summary.points,
            summary.boxes,
            summary.skipped_frames.len()
        );
        summary
    }
}
