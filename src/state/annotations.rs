//! Point and box annotation store.
//!
//! Owns every [`PointAnnotation`] and [`BoxAnnotation`] and keeps two rules:
//!
//! - No two live points on the same frame share a pixel. A per-frame
//!   occupancy index (`position -> PointId`) makes the check O(1) and is kept
//!   in lockstep with the flat point map. Any divergence between the two is
//!   a bug and panics.
//! - Each instance has at most one box. Creating another one replaces it.
//!
//! Every mutation queues at most one [`AnnotationEvent`] per record kind.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::error::AnnotationError;
use crate::events::{AnnotationEvent, Cud, EventQueue};
use crate::model::{
    BoxAnnotation, BoxCorners, BoxId, FrameId, IdAllocator, InstanceId, PointAnnotation, PointId,
    PointKind, PointXY,
};

#[derive(Debug, Default)]
pub struct AnnotationStore {
    points: BTreeMap<PointId, PointAnnotation>,
    occupancy: HashMap<FrameId, HashMap<PointXY, PointId>>,
    boxes: BTreeMap<BoxId, BoxAnnotation>,
    point_ids: IdAllocator<PointId>,
    box_ids: IdAllocator<BoxId>,
    events: EventQueue<AnnotationEvent>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Points
    // =========================================================================

    /// Place a new point.
    ///
    /// Returns `None` without touching the store if the position is already
    /// taken on that frame.
    pub fn create_point(
        &mut self,
        frame_id: FrameId,
        instance_id: InstanceId,
        position: PointXY,
        kind: PointKind,
    ) -> Option<PointAnnotation> {
        if let Some(occupant) = self.point_at(frame_id, position) {
            log::debug!(
                "Position {:?} on frame {} already holds point {}",
                position,
                frame_id,
                occupant
            );
            return None;
        }

        let annotation = PointAnnotation {
            id: self.point_ids.next(),
            frame_id,
            instance_id,
            position,
            kind,
        };
        self.insert_point(annotation);
        log::debug!(
            "Created point {} at {:?} on frame {} for instance {}",
            annotation.id,
            position,
            frame_id,
            instance_id
        );
        self.events
            .push(AnnotationEvent::PointsChanged(Cud::Created, vec![annotation]));
        Some(annotation)
    }

    /// Delete points, ignoring ids that no longer exist.
    ///
    /// Emits a single `Deleted` event carrying every removed point.
    pub fn delete_points(&mut self, ids: &[PointId]) -> Vec<PointAnnotation> {
        let deleted: Vec<PointAnnotation> =
            ids.iter().filter_map(|id| self.remove_point(*id)).collect();

        if !deleted.is_empty() {
            log::debug!("Deleted {} points", deleted.len());
            self.events
                .push(AnnotationEvent::PointsChanged(Cud::Deleted, deleted.clone()));
        }
        deleted
    }

    pub fn delete_point(&mut self, id: PointId) -> Option<PointAnnotation> {
        self.delete_points(&[id]).pop()
    }

    /// Move a point to another pixel on its frame.
    ///
    /// Moving onto its own position returns the point unchanged and emits
    /// nothing. Moving onto another point's position is rejected; callers
    /// should check [`AnnotationStore::can_move`] first.
    pub fn move_point(
        &mut self,
        id: PointId,
        new_position: PointXY,
    ) -> Result<PointAnnotation, AnnotationError> {
        let current = match self.points.get(&id) {
            Some(annotation) => *annotation,
            None => {
                log::error!("Cannot move unknown point {}", id);
                return Err(AnnotationError::UnknownPoint(id));
            }
        };

        if current.position == new_position {
            return Ok(current);
        }

        if let Some(occupant) = self.point_at(current.frame_id, new_position) {
            log::error!(
                "Cannot move point {} onto {:?}: occupied by point {}",
                id,
                new_position,
                occupant
            );
            return Err(AnnotationError::occupied(
                current.frame_id,
                new_position,
                occupant,
            ));
        }

        let moved = current.with_position(new_position);
        self.remove_point(id);
        self.insert_point(moved);
        self.events
            .push(AnnotationEvent::PointsChanged(Cud::Updated, vec![moved]));
        Ok(moved)
    }

    /// Whether point `id` may be placed at `position` on `frame_id`.
    pub fn can_move(&self, id: PointId, frame_id: FrameId, position: PointXY) -> bool {
        match self.point_at(frame_id, position) {
            None => true,
            Some(occupant) => occupant == id,
        }
    }

    /// Flip a point's kind, or set it when `kind` is given.
    ///
    /// Returns `None` for unknown ids. Setting the kind it already has is a
    /// silent no-op.
    pub fn toggle_or_set_kind(
        &mut self,
        id: PointId,
        kind: Option<PointKind>,
    ) -> Option<PointAnnotation> {
        let Some(current) = self.points.get(&id).copied() else {
            log::warn!("Cannot change kind of unknown point {}", id);
            return None;
        };

        let new_kind = kind.unwrap_or_else(|| current.kind.flipped());
        if new_kind == current.kind {
            return Some(current);
        }

        let updated = current.with_kind(new_kind);
        self.points.insert(id, updated);
        self.events
            .push(AnnotationEvent::PointsChanged(Cud::Updated, vec![updated]));
        Some(updated)
    }

    /// Re-insert a persisted point under its original id.
    pub fn restore_point(&mut self, annotation: PointAnnotation) -> Result<(), AnnotationError> {
        if self.points.contains_key(&annotation.id) {
            return Err(AnnotationError::DuplicatePoint(annotation.id));
        }
        if let Some(occupant) = self.point_at(annotation.frame_id, annotation.position) {
            return Err(AnnotationError::occupied(
                annotation.frame_id,
                annotation.position,
                occupant,
            ));
        }

        self.point_ids.advance_past(annotation.id);
        self.insert_point(annotation);
        self.events
            .push(AnnotationEvent::PointsChanged(Cud::Created, vec![annotation]));
        Ok(())
    }

    fn insert_point(&mut self, annotation: PointAnnotation) {
        let displaced = self
            .occupancy
            .entry(annotation.frame_id)
            .or_default()
            .insert(annotation.position, annotation.id);
        assert!(
            displaced.is_none(),
            "occupancy index already held {:?} at {:?} on frame {}",
            displaced,
            annotation.position,
            annotation.frame_id
        );

        let displaced = self.points.insert(annotation.id, annotation);
        assert!(
            displaced.is_none(),
            "point {} inserted twice",
            annotation.id
        );
    }

    fn remove_point(&mut self, id: PointId) -> Option<PointAnnotation> {
        let annotation = self.points.remove(&id)?;

        let cells = self.occupancy.get_mut(&annotation.frame_id);
        let freed = cells.and_then(|cells| cells.remove(&annotation.position));
        assert_eq!(
            freed,
            Some(id),
            "occupancy index out of sync for point {} on frame {}",
            id,
            annotation.frame_id
        );

        if self
            .occupancy
            .get(&annotation.frame_id)
            .is_some_and(|cells| cells.is_empty())
        {
            self.occupancy.remove(&annotation.frame_id);
        }
        Some(annotation)
    }

    // =========================================================================
    // Boxes
    // =========================================================================

    /// Create the box for an instance, replacing any box it already has.
    pub fn create_box(
        &mut self,
        frame_id: FrameId,
        instance_id: InstanceId,
        corners: BoxCorners,
    ) -> BoxAnnotation {
        if let Some(existing) = self.box_for_instance(instance_id) {
            log::warn!(
                "Instance {} already has box {}; replacing it",
                instance_id,
                existing.id
            );
            self.delete_boxes(&[existing.id]);
        }

        let annotation = BoxAnnotation {
            id: self.box_ids.next(),
            frame_id,
            instance_id,
            corners,
        };
        self.boxes.insert(annotation.id, annotation);
        log::debug!(
            "Created box {} on frame {} for instance {}",
            annotation.id,
            frame_id,
            instance_id
        );
        self.events
            .push(AnnotationEvent::BoxesChanged(Cud::Created, vec![annotation]));
        annotation
    }

    /// Replace a box's corners. Always emits `Updated` for a known id.
    pub fn move_or_resize_box(&mut self, id: BoxId, corners: BoxCorners) -> Option<BoxAnnotation> {
        let Some(current) = self.boxes.get(&id).copied() else {
            log::warn!("Cannot move unknown box {}", id);
            return None;
        };

        let updated = BoxAnnotation { corners, ..current };
        self.boxes.insert(id, updated);
        self.events
            .push(AnnotationEvent::BoxesChanged(Cud::Updated, vec![updated]));
        Some(updated)
    }

    /// Delete boxes, ignoring ids that no longer exist.
    ///
    /// Emits a single `Deleted` event carrying every removed box.
    pub fn delete_boxes(&mut self, ids: &[BoxId]) -> Vec<BoxAnnotation> {
        let deleted: Vec<BoxAnnotation> =
            ids.iter().filter_map(|id| self.boxes.remove(id)).collect();

        if !deleted.is_empty() {
            log::debug!("Deleted {} boxes", deleted.len());
            self.events
                .push(AnnotationEvent::BoxesChanged(Cud::Deleted, deleted.clone()));
        }
        deleted
    }

    pub fn delete_box(&mut self, id: BoxId) -> Option<BoxAnnotation> {
        self.delete_boxes(&[id]).pop()
    }

    /// Re-insert a persisted box under its original id.
    pub fn restore_box(&mut self, annotation: BoxAnnotation) -> Result<(), AnnotationError> {
        if self.boxes.contains_key(&annotation.id) {
            return Err(AnnotationError::DuplicateBox(annotation.id));
        }
        if let Some(existing) = self.box_for_instance(annotation.instance_id) {
            log::warn!(
                "Instance {} already has box {}; replacing it with {}",
                annotation.instance_id,
                existing.id,
                annotation.id
            );
            self.delete_boxes(&[existing.id]);
        }

        self.box_ids.advance_past(annotation.id);
        self.boxes.insert(annotation.id, annotation);
        self.events
            .push(AnnotationEvent::BoxesChanged(Cud::Created, vec![annotation]));
        Ok(())
    }

    // =========================================================================
    // Cascades
    // =========================================================================

    /// Delete every point and box belonging to an instance.
    pub fn delete_instance(
        &mut self,
        instance_id: InstanceId,
    ) -> (Vec<PointAnnotation>, Vec<BoxAnnotation>) {
        let point_ids: Vec<PointId> = self
            .points
            .values()
            .filter(|p| p.instance_id == instance_id)
            .map(|p| p.id)
            .collect();
        let box_ids: Vec<BoxId> = self
            .boxes
            .values()
            .filter(|b| b.instance_id == instance_id)
            .map(|b| b.id)
            .collect();

        (self.delete_points(&point_ids), self.delete_boxes(&box_ids))
    }

    /// Delete every point and box on a frame.
    pub fn delete_frame(&mut self, frame_id: FrameId) -> (Vec<PointAnnotation>, Vec<BoxAnnotation>) {
        let point_ids: Vec<PointId> = self
            .occupancy
            .get(&frame_id)
            .map(|cells| cells.values().copied().collect())
            .unwrap_or_default();
        let box_ids: Vec<BoxId> = self
            .boxes
            .values()
            .filter(|b| b.frame_id == frame_id)
            .map(|b| b.id)
            .collect();

        (self.delete_points(&point_ids), self.delete_boxes(&box_ids))
    }

    /// Remove everything. Identifier counters keep running.
    pub fn reset(&mut self) {
        let points: Vec<PointAnnotation> =
            std::mem::take(&mut self.points).into_values().collect();
        let boxes: Vec<BoxAnnotation> = std::mem::take(&mut self.boxes).into_values().collect();
        self.occupancy.clear();

        if !points.is_empty() {
            self.events
                .push(AnnotationEvent::PointsChanged(Cud::Deleted, points));
        }
        if !boxes.is_empty() {
            self.events
                .push(AnnotationEvent::BoxesChanged(Cud::Deleted, boxes));
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_point(&self, id: PointId) -> Option<&PointAnnotation> {
        self.points.get(&id)
    }

    pub fn get_box(&self, id: BoxId) -> Option<&BoxAnnotation> {
        self.boxes.get(&id)
    }

    /// Point occupying `position` on `frame_id`.
    pub fn point_at(&self, frame_id: FrameId, position: PointXY) -> Option<PointId> {
        self.occupancy.get(&frame_id)?.get(&position).copied()
    }

    /// Points on a frame, ordered by id.
    pub fn points_for_frame(&self, frame_id: FrameId) -> Vec<PointAnnotation> {
        let mut points: Vec<PointAnnotation> = self
            .occupancy
            .get(&frame_id)
            .map(|cells| cells.values().map(|id| self.points[id]).collect())
            .unwrap_or_default();
        points.sort_by_key(|p| p.id);
        points
    }

    /// Points of an instance across all frames, ordered by id.
    pub fn points_for_instance(&self, instance_id: InstanceId) -> Vec<PointAnnotation> {
        self.points
            .values()
            .filter(|p| p.instance_id == instance_id)
            .copied()
            .collect()
    }

    /// Boxes on a frame, ordered by id.
    pub fn boxes_for_frame(&self, frame_id: FrameId) -> Vec<BoxAnnotation> {
        self.boxes
            .values()
            .filter(|b| b.frame_id == frame_id)
            .copied()
            .collect()
    }

    pub fn boxes_for_instance(&self, instance_id: InstanceId) -> Vec<BoxAnnotation> {
        self.boxes
            .values()
            .filter(|b| b.instance_id == instance_id)
            .copied()
            .collect()
    }

    /// The current box of an instance.
    pub fn box_for_instance(&self, instance_id: InstanceId) -> Option<BoxAnnotation> {
        self.boxes
            .values()
            .find(|b| b.instance_id == instance_id)
            .copied()
    }

    /// Frames that hold at least one point or box.
    pub fn frames_with_annotations(&self) -> BTreeSet<FrameId> {
        self.occupancy
            .keys()
            .copied()
            .chain(self.boxes.values().map(|b| b.frame_id))
            .collect()
    }

    pub fn points(&self) -> impl Iterator<Item = &PointAnnotation> {
        self.points.values()
    }

    pub fn boxes(&self) -> impl Iterator<Item = &BoxAnnotation> {
        self.boxes.values()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    /// Drain queued change events.
    pub fn take_events(&mut self) -> Vec<AnnotationEvent> {
        self.events.drain()
    }

    /// Panic if the occupancy index and the point map disagree.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let indexed: usize = self.occupancy.values().map(|cells| cells.len()).sum();
        assert_eq!(indexed, self.points.len());
        for (frame_id, cells) in &self.occupancy {
            assert!(!cells.is_empty(), "empty occupancy entry for frame {}", frame_id);
            for (position, id) in cells {
                let point = &self.points[id];
                assert_eq!(point.frame_id, *frame_id);
                assert_eq!(point.position, *position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F0: FrameId = FrameId(0);
    const F1: FrameId = FrameId(1);
    const A: InstanceId = InstanceId(0);
    const B: InstanceId = InstanceId(1);

    fn corners(x0: i32, y0: i32, x1: i32, y1: i32) -> BoxCorners {
        BoxCorners::new((x0, y0), (x1, y1), PointKind::Positive)
    }

    #[test]
    fn test_create_point_rejects_occupied_position() {
        let mut store = AnnotationStore::new();
        let first = store
            .create_point(F0, A, (10, 10), PointKind::Positive)
            .unwrap();
        store.take_events();

        assert!(
            store
                .create_point(F0, B, (10, 10), PointKind::Negative)
                .is_none()
        );
        assert_eq!(store.point_count(), 1);
        assert!(store.take_events().is_empty());
        assert_eq!(store.get_point(first.id), Some(&first));

        // Same pixel on another frame is fine
        assert!(
            store
                .create_point(F1, A, (10, 10), PointKind::Positive)
                .is_some()
        );
        store.assert_consistent();
    }

    #[test]
    fn test_occupancy_holds_over_creates_and_moves() {
        let mut store = AnnotationStore::new();
        let mut ids = Vec::new();
        for i in 0..6 {
            if let Some(p) = store.create_point(F0, A, (i % 3, 0), PointKind::Positive) {
                ids.push(p.id);
            }
        }
        assert_eq!(ids.len(), 3);

        for (step, id) in ids.iter().cycle().take(12).enumerate() {
            let target = ((step % 4) as i32, 0);
            if store.can_move(*id, F0, target) {
                store.move_point(*id, target).unwrap();
            } else {
                assert!(store.move_point(*id, target).is_err());
            }
            store.assert_consistent();
        }

        let positions: BTreeSet<PointXY> =
            store.points_for_frame(F0).iter().map(|p| p.position).collect();
        assert_eq!(positions.len(), 3);
    }

    #[test]
    fn test_move_point() {
        let mut store = AnnotationStore::new();
        let p = store.create_point(F0, A, (1, 1), PointKind::Positive).unwrap();
        let q = store.create_point(F0, A, (2, 2), PointKind::Positive).unwrap();
        store.take_events();

        // Same position: unchanged, no event
        assert_eq!(store.move_point(p.id, (1, 1)), Ok(p));
        assert!(store.take_events().is_empty());

        // Occupied by another point
        assert!(!store.can_move(p.id, F0, (2, 2)));
        assert_eq!(
            store.move_point(p.id, (2, 2)),
            Err(AnnotationError::occupied(F0, (2, 2), q.id))
        );
        assert_eq!(store.get_point(p.id).unwrap().position, (1, 1));

        let moved = store.move_point(p.id, (5, 5)).unwrap();
        assert_eq!(moved.position, (5, 5));
        assert_eq!(store.point_at(F0, (5, 5)), Some(p.id));
        assert_eq!(store.point_at(F0, (1, 1)), None);
        assert_eq!(
            store.take_events(),
            vec![AnnotationEvent::PointsChanged(Cud::Updated, vec![moved])]
        );

        assert_eq!(
            store.move_point(PointId(99), (0, 0)),
            Err(AnnotationError::UnknownPoint(PointId(99)))
        );
        store.assert_consistent();
    }

    #[test]
    fn test_toggle_or_set_kind() {
        let mut store = AnnotationStore::new();
        let p = store.create_point(F0, A, (1, 1), PointKind::Positive).unwrap();
        store.take_events();

        let toggled = store.toggle_or_set_kind(p.id, None).unwrap();
        assert_eq!(toggled.kind, PointKind::Negative);
        assert_eq!(store.take_events().len(), 1);

        let same = store
            .toggle_or_set_kind(p.id, Some(PointKind::Negative))
            .unwrap();
        assert_eq!(same.kind, PointKind::Negative);
        assert!(store.take_events().is_empty());

        assert!(store.toggle_or_set_kind(PointId(42), None).is_none());
    }

    #[test]
    fn test_second_box_replaces_first() {
        let mut store = AnnotationStore::new();
        let first = store.create_box(F0, A, corners(0, 0, 5, 5));
        let other = store.create_box(F0, B, corners(1, 1, 2, 2));
        store.take_events();

        let second = store.create_box(F1, A, corners(3, 3, 9, 9));
        assert_ne!(first.id, second.id);
        assert!(store.get_box(first.id).is_none());
        assert_eq!(store.boxes_for_instance(A), vec![second]);
        assert_eq!(store.box_for_instance(B), Some(other));
        assert_eq!(
            store.take_events(),
            vec![
                AnnotationEvent::BoxesChanged(Cud::Deleted, vec![first]),
                AnnotationEvent::BoxesChanged(Cud::Created, vec![second]),
            ]
        );
    }

    #[test]
    fn test_move_or_resize_box_always_emits() {
        let mut store = AnnotationStore::new();
        let b = store.create_box(F0, A, corners(0, 0, 5, 5));
        store.take_events();

        let same = store.move_or_resize_box(b.id, b.corners).unwrap();
        assert_eq!(same, b);
        assert_eq!(store.take_events().len(), 1);

        assert!(
            store
                .move_or_resize_box(BoxId(77), corners(0, 0, 1, 1))
                .is_none()
        );
    }

    #[test]
    fn test_delete_instance_emits_one_event_per_kind() {
        let mut store = AnnotationStore::new();
        store.create_point(F0, A, (1, 1), PointKind::Positive);
        store.create_point(F0, A, (2, 2), PointKind::Negative);
        store.create_point(F1, A, (1, 1), PointKind::Positive);
        let kept = store.create_point(F0, B, (3, 3), PointKind::Positive).unwrap();
        store.create_box(F1, A, corners(0, 0, 4, 4));
        store.take_events();

        let (points, boxes) = store.delete_instance(A);
        assert_eq!(points.len(), 3);
        assert_eq!(boxes.len(), 1);

        let events = store.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            AnnotationEvent::PointsChanged(Cud::Deleted, list) if list.len() == 3
        ));
        assert!(matches!(
            &events[1],
            AnnotationEvent::BoxesChanged(Cud::Deleted, list) if list.len() == 1
        ));

        assert_eq!(store.points().copied().collect::<Vec<_>>(), vec![kept]);
        assert_eq!(store.box_count(), 0);
        store.assert_consistent();
    }

    #[test]
    fn test_delete_frame_and_unknown_ids() {
        let mut store = AnnotationStore::new();
        let p = store.create_point(F0, A, (1, 1), PointKind::Positive).unwrap();
        store.create_point(F1, A, (1, 1), PointKind::Positive);
        store.create_box(F0, B, corners(0, 0, 4, 4));
        store.take_events();

        let (points, boxes) = store.delete_frame(F0);
        assert_eq!(points, vec![p]);
        assert_eq!(boxes.len(), 1);
        assert_eq!(store.frames_with_annotations(), BTreeSet::from([F1]));
        store.take_events();

        // Already gone: ignored, no event
        assert!(store.delete_points(&[p.id, PointId(50)]).is_empty());
        assert!(store.delete_box(BoxId(50)).is_none());
        assert!(store.take_events().is_empty());
        store.assert_consistent();
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut store = AnnotationStore::new();
        let p = store.create_point(F0, A, (1, 1), PointKind::Positive).unwrap();
        store.delete_point(p.id);
        let q = store.create_point(F0, A, (1, 1), PointKind::Positive).unwrap();
        assert_ne!(p.id, q.id);

        store.reset();
        let r = store.create_point(F0, A, (1, 1), PointKind::Positive).unwrap();
        assert!(r.id > q.id);
    }

    #[test]
    fn test_reset_emits_batched_deletes() {
        let mut store = AnnotationStore::new();
        store.reset();
        assert!(store.take_events().is_empty());

        store.create_point(F0, A, (1, 1), PointKind::Positive);
        store.create_point(F1, B, (1, 1), PointKind::Positive);
        store.create_box(F0, A, corners(0, 0, 1, 1));
        store.take_events();

        store.reset();
        let events = store.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            AnnotationEvent::PointsChanged(Cud::Deleted, list) if list.len() == 2
        ));
        assert!(store.frames_with_annotations().is_empty());
        store.assert_consistent();
    }

    #[test]
    fn test_queries() {
        let mut store = AnnotationStore::new();
        let p0 = store.create_point(F0, A, (5, 5), PointKind::Positive).unwrap();
        let p1 = store.create_point(F0, B, (1, 1), PointKind::Negative).unwrap();
        let p2 = store.create_point(F1, A, (1, 1), PointKind::Positive).unwrap();
        let b = store.create_box(F1, B, corners(0, 0, 2, 2));

        assert_eq!(store.points_for_frame(F0), vec![p0, p1]);
        assert_eq!(store.points_for_instance(A), vec![p0, p2]);
        assert_eq!(store.boxes_for_frame(F1), vec![b]);
        assert!(store.boxes_for_frame(F0).is_empty());
        assert_eq!(store.frames_with_annotations(), BTreeSet::from([F0, F1]));
    }

    #[test]
    fn test_restore_advances_counters() {
        let mut store = AnnotationStore::new();
        let p = PointAnnotation {
            id: PointId(10),
            frame_id: F0,
            instance_id: A,
            position: (4, 4),
            kind: PointKind::Negative,
        };
        store.restore_point(p).unwrap();
        assert_eq!(
            store.restore_point(p),
            Err(AnnotationError::DuplicatePoint(PointId(10)))
        );

        let clash = PointAnnotation {
            id: PointId(11),
            ..p
        };
        assert!(matches!(
            store.restore_point(clash),
            Err(AnnotationError::Occupied { .. })
        ));

        let b = BoxAnnotation {
            id: BoxId(3),
            frame_id: F0,
            instance_id: A,
            corners: corners(0, 0, 1, 1),
        };
        store.restore_box(b).unwrap();

        let next_point = store.create_point(F0, A, (0, 0), PointKind::Positive).unwrap();
        assert_eq!(next_point.id, PointId(11));
        let next_box = store.create_box(F0, B, corners(0, 0, 1, 1));
        assert_eq!(next_box.id, BoxId(4));
        store.assert_consistent();
    }
}
