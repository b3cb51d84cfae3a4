//! Instance registry: the tracked objects, their display preferences and
//! the detections inference produced for them.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;

use super::error::InstanceError;
use crate::color_utils::Colour;
use crate::constants::{DEFAULT_BBOX_HANDLE_SIZE, DEFAULT_MARKER_SIZE};
use crate::events::{Cud, EventQueue, InstanceEvent};
use crate::model::{Detection, FrameId, IdAllocator, Instance, InstanceId};

/// An instance plus the render-independent state a view needs to draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceInfo {
    pub instance: Instance,
    pub colour: Colour,
    /// Black or white, picked for legibility on top of `colour`.
    pub contrast_colour: Colour,
    pub marker_size: u32,
    pub bbox_handle_size: u32,
    pub show_markers: bool,
    pub show_mask: bool,
    pub show_plain_mask: bool,
}

impl InstanceInfo {
    fn new(instance: Instance, colour: Colour, marker_size: u32) -> Self {
        Self {
            instance,
            colour,
            contrast_colour: colour.contrast(),
            marker_size,
            bbox_handle_size: DEFAULT_BBOX_HANDLE_SIZE,
            show_markers: true,
            show_mask: true,
            show_plain_mask: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.instance.id
    }

    pub fn name(&self) -> &str {
        &self.instance.name
    }

    pub fn category(&self) -> Option<&str> {
        self.instance.category.as_deref()
    }
}

/// Fields to change on an instance. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the category.
    pub category: Option<Option<String>>,
    pub colour: Option<Colour>,
    pub marker_size: Option<u32>,
    pub bbox_handle_size: Option<u32>,
    pub show_markers: Option<bool>,
    pub show_mask: Option<bool>,
    pub show_plain_mask: Option<bool>,
    /// Replaces the whole detection map.
    pub detections: Option<BTreeMap<FrameId, Detection>>,
}

impl InstanceUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn category(mut self, category: Option<String>) -> Self {
        self.category = Some(category);
        self
    }

    pub fn colour(mut self, colour: Colour) -> Self {
        self.colour = Some(colour);
        self
    }

    pub fn marker_size(mut self, size: u32) -> Self {
        self.marker_size = Some(size);
        self
    }

    pub fn bbox_handle_size(mut self, size: u32) -> Self {
        self.bbox_handle_size = Some(size);
        self
    }

    pub fn show_markers(mut self, show: bool) -> Self {
        self.show_markers = Some(show);
        self
    }

    pub fn show_mask(mut self, show: bool) -> Self {
        self.show_mask = Some(show);
        self
    }

    pub fn show_plain_mask(mut self, show: bool) -> Self {
        self.show_plain_mask = Some(show);
        self
    }

    pub fn detections(mut self, detections: BTreeMap<FrameId, Detection>) -> Self {
        self.detections = Some(detections);
        self
    }
}

/// Assign `value` to `slot` if present and different. Returns whether it changed.
fn apply<T: PartialEq>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) if *slot != value => {
            *slot = value;
            true
        }
        _ => false,
    }
}

#[derive(Debug)]
pub struct InstanceRegistry {
    instances: BTreeMap<InstanceId, InstanceInfo>,
    current: Option<InstanceId>,
    ids: IdAllocator<InstanceId>,
    default_marker_size: u32,
    events: EventQueue<InstanceEvent>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::with_marker_size(DEFAULT_MARKER_SIZE)
    }

    /// Registry whose new instances start with the given marker size.
    pub fn with_marker_size(default_marker_size: u32) -> Self {
        Self {
            instances: BTreeMap::new(),
            current: None,
            ids: IdAllocator::new(),
            default_marker_size,
            events: EventQueue::new(),
        }
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Create an instance. Without a colour, one is picked from the palette.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        colour: Option<Colour>,
        category: Option<String>,
    ) -> InstanceId {
        let id = self.ids.next();
        let colour = colour.unwrap_or_else(|| Colour::palette(id.0));
        let instance = Instance::new(id, name, category);
        log::debug!("Created instance {} '{}'", id, instance.name);

        self.instances
            .insert(id, InstanceInfo::new(instance, colour, self.default_marker_size));
        self.events.push(InstanceEvent::Changed(id, Cud::Created));
        id
    }

    /// Re-create a persisted instance under its original id.
    pub fn restore(
        &mut self,
        id: InstanceId,
        name: impl Into<String>,
        category: Option<String>,
    ) -> Result<(), InstanceError> {
        if self.instances.contains_key(&id) {
            return Err(InstanceError::Duplicate(id));
        }
        self.ids.advance_past(id);

        let instance = Instance::new(id, name, category);
        self.instances.insert(
            id,
            InstanceInfo::new(instance, Colour::palette(id.0), self.default_marker_size),
        );
        self.events.push(InstanceEvent::Changed(id, Cud::Created));
        Ok(())
    }

    /// Remove an instance. Clears the current selection if it pointed at it.
    pub fn delete(&mut self, id: InstanceId) -> Option<InstanceInfo> {
        let Some(removed) = self.instances.remove(&id) else {
            log::warn!("Cannot delete unknown instance {}", id);
            return None;
        };
        log::debug!("Deleted instance {} '{}'", id, removed.name());
        self.events.push(InstanceEvent::Changed(id, Cud::Deleted));

        if self.current == Some(id) {
            self.current = None;
            self.events.push(InstanceEvent::CurrentChanged(None));
        }
        Some(removed)
    }

    /// Apply the present fields of `update`.
    ///
    /// Fields equal to the stored value are skipped. One `Updated` event is
    /// emitted if anything changed, none otherwise. Detections always count
    /// as a change and replace the stored map. Returns whether anything
    /// changed.
    pub fn update(&mut self, id: InstanceId, update: InstanceUpdate) -> Result<bool, InstanceError> {
        let Some(current) = self.instances.get(&id) else {
            return Err(InstanceError::Unknown(id));
        };

        let mut next = current.clone();
        let mut changed = false;

        changed |= apply(&mut next.instance.name, update.name);
        changed |= apply(&mut next.instance.category, update.category);
        if apply(&mut next.colour, update.colour) {
            next.contrast_colour = next.colour.contrast();
            changed = true;
        }
        changed |= apply(&mut next.marker_size, update.marker_size);
        changed |= apply(&mut next.bbox_handle_size, update.bbox_handle_size);
        changed |= apply(&mut next.show_markers, update.show_markers);
        changed |= apply(&mut next.show_mask, update.show_mask);
        changed |= apply(&mut next.show_plain_mask, update.show_plain_mask);
        if let Some(detections) = update.detections {
            next.instance.detections = detections;
            changed = true;
        }

        if changed {
            self.instances.insert(id, next);
            self.events.push(InstanceEvent::Changed(id, Cud::Updated));
        }
        Ok(changed)
    }

    /// Select the instance new annotations go to.
    ///
    /// Emits `CurrentChanged` only when the selection actually changes.
    pub fn set_current(&mut self, id: Option<InstanceId>) -> Result<bool, InstanceError> {
        if let Some(id) = id {
            if !self.instances.contains_key(&id) {
                log::error!("Cannot select unknown instance {}", id);
                return Err(InstanceError::Unknown(id));
            }
        }
        if self.current == id {
            return Ok(false);
        }
        self.current = id;
        self.events.push(InstanceEvent::CurrentChanged(id));
        Ok(true)
    }

    /// Delete every instance.
    pub fn reset(&mut self) {
        let ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        for id in ids {
            self.delete(id);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn current_instance_id(&self) -> Option<InstanceId> {
        self.current
    }

    pub fn current_info(&self) -> Option<&InstanceInfo> {
        self.instances.get(&self.current?)
    }

    pub fn get(&self, id: InstanceId) -> Option<&InstanceInfo> {
        self.instances.get(&id)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    /// All instance ids in ascending order.
    pub fn all_ids(&self) -> Vec<InstanceId> {
        self.instances.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceInfo> {
        self.instances.values()
    }

    /// Distinct category names in use, sorted.
    pub fn all_categories(&self) -> Vec<String> {
        self.instances
            .values()
            .filter_map(|info| info.instance.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Mask inference produced for an instance on a frame.
    pub fn mask_for(&self, id: InstanceId, frame_id: FrameId) -> Option<&Array2<bool>> {
        self.instances.get(&id)?.instance.mask(frame_id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drain queued change events.
    pub fn take_events(&mut self) -> Vec<InstanceEvent> {
        self.events.drain()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(frame: u64) -> Detection {
        Detection::new(
            FrameId(frame),
            (0, 0),
            (1, 1),
            Some(Array2::from_elem((2, 2), true)),
        )
    }

    #[test]
    fn test_create_uses_defaults() {
        let mut registry = InstanceRegistry::new();
        let id = registry.create("cell", Some(Colour::new(255, 255, 0)), None);
        let info = registry.get(id).unwrap();

        assert_eq!(info.name(), "cell");
        assert_eq!(info.marker_size, 23);
        assert_eq!(info.bbox_handle_size, 8);
        assert!(info.show_markers && info.show_mask && !info.show_plain_mask);
        assert_eq!(info.contrast_colour, Colour::BLACK);
        assert_eq!(
            registry.take_events(),
            vec![InstanceEvent::Changed(id, Cud::Created)]
        );
    }

    #[test]
    fn test_update_with_equal_values_is_silent() {
        let mut registry = InstanceRegistry::new();
        let id = registry.create("a", Some(Colour::new(10, 20, 30)), Some("cat".into()));
        registry.take_events();

        let update = InstanceUpdate::new()
            .name("a")
            .category(Some("cat".into()))
            .colour(Colour::new(10, 20, 30))
            .marker_size(23)
            .bbox_handle_size(8)
            .show_markers(true)
            .show_mask(true)
            .show_plain_mask(false);
        let before = registry.get(id).cloned();

        assert_eq!(registry.update(id, update), Ok(false));
        assert!(registry.take_events().is_empty());
        assert_eq!(registry.get(id).cloned(), before);
    }

    #[test]
    fn test_update_single_field() {
        let mut registry = InstanceRegistry::new();
        let id = registry.create("a", Some(Colour::new(10, 20, 30)), None);
        registry.take_events();
        let before = registry.get(id).cloned().unwrap();

        assert_eq!(
            registry.update(id, InstanceUpdate::new().name("b").marker_size(23)),
            Ok(true)
        );
        assert_eq!(
            registry.take_events(),
            vec![InstanceEvent::Changed(id, Cud::Updated)]
        );

        let after = registry.get(id).cloned().unwrap();
        assert_eq!(after.name(), "b");
        let mut expected = before;
        expected.instance.name = "b".into();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_update_handle_size() {
        let mut registry = InstanceRegistry::new();
        let id = registry.create("a", None, None);
        registry.take_events();

        assert_eq!(
            registry.update(id, InstanceUpdate::new().bbox_handle_size(12)),
            Ok(true)
        );
        assert_eq!(registry.get(id).unwrap().bbox_handle_size, 12);
        assert_eq!(
            registry.take_events(),
            vec![InstanceEvent::Changed(id, Cud::Updated)]
        );
    }

    #[test]
    fn test_colour_update_refreshes_contrast() {
        let mut registry = InstanceRegistry::new();
        let id = registry.create("a", Some(Colour::new(0, 0, 80)), None);
        assert_eq!(registry.get(id).unwrap().contrast_colour, Colour::WHITE);

        registry
            .update(id, InstanceUpdate::new().colour(Colour::new(240, 240, 240)))
            .unwrap();
        assert_eq!(registry.get(id).unwrap().contrast_colour, Colour::BLACK);
    }

    #[test]
    fn test_detections_replace_wholesale() {
        let mut registry = InstanceRegistry::new();
        let id = registry.create("a", None, None);
        registry
            .update(
                id,
                InstanceUpdate::new().detections(BTreeMap::from([
                    (FrameId(0), detection(0)),
                    (FrameId(1), detection(1)),
                ])),
            )
            .unwrap();
        registry.take_events();

        // Same map again still counts as a change
        let replacement = BTreeMap::from([(FrameId(1), detection(1))]);
        assert_eq!(
            registry.update(id, InstanceUpdate::new().detections(replacement)),
            Ok(true)
        );
        assert_eq!(registry.take_events().len(), 1);
        assert!(registry.mask_for(id, FrameId(0)).is_none());
        assert!(registry.mask_for(id, FrameId(1)).is_some());
    }

    #[test]
    fn test_update_unknown_instance() {
        let mut registry = InstanceRegistry::new();
        assert_eq!(
            registry.update(InstanceId(3), InstanceUpdate::new().name("x")),
            Err(InstanceError::Unknown(InstanceId(3)))
        );
    }

    #[test]
    fn test_set_current() {
        let mut registry = InstanceRegistry::new();
        let a = registry.create("a", None, None);
        registry.take_events();

        assert_eq!(registry.set_current(Some(a)), Ok(true));
        assert_eq!(registry.set_current(Some(a)), Ok(false));
        assert_eq!(registry.set_current(None), Ok(true));
        assert_eq!(registry.set_current(None), Ok(false));
        assert_eq!(
            registry.set_current(Some(InstanceId(9))),
            Err(InstanceError::Unknown(InstanceId(9)))
        );
        assert_eq!(
            registry.take_events(),
            vec![
                InstanceEvent::CurrentChanged(Some(a)),
                InstanceEvent::CurrentChanged(None)
            ]
        );
    }

    #[test]
    fn test_delete_clears_current() {
        let mut registry = InstanceRegistry::new();
        let a = registry.create("a", None, None);
        registry.set_current(Some(a)).unwrap();
        registry.take_events();

        assert!(registry.delete(a).is_some());
        assert_eq!(registry.current_instance_id(), None);
        assert_eq!(
            registry.take_events(),
            vec![
                InstanceEvent::Changed(a, Cud::Deleted),
                InstanceEvent::CurrentChanged(None)
            ]
        );
        assert!(registry.delete(a).is_none());

        // Ids keep counting after deletion
        assert_eq!(registry.create("b", None, None), InstanceId(1));
    }

    #[test]
    fn test_all_categories_sorted_distinct() {
        let mut registry = InstanceRegistry::new();
        registry.create("a", None, Some("dog".into()));
        registry.create("b", None, Some("cat".into()));
        registry.create("c", None, Some("dog".into()));
        registry.create("d", None, None);
        assert_eq!(registry.all_categories(), vec!["cat", "dog"]);
    }

    #[test]
    fn test_restore_keeps_id() {
        let mut registry = InstanceRegistry::new();
        registry.restore(InstanceId(5), "old", None).unwrap();
        assert_eq!(
            registry.restore(InstanceId(5), "dup", None),
            Err(InstanceError::Duplicate(InstanceId(5)))
        );
        assert_eq!(registry.create("new", None, None), InstanceId(6));
        assert_eq!(registry.get(InstanceId(5)).unwrap().colour, Colour::palette(5));
    }
}
