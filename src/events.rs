//! Change events emitted by the stores.
//!
//! Every store owns an [`EventQueue`]. Mutating operations push at most one
//! event per call and consumers drain the queue with `take_events()` after
//! the call returns. Batch operations push a single event carrying every
//! affected record.

use crate::model::{BoxAnnotation, FrameId, InstanceId, PointAnnotation};

/// Kind of change carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cud {
    Created,
    Updated,
    Deleted,
}

/// Change to point or box annotations.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEvent {
    PointsChanged(Cud, Vec<PointAnnotation>),
    BoxesChanged(Cud, Vec<BoxAnnotation>),
}

/// Change to instance records or to the current instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceEvent {
    Changed(InstanceId, Cud),
    CurrentChanged(Option<InstanceId>),
}

/// Change of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    CurrentChanged(Option<FrameId>),
}

/// Outbound event buffer owned by a store.
#[derive(Debug, Clone)]
pub struct EventQueue<E> {
    pending: Vec<E>,
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, event: E) {
        self.pending.push(event);
    }

    /// Remove and return all queued events, oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
