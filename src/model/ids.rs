//! Opaque identifiers and the counters that hand them out.
//!
//! Each identifier wraps a plain integer but is its own type, so a `PointId`
//! can never be passed where a `FrameId` is expected. Identifiers are produced
//! by an [`IdAllocator`] owned by the store that creates the records.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Common behaviour of the identifier newtypes.
pub trait RawId: Copy + Eq + Ord + std::hash::Hash + fmt::Debug + fmt::Display {
    /// Wrap a raw integer.
    fn from_raw(raw: u64) -> Self;

    /// Unwrap to the raw integer.
    fn raw(self) -> u64;
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl RawId for $name {
            fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a frame in the frame sequence.
    FrameId
);
define_id!(
    /// Identifier of a tracked object instance.
    InstanceId
);
define_id!(
    /// Identifier of a point annotation.
    PointId
);
define_id!(
    /// Identifier of a box annotation.
    BoxId
);

/// Monotonic identifier counter.
///
/// Starts at 0 and never hands out the same value twice, even after the
/// record that used it was deleted.
#[derive(Debug, Clone)]
pub struct IdAllocator<T: RawId> {
    next: u64,
    _marker: PhantomData<T>,
}

impl<T: RawId> IdAllocator<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            _marker: PhantomData,
        }
    }

    /// Allocate the next identifier.
    pub fn next(&mut self) -> T {
        let id = T::from_raw(self.next);
        self.next += 1;
        id
    }

    /// Make sure `id` will never be allocated again.
    ///
    /// Used when replaying persisted identifiers.
    pub fn advance_past(&mut self, id: T) {
        if id.raw() >= self.next {
            self.next = id.raw() + 1;
        }
    }

    /// Value the next call to [`IdAllocator::next`] will return.
    pub fn peek(&self) -> T {
        T::from_raw(self.next)
    }
}

impl<T: RawId> Default for IdAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}
