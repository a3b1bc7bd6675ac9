// dbgobj - Debugger Object Model
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Auxiliary data attached to debugger objects.
//!
//! Engines and consumers can hang any value off an object when it is created.
//! Values that need cleanup implement [`Releasable`]; the owning object calls
//! [`Releasable::release`] exactly once, when it is closed.

use std::{
    any::Any,
    fmt,
    mem,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

/// Auxiliary data with a cleanup action.
pub trait Releasable: Any + Send + Sync {
    /// Releases the resources held by this value.
    fn release(&self);
}

/// Data attached to an object at creation time.
#[derive(Default)]
pub enum AuxData {
    /// Nothing attached.
    #[default]
    Empty,
    /// Data without a release action.
    Inert(Box<dyn Any + Send + Sync>),
    /// Data whose release action runs when the owner is closed.
    Releasable(Box<dyn Releasable>),
}

impl AuxData {
    /// Wraps a value that needs no cleanup.
    pub fn inert<T: Any + Send + Sync>(value: T) -> Self {
        Self::Inert(Box::new(value))
    }

    /// Wraps a value with a release action.
    pub fn releasable<T: Releasable>(value: T) -> Self {
        Self::Releasable(Box::new(value))
    }

    /// Attaches a bare release callback.
    pub fn on_release<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::releasable(OnRelease::new(f))
    }

    /// Returns true if nothing is attached.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns true if the data carries a release action.
    pub fn has_release(&self) -> bool {
        matches!(self, Self::Releasable(_))
    }

    /// Borrows the attached value as `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Empty => None,
            Self::Inert(value) => value.downcast_ref(),
            Self::Releasable(value) => {
                let value: &dyn Releasable = &**value;
                let value: &dyn Any = value;
                value.downcast_ref()
            }
        }
    }

    /// Consumes the data, running its release action if it has one.
    pub fn release(self) {
        if let Self::Releasable(value) = self {
            value.release();
        }
    }
}

impl fmt::Debug for AuxData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Inert(_) => f.write_str("Inert(..)"),
            Self::Releasable(_) => f.write_str("Releasable(..)"),
        }
    }
}

/// A release callback usable as auxiliary data.
pub struct OnRelease {
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl OnRelease {
    /// Wraps `f`; it runs at most once.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { callback: Mutex::new(Some(Box::new(f))) }
    }
}

impl Releasable for OnRelease {
    fn release(&self) {
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Holds an object's auxiliary data until the object is closed.
///
/// `release` takes the data out exactly once; later calls are no-ops.
#[derive(Debug, Default)]
pub struct DataSlot {
    data: Mutex<AuxData>,
    released: AtomicBool,
}

impl DataSlot {
    /// Creates a slot owning `data`.
    pub fn new(data: AuxData) -> Self {
        Self { data: Mutex::new(data), released: AtomicBool::new(false) }
    }

    /// Runs `f` with the attached value if it is a `T`.
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let data = self.data.lock();
        data.get::<T>().map(f)
    }

    /// Moves the data out without releasing it. Used when ownership passes
    /// to another object.
    pub fn take(&self) -> AuxData {
        mem::take(&mut *self.data.lock())
    }

    /// Returns true once the data has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Releases the data. Returns false if it was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        // The lock must not be held while user code runs.
        let data = self.take();
        data.release();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{atomic::AtomicUsize, Arc};

    struct Counted(Arc<AtomicUsize>);

    impl Releasable for Counted {
        fn release(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_get_downcasts_every_variant() {
        assert_eq!(AuxData::inert(7u32).get::<u32>(), Some(&7));
        assert_eq!(AuxData::inert(7u32).get::<u64>(), None);
        assert!(AuxData::Empty.get::<u32>().is_none());

        let counter = Arc::new(AtomicUsize::new(0));
        let data = AuxData::releasable(Counted(counter));
        assert!(data.get::<Counted>().is_some());
        assert!(data.has_release());
    }

    #[test]
    fn test_slot_releases_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let slot = DataSlot::new(AuxData::releasable(Counted(counter.clone())));

        assert!(slot.release());
        assert!(!slot.release());
        assert!(slot.is_released());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inert_data_is_dropped_without_release() {
        let slot = DataSlot::new(AuxData::inert(String::from("payload")));
        assert_eq!(slot.with::<String, _>(|s| s.len()), Some(7));
        assert!(slot.release());
        assert!(slot.with::<String, _>(|s| s.len()).is_none());
    }

    #[test]
    fn test_on_release_callback_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let data = AuxData::on_release(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        if let AuxData::Releasable(value) = &data {
            value.release();
            value.release();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_take_moves_data_without_release() {
        let counter = Arc::new(AtomicUsize::new(0));
        let slot = DataSlot::new(AuxData::releasable(Counted(counter.clone())));
        let moved = slot.take();
        assert!(slot.release());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        moved.release();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
