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

use std::{fmt, ops::Deref};

use once_cell::sync::Lazy;

type Init<T> = Box<dyn FnOnce() -> T + Send>;

/// A dependency resolved on first use and memoized afterwards.
///
/// Services that are expensive to build (UI prompts, metadata readers) are
/// passed around as `LazyService`s so that constructing a consumer never
/// forces them into existence.
pub struct LazyService<T> {
    inner: Lazy<T, Init<T>>,
}

impl<T> LazyService<T> {
    /// Creates a service built by `init` on first access.
    pub fn new<F>(init: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self { inner: Lazy::new(Box::new(init)) }
    }

    /// Wraps an already constructed service.
    pub fn ready(value: T) -> Self
    where
        T: Send + 'static,
    {
        Self::new(move || value)
    }

    /// Returns the service, building it if needed.
    pub fn get(&self) -> &T {
        Lazy::force(&self.inner)
    }

    /// Returns true if the service has been built.
    pub fn is_initialized(&self) -> bool {
        Lazy::get(&self.inner).is_some()
    }
}

impl<T> Deref for LazyService<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Lazy::get(&self.inner) {
            Some(value) => f.debug_tuple("LazyService").field(value).finish(),
            None => f.write_str("LazyService(<uninit>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn test_init_runs_once_on_first_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let service = LazyService::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert!(!service.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*service.get(), 42);
        assert_eq!(*service, 42);
        assert!(service.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_service() {
        let service = LazyService::ready(String::from("prompt"));
        assert_eq!(service.as_str(), "prompt");
    }
}
