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

//! Single-thread dispatcher.
//!
//! Every structural mutation of the object graph runs on one dedicated thread.
//! Other threads hand work to it through an unbounded channel:
//!
//! - [`Dispatcher::post`] enqueues a job and returns immediately
//! - [`Dispatcher::invoke`] enqueues a job and blocks until its result is back
//!
//! Jobs run in arrival order. Code already running on the dispatch thread
//! executes its jobs inline, so nested calls never deadlock waiting on
//! themselves.
//!
//! The blocking calls fail with [`ManagerError::InsideAsyncRuntime`] on any
//! thread that has a tokio runtime context, blocking pool threads included.
//! Async engines call in from a plain `std::thread`.

use std::{
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle, ThreadId},
};

use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, trace};

use crate::{ManagerError, Result};

type Job = Box<dyn FnOnce() + Send>;

/// Handle to the dispatch thread.
#[derive(Debug)]
pub struct Dispatcher {
    tx: Option<mpsc::UnboundedSender<Job>>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Starts a dispatch thread with the given name.
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!("Dispatch thread started");

            while let Some(job) = rx.blocking_recv() {
                // A panicking job drops its result sender; the waiting caller
                // sees that as `DispatchPanicked`. The thread keeps serving.
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Dispatch job panicked");
                }
            }

            debug!("Dispatch thread stopped");
        })?;

        Ok(Self { tx: Some(tx), thread_id: handle.thread().id(), handle: Some(handle) })
    }

    /// Returns true if the caller is running on the dispatch thread.
    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Runs `job` on the dispatch thread without waiting for it.
    ///
    /// On the dispatch thread itself the job runs immediately.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_dispatch_thread() {
            job();
            return Ok(());
        }

        trace!("Posting job to the dispatch thread");
        self.sender()?.send(Box::new(job)).map_err(|_| ManagerError::DispatcherGone)
    }

    /// Runs `f` on the dispatch thread and waits for its result.
    pub fn invoke<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_dispatch_thread() {
            return Ok(f());
        }

        if Handle::try_current().is_ok() {
            return Err(ManagerError::InsideAsyncRuntime);
        }

        let (tx, rx) = oneshot::channel();
        trace!("Invoking job on the dispatch thread");
        self.sender()?
            .send(Box::new(move || {
                // The caller may have given up waiting; nothing to do then.
                let _ = tx.send(f());
            }))
            .map_err(|_| ManagerError::DispatcherGone)?;

        rx.blocking_recv().map_err(|_| ManagerError::DispatchPanicked)
    }

    fn sender(&self) -> Result<&mpsc::UnboundedSender<Job>> {
        self.tx.as_ref().ok_or(ManagerError::DispatcherGone)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain what is queued and exit.
        self.tx.take();

        if self.is_dispatch_thread() {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Dispatch thread terminated abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_invoke_runs_on_dispatch_thread() {
        let dispatcher = Dispatcher::spawn("test-dispatch").unwrap();
        let name = dispatcher.invoke(|| thread::current().name().map(str::to_string)).unwrap();
        assert_eq!(name.as_deref(), Some("test-dispatch"));
        assert!(!dispatcher.is_dispatch_thread());
    }

    #[test]
    fn test_jobs_run_in_fifo_order() {
        let dispatcher = Dispatcher::spawn("test-fifo").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let order = order.clone();
            dispatcher.post(move || order.lock().push(i)).unwrap();
        }
        dispatcher.invoke(|| ()).unwrap();

        assert_eq!(*order.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_job_reports_error_and_thread_survives() {
        let dispatcher = Dispatcher::spawn("test-panic").unwrap();
        let result = dispatcher.invoke(|| -> u32 { panic!("boom") });
        assert!(matches!(result, Err(ManagerError::DispatchPanicked)));
        assert_eq!(dispatcher.invoke(|| 5).unwrap(), 5);
    }

    #[test]
    fn test_invoke_from_async_runtime_is_rejected() {
        let dispatcher = Dispatcher::spawn("test-async").unwrap();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let result = rt.block_on(async { dispatcher.invoke(|| 1) });
        assert!(matches!(result, Err(ManagerError::InsideAsyncRuntime)));

        // Posting doesn't wait, and plain threads started from async code may invoke.
        let dispatcher = Arc::new(dispatcher);
        let worker = dispatcher.clone();
        let value = rt.block_on(async {
            dispatcher.post(|| ()).unwrap();
            thread::spawn(move || worker.invoke(|| 2)).join().unwrap()
        });
        assert_eq!(value.unwrap(), 2);
    }

    #[test]
    fn test_nested_invoke_runs_inline() {
        let dispatcher = Arc::new(Dispatcher::spawn("test-nested").unwrap());
        let inner = dispatcher.clone();
        let value = dispatcher
            .invoke(move || {
                assert!(inner.is_dispatch_thread());
                inner.invoke(|| 21).unwrap() * 2
            })
            .unwrap();
        assert_eq!(value, 42);
    }
}
