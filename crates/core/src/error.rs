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

use thiserror::Error;

use crate::ObjectId;

/// Errors raised while marshalling work onto the dispatch thread.
///
/// Unmatched bind requests, duplicate breakpoints and repeated closes are not
/// errors; they show up as `None` slots or no-ops instead.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The dispatch thread could not be started.
    #[error("failed to spawn the dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The dispatch thread has stopped and no longer accepts work.
    #[error("the dispatch thread is gone")]
    DispatcherGone,
    /// A blocking call was made from inside an async runtime.
    #[error("cannot wait for the dispatch thread from inside an async runtime")]
    InsideAsyncRuntime,
    /// A job panicked on the dispatch thread before producing its result.
    #[error("a dispatch job panicked before producing a result")]
    DispatchPanicked,
    /// An object was created under a parent that has already been closed.
    #[error("{kind} {id} has been closed")]
    ParentClosed {
        /// Kind of the closed parent.
        kind: &'static str,
        /// Id of the closed parent.
        id: ObjectId,
    },
}

/// Result alias used by the object manager.
pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
