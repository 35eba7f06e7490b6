use thiserror::Error;

use crate::coroutine::CoroutineId;

/// Misuse of a scheduler that was detected before any state was touched.
///
/// Only returned by the checked `try_*` methods. The unchecked methods panic
/// on the same conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The id is not below the capacity of the slot table.
    #[error("coroutine id {id} is out of range for a table of {capacity} slots")]
    InvalidId {
        /// The offending id.
        id: CoroutineId,
        /// Capacity of the slot table at the time of the call.
        capacity: usize,
    },

    /// A coroutine is already running, so nothing else may be resumed.
    #[error("coroutine {0} is already running")]
    AlreadyRunning(CoroutineId),

    /// Yielding requires a running coroutine.
    #[error("no coroutine is running")]
    NotRunning,
}

/// Result type of the checked scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;
