//! Arena of sandbox-native handles for one evaluation.
//!
//! Every handle created by host-side code is moved into the tracker and
//! addressed by a [`HandleId`] from then on. Teardown drains the arena with
//! [`HandleTracker::release_all`]; the tracker refuses to be dropped while
//! anything is still registered.

use flint_core::{HandleId, HandleStats, InternalError};
use std::collections::BTreeMap;
use thiserror::Error;

/// Misuse of the tracker; always an internal invariant failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The id was minted and already released
    #[error("handle {0} released twice")]
    DoubleRelease(HandleId),

    /// The id was never minted by this tracker
    #[error("handle {0} was never registered")]
    UnknownHandle(HandleId),
}

impl From<TrackerError> for InternalError {
    fn from(err: TrackerError) -> Self {
        InternalError::handle(err.to_string())
    }
}

/// Owning registry of live handles
#[derive(Debug)]
pub struct HandleTracker<H> {
    live: BTreeMap<HandleId, H>,
    next: u64,
    released: u64,
}

impl<H> HandleTracker<H> {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: BTreeMap::new(),
            next: 1,
            released: 0,
        }
    }

    /// Take ownership of a handle
    pub fn register(&mut self, handle: H) -> HandleId {
        let id = HandleId::new(self.next);
        self.next += 1;
        self.live.insert(id, handle);
        id
    }

    /// Borrow a live handle
    #[must_use]
    pub fn get(&self, id: HandleId) -> Option<&H> {
        self.live.get(&id)
    }

    /// Release a handle, returning ownership to the caller
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::DoubleRelease`] for an id already released and
    /// [`TrackerError::UnknownHandle`] for an id this tracker never minted.
    pub fn release(&mut self, id: HandleId) -> Result<H, TrackerError> {
        match self.live.remove(&id) {
            Some(handle) => {
                self.released += 1;
                Ok(handle)
            }
            None if id.value() > 0 && id.value() < self.next => Err(TrackerError::DoubleRelease(id)),
            None => Err(TrackerError::UnknownHandle(id)),
        }
    }

    /// Release every live handle exactly once, oldest first
    pub fn release_all(&mut self) -> Vec<H> {
        let drained: Vec<H> = std::mem::take(&mut self.live).into_values().collect();
        self.released += drained.len() as u64;
        drained
    }

    /// Number of live handles
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Accounting snapshot
    #[must_use]
    pub fn stats(&self) -> HandleStats {
        HandleStats {
            created: self.next - 1,
            released: self.released,
            live: self.live.len() as u64,
        }
    }

    /// Confirm every created handle was released
    ///
    /// # Errors
    ///
    /// Returns [`InternalError::HandleInvariant`] when the counts disagree.
    pub fn verify_balanced(&self) -> Result<HandleStats, InternalError> {
        let stats = self.stats();
        if !stats.balanced() {
            return Err(InternalError::handle(format!(
                "{} created, {} released, {} live at teardown",
                stats.created, stats.released, stats.live
            )));
        }
        Ok(stats)
    }
}

impl<H> Default for HandleTracker<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Drop for HandleTracker<H> {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            tracing::error!(live = self.live.len(), "handle tracker dropped with live handles");
            debug_assert!(std::thread::panicking(), "handle tracker dropped with live handles");
        }
    }
}
