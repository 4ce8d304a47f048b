//! Error taxonomy for the reactive core.
//!
//! Computations and callbacks are explicit `Result`-returning closures; the
//! scheduler matches on the result and routes the error variant to a report
//! hook instead of letting anything escape the flush loop. Tracking and
//! reconciliation inconsistencies are diagnostics, not errors, and never
//! appear here.

use thiserror::Error;

/// Which kind of watcher an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherKind {
    /// Created by application code (`user` option).
    User,
    /// A render or other runtime-owned watcher.
    Render,
}

impl WatcherKind {
    /// Classify from the watcher's `user` flag.
    pub fn from_user_flag(user: bool) -> Self {
        if user {
            WatcherKind::User
        } else {
            WatcherKind::Render
        }
    }
}

impl std::fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatcherKind::User => f.write_str("user"),
            WatcherKind::Render => f.write_str("render"),
        }
    }
}

/// An error produced at a watcher boundary.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A watcher's computation failed.
    ///
    /// For user watchers this is caught and reported, and the watcher keeps
    /// its previous value. For render watchers it is surfaced to the error
    /// hook so the owning component can handle it.
    #[error("computation failed in {context}: {message}")]
    Computation {
        /// Which computation failed (e.g. a watcher expression description).
        context: String,
        /// Human-readable failure description.
        message: String,
        /// Which kind of watcher failed.
        kind: WatcherKind,
    },

    /// A subscriber's reaction callback failed.
    ///
    /// Always caught locally and reported; one failing watcher must not
    /// block the rest of the queue.
    #[error("callback failed in {context}: {message}")]
    Callback {
        /// Which callback failed.
        context: String,
        /// Human-readable failure description.
        message: String,
    },

    /// A watcher kept re-entering the queue during a single flush and
    /// exceeded the configured ceiling. Its processing for the current flush
    /// is abandoned; the flush continues.
    #[error("possible infinite update loop in {kind} watcher {id}")]
    CircularUpdate {
        /// Id of the offending watcher.
        id: u64,
        /// Which kind of watcher is looping.
        kind: WatcherKind,
    },
}

impl CoreError {
    /// Build a computation error.
    pub fn computation(context: impl Into<String>, message: impl Into<String>, user: bool) -> Self {
        Self::Computation {
            context: context.into(),
            message: message.into(),
            kind: WatcherKind::from_user_flag(user),
        }
    }

    /// Build a callback error.
    pub fn callback(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Callback {
            context: context.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_context() {
        let err = CoreError::computation("counter.double", "division by zero", true);
        let text = err.to_string();
        assert!(text.contains("counter.double"));
        assert!(text.contains("division by zero"));
    }

    #[test]
    fn circular_update_identifies_watcher_kind() {
        let user = CoreError::CircularUpdate {
            id: 7,
            kind: WatcherKind::User,
        };
        assert!(user.to_string().contains("user watcher 7"));

        let render = CoreError::CircularUpdate {
            id: 9,
            kind: WatcherKind::Render,
        };
        assert!(render.to_string().contains("render watcher 9"));
    }
}
