//! # Handle Registry
//!
//! Correlates exactly one terminal outcome with every command sent to the host.
//!
//! ## Philosophy
//!
//! - **Pairs, not ids**: every command gets two handles, one the host fires on
//!   success and one it fires on failure. Whichever fires first retires both.
//! - **Tolerant dispatch**: the host may deliver late or twice (a channel close
//!   racing a final message, for instance). Dispatching a handle that is not
//!   live is a silent no-op, never an error.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// Process-unique, monotonically increasing handle.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u64);

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// The two handles allocated for one in-flight command.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlePair {
    pub callback: Handle,
    pub error: Handle,
}

impl HandlePair {
    /// Returns the other handle of the pair.
    fn sibling(&self, handle: Handle) -> Handle {
        if handle == self.callback { self.error } else { self.callback }
    }
}

/// A continuation invoked with the payload the host dispatched.
pub type Continuation = Box<dyn FnOnce(Value) + Send + 'static>;

/// Both continuations of a pending call. Taken exactly once.
struct PendingCall {
    pair: HandlePair,
    continuations: Mutex<Option<(Continuation, Continuation)>>,
}

impl PendingCall {
    fn take(&self) -> Option<(Continuation, Continuation)> {
        self.continuations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Registry of pending calls, keyed by both handles of each pair.
///
/// Construct one per bridge and share it by reference; there is no global
/// instance. `register` and `dispatch` are the entire public surface.
pub struct Registry {
    entries: DashMap<Handle, Arc<PendingCall>>,
    next: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next: AtomicU64::new(0),
        }
    }

    /// Allocates a fresh pair: `{callback: n, error: n + 1}`.
    fn allocate(&self) -> HandlePair {
        let n = self.next.fetch_add(2, Ordering::Relaxed);
        HandlePair {
            callback: Handle(n),
            error: Handle(n + 1),
        }
    }

    /// Registers a success and a failure continuation and returns the pair
    /// of handles the host must answer with.
    pub fn register<S, E>(&self, on_success: S, on_error: E) -> HandlePair
    where
        S: FnOnce(Value) + Send + 'static,
        E: FnOnce(Value) + Send + 'static,
    {
        let pair = self.allocate();
        let pending = Arc::new(PendingCall {
            pair,
            continuations: Mutex::new(Some((Box::new(on_success), Box::new(on_error)))),
        });

        self.entries.insert(pair.callback, pending.clone());
        self.entries.insert(pair.error, pending);

        trace!(callback = %pair.callback, error = %pair.error, "registered handle pair");
        pair
    }

    /// Resolves the pending call owning `handle` with `payload`.
    ///
    /// Both handles of the pair are retired before the continuation runs, so
    /// the sibling can never fire afterwards. Unknown handles are ignored.
    pub fn dispatch(&self, handle: Handle, payload: Value) {
        let Some((_, pending)) = self.entries.remove(&handle) else {
            trace!(%handle, "dispatch for unknown handle ignored");
            return;
        };

        self.entries.remove(&pending.pair.sibling(handle));

        // Another thread may have dispatched the sibling between the removals.
        let Some((on_success, on_error)) = pending.take() else {
            return;
        };

        if handle == pending.pair.callback {
            on_success(payload);
        } else {
            on_error(payload);
        }
    }

    /// Retires a pair without invoking either continuation.
    pub(crate) fn discard(&self, pair: HandlePair) {
        self.entries.remove(&pair.callback);
        self.entries.remove(&pair.error);
    }

    /// Drops every pending continuation.
    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live handles (two per pending call).
    pub(crate) fn live_handles(&self) -> usize {
        self.entries.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
