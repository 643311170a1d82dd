//! Handle-indexed request registry.
//!
//! The registry is the single owner of every [`RequestState`]. All access
//! goes through one mutex; callers outside the crate only ever see
//! [`RequestSnapshot`] copies.

use crate::metrics::RegistryMetrics;
use crate::state::{Phase, RequestSnapshot, RequestState};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tickwire_core::{Callbacks, Handle, HandleGenerator, RequestError, RequestKind};

pub(crate) type Entries = HashMap<Handle, RequestState>;

/// Map from handle to request state.
pub struct RequestRegistry {
    entries: Mutex<Entries>,
    generator: Arc<dyn HandleGenerator>,
    last_registered: Mutex<Option<Handle>>,
}

impl RequestRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(generator: Arc<dyn HandleGenerator>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            generator,
            last_registered: Mutex::new(None),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a request in the `Created` phase and return its handle.
    ///
    /// A generated handle that collides with a live entry is discarded and a
    /// new one is drawn.
    pub fn register(&self, kind: RequestKind, callbacks: Callbacks) -> Handle {
        let (handle, size) = {
            let mut entries = self.lock();
            let mut handle = self.generator.next_handle();
            while entries.contains_key(&handle) {
                tracing::warn!(handle = %handle, "Generated handle already in use, drawing another");
                handle = self.generator.next_handle();
            }
            entries.insert(
                handle.clone(),
                RequestState::new(handle.clone(), kind, callbacks),
            );
            (handle, entries.len())
        };

        *self
            .last_registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());

        RegistryMetrics::record_registered();
        RegistryMetrics::record_size(size);
        tracing::info!(handle = %handle, kind = %kind, "Registered request");
        handle
    }

    /// Whether `handle` names a live entry.
    #[must_use]
    pub fn contains(&self, handle: &Handle) -> bool {
        self.lock().contains_key(handle)
    }

    /// Snapshot of the entry, or `None` if it is unknown or reaped.
    #[must_use]
    pub fn find(&self, handle: &Handle) -> Option<RequestSnapshot> {
        self.lock().get(handle).map(RequestState::snapshot)
    }

    /// Run `f` against the entry under the registry lock.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::HandleNotFound`] if `handle` is not live.
    pub(crate) fn with_request<R>(
        &self,
        handle: &Handle,
        f: impl FnOnce(&mut RequestState) -> R,
    ) -> Result<R, RequestError> {
        let mut entries = self.lock();
        match entries.get_mut(handle) {
            Some(state) => Ok(f(state)),
            None => {
                let err = RequestError::HandleNotFound(handle.clone());
                tracing::warn!(handle = %handle, "{err}");
                Err(err)
            }
        }
    }

    /// Remove an entry that never issued anything.
    ///
    /// Used to roll back a registration whose first operation failed.
    pub(crate) fn discard_unissued(&self, handle: &Handle) -> bool {
        let mut entries = self.lock();
        let unissued = entries
            .get(handle)
            .is_some_and(|state| state.phase() == Phase::Created);
        if unissued {
            entries.remove(handle);
            RegistryMetrics::record_size(entries.len());
            tracing::debug!(handle = %handle, "Discarded unissued request");
        }
        unissued
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Handles of every live entry, in no particular order.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        self.lock().keys().cloned().collect()
    }

    /// Most recently registered handle, even if it has since been reaped.
    #[must_use]
    pub fn last_registered(&self) -> Option<Handle> {
        self.last_registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("len", &self.len())
            .field("last_registered", &self.last_registered())
            .finish_non_exhaustive()
    }
}

/// Remove every complete entry and return the removed handles.
///
/// Handles are collected first and removed afterwards so the map is never
/// mutated while it is being walked.
pub(crate) fn reap_completed(entries: &mut Entries) -> Vec<Handle> {
    let done: Vec<Handle> = entries
        .iter()
        .filter(|(_, state)| state.is_complete())
        .map(|(handle, _)| handle.clone())
        .collect();

    for handle in &done {
        entries.remove(handle);
        tracing::debug!(handle = %handle, "Reaped completed request");
    }

    if !done.is_empty() {
        RegistryMetrics::record_reaped(done.len());
        RegistryMetrics::record_size(entries.len());
    }
    done
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use tickwire_core::{Persistence, Transport, TransportRequest, Verb};
    use tickwire_testing::{InMemoryPersistence, MockResponse, MockTransport, SequentialHandleGenerator};

    use crate::dispatch::Dispatcher;
    use crate::state::{IssueContext, Plan, PlannedOperation};

    struct RepeatingGenerator {
        handles: Mutex<Vec<Handle>>,
    }

    impl HandleGenerator for RepeatingGenerator {
        fn next_handle(&self) -> Handle {
            self.handles.lock().unwrap().remove(0)
        }
    }

    fn registry() -> RequestRegistry {
        RequestRegistry::new(Arc::new(SequentialHandleGenerator::new("req")))
    }

    #[test]
    fn test_register_creates_findable_entry() {
        let registry = registry();
        let handle = registry.register(RequestKind::Single, Callbacks::new());

        assert!(registry.contains(&handle));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.last_registered(), Some(handle.clone()));

        let snapshot = registry.find(&handle).unwrap();
        assert_eq!(snapshot.phase, Phase::Created);
        assert_eq!(snapshot.kind, RequestKind::Single);
    }

    #[test]
    fn test_colliding_handle_is_regenerated() {
        let registry = RequestRegistry::new(Arc::new(RepeatingGenerator {
            handles: Mutex::new(vec![Handle::new("a"), Handle::new("a"), Handle::new("b")]),
        }));

        let first = registry.register(RequestKind::Single, Callbacks::new());
        let second = registry.register(RequestKind::Single, Callbacks::new());

        assert_eq!(first, Handle::new("a"));
        assert_eq!(second, Handle::new("b"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_handle_is_reported() {
        let registry = registry();
        let missing = Handle::new("not-a-real-handle");

        assert!(registry.find(&missing).is_none());
        let err = registry.with_request(&missing, |_| ()).unwrap_err();
        assert_eq!(err, RequestError::HandleNotFound(missing));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_discard_only_removes_unissued_entries() {
        let registry = registry();
        let transport = MockTransport::new();
        transport.respond("http://x/a", MockResponse::ok(Vec::new()).after_ticks(3));
        let persistence: Arc<dyn Persistence> = Arc::new(InMemoryPersistence::new());
        let dispatcher = Dispatcher::new();
        let ids = AtomicU64::new(1);

        let unissued = registry.register(RequestKind::Single, Callbacks::new());
        let issued = registry.register(RequestKind::Single, Callbacks::new());
        registry
            .with_request(&issued, |state| {
                let ctx = IssueContext {
                    transport: &transport,
                    dispatcher: &dispatcher,
                    persistence: &persistence,
                    ids: &ids,
                };
                state.issue(
                    &ctx,
                    Plan::single(PlannedOperation::memory(TransportRequest::new(
                        Verb::Get,
                        "http://x/a",
                    ))),
                )
            })
            .unwrap()
            .unwrap();

        assert!(registry.discard_unissued(&unissued));
        assert!(!registry.discard_unissued(&issued));
        assert!(registry.contains(&issued));
    }

    #[test]
    fn test_reap_removes_only_complete_entries() {
        let registry = registry();
        let transport = MockTransport::new();
        transport.respond("http://x/fast", MockResponse::ok(Vec::new()).after_ticks(1));
        transport.respond("http://x/slow", MockResponse::ok(Vec::new()).after_ticks(3));
        let persistence: Arc<dyn Persistence> = Arc::new(InMemoryPersistence::new());
        let dispatcher = Dispatcher::new();
        let ids = AtomicU64::new(1);

        let idle = registry.register(RequestKind::Single, Callbacks::new());
        let issue = |url: &str| {
            let handle = registry.register(RequestKind::Single, Callbacks::new());
            registry
                .with_request(&handle, |state| {
                    let ctx = IssueContext {
                        transport: &transport,
                        dispatcher: &dispatcher,
                        persistence: &persistence,
                        ids: &ids,
                    };
                    state.issue(
                        &ctx,
                        Plan::single(PlannedOperation::memory(TransportRequest::new(Verb::Get, url))),
                    )
                })
                .unwrap()
                .unwrap();
            handle
        };
        let fast = issue("http://x/fast");
        let slow = issue("http://x/slow");

        transport.drive(std::time::Duration::ZERO);
        let reaped = reap_completed(&mut registry.lock());

        assert_eq!(reaped, vec![fast.clone()]);
        assert!(!registry.contains(&fast));
        assert!(registry.contains(&slow));
        assert!(registry.contains(&idle));
    }
}
