//! The request manager.
//!
//! [`RequestManager`] ties the registry, the transport and the callback
//! dispatcher together. Every operation locks the registry once, does its
//! work and releases the lock before any user callback runs.
//!
//! # Tick
//!
//! [`RequestManager::tick`] is the only place asynchronous progress becomes
//! visible:
//!
//! 1. lock the registry
//! 2. drive the transport, unless the manager is suspended
//! 3. remove every complete request
//! 4. unlock and run the callbacks queued in step 2
//!
//! A request that completes during a tick is therefore reaped in that same
//! tick, and its completion callback runs once the tick releases the lock.

use crate::dispatch::Dispatcher;
use crate::fs::FsPersistence;
use crate::metrics::TickMetrics;
use crate::registry::{RequestRegistry, reap_completed};
use crate::state::{IssueContext, Plan, PlannedOperation, RequestSnapshot};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tickwire_core::{
    Callbacks, Handle, HandleGenerator, Headers, Payload, Persistence, RequestError, RequestKind,
    Transport, TransportRequest, UuidHandleGenerator, Verb,
};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Whether the transport was driven (false while suspended)
    pub drove: bool,
    /// Requests removed from the registry
    pub reaped: Vec<Handle>,
    /// Callbacks run after the lock was released
    pub dispatched: usize,
}

/// Builder for [`RequestManager`].
pub struct RequestManagerBuilder {
    transport: Arc<dyn Transport>,
    persistence: Option<Arc<dyn Persistence>>,
    generator: Option<Arc<dyn HandleGenerator>>,
}

impl RequestManagerBuilder {
    /// Use `persistence` for downloads and file uploads.
    #[must_use]
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Use `generator` to mint handles.
    #[must_use]
    pub fn handle_generator(mut self, generator: Arc<dyn HandleGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the manager. Defaults to the local filesystem and UUID handles.
    #[must_use]
    pub fn build(self) -> RequestManager {
        let generator = self
            .generator
            .unwrap_or_else(|| Arc::new(UuidHandleGenerator));
        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(FsPersistence::new()));

        RequestManager {
            registry: RequestRegistry::new(generator),
            transport: self.transport,
            persistence,
            dispatcher: Dispatcher::new(),
            suspended: AtomicBool::new(false),
            next_sub_operation: AtomicU64::new(1),
        }
    }
}

/// Tracks HTTP requests by handle and drives them on each tick.
///
/// # Example
///
/// ```ignore
/// let manager = RequestManager::new(Arc::new(transport));
/// let handle = manager.register(RequestKind::Single, Callbacks::new().on_complete(|c| {
///     println!("{} -> {:?}", c.info.url, c.status());
/// }));
/// manager.fetch(&handle, "https://example.com/")?;
///
/// loop {
///     manager.tick(Duration::from_millis(16));
///     if !manager.contains(&handle) {
///         break;
///     }
/// }
/// ```
pub struct RequestManager {
    registry: RequestRegistry,
    transport: Arc<dyn Transport>,
    persistence: Arc<dyn Persistence>,
    dispatcher: Dispatcher,
    suspended: AtomicBool,
    next_sub_operation: AtomicU64,
}

impl RequestManager {
    /// Manager over `transport` with default persistence and handles.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).build()
    }

    /// Start configuring a manager over `transport`.
    #[must_use]
    pub fn builder(transport: Arc<dyn Transport>) -> RequestManagerBuilder {
        RequestManagerBuilder {
            transport,
            persistence: None,
            generator: None,
        }
    }

    // ---- Registry ----------------------------------------------------------

    /// Register a new request and return its handle.
    pub fn register(&self, kind: RequestKind, callbacks: Callbacks) -> Handle {
        self.registry.register(kind, callbacks)
    }

    /// Snapshot of a request, or `None` if it is unknown or already reaped.
    #[must_use]
    pub fn find(&self, handle: &Handle) -> Option<RequestSnapshot> {
        self.registry.find(handle)
    }

    /// Whether `handle` is still tracked.
    #[must_use]
    pub fn contains(&self, handle: &Handle) -> bool {
        self.registry.contains(handle)
    }

    /// Number of tracked requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Handles of every tracked request.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        self.registry.handles()
    }

    /// Most recently registered handle.
    #[must_use]
    pub fn last_handle(&self) -> Option<Handle> {
        self.registry.last_registered()
    }

    // ---- Verbs -------------------------------------------------------------

    /// GET one URL; the body goes to the completion callback.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::HandleNotFound`] if `handle` is not tracked.
    pub fn fetch(&self, handle: &Handle, url: &str) -> Result<(), RequestError> {
        self.issue(
            handle,
            Plan::single(PlannedOperation::memory(TransportRequest::new(Verb::Get, url))),
        )
    }

    /// GET one URL and write the body to `path` before completion is reported.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::HandleNotFound`] if `handle` is not tracked.
    pub fn fetch_to_file(
        &self,
        handle: &Handle,
        url: &str,
        path: impl Into<PathBuf>,
    ) -> Result<(), RequestError> {
        self.issue(
            handle,
            Plan::single(PlannedOperation::file(
                TransportRequest::new(Verb::Get, url),
                path.into(),
            )),
        )
    }

    /// GET every URL as one batch.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::KindMismatch`] on a single-kind request,
    /// [`RequestError::EmptyBatch`] for no URLs, or
    /// [`RequestError::HandleNotFound`].
    pub fn fetch_many<S: AsRef<str>>(&self, handle: &Handle, urls: &[S]) -> Result<(), RequestError> {
        let operations = urls
            .iter()
            .map(|url| PlannedOperation::memory(TransportRequest::new(Verb::Get, url.as_ref())))
            .collect();
        self.issue(handle, Plan::batch(operations))
    }

    /// GET every URL as one batch, saving each body under `dir`.
    ///
    /// The file name is the last path segment of the URL, or
    /// `download-<index>` when the URL has none (or it is `.` or `..`).
    /// A name already taken by an earlier URL of the batch gets a
    /// `<index>-` prefix.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_many`](Self::fetch_many).
    pub fn fetch_many_to_dir<S: AsRef<str>>(
        &self,
        handle: &Handle,
        urls: &[S],
        dir: impl AsRef<Path>,
    ) -> Result<(), RequestError> {
        let dir = dir.as_ref();
        let operations = urls
            .iter()
            .zip(file_names_for(urls))
            .map(|(url, name)| {
                PlannedOperation::file(TransportRequest::new(Verb::Get, url.as_ref()), dir.join(name))
            })
            .collect();
        self.issue(handle, Plan::batch(operations))
    }

    /// PUT `payload` to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Source`] if the payload cannot be read, or
    /// [`RequestError::HandleNotFound`].
    pub fn store(
        &self,
        handle: &Handle,
        url: &str,
        payload: impl Into<Payload>,
    ) -> Result<(), RequestError> {
        let body = self.resolve_payload(handle, payload.into())?;
        self.issue(
            handle,
            Plan::single(PlannedOperation::memory(
                TransportRequest::new(Verb::Put, url).with_body(body),
            )),
        )
    }

    /// PUT each payload to its URL as one batch.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_many`](Self::fetch_many), plus [`RequestError::Source`].
    pub fn store_many(
        &self,
        handle: &Handle,
        items: Vec<(String, Payload)>,
    ) -> Result<(), RequestError> {
        let mut operations = Vec::with_capacity(items.len());
        for (url, payload) in items {
            let body = self.resolve_payload(handle, payload)?;
            operations.push(PlannedOperation::memory(
                TransportRequest::new(Verb::Put, url).with_body(body),
            ));
        }
        self.issue(handle, Plan::batch(operations))
    }

    /// POST the content of a local file to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Source`] if the file cannot be read, or
    /// [`RequestError::HandleNotFound`].
    pub fn create(
        &self,
        handle: &Handle,
        url: &str,
        local_path: impl Into<PathBuf>,
    ) -> Result<(), RequestError> {
        let body = self.resolve_payload(handle, Payload::File(local_path.into()))?;
        self.issue(
            handle,
            Plan::single(PlannedOperation::memory(
                TransportRequest::new(Verb::Post, url).with_body(body),
            )),
        )
    }

    /// POST to `url` with `params` appended as the query string.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::HandleNotFound`] if `handle` is not tracked.
    pub fn post_query(&self, handle: &Handle, url: &str, params: &str) -> Result<(), RequestError> {
        let target = if params.is_empty() {
            url.to_string()
        } else {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}{params}")
        };
        self.issue(
            handle,
            Plan::single(PlannedOperation::memory(TransportRequest::new(
                Verb::Post,
                target,
            ))),
        )
    }

    /// DELETE one URL.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::HandleNotFound`] if `handle` is not tracked.
    pub fn delete(&self, handle: &Handle, url: &str) -> Result<(), RequestError> {
        self.issue(
            handle,
            Plan::single(PlannedOperation::memory(TransportRequest::new(
                Verb::Delete,
                url,
            ))),
        )
    }

    /// DELETE every URL as one batch.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_many`](Self::fetch_many).
    pub fn delete_many<S: AsRef<str>>(&self, handle: &Handle, urls: &[S]) -> Result<(), RequestError> {
        let operations = urls
            .iter()
            .map(|url| PlannedOperation::memory(TransportRequest::new(Verb::Delete, url.as_ref())))
            .collect();
        self.issue(handle, Plan::batch(operations))
    }

    /// Send an arbitrary request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Source`] if the payload cannot be read, or
    /// [`RequestError::HandleNotFound`].
    pub fn send_raw(
        &self,
        handle: &Handle,
        verb: Verb,
        url: &str,
        headers: Headers,
        payload: impl Into<Payload>,
    ) -> Result<(), RequestError> {
        let body = self.resolve_payload(handle, payload.into())?;
        self.issue(
            handle,
            Plan::single(PlannedOperation::memory(
                TransportRequest::new(verb, url)
                    .with_headers(headers)
                    .with_body(body),
            )),
        )
    }

    // ---- Per-request control -----------------------------------------------

    /// Make the next issue on `handle` block until its sub-operations finish.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::HandleNotFound`] if `handle` is not tracked.
    pub fn set_synchronous(&self, handle: &Handle, synchronous: bool) -> Result<(), RequestError> {
        self.registry
            .with_request(handle, |state| state.set_synchronous(synchronous))
    }

    /// Suspend every live sub-operation of `handle`.
    ///
    /// Sub-operations issued while suspended start suspended.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::PartialSuspend`] if the transport refused some,
    /// or [`RequestError::HandleNotFound`].
    pub fn suspend_request(&self, handle: &Handle) -> Result<(), RequestError> {
        let transport = self.transport.as_ref();
        self.registry
            .with_request(handle, |state| state.suspend(transport))?
    }

    /// Undo [`suspend_request`](Self::suspend_request).
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::PartialSuspend`] if the transport refused some,
    /// or [`RequestError::HandleNotFound`].
    pub fn resume_request(&self, handle: &Handle) -> Result<(), RequestError> {
        let transport = self.transport.as_ref();
        self.registry
            .with_request(handle, |state| state.resume(transport))?
    }

    /// Cancel every live sub-operation of `handle`.
    ///
    /// Cancelled sub-operations still report a failed completion; the request
    /// is reaped once they have.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::PartialCancel`] if the transport refused some,
    /// or [`RequestError::HandleNotFound`].
    pub fn cancel_request(&self, handle: &Handle) -> Result<(), RequestError> {
        let transport = self.transport.as_ref();
        self.registry
            .with_request(handle, |state| state.cancel(transport))?
    }

    // ---- Manager-wide control ----------------------------------------------

    /// Stop driving the transport. Ticks still reap and deliver callbacks.
    ///
    /// Only the tick's drive step is affected. A synchronous issue still
    /// waits its sub-operations to completion while the manager is
    /// suspended.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
        tracing::info!("Request manager suspended");
    }

    /// Resume driving the transport.
    pub fn awaken(&self) {
        self.suspended.store(false, Ordering::Release);
        tracing::info!("Request manager awakened");
    }

    /// Whether [`suspend`](Self::suspend) is in effect.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Cancel every live sub-operation of every request.
    ///
    /// Every request is attempted even after a refusal.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::PartialCancel`] summing the refusals of all
    /// requests.
    pub fn cancel_all(&self) -> Result<(), RequestError> {
        let mut failed = 0;
        let mut total = 0;
        {
            let entries = self.registry.lock();
            for state in entries.values() {
                if let Err(RequestError::PartialCancel {
                    failed: f,
                    total: t,
                }) = state.cancel(self.transport.as_ref())
                {
                    failed += f;
                    total += t;
                } else {
                    total += state.live_sub_operations();
                }
            }
        }

        if failed == 0 {
            tracing::info!("Cancelled all requests");
            Ok(())
        } else {
            tracing::warn!(failed, total, "Some sub-operations refused to cancel");
            Err(RequestError::PartialCancel { failed, total })
        }
    }

    /// Advance the manager by one step.
    pub fn tick(&self, delta: Duration) -> TickReport {
        let start = Instant::now();
        let drove = !self.is_suspended();

        let reaped = {
            let mut entries = self.registry.lock();
            if drove {
                self.transport.drive(delta);
            }
            reap_completed(&mut entries)
        };

        let dispatched = self.dispatcher.flush();
        TickMetrics::record_tick(start.elapsed());
        tracing::trace!(drove, reaped = reaped.len(), dispatched, "Tick");

        TickReport {
            drove,
            reaped,
            dispatched,
        }
    }

    // ---- Internals ---------------------------------------------------------

    /// Resolve an upload body for `handle`, which must be tracked.
    fn resolve_payload(&self, handle: &Handle, payload: Payload) -> Result<Vec<u8>, RequestError> {
        self.registry.with_request(handle, |_| ())?;
        payload.into_bytes(self.persistence.as_ref()).map_err(|err| {
            tracing::warn!(handle = %handle, error = %err, "Could not read upload source");
            err
        })
    }

    fn issue(&self, handle: &Handle, plan: Plan) -> Result<(), RequestError> {
        let ctx = IssueContext {
            transport: self.transport.as_ref(),
            dispatcher: &self.dispatcher,
            persistence: &self.persistence,
            ids: &self.next_sub_operation,
        };
        let (ids, synchronous) = self.registry.with_request(handle, |state| {
            state
                .issue(&ctx, plan)
                .map(|ids| (ids, state.is_synchronous()))
        })??;

        if synchronous {
            tracing::debug!(handle = %handle, count = ids.len(), "Waiting for synchronous request");
            for id in ids {
                self.transport.wait(id);
            }
            self.dispatcher.flush_blocking();
        }
        Ok(())
    }

    pub(crate) fn discard_unissued(&self, handle: &Handle) {
        self.registry.discard_unissued(handle);
    }
}

impl fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestManager")
            .field("registry", &self.registry)
            .field("suspended", &self.is_suspended())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Local file name for a batch download.
fn file_name_for(url: &str, index: usize) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    after_scheme
        .split_once('/')
        .and_then(|(_, rest)| rest.rsplit('/').next())
        .filter(|segment| !matches!(*segment, "" | "." | "..") && !segment.contains('\\'))
        .map_or_else(|| format!("download-{index}"), ToString::to_string)
}

/// Distinct local file names for a batch download, in URL order.
fn file_names_for<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(urls.len());
    urls.iter()
        .enumerate()
        .map(|(index, url)| {
            let mut name = file_name_for(url.as_ref(), index);
            while taken.contains(&name) {
                name = format!("{index}-{name}");
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::Phase;
    use std::sync::Mutex;
    use tickwire_testing::{
        CallbackRecorder, InMemoryPersistence, MockResponse, MockTransport, RecordedEvent,
        SequentialHandleGenerator,
    };

    fn manager_with(transport: &Arc<MockTransport>) -> RequestManager {
        RequestManager::builder(Arc::clone(transport) as Arc<dyn Transport>)
            .persistence(Arc::new(InMemoryPersistence::new()))
            .handle_generator(Arc::new(SequentialHandleGenerator::new("req")))
            .build()
    }

    #[test]
    fn test_file_name_for_url() {
        assert_eq!(file_name_for("http://x/files/a.bin", 0), "a.bin");
        assert_eq!(file_name_for("http://x/files/a.bin?v=2", 0), "a.bin");
        assert_eq!(file_name_for("http://x/", 3), "download-3");
        assert_eq!(file_name_for("http://x", 4), "download-4");
        assert_eq!(file_name_for("http://x/a/..", 5), "download-5");
        assert_eq!(file_name_for("http://x/a/.", 6), "download-6");
    }

    #[test]
    fn test_batch_file_names_are_distinct() {
        let names = file_names_for(&[
            "http://x/one/a.bin",
            "http://y/two/a.bin",
            "http://x/b.bin",
            "http://z/a.bin",
        ]);
        assert_eq!(names, vec!["a.bin", "1-a.bin", "b.bin", "3-a.bin"]);
    }

    #[test]
    fn test_post_query_appends_params() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager_with(&transport);
        let handle = manager.register(RequestKind::Single, Callbacks::new());

        manager.post_query(&handle, "http://x/search", "q=rust&page=2").unwrap();
        manager.post_query(&handle, "http://x/search?lang=en", "q=rust").unwrap();

        let issued = transport.issued();
        assert_eq!(issued[0].url, "http://x/search?q=rust&page=2");
        assert_eq!(issued[0].verb, Verb::Post);
        assert_eq!(issued[1].url, "http://x/search?lang=en&q=rust");
    }

    #[test]
    fn test_store_sends_payload_body() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager_with(&transport);
        let handle = manager.register(RequestKind::Single, Callbacks::new());

        manager.store(&handle, "http://x/a.txt", "hello").unwrap();

        let issued = transport.issued();
        assert_eq!(issued[0].verb, Verb::Put);
        assert_eq!(issued[0].body, b"hello".to_vec());
    }

    #[test]
    fn test_create_reads_local_file() {
        let transport = Arc::new(MockTransport::new());
        let persistence = Arc::new(InMemoryPersistence::new());
        persistence.insert("/data/report.csv", b"a,b\n1,2\n".to_vec());
        let manager = RequestManager::builder(Arc::clone(&transport) as Arc<dyn Transport>)
            .persistence(persistence)
            .build();
        let handle = manager.register(RequestKind::Single, Callbacks::new());

        manager.create(&handle, "http://x/upload", "/data/report.csv").unwrap();
        let err = manager
            .create(&handle, "http://x/upload", "/data/missing.csv")
            .unwrap_err();

        assert_eq!(transport.issued()[0].body, b"a,b\n1,2\n".to_vec());
        assert!(matches!(err, RequestError::Source(_)));
        assert_eq!(transport.issued().len(), 1);
    }

    #[test]
    fn test_send_raw_passes_headers() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager_with(&transport);
        let handle = manager.register(RequestKind::Single, Callbacks::new());

        manager
            .send_raw(
                &handle,
                Verb::Patch,
                "http://x/item/1",
                vec![("If-Match".to_string(), "abc".to_string())],
                Vec::new(),
            )
            .unwrap();

        let issued = transport.issued();
        assert_eq!(issued[0].verb, Verb::Patch);
        assert_eq!(issued[0].headers, vec![("If-Match".to_string(), "abc".to_string())]);
    }

    #[test]
    fn test_fetch_many_to_dir_saves_each_body() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("http://x/a.bin", MockResponse::ok(vec![1]).after_ticks(1));
        transport.respond("http://x/b.bin", MockResponse::ok(vec![2]).after_ticks(1));
        let persistence = Arc::new(InMemoryPersistence::new());
        let manager = RequestManager::builder(Arc::clone(&transport) as Arc<dyn Transport>)
            .persistence(Arc::clone(&persistence) as Arc<dyn Persistence>)
            .build();
        let handle = manager.register(RequestKind::Multiple, Callbacks::new());

        manager
            .fetch_many_to_dir(&handle, &["http://x/a.bin", "http://x/b.bin"], "/downloads")
            .unwrap();
        manager.tick(Duration::ZERO);

        assert_eq!(persistence.load_bytes(Path::new("/downloads/a.bin")).unwrap(), vec![1]);
        assert_eq!(persistence.load_bytes(Path::new("/downloads/b.bin")).unwrap(), vec![2]);
    }

    #[test]
    fn test_synchronous_issue_completes_before_returning() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("http://x/a", MockResponse::ok(b"body".to_vec()).after_ticks(5));
        let manager = manager_with(&transport);
        let recorder = CallbackRecorder::new();
        let handle = manager.register(RequestKind::Single, recorder.callbacks());

        manager.set_synchronous(&handle, true).unwrap();
        manager.fetch(&handle, "http://x/a").unwrap();

        assert_eq!(recorder.completions().len(), 1);
        assert_eq!(manager.find(&handle).unwrap().phase, Phase::Complete);

        let report = manager.tick(Duration::ZERO);
        assert_eq!(report.reaped, vec![handle]);
    }

    #[test]
    fn test_suspend_stops_driving() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager_with(&transport);

        manager.suspend();
        assert!(manager.is_suspended());
        assert!(!manager.tick(Duration::ZERO).drove);
        assert_eq!(transport.drives(), 0);

        manager.awaken();
        assert!(manager.tick(Duration::ZERO).drove);
        assert_eq!(transport.drives(), 1);
    }

    #[test]
    fn test_callback_may_reenter_manager() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("http://x/a", MockResponse::ok(Vec::new()).after_ticks(1));
        let manager = Arc::new(manager_with(&transport));
        let seen = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&manager);
        let s = Arc::clone(&seen);
        let handle = manager.register(
            RequestKind::Single,
            Callbacks::new().on_complete(move |completion| {
                *s.lock().unwrap() = Some(inner.contains(&completion.info.handle));
            }),
        );
        manager.fetch(&handle, "http://x/a").unwrap();
        manager.tick(Duration::ZERO);

        // Reaped before the callback ran
        assert_eq!(*seen.lock().unwrap(), Some(false));
    }

    #[test]
    fn test_cancel_all_sums_refusals() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("http://x/a", MockResponse::ok(Vec::new()).after_ticks(5));
        transport.respond("http://x/b", MockResponse::ok(Vec::new()).after_ticks(5));
        transport.refuse_cancel("http://x/b");
        let manager = manager_with(&transport);

        let a = manager.register(RequestKind::Single, Callbacks::new());
        let b = manager.register(RequestKind::Single, Callbacks::new());
        manager.fetch(&a, "http://x/a").unwrap();
        manager.fetch(&b, "http://x/b").unwrap();

        let err = manager.cancel_all().unwrap_err();
        assert_eq!(err, RequestError::PartialCancel { failed: 1, total: 2 });
    }

    #[test]
    fn test_cancelled_request_reports_failure_and_is_reaped() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("http://x/a", MockResponse::ok(Vec::new()).after_ticks(5));
        let manager = manager_with(&transport);
        let recorder = CallbackRecorder::new();
        let handle = manager.register(RequestKind::Single, recorder.callbacks());

        manager.fetch(&handle, "http://x/a").unwrap();
        manager.cancel_request(&handle).unwrap();
        let report = manager.tick(Duration::ZERO);

        assert_eq!(report.reaped, vec![handle]);
        let completions = recorder.completions();
        assert_eq!(completions.len(), 1);
        assert!(!completions[0].succeeded());
        assert!(
            recorder
                .events()
                .iter()
                .all(|e| !matches!(e, RecordedEvent::AllComplete(_)))
        );
    }
}
