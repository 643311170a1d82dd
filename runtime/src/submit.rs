//! One-call helpers that register a request and issue its first operation.
//!
//! If the operation is rejected the fresh registration is rolled back, so a
//! failed helper call leaves the registry as it found it.
//!
//! The `submit_*` helpers issue asynchronously. [`RequestManager::submit_with`]
//! takes any verb and can make the request synchronous before it issues.

use crate::manager::RequestManager;
use std::path::{Path, PathBuf};
use tickwire_core::{Callbacks, Handle, Headers, Payload, RequestError, RequestKind, Verb};

impl RequestManager {
    /// Register a request of `kind`, then run `op` against its handle.
    ///
    /// With `synchronous` set, the request is made synchronous before `op`
    /// runs, so the call returns once every sub-operation has finished and
    /// its callbacks have run. The request is still reaped by the next tick.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let handle = manager.submit_with(RequestKind::Single, callbacks, true, |m, h| {
    ///     m.fetch(h, "https://example.com/")
    /// })?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns whatever `op` returns; the registration is rolled back first.
    pub fn submit_with(
        &self,
        kind: RequestKind,
        callbacks: Callbacks,
        synchronous: bool,
        op: impl FnOnce(&Self, &Handle) -> Result<(), RequestError>,
    ) -> Result<Handle, RequestError> {
        let handle = self.register(kind, callbacks);
        let issued = if synchronous {
            self.set_synchronous(&handle, true)
                .and_then(|()| op(self, &handle))
        } else {
            op(self, &handle)
        };
        match issued {
            Ok(()) => Ok(handle),
            Err(err) => {
                self.discard_unissued(&handle);
                Err(err)
            }
        }
    }

    fn submit(
        &self,
        kind: RequestKind,
        callbacks: Callbacks,
        op: impl FnOnce(&Self, &Handle) -> Result<(), RequestError>,
    ) -> Result<Handle, RequestError> {
        self.submit_with(kind, callbacks, false, op)
    }

    /// Register a single request and GET `url`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub fn submit_get(&self, url: &str, callbacks: Callbacks) -> Result<Handle, RequestError> {
        self.submit(RequestKind::Single, callbacks, |m, h| m.fetch(h, url))
    }

    /// Register a batch request and GET every URL.
    ///
    /// # Errors
    ///
    /// See [`fetch_many`](Self::fetch_many).
    pub fn submit_get_many<S: AsRef<str>>(
        &self,
        urls: &[S],
        callbacks: Callbacks,
    ) -> Result<Handle, RequestError> {
        self.submit(RequestKind::Multiple, callbacks, |m, h| m.fetch_many(h, urls))
    }

    /// Register a single request and download `url` to `path`.
    ///
    /// # Errors
    ///
    /// See [`fetch_to_file`](Self::fetch_to_file).
    pub fn submit_download(
        &self,
        url: &str,
        path: impl Into<PathBuf>,
        callbacks: Callbacks,
    ) -> Result<Handle, RequestError> {
        let path = path.into();
        self.submit(RequestKind::Single, callbacks, |m, h| m.fetch_to_file(h, url, path))
    }

    /// Register a batch request and download every URL into `dir`.
    ///
    /// # Errors
    ///
    /// See [`fetch_many_to_dir`](Self::fetch_many_to_dir).
    pub fn submit_download_many<S: AsRef<str>>(
        &self,
        urls: &[S],
        dir: impl AsRef<Path>,
        callbacks: Callbacks,
    ) -> Result<Handle, RequestError> {
        self.submit(RequestKind::Multiple, callbacks, |m, h| {
            m.fetch_many_to_dir(h, urls, dir)
        })
    }

    /// Register a single request and PUT `payload` to `url`.
    ///
    /// # Errors
    ///
    /// See [`store`](Self::store).
    pub fn submit_put(
        &self,
        url: &str,
        payload: impl Into<Payload>,
        callbacks: Callbacks,
    ) -> Result<Handle, RequestError> {
        let payload = payload.into();
        self.submit(RequestKind::Single, callbacks, |m, h| m.store(h, url, payload))
    }

    /// Register a single request and POST a local file to `url`.
    ///
    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub fn submit_post_file(
        &self,
        url: &str,
        local_path: impl Into<PathBuf>,
        callbacks: Callbacks,
    ) -> Result<Handle, RequestError> {
        let local_path = local_path.into();
        self.submit(RequestKind::Single, callbacks, |m, h| {
            m.create(h, url, local_path)
        })
    }

    /// Register a single request and POST `params` as the query of `url`.
    ///
    /// # Errors
    ///
    /// See [`post_query`](Self::post_query).
    pub fn submit_post_query(
        &self,
        url: &str,
        params: &str,
        callbacks: Callbacks,
    ) -> Result<Handle, RequestError> {
        self.submit(RequestKind::Single, callbacks, |m, h| m.post_query(h, url, params))
    }

    /// Register a single request and DELETE `url`.
    ///
    /// # Errors
    ///
    /// See [`delete`](Self::delete).
    pub fn submit_delete(&self, url: &str, callbacks: Callbacks) -> Result<Handle, RequestError> {
        self.submit(RequestKind::Single, callbacks, |m, h| m.delete(h, url))
    }

    /// Register a batch request and DELETE every URL.
    ///
    /// # Errors
    ///
    /// See [`delete_many`](Self::delete_many).
    pub fn submit_delete_many<S: AsRef<str>>(
        &self,
        urls: &[S],
        callbacks: Callbacks,
    ) -> Result<Handle, RequestError> {
        self.submit(RequestKind::Multiple, callbacks, |m, h| m.delete_many(h, urls))
    }

    /// Register a single request and send an arbitrary request.
    ///
    /// # Errors
    ///
    /// See [`send_raw`](Self::send_raw).
    pub fn submit_raw(
        &self,
        verb: Verb,
        url: &str,
        headers: Headers,
        payload: impl Into<Payload>,
        callbacks: Callbacks,
    ) -> Result<Handle, RequestError> {
        let payload = payload.into();
        self.submit(RequestKind::Single, callbacks, |m, h| {
            m.send_raw(h, verb, url, headers, payload)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::manager::RequestManager;
    use crate::state::Phase;
    use std::sync::Arc;
    use std::time::Duration;
    use tickwire_core::{Callbacks, RequestError, RequestKind, Transport, Verb};
    use tickwire_testing::{CallbackRecorder, InMemoryPersistence, MockResponse, MockTransport};

    fn manager(transport: &Arc<MockTransport>) -> RequestManager {
        RequestManager::builder(Arc::clone(transport) as Arc<dyn Transport>)
            .persistence(Arc::new(InMemoryPersistence::new()))
            .build()
    }

    #[test]
    fn test_submit_get_registers_and_issues() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("http://x/a", MockResponse::ok(b"hi".to_vec()).after_ticks(1));
        let manager = manager(&transport);
        let recorder = CallbackRecorder::new();

        let handle = manager.submit_get("http://x/a", recorder.callbacks()).unwrap();
        let snapshot = manager.find(&handle).unwrap();
        assert_eq!(snapshot.kind, RequestKind::Single);
        assert_eq!(snapshot.verbs, vec![Verb::Get]);

        manager.tick(Duration::ZERO);
        assert!(!manager.contains(&handle));
        assert_eq!(recorder.completions()[0].content().unwrap().text(), "hi");
    }

    #[test]
    fn test_failed_submit_rolls_back_registration() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);

        let err = manager
            .submit_get_many::<&str>(&[], Callbacks::new())
            .unwrap_err();
        assert!(matches!(err, RequestError::EmptyBatch(_)));
        assert!(manager.is_empty());

        let err = manager
            .submit_post_file("http://x/upload", "/nowhere.bin", Callbacks::new())
            .unwrap_err();
        assert!(matches!(err, RequestError::Source(_)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_synchronous_submit_completes_before_returning() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("http://x/a", MockResponse::ok(b"done".to_vec()).after_ticks(4));
        let manager = manager(&transport);
        let recorder = CallbackRecorder::new();

        let handle = manager
            .submit_with(RequestKind::Single, recorder.callbacks(), true, |m, h| {
                m.fetch(h, "http://x/a")
            })
            .unwrap();

        assert_eq!(recorder.completions().len(), 1);
        let snapshot = manager.find(&handle).unwrap();
        assert!(snapshot.synchronous);
        assert_eq!(snapshot.phase, Phase::Complete);
        assert_eq!(transport.drives(), 0);

        assert_eq!(manager.tick(Duration::ZERO).reaped, vec![handle]);
    }

    #[test]
    fn test_failed_synchronous_submit_rolls_back() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);

        let err = manager
            .submit_with(RequestKind::Single, Callbacks::new(), true, |m, h| {
                m.fetch_many(h, &["http://x/a", "http://x/b"])
            })
            .unwrap_err();

        assert!(matches!(err, RequestError::KindMismatch(_)));
        assert!(manager.is_empty());
        assert!(transport.issued().is_empty());
    }

    #[test]
    fn test_submit_delete_many_uses_batch_kind() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);

        let handle = manager
            .submit_delete_many(&["http://x/a", "http://x/b"], Callbacks::new())
            .unwrap();

        let snapshot = manager.find(&handle).unwrap();
        assert_eq!(snapshot.kind, RequestKind::Multiple);
        assert_eq!(snapshot.verbs, vec![Verb::Delete, Verb::Delete]);
    }

    #[test]
    fn test_submit_raw_and_put() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);

        manager
            .submit_raw(Verb::Head, "http://x/a", Vec::new(), Vec::new(), Callbacks::new())
            .unwrap();
        manager
            .submit_put("http://x/b", "payload", Callbacks::new())
            .unwrap();
        manager
            .submit_post_query("http://x/c", "k=v", Callbacks::new())
            .unwrap();
        manager.submit_delete("http://x/d", Callbacks::new()).unwrap();

        let verbs: Vec<Verb> = transport.issued().iter().map(|r| r.verb).collect();
        assert_eq!(verbs, vec![Verb::Head, Verb::Put, Verb::Post, Verb::Delete]);
        assert_eq!(manager.len(), 4);
    }
}
