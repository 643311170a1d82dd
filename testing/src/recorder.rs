//! Callback recording for assertions.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};
use tickwire_core::{Callbacks, Completion, Handle, Progress, RequestInfo, ResponseHead};

/// One callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    /// `on_header`
    Header(RequestInfo, ResponseHead),
    /// `on_progress`
    Progress(RequestInfo, Progress),
    /// `on_complete`
    Complete(Completion),
    /// `on_all_complete`
    AllComplete(Handle),
}

/// Records every callback invocation in order.
///
/// # Example
///
/// ```
/// use tickwire_testing::CallbackRecorder;
///
/// let recorder = CallbackRecorder::new();
/// let callbacks = recorder.callbacks();
/// assert!(callbacks.has_on_complete());
/// assert!(recorder.events().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CallbackRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl CallbackRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback set that records into this recorder.
    #[must_use]
    pub fn callbacks(&self) -> Callbacks {
        let header = Arc::clone(&self.events);
        let progress = Arc::clone(&self.events);
        let complete = Arc::clone(&self.events);
        let all_complete = Arc::clone(&self.events);

        Callbacks::new()
            .on_header(move |info, head| {
                header
                    .lock()
                    .unwrap()
                    .push(RecordedEvent::Header(info.clone(), head.clone()));
            })
            .on_progress(move |info, p| {
                progress
                    .lock()
                    .unwrap()
                    .push(RecordedEvent::Progress(info.clone(), p));
            })
            .on_complete(move |completion| {
                complete
                    .lock()
                    .unwrap()
                    .push(RecordedEvent::Complete(completion.clone()));
            })
            .on_all_complete(move |handle| {
                all_complete
                    .lock()
                    .unwrap()
                    .push(RecordedEvent::AllComplete(handle.clone()));
            })
    }

    /// Every recorded event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded completions, oldest first.
    #[must_use]
    pub fn completions(&self) -> Vec<Completion> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Complete(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of header callbacks.
    #[must_use]
    pub fn header_count(&self) -> usize {
        self.count(|e| matches!(e, RecordedEvent::Header(..)))
    }

    /// Number of progress callbacks.
    #[must_use]
    pub fn progress_count(&self) -> usize {
        self.count(|e| matches!(e, RecordedEvent::Progress(..)))
    }

    /// Number of aggregate completion callbacks.
    #[must_use]
    pub fn all_complete_count(&self) -> usize {
        self.count(|e| matches!(e, RecordedEvent::AllComplete(_)))
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn count(&self, f: impl Fn(&RecordedEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| f(e)).count()
    }
}
