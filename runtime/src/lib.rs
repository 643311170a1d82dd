//! # Tickwire Runtime
//!
//! Runtime implementation of the Tickwire request lifecycle manager.
//!
//! This crate provides the [`RequestManager`] that tracks HTTP requests by
//! handle, drives them forward on each tick and delivers their callbacks.
//!
//! ## Core Components
//!
//! - **Request manager**: registry operations, verbs, pause/cancel and the tick
//! - **Registry**: handle-indexed map of request states, reaped once complete
//! - **Dispatcher**: runs user callbacks after the registry lock is released
//! - **Ticker**: optional Tokio task that ticks the manager on an interval
//! - **`ReqwestTransport`**: real HTTP transport built on `reqwest`
//! - **`FsPersistence`**: filesystem storage for downloads and uploads
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tickwire_core::{Callbacks, RequestKind};
//! use tickwire_runtime::{ReqwestTransport, RequestManager, Ticker};
//!
//! let transport = ReqwestTransport::new(tokio::runtime::Handle::current());
//! let manager = Arc::new(RequestManager::new(Arc::new(transport)));
//!
//! let handle = manager.register(
//!     RequestKind::Multiple,
//!     Callbacks::new().on_all_complete(|handle| println!("{handle} done")),
//! );
//! manager.fetch_many(&handle, &["https://example.com/a", "https://example.com/b"])?;
//!
//! let ticker = Ticker::spawn(Arc::clone(&manager), Duration::from_millis(16));
//! ```

/// Configuration loaded from the environment
pub mod config;

/// Deferred callback delivery
pub mod dispatch;

/// Filesystem persistence
pub mod fs;

/// `reqwest`-backed transport
pub mod http_transport;

/// The request manager
pub mod manager;

/// Prometheus metrics for observability
pub mod metrics;

/// Handle-indexed request registry
pub mod registry;

/// Per-request state and snapshots
pub mod state;

/// One-call register-and-issue helpers
mod submit;

/// Background tick driver
pub mod ticker;

pub use config::ManagerConfig;
pub use dispatch::Dispatcher;
pub use fs::FsPersistence;
pub use http_transport::{HttpTransportError, ReqwestTransport};
pub use manager::{RequestManager, RequestManagerBuilder, TickReport};
pub use registry::RequestRegistry;
pub use state::{Phase, RequestSnapshot, RequestState};
pub use ticker::Ticker;
