//! # docsync Testkit
//!
//! Test utilities for docsync.
//!
//! This crate provides:
//! - Store pairs and document helpers for replication scenarios
//! - Temporary JSON store files
//! - Property-based test generators using proptest
//! - An event recorder that collects replicator notifications
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docsync_testkit::prelude::*;
//!
//! #[test]
//! fn pushes_everything() {
//!     let pair = StorePair::new();
//!     create_documents(pair.local.as_ref(), 5, "test-key", "create");
//!     let replicator = pair.replicator(ReplicatorType::Push);
//!     let recorder = EventRecorder::attach(&replicator);
//!     replicator.start().unwrap();
//!     assert!(recorder.wait_for_level(ActivityLevel::Stopped, LONG_WAIT));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recorder;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recorder::*;
    pub use docsync_replicator::{ActivityLevel, ReplicatorType};
}

pub use fixtures::*;
pub use generators::*;
pub use recorder::*;
