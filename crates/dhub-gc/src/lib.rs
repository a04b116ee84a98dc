//! Garbage collection of unreferenced blobs.
//!
//! Blobs are shared by content and never reference-checked on delete, so the
//! collector is the only component that removes them. It runs a two-phase
//! mark-sweep: a blob is deleted only after two consecutive cycles observed
//! it unreferenced. This tolerates the window between a content upload and
//! the element that will reference it, and the middle of a copy-on-write
//! fan-out, without any cross-component locking.
//!
//! # Modules
//!
//! - [`error`] — Error types for collection
//! - [`config`] — [`GcConfig`] with pacing and interval settings
//! - [`signal`] — [`StopSignal`], the cooperative cancellation flag
//! - [`collector`] — [`GarbageCollector`] running single cycles
//! - [`worker`] — [`GcWorker`] running cycles on a background thread

pub mod collector;
pub mod config;
pub mod error;
pub mod signal;
pub mod worker;

pub use collector::{GarbageCollector, GcReport, GcState};
pub use config::GcConfig;
pub use error::{GcError, GcResult};
pub use signal::StopSignal;
pub use worker::GcWorker;
