//! ITT reference collector.
//!
//! Loaded by instrumented binaries through `INTEL_LIBITTNOTIFY64`. Each
//! static part calls `__itt_api_init`, gets its function table filled from
//! [`exports::EXPORT_TABLE`], and has its own objects merged into the one
//! process-wide [`registry::Registry`]. Every call after that is written to
//! a plain-text call log.
//!
//! Top-level split:
//! - `registry`, `binder`, `spill`: the shared object namespace and how
//!   static parts join it
//! - `log`, `metadata`: the call log and typed payload rendering
//! - `lifecycle`, `calls`: the collector context and its per-call behavior
//! - `exports`: the `extern "C"` surface

pub mod binder;
mod calls;
pub mod config;
pub mod error;
pub mod exports;
pub mod lifecycle;
pub mod log;
pub mod metadata;
pub mod registry;
pub mod spill;

pub use config::CollectorConfig;
pub use error::CollectorError;
pub use lifecycle::{Collector, State};
pub use registry::{EventId, Found, Registry, RegistrySnapshot};
