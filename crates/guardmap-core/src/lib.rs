//! # guardmap-core
//!
//! Control Flow Guard bitmap inspection.
//!
//! Windows keeps one CFG bitmap per process: 2 bits for every 16 bytes of
//! user address space, saying whether an indirect call may land there. This
//! crate finds that bitmap, decodes it and correlates it with the process's
//! memory map.
//!
//! ## Layers
//!
//! - [`host`]: the [`Host`](host::Host) trait the engine reads through, and
//!   [`ProcessSnapshot`](host::ProcessSnapshot), a JSON-loadable capture
//! - [`bitmap`]: address translation, word reading and row rendering
//! - [`walker`]: range decoding and region walks with forward progress on
//!   failure
//! - [`locator`]: finding and validating the bitmap base
//! - [`report`]: the user-facing reports, streamed line by line into a sink
//!
//! The engine is single-threaded and synchronous. Nothing is cached between
//! reports.

pub mod bitmap;
pub mod error;
pub mod host;
pub mod locator;
pub mod prelude;
pub mod report;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use error::{GuardError, GuardResult};
pub use host::{Host, ProcessSnapshot};
pub use report::{Inspector, Report};
pub use types::{Address, MemoryRegion};
