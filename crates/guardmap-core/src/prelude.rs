//! Common module for library exports

pub use crate::bitmap::{AddressRange, CfgBitmap, ChunkEntry, ChunkFormatter, ChunkWord};
pub use crate::error::{GuardError, GuardResult};
pub use crate::host::{Host, ProcessSnapshot};
pub use crate::locator::{BitmapSource, CandidateField, Locator, ANCHOR_SYMBOL};
pub use crate::report::{CoverageFlag, Inspector, LineSink, Report, StreamSink};
pub use crate::types::address::Address;
pub use crate::types::region::{MemoryRegion, Protection, RegionState, RegionType};
pub use crate::walker::ReadFailurePolicy;
