//! # Types
//!
//! Address and memory-region types shared by the host interface, the bitmap
//! engine and the reports.

pub mod address;
pub mod region;

pub use address::{parse_hex, Address};
pub use region::{MemoryRegion, Protection, RegionState, RegionType};
