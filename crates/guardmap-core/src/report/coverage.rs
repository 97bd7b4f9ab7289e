//! Tabular coverage summary.
//!
//! One row per target region covered by a committed bitmap block, flagged
//! with whether any of its bits are set. The flag column keeps the classic
//! single-character form: `+` bits set, blank none, `?` unknown.

use std::fmt;

use tracing::debug;

use super::{bitmap_banner, walk_warning, LineSink};
use crate::bitmap::{AddressRange, CfgBitmap};
use crate::types::{MemoryRegion, RegionType};
use crate::walker::{BitmapBlock, BitmapBlocks, TargetRegion, TargetRegions};

/// Whether a region has any CFG bits set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageFlag
{
    /// At least one entry is set
    Set,
    /// Every entry was read and none is set
    Clear,
    /// Nothing set in what could be read, but part of the bitmap was
    /// unreadable
    Unknown,
}

impl CoverageFlag
{
    /// Single-character column form.
    pub const fn as_char(self) -> char
    {
        match self {
            CoverageFlag::Set => '+',
            CoverageFlag::Clear => ' ',
            CoverageFlag::Unknown => '?',
        }
    }
}

impl fmt::Display for CoverageFlag
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.as_char())
    }
}

/// Scan the words covering `range`, one bitmap page per host read.
///
/// Stops at the first set entry.
pub fn scan(bitmap: &CfgBitmap<'_>, range: AddressRange) -> CoverageFlag
{
    let mut flag = CoverageFlag::Clear;
    for (address, words) in bitmap.pages(range) {
        match words {
            Ok(words) if words.iter().any(|word| !word.is_empty()) => return CoverageFlag::Set,
            Ok(_) => {}
            Err(err) => {
                debug!(%address, %err, "bitmap page unreadable");
                flag = CoverageFlag::Unknown;
            }
        }
    }
    flag
}

pub(super) fn write(bitmap: &CfgBitmap<'_>, out: &mut dyn LineSink)
{
    out.push_line(bitmap_banner(bitmap));

    for block in BitmapBlocks::new(bitmap) {
        match block {
            BitmapBlock::Committed { covered, .. } => {
                out.push_line(String::new());
                out.push_line(header());
                write_rows(bitmap, covered, out);
            }
            other => {
                if let Some(warning) = walk_warning(&other) {
                    out.push_line(warning);
                }
            }
        }
    }
}

fn write_rows(bitmap: &CfgBitmap<'_>, covered: AddressRange, out: &mut dyn LineSink)
{
    let host = bitmap.host();
    for step in TargetRegions::new(host, covered) {
        if out.is_closed() {
            return;
        }
        match step {
            TargetRegion::Region(region) => {
                // Only committed memory can hold call targets worth scanning.
                let flag = if region.is_committed() {
                    scan(bitmap, AddressRange::new(region.base, region.size))
                } else {
                    CoverageFlag::Clear
                };
                let module = match region.region_type {
                    RegionType::Image => host.module_name(region.base),
                    _ => None,
                };
                out.push_line(format_row(&region, flag, module.as_deref()));
            }
            TargetRegion::QueryFailed(address) => {
                out.push_line(format!("{:016x} {:<16} {:<16} ? query failed", address, "", ""));
            }
        }
    }
}

fn header() -> String
{
    format!(
        "{:<16} {:<16} {:<16} F {:<7} {:<7} {:<24} Module",
        "Start", "End", "Size", "Type", "State", "Protect"
    )
}

fn format_row(region: &MemoryRegion, flag: CoverageFlag, module: Option<&str>) -> String
{
    let row = format!(
        "{:016x} {:016x} {:016x} {} {:<7} {:<7} {:<24} {}",
        region.base,
        region.end(),
        region.size,
        flag,
        region.region_type,
        region.state,
        region.protect,
        module.unwrap_or("")
    );
    row.trim_end().to_string()
}
