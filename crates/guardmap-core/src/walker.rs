//! # Region Walker
//!
//! Walks the bitmap and the target's address space.
//!
//! Three walks are provided:
//!
//! 1. [`decode_range`]: read and render every word covering an explicit
//!    address range ([`survey_range`] reads the same words without rendering)
//! 2. [`BitmapBlocks`]: the committed blocks of the bitmap allocation itself,
//!    each translated back into the address range it describes
//! 3. [`TargetRegions`]: the target's own memory regions inside a range
//!
//! ## Forward Progress
//!
//! Both iterators query the host for the region containing a pointer and move
//! the pointer to the end of that region. The pointer strictly increases on
//! every step: a failed query or a region that ends at or before the pointer
//! advances it by one page instead. Neither walk ever revisits an address.

use tracing::{debug, warn};

use crate::bitmap::{AddressRange, CfgBitmap, ChunkFormatter, BITMAP_SPAN};
use crate::report::LineSink;
use crate::types::{Address, MemoryRegion};

/// Page granularity of region queries
pub const PAGE_SIZE: u64 = 0x1000;

/// What to do with a bitmap word that cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFailurePolicy
{
    /// Print a `failed, can't load map bits` row and continue
    #[default]
    Warn,
    /// Print nothing; the next row gets a continuation marker
    Skip,
}

/// Counters from one [`decode_range`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeStats
{
    /// Words the range was split into
    pub chunks: u64,
    /// Words read successfully
    pub decoded: u64,
    /// Words that could not be read
    pub failed: u64,
    /// Words with at least one entry set
    pub non_empty: u64,
    /// Data rows written
    pub rows: usize,
}

/// Decode every word covering `range` into `out`.
///
/// The range is widened to whole 0x200 blocks first, and a trailing partial
/// block is included. `formatter` carries the skip state between words, so
/// pass the same one for ranges that should read as a single run. Read
/// failures never stop the walk; a closed sink does.
pub fn decode_range(
    bitmap: &CfgBitmap<'_>,
    range: AddressRange,
    policy: ReadFailurePolicy,
    formatter: &mut ChunkFormatter,
    out: &mut dyn LineSink,
) -> RangeStats
{
    let span = range.chunk_span();
    let mut stats = RangeStats {
        chunks: span.chunks,
        ..RangeStats::default()
    };

    for address in span.addresses() {
        if out.is_closed() {
            debug!(%address, "output closed, range decode stopped");
            break;
        }
        match bitmap.read_chunk(address) {
            Ok(chunk) => {
                stats.decoded += 1;
                if !chunk.is_empty() {
                    stats.non_empty += 1;
                }
                stats.rows += formatter.write_chunk(&chunk, out);
            }
            Err(err) => {
                stats.failed += 1;
                debug!(%address, %err, "bitmap word unreadable");
                match policy {
                    ReadFailurePolicy::Warn => formatter.write_failure(address, out),
                    ReadFailurePolicy::Skip => formatter.mark_skipped(),
                }
            }
        }
    }

    stats
}

/// What [`survey_range`] found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeSurvey
{
    /// Words read successfully before the survey stopped
    pub decoded: u64,
    /// Words that could not be read before the survey stopped
    pub failed: u64,
    /// A word with at least one entry set was found
    pub has_targets: bool,
}

/// Read the words covering `range` the way [`decode_range`] does, without
/// rendering anything. Stops at the first word with an entry set.
pub fn survey_range(bitmap: &CfgBitmap<'_>, range: AddressRange) -> RangeSurvey
{
    let mut survey = RangeSurvey::default();
    for address in range.chunk_span().addresses() {
        match bitmap.read_chunk(address) {
            Ok(chunk) if !chunk.is_empty() => {
                survey.decoded += 1;
                survey.has_targets = true;
                break;
            }
            Ok(_) => survey.decoded += 1,
            Err(_) => survey.failed += 1,
        }
    }
    survey
}

/// Next probe position after `pointer`, given the end of the region it was
/// found in.
fn advance(pointer: Address, region_end: Address) -> Address
{
    if region_end > pointer {
        region_end
    } else {
        pointer.align_down(PAGE_SIZE).saturating_add(PAGE_SIZE)
    }
}

/// One step of the walk over the bitmap allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapBlock
{
    /// A committed, readable part of the bitmap and the address range it
    /// describes
    Committed
    {
        /// The bitmap region (clipped to the bitmap span)
        region: MemoryRegion,
        /// Address space described by `region`
        covered: AddressRange,
    },
    /// A reserved, free or inaccessible part of the bitmap, stepped over
    Skipped(MemoryRegion),
    /// The host could not describe this address; the walk moved one page on
    QueryFailed(Address),
    /// The region at this point belongs to another allocation; the walk ends
    /// here
    Mismatch(MemoryRegion),
}

/// Iterator over the regions of the bitmap allocation
///
/// Starts at the bitmap base and ends at `base + BITMAP_SPAN`, or right
/// after yielding a [`BitmapBlock::Mismatch`].
pub struct BitmapBlocks<'b, 'h>
{
    bitmap: &'b CfgBitmap<'h>,
    pointer: Address,
    end: Address,
    done: bool,
}

impl<'b, 'h> BitmapBlocks<'b, 'h>
{
    /// Walk the whole bitmap span.
    pub fn new(bitmap: &'b CfgBitmap<'h>) -> Self
    {
        Self {
            bitmap,
            pointer: bitmap.base(),
            end: bitmap.base().saturating_add(BITMAP_SPAN),
            done: false,
        }
    }
}

impl Iterator for BitmapBlocks<'_, '_>
{
    type Item = BitmapBlock;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.done || self.pointer >= self.end {
            return None;
        }

        let pointer = self.pointer;
        let region = match self.bitmap.host().query_region(pointer) {
            Ok(region) => region,
            Err(err) => {
                warn!(%pointer, %err, "bitmap region query failed");
                self.pointer = advance(pointer, pointer);
                return Some(BitmapBlock::QueryFailed(pointer));
            }
        };

        if region.allocation_base != self.bitmap.base() {
            warn!(
                %pointer,
                allocation_base = %region.allocation_base,
                bitmap = %self.bitmap.base(),
                "left the bitmap allocation"
            );
            self.done = true;
            return Some(BitmapBlock::Mismatch(region));
        }

        self.pointer = advance(pointer, region.end());

        let Some(clipped) = region.clipped_to(pointer, self.end) else {
            return Some(BitmapBlock::Skipped(region));
        };

        if !clipped.is_readable() {
            debug!(base = %clipped.base, size = clipped.size, state = %clipped.state, "skipping bitmap region");
            return Some(BitmapBlock::Skipped(clipped));
        }

        match self.bitmap.covered_by(clipped.base, clipped.size) {
            Some(covered) => Some(BitmapBlock::Committed {
                region: clipped,
                covered,
            }),
            None => Some(BitmapBlock::Skipped(clipped)),
        }
    }
}

/// One step of the walk over the target's own regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRegion
{
    /// A region, clipped to the walked range
    Region(MemoryRegion),
    /// The host could not describe this address; the walk moved one page on
    QueryFailed(Address),
}

/// Iterator over the memory regions intersecting `[start, end)`
pub struct TargetRegions<'h>
{
    host: &'h dyn crate::host::Host,
    pointer: Address,
    end: Address,
}

impl<'h> TargetRegions<'h>
{
    /// Walk the regions of `range`.
    pub fn new(host: &'h dyn crate::host::Host, range: AddressRange) -> Self
    {
        Self {
            host,
            pointer: range.start,
            end: range.end(),
        }
    }
}

impl Iterator for TargetRegions<'_>
{
    type Item = TargetRegion;

    fn next(&mut self) -> Option<Self::Item>
    {
        while self.pointer < self.end {
            let pointer = self.pointer;
            match self.host.query_region(pointer) {
                Ok(region) => {
                    self.pointer = advance(pointer, region.end());
                    if let Some(clipped) = region.clipped_to(pointer, self.end) {
                        return Some(TargetRegion::Region(clipped));
                    }
                }
                Err(err) => {
                    warn!(%pointer, %err, "region query failed");
                    self.pointer = advance(pointer, pointer);
                    return Some(TargetRegion::QueryFailed(pointer));
                }
            }
        }

        None
    }
}
