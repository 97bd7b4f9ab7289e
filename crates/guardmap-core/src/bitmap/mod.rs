//! # CFG Bitmap
//!
//! Layout of the Control Flow Guard bitmap and the primitives that read it.
//!
//! The bitmap holds 2 bits for every 16-byte granule of the user address
//! space. One 64-bit word therefore describes 32 granules, i.e. 0x200 bytes;
//! that block size is the stride for all reading and decoding.
//!
//! - [`translate`]: pure address ↔ bitmap offset arithmetic
//! - [`chunk`]: reading words and splitting them into entries
//! - [`decode`]: rendering words as rows of glyphs

pub mod chunk;
pub mod decode;
pub mod translate;

pub use chunk::{ChunkEntry, ChunkWord};
pub use decode::{ChunkFormatter, ClippingState};
pub use translate::{AddressRange, ChunkSpan};

use crate::error::GuardResult;
use crate::host::Host;
use crate::types::Address;

/// Bytes of address space described by one 2-bit entry
pub const GRANULE_SIZE: u64 = 0x10;

/// Bytes of address space described by one bitmap word
pub const CHUNK_BLOCK_SIZE: u64 = 0x200;

/// Size of one bitmap word in bytes
pub const CHUNK_WORD_SIZE: u64 = 8;

/// Entries packed into one word
pub const ENTRIES_PER_CHUNK: usize = 32;

/// Bytes of address space shown on one output row (4 entries)
pub const ROW_SPAN: u64 = 0x40;

/// Bitmap bytes fetched per bulk read
pub const BITMAP_PAGE_SIZE: u64 = 0x1000;

/// Size of the bitmap reservation for a 47-bit user address space
pub const BITMAP_SPAN: u64 = (0x8000_0000_0000 / CHUNK_BLOCK_SIZE) * CHUNK_WORD_SIZE;

/// A located bitmap bound to the host it lives in
///
/// Cheap to copy; it is only a base address and a host reference.
#[derive(Clone, Copy)]
pub struct CfgBitmap<'h>
{
    host: &'h dyn Host,
    base: Address,
}

impl<'h> CfgBitmap<'h>
{
    /// Bind a bitmap base to `host`.
    ///
    /// No validation happens here; see [`crate::locator`].
    pub fn new(host: &'h dyn Host, base: Address) -> Self
    {
        Self { host, base }
    }

    /// First byte of the bitmap allocation.
    pub fn base(&self) -> Address
    {
        self.base
    }

    /// The host the bitmap is read from.
    pub fn host(&self) -> &'h dyn Host
    {
        self.host
    }

    /// Address of the word describing `address`.
    pub fn offset_of(&self, address: Address) -> Address
    {
        translate::to_bitmap_offset(self.base, address)
    }

    /// Address space described by the bitmap bytes `[start, start + size)`.
    ///
    /// `start` must not lie below the base; such bytes describe nothing and
    /// yield `None`.
    pub fn covered_by(&self, start: Address, size: u64) -> Option<AddressRange>
    {
        start
            .offset_from(self.base)
            .map(|offset| translate::covered_range(offset, size))
    }

    /// Read the word covering `address`.
    ///
    /// ## Errors
    ///
    /// Transient read errors from the host.
    pub fn read_chunk(&self, address: Address) -> GuardResult<ChunkWord>
    {
        chunk::read_chunk(self.host, self.base, address)
    }

    /// Read `count` consecutive words starting at the block of `address`.
    ///
    /// ## Errors
    ///
    /// Transient read errors from the host.
    pub fn read_chunks(&self, address: Address, count: usize) -> GuardResult<Vec<ChunkWord>>
    {
        chunk::read_chunks(self.host, self.base, address, count)
    }

    /// Read the words covering `range`, one bitmap page per host call.
    ///
    /// Yields the first covered address of each batch with its words, or the
    /// error for that batch. A failed page does not end the iteration.
    pub fn pages(&self, range: AddressRange) -> PageReads<'_, 'h>
    {
        PageReads {
            bitmap: self,
            span: range.chunk_span(),
            done: 0,
        }
    }
}

/// Iterator returned by [`CfgBitmap::pages`]
pub struct PageReads<'b, 'h>
{
    bitmap: &'b CfgBitmap<'h>,
    span: ChunkSpan,
    done: u64,
}

impl Iterator for PageReads<'_, '_>
{
    type Item = (Address, GuardResult<Vec<ChunkWord>>);

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.done >= self.span.chunks {
            return None;
        }

        let address = self.span.chunk_address(self.done);
        let words_per_page = BITMAP_PAGE_SIZE / CHUNK_WORD_SIZE;
        let in_page = (self.bitmap.offset_of(address).value() % BITMAP_PAGE_SIZE) / CHUNK_WORD_SIZE;
        let count = (words_per_page - in_page).min(self.span.chunks - self.done);
        self.done += count;

        // `count` is at most one page of words.
        let words = self.bitmap.read_chunks(address, count as usize);
        Some((address, words))
    }
}

impl std::fmt::Debug for CfgBitmap<'_>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("CfgBitmap").field("base", &self.base).finish_non_exhaustive()
    }
}
