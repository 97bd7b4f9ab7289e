//! Address ↔ bitmap offset arithmetic.
//!
//! Every 0x200 bytes of address space map to one 8-byte bitmap word, so the
//! translation is a shift and a multiply in one direction and the inverse in
//! the other. No I/O happens here.

use super::{CHUNK_BLOCK_SIZE, CHUNK_WORD_SIZE};
use crate::types::Address;

const CHUNK_SHIFT: u32 = CHUNK_BLOCK_SIZE.trailing_zeros();

/// Address of the bitmap word describing `address`.
///
/// `bitmap_base + (address >> 9) * 8`, wrapping on overflow. The result is
/// always 8-byte aligned relative to `bitmap_base`.
pub const fn to_bitmap_offset(bitmap_base: Address, address: Address) -> Address
{
    Address::new(
        bitmap_base
            .value()
            .wrapping_add((address.value() >> CHUNK_SHIFT).wrapping_mul(CHUNK_WORD_SIZE)),
    )
}

/// The address range described by a slice of the bitmap.
///
/// `offset` is the slice's distance from the bitmap base and `size` its
/// length in bytes. This is the inverse of [`to_bitmap_offset`]:
/// `((offset << 9) / 8, (size / 8) * 0x200)`.
pub const fn covered_range(offset: u64, size: u64) -> AddressRange
{
    AddressRange {
        start: Address::new((offset << CHUNK_SHIFT) / CHUNK_WORD_SIZE),
        size: (size / CHUNK_WORD_SIZE) * CHUNK_BLOCK_SIZE,
    }
}

/// A span of the inspected process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange
{
    /// First address of the span
    pub start: Address,
    /// Length in bytes
    pub size: u64,
}

impl AddressRange
{
    /// Create a range from its start and size.
    pub const fn new(start: Address, size: u64) -> Self
    {
        Self { start, size }
    }

    /// First address past the span (saturating).
    pub fn end(&self) -> Address
    {
        self.start.saturating_add(self.size)
    }

    /// Expand to whole chunk blocks.
    ///
    /// The start is rounded down to a 0x200 boundary and the chunk count is
    /// the ceiling of the remaining span, so a trailing partial block is
    /// always included.
    pub fn chunk_span(&self) -> ChunkSpan
    {
        let start = self.start.align_down(CHUNK_BLOCK_SIZE);
        let delta = self.end().value() - start.value();
        ChunkSpan {
            start,
            chunks: delta.div_ceil(CHUNK_BLOCK_SIZE),
        }
    }
}

/// A run of whole chunk blocks, the unit the decoder works in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan
{
    /// First covered address, 0x200 aligned
    pub start: Address,
    /// Number of 0x200-byte blocks
    pub chunks: u64,
}

impl ChunkSpan
{
    /// Covered address of the `index`-th chunk.
    pub fn chunk_address(&self, index: u64) -> Address
    {
        self.start + index * CHUNK_BLOCK_SIZE
    }

    /// Iterate the covered address of every chunk in order.
    pub fn addresses(&self) -> impl Iterator<Item = Address>
    {
        let span = *self;
        (0..span.chunks).map(move |index| span.chunk_address(index))
    }
}
