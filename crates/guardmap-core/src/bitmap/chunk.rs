//! Bitmap words and the entries packed inside them.

use super::{translate, CHUNK_BLOCK_SIZE, CHUNK_WORD_SIZE, ENTRIES_PER_CHUNK, GRANULE_SIZE};
use crate::error::{GuardError, GuardResult};
use crate::host::Host;
use crate::types::Address;

/// Decoded state of one 16-byte granule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkEntry
{
    /// `00`: no valid call target in the granule
    NoTarget,
    /// `01`: the granule's first address is a valid call target
    SingleTarget,
    /// `1x`: every address of the granule is a valid call target
    RangeTarget,
}

impl ChunkEntry
{
    /// Decode the low two bits of `bits`.
    pub const fn from_bits(bits: u64) -> Self
    {
        if bits & 0b10 != 0 {
            ChunkEntry::RangeTarget
        } else if bits & 0b01 != 0 {
            ChunkEntry::SingleTarget
        } else {
            ChunkEntry::NoTarget
        }
    }

    /// The two-bit encoding. `RangeTarget` encodes as `10`.
    pub const fn bits(self) -> u64
    {
        match self {
            ChunkEntry::NoTarget => 0b00,
            ChunkEntry::SingleTarget => 0b01,
            ChunkEntry::RangeTarget => 0b10,
        }
    }
}

/// One 64-bit bitmap word and the 0x200 bytes of address space it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWord
{
    /// First covered address (0x200 aligned)
    pub address: Address,
    /// Raw little-endian word
    pub bits: u64,
}

impl ChunkWord
{
    /// Wrap a word read for the block starting at `address`.
    pub const fn new(address: Address, bits: u64) -> Self
    {
        Self { address, bits }
    }

    /// Build a word from per-entry states, entry 0 first.
    ///
    /// Missing trailing entries are `NoTarget`; extra entries are ignored.
    pub fn from_entries(address: Address, entries: &[ChunkEntry]) -> Self
    {
        let bits = entries
            .iter()
            .take(ENTRIES_PER_CHUNK)
            .enumerate()
            .fold(0u64, |word, (index, entry)| word | (entry.bits() << (index * 2)));
        Self { address, bits }
    }

    /// `true` if no granule in the block is a call target.
    pub const fn is_empty(&self) -> bool
    {
        self.bits == 0
    }

    /// State of the `index`-th granule (0..32).
    pub const fn entry(&self, index: usize) -> ChunkEntry
    {
        ChunkEntry::from_bits(self.bits >> (index * 2))
    }

    /// Every granule with its address, in address order.
    pub fn entries(&self) -> impl Iterator<Item = (Address, ChunkEntry)> + '_
    {
        (0..ENTRIES_PER_CHUNK).map(move |index| (self.address + index as u64 * GRANULE_SIZE, self.entry(index)))
    }
}

/// Read the bitmap word covering `address`.
///
/// `address` is rounded down to its 0x200 block. A failure means the state
/// of that block is unknown (the bitmap page may simply never have been
/// committed); callers decide whether to report it.
///
/// ## Errors
///
/// - `ReadFailed` / `ShortRead`: the 8 bytes could not be read in full
pub fn read_chunk(host: &dyn Host, bitmap_base: Address, address: Address) -> GuardResult<ChunkWord>
{
    let block = address.align_down(CHUNK_BLOCK_SIZE);
    let offset = translate::to_bitmap_offset(bitmap_base, block);
    let bits = host.read_u64(offset)?;
    Ok(ChunkWord::new(block, bits))
}

/// Read `count` consecutive words starting at the block holding `address`.
///
/// Used by the scanners that touch whole bitmap pages at a time; a single
/// host read either returns all words or fails.
///
/// ## Errors
///
/// - `ReadFailed` / `ShortRead`: the span could not be read in full
pub fn read_chunks(host: &dyn Host, bitmap_base: Address, address: Address, count: usize) -> GuardResult<Vec<ChunkWord>>
{
    let block = address.align_down(CHUNK_BLOCK_SIZE);
    let offset = translate::to_bitmap_offset(bitmap_base, block);
    let len = count * CHUNK_WORD_SIZE as usize;
    let bytes = host.read_memory(offset, len)?;
    if bytes.len() != len {
        return Err(GuardError::ShortRead {
            address: offset.value(),
            expected: len,
            actual: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(CHUNK_WORD_SIZE as usize)
        .enumerate()
        .map(|(index, word)| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(word);
            ChunkWord::new(block + index as u64 * CHUNK_BLOCK_SIZE, u64::from_le_bytes(raw))
        })
        .collect())
}
