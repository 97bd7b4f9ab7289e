//! # Host Trait
//!
//! The interface to whatever is hosting the inspection: a live debugger
//! session, a crash dump, or a captured [`ProcessSnapshot`].
//!
//! Every core operation takes the host explicitly (usually as `&dyn Host`)
//! instead of reaching for process-wide handles, so the engine runs the same
//! against a real target and against a fake in tests.
//!
//! ## Contract
//!
//! All calls are synchronous request/response and may fail individually.
//! A failure says something about that one address, never about the host as a
//! whole; callers decide whether it is fatal.

mod snapshot;

pub use snapshot::{ProcessSnapshot, USER_SPACE_END};

use crate::error::GuardResult;
use crate::types::{Address, MemoryRegion};

/// Services the bitmap engine needs from the inspection host
///
/// ## Thread Safety
///
/// Hosts are used from a single thread. Nothing here requires `Send` or
/// `Sync`.
pub trait Host
{
    /// Resolve a `module!symbol` name to its virtual address
    ///
    /// ## Errors
    ///
    /// - `SymbolNotFound`: the host has no address for `name`
    fn resolve_symbol(&self, name: &str) -> GuardResult<Address>;

    /// Read exactly `len` bytes starting at `address`
    ///
    /// Implementations must not return a shorter buffer; a partial read is a
    /// failure.
    ///
    /// ## Errors
    ///
    /// - `ReadFailed`: some byte of the range is unmapped or inaccessible
    /// - `ShortRead`: the underlying source returned fewer bytes
    fn read_memory(&self, address: Address, len: usize) -> GuardResult<Vec<u8>>;

    /// Describe the region containing `address`
    ///
    /// Follows `VirtualQueryEx` semantics: an address in unallocated space
    /// yields a `Free` region spanning the gap.
    ///
    /// ## Errors
    ///
    /// - `QueryFailed`: the address cannot be described (e.g. outside the
    ///   user address space)
    fn query_region(&self, address: Address) -> GuardResult<MemoryRegion>;

    /// Name of the module mapped at `address`, if any
    ///
    /// Best effort; `None` is not an error.
    fn module_name(&self, address: Address) -> Option<String>;

    /// Read a little-endian `u64` at `address`.
    ///
    /// ## Errors
    ///
    /// Whatever `read_memory` reports, or `ShortRead` if the host broke the
    /// exact-length contract.
    fn read_u64(&self, address: Address) -> GuardResult<u64>
    {
        let bytes = self.read_memory(address, 8)?;
        let word: [u8; 8] = bytes.as_slice().try_into().map_err(|_| crate::error::GuardError::ShortRead {
            address: address.value(),
            expected: 8,
            actual: bytes.len(),
        })?;
        Ok(u64::from_le_bytes(word))
    }
}
