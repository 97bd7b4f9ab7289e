//! Shared fixtures for the integration tests
//!
//! `world()` builds a small process: ntdll with the anchor structure, a CFG
//! bitmap reservation with one committed page, and an image whose bits live
//! on that page. `FakeHost` wraps any snapshot and can be told to fail reads
//! or region queries at chosen addresses.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;

use guardmap_core::bitmap::translate::to_bitmap_offset;
use guardmap_core::bitmap::BITMAP_SPAN;
use guardmap_core::error::{GuardError, GuardResult};
use guardmap_core::host::{Host, ProcessSnapshot};
use guardmap_core::locator::ANCHOR_SYMBOL;
use guardmap_core::types::{Address, MemoryRegion, Protection, RegionState, RegionType};

pub const NTDLL: u64 = 0x7ffb_3c00_0000;
pub const ANCHOR: u64 = 0x7ffb_3c1a_1000;
pub const BITMAP: u64 = 0x7df5_0000_0000;
pub const IMAGE: u64 = 0x7ff6_1000_0000;
pub const IMAGE_SIZE: u64 = 0x2000;

/// Bitmap page holding the words for `IMAGE`.
pub fn bitmap_page() -> Address
{
    to_bitmap_offset(Address::new(BITMAP), Address::new(IMAGE)).align_down(0x1000)
}

pub fn region(base: u64, allocation_base: u64, size: u64, state: RegionState, region_type: RegionType) -> MemoryRegion
{
    let protect = match (state, region_type) {
        (RegionState::Commit, RegionType::Image) => Protection::EXECUTE_READ,
        (RegionState::Commit, _) => Protection::READONLY,
        _ => Protection::NOACCESS,
    };
    MemoryRegion::new(Address::new(base), Address::new(allocation_base), size, state, protect, region_type)
}

/// Snapshot with ntdll, the anchor and a bitmap whose only committed page
/// covers `IMAGE`. Every bitmap word starts out zero.
pub fn world() -> ProcessSnapshot
{
    let mut snapshot = ProcessSnapshot::new();

    snapshot.insert_symbol(ANCHOR_SYMBOL, Address::new(ANCHOR));
    snapshot
        .insert_region(
            region(NTDLL, NTDLL, 0x20_0000, RegionState::Commit, RegionType::Image),
            Some("ntdll.dll".to_string()),
        )
        .unwrap();
    snapshot.insert_memory(Address::new(ANCHOR), vec![0; 0x100]).unwrap();
    snapshot.write_u64(Address::new(ANCHOR + 0xB0), BITMAP).unwrap();

    snapshot
        .insert_region(
            region(IMAGE, IMAGE, IMAGE_SIZE, RegionState::Commit, RegionType::Image),
            Some("app.exe".to_string()),
        )
        .unwrap();

    let page = bitmap_page().value();
    let bitmap_end = BITMAP + BITMAP_SPAN;
    for bitmap_region in [
        region(BITMAP, BITMAP, page - BITMAP, RegionState::Reserve, RegionType::Mapped),
        region(page, BITMAP, 0x1000, RegionState::Commit, RegionType::Mapped),
        region(page + 0x1000, BITMAP, bitmap_end - page - 0x1000, RegionState::Reserve, RegionType::Mapped),
    ] {
        snapshot.insert_region(bitmap_region, None).unwrap();
    }
    snapshot.insert_memory(Address::new(page), vec![0; 0x1000]).unwrap();

    snapshot
}

/// Store the bitmap word for the block containing `target`.
pub fn set_word(snapshot: &mut ProcessSnapshot, target: u64, bits: u64)
{
    let offset = to_bitmap_offset(Address::new(BITMAP), Address::new(target));
    snapshot.write_u64(offset, bits).unwrap();
}

/// A [`Host`] over a snapshot with injectable failures
pub struct FakeHost
{
    pub snapshot: ProcessSnapshot,
    failing_reads: HashSet<Address>,
    failing_queries: HashSet<Address>,
    queries: RefCell<Vec<Address>>,
}

impl FakeHost
{
    pub fn new(snapshot: ProcessSnapshot) -> Self
    {
        Self {
            snapshot,
            failing_reads: HashSet::new(),
            failing_queries: HashSet::new(),
            queries: RefCell::new(Vec::new()),
        }
    }

    /// Fail every read that touches `address`.
    pub fn fail_read(&mut self, address: Address)
    {
        self.failing_reads.insert(address);
    }

    /// Fail the bitmap word read for the block containing `target`.
    pub fn fail_word(&mut self, target: u64)
    {
        self.fail_read(to_bitmap_offset(Address::new(BITMAP), Address::new(target)));
    }

    /// Fail region queries at exactly `address`.
    pub fn fail_query(&mut self, address: Address)
    {
        self.failing_queries.insert(address);
    }

    /// Every address passed to `query_region`, in call order.
    pub fn queries(&self) -> Vec<Address>
    {
        self.queries.borrow().clone()
    }
}

impl Host for FakeHost
{
    fn resolve_symbol(&self, name: &str) -> GuardResult<Address>
    {
        self.snapshot.resolve_symbol(name)
    }

    fn read_memory(&self, address: Address, len: usize) -> GuardResult<Vec<u8>>
    {
        let end = address.saturating_add(len as u64);
        if self.failing_reads.iter().any(|bad| *bad >= address && *bad < end) {
            return Err(GuardError::ReadFailed {
                address: address.value(),
                len,
            });
        }
        self.snapshot.read_memory(address, len)
    }

    fn query_region(&self, address: Address) -> GuardResult<MemoryRegion>
    {
        self.queries.borrow_mut().push(address);
        if self.failing_queries.contains(&address) {
            return Err(GuardError::QueryFailed(address.value()));
        }
        self.snapshot.query_region(address)
    }

    fn module_name(&self, address: Address) -> Option<String>
    {
        self.snapshot.module_name(address)
    }
}
