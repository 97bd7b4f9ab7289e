//! Memory region metadata as reported by the host's region query.
//!
//! These mirror the fields of a Windows `MEMORY_BASIC_INFORMATION` record.
//! The core never builds regions itself outside of tests and the snapshot
//! host; it only classifies and prints what the host hands back.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use super::{parse_hex, Address};
use crate::error::GuardError;

/// `MEM_COMMIT`
pub const MEM_COMMIT: u32 = 0x1000;
/// `MEM_RESERVE`
pub const MEM_RESERVE: u32 = 0x2000;
/// `MEM_FREE`
pub const MEM_FREE: u32 = 0x1_0000;

/// `MEM_PRIVATE`
pub const MEM_PRIVATE: u32 = 0x2_0000;
/// `MEM_MAPPED`
pub const MEM_MAPPED: u32 = 0x4_0000;
/// `MEM_IMAGE`
pub const MEM_IMAGE: u32 = 0x100_0000;

bitflags! {
    /// Page protection flags (`PAGE_*` constants).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Protection: u32 {
        const NOACCESS = 0x01;
        const READONLY = 0x02;
        const READWRITE = 0x04;
        const WRITECOPY = 0x08;
        const EXECUTE = 0x10;
        const EXECUTE_READ = 0x20;
        const EXECUTE_READWRITE = 0x40;
        const EXECUTE_WRITECOPY = 0x80;
        const GUARD = 0x100;
        const NOCACHE = 0x200;
        const WRITECOMBINE = 0x400;
    }
}

impl Protection
{
    /// `true` unless the pages are no-access or guard pages.
    pub fn is_accessible(self) -> bool
    {
        !self.intersects(Protection::NOACCESS | Protection::GUARD)
    }
}

impl fmt::Display for Protection
{
    /// Renders the flag combination, e.g. `EXECUTE_READ|GUARD`. Bits without a
    /// name are appended in hex; an empty set prints as `-`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let mut parts: Vec<String> = self.iter_names().map(|(name, _)| name.to_string()).collect();
        let unknown = self.bits() & !Protection::all().bits();
        if unknown != 0 {
            parts.push(format!("0x{unknown:x}"));
        }

        if parts.is_empty() {
            f.pad("-")
        } else {
            f.pad(&parts.join("|"))
        }
    }
}

impl FromStr for Protection
{
    type Err = GuardError;

    /// Parses the `Display` form back: flag names joined by `|`, hex
    /// literals for unnamed bits, `-` for none.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let text = s.trim();
        if text.is_empty() || text == "-" {
            return Ok(Protection::empty());
        }

        let mut flags = Protection::empty();
        for part in text.split('|').map(str::trim) {
            if let Some(flag) = Protection::from_name(&part.to_ascii_uppercase()) {
                flags |= flag;
            } else if part.starts_with("0x") {
                let bits = u32::try_from(parse_hex(part)?)
                    .map_err(|_| GuardError::InvalidArgument(format!("protection bits out of range: {part}")))?;
                flags |= Protection::from_bits_retain(bits);
            } else {
                return Err(GuardError::InvalidArgument(format!("unknown protection flag: {part}")));
            }
        }
        Ok(flags)
    }
}

/// Allocation state of a region (`MEM_COMMIT`, `MEM_RESERVE`, `MEM_FREE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionState
{
    /// Backed by physical storage or the page file
    Commit,
    /// Address space reserved, no storage
    Reserve,
    /// Not allocated
    Free,
    /// A state value this crate does not know about
    Unknown(u32),
}

impl RegionState
{
    /// Decode a raw `MEM_*` state value.
    pub const fn from_raw(raw: u32) -> Self
    {
        match raw {
            MEM_COMMIT => RegionState::Commit,
            MEM_RESERVE => RegionState::Reserve,
            MEM_FREE => RegionState::Free,
            other => RegionState::Unknown(other),
        }
    }

    /// The raw `MEM_*` value.
    pub const fn raw(self) -> u32
    {
        match self {
            RegionState::Commit => MEM_COMMIT,
            RegionState::Reserve => MEM_RESERVE,
            RegionState::Free => MEM_FREE,
            RegionState::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for RegionState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            RegionState::Commit => f.pad("commit"),
            RegionState::Reserve => f.pad("reserve"),
            RegionState::Free => f.pad("free"),
            RegionState::Unknown(raw) => f.pad(&format!("0x{raw:x}")),
        }
    }
}

impl FromStr for RegionState
{
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_ascii_lowercase().as_str() {
            "commit" | "mem_commit" => Ok(RegionState::Commit),
            "reserve" | "mem_reserve" => Ok(RegionState::Reserve),
            "free" | "mem_free" => Ok(RegionState::Free),
            other => Err(GuardError::InvalidArgument(format!("unknown region state: {other}"))),
        }
    }
}

/// Allocation type of a region (`MEM_IMAGE`, `MEM_MAPPED`, `MEM_PRIVATE`).
///
/// Free regions carry no type, which the host reports as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionType
{
    /// Mapped view of an executable image
    Image,
    /// Mapped view of a section
    Mapped,
    /// Private allocation
    Private,
    /// No type (free memory)
    None,
    /// A type value this crate does not know about
    Unknown(u32),
}

impl RegionType
{
    /// Decode a raw `MEM_*` type value.
    pub const fn from_raw(raw: u32) -> Self
    {
        match raw {
            MEM_IMAGE => RegionType::Image,
            MEM_MAPPED => RegionType::Mapped,
            MEM_PRIVATE => RegionType::Private,
            0 => RegionType::None,
            other => RegionType::Unknown(other),
        }
    }

    /// The raw `MEM_*` value.
    pub const fn raw(self) -> u32
    {
        match self {
            RegionType::Image => MEM_IMAGE,
            RegionType::Mapped => MEM_MAPPED,
            RegionType::Private => MEM_PRIVATE,
            RegionType::None => 0,
            RegionType::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for RegionType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            RegionType::Image => f.pad("image"),
            RegionType::Mapped => f.pad("mapped"),
            RegionType::Private => f.pad("private"),
            RegionType::None => f.pad("-"),
            RegionType::Unknown(raw) => f.pad(&format!("0x{raw:x}")),
        }
    }
}

impl FromStr for RegionType
{
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "mem_image" => Ok(RegionType::Image),
            "mapped" | "mem_mapped" => Ok(RegionType::Mapped),
            "private" | "mem_private" => Ok(RegionType::Private),
            "" | "-" | "none" => Ok(RegionType::None),
            other => Err(GuardError::InvalidArgument(format!("unknown region type: {other}"))),
        }
    }
}

/// One region of the inspected process's address space
///
/// A region is a run of pages with identical state, protection and type
/// inside a single allocation. `allocation_base` is the base of the
/// allocation the region belongs to; several regions can share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion
{
    /// First address of the region
    pub base: Address,
    /// Base of the allocation this region is part of
    pub allocation_base: Address,
    /// Size in bytes
    pub size: u64,
    /// Commit/reserve/free state
    pub state: RegionState,
    /// Page protection
    pub protect: Protection,
    /// Image/mapped/private type
    pub region_type: RegionType,
}

impl MemoryRegion
{
    /// Create a region from its parts
    pub fn new(
        base: Address,
        allocation_base: Address,
        size: u64,
        state: RegionState,
        protect: Protection,
        region_type: RegionType,
    ) -> Self
    {
        Self {
            base,
            allocation_base,
            size,
            state,
            protect,
            region_type,
        }
    }

    /// First address past the end of the region (saturating).
    pub fn end(&self) -> Address
    {
        self.base.saturating_add(self.size)
    }

    /// `true` if `address` lies within `[base, end)`.
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.base && address < self.end()
    }

    /// `true` for committed memory.
    pub fn is_committed(&self) -> bool
    {
        self.state == RegionState::Commit
    }

    /// Committed and neither no-access nor guarded: safe to read.
    pub fn is_readable(&self) -> bool
    {
        self.is_committed() && self.protect.is_accessible()
    }

    /// The part of this region that falls inside `[start, end)`.
    ///
    /// Returns `None` when the two ranges do not overlap.
    #[must_use]
    pub fn clipped_to(&self, start: Address, end: Address) -> Option<Self>
    {
        let lo = self.base.max(start);
        let hi = self.end().min(end);
        if lo >= hi {
            return None;
        }

        Some(Self {
            base: lo,
            size: hi.value() - lo.value(),
            ..*self
        })
    }
}
