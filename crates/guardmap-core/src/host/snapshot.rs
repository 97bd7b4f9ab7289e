//! # Process Snapshot
//!
//! An in-memory capture of a process that implements [`Host`]: symbol
//! addresses, the region map, module names and whatever memory blocks were
//! saved. Snapshots load from JSON so a capture taken on one machine can be
//! inspected anywhere.
//!
//! ## JSON layout
//!
//! ```json
//! {
//!   "symbols": { "ntdll!LdrSystemDllInitBlock": "0x7ffb3c1a1000" },
//!   "regions": [
//!     {
//!       "base": "0x7ffb3c000000", "allocation_base": "0x7ffb3c000000",
//!       "size": "0x1000", "state": "commit", "protect": "READONLY",
//!       "type": "image", "module": "ntdll.dll"
//!     }
//!   ],
//!   "memory": [
//!     { "address": "0x7ffb3c1a1000", "bytes": "00112233" },
//!     { "address": "0x7df500000000", "size": "0x1000" }
//!   ]
//! }
//! ```
//!
//! Numbers are hex strings. A memory block with `size` and no `bytes` is
//! zero-filled; with both, `bytes` is zero-padded up to `size`.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::Host;
use crate::error::{GuardError, GuardResult};
use crate::types::{parse_hex, Address, MemoryRegion, Protection, RegionState, RegionType};

/// First address past the 47-bit user-mode address space.
pub const USER_SPACE_END: Address = Address::new(0x8000_0000_0000);

const PAGE_SIZE: u64 = 0x1000;

#[derive(Debug, Clone)]
struct RegionEntry
{
    region: MemoryRegion,
    module: Option<String>,
}

/// Captured process state usable as a [`Host`]
///
/// Regions must not overlap and memory blocks must not overlap; both are
/// checked on insertion.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot
{
    symbols: HashMap<String, Address>,
    regions: BTreeMap<Address, RegionEntry>,
    memory: BTreeMap<Address, Vec<u8>>,
}

impl ProcessSnapshot
{
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Load a snapshot from a JSON file.
    ///
    /// ## Errors
    ///
    /// `Io` if the file cannot be read, otherwise whatever
    /// [`ProcessSnapshot::from_json`] reports.
    pub fn load(path: impl AsRef<Path>) -> GuardResult<Self>
    {
        let path = path.as_ref();
        debug!("Loading process snapshot from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a snapshot from JSON text.
    ///
    /// ## Errors
    ///
    /// - `Json`: malformed JSON or a bad hex number
    /// - `Hex`: memory bytes are not valid hex
    /// - `InvalidArgument`: unknown state, type or protection name
    /// - `Snapshot`: overlapping or empty regions and blocks
    pub fn from_json(text: &str) -> GuardResult<Self>
    {
        let file: SnapshotFile = serde_json::from_str(text)?;
        let mut snapshot = Self::new();

        for (name, address) in file.symbols {
            snapshot.insert_symbol(name, address);
        }

        for record in file.regions {
            let region = MemoryRegion::new(
                record.base,
                record.allocation_base.unwrap_or(record.base),
                record.size,
                record.state.parse()?,
                record.protect.as_deref().unwrap_or("-").parse()?,
                record.region_type.as_deref().unwrap_or("-").parse()?,
            );
            snapshot.insert_region(region, record.module)?;
        }

        for block in file.memory {
            let mut bytes = match block.bytes {
                Some(text) => hex::decode(text.trim())?,
                None => Vec::new(),
            };
            if let Some(size) = block.size {
                let size = usize::try_from(size)
                    .map_err(|_| GuardError::Snapshot(format!("memory block at {} is too large", block.address)))?;
                if bytes.len() > size {
                    return Err(GuardError::Snapshot(format!(
                        "memory block at {} has {} bytes but declares size 0x{size:x}",
                        block.address,
                        bytes.len()
                    )));
                }
                bytes.resize(size, 0);
            }
            snapshot.insert_memory(block.address, bytes)?;
        }

        debug!(
            "Snapshot loaded: {} symbols, {} regions, {} memory blocks",
            snapshot.symbols.len(),
            snapshot.regions.len(),
            snapshot.memory.len()
        );
        Ok(snapshot)
    }

    /// Add or replace a symbol.
    pub fn insert_symbol(&mut self, name: impl Into<String>, address: Address)
    {
        self.symbols.insert(name.into(), address);
    }

    /// Add a region, optionally naming the module mapped there.
    ///
    /// ## Errors
    ///
    /// `Snapshot` if the region is empty or overlaps an existing one.
    pub fn insert_region(&mut self, region: MemoryRegion, module: Option<String>) -> GuardResult<()>
    {
        if region.size == 0 {
            return Err(GuardError::Snapshot(format!("region at {} has zero size", region.base)));
        }
        if region.base.checked_add(region.size).is_none() {
            return Err(GuardError::Snapshot(format!("region at {} wraps the address space", region.base)));
        }

        let overlaps_previous = self
            .regions
            .range(..=region.base)
            .next_back()
            .is_some_and(|(_, prev)| prev.region.end() > region.base);
        let overlaps_next = self
            .regions
            .range(region.base..)
            .next()
            .is_some_and(|(base, _)| *base < region.end());
        if overlaps_previous || overlaps_next {
            return Err(GuardError::Snapshot(format!("region at {} overlaps another region", region.base)));
        }

        self.regions.insert(region.base, RegionEntry { region, module });
        Ok(())
    }

    /// Add a block of readable memory.
    ///
    /// ## Errors
    ///
    /// `Snapshot` if the block overlaps an existing block.
    pub fn insert_memory(&mut self, address: Address, bytes: Vec<u8>) -> GuardResult<()>
    {
        if bytes.is_empty() {
            return Ok(());
        }

        let end = address.saturating_add(bytes.len() as u64);
        let overlaps_previous = self
            .memory
            .range(..=address)
            .next_back()
            .is_some_and(|(base, data)| base.saturating_add(data.len() as u64) > address);
        let overlaps_next = self.memory.range(address..).next().is_some_and(|(base, _)| *base < end);
        if overlaps_previous || overlaps_next {
            return Err(GuardError::Snapshot(format!("memory block at {address} overlaps another block")));
        }

        self.memory.insert(address, bytes);
        Ok(())
    }

    /// Overwrite a little-endian `u64` inside an existing block.
    ///
    /// ## Errors
    ///
    /// `ReadFailed` if no single block holds all 8 bytes.
    pub fn write_u64(&mut self, address: Address, value: u64) -> GuardResult<()>
    {
        let (base, data) = self
            .memory
            .range_mut(..=address)
            .next_back()
            .ok_or(GuardError::ReadFailed { address: address.value(), len: 8 })?;
        let start = usize::try_from(address.value() - base.value()).unwrap_or(usize::MAX);
        let slot = data
            .get_mut(start..start.saturating_add(8))
            .ok_or(GuardError::ReadFailed { address: address.value(), len: 8 })?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn region_entry(&self, address: Address) -> Option<&RegionEntry>
    {
        self.regions
            .range(..=address)
            .next_back()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.region.contains(address))
    }

    /// The free gap around `address`, shaped like `VirtualQueryEx` reports it.
    fn free_region(&self, address: Address) -> MemoryRegion
    {
        let previous_end = self
            .regions
            .range(..=address)
            .next_back()
            .map_or(Address::ZERO, |(_, entry)| entry.region.end());
        let base = address.align_down(PAGE_SIZE).max(previous_end);
        let next = self
            .regions
            .range(address..)
            .next()
            .map_or(USER_SPACE_END, |(base, _)| *base);
        let end = next.min(USER_SPACE_END);

        MemoryRegion::new(
            base,
            Address::ZERO,
            end.value().saturating_sub(base.value()),
            RegionState::Free,
            Protection::NOACCESS,
            RegionType::None,
        )
    }
}

impl Host for ProcessSnapshot
{
    fn resolve_symbol(&self, name: &str) -> GuardResult<Address>
    {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| GuardError::SymbolNotFound(name.to_string()))
    }

    fn read_memory(&self, address: Address, len: usize) -> GuardResult<Vec<u8>>
    {
        if len == 0 {
            return Ok(Vec::new());
        }

        let failed = || GuardError::ReadFailed {
            address: address.value(),
            len,
        };
        let (base, data) = self.memory.range(..=address).next_back().ok_or_else(failed)?;
        let start = usize::try_from(address.value() - base.value()).map_err(|_| failed())?;
        data.get(start..start.saturating_add(len))
            .map(<[u8]>::to_vec)
            .ok_or_else(failed)
    }

    fn query_region(&self, address: Address) -> GuardResult<MemoryRegion>
    {
        if address >= USER_SPACE_END {
            return Err(GuardError::QueryFailed(address.value()));
        }

        Ok(self
            .region_entry(address)
            .map_or_else(|| self.free_region(address), |entry| entry.region))
    }

    fn module_name(&self, address: Address) -> Option<String>
    {
        let entry = self.region_entry(address)?;
        if let Some(name) = &entry.module {
            return Some(name.clone());
        }

        // Only the first region of an image usually carries the name.
        self.region_entry(entry.region.allocation_base)
            .and_then(|head| head.module.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotFile
{
    #[serde(default, deserialize_with = "hex_address_map")]
    symbols: HashMap<String, Address>,
    #[serde(default)]
    regions: Vec<RegionRecord>,
    #[serde(default)]
    memory: Vec<MemoryRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionRecord
{
    #[serde(deserialize_with = "hex_address")]
    base: Address,
    #[serde(default, deserialize_with = "optional_hex_address")]
    allocation_base: Option<Address>,
    #[serde(deserialize_with = "hex_u64")]
    size: u64,
    state: String,
    #[serde(default)]
    protect: Option<String>,
    #[serde(default, rename = "type")]
    region_type: Option<String>,
    #[serde(default)]
    module: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryRecord
{
    #[serde(deserialize_with = "hex_address")]
    address: Address,
    #[serde(default)]
    bytes: Option<String>,
    #[serde(default, deserialize_with = "optional_hex_u64")]
    size: Option<u64>,
}

fn hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_hex(&text).map_err(serde::de::Error::custom)
}

fn optional_hex_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|text| parse_hex(&text).map_err(serde::de::Error::custom))
        .transpose()
}

fn hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    hex_u64(deserializer).map(Address::new)
}

fn optional_hex_address<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_hex_u64(deserializer).map(|value| value.map(Address::new))
}

fn hex_address_map<'de, D>(deserializer: D) -> Result<HashMap<String, Address>, D::Error>
where
    D: Deserializer<'de>,
{
    HashMap::<String, String>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, text)| {
            parse_hex(&text)
                .map(|value| (name, Address::new(value)))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}
