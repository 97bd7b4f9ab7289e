//! # Bitmap Locator
//!
//! Finds the CFG bitmap of the inspected process.
//!
//! ntdll keeps the bitmap base in `LdrSystemDllInitBlock`, but the field has
//! moved between releases. The locator resolves the anchor symbol and probes
//! an ordered list of [`CandidateField`]s; a candidate is accepted only if it
//! is itself the base of a mapped allocation, which is how the kernel maps
//! the bitmap into every process.
//!
//! Supporting a new layout means adding a field to the list, not changing the
//! search.

use tracing::debug;

use crate::error::{GuardError, GuardResult};
use crate::host::Host;
use crate::types::{Address, RegionType};

/// Symbol the bitmap pointer is read from
pub const ANCHOR_SYMBOL: &str = "ntdll!LdrSystemDllInitBlock";

/// One place the bitmap pointer may live inside the anchor structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateField
{
    /// Short description used in logs
    pub label: &'static str,
    /// Byte offset from the anchor symbol
    pub offset: u64,
}

/// Known layouts of the anchor structure, newest first
pub const CFG_BITMAP_FIELDS: &[CandidateField] = &[
    CandidateField {
        label: "CfgBitMap after 128-bit MitigationOptionsMap",
        offset: 0xB0,
    },
    CandidateField {
        label: "CfgBitMap after 64-bit MitigationOptions",
        offset: 0xA8,
    },
];

/// `true` if `candidate` is the base of a mapped allocation.
///
/// A failed region query counts as "no".
pub fn is_bitmap_base(host: &dyn Host, candidate: Address) -> bool
{
    match host.query_region(candidate) {
        Ok(region) => region.allocation_base == candidate && region.region_type == RegionType::Mapped,
        Err(err) => {
            debug!(%candidate, %err, "candidate region query failed");
            false
        }
    }
}

/// Anchor-based bitmap search
#[derive(Debug, Clone)]
pub struct Locator
{
    anchor: String,
    fields: Vec<CandidateField>,
}

impl Default for Locator
{
    fn default() -> Self
    {
        Self::new(ANCHOR_SYMBOL, CFG_BITMAP_FIELDS.to_vec())
    }
}

impl Locator
{
    /// Search `fields`, in order, relative to the symbol `anchor`.
    pub fn new(anchor: impl Into<String>, fields: Vec<CandidateField>) -> Self
    {
        Self {
            anchor: anchor.into(),
            fields,
        }
    }

    /// Same candidate fields, different anchor symbol.
    #[must_use]
    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self
    {
        self.anchor = anchor.into();
        self
    }

    /// The anchor symbol name.
    pub fn anchor(&self) -> &str
    {
        &self.anchor
    }

    /// The candidate fields in probe order.
    pub fn fields(&self) -> &[CandidateField]
    {
        &self.fields
    }

    /// Find the bitmap base.
    ///
    /// Unreadable and null candidates are passed over; the first one that
    /// validates wins.
    ///
    /// ## Errors
    ///
    /// - `SymbolNotFound`: the anchor symbol does not resolve
    /// - `BitmapNotFound`: no candidate field validated
    pub fn locate(&self, host: &dyn Host) -> GuardResult<Address>
    {
        let anchor = host.resolve_symbol(&self.anchor)?;
        debug!(anchor = %self.anchor, address = %anchor, "resolved anchor symbol");

        for field in &self.fields {
            let slot = anchor + field.offset;
            let candidate = match host.read_u64(slot) {
                Ok(value) => Address::new(value),
                Err(err) => {
                    debug!(field = field.label, %slot, %err, "candidate field unreadable");
                    continue;
                }
            };

            if candidate == Address::ZERO {
                debug!(field = field.label, "candidate field is null");
                continue;
            }

            if is_bitmap_base(host, candidate) {
                debug!(field = field.label, bitmap = %candidate, "located CFG bitmap");
                return Ok(candidate);
            }

            debug!(field = field.label, %candidate, "candidate is not a mapped allocation base");
        }

        Err(GuardError::BitmapNotFound {
            anchor: self.anchor.clone(),
            tried: self.fields.len(),
        })
    }
}

/// Where the bitmap base comes from
#[derive(Debug, Clone)]
pub enum BitmapSource
{
    /// Search the anchor structure
    Anchor(Locator),
    /// Use a known base, after the same validation the search applies
    Fixed(Address),
}

impl Default for BitmapSource
{
    fn default() -> Self
    {
        BitmapSource::Anchor(Locator::default())
    }
}

impl BitmapSource
{
    /// Resolve and validate the bitmap base.
    ///
    /// ## Errors
    ///
    /// - `SymbolNotFound` / `BitmapNotFound`: from the anchor search
    /// - `BitmapRejected`: a fixed base is not a mapped allocation base
    pub fn resolve(&self, host: &dyn Host) -> GuardResult<Address>
    {
        match self {
            BitmapSource::Anchor(locator) => locator.locate(host),
            BitmapSource::Fixed(base) if is_bitmap_base(host, *base) => Ok(*base),
            BitmapSource::Fixed(base) => Err(GuardError::BitmapRejected(base.value())),
        }
    }
}
