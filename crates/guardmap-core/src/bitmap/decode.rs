//! Rendering bitmap words as rows of glyphs.
//!
//! A word is printed as 8 rows of 4 columns. Each row covers 0x40 bytes of
//! address space; each column is one 16-byte granule drawn 16 characters
//! wide, one character per byte:
//!
//! ```text
//!    Address          0123456789abcdef   0123456789abcdef   0123456789abcdef   0123456789abcdef
//!  0000000003fce800 | ................ | ++++++++++++++++ | ................ | ................
//!  0000000003fce840 | ................ | +............... | ................ | ................
//!   ...
//!  0000000003fce980 | ................ | ++++++++++++++++ | ................ | ................
//! ```
//!
//! With clipping on, rows whose byte of the word is zero are dropped and each
//! dropped run is replaced by a single `...` row.

use super::chunk::{ChunkEntry, ChunkWord};
use super::ROW_SPAN;
use crate::report::LineSink;
use crate::types::Address;

/// Glyph for a granule that is entirely valid (`RangeTarget`).
pub const RANGE_GLYPH: &str = "++++++++++++++++";
/// Glyph for a granule whose first byte is valid (`SingleTarget`).
pub const SINGLE_GLYPH: &str = "+...............";
/// Glyph for a granule with no target.
pub const EMPTY_GLYPH: &str = "................";

const HEADER: &str = "   Address          0123456789abcdef   0123456789abcdef   0123456789abcdef   0123456789abcdef";
const ELLIPSIS: &str = "  ...";
const ROWS_PER_CHUNK: usize = 8;
const COLUMNS_PER_ROW: usize = 4;

impl ChunkEntry
{
    /// The 16-character column drawn for this entry.
    pub const fn glyph(self) -> &'static str
    {
        match self {
            ChunkEntry::RangeTarget => RANGE_GLYPH,
            ChunkEntry::SingleTarget => SINGLE_GLYPH,
            ChunkEntry::NoTarget => EMPTY_GLYPH,
        }
    }
}

/// Run-elision bookkeeping carried across consecutive words
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClippingState
{
    /// A suppressed run is open and its `...` row has not been written yet
    pub skipped: bool,
    /// At least one row (data or warning) has been written
    pub emitted: bool,
}

/// Stateful formatter for a sequence of bitmap words
///
/// Keep one formatter per contiguous region so the ellipsis and header logic
/// sees the whole run.
#[derive(Debug, Clone)]
pub struct ChunkFormatter
{
    clipped: bool,
    lazy_header: bool,
    indent: String,
    state: ClippingState,
}

impl ChunkFormatter
{
    /// Create a formatter. `clipped` enables run elision.
    pub fn new(clipped: bool) -> Self
    {
        Self {
            clipped,
            lazy_header: false,
            indent: String::new(),
            state: ClippingState::default(),
        }
    }

    /// Prefix every row with `level` two-space indents.
    #[must_use]
    pub fn with_indent(mut self, level: usize) -> Self
    {
        self.indent = "  ".repeat(level);
        self
    }

    /// Write the column header just before the first row, and never if no
    /// row is written.
    #[must_use]
    pub fn with_lazy_header(mut self) -> Self
    {
        self.lazy_header = true;
        self
    }

    /// Current elision state.
    pub fn state(&self) -> ClippingState
    {
        self.state
    }

    /// Write the blank separator line and the column header.
    pub fn write_header(&self, out: &mut dyn LineSink)
    {
        out.push_line(String::new());
        out.push_line(format!("{}{HEADER}", self.indent));
    }

    /// Open (or extend) a suppressed run without writing anything.
    ///
    /// Used when a word is skipped for a reason other than being zero, so
    /// the next row still gets a continuation marker.
    pub fn mark_skipped(&mut self)
    {
        self.state.skipped = true;
    }

    /// Write the warning row for a word that could not be read.
    ///
    /// A pending `...` row stays pending: it is written before the next data
    /// row, not before the warning.
    pub fn write_failure(&mut self, address: Address, out: &mut dyn LineSink)
    {
        self.start_output(out);
        out.push_line(format!("{} {:016x} | failed, can't load map bits", self.indent, address.value()));
    }

    /// Write the rows for one word. Returns the number of data rows written.
    pub fn write_chunk(&mut self, chunk: &ChunkWord, out: &mut dyn LineSink) -> usize
    {
        let mut bits = chunk.bits;
        let mut written = 0;

        for row in 0..ROWS_PER_CHUNK {
            let row_bits = bits & 0xff;
            bits >>= 8;

            if self.clipped && row_bits == 0 {
                self.state.skipped = true;
                continue;
            }

            self.begin_row(out);
            let address = chunk.address + row as u64 * ROW_SPAN;
            out.push_line(format_row(&self.indent, address, row_bits));
            written += 1;
        }

        written
    }

    fn start_output(&mut self, out: &mut dyn LineSink)
    {
        if self.lazy_header && !self.state.emitted {
            self.write_header(out);
        }
        self.state.emitted = true;
    }

    fn begin_row(&mut self, out: &mut dyn LineSink)
    {
        self.start_output(out);
        if self.state.skipped {
            out.push_line(format!("{}{ELLIPSIS}", self.indent));
            self.state.skipped = false;
        }
    }
}

fn format_row(indent: &str, address: Address, row_bits: u64) -> String
{
    let mut line = format!("{indent} {:016x}", address.value());
    for column in 0..COLUMNS_PER_ROW {
        line.push_str(" | ");
        line.push_str(ChunkEntry::from_bits(row_bits >> (column * 2)).glyph());
    }
    line
}
