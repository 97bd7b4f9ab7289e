//! # Reports
//!
//! The user-facing commands, built from the locator, walker and decoder.
//!
//! Every report is written line by line into a [`LineSink`]. The `write_*`
//! methods of an [`Inspector`] stream into any sink (the CLI hands them a
//! [`StreamSink`] over stdout); the `*_report` methods collect the lines into
//! a [`Report`] for callers and tests that want them all at once.
//!
//! | streaming | collected | output |
//! |---|---|---|
//! | [`Inspector::write_range`] | [`Inspector::range_report`] | decoded bits of one address range |
//! | [`Inspector::write_map`] | [`Inspector::map_report`] | the whole bitmap, nested under the target's regions |
//! | [`Inspector::write_coverage`] | [`Inspector::coverage_report`] | one row per target region with a has-bits flag |
//! | [`Inspector::write_targets`] | [`Inspector::targets_report`] | one line per valid call target |
//!
//! ## Errors
//!
//! Reports never return an error. A fatal failure (unresolvable anchor,
//! exhausted locator, malformed argument) ends the report with a single
//! `Error: <message>` line; lines written before it are kept.
//!
//! ## Example
//!
//! ```rust
//! use guardmap_core::host::ProcessSnapshot;
//! use guardmap_core::report::Inspector;
//!
//! let host = ProcessSnapshot::new();
//! let report = Inspector::new(&host).range_report("0x401000", None);
//! assert_eq!(report.lines(), ["Error: Symbol not found: ntdll!LdrSystemDllInitBlock"]);
//! ```

mod coverage;
mod map;
mod range;
mod sink;
mod targets;

use std::fmt;

use tracing::error;

pub use coverage::CoverageFlag;
pub use sink::{LineSink, StreamSink};

use crate::bitmap::CfgBitmap;
use crate::error::{GuardError, GuardResult};
use crate::host::Host;
use crate::locator::BitmapSource;
use crate::walker::BitmapBlock;

/// Report output collected in memory, one entry per line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report
{
    lines: Vec<String>,
    aborted: bool,
}

impl Report
{
    /// Create an empty report.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Append one line (without a trailing newline).
    pub fn push(&mut self, line: impl Into<String>)
    {
        self.lines.push(line.into());
    }

    /// `true` if the report was cut short by a fatal failure.
    pub fn is_aborted(&self) -> bool
    {
        self.aborted
    }

    /// The lines written so far.
    pub fn lines(&self) -> &[String]
    {
        &self.lines
    }

    /// Number of lines.
    pub fn len(&self) -> usize
    {
        self.lines.len()
    }

    /// `true` if nothing has been written.
    pub fn is_empty(&self) -> bool
    {
        self.lines.is_empty()
    }

    /// Take the lines out.
    pub fn into_lines(self) -> Vec<String>
    {
        self.lines
    }
}

impl fmt::Display for Report
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

impl LineSink for Report
{
    fn push_line(&mut self, line: String)
    {
        self.lines.push(line);
    }

    fn abort(&mut self, err: &GuardError)
    {
        self.lines.push(sink::error_line(err));
        self.aborted = true;
    }
}

impl IntoIterator for Report
{
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.lines.into_iter()
    }
}

impl<'a> IntoIterator for &'a Report
{
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.lines.iter()
    }
}

/// Runs reports against one host
///
/// The bitmap is located afresh for every report; nothing is cached between
/// calls.
pub struct Inspector<'h>
{
    host: &'h dyn Host,
    source: BitmapSource,
}

impl<'h> Inspector<'h>
{
    /// Inspect `host`, locating the bitmap through the default anchor.
    pub fn new(host: &'h dyn Host) -> Self
    {
        Self {
            host,
            source: BitmapSource::default(),
        }
    }

    /// Use a different way of finding the bitmap.
    #[must_use]
    pub fn with_source(mut self, source: BitmapSource) -> Self
    {
        self.source = source;
        self
    }

    /// Locate and validate the bitmap.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound`, `BitmapNotFound` or `BitmapRejected`, depending on
    /// the source.
    pub fn locate(&self) -> GuardResult<CfgBitmap<'h>>
    {
        let base = self.source.resolve(self.host)?;
        Ok(CfgBitmap::new(self.host, base))
    }

    /// Decoded bits for `[address, address + size)`, with zero rows elided.
    ///
    /// Both arguments are hex; `size` defaults to one 0x200 block.
    pub fn write_range(&self, address: &str, size: Option<&str>, out: &mut dyn LineSink)
    {
        Self::run("range", out, |out| {
            let range = range::parse_range(address, size)?;
            let bitmap = self.locate()?;
            range::write(&bitmap, range, out);
            Ok(())
        });
    }

    /// The whole bitmap, grouped by bitmap block and target region.
    pub fn write_map(&self, out: &mut dyn LineSink)
    {
        Self::run("map", out, |out| {
            let bitmap = self.locate()?;
            map::write(&bitmap, out);
            Ok(())
        });
    }

    /// One row per target region covered by a committed bitmap block.
    pub fn write_coverage(&self, out: &mut dyn LineSink)
    {
        Self::run("coverage", out, |out| {
            let bitmap = self.locate()?;
            coverage::write(&bitmap, out);
            Ok(())
        });
    }

    /// Every valid call target address in the committed bitmap blocks.
    pub fn write_targets(&self, out: &mut dyn LineSink)
    {
        Self::run("targets", out, |out| {
            let bitmap = self.locate()?;
            targets::write(&bitmap, out);
            Ok(())
        });
    }

    /// [`Inspector::write_range`], collected.
    pub fn range_report(&self, address: &str, size: Option<&str>) -> Report
    {
        Self::collect(|out| self.write_range(address, size, out))
    }

    /// [`Inspector::write_map`], collected.
    pub fn map_report(&self) -> Report
    {
        Self::collect(|out| self.write_map(out))
    }

    /// [`Inspector::write_coverage`], collected.
    pub fn coverage_report(&self) -> Report
    {
        Self::collect(|out| self.write_coverage(out))
    }

    /// [`Inspector::write_targets`], collected.
    pub fn targets_report(&self) -> Report
    {
        Self::collect(|out| self.write_targets(out))
    }

    fn run(name: &str, out: &mut dyn LineSink, body: impl FnOnce(&mut dyn LineSink) -> GuardResult<()>)
    {
        if let Err(err) = body(&mut *out) {
            error!(report = name, %err, "report aborted");
            out.abort(&err);
        }
    }

    fn collect(write: impl FnOnce(&mut dyn LineSink)) -> Report
    {
        let mut report = Report::new();
        write(&mut report);
        report
    }
}

/// Banner line naming the located bitmap.
fn bitmap_banner(bitmap: &CfgBitmap<'_>) -> String
{
    format!("CFG bitmap: {:016x}", bitmap.base())
}

/// The warning line for a bitmap walk step that has one.
///
/// Skipped blocks are silent; committed blocks are the caller's business.
fn walk_warning(block: &BitmapBlock) -> Option<String>
{
    match block {
        BitmapBlock::QueryFailed(address) => Some(format!("warning: can't query bitmap region at {address:016x}")),
        BitmapBlock::Mismatch(region) => Some(format!(
            "warning: {:016x} belongs to allocation {:016x}, not the CFG bitmap; stopping",
            region.base, region.allocation_base
        )),
        BitmapBlock::Committed { .. } | BitmapBlock::Skipped(_) => None,
    }
}
