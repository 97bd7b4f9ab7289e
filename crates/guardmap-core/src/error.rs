//! # Error Types
//!
//! Error handling for bitmap inspection.
//!
//! We use `thiserror` to derive `Error` implementations and messages.
//!
//! Errors come in two kinds:
//!
//! 1. **Fatal**: the bitmap cannot be located, or an argument is missing or
//!    malformed. The current report stops and prints one `Error:` line.
//! 2. **Transient**: a single memory read or region query failed. Walkers
//!    log it, optionally print a warning row, and move on.

use thiserror::Error;

/// Main error type for guardmap operations
#[derive(Error, Debug)]
pub enum GuardError
{
    /// The host could not resolve a symbol
    ///
    /// Without the anchor symbol there is no way to find the bitmap, so this
    /// aborts every report.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// No candidate field of the anchor structure points at a valid bitmap
    #[error("CFG bitmap not found: none of {tried} candidate fields of {anchor} points at a mapped allocation")]
    BitmapNotFound
    {
        /// Anchor symbol that was searched
        anchor: String,
        /// Number of candidate offsets probed
        tried: usize,
    },

    /// An explicitly supplied bitmap base is not the base of a mapped allocation
    #[error("0x{0:016x} is not the base of a mapped allocation")]
    BitmapRejected(u64),

    /// Invalid or missing argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The host could not read memory at the given address
    #[error("Failed to read {len} bytes at 0x{address:016x}")]
    ReadFailed
    {
        /// Start of the failed read
        address: u64,
        /// Requested length
        len: usize,
    },

    /// The host returned fewer bytes than requested
    #[error("Short read at 0x{address:016x}: expected {expected} bytes, got {actual}")]
    ShortRead
    {
        /// Start of the read
        address: u64,
        /// Requested length
        expected: usize,
        /// Bytes actually returned
        actual: usize,
    },

    /// The host could not describe the region containing the given address
    #[error("Region query failed at 0x{0:016x}")]
    QueryFailed(u64),

    /// A process snapshot is structurally invalid
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    /// Snapshot JSON could not be parsed
    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot memory bytes are not valid hex
    #[error("Snapshot hex error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// I/O error (loading snapshots, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError
{
    /// `true` for per-call read/query failures that a walk steps over.
    pub fn is_transient(&self) -> bool
    {
        matches!(
            self,
            GuardError::ReadFailed { .. } | GuardError::ShortRead { .. } | GuardError::QueryFailed(_)
        )
    }
}

/// Convenience type alias for `Result<T, GuardError>`
///
/// ```rust
/// use guardmap_core::error::GuardResult;
/// fn foo() -> GuardResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type GuardResult<T> = std::result::Result<T, GuardError>;
