//! Raw range dump.

use tracing::debug;

use crate::bitmap::{AddressRange, CfgBitmap, ChunkFormatter, CHUNK_BLOCK_SIZE};
use crate::error::{GuardError, GuardResult};
use crate::report::LineSink;
use crate::types::{parse_hex, Address};
use crate::walker::{decode_range, ReadFailurePolicy};

/// Parse the `address [size]` arguments of the range report.
pub(super) fn parse_range(address: &str, size: Option<&str>) -> GuardResult<AddressRange>
{
    let start: Address = address.parse()?;
    let size = size.map_or(Ok(CHUNK_BLOCK_SIZE), parse_hex)?;

    if size == 0 {
        return Err(GuardError::InvalidArgument("size must not be zero".to_string()));
    }
    if start.checked_add(size).is_none() {
        return Err(GuardError::InvalidArgument(format!(
            "range {start} + 0x{size:x} overflows the address space"
        )));
    }

    Ok(AddressRange::new(start, size))
}

pub(super) fn write(bitmap: &CfgBitmap<'_>, range: AddressRange, out: &mut dyn LineSink)
{
    let mut formatter = ChunkFormatter::new(true);
    formatter.write_header(out);

    let stats = decode_range(bitmap, range, ReadFailurePolicy::Warn, &mut formatter, out);
    debug!(
        start = %range.start,
        chunks = stats.chunks,
        failed = stats.failed,
        rows = stats.rows,
        "range decoded"
    );
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_range_defaults_to_one_block()
    {
        let range = parse_range("401000", None).unwrap();
        assert_eq!(range, AddressRange::new(Address::new(0x40_1000), 0x200));
    }

    #[test]
    fn test_parse_range_with_size()
    {
        let range = parse_range("0x00007ff8`12340000", Some("0x1000")).unwrap();
        assert_eq!(range.start, Address::new(0x7ff8_1234_0000));
        assert_eq!(range.size, 0x1000);
    }

    #[test]
    fn test_parse_range_rejects_bad_input()
    {
        assert!(matches!(parse_range("zz", None), Err(GuardError::InvalidArgument(_))));
        assert!(matches!(parse_range("0x1000", Some("0")), Err(GuardError::InvalidArgument(_))));
        assert!(matches!(
            parse_range("ffffffffffffff00", Some("0x200")),
            Err(GuardError::InvalidArgument(_))
        ));
    }
}
