//! Full bitmap dump overlaid with the target's memory map.
//!
//! ```text
//! CFG bitmap: 00007df500000000
//!
//! Bitmap 00007df500000000-00007df500001000 covers 0000000000000000-0000000000040000
//!   Region 0000000000000000-0000000000010000 free    -
//!   Region 0000000000010000-0000000000012000 commit  image   app.exe
//!
//!        Address          0123456789abcdef   ...
//!      0000000000011000 | ................ | ++++++++++++++++ | ...
//!       ...
//!   Region 0000000000012000-0000000000040000 free    -
//! ```

use tracing::debug;

use super::{bitmap_banner, walk_warning, LineSink};
use crate::bitmap::{AddressRange, CfgBitmap, ChunkFormatter};
use crate::types::MemoryRegion;
use crate::walker::{
    decode_range, survey_range, BitmapBlock, BitmapBlocks, ReadFailurePolicy, TargetRegion, TargetRegions,
};

pub(super) fn write(bitmap: &CfgBitmap<'_>, out: &mut dyn LineSink)
{
    out.push_line(bitmap_banner(bitmap));

    let mut committed = 0usize;
    for block in BitmapBlocks::new(bitmap) {
        match block {
            BitmapBlock::Committed { region, covered } => {
                committed += 1;
                out.push_line(String::new());
                out.push_line(format!(
                    "Bitmap {:016x}-{:016x} covers {:016x}-{:016x}",
                    region.base,
                    region.end(),
                    covered.start,
                    covered.end()
                ));
                write_covered(bitmap, covered, out);
            }
            BitmapBlock::Skipped(region) => {
                debug!(base = %region.base, state = %region.state, "bitmap block not decoded");
            }
            BitmapBlock::QueryFailed(_) | BitmapBlock::Mismatch(_) => {
                if let Some(warning) = walk_warning(&block) {
                    out.push_line(warning);
                }
            }
        }
    }

    if committed == 0 {
        out.push_line("no committed bitmap blocks".to_string());
    }
}

fn write_covered(bitmap: &CfgBitmap<'_>, covered: AddressRange, out: &mut dyn LineSink)
{
    let host = bitmap.host();
    for step in TargetRegions::new(host, covered) {
        if out.is_closed() {
            return;
        }
        match step {
            TargetRegion::Region(region) => {
                let label = region_label(&region, host.module_name(region.base));
                write_region(bitmap, &region, label, out);
            }
            TargetRegion::QueryFailed(address) => {
                out.push_line(format!("  warning: can't query region at {address:016x}"));
            }
        }
    }
}

fn region_label(region: &MemoryRegion, module: Option<String>) -> String
{
    let mut label = format!(
        "  Region {:016x}-{:016x} {:<7} {:<7}",
        region.base,
        region.end(),
        region.state,
        region.region_type
    );
    if let Some(module) = module {
        label.push(' ');
        label.push_str(&module);
    }
    label.trim_end().to_string()
}

/// Survey one target region before decoding it, so the region line can say
/// when there is nothing to show.
fn write_region(bitmap: &CfgBitmap<'_>, region: &MemoryRegion, label: String, out: &mut dyn LineSink)
{
    if !region.is_committed() {
        out.push_line(label);
        return;
    }

    let range = AddressRange::new(region.base, region.size);
    let survey = survey_range(bitmap, range);

    if !survey.has_targets {
        let note = if survey.decoded == 0 && survey.failed > 0 {
            "cfg bits unavailable"
        } else {
            "without cfg bits"
        };
        out.push_line(format!("{label}, {note}"));
        return;
    }

    out.push_line(label);
    let mut formatter = ChunkFormatter::new(true).with_indent(2).with_lazy_header();
    let stats = decode_range(bitmap, range, ReadFailurePolicy::Skip, &mut formatter, out);
    debug!(base = %region.base, rows = stats.rows, failed = stats.failed, "region decoded");
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::{Address, Protection, RegionState, RegionType};

    #[test]
    fn test_region_label_columns()
    {
        let region = MemoryRegion::new(
            Address::new(0x1_0000),
            Address::new(0x1_0000),
            0x2000,
            RegionState::Commit,
            Protection::EXECUTE_READ,
            RegionType::Image,
        );
        assert_eq!(
            region_label(&region, Some("app.exe".to_string())),
            "  Region 0000000000010000-0000000000012000 commit  image   app.exe"
        );
        assert_eq!(
            region_label(&region, None),
            "  Region 0000000000010000-0000000000012000 commit  image"
        );
    }
}
