//! End-to-end tests for the reports

mod common;

use common::{bitmap_page, region, set_word, world, FakeHost, ANCHOR, BITMAP, IMAGE, IMAGE_SIZE};
use guardmap_core::bitmap::decode::{RANGE_GLYPH, SINGLE_GLYPH};
use guardmap_core::bitmap::{AddressRange, CfgBitmap, ChunkFormatter};
use guardmap_core::host::ProcessSnapshot;
use guardmap_core::locator::BitmapSource;
use guardmap_core::report::{Inspector, LineSink, Report, StreamSink};
use guardmap_core::types::{Address, RegionState, RegionType};
use guardmap_core::walker::{decode_range, ReadFailurePolicy, TargetRegion, TargetRegions};

const HEADER: &str = "   Address          0123456789abcdef   0123456789abcdef   0123456789abcdef   0123456789abcdef";
const EMPTY: &str = "................";

fn row(indent: &str, address: u64, columns: [&str; 4]) -> String
{
    format!("{indent} {address:016x} | {}", columns.join(" | "))
}

/// `world()` with a single target at `IMAGE` and a solid row at `IMAGE + 0x1040`.
fn populated() -> ProcessSnapshot
{
    let mut snapshot = world();
    set_word(&mut snapshot, IMAGE, 0x1);
    set_word(&mut snapshot, IMAGE + 0x1000, 0xAA << 8);
    snapshot
}

#[test]
fn test_range_report_without_anchor_is_one_error_line()
{
    let host = ProcessSnapshot::new();
    let report = Inspector::new(&host).range_report("0x7ff610000000", Some("0x1000"));
    assert_eq!(report.lines(), ["Error: Symbol not found: ntdll!LdrSystemDllInitBlock"]);
}

#[test]
fn test_range_report_rejects_bad_arguments_before_locating()
{
    let host = ProcessSnapshot::new();
    let report = Inspector::new(&host).range_report("not-hex", None);
    assert_eq!(report.len(), 1);
    assert!(report.lines()[0].starts_with("Error: Invalid argument"));
}

#[test]
fn test_range_report_decodes_one_block_by_default()
{
    let host = populated();
    let report = Inspector::new(&host).range_report(&format!("{IMAGE:x}"), None);
    assert_eq!(
        report.lines(),
        [
            String::new(),
            HEADER.to_string(),
            row("", IMAGE, [SINGLE_GLYPH, EMPTY, EMPTY, EMPTY]),
        ]
    );
}

#[test]
fn test_range_report_warns_on_unreadable_word()
{
    let mut snapshot = world();
    for block in 0..3 {
        set_word(&mut snapshot, IMAGE + block * 0x200, 0x1);
    }
    let mut host = FakeHost::new(snapshot);
    host.fail_word(IMAGE + 0x200);

    let report = Inspector::new(&host).range_report(&format!("{IMAGE:x}"), Some("600"));
    assert_eq!(
        report.lines(),
        [
            String::new(),
            HEADER.to_string(),
            row("", IMAGE, [SINGLE_GLYPH, EMPTY, EMPTY, EMPTY]),
            format!(" {:016x} | failed, can't load map bits", IMAGE + 0x200),
            "  ...".to_string(),
            row("", IMAGE + 0x400, [SINGLE_GLYPH, EMPTY, EMPTY, EMPTY]),
        ]
    );
}

#[test]
fn test_skip_policy_leaves_continuation_marker()
{
    let mut snapshot = world();
    for block in 0..3 {
        set_word(&mut snapshot, IMAGE + block * 0x200, 0x1);
    }
    let mut host = FakeHost::new(snapshot);
    host.fail_word(IMAGE + 0x200);
    let bitmap = CfgBitmap::new(&host, Address::new(BITMAP));

    let mut out = Report::new();
    let mut formatter = ChunkFormatter::new(true);
    let stats = decode_range(
        &bitmap,
        AddressRange::new(Address::new(IMAGE), 0x600),
        ReadFailurePolicy::Skip,
        &mut formatter,
        &mut out,
    );

    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.rows as u64, stats.chunks - 1);
    assert_eq!(
        out.lines(),
        [
            row("", IMAGE, [SINGLE_GLYPH, EMPTY, EMPTY, EMPTY]),
            "  ...".to_string(),
            row("", IMAGE + 0x400, [SINGLE_GLYPH, EMPTY, EMPTY, EMPTY]),
        ]
    );
}

#[test]
fn test_partial_block_is_not_truncated()
{
    let mut snapshot = world();
    set_word(&mut snapshot, IMAGE + 0x200, u64::MAX);
    let bitmap = CfgBitmap::new(&snapshot, Address::new(BITMAP));

    let mut out = Report::new();
    let mut formatter = ChunkFormatter::new(false);
    // Ends one byte into the second block.
    let stats = decode_range(
        &bitmap,
        AddressRange::new(Address::new(IMAGE + 0x10), 0x1f1),
        ReadFailurePolicy::Warn,
        &mut formatter,
        &mut out,
    );

    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.rows, 16);
    assert_eq!(out.lines()[8], row("", IMAGE + 0x200, [RANGE_GLYPH; 4]));
}

#[test]
fn test_map_report_nests_bits_under_regions()
{
    let host = populated();
    let page = bitmap_page().value();
    let report = Inspector::new(&host).map_report();

    assert_eq!(
        report.lines(),
        [
            "CFG bitmap: 00007df500000000".to_string(),
            String::new(),
            format!(
                "Bitmap {page:016x}-{:016x} covers {IMAGE:016x}-{:016x}",
                page + 0x1000,
                IMAGE + 0x4_0000
            ),
            format!("  Region {IMAGE:016x}-{:016x} commit  image   app.exe", IMAGE + IMAGE_SIZE),
            String::new(),
            format!("    {HEADER}"),
            row("    ", IMAGE, [SINGLE_GLYPH, EMPTY, EMPTY, EMPTY]),
            "      ...".to_string(),
            row("    ", IMAGE + 0x1040, [RANGE_GLYPH; 4]),
            format!("  Region {:016x}-{:016x} free    -", IMAGE + IMAGE_SIZE, IMAGE + 0x4_0000),
        ]
    );
}

#[test]
fn test_map_report_marks_regions_without_bits()
{
    let host = world();
    let report = Inspector::new(&host).map_report();
    assert!(report
        .lines()
        .iter()
        .any(|line| line.ends_with("commit  image   app.exe, without cfg bits")));
    assert!(!report.lines().iter().any(|line| line.contains("Address")));
}

#[test]
fn test_map_report_is_idempotent()
{
    let host = populated();
    let inspector = Inspector::new(&host);
    assert_eq!(inspector.map_report(), inspector.map_report());
    assert_eq!(inspector.coverage_report(), inspector.coverage_report());
}

#[test]
fn test_map_walk_stops_at_foreign_allocation()
{
    let mut snapshot = ProcessSnapshot::new();
    snapshot.insert_symbol(guardmap_core::locator::ANCHOR_SYMBOL, Address::new(ANCHOR));
    snapshot.insert_memory(Address::new(ANCHOR), vec![0; 0x100]).unwrap();
    snapshot.write_u64(Address::new(ANCHOR + 0xB0), BITMAP).unwrap();
    for r in [
        region(BITMAP, BITMAP, 0x1000, RegionState::Commit, RegionType::Mapped),
        region(BITMAP + 0x1000, BITMAP + 0x1000, 0x1000, RegionState::Commit, RegionType::Private),
        region(BITMAP + 0x2000, BITMAP, 0x1000, RegionState::Commit, RegionType::Mapped),
    ] {
        snapshot.insert_region(r, None).unwrap();
    }
    snapshot.insert_memory(Address::new(BITMAP), vec![0; 0x3000]).unwrap();

    let report = Inspector::new(&snapshot).map_report();
    let lines = report.lines();

    assert_eq!(lines.iter().filter(|line| line.starts_with("Bitmap ")).count(), 1);
    assert_eq!(
        lines.last().map(String::as_str),
        Some("warning: 00007df500001000 belongs to allocation 00007df500001000, not the CFG bitmap; stopping")
    );
    assert_eq!(lines.iter().filter(|line| line.starts_with("warning:")).count(), 1);
}

#[test]
fn test_coverage_report_flags()
{
    let mut host = FakeHost::new(populated());
    let report = Inspector::new(&host).coverage_report();
    let lines = report.lines();

    assert_eq!(lines[0], "CFG bitmap: 00007df500000000");
    assert_eq!(lines[1], "");
    assert!(lines[2].starts_with("Start            End              Size             F Type"));
    assert_eq!(
        lines[3],
        format!(
            "{IMAGE:016x} {:016x} 0000000000002000 + image   commit  EXECUTE_READ             app.exe",
            IMAGE + IMAGE_SIZE
        )
    );
    assert!(lines[4].starts_with(&format!("{:016x} {:016x} 000000000003e000   -", IMAGE + IMAGE_SIZE, IMAGE + 0x4_0000)));
    assert_eq!(lines.len(), 5);
    assert_eq!(lines.iter().filter(|line| line.starts_with("Start ")).count(), 1);

    // With the bitmap page unreadable the image's state is unknown.
    host.fail_read(bitmap_page());
    let report = Inspector::new(&host).coverage_report();
    assert_eq!(report.lines()[3].chars().nth(51), Some('?'));
}

#[test]
fn test_targets_report_lists_entries()
{
    let host = populated();
    let report = Inspector::new(&host).targets_report();
    assert_eq!(
        report.lines(),
        [
            "CFG bitmap: 00007df500000000",
            "",
            "7ff610000000 (1 bit)",
            "7ff610001040 (16 bits)",
            "7ff610001050 (16 bits)",
            "7ff610001060 (16 bits)",
            "7ff610001070 (16 bits)",
        ]
    );
}

#[test]
fn test_locator_falls_back_to_older_field()
{
    let mut snapshot = populated();
    snapshot.write_u64(Address::new(ANCHOR + 0xB0), 0).unwrap();
    snapshot.write_u64(Address::new(ANCHOR + 0xA8), BITMAP).unwrap();

    let report = Inspector::new(&snapshot).targets_report();
    assert_eq!(report.lines()[0], "CFG bitmap: 00007df500000000");
}

#[test]
fn test_exhausted_locator_is_reported_by_every_report()
{
    let mut snapshot = populated();
    snapshot.write_u64(Address::new(ANCHOR + 0xB0), IMAGE).unwrap();
    let inspector = Inspector::new(&snapshot);

    for report in [
        inspector.range_report("7ff610000000", None),
        inspector.map_report(),
        inspector.coverage_report(),
        inspector.targets_report(),
    ] {
        assert_eq!(report.len(), 1);
        assert!(report.lines()[0].starts_with("Error: CFG bitmap not found"));
    }
}

#[test]
fn test_fixed_bitmap_source()
{
    let host = populated();
    let accepted = Inspector::new(&host).with_source(BitmapSource::Fixed(Address::new(BITMAP)));
    assert_eq!(accepted.targets_report().lines()[2], "7ff610000000 (1 bit)");

    let rejected = Inspector::new(&host).with_source(BitmapSource::Fixed(Address::new(IMAGE)));
    assert_eq!(
        rejected.map_report().lines(),
        ["Error: 0x00007ff610000000 is not the base of a mapped allocation"]
    );
}

#[test]
fn test_region_walk_moves_forward_past_query_failures()
{
    let mut host = FakeHost::new(world());
    host.fail_query(Address::new(IMAGE + IMAGE_SIZE));

    let steps: Vec<_> = TargetRegions::new(&host, AddressRange::new(Address::new(IMAGE), 0x4_0000)).collect();
    assert!(matches!(steps[0], TargetRegion::Region(r) if r.base == Address::new(IMAGE)));
    assert_eq!(steps[1], TargetRegion::QueryFailed(Address::new(IMAGE + IMAGE_SIZE)));
    assert!(matches!(steps[2], TargetRegion::Region(r) if r.base == Address::new(IMAGE + IMAGE_SIZE + 0x1000)));

    let queries = host.queries();
    assert!(queries.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_map_report_warns_on_region_query_failure()
{
    let mut host = FakeHost::new(populated());
    host.fail_query(Address::new(IMAGE + IMAGE_SIZE));
    let report = Inspector::new(&host).map_report();
    assert!(report
        .lines()
        .contains(&format!("  warning: can't query region at {:016x}", IMAGE + IMAGE_SIZE)));
    assert_eq!(
        report.lines().last(),
        Some(&format!(
            "  Region {:016x}-{:016x} free    -",
            IMAGE + IMAGE_SIZE + 0x1000,
            IMAGE + 0x4_0000
        ))
    );
}

#[test]
fn test_streamed_reports_match_collected_ones()
{
    let host = populated();
    let inspector = Inspector::new(&host);

    let mut sink = StreamSink::new(Vec::new());
    inspector.write_map(&mut sink);
    assert!(!sink.is_aborted());
    let streamed = String::from_utf8(sink.finish().unwrap()).unwrap();
    assert_eq!(streamed, inspector.map_report().to_string());

    let mut sink = StreamSink::new(Vec::new());
    inspector.write_range(&format!("{IMAGE:x}"), Some("2000"), &mut sink);
    let streamed = String::from_utf8(sink.finish().unwrap()).unwrap();
    assert_eq!(streamed, inspector.range_report(&format!("{IMAGE:x}"), Some("2000")).to_string());
}

#[test]
fn test_streamed_error_keeps_earlier_lines()
{
    let host = ProcessSnapshot::new();
    let mut sink = StreamSink::new(Vec::new());
    sink.push_line("earlier".to_string());
    Inspector::new(&host).write_targets(&mut sink);

    assert!(sink.is_aborted());
    assert_eq!(
        String::from_utf8(sink.finish().unwrap()).unwrap(),
        "earlier\nError: Symbol not found: ntdll!LdrSystemDllInitBlock\n"
    );
}

/// Sink that closes after `capacity` lines.
struct Capped
{
    lines: Vec<String>,
    capacity: usize,
}

impl LineSink for Capped
{
    fn push_line(&mut self, line: String)
    {
        if self.lines.len() < self.capacity {
            self.lines.push(line);
        }
    }

    fn abort(&mut self, err: &guardmap_core::GuardError)
    {
        self.push_line(format!("Error: {err}"));
    }

    fn is_closed(&self) -> bool
    {
        self.lines.len() >= self.capacity
    }
}

#[test]
fn test_whole_address_space_range_stops_when_output_closes()
{
    // The bitmap is located, but no word outside the captured page is readable.
    let host = populated();
    let mut sink = Capped {
        lines: Vec::new(),
        capacity: 8,
    };
    Inspector::new(&host).write_range("0", Some("7fffffffffff"), &mut sink);

    assert_eq!(sink.lines.len(), 8);
    assert_eq!(sink.lines[0], "");
    assert_eq!(sink.lines[1], HEADER);
    assert_eq!(sink.lines[2], " 0000000000000000 | failed, can't load map bits");
    assert_eq!(sink.lines[7], " 0000000000000a00 | failed, can't load map bits");
}
