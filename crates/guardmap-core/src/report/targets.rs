//! Valid call target listing.
//!
//! Every set entry in a committed bitmap block becomes one line:
//! `<address> (1 bit)` for a single target, `<address> (16 bits)` for a
//! granule that is valid throughout. Unreadable bitmap pages are skipped.

use tracing::debug;

use super::{bitmap_banner, walk_warning, LineSink};
use crate::bitmap::{CfgBitmap, ChunkEntry, ChunkWord};
use crate::walker::{BitmapBlock, BitmapBlocks};

pub(super) fn write(bitmap: &CfgBitmap<'_>, out: &mut dyn LineSink)
{
    out.push_line(bitmap_banner(bitmap));
    out.push_line(String::new());

    for block in BitmapBlocks::new(bitmap) {
        let BitmapBlock::Committed { covered, .. } = block else {
            if let Some(warning) = walk_warning(&block) {
                out.push_line(warning);
            }
            continue;
        };

        for (address, words) in bitmap.pages(covered) {
            if out.is_closed() {
                return;
            }
            match words {
                Ok(words) => words.iter().for_each(|word| write_word(word, out)),
                Err(err) => debug!(%address, %err, "bitmap page unreadable"),
            }
        }
    }
}

fn write_word(word: &ChunkWord, out: &mut dyn LineSink)
{
    if word.is_empty() {
        return;
    }

    for (address, entry) in word.entries() {
        match entry {
            ChunkEntry::SingleTarget => out.push_line(format!("{address:x} (1 bit)")),
            ChunkEntry::RangeTarget => out.push_line(format!("{address:x} (16 bits)")),
            ChunkEntry::NoTarget => {}
        }
    }
}
