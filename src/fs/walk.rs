use crate::fs::fat_constants::*;
use crate::fs::fat_header::{FatHeader, FatType};
use crate::fs::fat_table::{is_bad_cluster, is_end_of_chain, FatTable};
use crate::fs::directory::{
    is_long_name_slot, is_valid_filename_char, shortname_checksum, DirEntry, LongEntry,
};
use crate::fs::fs::cluster_data;
use core::ops::ControlFlow;

/// Where a directory's entries start. On FAT16 the root is a fixed sector
/// range, not a cluster chain.
#[derive(Clone, Copy)]
pub enum DirStart<'a> {
    Region(&'a [u8]), // non-chained (the FAT16 root), walked in one pass
    Cluster(u32),
}

// Long-name reassembly state. Long entries precede their short entry in
// reverse sequence order, so the accumulator fills up backwards and is
// reversed in place before the callback sees it.
pub struct WalkCtx {
    lname_buf: [u8; 256],
    lname_len: usize,
    checksum: Option<u8>,
    valid: bool,
}

impl WalkCtx {
    pub fn new() -> Self {
        WalkCtx {
            lname_buf: [0; 256],
            lname_len: 0,
            checksum: None,
            valid: false,
        }
    }

    fn reset(&mut self) {
        self.lname_len = 0;
        self.checksum = None;
    }

    // Only the ASCII subset of UTF-16 is supported: any unit above 0x00FF
    // invalidates the whole group.
    fn handle_long_entry(&mut self, le: &LongEntry) {
        if self.checksum != Some(le.checksum) {
            // first chunk of a new group (they arrive last-chunk-first)
            self.lname_len = 0;
            self.checksum = Some(le.checksum);
            self.valid = true;
        }

        if !self.valid {
            return;
        }

        let mut chunk = [0u8; 13];
        let mut n = 0;
        for unit in le.units() {
            if unit == 0x0000 || unit == 0xFFFF {
                break; // terminator; the rest of the slot is padding
            }
            if unit > 0x00FF {
                self.valid = false;
                return;
            }
            chunk[n] = unit as u8;
            n += 1;
        }

        // Append in reverse so the final buffer reads backwards until the
        // pre-callback reversal; validate against the legal charset as we go.
        for i in (0..n).rev() {
            let c = chunk[i];
            if !is_valid_filename_char(c) || self.lname_len >= self.lname_buf.len() {
                self.valid = false;
                break;
            }
            self.lname_buf[self.lname_len] = c;
            self.lname_len += 1;
        }
    }
}

impl Default for WalkCtx {
    fn default() -> Self {
        WalkCtx::new()
    }
}

/// Visits every live short entry of one directory, handing each to `cb`
/// with its reassembled long name when the checksums bind. Stops when `cb`
/// breaks, at the 0x00 sentinel, or at end of chain.
pub fn walk_directory<F>(
    ctx: &mut WalkCtx,
    hdr: &FatHeader,
    img: &[u8],
    ft: FatType,
    start: DirStart<'_>,
    mut cb: F,
) where
    F: FnMut(&DirEntry, Option<&str>) -> ControlFlow<()>,
{
    assert!(ft == FatType::Fat16 || ft == FatType::Fat32);

    ctx.reset();

    let (region, mut cluster) = match start {
        DirStart::Region(r) => (r, 0u32),
        DirStart::Cluster(c) => {
            debug_assert!(c >= 2);
            (&[][..], c)
        }
    };

    loop {
        let data = if cluster != 0 {
            cluster_data(hdr, img, cluster)
        } else {
            region
        };

        for raw in data.chunks_exact(DIR_ENTRY_SIZE) {
            if is_long_name_slot(raw) {
                ctx.handle_long_entry(&LongEntry::parse(raw));
                continue;
            }

            let entry = DirEntry::parse(raw);

            if entry.is_volume_id() {
                continue; // the volume label is not a file
            }
            if entry.name[0] == DIRNAME_NO_MORE_ENTRIES {
                return; // all remaining slots are free
            }
            if entry.name[0] == DIRNAME_DELETED_ENTRY {
                continue;
            }

            let mut long_name = None;
            if ctx.lname_len > 0 && ctx.valid {
                if ctx.checksum == Some(shortname_checksum(&entry.name)) {
                    ctx.lname_buf[..ctx.lname_len].reverse();
                    // accumulated bytes passed the charset table, so ASCII
                    long_name = core::str::from_utf8(&ctx.lname_buf[..ctx.lname_len]).ok();
                }
            }

            let flow = cb(&entry, long_name);

            ctx.reset();

            if flow.is_break() {
                return;
            }
        }

        if cluster == 0 {
            return; // non-chained root: nothing to follow
        }

        let val = FatTable::new(hdr, img).next_in_chain(ft, cluster);

        if is_end_of_chain(ft, val) {
            return; // the directory filled its last cluster exactly
        }
        assert!(!is_bad_cluster(ft, val), "bad cluster in directory chain");
        cluster = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::directory::Attributes;
    use alloc::string::String;
    use alloc::vec::Vec;

    // Slot builders: enough of the write side to exercise the walker
    // against hand-rolled directory regions (no FAT needed for a
    // non-chained region).

    fn short_slot(name: &[u8; 11], attrs: u8, cluster: u16, size: u32) -> [u8; 32] {
        let mut raw = [0u8; 32];
        raw[0..11].copy_from_slice(name);
        raw[11] = attrs;
        raw[26..28].copy_from_slice(&cluster.to_le_bytes());
        raw[28..32].copy_from_slice(&size.to_le_bytes());
        raw
    }

    fn long_slots(name: &str, checksum: u8) -> Vec<[u8; 32]> {
        let bytes = name.as_bytes();
        let nchunks = (bytes.len() + 12) / 13;
        let mut out = Vec::new();
        // highest chunk first, as on disk
        for chunk_idx in (0..nchunks).rev() {
            let mut raw = [0u8; 32];
            raw[0] = (chunk_idx + 1) as u8
                | if chunk_idx == nchunks - 1 { LAST_LONG_ENTRY } else { 0 };
            raw[11] = 0x0F;
            raw[13] = checksum;
            let chunk = &bytes[chunk_idx * 13..(chunk_idx * 13 + 13).min(bytes.len())];
            let mut units = [0xFFFFu16; 13];
            for (i, &b) in chunk.iter().enumerate() {
                units[i] = b as u16;
            }
            if chunk.len() < 13 {
                units[chunk.len()] = 0; // NUL terminator, then 0xFFFF padding
            }
            for (i, u) in units.iter().enumerate() {
                let off = match i {
                    0..=4 => 1 + i * 2,
                    5..=10 => 14 + (i - 5) * 2,
                    _ => 28 + (i - 11) * 2,
                };
                raw[off..off + 2].copy_from_slice(&u.to_le_bytes());
            }
            out.push(raw);
        }
        out
    }

    fn dummy_volume() -> (FatHeader, Vec<u8>) {
        let mut buf = [0u8; 512];
        buf[11..13].copy_from_slice(&512u16.to_le_bytes());
        buf[13] = 1;
        buf[14..16].copy_from_slice(&1u16.to_le_bytes());
        buf[16] = 1;
        buf[22..24].copy_from_slice(&1u16.to_le_bytes());
        buf[19..21].copy_from_slice(&8u16.to_le_bytes());
        buf[510] = BOOT_SIG_LEAD;
        buf[511] = BOOT_SIG_TRAIL;
        let hdr = FatHeader::parse(&buf).unwrap();
        (hdr, buf.to_vec())
    }

    fn collect(region: &[u8]) -> Vec<(DirEntry, Option<String>)> {
        let (hdr, img) = dummy_volume();
        let mut ctx = WalkCtx::new();
        let mut out = Vec::new();
        walk_directory(
            &mut ctx,
            &hdr,
            &img,
            FatType::Fat16,
            DirStart::Region(region),
            |e, long| {
                out.push((*e, long.map(String::from)));
                ControlFlow::Continue(())
            },
        );
        out
    }

    #[test]
    fn single_entry_then_sentinel() {
        let mut region = Vec::new();
        region.extend_from_slice(&short_slot(b"INIT       ", 0x20, 5, 42));
        region.extend_from_slice(&[0u8; 64]); // sentinel + junk slot
        let seen = collect(&region);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.size, 42);
        assert_eq!(seen[0].1, None);
    }

    #[test]
    fn does_not_read_past_sentinel() {
        let mut region = Vec::new();
        region.extend_from_slice(&short_slot(b"A          ", 0x20, 3, 1));
        region.extend_from_slice(&[0u8; 32]);
        // a live-looking entry after the sentinel must never be reported
        region.extend_from_slice(&short_slot(b"GHOST      ", 0x20, 4, 9));
        let seen = collect(&region);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn deleted_and_volume_id_slots_are_skipped() {
        let mut deleted = short_slot(b"OLD        ", 0x20, 3, 1);
        deleted[0] = DIRNAME_DELETED_ENTRY;
        let mut region = Vec::new();
        region.extend_from_slice(&deleted);
        region.extend_from_slice(&short_slot(b"RAMDISK    ", Attributes::VOLUME_ID.bits(), 0, 0));
        region.extend_from_slice(&short_slot(b"KEEP       ", 0x20, 6, 7));
        region.extend_from_slice(&[0u8; 32]);
        let seen = collect(&region);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.short_name().as_str(), "KEEP");
    }

    #[test]
    fn long_name_reassembled_when_checksum_binds() {
        let short = b"SBININI~1  ";
        let sum = shortname_checksum(short);
        let mut region = Vec::new();
        for slot in long_slots("init-system", sum) {
            region.extend_from_slice(&slot);
        }
        region.extend_from_slice(&short_slot(short, 0x20, 9, 100));
        region.extend_from_slice(&[0u8; 32]);
        let seen = collect(&region);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.as_deref(), Some("init-system"));
    }

    #[test]
    fn long_name_spanning_multiple_slots() {
        let short = b"AVERYL~1TXT";
        let sum = shortname_checksum(short);
        let name = "a-name-much-longer-than-thirteen.txt";
        assert!(name.len() > 13);
        let mut region = Vec::new();
        for slot in long_slots(name, sum) {
            region.extend_from_slice(&slot);
        }
        region.extend_from_slice(&short_slot(short, 0x20, 9, 1));
        region.extend_from_slice(&[0u8; 32]);
        let seen = collect(&region);
        assert_eq!(seen[0].1.as_deref(), Some(name));
    }

    #[test]
    fn checksum_mismatch_drops_long_name() {
        let short = b"FILE    TXT";
        let sum = shortname_checksum(short).wrapping_add(1); // wrong on purpose
        let mut region = Vec::new();
        for slot in long_slots("pretty-name.txt", sum) {
            region.extend_from_slice(&slot);
        }
        region.extend_from_slice(&short_slot(short, 0x20, 9, 1));
        region.extend_from_slice(&[0u8; 32]);
        let seen = collect(&region);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, None);
    }

    #[test]
    fn non_ascii_unit_invalidates_group() {
        let short = b"FILE    TXT";
        let sum = shortname_checksum(short);
        let mut slots = long_slots("abcde", sum);
        // patch the first unit to a non-ASCII code point
        slots[0][1..3].copy_from_slice(&0x0142u16.to_le_bytes());
        let mut region = Vec::new();
        for slot in slots {
            region.extend_from_slice(&slot);
        }
        region.extend_from_slice(&short_slot(short, 0x20, 9, 1));
        region.extend_from_slice(&[0u8; 32]);
        let seen = collect(&region);
        assert_eq!(seen[0].1, None);
    }

    #[test]
    fn accumulator_resets_between_entries() {
        // a long group consumed by entry 1 must not leak onto entry 2
        let short1 = b"ONE     TXT";
        let sum1 = shortname_checksum(short1);
        let mut region = Vec::new();
        for slot in long_slots("one.txt", sum1) {
            region.extend_from_slice(&slot);
        }
        region.extend_from_slice(&short_slot(short1, 0x20, 2, 1));
        region.extend_from_slice(&short_slot(b"TWO     TXT", 0x20, 3, 1));
        region.extend_from_slice(&[0u8; 32]);
        let seen = collect(&region);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1.as_deref(), Some("one.txt"));
        assert_eq!(seen[1].1, None);
    }

    #[test]
    fn callback_break_stops_the_walk() {
        let mut region = Vec::new();
        region.extend_from_slice(&short_slot(b"A          ", 0x20, 2, 1));
        region.extend_from_slice(&short_slot(b"B          ", 0x20, 3, 1));
        region.extend_from_slice(&[0u8; 32]);
        let (hdr, img) = dummy_volume();
        let mut ctx = WalkCtx::new();
        let mut count = 0;
        walk_directory(
            &mut ctx,
            &hdr,
            &img,
            FatType::Fat16,
            DirStart::Region(&region),
            |_, _| {
                count += 1;
                ControlFlow::Break(())
            },
        );
        assert_eq!(count, 1);
    }
}
