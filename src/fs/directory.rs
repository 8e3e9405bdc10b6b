use crate::fs::fat_constants::*;
use crate::fs::fat_header::FatType;
use bitflags::bitflags;

bitflags! {
    /// FAT directory-entry attribute byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        // a long-name slot is marked by exactly RO|HIDDEN|SYSTEM|VOLUME_ID
        const LONG_NAME = 0x0F;
    }
}

const LONG_NAME_MASK: u8 = 0x3F;

/// One parsed 32-byte short directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attrs: Attributes,
    pub nt_res: u8,
    pub first_cluster_hi: u16,
    pub first_cluster_lo: u16,
    pub size: u32,
}

impl DirEntry {
    pub fn parse(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= DIR_ENTRY_SIZE);
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[0..11]);
        DirEntry {
            name,
            attrs: Attributes::from_bits_retain(raw[11]),
            nt_res: raw[12],
            first_cluster_hi: u16::from_le_bytes([raw[20], raw[21]]),
            first_cluster_lo: u16::from_le_bytes([raw[26], raw[27]]),
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attrs.contains(Attributes::DIRECTORY)
    }

    pub fn is_volume_id(&self) -> bool {
        self.attrs.contains(Attributes::VOLUME_ID)
    }

    /// First cluster of the entry's chain; the high half is only ever
    /// nonzero on FAT32.
    pub fn first_cluster(&self, _ft: FatType) -> u32 {
        (self.first_cluster_hi as u32) << 16 | self.first_cluster_lo as u32
    }

    // Base up to the first pad space, then '.' and the extension if byte 8
    // is not a space. The NTRes bits fold base and extension independently.
    pub fn short_name(&self) -> ShortName {
        let mut out = ShortName::empty();

        for i in 0..8 {
            let c = self.name[i];
            if c == b' ' {
                break;
            }
            out.push(if self.nt_res & NTRES_BASE_LOW_CASE != 0 {
                c.to_ascii_lowercase()
            } else {
                c
            });
        }

        if self.name[8] != b' ' {
            out.push(b'.');
            for i in 8..11 {
                let c = self.name[i];
                if c == b' ' {
                    break;
                }
                out.push(if self.nt_res & NTRES_EXT_LOW_CASE != 0 {
                    c.to_ascii_lowercase()
                } else {
                    c
                });
            }
        }

        out
    }
}

/// An extracted 8.3 name: at most 8 + 1 + 3 bytes.
#[derive(Debug, Clone, Copy)]
pub struct ShortName {
    buf: [u8; 12],
    len: usize,
}

impl ShortName {
    fn empty() -> Self {
        ShortName { buf: [0; 12], len: 0 }
    }

    fn push(&mut self, c: u8) {
        self.buf[self.len] = c;
        self.len += 1;
    }

    pub fn as_str(&self) -> &str {
        // the 8.3 charset is a subset of ASCII
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

/// A long-name slot: 13 UTF-16 code units split 5/6/2 plus the binding
/// checksum, in the same 32-byte encoding as short entries.
#[derive(Debug, Clone, Copy)]
pub struct LongEntry {
    pub ordinal: u8,
    pub checksum: u8,
    pub name1: [u8; 10],
    pub name2: [u8; 12],
    pub name3: [u8; 4],
}

impl LongEntry {
    pub fn parse(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= DIR_ENTRY_SIZE);
        let mut name1 = [0u8; 10];
        let mut name2 = [0u8; 12];
        let mut name3 = [0u8; 4];
        name1.copy_from_slice(&raw[1..11]);
        name2.copy_from_slice(&raw[14..26]);
        name3.copy_from_slice(&raw[28..32]);
        LongEntry {
            ordinal: raw[0],
            checksum: raw[13],
            name1,
            name2,
            name3,
        }
    }

    /// The 13 UTF-16 code units in on-disk order (5 + 6 + 2).
    pub fn units(&self) -> impl Iterator<Item = u16> + '_ {
        self.name1
            .chunks_exact(2)
            .chain(self.name2.chunks_exact(2))
            .chain(self.name3.chunks_exact(2))
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
    }
}

/// Long-name slots are recognized by their attribute byte alone.
pub fn is_long_name_slot(raw: &[u8]) -> bool {
    raw[11] & LONG_NAME_MASK == Attributes::LONG_NAME.bits()
}

// NOTE: the operation is an unsigned char rotate right
pub fn shortname_checksum(name: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &b in name {
        sum = sum.rotate_right(1).wrapping_add(b);
    }
    sum
}

// Legal filename characters: printable ASCII minus ! " * / : < > ? \ |
static VALID_CHARS: [bool; 256] = build_valid_chars();

const fn build_valid_chars() -> [bool; 256] {
    let mut table = [false; 256];
    let mut c = 0x21usize;
    while c <= 0x7E {
        table[c] = true;
        c += 1;
    }
    table[b'!' as usize] = false;
    table[b'"' as usize] = false;
    table[b'*' as usize] = false;
    table[b'/' as usize] = false;
    table[b':' as usize] = false;
    table[b'<' as usize] = false;
    table[b'>' as usize] = false;
    table[b'?' as usize] = false;
    table[b'\\' as usize] = false;
    table[b'|' as usize] = false;
    table
}

pub fn is_valid_filename_char(c: u8) -> bool {
    VALID_CHARS[c as usize]
}
