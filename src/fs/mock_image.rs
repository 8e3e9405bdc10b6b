// In-memory FAT image builder for tests and demos. The engine is
// read-only, so this plays the formatting tool: boot sector, one FAT copy,
// directories with optional VFAT long names, file data.

use crate::fs::directory::{shortname_checksum, Attributes};
use crate::fs::fat_constants::*;
use crate::fs::fat_header::{FatHeader, FatType};
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

const BPS: usize = 512;

/// Directory under construction; cluster 0 is the FAT16 root region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirRef(u32);

struct DirCursor {
    last_cluster: u32,
    used_slots: usize,
}

pub struct ImageBuilder {
    img: Vec<u8>,
    hdr: FatHeader,
    ft: FatType,
    next_free: u32,
    root_used: usize,
    cursors: BTreeMap<u32, DirCursor>,
}

impl ImageBuilder {
    /// FAT16: single FAT, 512-entry root region, enough data sectors to
    /// land past the 4085-cluster threshold.
    pub fn fat16() -> Self {
        // 4200 data clusters with one sector per cluster
        let data_sectors = 4200u32;
        let fat_sectors = ((data_sectors + 2) * 2 + BPS as u32 - 1) / BPS as u32;
        let root_entries = 512u16;
        let root_sectors = root_entries as u32 * DIR_ENTRY_SIZE as u32 / BPS as u32;
        let total = 1 + fat_sectors + root_sectors + data_sectors;
        Self::build_empty(total, fat_sectors, root_entries, 0)
    }

    /// FAT32 (~34 MiB of zeros): enough data sectors to cross the
    /// 65525-cluster threshold, root chain at cluster 2.
    pub fn fat32() -> Self {
        let data_sectors = 65600u32;
        let fat_sectors = ((data_sectors + 2) * 4 + BPS as u32 - 1) / BPS as u32;
        let total = 1 + fat_sectors + data_sectors;
        Self::build_empty(total, fat_sectors, 0, 2)
    }

    pub fn root(&self) -> DirRef {
        match self.ft {
            FatType::Fat16 => DirRef(0),
            _ => DirRef(self.hdr.root_cluster),
        }
    }

    fn build_empty(total_sectors: u32, fat_sectors: u32, root_entries: u16, root_cluster: u32) -> Self {
        let mut img = vec![0u8; total_sectors as usize * BPS];

        // boot sector
        img[11..13].copy_from_slice(&(BPS as u16).to_le_bytes());
        img[13] = 1; // sectors per cluster
        img[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved
        img[16] = 1; // a single FAT copy keeps the image small
        img[17..19].copy_from_slice(&root_entries.to_le_bytes());
        if total_sectors <= u16::MAX as u32 {
            img[19..21].copy_from_slice(&(total_sectors as u16).to_le_bytes());
        } else {
            img[32..36].copy_from_slice(&total_sectors.to_le_bytes());
        }
        if root_cluster == 0 {
            img[22..24].copy_from_slice(&(fat_sectors as u16).to_le_bytes());
        } else {
            img[36..40].copy_from_slice(&fat_sectors.to_le_bytes());
            img[44..48].copy_from_slice(&root_cluster.to_le_bytes());
        }
        img[BOOT_SIG_OFFSET] = BOOT_SIG_LEAD;
        img[BOOT_SIG_OFFSET + 1] = BOOT_SIG_TRAIL;

        let hdr = FatHeader::parse(&img).expect("builder wrote a bad boot sector");
        let ft = hdr.classify();

        let mut builder = ImageBuilder {
            img,
            hdr,
            ft,
            next_free: 2,
            root_used: 0,
            cursors: BTreeMap::new(),
        };

        // reserved FAT entries for clusters 0 and 1
        builder.set_fat(0, builder.eoc_marker());
        builder.set_fat(1, builder.eoc_marker());

        if root_cluster != 0 {
            // FAT32: the root directory is an ordinary one-cluster chain
            let c = builder.alloc_cluster();
            assert_eq!(c, root_cluster);
            builder.cursors.insert(c, DirCursor { last_cluster: c, used_slots: 0 });
        }

        // a volume label as the first root entry, like any formatter leaves
        let mut label = [0u8; DIR_ENTRY_SIZE];
        label[0..11].copy_from_slice(b"RAMFAT  VOL");
        label[11] = Attributes::VOLUME_ID.bits();
        let root = builder.root();
        builder.push_slot(root, &label);

        builder
    }

    fn eoc_marker(&self) -> u32 {
        match self.ft {
            FatType::Fat16 => 0xFFF8,
            _ => 0x0FFF_FFF8,
        }
    }

    fn set_fat(&mut self, cluster: u32, value: u32) {
        let base = self.hdr.reserved_sectors as usize * BPS;
        match self.ft {
            FatType::Fat16 => {
                let off = base + cluster as usize * 2;
                self.img[off..off + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            _ => {
                let off = base + cluster as usize * 4;
                self.img[off..off + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
    }

    fn alloc_cluster(&mut self) -> u32 {
        let c = self.next_free;
        self.next_free += 1;
        self.set_fat(c, self.eoc_marker());
        c
    }

    fn cluster_base(&self, cluster: u32) -> usize {
        self.hdr.sector_for_cluster(cluster) as usize * BPS
    }

    // Appends a raw slot, growing cluster-backed directories by one
    // cluster when the current one fills up.
    fn push_slot(&mut self, dir: DirRef, raw: &[u8; DIR_ENTRY_SIZE]) {
        if dir.0 == 0 {
            // FAT16 fixed root region
            assert!(self.root_used < self.hdr.root_entry_count as usize, "root region full");
            let sector = self.hdr.reserved_sectors as u32
                + self.hdr.num_fats as u32 * self.hdr.fat_size_16 as u32;
            let off = sector as usize * BPS + self.root_used * DIR_ENTRY_SIZE;
            self.img[off..off + DIR_ENTRY_SIZE].copy_from_slice(raw);
            self.root_used += 1;
            return;
        }

        let slots_per_cluster = self.hdr.cluster_size() as usize / DIR_ENTRY_SIZE;
        let cursor = self.cursors.get_mut(&dir.0).expect("unknown directory");
        let (mut last, mut used) = (cursor.last_cluster, cursor.used_slots);

        if used == slots_per_cluster {
            let fresh = self.alloc_cluster();
            self.set_fat(last, fresh);
            last = fresh;
            used = 0;
        }

        let off = self.cluster_base(last) + used * DIR_ENTRY_SIZE;
        self.img[off..off + DIR_ENTRY_SIZE].copy_from_slice(raw);

        let cursor = self.cursors.get_mut(&dir.0).unwrap();
        cursor.last_cluster = last;
        cursor.used_slots = used + 1;
    }

    fn push_long_entries(&mut self, dir: DirRef, long: &str, checksum: u8) {
        let bytes = long.as_bytes();
        assert!(!bytes.is_empty() && bytes.len() <= 255);
        let nchunks = (bytes.len() + 12) / 13;

        // highest chunk first, each carrying its ordinal and the checksum
        for chunk_idx in (0..nchunks).rev() {
            let mut raw = [0u8; DIR_ENTRY_SIZE];
            raw[0] = (chunk_idx + 1) as u8
                | if chunk_idx == nchunks - 1 { LAST_LONG_ENTRY } else { 0 };
            raw[11] = Attributes::LONG_NAME.bits();
            raw[13] = checksum;

            let chunk = &bytes[chunk_idx * 13..(chunk_idx * 13 + 13).min(bytes.len())];
            let mut units = [0xFFFFu16; 13];
            for (i, &b) in chunk.iter().enumerate() {
                units[i] = b as u16;
            }
            if chunk.len() < 13 {
                units[chunk.len()] = 0; // terminator, then 0xFFFF padding
            }

            // 5 + 6 + 2 split across the three name fields
            for (i, unit) in units.iter().enumerate() {
                let off = match i {
                    0..=4 => 1 + i * 2,
                    5..=10 => 14 + (i - 5) * 2,
                    _ => 28 + (i - 11) * 2,
                };
                raw[off..off + 2].copy_from_slice(&unit.to_le_bytes());
            }
            self.push_slot(dir, &raw);
        }
    }

    fn push_short_entry(
        &mut self,
        dir: DirRef,
        short: &[u8; 11],
        attrs: Attributes,
        nt_res: u8,
        first_cluster: u32,
        size: u32,
    ) {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0..11].copy_from_slice(short);
        raw[11] = attrs.bits();
        raw[12] = nt_res;
        raw[20..22].copy_from_slice(&((first_cluster >> 16) as u16).to_le_bytes());
        raw[26..28].copy_from_slice(&(first_cluster as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&size.to_le_bytes());
        self.push_slot(dir, &raw);
    }

    pub fn add_dir(&mut self, parent: DirRef, short: &[u8; 11], long: Option<&str>) -> DirRef {
        let cluster = self.alloc_cluster();
        self.cursors.insert(cluster, DirCursor { last_cluster: cluster, used_slots: 0 });

        if let Some(name) = long {
            let sum = shortname_checksum(short);
            self.push_long_entries(parent, name, sum);
        }
        self.push_short_entry(parent, short, Attributes::DIRECTORY, 0, cluster, 0);
        DirRef(cluster)
    }

    pub fn add_file(&mut self, parent: DirRef, short: &[u8; 11], long: Option<&str>, data: &[u8]) {
        self.add_file_ntres(parent, short, long, 0, data)
    }

    pub fn add_file_ntres(
        &mut self,
        parent: DirRef,
        short: &[u8; 11],
        long: Option<&str>,
        nt_res: u8,
        data: &[u8],
    ) {
        let cs = self.hdr.cluster_size() as usize;
        let mut first_cluster = 0u32;
        let mut prev = 0u32;

        for chunk in data.chunks(cs) {
            let c = self.alloc_cluster();
            if first_cluster == 0 {
                first_cluster = c;
            } else {
                self.set_fat(prev, c);
            }
            let base = self.cluster_base(c);
            self.img[base..base + chunk.len()].copy_from_slice(chunk);
            prev = c;
        }

        if let Some(name) = long {
            let sum = shortname_checksum(short);
            self.push_long_entries(parent, name, sum);
        }
        self.push_short_entry(
            parent,
            short,
            Attributes::ARCHIVE,
            nt_res,
            first_cluster,
            data.len() as u32,
        );
    }

    pub fn build(self) -> Vec<u8> {
        self.img
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fs::FatVolume;

    #[test]
    fn fat16_geometry_classifies_as_fat16() {
        let img = ImageBuilder::fat16().build();
        let vol = FatVolume::mount(&img).expect("mount failed");
        assert_eq!(vol.fat_type(), FatType::Fat16);
        assert!(vol.header().count_of_clusters() >= FAT12_MAX_CLUSTERS);
        assert!(vol.header().count_of_clusters() < FAT16_MAX_CLUSTERS);
    }

    #[test]
    fn fat32_geometry_classifies_as_fat32() {
        let img = ImageBuilder::fat32().build();
        let vol = FatVolume::mount(&img).expect("mount failed");
        assert_eq!(vol.fat_type(), FatType::Fat32);
        assert!(vol.header().count_of_clusters() >= FAT16_MAX_CLUSTERS);
        assert_eq!(vol.header().root_cluster, 2);
    }
}
