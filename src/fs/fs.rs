use crate::fs::directory::DirEntry;
use crate::fs::fat_constants::DIR_ENTRY_SIZE;
use crate::fs::fat_header::{FatError, FatHeader, FatType};
use crate::fs::fat_table::{is_bad_cluster, is_end_of_chain, FatTable};
use crate::fs::search::{search_entry, SearchError};
use crate::fs::walk::{walk_directory, DirStart, WalkCtx};
use core::fmt;
use core::ops::ControlFlow;

#[derive(Debug, PartialEq, Eq)]
pub enum FsError {
    Boot(FatError),
    UnsupportedFat,
}

impl From<FatError> for FsError {
    fn from(e: FatError) -> Self {
        FsError::Boot(e)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::Boot(e) => write!(f, "boot sector: {}", e),
            FsError::UnsupportedFat => write!(f, "FAT12 volumes are not supported"),
        }
    }
}

/// Data bytes of cluster `n`, resolved against the image base.
pub fn cluster_data<'a>(hdr: &FatHeader, img: &'a [u8], cluster: u32) -> &'a [u8] {
    let start = hdr.sector_for_cluster(cluster) as usize * hdr.bytes_per_sector as usize;
    &img[start..start + hdr.cluster_size() as usize]
}

/// Locates the root directory. On FAT16 it is a fixed region, not a
/// chain, and the returned cluster 0 is the "not a chain" sentinel.
pub fn root_dir<'a>(hdr: &FatHeader, img: &'a [u8], ft: FatType) -> (DirStart<'a>, u32) {
    match ft {
        FatType::Fat16 => {
            let sector = hdr.reserved_sectors as u32 + hdr.num_fats as u32 * hdr.fat_size_16 as u32;
            let start = sector as usize * hdr.bytes_per_sector as usize;
            let len = hdr.root_entry_count as usize * DIR_ENTRY_SIZE;
            (DirStart::Region(&img[start..start + len]), 0)
        }
        FatType::Fat32 => {
            let cluster = hdr.root_cluster;
            (DirStart::Cluster(cluster), cluster)
        }
        _ => panic!("root_dir on an unsupported FAT type"),
    }
}

/// A mounted, read-only FAT volume over a memory-resident image.
#[derive(Clone, Copy)]
pub struct FatVolume<'a> {
    img: &'a [u8],
    hdr: FatHeader,
    ft: FatType,
}

impl<'a> FatVolume<'a> {
    // FAT12 volumes are recognized and refused here so the engine never
    // has to touch a 12-bit FAT.
    pub fn mount(img: &'a [u8]) -> Result<Self, FsError> {
        let hdr = FatHeader::parse(img)?;
        if (img.len() as u64) < hdr.total_sectors() as u64 * hdr.bytes_per_sector as u64 {
            return Err(FsError::Boot(FatError::InvalidLength));
        }
        let ft = hdr.classify();
        if ft != FatType::Fat16 && ft != FatType::Fat32 {
            return Err(FsError::UnsupportedFat);
        }
        Ok(FatVolume { img, hdr, ft })
    }

    pub fn header(&self) -> &FatHeader {
        &self.hdr
    }

    pub fn fat_type(&self) -> FatType {
        self.ft
    }

    pub fn image(&self) -> &'a [u8] {
        self.img
    }

    pub fn root(&self) -> (DirStart<'a>, u32) {
        root_dir(&self.hdr, self.img, self.ft)
    }

    pub fn walk<F>(&self, start: DirStart<'_>, cb: F)
    where
        F: FnMut(&DirEntry, Option<&str>) -> ControlFlow<()>,
    {
        let mut ctx = WalkCtx::new();
        walk_directory(&mut ctx, &self.hdr, self.img, self.ft, start, cb);
    }

    pub fn search(&self, abspath: &str) -> Result<DirEntry, SearchError> {
        search_entry(&self.hdr, self.img, self.ft, abspath)
    }

    /// Copies the whole file into `dest`, which must hold it entirely.
    pub fn read_whole_file(&self, entry: &DirEntry, dest: &mut [u8]) {
        assert!(entry.size as usize <= dest.len());
        self.read_at(entry, 0, &mut dest[..entry.size as usize]);
    }

    /// Reads up to `dest.len()` bytes at byte offset `pos`, returning how
    /// many were copied (0 at or past end of file).
    pub fn read_at(&self, entry: &DirEntry, pos: u32, dest: &mut [u8]) -> usize {
        let fsize = entry.size;
        if pos >= fsize {
            return 0;
        }

        let n = dest.len().min((fsize - pos) as usize);
        let cs = self.hdr.cluster_size() as usize;
        let fat = FatTable::new(&self.hdr, self.img);

        let mut cluster = entry.first_cluster(self.ft);

        // skip whole clusters in front of the window
        for _ in 0..pos as usize / cs {
            cluster = self.next_cluster(&fat, cluster);
        }

        let mut off = pos as usize % cs;
        let mut written = 0;

        loop {
            let data = cluster_data(&self.hdr, self.img, cluster);
            let take = (cs - off).min(n - written);
            dest[written..written + take].copy_from_slice(&data[off..off + take]);
            written += take;
            off = 0;

            if written == n {
                // done without touching the FAT entry past the last cluster
                return n;
            }
            cluster = self.next_cluster(&fat, cluster);
        }
    }

    fn next_cluster(&self, fat: &FatTable<'_>, cluster: u32) -> u32 {
        let val = fat.next_in_chain(self.ft, cluster);
        if is_end_of_chain(self.ft, val) {
            panic!("cluster chain ended before the file did");
        }
        assert!(!is_bad_cluster(self.ft, val), "bad cluster in file chain");
        val
    }

    /// Bytes in use, counted as everything below the first free FAT entry.
    pub fn used_bytes(&self) -> u32 {
        let fat = FatTable::new(&self.hdr, self.img);
        let cluster_count = self.hdr.total_sectors() / self.hdr.sectors_per_cluster as u32;

        let mut cluster = 0;
        while cluster < cluster_count {
            if fat.read_entry(self.ft, cluster, 0) == 0 {
                break;
            }
            cluster += 1;
        }

        self.hdr.sector_for_cluster(cluster) * self.hdr.bytes_per_sector as u32
    }
}
