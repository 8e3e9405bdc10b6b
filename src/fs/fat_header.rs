use crate::fs::fat_constants::*;
use core::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum FatError {
    InvalidLength,
    InvalidSignature,
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatError::InvalidLength => write!(f, "image too small for a boot sector"),
            FatError::InvalidSignature => write!(f, "invalid boot signature"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Unknown,
    Fat12,
    Fat16,
    Fat32,
}

// Decoded BPB fields. On-disk integers are little-endian; derived
// quantities fit unsigned 32-bit arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatHeader {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub fat_size_16: u16,
    pub total_sectors_32: u32,
    // FAT32 extension record (zero on FAT12/16 volumes)
    pub fat_size_32: u32,
    pub root_cluster: u32,
}

impl FatHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, FatError> {
        if buf.len() < 512 {
            return Err(FatError::InvalidLength);
        }
        if buf[BOOT_SIG_OFFSET] != BOOT_SIG_LEAD || buf[BOOT_SIG_OFFSET + 1] != BOOT_SIG_TRAIL {
            return Err(FatError::InvalidSignature);
        }

        let bytes_per_sector = u16::from_le_bytes([buf[11], buf[12]]);
        let sectors_per_cluster = buf[13];
        let reserved_sectors = u16::from_le_bytes([buf[14], buf[15]]);
        let num_fats = buf[16];
        let root_entry_count = u16::from_le_bytes([buf[17], buf[18]]);
        let total_sectors_16 = u16::from_le_bytes([buf[19], buf[20]]);
        let fat_size_16 = u16::from_le_bytes([buf[22], buf[23]]);
        let total_sectors_32 = u32::from_le_bytes([buf[32], buf[33], buf[34], buf[35]]);

        // The FAT32 extension record follows the common BPB. Its fields are
        // meaningless on a FAT12/16 volume but reading them is harmless:
        // fat_size_16 != 0 decides which set is authoritative.
        let fat_size_32 = u32::from_le_bytes([buf[36], buf[37], buf[38], buf[39]]);
        let root_cluster = u32::from_le_bytes([buf[44], buf[45], buf[46], buf[47]]);

        Ok(FatHeader {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_entry_count,
            total_sectors_16,
            fat_size_16,
            total_sectors_32,
            fat_size_32,
            root_cluster,
        })
    }

    /// Sectors per FAT, preferring the 16-bit field when set.
    pub fn fat_size(&self) -> u32 {
        if self.fat_size_16 != 0 {
            self.fat_size_16 as u32
        } else {
            self.fat_size_32
        }
    }

    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    /// Sectors occupied by the FAT12/16 root directory region (0 on FAT32).
    pub fn root_dir_sectors(&self) -> u32 {
        let bps = self.bytes_per_sector as u32;
        ((self.root_entry_count as u32 * DIR_ENTRY_SIZE as u32) + (bps - 1)) / bps
    }

    pub fn first_data_sector(&self) -> u32 {
        self.reserved_sectors as u32
            + self.num_fats as u32 * self.fat_size()
            + self.root_dir_sectors()
    }

    /// First sector of data cluster `n`; the first data cluster is 2.
    pub fn sector_for_cluster(&self, n: u32) -> u32 {
        (n - 2) * self.sectors_per_cluster as u32 + self.first_data_sector()
    }

    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    pub fn count_of_clusters(&self) -> u32 {
        let data_sec = self.total_sectors()
            - (self.reserved_sectors as u32
                + self.num_fats as u32 * self.fat_size()
                + self.root_dir_sectors());
        data_sec / self.sectors_per_cluster as u32
    }

    // The canonical classification rule: thresholds on the count of
    // clusters, nothing else.
    pub fn classify(&self) -> FatType {
        let clusters = self.count_of_clusters();
        if clusters < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if clusters < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }
}
