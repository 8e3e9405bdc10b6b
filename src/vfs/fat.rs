// The FAT volume's binding to the VFS. The boot path calls mount_ramdisk
// once the ramdisk is located and registers the result at "/".

use crate::errno::{Sptr, EINVAL, ENOENT, ENOTDIR};
use crate::fs::directory::DirEntry;
use crate::fs::fs::{FatVolume, FsError};
use crate::fs::search::SearchError;
use crate::task::user::UserVA;
use crate::vfs::{FileOps, Filesystem, Handle, Stat, S_IFDIR, S_IFREG};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

pub struct FatFs {
    vol: FatVolume<'static>,
}

impl FatFs {
    /// Mounts the memory-resident image; the ramdisk keeps it mapped for
    /// the kernel's lifetime.
    pub fn mount_ramdisk(image: &'static [u8]) -> Result<Arc<FatFs>, FsError> {
        let vol = FatVolume::mount(image)?;
        log::info!(
            "fat: mounted {:?} ramdisk, {} clusters of {} bytes",
            vol.fat_type(),
            vol.header().count_of_clusters(),
            vol.header().cluster_size()
        );
        Ok(Arc::new(FatFs { vol }))
    }

    pub fn volume(&self) -> &FatVolume<'static> {
        &self.vol
    }
}

impl Filesystem for FatFs {
    fn open(&self, path: &str) -> Result<Arc<Handle>, Sptr> {
        let entry = self.vol.search(path).map_err(|e| match e {
            SearchError::NotFound => ENOENT,
            SearchError::NotADirectory => ENOTDIR,
        })?;
        Ok(Handle::new(Box::new(FatFile {
            vol: self.vol,
            entry,
            pos: AtomicU32::new(0),
        })))
    }
}

// one open file (or directory) on a FAT volume
struct FatFile {
    vol: FatVolume<'static>,
    entry: DirEntry,
    pos: AtomicU32,
}

impl FileOps for FatFile {
    fn read(&self, buf: &mut [u8]) -> Result<usize, Sptr> {
        // Directories carry a zero size, so reading one just hits EOF.
        let pos = self.pos.load(Ordering::Relaxed);
        let n = self.vol.read_at(&self.entry, pos, buf);
        self.pos.store(pos + n as u32, Ordering::Relaxed);
        Ok(n)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize, Sptr> {
        // The volume is read-only by design; a write reaching this far is
        // a kernel bug, not a user error.
        unimplemented!("write on a read-only FAT volume");
    }

    fn ioctl(&self, _request: usize, _argp: UserVA) -> Result<Sptr, Sptr> {
        Err(EINVAL)
    }

    fn stat(&self) -> Result<Stat, Sptr> {
        let dir = self.entry.is_directory();
        Ok(Stat {
            dev: 0,
            ino: self.entry.first_cluster(self.vol.fat_type()) as u64,
            mode: if dir { S_IFDIR | 0o555 } else { S_IFREG | 0o444 },
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            size: self.entry.size as u64,
            blksize: self.vol.header().cluster_size(),
            blocks: (self.entry.size as u64 + 511) / 512,
        })
    }
}
