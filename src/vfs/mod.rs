pub mod fat;

use crate::errno::{Sptr, ENOENT};
use crate::task::user::UserVA;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;

// fixed little-endian encoding, the shape stat64 copies out
pub const STAT_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
}

impl Stat {
    pub fn encode(&self) -> [u8; STAT_SIZE] {
        let mut out = [0u8; STAT_SIZE];
        out[0..8].copy_from_slice(&self.dev.to_le_bytes());
        out[8..16].copy_from_slice(&self.ino.to_le_bytes());
        out[16..20].copy_from_slice(&self.mode.to_le_bytes());
        out[20..24].copy_from_slice(&self.nlink.to_le_bytes());
        out[24..28].copy_from_slice(&self.uid.to_le_bytes());
        out[28..32].copy_from_slice(&self.gid.to_le_bytes());
        out[32..40].copy_from_slice(&self.rdev.to_le_bytes());
        out[40..48].copy_from_slice(&self.size.to_le_bytes());
        out[48..52].copy_from_slice(&self.blksize.to_le_bytes());
        out[52..60].copy_from_slice(&self.blocks.to_le_bytes());
        out
    }

    pub fn decode(raw: &[u8; STAT_SIZE]) -> Stat {
        Stat {
            dev: u64::from_le_bytes(raw[0..8].try_into().unwrap()),
            ino: u64::from_le_bytes(raw[8..16].try_into().unwrap()),
            mode: u32::from_le_bytes(raw[16..20].try_into().unwrap()),
            nlink: u32::from_le_bytes(raw[20..24].try_into().unwrap()),
            uid: u32::from_le_bytes(raw[24..28].try_into().unwrap()),
            gid: u32::from_le_bytes(raw[28..32].try_into().unwrap()),
            rdev: u64::from_le_bytes(raw[32..40].try_into().unwrap()),
            size: u64::from_le_bytes(raw[40..48].try_into().unwrap()),
            blksize: u32::from_le_bytes(raw[48..52].try_into().unwrap()),
            blocks: u64::from_le_bytes(raw[52..60].try_into().unwrap()),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFDIR != 0
    }
}

/// Per-open-file operations. Errors are positive errno values; the syscall
/// boundary negates them.
pub trait FileOps: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> Result<usize, Sptr>;
    fn write(&self, buf: &[u8]) -> Result<usize, Sptr>;
    fn ioctl(&self, request: usize, argp: UserVA) -> Result<Sptr, Sptr>;
    fn stat(&self) -> Result<Stat, Sptr>;
}

/// An open file: the per-file vtable plus the rwlock the syscall layer
/// brackets operations with. Closing is dropping the last `Arc`.
pub struct Handle {
    lock: RwLock<()>,
    ops: Box<dyn FileOps>,
}

impl Handle {
    pub fn new(ops: Box<dyn FileOps>) -> Arc<Handle> {
        Arc::new(Handle { lock: RwLock::new(()), ops })
    }

    pub fn shlock(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    pub fn exlock(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }

    /// Callers are expected to hold the appropriate lock.
    pub fn ops(&self) -> &dyn FileOps {
        &*self.ops
    }
}

/// A mounted filesystem. `path` is absolute within the mount.
pub trait Filesystem: Send + Sync {
    fn open(&self, path: &str) -> Result<Arc<Handle>, Sptr>;
}

struct Mountpoint {
    prefix: String,
    fs: Arc<dyn Filesystem>,
}

static MOUNTPOINTS: Mutex<Vec<Mountpoint>> = Mutex::new(Vec::new());

/// Registers a filesystem at `prefix`. Re-adding an existing prefix
/// replaces the old filesystem (remount).
pub fn mountpoint_add(prefix: &str, fs: Arc<dyn Filesystem>) {
    assert!(prefix.starts_with('/'));
    let mut mounts = MOUNTPOINTS.lock();
    if let Some(mp) = mounts.iter_mut().find(|mp| mp.prefix == prefix) {
        mp.fs = fs;
        return;
    }
    mounts.push(Mountpoint { prefix: String::from(prefix), fs });
}

// Longest-prefix selection: returns the winning mountpoint index and the
// length of the matched prefix.
fn resolve_mountpoint(prefixes: &[&str], path: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, prefix) in prefixes.iter().enumerate() {
        let trimmed = prefix.strip_suffix('/').unwrap_or(prefix);
        let matches = if trimmed.is_empty() {
            true // the root mount matches every absolute path
        } else {
            match path.strip_prefix(trimmed) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            }
        };
        if matches && best.map_or(true, |(_, len)| trimmed.len() > len) {
            best = Some((idx, trimmed.len()));
        }
    }
    best
}

pub fn vfs_open(abspath: &str) -> Result<Arc<Handle>, Sptr> {
    assert!(abspath.starts_with('/'));
    let mounts = MOUNTPOINTS.lock();
    let prefixes: Vec<&str> = mounts.iter().map(|mp| mp.prefix.as_str()).collect();
    let (idx, plen) = resolve_mountpoint(&prefixes, abspath).ok_or(ENOENT)?;
    let fs = mounts[idx].fs.clone();
    drop(mounts); // the filesystem open must not hold the table lock

    let rest = &abspath[plen..];
    let fs_path = if rest.is_empty() { "/" } else { rest };
    fs.open(fs_path)
}
