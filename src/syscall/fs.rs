use crate::errno::*;
use crate::syscall::path::compute_abs_path;
use crate::task::user::{duplicate_user_path, UserCopyError, UserVA};
use crate::task::{self, Task, ARGS_COPYBUF_SIZE, IO_COPYBUF_SIZE, MAX_HANDLES, MAX_PATH};
use crate::vfs::{vfs_open, Handle};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::debug;

// two 64-bit little-endian words per record: base address, length
pub const SIZEOF_IOVEC: usize = 16;

pub const F_DUPFD: usize = 0;
pub const F_GETFD: usize = 1;
pub const F_SETFD: usize = 2;
pub const F_GETFL: usize = 3;
pub const F_SETFL: usize = 4;
pub const F_GETLK: usize = 5;
pub const F_SETLK: usize = 6;
pub const F_SETLKW: usize = 7;
pub const F_DUPFD_CLOEXEC: usize = 1030;
pub const FD_CLOEXEC: usize = 1;

fn get_fs_handle(curr: &Task, fd: i32) -> Option<Arc<Handle>> {
    if fd < 0 || fd as usize >= MAX_HANDLES {
        return None;
    }
    curr.pi.fs.lock().handles[fd as usize].clone()
}

pub fn sys_open(user_path: UserVA, flags: u32, mode: u32) -> Sptr {
    let curr = task::current();
    let mut bufs = curr.bufs.lock();
    let args = &mut bufs.args;
    let (orig_half, abs_half) = args.split_at_mut(ARGS_COPYBUF_SIZE / 2);

    let len = match duplicate_user_path(curr.user(), &mut orig_half[..MAX_PATH], user_path) {
        Ok(len) => len,
        Err(e) => return e,
    };
    let orig_path = match core::str::from_utf8(&orig_half[..len]) {
        Ok(s) => s,
        Err(_) => return -ENOENT, // nothing on the volume can match it
    };

    // The fs lock covers the CWD read, the slot claim and the open itself,
    // so a close() racing on another thread of this process cannot tear
    // the table.
    let mut state = curr.pi.fs.lock();

    let ret = (|| {
        let abs_len = match compute_abs_path(orig_path, &state.cwd, &mut abs_half[..MAX_PATH]) {
            Ok(n) => n,
            Err(()) => return -ENAMETOOLONG,
        };
        // canonicalization of valid UTF-8 yields valid UTF-8
        let path = core::str::from_utf8(&abs_half[..abs_len]).unwrap_or("/");

        let free_fd = match state.handles.iter().position(|h| h.is_none()) {
            Some(fd) => fd,
            None => return -EMFILE,
        };

        match vfs_open(path) {
            Ok(handle) => {
                state.handles[free_fd] = Some(handle);
                free_fd as Sptr
            }
            Err(e) => -e,
        }
    })();

    debug!(
        "[tid {}] sys_open('{}', {:#x}, {:#o}) => {}",
        curr.tid, orig_path, flags, mode, ret
    );
    ret
}

pub fn sys_close(fd: i32) -> Sptr {
    let curr = task::current();
    debug!("[tid {}] sys_close(fd = {})", curr.tid, fd);

    if fd < 0 || fd as usize >= MAX_HANDLES {
        return -EBADF;
    }

    // the slot is cleared and the handle dropped under the fs lock, so a
    // concurrent close of the same fd gets -EBADF instead of a double free
    let mut state = curr.pi.fs.lock();
    match state.handles[fd as usize].take() {
        Some(handle) => {
            drop(handle); // last reference closes the file
            0
        }
        None => -EBADF,
    }
}

pub fn sys_read(fd: i32, user_buf: UserVA, count: usize) -> Sptr {
    let curr = task::current();
    let handle = match get_fs_handle(&curr, fd) {
        Some(h) => h,
        None => return -EBADF,
    };

    let mut bufs = curr.bufs.lock();
    let count = count.min(IO_COPYBUF_SIZE);

    let ret = {
        let _sh = handle.shlock();
        handle.ops().read(&mut bufs.io[..count])
    };

    match ret {
        Err(e) => -e,
        Ok(n) => {
            if n > 0 && curr.user().copy_to_user(user_buf, &bufs.io[..n]).is_err() {
                // The bytes were consumed from the stream but never reached
                // the caller; the position is deliberately not rewound.
                return -EFAULT;
            }
            n as Sptr
        }
    }
}

pub fn sys_write(fd: i32, user_buf: UserVA, count: usize) -> Sptr {
    let curr = task::current();
    let mut bufs = curr.bufs.lock();
    let count = count.min(IO_COPYBUF_SIZE);

    // stage the user data first: a faulting buffer must not leave a
    // half-done write behind
    if curr.user().copy_from_user(&mut bufs.io[..count], user_buf).is_err() {
        return -EFAULT;
    }

    let handle = match get_fs_handle(&curr, fd) {
        Some(h) => h,
        None => return -EBADF,
    };

    let ret = {
        let _ex = handle.exlock();
        handle.ops().write(&bufs.io[..count])
    };

    match ret {
        Ok(n) => n as Sptr,
        Err(e) => -e,
    }
}

fn parse_iovecs(raw: &[u8], iovcnt: usize) -> Vec<(UserVA, usize)> {
    let mut out = Vec::with_capacity(iovcnt);
    for i in 0..iovcnt {
        let rec = &raw[i * SIZEOF_IOVEC..(i + 1) * SIZEOF_IOVEC];
        let base = u64::from_le_bytes(rec[0..8].try_into().unwrap()) as usize;
        let len = u64::from_le_bytes(rec[8..16].try_into().unwrap()) as usize;
        out.push((UserVA(base), len));
    }
    out
}

// Shared shape of readv/writev: stage the iovec array, take the handle
// lock once for the whole vector, run `segment` per record. A failing
// segment yields the error only when nothing was transferred yet, the
// cumulative count otherwise.
fn vectored<F>(fd: i32, user_iov: UserVA, iovcnt: i32, exclusive: bool, mut segment: F) -> Sptr
where
    F: FnMut(&Task, &mut crate::task::CopyBufs, &Handle, UserVA, usize) -> Sptr,
{
    if iovcnt < 0 || iovcnt as usize * SIZEOF_IOVEC > ARGS_COPYBUF_SIZE {
        return -EINVAL;
    }
    let iovcnt = iovcnt as usize;

    let curr = task::current();
    let mut bufs = curr.bufs.lock();

    if curr
        .user()
        .copy_from_user(&mut bufs.args[..iovcnt * SIZEOF_IOVEC], user_iov)
        .is_err()
    {
        return -EFAULT;
    }

    let handle = match get_fs_handle(&curr, fd) {
        Some(h) => h,
        None => return -EBADF,
    };

    let iov = parse_iovecs(&bufs.args, iovcnt);

    // one lock interval for the whole vector: the operation appears atomic
    // with respect to other syscalls on this handle
    let _sh;
    let _ex;
    if exclusive {
        _ex = Some(handle.exlock());
        _sh = None;
    } else {
        _sh = Some(handle.shlock());
        _ex = None;
    }

    let mut total: Sptr = 0;
    for (base, len) in iov {
        let rc = segment(&curr, &mut bufs, &handle, base, len);
        if rc < 0 {
            if total == 0 {
                total = rc;
            }
            break;
        }
        total += rc;
        if (rc as usize) < len {
            break; // short transfer: stop filling the vector
        }
    }
    total
}

pub fn sys_readv(fd: i32, user_iov: UserVA, iovcnt: i32) -> Sptr {
    vectored(fd, user_iov, iovcnt, false, |curr, bufs, handle, base, len| {
        let seg = len.min(IO_COPYBUF_SIZE);
        match handle.ops().read(&mut bufs.io[..seg]) {
            Err(e) => -e,
            Ok(n) => {
                if n > 0 && curr.user().copy_to_user(base, &bufs.io[..n]).is_err() {
                    -EFAULT
                } else {
                    n as Sptr
                }
            }
        }
    })
}

pub fn sys_writev(fd: i32, user_iov: UserVA, iovcnt: i32) -> Sptr {
    vectored(fd, user_iov, iovcnt, true, |curr, bufs, handle, base, len| {
        let seg = len.min(IO_COPYBUF_SIZE);
        if curr.user().copy_from_user(&mut bufs.io[..seg], base).is_err() {
            return -EFAULT;
        }
        match handle.ops().write(&bufs.io[..seg]) {
            Ok(n) => n as Sptr,
            Err(e) => -e,
        }
    })
}

pub fn sys_ioctl(fd: i32, request: usize, argp: UserVA) -> Sptr {
    let curr = task::current();
    let handle = match get_fs_handle(&curr, fd) {
        Some(h) => h,
        None => return -EBADF,
    };

    let _ex = handle.exlock();
    match handle.ops().ioctl(request, argp) {
        Ok(v) => v,
        Err(e) => -e,
    }
}

pub fn sys_stat64(user_path: UserVA, user_statbuf: UserVA) -> Sptr {
    let curr = task::current();
    let mut bufs = curr.bufs.lock();
    let args = &mut bufs.args;
    let (orig_half, abs_half) = args.split_at_mut(ARGS_COPYBUF_SIZE / 2);

    let len = match curr.user().copy_str_from_user(&mut orig_half[..MAX_PATH], user_path) {
        Ok(len) => len,
        Err(UserCopyError::Fault) => return -EFAULT,
        Err(UserCopyError::TooLong) => return -ENAMETOOLONG,
    };
    let orig_path = match core::str::from_utf8(&orig_half[..len]) {
        Ok(s) => s,
        Err(_) => return -ENOENT,
    };

    let abs_len = {
        // fs lock only for the CWD read: stat claims no descriptor slot
        let state = curr.pi.fs.lock();
        match compute_abs_path(orig_path, &state.cwd, &mut abs_half[..MAX_PATH]) {
            Ok(n) => n,
            Err(()) => return -ENAMETOOLONG,
        }
    };
    let path = core::str::from_utf8(&abs_half[..abs_len]).unwrap_or("/");

    debug!("[tid {}] sys_stat64('{}')", curr.tid, path);

    let handle = match vfs_open(path) {
        Ok(h) => h,
        Err(e) => return -e,
    };

    let st = {
        let _sh = handle.shlock();
        handle.ops().stat()
    };

    let st = match st {
        Ok(st) => st,
        Err(e) => {
            drop(handle);
            return -e;
        }
    };
    drop(handle); // close before the result leaves the kernel

    if curr.user().copy_to_user(user_statbuf, &st.encode()).is_err() {
        return -EFAULT;
    }
    0
}

pub fn sys_lstat64(user_path: UserVA, user_statbuf: UserVA) -> Sptr {
    // no symlinks on this volume, so lstat behaves exactly as stat
    sys_stat64(user_path, user_statbuf)
}

fn fcntl_cmd_name(cmd: usize) -> &'static str {
    match cmd {
        F_DUPFD => "F_DUPFD",
        F_DUPFD_CLOEXEC => "F_DUPFD_CLOEXEC",
        F_GETFD => "F_GETFD",
        F_SETFD => "F_SETFD",
        F_GETFL => "F_GETFL",
        F_SETFL => "F_SETFL",
        F_SETLK => "F_SETLK",
        F_SETLKW => "F_SETLKW",
        F_GETLK => "F_GETLK",
        _ => "unknown command",
    }
}

// Commands are recognized for logging purposes, supported for none.
pub fn sys_fcntl64(fd: i32, cmd: usize, arg: usize) -> Sptr {
    let curr = task::current();
    debug!(
        "[tid {}] sys_fcntl64(fd = {}, cmd = {} ({}), arg = {:#x})",
        curr.tid,
        fd,
        cmd,
        fcntl_cmd_name(cmd),
        arg
    );

    if cmd == F_SETFD && arg & FD_CLOEXEC != 0 {
        debug!("fcntl: set FD_CLOEXEC flag");
    }

    -EINVAL
}
