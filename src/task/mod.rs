// The slice of the task model the filesystem layer needs. The scheduler
// and context-switch machinery live in the kernel proper.

pub mod mock_user;
pub mod user;

use crate::task::user::UserMem;
use crate::vfs::Handle;
use alloc::string::String;
use alloc::sync::Arc;
use core::array;
use spin::Mutex;

pub const MAX_PATH: usize = 256;
pub const MAX_HANDLES: usize = 16;
pub const ARGS_COPYBUF_SIZE: usize = 1024;
pub const IO_COPYBUF_SIZE: usize = 4096;

// open() splits args_copybuf in two halves, one per path
const _: () = assert!(ARGS_COPYBUF_SIZE / 2 >= MAX_PATH);

/// Handle table and CWD of one process, behind the per-process fs lock.
/// The lock serializes open/close/chdir against each other and against
/// path canonicalization, which reads the mutable CWD.
pub struct ProcFsState {
    pub handles: [Option<Arc<Handle>>; MAX_HANDLES],
    pub cwd: String,
}

pub struct ProcessInfo {
    pub fs: Mutex<ProcFsState>,
}

/// Marshalling buffers: `args` for argument records (paths, iovec
/// arrays), `io` for the data plane of one read or write.
pub struct CopyBufs {
    pub args: [u8; ARGS_COPYBUF_SIZE],
    pub io: [u8; IO_COPYBUF_SIZE],
}

pub struct Task {
    pub tid: i32,
    pub pi: ProcessInfo,
    pub bufs: Mutex<CopyBufs>,
    user: Arc<dyn UserMem>,
}

impl Task {
    pub fn new(tid: i32, user: Arc<dyn UserMem>) -> Arc<Task> {
        Arc::new(Task {
            tid,
            pi: ProcessInfo {
                fs: Mutex::new(ProcFsState {
                    handles: array::from_fn(|_| None),
                    cwd: String::from("/"),
                }),
            },
            bufs: Mutex::new(CopyBufs {
                args: [0; ARGS_COPYBUF_SIZE],
                io: [0; IO_COPYBUF_SIZE],
            }),
            user,
        })
    }

    pub fn user(&self) -> &dyn UserMem {
        &*self.user
    }

    // chdir stand-in
    pub fn set_cwd(&self, cwd: &str) {
        assert!(cwd.starts_with('/'));
        self.pi.fs.lock().cwd = String::from(cwd);
    }
}

static CURRENT: Mutex<Option<Arc<Task>>> = Mutex::new(None);

/// The scheduler calls this on every context switch; tests directly.
pub fn set_current(task: Option<Arc<Task>>) {
    *CURRENT.lock() = task;
}

/// Syscalls are only ever entered with a task installed.
pub fn current() -> Arc<Task> {
    CURRENT.lock().clone().expect("no current task installed")
}
