// The user-memory boundary. Syscalls never dereference user pointers
// directly; every transfer goes through a UserMem implementation that
// detects faults instead of propagating them.

use crate::errno::{Sptr, EFAULT, ENAMETOOLONG, ENOENT};

/// A virtual address in the current task's user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserVA(pub usize);

impl UserVA {
    pub fn add(self, off: usize) -> UserVA {
        UserVA(self.0 + off)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCopyError {
    Fault,
    TooLong, // a string did not fit the destination buffer
}

/// Address-space accessor owned by each task.
pub trait UserMem: Send + Sync {
    /// Copy `dst.len()` bytes in from user memory.
    fn copy_from_user(&self, dst: &mut [u8], src: UserVA) -> Result<(), UserCopyError>;

    /// Copy `src.len()` bytes out to user memory.
    fn copy_to_user(&self, dst: UserVA, src: &[u8]) -> Result<(), UserCopyError>;

    /// Copy a NUL-terminated string in, NUL included. Returns the length
    /// without the NUL.
    fn copy_str_from_user(&self, dst: &mut [u8], src: UserVA) -> Result<usize, UserCopyError>;
}

/// Path copy with the checks every path-taking syscall needs.
pub fn duplicate_user_path(
    user: &dyn UserMem,
    dst: &mut [u8],
    src: UserVA,
) -> Result<usize, Sptr> {
    match user.copy_str_from_user(dst, src) {
        Err(UserCopyError::Fault) => Err(-EFAULT),
        Err(UserCopyError::TooLong) => Err(-ENAMETOOLONG),
        Ok(0) => Err(-ENOENT),
        Ok(len) => Ok(len),
    }
}
