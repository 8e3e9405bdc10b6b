// Read-only FAT engine plus the VFS/syscall layer on top of it. The whole
// image is memory-resident; kernel services come in through `task`.

#![no_std]

extern crate alloc;

pub mod errno;
pub mod fs;
pub mod syscall;
pub mod task;
pub mod vfs;
