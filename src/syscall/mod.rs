// The interrupt entry glue lives in the kernel proper; it decodes the
// trap frame and calls straight into the sys_* functions here.

pub mod fs;
pub mod path;

pub use fs::{
    sys_close, sys_fcntl64, sys_ioctl, sys_lstat64, sys_open, sys_read, sys_readv, sys_stat64,
    sys_write, sys_writev, SIZEOF_IOVEC,
};
pub use path::compute_abs_path;
