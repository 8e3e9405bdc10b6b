use crate::fs::directory::{Attributes, DirEntry};
use crate::fs::fat_header::{FatHeader, FatType};
use crate::fs::fs::root_dir;
use crate::fs::walk::{walk_directory, DirStart, WalkCtx};
use core::ops::ControlFlow;

const MAX_COMPONENT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    NotFound,
    NotADirectory,
}

// Path-lookup state. One context survives across the walks of all path
// components; a match on an intermediate component parks the subdirectory
// cluster in subdir_cluster and stops the current walk.
struct SearchCtx<'p> {
    path: &'p [u8],
    ft: FatType,
    pc: [u8; MAX_COMPONENT],
    pcl: usize,
    result: Option<DirEntry>,
    not_dir: bool,
    subdir_cluster: u32,
    single_comp: bool,
}

impl<'p> SearchCtx<'p> {
    fn new(path: &'p [u8], ft: FatType, single_comp: bool) -> Self {
        SearchCtx {
            path,
            ft,
            pc: [0; MAX_COMPONENT],
            pcl: 0,
            result: None,
            not_dir: false,
            subdir_cluster: 0,
            single_comp,
        }
    }

    // Copies bytes up to the next '/' (or the end) into the component
    // buffer. Returns false when the remaining path holds no component.
    fn fetch_next_component(&mut self) -> bool {
        debug_assert_eq!(self.pcl, 0);
        let mut path = self.path;
        while let Some((&c, rest)) = path.split_first() {
            if c == b'/' {
                break;
            }
            if self.pcl == MAX_COMPONENT {
                break; // over-long components can never match
            }
            self.pc[self.pcl] = c;
            self.pcl += 1;
            path = rest;
        }
        self.path = path;
        self.pcl != 0
    }

    fn on_entry(&mut self, entry: &DirEntry, long_name: Option<&str>) -> ControlFlow<()> {
        if self.pcl == 0 && !self.fetch_next_component() {
            return ControlFlow::Break(());
        }

        let component = match core::str::from_utf8(&self.pc[..self.pcl]) {
            Ok(s) => s,
            Err(_) => return ControlFlow::Continue(()),
        };

        // Not fully FAT-compliant on purpose: long names compare CASE
        // SENSITIVELY, which lets a Unix-style caller get case distinction
        // by forcing a long name onto every file that needs it. Short names
        // keep the compliant case-insensitive comparison.
        let matched = match long_name {
            Some(ln) => ln == component,
            None => entry.short_name().as_str().eq_ignore_ascii_case(component),
        };

        if !matched {
            return ControlFlow::Continue(());
        }

        if self.single_comp || self.path.is_empty() {
            self.result = Some(*entry);
            return ControlFlow::Break(());
        }

        // fetch_next_component only stops mid-path at a '/'
        let rest: &'p [u8] = self.path;
        debug_assert_eq!(rest[0], b'/');
        self.path = &rest[1..];

        if self.path.is_empty() {
            // path ended with '/': fine only for a directory
            if entry.is_directory() {
                self.result = Some(*entry);
            } else {
                self.not_dir = true;
            }
            return ControlFlow::Break(());
        }

        if !entry.is_directory() {
            self.not_dir = true;
            return ControlFlow::Break(());
        }

        // more components follow: descend
        self.pcl = 0;
        self.subdir_cluster = entry.first_cluster(self.ft);
        ControlFlow::Break(())
    }
}

/// Synthetic entry for the root directory, which has no slot of its own.
pub fn root_entry(hdr: &FatHeader, img: &[u8], ft: FatType) -> DirEntry {
    let (_, cluster) = root_dir(hdr, img, ft);
    DirEntry {
        name: *b"           ",
        attrs: Attributes::DIRECTORY,
        nt_res: 0,
        first_cluster_hi: (cluster >> 16) as u16,
        first_cluster_lo: cluster as u16,
        size: 0,
    }
}

/// Resolves an absolute path to its directory entry. Long-name components
/// match case-sensitively, short names case-insensitively.
pub fn search_entry(
    hdr: &FatHeader,
    img: &[u8],
    ft: FatType,
    abspath: &str,
) -> Result<DirEntry, SearchError> {
    let ft = match ft {
        FatType::Unknown => hdr.classify(),
        other => other,
    };

    let path = abspath.as_bytes();
    assert!(!path.is_empty() && path[0] == b'/');
    let path = &path[1..];

    let (root_start, _) = root_dir(hdr, img, ft);

    if path.is_empty() {
        // the whole path was just "/"
        return Ok(root_entry(hdr, img, ft));
    }

    let mut wctx = WalkCtx::new();
    let mut sctx = SearchCtx::new(path, ft, false);

    walk_directory(&mut wctx, hdr, img, ft, root_start, |e, ln| sctx.on_entry(e, ln));

    while sctx.subdir_cluster != 0 {
        let cluster = sctx.subdir_cluster;
        sctx.subdir_cluster = 0;
        walk_directory(&mut wctx, hdr, img, ft, DirStart::Cluster(cluster), |e, ln| {
            sctx.on_entry(e, ln)
        });
    }

    if sctx.not_dir {
        return Err(SearchError::NotADirectory);
    }
    sctx.result.ok_or(SearchError::NotFound)
}
