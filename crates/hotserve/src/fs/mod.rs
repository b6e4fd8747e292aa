//! Output filesystem abstraction.
//!
//! The file service never touches `std::fs` directly. It goes through
//! [`OutputFileSystem`], which is implemented for the real disk
//! ([`NativeFs`]) and for an in-memory volume ([`MemoryFs`]) that compilers
//! can emit into so build output never has to hit the disk.

mod memory;
mod native;

pub use memory::MemoryFs;
pub use native::NativeFs;

use crate::error::FsError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result type for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

/// Snapshot of a file's metadata.
///
/// Immutable; re-read on every request so validators always reflect the
/// file as it is now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
    /// Last modified timestamp (milliseconds since epoch)
    pub modified: u64,
}

impl FileStat {
    /// Whether this is a regular file
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

/// Filesystem the bundler writes its output into and the server reads from.
#[async_trait]
pub trait OutputFileSystem: Send + Sync + std::fmt::Debug {
    /// Get file metadata, or `None` when the path cannot be stat'ed.
    async fn stat(&self, path: &Path) -> Option<FileStat>;

    /// Open a file for positional reads.
    async fn open(&self, path: &Path) -> FsResult<Box<dyn FileHandle>>;

    /// Write a file, creating parent directories as needed.
    async fn write_file(&self, path: &Path, content: &[u8]) -> FsResult<()>;

    /// Resolve links to the real location of `path`.
    ///
    /// Filesystems without links return the path unchanged.
    async fn real_path(&self, path: &Path) -> Option<PathBuf> {
        Some(path.to_path_buf())
    }
}

/// An open file.
///
/// Implementations must release the underlying resource when dropped, so a
/// handle abandoned mid-read (client disconnect) never leaks.
#[async_trait]
pub trait FileHandle: Send + std::fmt::Debug {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read; `0` means end of file.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FsResult<usize>;

    /// Close the handle.
    async fn close(self: Box<Self>) -> FsResult<()>;
}
