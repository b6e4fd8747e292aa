use super::{FileHandle, FileStat, FsResult, OutputFileSystem};
use crate::error::FsError;
use async_trait::async_trait;
use parking_lot::RwLock;
use path_clean::PathClean;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Arc<[u8]>,
    modified: u64,
}

#[derive(Debug, Default)]
struct Volume {
    files: FxHashMap<PathBuf, MemoryFile>,
    dirs: FxHashSet<PathBuf>,
}

/// In-memory output filesystem.
///
/// Compilers emit into it so build output is served without disk I/O.
/// Paths are cleaned before every lookup so `/out/./a.js` and `/out/a.js`
/// name the same file. Cloning shares the volume.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    volume: Arc<RwLock<Volume>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file, stamping it with the current time.
    pub fn insert(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let modified = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.insert_with_mtime(path, content, modified);
    }

    /// Insert or replace a file with an explicit modification time (ms).
    pub fn insert_with_mtime(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        modified: u64,
    ) {
        let path = path.as_ref().clean();
        let mut volume = self.volume.write();

        for ancestor in path.ancestors().skip(1) {
            volume.dirs.insert(ancestor.to_path_buf());
        }

        let content: Vec<u8> = content.into();
        volume.files.insert(
            path,
            MemoryFile {
                content: content.into(),
                modified,
            },
        );
    }

    /// Remove a file. Returns `true` if it existed.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref().clean();
        self.volume.write().files.remove(&path).is_some()
    }

    /// Read a whole file.
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = path.as_ref().clean();
        self.volume
            .read()
            .files
            .get(&path)
            .map(|file| file.content.to_vec())
    }

    /// Number of handles currently open on this volume.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputFileSystem for MemoryFs {
    async fn stat(&self, path: &Path) -> Option<FileStat> {
        let path = path.clean();
        let volume = self.volume.read();

        if let Some(file) = volume.files.get(&path) {
            return Some(FileStat {
                size: file.content.len() as u64,
                is_dir: false,
                modified: file.modified,
            });
        }

        volume.dirs.contains(&path).then_some(FileStat {
            size: 0,
            is_dir: true,
            modified: 0,
        })
    }

    async fn open(&self, path: &Path) -> FsResult<Box<dyn FileHandle>> {
        let path = path.clean();
        let file = self
            .volume
            .read()
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.clone()))?;

        self.open_handles.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryHandle {
            content: file.content,
            open_handles: Arc::clone(&self.open_handles),
        }))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> FsResult<()> {
        self.insert(path, content);
        Ok(())
    }
}

/// Handle over a snapshot of a file's content.
///
/// Replacing the file while the handle is open does not affect reads.
#[derive(Debug)]
struct MemoryHandle {
    content: Arc<[u8]>,
    open_handles: Arc<AtomicUsize>,
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileHandle for MemoryHandle {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let len = self.content.len() as u64;
        if offset >= len {
            return Ok(0);
        }

        let start = offset as usize;
        let read = buf.len().min(self.content.len() - start);
        buf[..read].copy_from_slice(&self.content[start..start + read]);

        Ok(read)
    }

    async fn close(self: Box<Self>) -> FsResult<()> {
        Ok(())
    }
}
