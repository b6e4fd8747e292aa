use super::{FileHandle, FileStat, FsResult, OutputFileSystem};
use crate::error::FsError;
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Output filesystem backed by the real disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFs;

impl NativeFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputFileSystem for NativeFs {
    async fn stat(&self, path: &Path) -> Option<FileStat> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "stat failed");
                }
                return None;
            }
        };

        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0);

        Some(FileStat {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            modified,
        })
    }

    async fn open(&self, path: &Path) -> FsResult<Box<dyn FileHandle>> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FsError::io(path, e))?;

        Ok(Box::new(NativeHandle {
            path: path.to_path_buf(),
            file,
            position: None,
        }))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> FsResult<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FsError::io(dir, e))?;
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| FsError::io(path, e))?;
        file.write_all(content)
            .await
            .map_err(|e| FsError::io(path, e))?;
        file.flush().await.map_err(|e| FsError::io(path, e))
    }

    async fn real_path(&self, path: &Path) -> Option<PathBuf> {
        tokio::fs::canonicalize(path).await.ok()
    }
}

/// Open file on disk. The descriptor closes when the handle drops.
#[derive(Debug)]
struct NativeHandle {
    path: PathBuf,
    file: tokio::fs::File,
    /// Cursor position after the last read, to skip redundant seeks
    position: Option<u64>,
}

#[async_trait]
impl FileHandle for NativeHandle {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        if self.position != Some(offset) {
            self.file
                .seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| FsError::io(&self.path, e))?;
        }

        let read = self
            .file
            .read(buf)
            .await
            .map_err(|e| FsError::io(&self.path, e))?;
        self.position = Some(offset + read as u64);

        Ok(read)
    }

    async fn close(self: Box<Self>) -> FsResult<()> {
        drop(self.file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stat_and_read() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("app.js");
        std::fs::write(&file, b"0123456789").unwrap();

        let fs = NativeFs::new();
        let stat = fs.stat(&file).await.unwrap();
        assert_eq!(stat.size, 10);
        assert!(stat.is_file());
        assert!(stat.modified > 0);

        let mut handle = fs.open(&file).await.unwrap();
        let mut buf = [0u8; 4];
        let read = handle.read_at(3, &mut buf).await.unwrap();
        assert_eq!(&buf[..read], b"3456");

        let read = handle.read_at(8, &mut buf).await.unwrap();
        assert_eq!(&buf[..read], b"89");

        let read = handle.read_at(10, &mut buf).await.unwrap();
        assert_eq!(read, 0);

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stat_missing_and_directory() {
        let temp = TempDir::new().unwrap();
        let fs = NativeFs::new();

        assert!(fs.stat(&temp.path().join("missing.js")).await.is_none());
        assert!(fs.stat(temp.path()).await.unwrap().is_dir);
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested/dir/bundle.js");

        NativeFs::new().write_file(&target, b"bundle").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"bundle");
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = NativeFs::new()
            .open(&temp.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }
}
