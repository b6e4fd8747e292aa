//! Lazy byte producer over file ranges.
//!
//! [`MultipartRangeStream`] is a pull-based state machine: each call to
//! [`next_chunk`](MultipartRangeStream::next_chunk) yields the next piece of
//! the body. For every range it emits the prefix, then exactly `length` file
//! bytes from `offset`, then the suffix.
//!
//! The file is opened once, lazily, on the first pull and closed exactly
//! once: on completion, on a read error, or when the stream is dropped
//! mid-flight (client disconnect).

use crate::error::FsError;
use crate::fs::{FileHandle, FsResult, OutputFileSystem};
use crate::http::Range;
use axum::body::Bytes;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::Stream;

/// Default chunk size for file reads (64 KiB).
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Where the stream is within the current range.
#[derive(Debug)]
enum Phase {
    Prefix,
    Body { emitted: u64 },
    Suffix,
}

#[derive(Debug)]
struct Cursor {
    range: Range,
    phase: Phase,
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    /// Nothing pulled yet, file not opened
    Idle,
    /// File open, emitting ranges
    Streaming,
    /// Finished, failed or closed
    Done,
}

/// Ordered, finite byte producer over a list of [`Range`]s of one file.
#[derive(Debug)]
pub struct MultipartRangeStream {
    fs: Arc<dyn OutputFileSystem>,
    path: PathBuf,
    pending: VecDeque<Range>,
    current: Option<Cursor>,
    handle: Option<Box<dyn FileHandle>>,
    state: State,
    chunk_size: usize,
}

impl MultipartRangeStream {
    pub fn new(fs: Arc<dyn OutputFileSystem>, path: PathBuf, ranges: Vec<Range>) -> Self {
        Self {
            fs,
            path,
            pending: ranges.into(),
            current: None,
            handle: None,
            state: State::Idle,
            chunk_size: DEFAULT_HIGH_WATER_MARK,
        }
    }

    /// Set the maximum size of a single file read.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Produce the next chunk, or `None` at the end of the body.
    ///
    /// After an error the stream is finished and the handle released.
    pub async fn next_chunk(&mut self) -> FsResult<Option<Bytes>> {
        match self.state {
            State::Done => return Ok(None),
            State::Idle => {
                let handle = match self.fs.open(&self.path).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        self.state = State::Done;
                        return Err(e);
                    }
                };
                self.handle = Some(handle);
                self.state = State::Streaming;
            }
            State::Streaming => {}
        }

        match self.advance().await {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.finish().await?;
                Ok(None)
            }
            Err(e) => {
                // Surface the read error, not a secondary close failure
                let _ = self.finish().await;
                Err(e)
            }
        }
    }

    /// Convert into a `Stream` suitable for a response body.
    pub fn into_stream(mut self) -> impl Stream<Item = FsResult<Bytes>> + Send {
        async_stream::try_stream! {
            while let Some(chunk) = self.next_chunk().await? {
                yield chunk;
            }
        }
    }

    /// Whether the underlying file is currently open.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    async fn advance(&mut self) -> FsResult<Option<Bytes>> {
        loop {
            let Some(cursor) = self.current.as_mut() else {
                match self.pending.pop_front() {
                    Some(range) => {
                        self.current = Some(Cursor {
                            range,
                            phase: Phase::Prefix,
                        });
                        continue;
                    }
                    None => return Ok(None),
                }
            };

            match cursor.phase {
                Phase::Prefix => {
                    cursor.phase = Phase::Body { emitted: 0 };
                    if let Some(prefix) = cursor.range.prefix.take() {
                        return Ok(Some(prefix));
                    }
                }
                Phase::Body { emitted } => {
                    let remaining = cursor.range.length - emitted;
                    if remaining == 0 {
                        cursor.phase = Phase::Suffix;
                        continue;
                    }

                    let offset = cursor.range.offset + emitted;
                    let want = remaining.min(self.chunk_size as u64) as usize;
                    let mut buf = vec![0u8; want];

                    let Some(handle) = self.handle.as_mut() else {
                        return Ok(None);
                    };
                    let read = handle.read_at(offset, &mut buf).await?;
                    if read == 0 {
                        return Err(FsError::UnexpectedEof {
                            path: self.path.clone(),
                            offset,
                        });
                    }

                    buf.truncate(read);
                    cursor.phase = Phase::Body {
                        emitted: emitted + read as u64,
                    };
                    return Ok(Some(Bytes::from(buf)));
                }
                Phase::Suffix => {
                    let suffix = cursor.range.suffix.take();
                    self.current = None;
                    if let Some(suffix) = suffix {
                        return Ok(Some(suffix));
                    }
                }
            }
        }
    }

    async fn finish(&mut self) -> FsResult<()> {
        self.state = State::Done;
        self.pending.clear();
        self.current = None;

        match self.handle.take() {
            Some(handle) => handle.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileStat, MemoryFs};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_fs(content: &[u8]) -> MemoryFs {
        let fs = MemoryFs::new();
        fs.insert("/out/file.bin", content.to_vec());
        fs
    }

    async fn collect(stream: &mut MultipartRangeStream) -> FsResult<Vec<u8>> {
        let mut body = Vec::new();
        while let Some(chunk) = stream.next_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    #[tokio::test]
    async fn test_full_range() {
        let fs = memory_fs(b"hello world");
        let mut stream = MultipartRangeStream::new(
            Arc::new(fs.clone()),
            PathBuf::from("/out/file.bin"),
            vec![Range::new(0, 11)],
        );

        assert_eq!(collect(&mut stream).await.unwrap(), b"hello world");
        assert!(!stream.is_open());
        assert_eq!(fs.open_handles(), 0);
        // Finished streams stay finished
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ranges_with_framing_and_small_chunks() {
        let fs = memory_fs(b"0123456789abcdefghij");
        let ranges = vec![
            Range {
                offset: 2,
                length: 5,
                prefix: Some(Bytes::from_static(b"<")),
                suffix: None,
            },
            Range {
                offset: 15,
                length: 3,
                prefix: Some(Bytes::from_static(b"|")),
                suffix: Some(Bytes::from_static(b">")),
            },
        ];
        let mut stream =
            MultipartRangeStream::new(Arc::new(fs.clone()), PathBuf::from("/out/file.bin"), ranges)
                .with_chunk_size(2);

        assert_eq!(collect(&mut stream).await.unwrap(), b"<23456|fgh>");
        assert_eq!(fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_opens_lazily() {
        let fs = memory_fs(b"abc");
        let mut stream = MultipartRangeStream::new(
            Arc::new(fs.clone()),
            PathBuf::from("/out/file.bin"),
            vec![Range::new(0, 3)],
        );

        assert_eq!(fs.open_handles(), 0);
        assert!(!stream.is_open());

        let first = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(&first[..], b"abc");
        assert_eq!(fs.open_handles(), 1);
    }

    #[tokio::test]
    async fn test_drop_mid_flight_releases_handle() {
        let fs = memory_fs(&[7u8; 1024]);
        let mut stream = MultipartRangeStream::new(
            Arc::new(fs.clone()),
            PathBuf::from("/out/file.bin"),
            vec![Range::new(0, 1024)],
        )
        .with_chunk_size(100);

        stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(fs.open_handles(), 1);

        drop(stream);
        assert_eq!(fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let fs = MemoryFs::new();
        let mut stream = MultipartRangeStream::new(
            Arc::new(fs),
            PathBuf::from("/out/gone.bin"),
            vec![Range::new(0, 3)],
        );

        assert!(matches!(
            stream.next_chunk().await,
            Err(FsError::NotFound(_))
        ));
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_file_is_an_error() {
        let fs = memory_fs(b"short");
        let mut stream = MultipartRangeStream::new(
            Arc::new(fs.clone()),
            PathBuf::from("/out/file.bin"),
            vec![Range::new(0, 10)],
        );

        let err = collect(&mut stream).await.unwrap_err();
        assert!(matches!(err, FsError::UnexpectedEof { offset: 5, .. }));
        assert_eq!(fs.open_handles(), 0);
    }

    /// Filesystem whose reads fail after a fixed number of calls.
    #[derive(Debug)]
    struct FailingFs {
        reads_before_failure: usize,
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    #[derive(Debug)]
    struct FailingHandle {
        remaining: usize,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OutputFileSystem for FailingFs {
        async fn stat(&self, _path: &Path) -> Option<FileStat> {
            None
        }

        async fn open(&self, _path: &Path) -> FsResult<Box<dyn FileHandle>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FailingHandle {
                remaining: self.reads_before_failure,
                closes: Arc::clone(&self.closes),
            }))
        }

        async fn write_file(&self, _path: &Path, _content: &[u8]) -> FsResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl FileHandle for FailingHandle {
        async fn read_at(&mut self, _offset: u64, buf: &mut [u8]) -> FsResult<usize> {
            if self.remaining == 0 {
                return Err(FsError::Io {
                    path: PathBuf::from("/out/file.bin"),
                    source: std::io::Error::other("disk on fire"),
                });
            }
            self.remaining -= 1;
            buf.fill(b'x');
            Ok(buf.len())
        }

        async fn close(self: Box<Self>) -> FsResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_read_error_aborts_and_closes_once() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let fs = FailingFs {
            reads_before_failure: 2,
            opens: Arc::clone(&opens),
            closes: Arc::clone(&closes),
        };

        let mut stream = MultipartRangeStream::new(
            Arc::new(fs),
            PathBuf::from("/out/file.bin"),
            vec![Range::new(0, 100)],
        )
        .with_chunk_size(10);

        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 10);
        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 10);
        assert!(matches!(stream.next_chunk().await, Err(FsError::Io { .. })));
        assert!(stream.next_chunk().await.unwrap().is_none());

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_into_stream() {
        use tokio_stream::StreamExt;

        let fs = memory_fs(b"streamed body");
        let stream = MultipartRangeStream::new(
            Arc::new(fs),
            PathBuf::from("/out/file.bin"),
            vec![Range::new(9, 4)],
        )
        .into_stream();
        tokio::pin!(stream);

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"body");
    }
}
