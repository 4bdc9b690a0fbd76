// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    io::{self, SeekFrom},
    path::Path,
};

use snafu::ResultExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt},
};

use crate::{
    chunk_plan::ByteRange,
    error::{IoFailureSnafu, Result, SinkWriteSnafu, TransferError, UnavailableSnafu},
};

const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Copies inclusive byte ranges of a file into an async sink.
///
/// Every call opens its own read-only handle; the handle is dropped on
/// every exit path, including a failed sink write.
#[derive(Debug, Clone, Copy)]
pub struct RangeTransferEngine {
    buffer_size: usize,
}

impl Default for RangeTransferEngine {
    fn default() -> Self { Self::new(DEFAULT_BUFFER_SIZE) }
}

impl RangeTransferEngine {
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Stream `range` of the file at `path` into `sink` and flush it.
    ///
    /// Returns the number of bytes written, always `range.length()` on
    /// success. A file shorter than `range.end + 1` is an I/O failure.
    pub async fn stream_range<W>(&self, sink: &mut W, path: &Path, range: ByteRange) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (mut file, _) = open_regular(path).await?;
        self.copy_range(&mut file, sink, path, range).await
    }

    /// Stream the whole file. An empty file writes nothing.
    pub async fn stream_whole<W>(&self, sink: &mut W, path: &Path) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (mut file, size) = open_regular(path).await?;
        match ByteRange::whole(size) {
            Some(range) => self.copy_range(&mut file, sink, path, range).await,
            None => {
                sink.flush().await.context(SinkWriteSnafu)?;
                Ok(0)
            }
        }
    }

    async fn copy_range<W>(
        &self,
        file: &mut File,
        sink: &mut W,
        path: &Path,
        range: ByteRange,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        file.seek(SeekFrom::Start(range.start))
            .await
            .context(IoFailureSnafu { path })?;

        let mut buf = vec![0u8; self.buffer_size];
        let mut remaining = range.length();
        while remaining > 0 {
            let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
            let read = match file.read(&mut buf[..want]).await {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{remaining} bytes short of range {range}"),
                    ))
                    .context(IoFailureSnafu { path });
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context(IoFailureSnafu { path }),
            };
            sink.write_all(&buf[..read])
                .await
                .context(SinkWriteSnafu)?;
            remaining -= read as u64;
        }

        sink.flush().await.context(SinkWriteSnafu)?;
        Ok(range.length())
    }
}

/// Open `path` read-only and return it with its size. Directories count as
/// unavailable.
pub(crate) async fn open_regular(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).await.context(UnavailableSnafu { path })?;
    let metadata = file.metadata().await.context(UnavailableSnafu { path })?;
    if metadata.is_dir() {
        return Err(TransferError::Unavailable {
            path:   path.to_path_buf(),
            source: io::Error::other("is a directory"),
        });
    }
    Ok((file, metadata.len()))
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        task::{Context, Poll},
    };

    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;

    fn sample(len: usize) -> Vec<u8> { (0..len).map(|i| (i % 251) as u8).collect() }

    fn write_sample(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Accepts `limit` bytes, then fails like a closed socket.
    struct FailingSink {
        written: usize,
        limit:   usize,
    }

    impl AsyncWrite for FailingSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.written >= self.limit {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            let n = buf.len().min(self.limit - self.written);
            self.written += n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_stream_range_with_small_buffer() {
        let dir = TempDir::new().unwrap();
        let content = sample(10_000);
        let path = write_sample(&dir, "data.bin", &content);

        let engine = RangeTransferEngine::new(7);
        let mut sink = Vec::new();
        let range = ByteRange::new(1234, 5678).unwrap();
        let written = engine.stream_range(&mut sink, &path, range).await.unwrap();

        assert_eq!(written, range.length());
        assert_eq!(sink, &content[1234..=5678]);
    }

    #[tokio::test]
    async fn test_stream_whole() {
        let dir = TempDir::new().unwrap();
        let content = sample(20_000);
        let path = write_sample(&dir, "data.bin", &content);

        let mut sink = Vec::new();
        let written = RangeTransferEngine::default()
            .stream_whole(&mut sink, &path)
            .await
            .unwrap();
        assert_eq!(written, 20_000);
        assert_eq!(sink, content);
    }

    #[tokio::test]
    async fn test_empty_file_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = write_sample(&dir, "empty.bin", b"");

        let mut sink = Vec::new();
        let written = RangeTransferEngine::default()
            .stream_whole(&mut sink, &path)
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_directory_are_unavailable() {
        let dir = TempDir::new().unwrap();
        let engine = RangeTransferEngine::default();
        let mut sink = Vec::new();

        let err = engine
            .stream_whole(&mut sink, &dir.path().join("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = engine.stream_whole(&mut sink, dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_premature_eof_is_io_failure() {
        let dir = TempDir::new().unwrap();
        let path = write_sample(&dir, "short.bin", &sample(100));

        let mut sink = Vec::new();
        let err = RangeTransferEngine::default()
            .stream_range(&mut sink, &path, ByteRange::new(50, 199).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::IoFailure { .. }));
        assert_eq!(sink.len(), 50);
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_copy() {
        let dir = TempDir::new().unwrap();
        let path = write_sample(&dir, "data.bin", &sample(64 * 1024));

        let mut sink = FailingSink {
            written: 0,
            limit:   10_000,
        };
        let err = RangeTransferEngine::default()
            .stream_whole(&mut sink, &path)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(sink.written, 10_000);
    }

    #[tokio::test]
    async fn test_dropped_reader_aborts_copy() {
        let dir = TempDir::new().unwrap();
        let path = write_sample(&dir, "data.bin", &sample(256 * 1024));

        let (mut writer, reader) = tokio::io::duplex(4096);
        drop(reader);
        let err = RangeTransferEngine::default()
            .stream_whole(&mut writer, &path)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SinkWrite { .. }));
    }
}
