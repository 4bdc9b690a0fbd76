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

//! Request validation and response-head decisions for downloads.
//!
//! Each download request is split in two: a `prepare_*` call that runs every
//! check and returns the response head, and [`PreparedTransfer::send`] that
//! streams the bytes. Adapters commit the head before calling `send`, so
//! every caller error surfaces before a single byte is written.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use bon::Builder;
use http::{
    HeaderMap, HeaderName, HeaderValue, StatusCode,
    header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, ensure};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    catalog::FileCatalog,
    chunk_plan::{ByteRange, ChunkPlan, validate_client_plan},
    config::TransferConfig,
    disposition::content_disposition,
    error::{
        FileNotFoundSnafu, InvalidHeaderSnafu, InvalidRequestSnafu, Result, SinkWriteSnafu,
        TransferError, UnavailableSnafu,
    },
    path_resolver,
    range_transfer::RangeTransferEngine,
    session::{DownloadDescriptor, DownloadSession, SessionStore},
    strategy::{Selection, strategy_for},
};

pub const X_CHUNK_DOWNLOAD_SUGGESTED: HeaderName =
    HeaderName::from_static("x-chunk-download-suggested");
pub const X_FILE_SIZE: HeaderName = HeaderName::from_static("x-file-size");
pub const X_CHUNK_SIZE: HeaderName = HeaderName::from_static("x-chunk-size");
pub const X_TOTAL_CHUNKS: HeaderName = HeaderName::from_static("x-total-chunks");

const CHUNK_CONTENT_TYPE: &str = "application/octet-stream";

/// Chunk geometry a client needs before fetching chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub download_code: String,
    pub file_name:     String,
    pub file_size:     u64,
    pub chunk_size:    u64,
    pub total_chunks:  u64,
}

/// A request for one chunk of a download.
#[derive(Debug, Clone, Builder)]
pub struct ChunkRequest {
    #[builder(into)]
    pub code:         String,
    pub chunk_index:  i64,
    /// Overrides the configured chunk size for this request.
    pub chunk_size:   Option<u64>,
    /// The client's idea of the chunk count. When present it must match.
    pub total_chunks: Option<i64>,
}

/// Status line and headers, decided before any byte is sent.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status:  StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    fn new(status: StatusCode) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        Self { status, headers }
    }

    fn insert(&mut self, name: HeaderName, value: impl ToString) -> Result<()> {
        let value = HeaderValue::from_str(&value.to_string()).context(InvalidHeaderSnafu {
            name: name.as_str().to_string(),
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    fn insert_static(&mut self, name: HeaderName, value: &'static str) {
        self.headers.insert(name, HeaderValue::from_static(value));
    }
}

/// The bytes side of a prepared transfer.
#[derive(Debug, Clone)]
pub struct TransferBody {
    path:   PathBuf,
    /// `None` for an empty file.
    range:  Option<ByteRange>,
    engine: RangeTransferEngine,
}

impl TransferBody {
    #[must_use]
    pub fn content_length(&self) -> u64 { self.range.map_or(0, |range| range.length()) }

    #[must_use]
    pub const fn range(&self) -> Option<ByteRange> { self.range }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Stream the selected bytes into `sink`. Failures are logged here since
    /// the response head is already on the wire when they happen.
    pub async fn send<W>(&self, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let result = match self.range {
            Some(range) => self.engine.stream_range(sink, &self.path, range).await,
            // The head promised zero bytes; whatever the file holds now stays
            // unread.
            None => sink.flush().await.context(SinkWriteSnafu).map(|()| 0),
        };
        match &result {
            Ok(written) => tracing::debug!(path = %self.path.display(), written, "transfer delivered"),
            Err(TransferError::SinkWrite { source }) => {
                tracing::warn!(path = %self.path.display(), error = %source, "client went away mid-transfer");
            }
            Err(e) => tracing::error!(path = %self.path.display(), error = %e, "transfer failed"),
        }
        result
    }
}

/// Outcome of a successful `prepare_*` call.
#[derive(Debug, Clone)]
pub struct PreparedTransfer {
    pub head: ResponseHead,
    pub body: TransferBody,
}

impl PreparedTransfer {
    pub async fn send<W>(&self, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.body.send(sink).await
    }

    #[must_use]
    pub fn into_parts(self) -> (ResponseHead, TransferBody) { (self.head, self.body) }
}

/// A session resolved to a regular file on disk.
struct ResolvedFile {
    session: DownloadSession,
    path:    PathBuf,
    size:    u64,
}

/// Entry point for download codes and transfers.
#[derive(Clone)]
pub struct TransferService {
    config:  Arc<TransferConfig>,
    store:   Arc<dyn SessionStore>,
    catalog: Arc<dyn FileCatalog>,
    engine:  RangeTransferEngine,
}

impl TransferService {
    pub fn new(
        config: TransferConfig,
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn FileCatalog>,
    ) -> Self {
        let engine = RangeTransferEngine::new(config.buffer_size.as_bytes_usize());
        Self {
            config: Arc::new(config),
            store,
            catalog,
            engine,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TransferConfig { &self.config }

    /// Mint a download code for `file_id` owned by `user_id`.
    pub async fn create_download_code(&self, file_id: &str, user_id: &str) -> Result<String> {
        let record = self
            .catalog
            .lookup(file_id, user_id)
            .await?
            .context(FileNotFoundSnafu { name: file_id })?;
        ensure!(
            !record.is_dir,
            InvalidRequestSnafu {
                reason: "directories cannot be downloaded",
            }
        );

        let descriptor = DownloadDescriptor {
            relative_path: record.relative_path,
            display_name:  record.display_name,
            kind:          record.kind,
        };
        self.create_code_for(descriptor).await
    }

    /// Mint a download code for an already-authorized descriptor.
    pub async fn create_code_for(&self, descriptor: DownloadDescriptor) -> Result<String> {
        path_resolver::resolve(&self.config.storage_root, &descriptor.relative_path)
            .inspect_err(|e| tracing::warn!(error = %e, "refusing to mint code"))?;

        let name = descriptor.display_name.clone();
        let kind = descriptor.kind;
        let code = self.store.create(descriptor).await?;
        tracing::info!(code = redact(&code), file = %name, %kind, "download code created");
        Ok(code)
    }

    /// Drop a code before its TTL runs out.
    pub async fn invalidate(&self, code: &str) -> Result<()> { self.store.invalidate(code).await }

    pub async fn chunk_info(&self, code: &str) -> Result<ChunkInfo> {
        let file = self.resolve(code).await?;
        let plan = ChunkPlan::new(file.size, self.config.chunk_size.as_bytes())?;
        Ok(ChunkInfo {
            download_code: file.session.code,
            file_name:     file.session.display_name,
            file_size:     file.size,
            chunk_size:    plan.chunk_size(),
            total_chunks:  plan.total_chunks(),
        })
    }

    /// Validate a chunk request and decide its 206 head.
    pub async fn prepare_chunk(&self, request: ChunkRequest) -> Result<PreparedTransfer> {
        let file = self.resolve(&request.code).await?;
        let chunk_size = request
            .chunk_size
            .unwrap_or_else(|| self.config.chunk_size.as_bytes());

        let plan = match request.total_chunks {
            Some(claimed_total) => validate_client_plan(
                file.size,
                chunk_size,
                request.chunk_index,
                claimed_total,
                self.config.max_chunk_count,
            ),
            None => ChunkPlan::new(file.size, chunk_size),
        };
        let range = plan
            .and_then(|plan| plan.range_for_chunk(request.chunk_index))
            .inspect_err(|e| {
                tracing::warn!(code = redact(&request.code), error = %e, "chunk request rejected");
            })?;

        let mut head = ResponseHead::new(StatusCode::PARTIAL_CONTENT);
        head.insert_static(CONTENT_TYPE, CHUNK_CONTENT_TYPE);
        head.insert(CONTENT_RANGE, range.content_range(file.size))?;
        head.insert(CONTENT_LENGTH, range.length())?;

        tracing::debug!(
            code = redact(&request.code),
            index = request.chunk_index,
            %range,
            "serving chunk"
        );
        Ok(PreparedTransfer {
            head,
            body: self.body(file.path, Some(range)),
        })
    }

    /// Validate a whole-file request and decide its head.
    ///
    /// Media sessions honour `range_header`; plain sessions ignore it.
    pub async fn prepare_download(
        &self,
        code: &str,
        user_agent: Option<&str>,
        range_header: Option<&str>,
    ) -> Result<PreparedTransfer> {
        let file = self.resolve(code).await?;
        let strategy = strategy_for(file.session.kind);
        let selection = strategy
            .select(file.size, range_header)
            .inspect_err(|e| tracing::warn!(code = redact(code), error = %e, "range rejected"))?;

        let (mut head, range) = match selection {
            Selection::Full => {
                let mut head = ResponseHead::new(StatusCode::OK);
                self.advertise_chunks(&mut head, file.size)?;
                (head, ByteRange::whole(file.size))
            }
            Selection::Partial(range) => {
                let mut head = ResponseHead::new(StatusCode::PARTIAL_CONTENT);
                head.insert(CONTENT_RANGE, range.content_range(file.size))?;
                (head, Some(range))
            }
        };
        head.insert_static(CONTENT_TYPE, strategy.content_type(&file.session.display_name));
        head.insert(
            CONTENT_DISPOSITION,
            content_disposition(&file.session.display_name, user_agent),
        )?;
        let body = self.body(file.path, range);
        head.insert(CONTENT_LENGTH, body.content_length())?;

        tracing::debug!(code = redact(code), status = %head.status, "serving download");
        Ok(PreparedTransfer { head, body })
    }

    fn advertise_chunks(&self, head: &mut ResponseHead, file_size: u64) -> Result<()> {
        let plan = ChunkPlan::new(file_size, self.config.chunk_size.as_bytes())?;
        if file_size > plan.chunk_size() {
            head.insert_static(X_CHUNK_DOWNLOAD_SUGGESTED, "true");
            head.insert(X_FILE_SIZE, file_size)?;
            head.insert(X_CHUNK_SIZE, plan.chunk_size())?;
            head.insert(X_TOTAL_CHUNKS, plan.total_chunks())?;
        }
        Ok(())
    }

    fn body(&self, path: PathBuf, range: Option<ByteRange>) -> TransferBody {
        TransferBody {
            path,
            range,
            engine: self.engine,
        }
    }

    async fn resolve(&self, code: &str) -> Result<ResolvedFile> {
        let Some(session) = self.store.get(code).await? else {
            tracing::warn!(code = redact(code), "unknown or expired download code");
            return Err(TransferError::CodeNotFound);
        };
        let path = path_resolver::resolve(&self.config.storage_root, &session.relative_path)
            .inspect_err(|e| tracing::warn!(error = %e, "stored path rejected"))?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .context(UnavailableSnafu { path: &path })?;
        if metadata.is_dir() {
            return Err(TransferError::Unavailable {
                path,
                source: std::io::Error::other("is a directory"),
            });
        }
        Ok(ResolvedFile {
            session,
            size: metadata.len(),
            path,
        })
    }
}

/// Enough of a code to correlate log lines without making it usable.
fn redact(code: &str) -> &str { code.get(..8).unwrap_or(code) }

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::{catalog::HomeDirCatalog, error::ErrorKind, session::MemorySessionStore};

    fn service(root: &Path) -> TransferService {
        let config = TransferConfig::builder()
            .storage_root(root.to_path_buf())
            .chunk_size(panserve_base::readable_size::ReadableSize::kb(1))
            .build();
        let store = MemorySessionStore::new(Duration::from_secs(60), 50).unwrap();
        TransferService::new(
            config,
            Arc::new(store),
            Arc::new(HomeDirCatalog::new(root)),
        )
    }

    #[tokio::test]
    async fn test_directory_cannot_be_shared() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("u1/docs")).unwrap();

        let err = service(root.path())
            .create_download_code("docs", "u1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_chunk_head() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("u1")).unwrap();
        std::fs::write(root.path().join("u1/a.bin"), vec![7u8; 2500]).unwrap();

        let service = service(root.path());
        let code = service.create_download_code("a.bin", "u1").await.unwrap();
        let prepared = service
            .prepare_chunk(ChunkRequest::builder().code(&code).chunk_index(2).build())
            .await
            .unwrap();

        assert_eq!(prepared.head.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(prepared.head.headers[CONTENT_RANGE], "bytes 2048-2499/2500");
        assert_eq!(prepared.head.headers[CONTENT_LENGTH], "452");
        assert_eq!(prepared.head.headers[ACCEPT_RANGES], "bytes");
        assert_eq!(prepared.body.content_length(), 452);
    }

    #[tokio::test]
    async fn test_whole_file_advertises_chunks() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("u1")).unwrap();
        std::fs::write(root.path().join("u1/big.bin"), vec![1u8; 3000]).unwrap();
        std::fs::write(root.path().join("u1/small.bin"), vec![1u8; 1024]).unwrap();

        let service = service(root.path());
        let code = service.create_download_code("big.bin", "u1").await.unwrap();
        let head = service.prepare_download(&code, None, None).await.unwrap().head;
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers[&X_CHUNK_DOWNLOAD_SUGGESTED], "true");
        assert_eq!(head.headers[&X_FILE_SIZE], "3000");
        assert_eq!(head.headers[&X_CHUNK_SIZE], "1024");
        assert_eq!(head.headers[&X_TOTAL_CHUNKS], "3");
        assert_eq!(head.headers[CONTENT_LENGTH], "3000");

        let code = service.create_download_code("small.bin", "u1").await.unwrap();
        let head = service.prepare_download(&code, None, None).await.unwrap().head;
        assert!(!head.headers.contains_key(&X_CHUNK_DOWNLOAD_SUGGESTED));
    }

    #[tokio::test]
    async fn test_file_removed_after_code_minted() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("u1")).unwrap();
        std::fs::write(root.path().join("u1/gone.txt"), b"bye").unwrap();

        let service = service(root.path());
        let code = service.create_download_code("gone.txt", "u1").await.unwrap();
        std::fs::remove_file(root.path().join("u1/gone.txt")).unwrap();

        let err = service.chunk_info(&code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("abcdefghijklmnop"), "abcdefgh");
        assert_eq!(redact("abc"), "abc");
    }
}
