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

//! Download codes and range-validated file transfer.
//!
//! A caller asks [`TransferService`] for a download code, then presents the
//! code to fetch either the whole file or independently addressable chunks.
//! All files live under a single storage root; paths that try to leave it
//! are rejected before the filesystem is touched.

pub mod catalog;
pub mod chunk_plan;
mod config;
mod disposition;
mod error;
pub mod path_resolver;
mod range_transfer;
pub mod session;
mod service;
pub mod strategy;

pub use catalog::{FileCatalog, FileRecord, HomeDirCatalog};
pub use chunk_plan::{ByteRange, ChunkPlan, validate_client_plan};
pub use config::{MIN_CODE_LENGTH, TransferConfig};
pub use disposition::content_disposition;
pub use error::{ErrorKind, Result, TransferError};
pub use range_transfer::RangeTransferEngine;
pub use service::{
    ChunkInfo, ChunkRequest, PreparedTransfer, ResponseHead, TransferBody, TransferService,
    X_CHUNK_DOWNLOAD_SUGGESTED, X_CHUNK_SIZE, X_FILE_SIZE, X_TOTAL_CHUNKS,
};
pub use session::{
    DownloadDescriptor, DownloadSession, FileKind, MemorySessionStore, SessionStore,
    generate_code,
};
pub use strategy::{MediaStrategy, PlainStrategy, Selection, TransferStrategy};
