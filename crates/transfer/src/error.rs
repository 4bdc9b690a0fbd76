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

use std::{any::Any, path::PathBuf};

use panserve_error::{ErrorExt, StackError, StatusCode};
use snafu::Snafu;
use strum::EnumProperty;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorKind {
    NotFound,
    Rejected,
    InvalidRequest,
    IoFailure,
}

#[derive(Debug, Snafu, strum_macros::EnumProperty)]
#[snafu(visibility(pub))]
pub enum TransferError {
    #[snafu(display("Download code not found or expired"))]
    #[strum(props(status_code = "not_found", kind = "not_found"))]
    CodeNotFound,

    #[snafu(display("File {name:?} not found"))]
    #[strum(props(status_code = "not_found", kind = "not_found"))]
    FileNotFound { name: String },

    /// Open or stat failed. The absolute path stays out of the message.
    #[snafu(display("File is not available"))]
    #[strum(props(status_code = "not_found", kind = "not_found"))]
    Unavailable {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Path {path:?} rejected: {reason}"))]
    #[strum(props(status_code = "forbidden", kind = "rejected"))]
    Rejected { path: String, reason: String },

    #[snafu(display("Invalid request: {reason}"))]
    #[strum(props(status_code = "invalid_argument", kind = "invalid_request"))]
    InvalidRequest { reason: String },

    #[snafu(display("Chunk index {index} out of range, total chunks {total}"))]
    #[strum(props(status_code = "range_not_satisfiable", kind = "invalid_request"))]
    ChunkOutOfRange {
        index:     i64,
        total:     u64,
        file_size: u64,
    },

    #[snafu(display("Requested range not satisfiable, file size {file_size}"))]
    #[strum(props(status_code = "range_not_satisfiable", kind = "invalid_request"))]
    RangeNotSatisfiable { file_size: u64 },

    #[snafu(display("I/O failure reading {}", path.display()))]
    #[strum(props(status_code = "internal", kind = "io_failure"))]
    IoFailure {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write to sink"))]
    #[strum(props(status_code = "internal", kind = "io_failure"))]
    SinkWrite { source: std::io::Error },

    #[snafu(display("Invalid header value for {name}"))]
    #[strum(props(status_code = "internal", kind = "io_failure"))]
    InvalidHeader {
        name:   String,
        source: http::header::InvalidHeaderValue,
    },

    #[snafu(display("Session store failure: {message}"))]
    #[strum(props(status_code = "internal", kind = "io_failure"))]
    SessionStore { message: String },
}

impl TransferError {
    /// File size to report in `Content-Range: bytes */size` when the error
    /// answers 416.
    #[must_use]
    pub const fn unsatisfied_size(&self) -> Option<u64> {
        match self {
            Self::ChunkOutOfRange { file_size, .. } | Self::RangeNotSatisfiable { file_size } => {
                Some(*file_size)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.get_str("kind") {
            Some("not_found") => ErrorKind::NotFound,
            Some("rejected") => ErrorKind::Rejected,
            Some("invalid_request") => ErrorKind::InvalidRequest,
            _ => ErrorKind::IoFailure,
        }
    }
}

impl ErrorExt for TransferError {
    fn status_code(&self) -> StatusCode {
        self.get_str("status_code")
            .and_then(|value| value.parse().ok())
            .unwrap_or(StatusCode::Unknown)
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}

impl StackError for TransferError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_status_mapping() {
        let cases = [
            (TransferError::CodeNotFound, ErrorKind::NotFound, StatusCode::NotFound),
            (
                TransferError::Rejected {
                    path:   "../etc".to_string(),
                    reason: "parent component".to_string(),
                },
                ErrorKind::Rejected,
                StatusCode::Forbidden,
            ),
            (
                TransferError::ChunkOutOfRange {
                    index:     4,
                    total:     4,
                    file_size: 4000,
                },
                ErrorKind::InvalidRequest,
                StatusCode::RangeNotSatisfiable,
            ),
            (
                TransferError::InvalidRequest {
                    reason: "chunk size must be positive".to_string(),
                },
                ErrorKind::InvalidRequest,
                StatusCode::InvalidArgument,
            ),
            (
                TransferError::SinkWrite {
                    source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
                },
                ErrorKind::IoFailure,
                StatusCode::Internal,
            ),
        ];

        for (error, kind, status) in cases {
            assert_eq!(error.kind(), kind, "{error}");
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn test_unavailable_hides_absolute_path() {
        let error = TransferError::Unavailable {
            path:   PathBuf::from("/srv/pan/42/secret.bin"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(!error.to_string().contains("/srv/pan"));
    }
}
