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

//! Fixed-size chunk geometry.
//!
//! A file of `F` bytes split into chunks of `C` bytes has `ceil(F / C)`
//! chunks. Chunk `i` covers `[i * C, min(i * C + C - 1, F - 1)]`, so the
//! ranges are contiguous and only the last one may be short.

use std::fmt;

use snafu::ensure;

use crate::error::{ChunkOutOfRangeSnafu, InvalidRequestSnafu, Result};

/// Inclusive byte range, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end:   u64,
}

impl ByteRange {
    /// `None` when `start > end`.
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// The range covering a whole file; `None` for an empty file.
    #[must_use]
    pub const fn whole(file_size: u64) -> Option<Self> {
        if file_size == 0 {
            None
        } else {
            Some(Self {
                start: 0,
                end:   file_size - 1,
            })
        }
    }

    #[must_use]
    pub const fn length(&self) -> u64 { self.end - self.start + 1 }

    /// Value for a `Content-Range` header.
    #[must_use]
    pub fn content_range(&self, file_size: u64) -> String {
        format!("bytes {}-{}/{file_size}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size:    u64,
    chunk_size:   u64,
    total_chunks: u64,
}

impl ChunkPlan {
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self> {
        ensure!(
            chunk_size > 0,
            InvalidRequestSnafu {
                reason: "chunk size must be positive",
            }
        );
        Ok(Self {
            file_size,
            chunk_size,
            total_chunks: file_size.div_ceil(chunk_size),
        })
    }

    #[must_use]
    pub const fn file_size(&self) -> u64 { self.file_size }

    #[must_use]
    pub const fn chunk_size(&self) -> u64 { self.chunk_size }

    #[must_use]
    pub const fn total_chunks(&self) -> u64 { self.total_chunks }

    /// Byte range of chunk `index`. Signed so a negative index coming off
    /// the wire is reported instead of wrapping.
    pub fn range_for_chunk(&self, index: i64) -> Result<ByteRange> {
        let out_of_range = ChunkOutOfRangeSnafu {
            index,
            total: self.total_chunks,
            file_size: self.file_size,
        };
        let Ok(i) = u64::try_from(index) else {
            return out_of_range.fail();
        };
        ensure!(i < self.total_chunks, out_of_range);

        let start = i * self.chunk_size;
        let end = start
            .saturating_add(self.chunk_size - 1)
            .min(self.file_size - 1);
        Ok(ByteRange { start, end })
    }

    /// Every chunk range in order.
    pub fn ranges(&self) -> impl Iterator<Item = ByteRange> + '_ {
        (0..self.total_chunks).map(move |i| {
            let start = i * self.chunk_size;
            ByteRange {
                start,
                end: start
                    .saturating_add(self.chunk_size - 1)
                    .min(self.file_size - 1),
            }
        })
    }
}

/// Check a client's idea of the chunk layout against the server's.
///
/// Any disagreement is a hard rejection; the server never re-plans on the
/// client's behalf.
pub fn validate_client_plan(
    file_size: u64,
    chunk_size: u64,
    claimed_index: i64,
    claimed_total: i64,
    max_chunk_count: u64,
) -> Result<ChunkPlan> {
    let claimed = u64::try_from(claimed_total).unwrap_or(0);
    ensure!(
        claimed > 0 && claimed <= max_chunk_count,
        InvalidRequestSnafu {
            reason: format!("total chunks {claimed_total} outside 1..={max_chunk_count}"),
        }
    );

    let plan = ChunkPlan::new(file_size, chunk_size)?;
    ensure!(
        claimed == plan.total_chunks(),
        InvalidRequestSnafu {
            reason: format!(
                "total chunks {claimed_total} does not match server plan of {}",
                plan.total_chunks()
            ),
        }
    );
    plan.range_for_chunk(claimed_index)?;
    Ok(plan)
}
