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

use std::{path::PathBuf, time::Duration};

use bon::Builder;
use panserve_base::readable_size::ReadableSize;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Shortest download code accepted; anything below is too easy to guess.
pub const MIN_CODE_LENGTH: usize = 40;

/// Configuration for download codes and transfers.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Directory every servable file lives under.
    #[default(PathBuf::from("./data/files"))]
    #[builder(default = PathBuf::from("./data/files"))]
    pub storage_root: PathBuf,

    /// Chunk size used for planning (default: 1MiB)
    #[default(ReadableSize::mb(1))]
    #[builder(default = ReadableSize::mb(1))]
    pub chunk_size: ReadableSize,

    /// Upper bound a client may claim for `totalChunks`
    #[default = 10_000]
    #[builder(default = 10_000)]
    pub max_chunk_count: u64,

    /// Length of generated download codes, clamped to `MIN_CODE_LENGTH`
    #[default = 50]
    #[builder(default = 50)]
    pub code_length: usize,

    /// How long a download code stays readable (default: 1 day)
    #[default(Duration::from_secs(24 * 60 * 60))]
    #[builder(default = Duration::from_secs(24 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub code_ttl: Duration,

    /// Copy buffer used by the range engine (default: 8KiB)
    #[default(ReadableSize::kb(8))]
    #[builder(default = ReadableSize::kb(8))]
    pub buffer_size: ReadableSize,
}

impl TransferConfig {
    #[must_use]
    pub fn effective_code_length(&self) -> usize { self.code_length.max(MIN_CODE_LENGTH) }
}
