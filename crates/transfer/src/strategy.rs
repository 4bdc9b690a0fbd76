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

//! Per-kind decisions for whole-file requests.

use crate::{
    chunk_plan::ByteRange,
    error::{Result, TransferError},
    session::FileKind,
};

/// Part of the file a whole-file request receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 200 with the full body.
    Full,
    /// 206 with the given range.
    Partial(ByteRange),
}

/// Outcome of reading a `Range` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeHeader {
    Satisfiable(ByteRange),
    Unsatisfiable,
    /// Malformed, multi-range or reversed; served as if absent.
    Ignored,
}

/// Parse a single `bytes=` range against a file of `file_size` bytes.
///
/// Accepts `a-b`, `a-` and `-suffix`. An end past the file is clamped.
#[must_use]
pub fn parse_range_header(value: &str, file_size: u64) -> RangeHeader {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangeHeader::Ignored;
    };
    if spec.contains(',') {
        return RangeHeader::Ignored;
    }
    let Some((start, end)) = spec.trim().split_once('-') else {
        return RangeHeader::Ignored;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let Ok(suffix) = end.parse::<u64>() else {
            return RangeHeader::Ignored;
        };
        if suffix == 0 || file_size == 0 {
            return RangeHeader::Unsatisfiable;
        }
        return ByteRange::new(file_size.saturating_sub(suffix), file_size - 1)
            .map_or(RangeHeader::Unsatisfiable, RangeHeader::Satisfiable);
    }

    let Ok(start) = start.parse::<u64>() else {
        return RangeHeader::Ignored;
    };
    let end = if end.is_empty() {
        None
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return RangeHeader::Ignored,
        }
    };
    if start >= file_size {
        return RangeHeader::Unsatisfiable;
    }
    let last = file_size - 1;
    ByteRange::new(start, end.map_or(last, |end| end.min(last)))
        .map_or(RangeHeader::Unsatisfiable, RangeHeader::Satisfiable)
}

/// Decides how a whole-file request is answered for one kind of file.
pub trait TransferStrategy: Send + Sync {
    fn select(&self, file_size: u64, range_header: Option<&str>) -> Result<Selection>;

    fn content_type(&self, display_name: &str) -> &'static str;
}

/// Attachments: the whole file, `Range` ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainStrategy;

impl TransferStrategy for PlainStrategy {
    fn select(&self, _file_size: u64, _range_header: Option<&str>) -> Result<Selection> {
        Ok(Selection::Full)
    }

    fn content_type(&self, _display_name: &str) -> &'static str {
        "application/x-msdownload; charset=UTF-8"
    }
}

/// Audio and video: a single `Range` is honoured so players can seek.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaStrategy;

impl TransferStrategy for MediaStrategy {
    fn select(&self, file_size: u64, range_header: Option<&str>) -> Result<Selection> {
        let Some(value) = range_header else {
            return Ok(Selection::Full);
        };
        match parse_range_header(value, file_size) {
            RangeHeader::Satisfiable(range) => Ok(Selection::Partial(range)),
            RangeHeader::Unsatisfiable => Err(TransferError::RangeNotSatisfiable { file_size }),
            RangeHeader::Ignored => Ok(Selection::Full),
        }
    }

    fn content_type(&self, display_name: &str) -> &'static str {
        let ext = display_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "mp3" => "audio/mpeg",
            "flac" => "audio/flac",
            "wav" => "audio/wav",
            "ogg" | "opus" => "audio/ogg",
            "aac" => "audio/aac",
            "m4a" => "audio/mp4",
            "mp4" | "m4v" => "video/mp4",
            "webm" => "video/webm",
            "mkv" => "video/x-matroska",
            "mov" => "video/quicktime",
            "avi" => "video/x-msvideo",
            _ => "application/octet-stream",
        }
    }
}

static PLAIN: PlainStrategy = PlainStrategy;
static MEDIA: MediaStrategy = MediaStrategy;

#[must_use]
pub fn strategy_for(kind: FileKind) -> &'static dyn TransferStrategy {
    match kind {
        FileKind::Plain => &PLAIN,
        FileKind::Media => &MEDIA,
    }
}
