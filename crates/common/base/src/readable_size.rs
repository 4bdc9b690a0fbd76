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

//! Byte sizes that read well in config files.
//!
//! `ReadableSize` accepts `"8KiB"`, `"1MB"`, `"512k"` or a bare number of
//! bytes. All units are binary: `1KB == 1KiB == 1024` bytes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use snafu::{OptionExt, ResultExt, Snafu};

const UNIT: u64 = 1;
const KIB: u64 = UNIT * 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParseSizeError {
    #[snafu(display("Empty size string"))]
    Empty,

    #[snafu(display("Invalid size number in {input:?}"))]
    InvalidNumber {
        input:  String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("Unknown size unit {unit:?}"))]
    UnknownUnit { unit: String },

    #[snafu(display("Size {input:?} overflows u64"))]
    Overflow { input: String },
}

/// A size in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadableSize(pub u64);

impl ReadableSize {
    #[must_use]
    pub const fn b(count: u64) -> Self { Self(count) }

    #[must_use]
    pub const fn kb(count: u64) -> Self { Self(count * KIB) }

    #[must_use]
    pub const fn mb(count: u64) -> Self { Self(count * MIB) }

    #[must_use]
    pub const fn gb(count: u64) -> Self { Self(count * GIB) }

    #[must_use]
    pub const fn as_bytes(self) -> u64 { self.0 }

    /// Saturates on 32-bit targets.
    #[must_use]
    pub fn as_bytes_usize(self) -> usize { usize::try_from(self.0).unwrap_or(usize::MAX) }
}

impl From<u64> for ReadableSize {
    fn from(bytes: u64) -> Self { Self(bytes) }
}

impl fmt::Display for ReadableSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes == 0 {
            return write!(f, "0B");
        }
        for (unit, suffix) in [(TIB, "TiB"), (GIB, "GiB"), (MIB, "MiB"), (KIB, "KiB")] {
            if bytes % unit == 0 {
                return write!(f, "{}{suffix}", bytes / unit);
            }
        }
        write!(f, "{bytes}B")
    }
}

impl FromStr for ReadableSize {
    type Err = ParseSizeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        snafu::ensure!(!trimmed.is_empty(), EmptySnafu);

        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        let number: u64 = number.parse().context(InvalidNumberSnafu { input })?;

        let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => UNIT,
            "k" | "kb" | "kib" => KIB,
            "m" | "mb" | "mib" => MIB,
            "g" | "gb" | "gib" => GIB,
            "t" | "tb" | "tib" => TIB,
            other => {
                return UnknownUnitSnafu {
                    unit: other.to_string(),
                }
                .fail();
            }
        };

        number
            .checked_mul(multiplier)
            .map(Self)
            .context(OverflowSnafu { input })
    }
}

impl Serialize for ReadableSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReadableSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizeVisitor;

        impl de::Visitor<'_> for SizeVisitor {
            type Value = ReadableSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size string such as \"8KiB\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ReadableSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(ReadableSize)
                    .map_err(|_| E::custom("size must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}
