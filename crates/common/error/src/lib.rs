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

use std::{any::Any, error::Error as StdError, sync::Arc};

use http::StatusCode as HttpStatusCode;
use serde::Serialize;
use strum::EnumProperty;

/// Wire-level classification shared by every panserve error.
///
/// The HTTP status travels as a strum property so a new variant only needs
/// one line to be mapped.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    strum_macros::EnumProperty,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusCode {
    #[strum(props(http_status = "400"))]
    InvalidArgument,
    #[strum(props(http_status = "403"))]
    Forbidden,
    #[strum(props(http_status = "404"))]
    NotFound,
    #[strum(props(http_status = "416"))]
    RangeNotSatisfiable,
    #[strum(props(http_status = "500"))]
    Internal,
    #[strum(props(http_status = "500"))]
    Unknown,
}

impl StatusCode {
    pub fn http_status(self) -> HttpStatusCode {
        self.get_str("http_status")
            .and_then(|value| value.parse::<u16>().ok())
            .and_then(|value| HttpStatusCode::from_u16(value).ok())
            .unwrap_or(HttpStatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Caller mistakes: reported immediately, retrying the same request
    /// cannot succeed.
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        matches!(
            self,
            Self::InvalidArgument | Self::Forbidden | Self::NotFound | Self::RangeNotSatisfiable
        )
    }
}

pub trait StackError: StdError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>);

    fn next(&self) -> Option<&dyn StackError>;

    fn last(&self) -> &dyn StackError
    where
        Self: Sized,
    {
        let Some(mut result) = self.next() else {
            return self;
        };
        while let Some(err) = result.next() {
            result = err;
        }
        result
    }

    fn transparent(&self) -> bool { false }
}

pub trait ErrorExt: StackError {
    fn status_code(&self) -> StatusCode { StatusCode::Unknown }

    fn as_any(&self) -> &dyn Any;

    /// Message safe to hand to a remote client. Internal errors are reduced
    /// to their status so file-system paths never leak.
    fn output_msg(&self) -> String
    where
        Self: Sized,
    {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal => {
                format!("Internal error: {}", self.status_code())
            }
            _ => {
                let error = self.last();
                if let Some(external_error) = error.source() {
                    let mut root = external_error;
                    while let Some(source) = root.source() {
                        root = source;
                    }
                    if error.transparent() {
                        format!("{root}")
                    } else {
                        format!("{error}: {root}")
                    }
                } else {
                    format!("{error}")
                }
            }
        }
    }

    fn root_cause(&self) -> Option<&dyn StdError>
    where
        Self: Sized,
    {
        let error = self.last();
        let mut source = error.source()?;
        while let Some(next) = source.source() {
            source = next;
        }
        Some(source)
    }
}

impl<T: ?Sized + StackError> StackError for Arc<T> {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) { self.as_ref().debug_fmt(layer, buf) }

    fn next(&self) -> Option<&dyn StackError> { self.as_ref().next() }
}

impl<T: StackError> StackError for Box<T> {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) { self.as_ref().debug_fmt(layer, buf) }

    fn next(&self) -> Option<&dyn StackError> { self.as_ref().next() }
}

#[cfg(test)]
mod tests {
    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    enum Leaf {
        #[snafu(display("Chunk {index} rejected"))]
        Rejected { index: u64 },

        #[snafu(display("Disk read failed"))]
        Disk { source: std::io::Error },
    }

    impl StackError for Leaf {
        fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
            buf.push(format!("{layer}: {self}"));
        }

        fn next(&self) -> Option<&dyn StackError> { None }
    }

    impl ErrorExt for Leaf {
        fn status_code(&self) -> StatusCode {
            match self {
                Self::Rejected { .. } => StatusCode::RangeNotSatisfiable,
                Self::Disk { .. } => StatusCode::Internal,
            }
        }

        fn as_any(&self) -> &dyn Any { self as _ }
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(StatusCode::InvalidArgument.http_status(), HttpStatusCode::BAD_REQUEST);
        assert_eq!(StatusCode::Forbidden.http_status(), HttpStatusCode::FORBIDDEN);
        assert_eq!(StatusCode::NotFound.http_status(), HttpStatusCode::NOT_FOUND);
        assert_eq!(
            StatusCode::RangeNotSatisfiable.http_status(),
            HttpStatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            StatusCode::Internal.http_status(),
            HttpStatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_status_code_round_trips_through_strings() {
        let parsed: StatusCode = "range_not_satisfiable".parse().unwrap();
        assert_eq!(parsed, StatusCode::RangeNotSatisfiable);
        assert_eq!(
            serde_json::to_string(&StatusCode::NotFound).unwrap(),
            "\"not_found\""
        );
        assert!(StatusCode::NotFound.is_client_error());
        assert!(!StatusCode::Internal.is_client_error());
    }

    #[test]
    fn test_output_msg_hides_internal_details() {
        let disk = Leaf::Disk {
            source: std::io::Error::other("/srv/secret/path"),
        };
        assert_eq!(disk.output_msg(), "Internal error: internal");

        let rejected = Leaf::Rejected { index: 7 };
        assert_eq!(rejected.output_msg(), "Chunk 7 rejected");
    }
}
