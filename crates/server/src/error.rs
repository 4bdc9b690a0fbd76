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

use std::any::Any;

use axum::{
    Json,
    extract::rejection::QueryRejection,
    http::{HeaderValue, header::CONTENT_RANGE},
    response::IntoResponse,
};
use panserve_error::{ErrorExt, StackError, StatusCode};
use panserve_transfer::TransferError;
use serde::Serialize;
use snafu::Snafu;
use strum::EnumProperty;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code:    StatusCode,
    pub message: String,
}

#[derive(Debug, Snafu, strum_macros::EnumProperty)]
#[snafu(visibility(pub))]
pub enum ApiError {
    #[snafu(display("Invalid argument: {reason}"))]
    #[strum(props(status_code = "invalid_argument"))]
    InvalidArgument { reason: String },

    #[snafu(display("Not found: {resource}"))]
    #[strum(props(status_code = "not_found"))]
    NotFound { resource: String },

    #[snafu(transparent)]
    Transfer { source: TransferError },
}

impl ErrorExt for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Transfer { source } => source.status_code(),
            _ => self
                .get_str("status_code")
                .and_then(|value| value.parse().ok())
                .unwrap_or(StatusCode::Unknown),
        }
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}

impl StackError for ApiError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
        if let Some(next) = self.next() {
            next.debug_fmt(layer + 1, buf);
        }
    }

    fn next(&self) -> Option<&dyn StackError> {
        match self {
            Self::Transfer { source } => Some(source),
            _ => None,
        }
    }

    fn transparent(&self) -> bool { matches!(self, Self::Transfer { .. }) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_client_error() {
            tracing::debug!(error = %self, "request rejected");
        } else {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorBody {
            code:    status,
            message: self.output_msg(),
        });
        let mut response = (status.http_status(), body).into_response();

        // RFC 9110: a 416 names the current length so the client can retry.
        let unsatisfied = match &self {
            Self::Transfer { source } => source.unsatisfied_size(),
            _ => None,
        };
        if let Some(file_size) = unsatisfied {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{file_size}")) {
                response.headers_mut().insert(CONTENT_RANGE, value);
            }
        }
        response
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidArgument {
            reason: rejection.body_text(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
