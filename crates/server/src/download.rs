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

//! HTTP routes for download codes, chunk metadata and file bytes.

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, header},
    response::Response,
    routing::{get, post},
};
use panserve_transfer::{ChunkInfo, ChunkRequest, PreparedTransfer, TransferService};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use tokio_util::io::ReaderStream;

use crate::error::{ApiResult, InvalidArgumentSnafu};

/// In-memory pipe between the range engine and the response body.
const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDownloadParams {
    pub file_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedCode {
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkParams {
    pub chunk_index:  i64,
    pub chunk_size:   Option<u64>,
    pub total_chunks: Option<i64>,
}

/// Mount the download routes, sharing `service` across handlers.
pub fn download_routes(
    service: TransferService,
) -> impl Fn(Router) -> Router + Send + Sync + 'static {
    move |router: Router| {
        let routes = Router::new()
            .route("/api/download/createDownloadUrl", post(create_download_url))
            .route("/api/download/getChunkInfo/{code}", get(get_chunk_info))
            .route("/api/download/downloadChunk/{code}", get(download_chunk))
            .route("/api/download/download/{code}", get(download))
            .with_state(service.clone());
        router.merge(routes)
    }
}

async fn create_download_url(
    State(service): State<TransferService>,
    params: Result<Query<CreateDownloadParams>, QueryRejection>,
) -> ApiResult<Json<CreatedCode>> {
    let Query(params) = params?;
    ensure!(
        !params.file_id.is_empty() && !params.user_id.is_empty(),
        InvalidArgumentSnafu {
            reason: "fileId and userId are required",
        }
    );
    let code = service
        .create_download_code(&params.file_id, &params.user_id)
        .await?;
    Ok(Json(CreatedCode { code }))
}

async fn get_chunk_info(
    State(service): State<TransferService>,
    Path(code): Path<String>,
) -> ApiResult<Json<ChunkInfo>> {
    Ok(Json(service.chunk_info(&code).await?))
}

async fn download_chunk(
    State(service): State<TransferService>,
    Path(code): Path<String>,
    params: Result<Query<ChunkParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let request = ChunkRequest::builder()
        .code(code)
        .chunk_index(params.chunk_index)
        .maybe_chunk_size(params.chunk_size)
        .maybe_total_chunks(params.total_chunks)
        .build();
    let prepared = service.prepare_chunk(request).await?;
    Ok(streaming_response(prepared))
}

async fn download(
    State(service): State<TransferService>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let header_str =
        |name: header::HeaderName| headers.get(name).and_then(|value| value.to_str().ok());
    let prepared = service
        .prepare_download(
            &code,
            header_str(header::USER_AGENT),
            header_str(header::RANGE),
        )
        .await?;
    Ok(streaming_response(prepared))
}

/// Commit the prepared head and stream the body from a background task.
///
/// The task writes into one end of a duplex pipe while the response body
/// reads the other. When the client goes away the body is dropped, the next
/// write fails and the copy stops.
fn streaming_response(prepared: PreparedTransfer) -> Response {
    let (head, body) = prepared.into_parts();
    let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    tokio::spawn(async move {
        // Failures are logged by `send`; the short body tells the client.
        let _ = body.send(&mut writer).await;
    });

    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}
