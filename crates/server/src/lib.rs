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

pub mod download;
pub mod error;
pub mod http;

use futures::future::join_all;
use snafu::Snafu;
use tokio::{sync::oneshot::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(transparent)]
    Network { source: NetworkError },
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum NetworkError {
    #[snafu(display("Failed to bind {addr}"))]
    Bind {
        addr:   String,
        #[snafu(source)]
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse address {addr}"))]
    ParseAddress {
        addr:   String,
        #[snafu(source)]
        source: std::net::AddrParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Handle for a running HTTP service.
///
/// The listener is already bound when the handle is returned; the handle
/// lets callers wait for the accept loop to start, trigger graceful
/// shutdown through a cancellation token, and wait for the task to finish.
pub struct ServiceHandler {
    /// Join handle for the server task
    join_handle:        JoinHandle<()>,
    /// Token for signalling shutdown
    cancellation_token: CancellationToken,
    /// Receiver for server start notification
    started_rx:         Option<Receiver<()>>,
    /// Address the listener actually bound, useful with port 0
    local_addr:         std::net::SocketAddr,
}

impl ServiceHandler {
    /// Waits until the server is accepting connections.
    ///
    /// # Panics
    /// Panics if called more than once, as the start signal is consumed.
    pub async fn wait_for_start(&mut self) -> Result<()> {
        self.started_rx
            .take()
            .expect("Server start signal already consumed")
            .await
            .expect("Failed to receive server start signal");
        Ok(())
    }

    /// Waits for the server task to finish. Call after `shutdown()`.
    pub async fn wait_for_stop(self) -> Result<()> {
        join_all(std::iter::once(self.join_handle)).await;
        Ok(())
    }

    /// Signals graceful shutdown without waiting for it.
    pub fn shutdown(&self) { self.cancellation_token.cancel(); }

    /// Whether the server task has completed, by shutdown or by error.
    pub fn is_finished(&self) -> bool { self.join_handle.is_finished() }

    pub const fn local_addr(&self) -> std::net::SocketAddr { self.local_addr }
}
