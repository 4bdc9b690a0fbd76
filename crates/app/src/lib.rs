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

//! Wires configuration, logging, the transfer service and the REST server
//! into one process with a controllable lifecycle.

use std::{
    net::SocketAddr,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::Router;
use bon::Builder;
use panserve_common_telemetry::{
    logging::{LoggingOptions, init_global_logging},
    set_panic_hook,
};
use panserve_server::{
    download::download_routes,
    http::{RestServerConfig, health_routes, start_rest_server},
};
use panserve_transfer::{HomeDirCatalog, MemorySessionStore, TransferConfig, TransferService};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, Whatever};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const APP_NAME: &str = "panserve";

/// Represents the main application with lifecycle management
#[derive(SmartDefault)]
pub struct App {
    /// Application configuration
    pub config:             AppConfig,
    /// Controls if the application should continue running
    #[default(_code = "Arc::new(AtomicBool::new(false))")]
    pub running:            Arc<AtomicBool>,
    /// Cancellation token for graceful shutdown
    #[default(_code = "CancellationToken::new()")]
    pub cancellation_token: CancellationToken,
}

/// Configuration for the application, usually read from a TOML file with
/// `[http]`, `[transfer]` and `[logging]` tables.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// REST server configuration
    #[serde(rename = "http")]
    #[builder(default)]
    pub http_config:              RestServerConfig,
    /// Download codes, chunking and the storage root
    #[builder(default)]
    pub transfer:                 TransferConfig,
    #[builder(default)]
    pub logging:                  LoggingOptions,
    /// Whether to listen for Ctrl+C and SIGTERM
    #[default = true]
    #[builder(default = true)]
    pub enable_graceful_shutdown: bool,
}

impl AppConfig {
    /// Reads a TOML config file. Missing tables and keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Whatever> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_whatever_context(|_| {
            format!("Failed to read config file {}", path.display())
        })?;
        toml::from_str(&text).with_whatever_context(|_| {
            format!("Failed to parse config file {}", path.display())
        })
    }

    #[must_use]
    pub fn open(self) -> App {
        App {
            config: self,
            ..Default::default()
        }
    }
}

/// Handle for controlling a running application
pub struct AppHandle {
    /// Sender for triggering shutdown
    shutdown_tx:        Option<oneshot::Sender<()>>,
    /// Application running flag
    running:            Arc<AtomicBool>,
    /// Cancellation token
    cancellation_token: CancellationToken,
    /// Address the REST server bound
    local_addr:         SocketAddr,
    /// Task that waits for a shutdown trigger and stops the servers
    lifecycle:          Option<JoinHandle<()>>,
}

impl AppHandle {
    /// Gracefully shutdown the application
    pub fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        self.running.store(false, Ordering::SeqCst);
        self.cancellation_token.cancel();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Check if the application is still running
    #[must_use]
    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Wait until the servers have stopped.
    pub async fn wait_for_shutdown(&mut self) {
        if let Some(lifecycle) = self.lifecycle.take() {
            if let Err(err) = lifecycle.await {
                error!(%err, "lifecycle task failed");
            }
        }
    }
}

impl App {
    /// Build the transfer service, start the REST server and return a handle
    /// for controlling it. Logging is left to the caller.
    pub async fn start(&self) -> Result<AppHandle, Whatever> {
        let transfer = &self.config.transfer;
        info!(
            storage_root = %transfer.storage_root.display(),
            chunk_size = %transfer.chunk_size,
            code_ttl = ?transfer.code_ttl,
            "Starting {APP_NAME}"
        );

        tokio::fs::create_dir_all(&transfer.storage_root)
            .await
            .with_whatever_context(|_| {
                format!(
                    "Failed to create storage root {}",
                    transfer.storage_root.display()
                )
            })?;

        let store = MemorySessionStore::from_config(transfer)
            .whatever_context("Invalid download code settings")?;
        let catalog = HomeDirCatalog::new(transfer.storage_root.clone());
        let service = TransferService::new(transfer.clone(), Arc::new(store), Arc::new(catalog));

        let download = download_routes(service);
        let routes = move |router: Router| download(health_routes(router));
        let mut http_handle = start_rest_server(self.config.http_config.clone(), vec![routes])
            .await
            .whatever_context("Failed to start REST server")?;
        http_handle
            .wait_for_start()
            .await
            .whatever_context("REST server did not start")?;
        let local_addr = http_handle.local_addr();

        self.running.store(true, Ordering::SeqCst);
        info!("Application started on {local_addr}");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let running = Arc::clone(&self.running);
        let cancellation_token = self.cancellation_token.clone();
        let enable_graceful_shutdown = self.config.enable_graceful_shutdown;

        let lifecycle = tokio::spawn(async move {
            if enable_graceful_shutdown {
                shutdown_signal(shutdown_rx).await;
            } else {
                // Only an explicit shutdown stops the app
                let _ = shutdown_rx.await;
            }

            running.store(false, Ordering::SeqCst);
            cancellation_token.cancel();

            info!("Shutting down servers");
            http_handle.shutdown();
            if let Err(err) = http_handle.wait_for_stop().await {
                error!(%err, "REST server did not stop cleanly");
            }

            info!("Application shutdown complete");
        });

        Ok(AppHandle {
            shutdown_tx: Some(shutdown_tx),
            running: Arc::clone(&self.running),
            cancellation_token: self.cancellation_token.clone(),
            local_addr,
            lifecycle: Some(lifecycle),
        })
    }

    /// Install logging and the panic hook, then run until shut down.
    pub async fn run(self) -> Result<(), Whatever> {
        let _guards = init_global_logging(APP_NAME, &self.config.logging);
        set_panic_hook();

        let mut handle = self.start().await?;
        handle.wait_for_shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal(shutdown_rx: oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C signal"); },
        () = terminate => { info!("Received terminate signal"); },
        _ = shutdown_rx => { info!("Received shutdown signal"); },
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use panserve_common_telemetry::logging::init_default_ut_logging;
    use tempfile::TempDir;

    use super::*;

    fn test_config(root: &TempDir) -> AppConfig {
        AppConfig::builder()
            .http_config(
                RestServerConfig::builder()
                    .bind_address("127.0.0.1:0")
                    .build(),
            )
            .transfer(
                TransferConfig::builder()
                    .storage_root(root.path().join("files"))
                    .build(),
            )
            .enable_graceful_shutdown(false)
            .build()
    }

    #[test]
    fn test_app_creation() {
        let app = AppConfig::default().open();
        assert!(!app.running.load(Ordering::SeqCst));
        assert!(app.config.enable_graceful_shutdown);
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[http]
bind_address = "0.0.0.0:8080"

[transfer]
storage_root = "/srv/pan"
chunk_size = "4MiB"
code_ttl = "2h"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.http_config.bind_address, "0.0.0.0:8080");
        assert!(config.http_config.enable_cors);
        assert_eq!(config.transfer.storage_root, Path::new("/srv/pan"));
        assert_eq!(config.transfer.chunk_size.as_bytes(), 4 * 1024 * 1024);
        assert_eq!(config.transfer.code_ttl, Duration::from_secs(7200));
        assert_eq!(config.transfer.max_chunk_count, 10_000);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert!(config.enable_graceful_shutdown);
    }

    #[test]
    fn test_load_missing_file() {
        let root = TempDir::new().unwrap();
        assert!(AppConfig::load(root.path().join("absent.toml")).is_err());
    }

    #[tokio::test]
    async fn test_app_serves_and_shuts_down() {
        init_default_ut_logging();
        let root = TempDir::new().unwrap();
        let app = test_config(&root).open();

        let mut handle = app.start().await.unwrap();
        assert!(handle.is_running());
        assert!(root.path().join("files").is_dir());

        let user_dir = root.path().join("files/u1");
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(user_dir.join("hello.txt"), b"hello panserve").unwrap();

        let base = format!("http://{}", handle.local_addr());
        let client = reqwest::Client::new();
        let response = client
            .get(format!("{base}/api/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let url = reqwest::Url::parse_with_params(
            &format!("{base}/api/download/createDownloadUrl"),
            &[("fileId", "hello.txt"), ("userId", "u1")],
        )
        .unwrap();
        let created: serde_json::Value = client.post(url).send().await.unwrap().json().await.unwrap();
        let code = created["code"].as_str().unwrap();

        let body = client
            .get(format!("{base}/api/download/download/{code}"))
            .send()
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(body.as_ref(), b"hello panserve");

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle.wait_for_shutdown())
            .await
            .unwrap();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_start_fails_on_bad_address() {
        let root = TempDir::new().unwrap();
        let mut config = test_config(&root);
        config.http_config.bind_address = "nowhere".to_string();
        assert!(config.open().start().await.is_err());
    }
}
