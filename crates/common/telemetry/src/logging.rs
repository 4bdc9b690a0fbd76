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

use std::{
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once},
};

use bon::Builder;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Layer, Registry, filter, layer::SubscriberExt};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// # Errors
/// Returns an error if the non-empty string does not parse into `T`.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// Directory used for log files when file logging is switched on without an
/// explicit path.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Fallback filter when neither `LoggingOptions::level` nor `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for hourly rotated log files. Empty means stdout only.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Filter string such as `"info,panserve_transfer=debug"`. Falls back to
    /// `RUST_LOG`, then to `info`.
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Rotated files kept per appender (720 hourly files is 30 days).
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,
}

impl LoggingOptions {
    /// Resolves the effective filter: explicit level, then `RUST_LOG`, then
    /// the built-in default.
    ///
    /// # Panics
    /// Panics when the filter string does not parse; a broken log config
    /// should stop the process before it serves traffic.
    #[must_use]
    pub fn targets(&self) -> filter::Targets {
        self.level
            .clone()
            .or_else(|| env::var(EnvFilter::DEFAULT_ENV).ok())
            .as_deref()
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string")
    }
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with span context.
    Json,

    /// Human-readable lines.
    #[default]
    Text,
}

/// Initialize logging for unit tests. Safe to call from every test.
///
/// `UNITTEST_LOG_DIR` (default `/tmp/__unittest_logs`) and
/// `UNITTEST_LOG_LEVEL` override the destination and filter.
///
/// # Panics
/// Panics if the guard mutex is poisoned.
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let mut g = GLOBAL_UT_LOG_GUARD.as_ref().lock().unwrap();

        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());

        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| {
            "debug,hyper=warn,tower=warn,reqwest=warn,h2=info,axum=info".to_string()
        });
        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            ..Default::default()
        };
        *g = Some(init_global_logging("unittest", &opts));

        tracing::info!("logs dir = {}", dir);
    });
}

static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(writer: W, format: LogFormat, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}

fn rolling_appender(dir: &str, prefix: &str, max_log_files: usize) -> RollingFileAppender {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(max_log_files)
        .build(dir)
        .unwrap_or_else(|e| panic!("initializing rolling file appender at {dir} failed: {e}"))
}

/// Install the global subscriber: optional stdout layer, hourly rotated
/// `{app_name}` and `{app_name}-err` files when `dir` is set, and a bridge
/// for crates that still log through `log`.
///
/// Only the first call has an effect.
///
/// # Panics
/// Panics when the log directory cannot be created, the level string does
/// not parse, or another global subscriber is already installed.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let mut layers: Vec<BoxedLayer> = Vec::new();

        if opts.append_stdout {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            layers.push(fmt_layer(
                writer,
                opts.log_format,
                std::io::stdout().is_terminal(),
            ));
        }

        if !opts.dir.is_empty() {
            let (writer, guard) = tracing_appender::non_blocking(rolling_appender(
                &opts.dir,
                app_name,
                opts.max_log_files,
            ));
            guards.push(guard);
            layers.push(fmt_layer(writer, opts.log_format, false));

            let (writer, guard) = tracing_appender::non_blocking(rolling_appender(
                &opts.dir,
                &format!("{app_name}-err"),
                opts.max_log_files,
            ));
            guards.push(guard);
            layers.push(
                fmt_layer(writer, opts.log_format, false)
                    .with_filter(filter::LevelFilter::ERROR)
                    .boxed(),
            );
        }

        let subscriber = Registry::default()
            .with(layers)
            .with(opts.targets());

        tracing::subscriber::set_global_default(subscriber)
            .expect("error setting global tracing subscriber");
    });

    guards
}
