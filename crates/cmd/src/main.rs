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

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use panserve_app::AppConfig;
use panserve_base::readable_size::ReadableSize;
use panserve_transfer::ChunkPlan;
use snafu::{ResultExt, Whatever};

#[derive(Debug, Parser)]
#[clap(
name = "panserve",
about = "Serve files through download codes and chunked range transfers",
author = env!("CARGO_PKG_AUTHORS"),
version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Server(ServerArgs),
    Plan(PlanArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Starts the panserve download server.
Examples:

panserve server
panserve server --config panserve.toml
panserve server --bind 0.0.0.0:7090 --root /srv/pan --chunk-size 4MiB

")]
struct ServerArgs {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config:     Option<PathBuf>,
    /// Address for the REST server
    #[arg(long)]
    bind:       Option<String>,
    /// Storage root holding one directory per user
    #[arg(long)]
    root:       Option<PathBuf>,
    /// Chunk size advertised to clients, e.g. 1MiB
    #[arg(long)]
    chunk_size: Option<ReadableSize>,
}

impl ServerArgs {
    fn config(&self) -> Result<AppConfig, Whatever> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.http_config.bind_address.clone_from(bind);
        }
        if let Some(root) = &self.root {
            config.transfer.storage_root.clone_from(root);
        }
        if let Some(chunk_size) = self.chunk_size {
            config.transfer.chunk_size = chunk_size;
        }
        Ok(config)
    }

    async fn run(&self) -> Result<(), Whatever> { self.config()?.open().run().await }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Prints the chunk ranges a client would request for a local file.
Examples:

panserve plan ./movie.mkv
panserve plan ./movie.mkv --chunk-size 4MiB

")]
struct PlanArgs {
    /// File to plan
    file:       PathBuf,
    /// Chunk size to split the file by
    #[arg(long, default_value = "1MiB")]
    chunk_size: ReadableSize,
}

impl PlanArgs {
    fn run(&self) -> Result<(), Whatever> {
        let metadata = std::fs::metadata(&self.file)
            .with_whatever_context(|_| format!("Failed to stat {}", self.file.display()))?;
        let plan = ChunkPlan::new(metadata.len(), self.chunk_size.as_bytes())
            .whatever_context("Invalid chunk size")?;

        println!(
            "{}: {} bytes, {} chunks of {}",
            self.file.display(),
            plan.file_size(),
            plan.total_chunks(),
            self.chunk_size
        );
        for (index, range) in plan.ranges().enumerate() {
            println!("{index:>6}  {range}  ({} bytes)", range.length());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    match cli.commands {
        Commands::Server(args) => args.run().await,
        Commands::Plan(args) => args.run(),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() { Cli::command().debug_assert(); }

    #[test]
    fn test_server_flags_override_defaults() {
        let cli = Cli::parse_from([
            "panserve",
            "server",
            "--bind",
            "0.0.0.0:9000",
            "--root",
            "/srv/pan",
            "--chunk-size",
            "4MiB",
        ]);
        let Commands::Server(args) = cli.commands else {
            panic!("expected server subcommand");
        };
        let config = args.config().unwrap();
        assert_eq!(config.http_config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.transfer.storage_root, PathBuf::from("/srv/pan"));
        assert_eq!(config.transfer.chunk_size, ReadableSize::mb(4));
    }

    #[test]
    fn test_plan_defaults_to_one_mebibyte() {
        let cli = Cli::parse_from(["panserve", "plan", "movie.mkv"]);
        let Commands::Plan(args) = cli.commands else {
            panic!("expected plan subcommand");
        };
        assert_eq!(args.chunk_size, ReadableSize::mb(1));
    }
}
