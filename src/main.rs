// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stylecam::AppResult;

mod cli;

#[derive(Parser)]
#[command(name = "stylecam")]
#[command(about = "Face and hair style filters for camera frames")]
#[command(version = stylecam::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available filters
    Filters {
        /// Filter directory (default: built-in filters)
        #[arg(short, long)]
        assets: Option<PathBuf>,
    },

    /// Run one image through the pipeline and save the result
    Render {
        /// Input image (PNG or JPEG)
        #[arg(short, long)]
        input: PathBuf,

        /// Filter id (from 'stylecam filters')
        #[arg(short, long)]
        filter: Option<String>,

        /// Output file path (default: ~/Pictures/Stylecam/look_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Raw frame layout the image is encoded as (nv21, nv12, yuv420, i420)
        #[arg(long, default_value = "nv21")]
        format: String,

        /// Filter directory (default: built-in filters)
        #[arg(short, long)]
        assets: Option<PathBuf>,
    },

    /// Stream an image through the pipeline as a synthetic camera
    Stream {
        /// Input image (PNG or JPEG)
        #[arg(short, long)]
        input: PathBuf,

        /// Filter id (from 'stylecam filters')
        #[arg(short, long)]
        filter: Option<String>,

        /// Frames per second
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Streaming duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Frame size preset (sd, hd, fullhd)
        #[arg(short, long, default_value = "hd")]
        resolution: String,

        /// Filter directory (default: built-in filters)
        #[arg(short, long)]
        assets: Option<PathBuf>,
    },

    /// Show the configuration, optionally writing the defaults
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

fn main() -> AppResult<()> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=stylecam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Filters { assets } => cli::list_filters(assets),
        Commands::Render {
            input,
            filter,
            output,
            format,
            assets,
        } => cli::render(cli::RenderArgs {
            input,
            filter,
            output,
            format,
            assets,
        }),
        Commands::Stream {
            input,
            filter,
            fps,
            duration,
            resolution,
            assets,
        } => cli::stream(cli::StreamArgs {
            input,
            filter,
            fps,
            duration,
            resolution,
            assets,
        }),
        Commands::Config { init } => cli::show_config(init),
    }
}
