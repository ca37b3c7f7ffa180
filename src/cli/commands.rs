use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hevc-sweep")]
#[command(about = "Batch-convert a video library to HEVC and find duplicate videos", long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, default_value = hevc_sweep::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log file, overriding the environment and the config file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert every eligible video under a directory to HEVC
    Convert {
        /// Directory to scan (overrides the config file)
        directory: Option<PathBuf>,

        /// List what would be converted without encoding anything
        #[arg(long)]
        dry_run: bool,

        /// Keep scanning and converting until interrupted
        #[arg(long = "loop")]
        run_loop: bool,

        /// Delete originals after a verified conversion instead of keeping them as .orig
        #[arg(long)]
        remove_original_files: bool,
    },
    /// Find visually similar videos
    Duplicates {
        /// Directory to search (overrides the config file)
        directory: Option<PathBuf>,

        /// Largest hash distance still treated as a duplicate
        #[arg(long)]
        max_distance: Option<u32>,

        /// Write the groups as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the groups as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Keep extracted frames in this directory
        #[arg(long)]
        thumbnails: Option<PathBuf>,

        /// Render a side-by-side image for each group
        #[arg(long)]
        comparison: bool,
    },
    /// Check that HandBrakeCLI, ffprobe and ffmpeg can be run
    CheckDependencies,
    /// Print the effective configuration
    PrintConfig,
}
