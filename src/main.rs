mod cli;

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use dotenv::dotenv;
use tracing::{error, info, warn};

use cli::commands::{Cli, Commands};
use cli::progress::CliReporter;
use hevc_sweep::command::{check_dependency, validate_dependencies, DependencyStatus};
use hevc_sweep::config::{load_file_config, FileConfig, Overrides, LOG_FILE_ENV_VAR};
use hevc_sweep::dupes::report;
use hevc_sweep::{AppConfig, CancelFlag, ConvertEngine, DuplicateEngine, PassSummary};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Cli::parse();
    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return Ok(());
    };

    let (file_config, load_error) = match load_file_config(&args.config) {
        Ok(file_config) => (file_config.unwrap_or_default(), None),
        Err(err) => (FileConfig::default(), Some(err)),
    };

    let mut overrides = Overrides {
        log_file: args
            .log_file
            .clone()
            .or_else(|| env::var_os(LOG_FILE_ENV_VAR).map(PathBuf::from)),
        ..Overrides::default()
    };
    match &command {
        Commands::Convert {
            directory,
            dry_run,
            run_loop,
            remove_original_files,
        } => {
            overrides.directory = directory.clone();
            overrides.dry_run = *dry_run;
            overrides.run_loop = *run_loop;
            overrides.remove_original_files = *remove_original_files;
        }
        Commands::Duplicates {
            directory,
            max_distance,
            ..
        } => {
            overrides.directory = directory.clone();
            overrides.max_distance = *max_distance;
        }
        Commands::CheckDependencies | Commands::PrintConfig => {}
    }

    let (config, issues) = AppConfig::resolve(file_config, &overrides);
    let _guard = cli::logging::init_logger(config.log_file.as_deref());

    if let Some(err) = load_error {
        error!(
            "Error loading configuration from {}: {}; using defaults",
            args.config.display(),
            err
        );
    }

    let needs_directory = matches!(command, Commands::Convert { .. } | Commands::Duplicates { .. });
    if needs_directory && !issues.is_empty() {
        for issue in &issues {
            error!("Configuration error: {}", issue);
        }
        process::exit(1);
    }
    for issue in &issues {
        warn!("Configuration: {}", issue);
    }

    match command {
        Commands::Convert { .. } => run_convert(config),
        Commands::Duplicates {
            csv,
            json,
            thumbnails,
            comparison,
            ..
        } => run_duplicates(&config, csv, json, thumbnails, comparison),
        Commands::CheckDependencies => {
            run_check_dependencies(&config);
            Ok(())
        }
        Commands::PrintConfig => {
            let text = toml::to_string_pretty(&config).context("serialising configuration")?;
            println!("{}", text);
            Ok(())
        }
    }
}

fn install_cancel_handler() -> anyhow::Result<CancelFlag> {
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_flag.is_cancelled() {
            // second Ctrl+C
            process::exit(130);
        }
        eprintln!(
            "\n{}",
            "Received Ctrl+C, finishing up. Press again to quit immediately."
                .yellow()
                .bold()
        );
        handler_flag.cancel();
    })
    .context("installing Ctrl+C handler")?;
    Ok(cancel)
}

fn require_dependencies(tools: &[(&str, &Path)]) {
    if !validate_dependencies(tools) {
        process::exit(1);
    }
}

fn run_convert(config: AppConfig) -> anyhow::Result<()> {
    let deps = config.dependencies.clone();
    if config.dry_run {
        require_dependencies(&[("ffprobe", deps.ffprobe.as_path())]);
    } else {
        require_dependencies(&[
            ("HandBrakeCLI", deps.handbrake.as_path()),
            ("ffprobe", deps.ffprobe.as_path()),
        ]);
    }

    let cancel = install_cancel_handler()?;
    let reporter = CliReporter::new();
    let engine = ConvertEngine::new(config);
    engine
        .run(&reporter, &cancel, print_pass_summary)
        .context("conversion failed")?;
    Ok(())
}

fn print_pass_summary(summary: &PassSummary) {
    println!();
    info!(
        "{} candidates, {} converted, {} failed",
        format!("{}", summary.total).cyan(),
        format!("{}", summary.succeeded).green(),
        format!("{}", summary.failed).red(),
    );
    let saved_mb = summary.space_saved as f64 / (1024.0 * 1024.0);
    info!("Space saved: {}", format!("{:.2} MB", saved_mb).green());
    if summary.cancelled {
        warn!("Pass was cancelled before all files were processed");
    }
}

fn run_duplicates(
    config: &AppConfig,
    csv: Option<PathBuf>,
    json: Option<PathBuf>,
    thumbnails: Option<PathBuf>,
    comparison: bool,
) -> anyhow::Result<()> {
    let deps = &config.dependencies;
    require_dependencies(&[
        ("ffmpeg", deps.ffmpeg.as_path()),
        ("ffprobe", deps.ffprobe.as_path()),
    ]);

    let directory = config
        .directory
        .as_deref()
        .context("no directory configured")?;

    let mut engine = DuplicateEngine::new(config).with_comparison(comparison);
    match thumbnails {
        Some(dir) => engine = engine.with_thumbnail_dir(dir),
        None if comparison => {
            warn!("Comparison images are removed on exit; pass --thumbnails DIR to keep them")
        }
        None => {}
    }

    let cancel = install_cancel_handler()?;
    let reporter = CliReporter::new();
    let result = engine
        .find_duplicates(directory, &reporter, &cancel)
        .with_context(|| format!("searching {} for duplicates", directory.display()))?;

    println!();
    if result.groups.is_empty() {
        info!(
            "No duplicates among {} videos",
            format!("{}", result.fingerprinted).cyan()
        );
    } else {
        print!("{}", report::format_text(&result.groups));
        info!(
            "{} duplicate groups among {} videos",
            format!("{}", result.groups.len()).red(),
            format!("{}", result.fingerprinted).cyan(),
        );
    }

    if let Some(path) = csv {
        report::write_csv_file(&result.groups, &path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
    }
    if let Some(path) = json {
        report::write_json_file(&result.groups, &path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}

fn run_check_dependencies(config: &AppConfig) {
    let deps = &config.dependencies;
    let tools = [
        ("HandBrakeCLI", &deps.handbrake),
        ("ffprobe", &deps.ffprobe),
        ("ffmpeg", &deps.ffmpeg),
    ];
    let mut all_ok = true;
    for (name, path) in tools {
        let status = check_dependency(path);
        let label = match status {
            DependencyStatus::Available => "ok".green(),
            DependencyStatus::NotFound => "not found".red(),
            DependencyStatus::Invalid => "not working".red(),
            DependencyStatus::TimedOut => "timed out".yellow(),
        };
        println!("{:<14} {:<40} {}", name, path.display(), label);
        all_ok &= status == DependencyStatus::Available;
    }
    if !all_ok {
        process::exit(1);
    }
}
