use config::{Config, File as ConfigFile, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::command::find_dependency_path;
use crate::error::Error;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const LOG_FILE_ENV_VAR: &str = "VIDEO_CONVERTER_LOG_FILE";

pub const DEFAULT_MIN_FILE_SIZE_BYTES: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_QUALITY: i64 = 24;
pub const DEFAULT_MAX_DISTANCE: u32 = 5;
pub const DEFAULT_LOOP_INTERVAL_SECS: u64 = 3600;

pub const SUPPORTED_FORMATS: [&str; 2] = ["mkv", "mp4"];
pub const SUPPORTED_ENCODERS: [&str; 3] = ["x265", "x265_10bit", "nvenc_hevc"];
pub const X265_PRESETS: [&str; 9] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];
pub const NVENC_PRESETS: [&str; 4] = ["default", "fast", "medium", "slow"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mkv,
    Mp4,
}

impl ContainerFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mkv" => Some(Self::Mkv),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mkv => "mkv",
            Self::Mp4 => "mp4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EncoderKind {
    #[serde(rename = "x265")]
    X265,
    #[serde(rename = "x265_10bit")]
    X265TenBit,
    #[serde(rename = "nvenc_hevc")]
    NvencHevc,
}

impl EncoderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "x265" => Some(Self::X265),
            "x265_10bit" => Some(Self::X265TenBit),
            "nvenc_hevc" => Some(Self::NvencHevc),
            _ => None,
        }
    }

    pub fn is_x265(&self) -> bool {
        matches!(self, Self::X265 | Self::X265TenBit)
    }
}

/// `min_file_size` may be written as a plain byte count or as `"1.5GB"`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SizeSetting {
    Bytes(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OutputSection {
    pub format: Option<String>,
    pub encoder: Option<String>,
    pub preset: Option<String>,
    pub quality: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DependencySection {
    pub handbrake: Option<String>,
    pub ffprobe: Option<String>,
    pub ffmpeg: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoggingSection {
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DuplicateSection {
    pub max_distance: Option<u32>,
}

/// The config file as the user wrote it. Every field is optional; an explicit
/// `null` is indistinguishable from an absent key and restores the default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    pub directory: Option<PathBuf>,
    pub min_file_size: Option<SizeSetting>,
    pub output: Option<OutputSection>,
    pub dependencies: Option<DependencySection>,
    pub logging: Option<LoggingSection>,
    pub remove_original_files: Option<bool>,
    #[serde(rename = "loop")]
    pub run_loop: Option<bool>,
    pub dry_run: Option<bool>,
    pub ignore_patterns: Option<Vec<String>>,
    pub target_codec: Option<String>,
    pub loop_interval_secs: Option<u64>,
    pub duplicates: Option<DuplicateSection>,
}

impl OutputSection {
    fn merge(default: Self, user: Self) -> Self {
        Self {
            format: user.format.or(default.format),
            encoder: user.encoder.or(default.encoder),
            preset: user.preset.or(default.preset),
            quality: user.quality.or(default.quality),
        }
    }
}

impl DependencySection {
    fn merge(default: Self, user: Self) -> Self {
        Self {
            handbrake: user.handbrake.or(default.handbrake),
            ffprobe: user.ffprobe.or(default.ffprobe),
            ffmpeg: user.ffmpeg.or(default.ffmpeg),
        }
    }
}

fn merge_section<T>(default: Option<T>, user: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (default, user) {
        (Some(default), Some(user)) => Some(merge(default, user)),
        (default, None) => default,
        (None, user) => user,
    }
}

impl FileConfig {
    pub fn defaults() -> Self {
        Self {
            directory: None,
            min_file_size: Some(SizeSetting::Text("1GB".to_string())),
            output: Some(OutputSection {
                format: Some("mkv".to_string()),
                encoder: Some("x265_10bit".to_string()),
                preset: Some("medium".to_string()),
                quality: Some(DEFAULT_QUALITY),
            }),
            dependencies: Some(DependencySection {
                handbrake: Some("HandBrakeCLI".to_string()),
                ffprobe: Some("ffprobe".to_string()),
                ffmpeg: Some("ffmpeg".to_string()),
            }),
            logging: Some(LoggingSection { log_file: None }),
            remove_original_files: Some(false),
            run_loop: Some(false),
            dry_run: Some(false),
            ignore_patterns: Some(Vec::new()),
            target_codec: Some("hevc".to_string()),
            loop_interval_secs: Some(DEFAULT_LOOP_INTERVAL_SECS),
            duplicates: Some(DuplicateSection {
                max_distance: Some(DEFAULT_MAX_DISTANCE),
            }),
        }
    }

    /// Overlay `user` on `default`: a present value wins, an absent one falls back.
    /// Nested sections are merged field by field.
    pub fn merge(default: Self, user: Self) -> Self {
        Self {
            directory: user.directory.or(default.directory),
            min_file_size: user.min_file_size.or(default.min_file_size),
            output: merge_section(default.output, user.output, OutputSection::merge),
            dependencies: merge_section(
                default.dependencies,
                user.dependencies,
                DependencySection::merge,
            ),
            logging: merge_section(default.logging, user.logging, |default, user| {
                LoggingSection {
                    log_file: user.log_file.or(default.log_file),
                }
            }),
            remove_original_files: user.remove_original_files.or(default.remove_original_files),
            run_loop: user.run_loop.or(default.run_loop),
            dry_run: user.dry_run.or(default.dry_run),
            ignore_patterns: user.ignore_patterns.or(default.ignore_patterns),
            target_codec: user.target_codec.or(default.target_codec),
            loop_interval_secs: user.loop_interval_secs.or(default.loop_interval_secs),
            duplicates: merge_section(default.duplicates, user.duplicates, |default, user| {
                DuplicateSection {
                    max_distance: user.max_distance.or(default.max_distance),
                }
            }),
        }
    }
}

/// Values supplied on the command line. They take priority over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub directory: Option<PathBuf>,
    pub dry_run: bool,
    pub run_loop: bool,
    pub remove_original_files: bool,
    pub log_file: Option<PathBuf>,
    pub max_distance: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputConfig {
    pub format: ContainerFormat,
    pub encoder: EncoderKind,
    pub preset: String,
    pub quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyConfig {
    pub handbrake: PathBuf,
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub directory: Option<PathBuf>,
    pub min_file_size: u64,
    pub log_file: Option<PathBuf>,
    pub remove_original_files: bool,
    pub run_loop: bool,
    pub dry_run: bool,
    pub ignore_patterns: Vec<String>,
    pub target_codec: String,
    pub loop_interval_secs: u64,
    pub max_distance: u32,
    pub output: OutputConfig,
    pub dependencies: DependencyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            directory: None,
            min_file_size: DEFAULT_MIN_FILE_SIZE_BYTES,
            log_file: None,
            remove_original_files: false,
            run_loop: false,
            dry_run: false,
            ignore_patterns: Vec::new(),
            target_codec: "hevc".to_string(),
            loop_interval_secs: DEFAULT_LOOP_INTERVAL_SECS,
            max_distance: DEFAULT_MAX_DISTANCE,
            output: OutputConfig {
                format: ContainerFormat::Mkv,
                encoder: EncoderKind::X265TenBit,
                preset: "medium".to_string(),
                quality: DEFAULT_QUALITY as u8,
            },
            dependencies: DependencyConfig {
                handbrake: PathBuf::from("HandBrakeCLI"),
                ffprobe: PathBuf::from("ffprobe"),
                ffmpeg: PathBuf::from("ffmpeg"),
            },
        }
    }
}

impl AppConfig {
    /// Validate a merged file config, apply command line overrides and resolve
    /// tool paths. Invalid values fall back to their defaults and are reported
    /// in the returned issue list.
    pub fn resolve(file: FileConfig, overrides: &Overrides) -> (AppConfig, Vec<String>) {
        let file = FileConfig::merge(FileConfig::defaults(), file);
        let defaults = AppConfig::default();
        let mut issues = Vec::new();

        let output = file.output.unwrap_or_default();
        let format_name = output.format.unwrap_or_else(|| "mkv".to_string());
        let encoder_name = output.encoder.unwrap_or_else(|| "x265_10bit".to_string());
        let preset = output.preset.unwrap_or_else(|| "medium".to_string());
        let quality = output.quality.unwrap_or(DEFAULT_QUALITY);

        let format = ContainerFormat::parse(&format_name).unwrap_or_else(|| {
            issues.push(format!(
                "Unsupported output format: {}. Supported: {}",
                format_name,
                SUPPORTED_FORMATS.join(", ")
            ));
            defaults.output.format
        });

        let encoder = EncoderKind::parse(&encoder_name).unwrap_or_else(|| {
            issues.push(format!(
                "Unsupported encoder type: {}. Supported: {}",
                encoder_name,
                SUPPORTED_ENCODERS.join(", ")
            ));
            defaults.output.encoder
        });

        if !validate_preset(&preset) {
            let supported: Vec<&str> = X265_PRESETS.iter().chain(NVENC_PRESETS.iter()).copied().collect();
            issues.push(format!(
                "Unsupported encoder preset: {}. Supported: {}",
                preset,
                supported.join(", ")
            ));
        }

        let quality = match u8::try_from(quality) {
            Ok(q) if q <= 51 => q,
            _ => {
                issues.push(format!(
                    "Invalid quality value: {}. Must be an integer between 0 and 51.",
                    quality
                ));
                defaults.output.quality
            }
        };

        let effective_preset = map_preset_for_encoder(&preset, encoder);
        if effective_preset != preset {
            info!(
                "Mapped preset '{}' to '{}' for encoder '{:?}'",
                preset, effective_preset, encoder
            );
        }

        let directory = overrides.directory.clone().or(file.directory);
        match &directory {
            None => issues.push(
                "No directory specified. Provide via command line or config file.".to_string(),
            ),
            Some(dir) if !dir.is_dir() => {
                issues.push(format!("'{}' is not a valid directory.", dir.display()))
            }
            Some(_) => {}
        }

        let min_file_size = match file.min_file_size.as_ref().map(parse_file_size) {
            Some(Ok(size)) => size,
            Some(Err(err)) => {
                issues.push(format!("Invalid min_file_size in config: {}", err));
                defaults.min_file_size
            }
            None => defaults.min_file_size,
        };

        let deps = file.dependencies.unwrap_or_default();
        let dependencies = DependencyConfig {
            handbrake: find_dependency_path("HandBrakeCLI", deps.handbrake.as_deref()),
            ffprobe: find_dependency_path("ffprobe", deps.ffprobe.as_deref()),
            ffmpeg: find_dependency_path("ffmpeg", deps.ffmpeg.as_deref()),
        };

        let log_file = overrides
            .log_file
            .clone()
            .or_else(|| file.logging.and_then(|logging| logging.log_file));

        let config = AppConfig {
            directory,
            min_file_size,
            log_file,
            remove_original_files: overrides.remove_original_files
                || file.remove_original_files.unwrap_or(false),
            run_loop: overrides.run_loop || file.run_loop.unwrap_or(false),
            dry_run: overrides.dry_run || file.dry_run.unwrap_or(false),
            ignore_patterns: file.ignore_patterns.unwrap_or_default(),
            target_codec: file.target_codec.unwrap_or(defaults.target_codec),
            loop_interval_secs: file
                .loop_interval_secs
                .unwrap_or(defaults.loop_interval_secs),
            max_distance: overrides
                .max_distance
                .or(file.duplicates.and_then(|d| d.max_distance))
                .unwrap_or(defaults.max_distance),
            output: OutputConfig {
                format,
                encoder,
                preset: effective_preset,
                quality,
            },
            dependencies,
        };

        (config, issues)
    }
}

/// Read the YAML config file. `Ok(None)` means there is no file at `path`.
pub fn load_file_config(path: &Path) -> Result<Option<FileConfig>, Error> {
    if !path.exists() {
        debug!("Config file not found: {}, using defaults", path.display());
        return Ok(None);
    }

    let builder = Config::builder()
        .add_source(ConfigFile::from(path).format(FileFormat::Yaml).required(true))
        .build()?;
    let file_config = builder.try_deserialize::<FileConfig>()?;
    info!("Loaded configuration from {}", path.display());
    Ok(Some(file_config))
}

pub fn validate_preset(preset: &str) -> bool {
    X265_PRESETS.contains(&preset) || NVENC_PRESETS.contains(&preset)
}

/// Translate a preset name into one the chosen encoder understands.
pub fn map_preset_for_encoder(preset: &str, encoder: EncoderKind) -> String {
    if encoder.is_x265() {
        if X265_PRESETS.contains(&preset) {
            return preset.to_string();
        }
        return match preset {
            "slow" => "slow",
            "fast" => "fast",
            _ => "medium",
        }
        .to_string();
    }

    if NVENC_PRESETS.contains(&preset) {
        return preset.to_string();
    }
    match preset {
        "ultrafast" | "superfast" | "veryfast" | "faster" | "fast" => "fast",
        "slow" | "slower" | "veryslow" => "slow",
        _ => "medium",
    }
    .to_string()
}

/// Parse `"500MB"`, `"1.5 gb"` or a plain byte count into bytes (binary multiples).
pub fn parse_file_size(setting: &SizeSetting) -> Result<u64, String> {
    let text = match setting {
        SizeSetting::Bytes(bytes) => {
            return u64::try_from(*bytes)
                .map_err(|_| format!("File size must be non-negative: {}", bytes))
        }
        SizeSetting::Text(text) => text.trim().to_uppercase(),
    };

    let invalid = || format!("Invalid file size format: {}", text);

    let number_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(number_end);

    let well_formed = match number.split_once('.') {
        Some((whole, frac)) => {
            !whole.is_empty() && !frac.is_empty() && !frac.contains('.')
        }
        None => !number.is_empty(),
    };
    if !well_formed {
        return Err(invalid());
    }

    let multiplier: u64 = match unit.trim_start() {
        "" | "B" => 1,
        "KB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        _ => return Err(invalid()),
    };

    let value: f64 = number.parse().map_err(|_| invalid())?;
    Ok((value * multiplier as f64) as u64)
}
