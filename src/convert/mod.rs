pub mod encode;
pub mod finalize;
pub mod naming;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

pub use encode::{EncodeStatus, Encoder, HandBrakeEncoder};
pub use finalize::{finalize, FinalizationOutcome, OriginalDisposition, RejectReason};

use crate::config::OutputConfig;
use crate::probe::Probe;

/// One encode of one input, from claimed output name to final outcome.
#[derive(Debug, Clone)]
pub struct ConversionAttempt {
    pub input: PathBuf,
    pub temp_output: PathBuf,
    pub final_output: PathBuf,
    pub options: OutputConfig,
}

impl ConversionAttempt {
    /// Claim an output name for `input`. The temp path is derived from it.
    pub fn begin(input: &Path, options: &OutputConfig) -> io::Result<Self> {
        let final_output = naming::claim_output_path(input, options.format)?;
        Ok(Self {
            input: input.to_path_buf(),
            temp_output: naming::temp_path_for(&final_output),
            final_output,
            options: options.clone(),
        })
    }

    pub fn finalize(self, preserve_original: bool, probe: &dyn Probe) -> FinalizationOutcome {
        finalize(
            &self.input,
            &self.temp_output,
            &self.final_output,
            preserve_original,
            probe,
        )
    }

    /// Throw away a cancelled or failed encode: remove the temp output and
    /// give the claimed name back.
    pub fn abandon(self) {
        match fs::remove_file(&self.temp_output) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                "Could not remove temp output {}: {}",
                self.temp_output.display(),
                err
            ),
        }
        naming::release(&self.final_output);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionStatus {
    Converted {
        output: PathBuf,
        disposition: OriginalDisposition,
    },
    Rejected(RejectReason),
    Failed(String),
    Cancelled,
    DryRun,
}

/// Result of handling one candidate during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub path: PathBuf,
    pub original_size: u64,
    pub new_size: Option<u64>,
    pub status: ConversionStatus,
}

impl ConversionReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ConversionStatus::Converted { .. })
    }

    /// Bytes freed by this conversion; negative if the output grew.
    pub fn space_saved(&self) -> i64 {
        match (&self.status, self.new_size) {
            (ConversionStatus::Converted { .. }, Some(new_size)) => {
                self.original_size as i64 - new_size as i64
            }
            _ => 0,
        }
    }
}

impl From<FinalizationOutcome> for ConversionStatus {
    fn from(outcome: FinalizationOutcome) -> Self {
        match outcome {
            FinalizationOutcome::Accepted {
                output,
                disposition,
            } => ConversionStatus::Converted {
                output,
                disposition,
            },
            FinalizationOutcome::Rejected(reason) => ConversionStatus::Rejected(reason),
        }
    }
}
