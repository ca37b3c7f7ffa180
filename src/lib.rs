pub mod cancel;
pub mod command;
pub mod config;
pub mod convert;
pub mod dupes;
pub mod engine;
pub mod error;
pub mod probe;
pub mod progress;
pub mod scanner;

pub use cancel::CancelFlag;
pub use config::AppConfig;
pub use convert::{ConversionReport, ConversionStatus, FinalizationOutcome, OriginalDisposition, RejectReason};
pub use dupes::{DuplicateGroup, Fingerprint};
pub use engine::{ConvertEngine, DuplicateEngine, DuplicateReport, PassSummary};
pub use error::Error;
pub use probe::{Ffprobe, Probe};
pub use progress::{ChannelReporter, ProgressEvent, ProgressReporter, SilentReporter};
pub use scanner::{scan, CandidateFile, Scanner};
