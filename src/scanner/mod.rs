pub mod markers;
pub mod walk;

pub use walk::{scan, CandidateFile, Scanner};
