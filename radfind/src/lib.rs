//! radfind - point-source finding for FITS radio images
//!
//! The crate turns command-line options into a planned run: it resolves
//! companion files, checks projection hints, picks the run mode and drives a
//! source-finding [`engine::Engine`] before post-processing the results.
//!
//! ```text
//! Cli -> OptionSet -> select_mode -> RunOrchestrator -> Engine -> postprocess -> tables
//! ```

pub mod advisory;
pub mod args;
pub mod aux_files;
pub mod engine;
pub mod error;
pub mod io;
pub mod mode;
pub mod options;
pub mod orchestrator;
pub mod postprocess;
pub mod projection;
pub mod region;
pub mod source;
pub mod telescope;

// Re-export commonly used types for external use
pub use crate::advisory::{Advisory, RunReport};
pub use crate::args::Cli;
pub use crate::engine::{Engine, EngineConfig, IslandEngine};
pub use crate::error::{RadfindError, ValidationError};
pub use crate::mode::{select_mode, RunPlan, Stage};
pub use crate::options::{Beam, CoreCount, OptionSet};
pub use crate::orchestrator::{Outcome, RunOrchestrator};
pub use crate::source::Source;
