use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;
use crate::io::catalog::CatalogError;
use crate::io::fits::FitsError;
use crate::mode::SelectionError;

/// Problems with user input that are detected before any detection work.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A path given through a command-line option does not exist.
    #[error("{option}: {} not found", path.display())]
    FileNotFound {
        /// Option that supplied the path, e.g. `--noise`
        option: &'static str,
        path: PathBuf,
    },

    #[error("table format '{format}' is not supported (from {})", path.display())]
    UnsupportedTableFormat { format: String, path: PathBuf },

    #[error("must specify input catalog when --priorized is selected")]
    MissingInputCatalog,

    #[error("input catalog {} lists no components", .0.display())]
    EmptyInputCatalog(PathBuf),

    #[error("ratio must be positive definite, got {0}")]
    NonPositiveRatio(f64),

    #[error("invalid beam: {0}")]
    InvalidBeam(String),

    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("--blankout requires a single core, {cores} requested")]
    BlankingRequiresSingleCore { cores: usize },

    #[error("cannot open output {}: {source}", path.display())]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for a radfind run.
#[derive(Error, Debug)]
pub enum RadfindError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Optional functionality was requested but is not compiled in.
    #[error("{capability} support is not available: {hint}")]
    CapabilityMissing {
        capability: &'static str,
        hint: &'static str,
    },

    #[error("unsupported option combination: {0}")]
    UnsupportedCombination(String),

    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),

    #[error("catalog failure: {0}")]
    Catalog(#[from] CatalogError),

    #[error("FITS failure: {0}")]
    Fits(#[from] FitsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SelectionError> for RadfindError {
    fn from(error: SelectionError) -> Self {
        match error {
            SelectionError::ImageNotFound(path) => ValidationError::FileNotFound {
                option: "image",
                path,
            }
            .into(),
            SelectionError::UnsupportedCombination(reason) => {
                RadfindError::UnsupportedCombination(reason)
            }
        }
    }
}

impl RadfindError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RadfindError::UnsupportedCombination(_) => 2,
            _ => 1,
        }
    }
}
