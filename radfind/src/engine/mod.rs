//! Source finding engines.
//!
//! The orchestrator only talks to the [`Engine`] trait. [`IslandEngine`] is the
//! implementation shipped with radfind: zonal background estimation, seed and
//! flood clipped islands, and moment based component measurement.

pub mod background;
pub mod grid;
pub mod islands;
pub mod labeling;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aux_files::image_base_name;
use crate::io::catalog::CatalogError;
use crate::io::fits::FitsError;
use crate::options::{Beam, OptionSet};
use crate::region::RegionError;
use crate::source::Source;

pub use islands::IslandEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("FITS error: {0}")]
    Fits(#[from] FitsError),

    #[error("input catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("region error: {0}")]
    Region(#[from] RegionError),

    #[error("{what} is {found:?}, expected {expected:?} to match the image")]
    ShapeMismatch {
        what: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("no blanked image available, run find with blanking first")]
    NothingToBlank,

    #[error("cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// How non-finite pixel values are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericPolicy {
    /// Skip NaN and infinite pixels silently
    #[default]
    Quiet,
    /// Skip them but log how many were seen
    Report,
}

/// Everything an engine needs for one run, resolved from the [`OptionSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub cores: usize,
    pub hdu: usize,
    pub inner_clip: f64,
    pub outer_clip: f64,
    pub max_summits: Option<NonZeroUsize>,
    pub beam: Option<Beam>,
    pub latitude: Option<f64>,
    pub background: Option<PathBuf>,
    pub noise: Option<PathBuf>,
    pub psf: Option<PathBuf>,
    pub region: Option<PathBuf>,
    pub catalog_psf: Option<PathBuf>,
    pub resize_ratio: Option<f64>,
    pub regroup: bool,
    pub regroup_eps: f64,
    pub priorized_stage: u8,
    pub do_island_flux: bool,
    pub positive: bool,
    pub negative: bool,
    pub blank: bool,
    pub use_covariance: bool,
    pub numeric_policy: NumericPolicy,
    pub output_base: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_options(&OptionSet::default(), 1)
    }
}

impl EngineConfig {
    /// Engine settings for `options` running on `cores` workers.
    pub fn from_options(options: &OptionSet, cores: usize) -> Self {
        Self {
            cores: cores.max(1),
            hdu: options.hdu_index,
            inner_clip: options.inner_clip,
            outer_clip: options.outer_clip,
            max_summits: options.max_summits,
            beam: options.beam,
            latitude: options.latitude,
            background: options.background_image.clone(),
            noise: options.noise_image.clone(),
            psf: options.psf_image.clone(),
            region: options.region_mask.clone(),
            catalog_psf: options.catalog_psf_image.clone(),
            resize_ratio: options.resize_ratio,
            regroup: options.regroup,
            regroup_eps: options.regroup_eps,
            priorized_stage: options.priorized_stage,
            do_island_flux: options.do_island_flux,
            positive: !options.no_positive,
            negative: options.negative,
            blank: options.blank_output,
            use_covariance: options.use_covariance,
            numeric_policy: if options.debug {
                NumericPolicy::Report
            } else {
                NumericPolicy::Quiet
            },
            output_base: options.output_base.clone(),
        }
    }
}

/// Names of the background and noise images written for `image`.
///
/// `output_base` replaces the image base name when given.
pub fn background_paths(image: &Path, output_base: Option<&Path>) -> (PathBuf, PathBuf) {
    let base = output_base
        .map(Path::to_path_buf)
        .unwrap_or_else(|| image_base_name(image));
    let with_suffix = |suffix: &str| {
        let mut name = base.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    (with_suffix("_bkg.fits"), with_suffix("_rms.fits"))
}

/// A source finding and measurement backend.
pub trait Engine {
    /// Find and measure sources in `image`.
    fn find_sources(&mut self, image: &Path, config: &EngineConfig)
        -> Result<Vec<Source>, EngineError>;

    /// Measure the sources listed in `catalog` at their known positions.
    fn priorized_fit(
        &mut self,
        image: &Path,
        catalog: &Path,
        config: &EngineConfig,
    ) -> Result<Vec<Source>, EngineError>;

    /// Write background and noise images, returning their paths.
    fn save_background(
        &mut self,
        image: &Path,
        config: &EngineConfig,
    ) -> Result<(PathBuf, PathBuf), EngineError>;

    /// Write the image from the last find with every island blanked.
    fn save_blanked_image(&mut self, path: &Path) -> Result<(), EngineError>;
}
