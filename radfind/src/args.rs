//! Command line arguments.

use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::error::ValidationError;
use crate::options::{Beam, CoreCount, OptionSet, STDOUT_DESTINATION};

/// Find and measure point sources in radio images
#[derive(Parser, Debug, Clone)]
#[command(name = "radfind", version, about, disable_version_flag = true)]
pub struct Cli {
    /// Input FITS image
    pub image: Option<PathBuf>,

    /// Find sources (implied unless --save, --measure or --priorized is given)
    #[arg(long)]
    pub find: bool,

    /// Write background and noise images, then stop
    #[arg(long)]
    pub save: bool,

    /// Base name for the background and noise images written by --save
    #[arg(long)]
    pub outbase: Option<PathBuf>,

    /// Measure catalog sources without fitting; requires --priorized
    #[arg(long)]
    pub measure: bool,

    /// Priorized fitting stage: 1 flux, 2 also position, 3 also shape
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub priorized: u8,

    /// Input catalog for priorized fitting
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Ratio of image PSF to catalog PSF
    #[arg(long)]
    pub ratio: Option<f64>,

    /// Do not regroup priorized sources
    #[arg(long)]
    pub noregroup: bool,

    /// Regrouping distance in beam major axes
    #[arg(long = "regroup-eps", default_value_t = 4.0)]
    pub regroup_eps: f64,

    /// PSF map of the input catalog
    #[arg(long)]
    pub catpsf: Option<PathBuf>,

    /// List supported table formats and exit
    #[arg(long)]
    pub tformats: bool,

    /// Print version and capabilities and exit
    #[arg(long)]
    pub versions: bool,

    /// Destination of the text listing: a file, "stdout" or "none"
    #[arg(long, default_value = STDOUT_DESTINATION)]
    pub out: String,

    /// Comma separated table outputs, e.g. out.csv,out.reg
    #[arg(long, value_delimiter = ',')]
    pub table: Vec<String>,

    /// Background image
    #[arg(long)]
    pub background: Option<PathBuf>,

    /// Noise (rms) image
    #[arg(long)]
    pub noise: Option<PathBuf>,

    /// PSF map with major, minor and pa planes
    #[arg(long)]
    pub psf: Option<PathBuf>,

    /// Region mask (.mim)
    #[arg(long)]
    pub region: Option<PathBuf>,

    /// Load companion background/noise/region/psf files found next to the image
    #[arg(long)]
    pub autoload: bool,

    /// Worker cores, a positive number or "auto"
    #[arg(long, default_value = "auto")]
    pub cores: CoreCount,

    /// HDU holding the image
    #[arg(long, default_value_t = 0)]
    pub hdu: usize,

    /// Seed threshold in sigma
    #[arg(long, default_value_t = 5.0)]
    pub seedclip: f64,

    /// Flood threshold in sigma
    #[arg(long, default_value_t = 4.0)]
    pub floodclip: f64,

    /// Maximum number of summits fitted per island
    #[arg(long)]
    pub maxsummits: Option<NonZeroUsize>,

    /// Beam major, minor (degrees) and position angle
    #[arg(long, num_args = 3, value_names = ["MAJ", "MIN", "PA"], allow_negative_numbers = true)]
    pub beam: Option<Vec<f64>>,

    /// Telescope name, used to look up the site latitude
    #[arg(long)]
    pub telescope: Option<String>,

    /// Telescope latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Also report island summaries
    #[arg(long)]
    pub island: bool,

    /// Do not search for positive sources
    #[arg(long)]
    pub nopositive: bool,

    /// Search for negative sources
    #[arg(long)]
    pub negative: bool,

    /// Write a copy of the image with found islands blanked
    #[arg(long)]
    pub blankout: bool,

    /// Ignore pixel covariance when computing errors
    #[arg(long)]
    pub nocov: bool,

    /// Replace uncertainties with Condon (1997) errors
    #[arg(long)]
    pub condon: bool,

    /// Debug mode: single core, verbose logging, numeric warnings
    #[arg(long)]
    pub debug: bool,
}

/// Table names from `--table`, blanks dropped.
fn table_list(names: &[String]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl Cli {
    /// Typed options for these arguments.
    pub fn into_options(self) -> Result<OptionSet, ValidationError> {
        let beam = self.beam.as_deref().map(Beam::from_slice).transpose()?;
        Ok(OptionSet {
            find: self.find.then_some(true),
            save: self.save,
            measure: self.measure,
            priorized_stage: self.priorized,
            table_formats_requested: self.tformats,
            file_versions_requested: self.versions,
            input_image: self.image,
            output_catalog_path: self.out,
            table_output_spec: table_list(&self.table),
            background_image: self.background,
            noise_image: self.noise,
            psf_image: self.psf,
            catalog_psf_image: self.catpsf,
            region_mask: self.region,
            priorized_input_catalog: self.input,
            output_base: self.outbase,
            cores: self.cores,
            hdu_index: self.hdu,
            inner_clip: self.seedclip,
            outer_clip: self.floodclip,
            max_summits: self.maxsummits,
            beam,
            telescope: self.telescope,
            latitude: self.lat,
            resize_ratio: self.ratio,
            regroup_eps: self.regroup_eps,
            debug: self.debug,
            autoload: self.autoload,
            do_island_flux: self.island,
            no_positive: self.nopositive,
            negative: self.negative,
            blank_output: self.blankout,
            use_covariance: !self.nocov,
            apply_condon_errors: self.condon,
            regroup: !self.noregroup,
        })
    }
}
