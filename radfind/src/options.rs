//! Typed run configuration.
//!
//! [`OptionSet`] is the parsed form of everything the user asked for. It is
//! plain data: the command-line layer in [`crate::args`] fills it in, the
//! planning steps read it, and a handful of planning steps adjust it (auto
//! discovered companion files, dropped telescope hints) before any engine
//! work starts.

use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::advisory::Advisory;
use crate::error::ValidationError;

/// Destination name that routes the text listing to standard output.
pub const STDOUT_DESTINATION: &str = "stdout";

/// Destination name that disables the text listing.
pub const NO_DESTINATION: &str = "none";

/// Requested number of worker cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum CoreCount {
    /// Use every processing unit the platform reports
    #[default]
    Auto,
    Fixed(NonZeroUsize),
}

impl FromStr for CoreCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(CoreCount::Auto);
        }
        let cores = s
            .parse::<usize>()
            .map_err(|_| format!("cores must be a positive integer or 'auto', got '{s}'"))?;
        NonZeroUsize::new(cores)
            .map(CoreCount::Fixed)
            .ok_or_else(|| "cores must be at least 1".to_string())
    }
}

impl fmt::Display for CoreCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreCount::Auto => write!(f, "auto"),
            CoreCount::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// Restoring beam in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Beam {
    pub major: f64,
    pub minor: f64,
    pub pa: f64,
}

impl Beam {
    /// Build a beam, rejecting negative or non-finite axes and major < minor.
    pub fn new(major: f64, minor: f64, pa: f64) -> Result<Self, ValidationError> {
        if !(major.is_finite() && minor.is_finite() && pa.is_finite()) {
            return Err(ValidationError::InvalidBeam(
                "all beam parameters must be finite".to_string(),
            ));
        }
        if major < 0.0 || minor < 0.0 {
            return Err(ValidationError::InvalidBeam(format!(
                "axes must be non-negative, got {major} x {minor}"
            )));
        }
        if major < minor {
            return Err(ValidationError::InvalidBeam(format!(
                "major axis {major} is smaller than minor axis {minor}"
            )));
        }
        Ok(Self { major, minor, pa })
    }

    /// Build a beam from a `[major, minor, pa]` slice.
    pub fn from_slice(values: &[f64]) -> Result<Self, ValidationError> {
        match values {
            [major, minor, pa] => Self::new(*major, *minor, *pa),
            _ => Err(ValidationError::InvalidBeam(format!(
                "expected 3 values (major minor pa), got {}",
                values.len()
            ))),
        }
    }

    /// Noise correlation width: hypotenuse of the two axes.
    pub fn theta_n(&self) -> f64 {
        self.major.hypot(self.minor)
    }
}

/// Everything the user asked for, after parsing.
#[derive(Debug, Clone, Serialize)]
pub struct OptionSet {
    // Mode flags. `find` is `None` unless the user asked for it explicitly.
    pub find: Option<bool>,
    pub save: bool,
    pub measure: bool,
    pub priorized_stage: u8,
    pub table_formats_requested: bool,
    pub file_versions_requested: bool,

    // Paths
    pub input_image: Option<PathBuf>,
    pub output_catalog_path: String,
    pub table_output_spec: Vec<PathBuf>,
    pub background_image: Option<PathBuf>,
    pub noise_image: Option<PathBuf>,
    pub psf_image: Option<PathBuf>,
    pub catalog_psf_image: Option<PathBuf>,
    pub region_mask: Option<PathBuf>,
    pub priorized_input_catalog: Option<PathBuf>,
    pub output_base: Option<PathBuf>,

    // Numeric
    pub cores: CoreCount,
    pub hdu_index: usize,
    pub inner_clip: f64,
    pub outer_clip: f64,
    pub max_summits: Option<NonZeroUsize>,
    pub beam: Option<Beam>,
    pub telescope: Option<String>,
    pub latitude: Option<f64>,
    pub resize_ratio: Option<f64>,
    pub regroup_eps: f64,

    // Toggles
    pub debug: bool,
    pub autoload: bool,
    pub do_island_flux: bool,
    pub no_positive: bool,
    pub negative: bool,
    pub blank_output: bool,
    pub use_covariance: bool,
    pub apply_condon_errors: bool,
    pub regroup: bool,
}

impl Default for OptionSet {
    fn default() -> Self {
        Self {
            find: None,
            save: false,
            measure: false,
            priorized_stage: 0,
            table_formats_requested: false,
            file_versions_requested: false,
            input_image: None,
            output_catalog_path: STDOUT_DESTINATION.to_string(),
            table_output_spec: Vec::new(),
            background_image: None,
            noise_image: None,
            psf_image: None,
            catalog_psf_image: None,
            region_mask: None,
            priorized_input_catalog: None,
            output_base: None,
            cores: CoreCount::Auto,
            hdu_index: 0,
            inner_clip: 5.0,
            outer_clip: 4.0,
            max_summits: None,
            beam: None,
            telescope: None,
            latitude: None,
            resize_ratio: None,
            regroup_eps: 4.0,
            debug: false,
            autoload: false,
            do_island_flux: false,
            no_positive: false,
            negative: false,
            blank_output: false,
            use_covariance: true,
            apply_condon_errors: false,
            regroup: true,
        }
    }
}

impl OptionSet {
    /// Convenience constructor for a run on `image` with default settings.
    pub fn for_image(image: impl Into<PathBuf>) -> Self {
        Self {
            input_image: Some(image.into()),
            ..Default::default()
        }
    }

    /// Check numeric ranges that do not depend on the run mode.
    ///
    /// Returns advisories for values that were adjusted.
    pub fn validate(&mut self) -> Result<Vec<Advisory>, ValidationError> {
        let mut advisories = Vec::new();

        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ValidationError::InvalidLatitude(lat));
            }
        }

        if let Some(beam) = self.beam {
            // Re-run the constructor checks for beams built by hand
            Beam::new(beam.major, beam.minor, beam.pa)?;
        }

        if self.outer_clip > self.inner_clip {
            advisories.push(Advisory::FloodClipLowered {
                inner: self.inner_clip,
                outer: self.outer_clip,
            });
            self.outer_clip = self.inner_clip;
        }

        Ok(advisories)
    }

    /// True when `find` was given explicitly on the command line.
    pub fn find_requested(&self) -> bool {
        self.find == Some(true)
    }

    /// The text listing destination, `None` when disabled.
    pub fn listing_destination(&self) -> Option<&str> {
        let dest = self.output_catalog_path.trim();
        if dest.is_empty() || dest.eq_ignore_ascii_case(NO_DESTINATION) {
            None
        } else {
            Some(dest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_count_parse() {
        assert_eq!("auto".parse::<CoreCount>().unwrap(), CoreCount::Auto);
        assert_eq!("AUTO".parse::<CoreCount>().unwrap(), CoreCount::Auto);
        assert_eq!(
            "4".parse::<CoreCount>().unwrap(),
            CoreCount::Fixed(NonZeroUsize::new(4).unwrap())
        );
        assert!("0".parse::<CoreCount>().is_err());
        assert!("-2".parse::<CoreCount>().is_err());
        assert!("many".parse::<CoreCount>().is_err());
    }

    #[test]
    fn test_beam_validation() {
        assert!(Beam::new(0.02, 0.01, 45.0).is_ok());
        assert!(Beam::new(0.01, 0.02, 0.0).is_err());
        assert!(Beam::new(-0.01, -0.02, 0.0).is_err());
        assert!(Beam::new(f64::NAN, 0.01, 0.0).is_err());
        assert!(Beam::from_slice(&[0.02, 0.01]).is_err());
    }

    #[test]
    fn test_theta_n_is_hypotenuse() {
        let beam = Beam::new(0.04, 0.03, 0.0).unwrap();
        assert!((beam.theta_n() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_validate_latitude() {
        let mut options = OptionSet {
            latitude: Some(-91.0),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ValidationError::InvalidLatitude(_))
        ));

        options.latitude = Some(-26.7);
        assert!(options.validate().unwrap().is_empty());
    }

    #[test]
    fn test_validate_lowers_flood_clip() {
        let mut options = OptionSet {
            inner_clip: 3.0,
            outer_clip: 4.0,
            ..Default::default()
        };
        let advisories = options.validate().unwrap();
        assert_eq!(advisories.len(), 1);
        assert_eq!(options.outer_clip, 3.0);
    }

    #[test]
    fn test_listing_destination() {
        let mut options = OptionSet::default();
        assert_eq!(options.listing_destination(), Some(STDOUT_DESTINATION));

        options.output_catalog_path = "none".to_string();
        assert_eq!(options.listing_destination(), None);

        options.output_catalog_path = "out.txt".to_string();
        assert_eq!(options.listing_destination(), Some("out.txt"));
    }
}
