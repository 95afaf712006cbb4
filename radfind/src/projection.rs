//! Projection specific hints.
//!
//! The beam of a zenithal equal area (ZEA) image changes with declination, so
//! the engine needs either the telescope latitude or a PSF map to size it. A
//! slant orthographic (SIN) image needs neither, and telescope or latitude
//! hints there are dropped.

use std::path::Path;

use crate::advisory::Advisory;
use crate::io::fits::{FitsError, HeaderSource};
use crate::options::OptionSet;

/// Sky projection of the first image axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Zea,
    Sin,
    Other(String),
}

impl Projection {
    /// Projection code from a `CTYPE` value such as `RA---ZEA`.
    pub fn from_ctype(ctype: &str) -> Self {
        let ctype = ctype.trim();
        let code = ctype
            .rsplit('-')
            .next()
            .unwrap_or(ctype)
            .to_ascii_uppercase();
        match code.as_str() {
            "ZEA" => Projection::Zea,
            "SIN" => Projection::Sin,
            _ => Projection::Other(code),
        }
    }
}

/// Inspect the projection of `image` and report hints that are missing or
/// superfluous. Nothing is changed; see [`apply_advice`].
pub fn advise_projection(
    header: &dyn HeaderSource,
    image: &Path,
    hdu: usize,
    options: &OptionSet,
) -> Result<Vec<Advisory>, FitsError> {
    let Some(ctype) = header.header_field(image, hdu, "CTYPE1")? else {
        log::debug!("{} has no CTYPE1, skipping projection checks", image.display());
        return Ok(Vec::new());
    };
    let projection = Projection::from_ctype(&ctype.to_string());
    log::debug!("projection of {} is {projection:?}", image.display());
    Ok(advise(&projection, options))
}

/// Advisories for `projection` given the hints in `options`.
pub fn advise(projection: &Projection, options: &OptionSet) -> Vec<Advisory> {
    let mut advisories = Vec::new();
    match projection {
        Projection::Zea => {
            let hinted = options.telescope.is_some()
                || options.latitude.is_some()
                || options.psf_image.is_some();
            if !hinted {
                advisories.push(Advisory::ZeaNeedsBeamHint);
            }
        }
        Projection::Sin => {
            if let Some(telescope) = &options.telescope {
                advisories.push(Advisory::TelescopeUnnecessary {
                    telescope: telescope.clone(),
                });
            }
            if let Some(latitude) = options.latitude {
                advisories.push(Advisory::LatitudeUnnecessary { latitude });
            }
        }
        Projection::Other(_) => {}
    }
    advisories
}

/// Apply the option changes implied by `advisories`.
pub fn apply_advice(options: &mut OptionSet, advisories: &[Advisory]) {
    for advisory in advisories {
        match advisory {
            Advisory::TelescopeUnnecessary { .. } => options.telescope = None,
            Advisory::LatitudeUnnecessary { .. } => options.latitude = None,
            _ => {}
        }
    }
}
