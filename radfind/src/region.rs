//! Sky region masks.
//!
//! A region mask restricts detection to parts of the sky. Masks are stored as
//! versioned JSON:
//!
//! ```json
//! {
//!   "format": "radfind-region",
//!   "version": 1,
//!   "circles": [{"ra": 150.1, "dec": -30.2, "radius": 0.5}]
//! }
//! ```
//!
//! All angles are in degrees. Region support is optional and compiled in with
//! the `regions` feature; callers check [`Capabilities`] before relying on it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::error::RadfindError;

/// Value of the `format` field in every region file.
pub const REGION_FORMAT: &str = "radfind-region";

/// Schema version this build reads and writes.
pub const REGION_VERSION: u32 = 1;

/// Optional functionality available in this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub regions: bool,
}

impl Capabilities {
    /// Capabilities compiled into this binary.
    pub fn detect() -> Self {
        Self {
            regions: cfg!(feature = "regions"),
        }
    }

    pub fn all() -> Self {
        Self { regions: true }
    }

    pub fn none() -> Self {
        Self { regions: false }
    }

    pub fn require_regions(&self) -> Result<(), RadfindError> {
        if self.regions {
            Ok(())
        } else {
            Err(RadfindError::CapabilityMissing {
                capability: "region",
                hint: "rebuild radfind with `--features regions` to use --region or .mim files",
            })
        }
    }

    /// Names of enabled capabilities, for the versions listing.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.regions {
            names.push("regions");
        }
        names
    }
}

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("cannot read region file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed region file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("not a region file (format '{0}')")]
    WrongFormat(String),
    #[error("region file version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("region support is not compiled into this build")]
    Unavailable,
}

/// A cone on the sky.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCircle {
    pub ra: f64,
    pub dec: f64,
    pub radius: f64,
}

impl SkyCircle {
    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        angular_separation(self.ra, self.dec, ra, dec) <= self.radius
    }
}

/// Union of sky circles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMask {
    pub format: String,
    pub version: u32,
    pub circles: Vec<SkyCircle>,
}

impl RegionMask {
    pub fn new(circles: Vec<SkyCircle>) -> Self {
        Self {
            format: REGION_FORMAT.to_string(),
            version: REGION_VERSION,
            circles,
        }
    }

    /// True when (ra, dec) falls inside any circle.
    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        self.circles.iter().any(|circle| circle.contains(ra, dec))
    }

    pub fn from_json(json: &str) -> Result<Self, RegionError> {
        let mask: RegionMask = serde_json::from_str(json)?;
        if mask.format != REGION_FORMAT {
            return Err(RegionError::WrongFormat(mask.format));
        }
        if mask.version != REGION_VERSION {
            return Err(RegionError::UnsupportedVersion {
                found: mask.version,
                expected: REGION_VERSION,
            });
        }
        Ok(mask)
    }

    /// Load a region file.
    #[cfg(feature = "regions")]
    pub fn load_from_file(path: &Path) -> Result<Self, RegionError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    #[cfg(not(feature = "regions"))]
    pub fn load_from_file(_path: &Path) -> Result<Self, RegionError> {
        Err(RegionError::Unavailable)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), RegionError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Great-circle distance in degrees (haversine).
pub fn angular_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (ra1, dec1, ra2, dec2) = (
        ra1.to_radians(),
        dec1.to_radians(),
        ra2.to_radians(),
        dec2.to_radians(),
    );
    let sin_ddec = ((dec2 - dec1) / 2.0).sin();
    let sin_dra = ((ra2 - ra1) / 2.0).sin();
    let h = sin_ddec * sin_ddec + dec1.cos() * dec2.cos() * sin_dra * sin_dra;
    (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
}
