//! Detected and measured sources.
//!
//! A [`Source`] is produced by an [`Engine`](crate::engine::Engine) during
//! Find or PriorizedFit, optionally replaced by a corrected copy in
//! post-processing, and finally read by the catalog writers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for uncertainties that could not be determined.
pub const ERR_MASK: f64 = -1.0;

/// What a [`Source`] row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A single elliptical component fitted or measured inside an island.
    #[default]
    Component,
    /// Summary of a whole island (integrated flux, extent).
    Island,
}

/// One detected or measured astronomical component.
///
/// Positions are in degrees, `a`/`b` (FWHM of the major/minor axes) and their
/// errors in arcseconds, `pa` in degrees east of north. Fluxes are in image
/// units (Jy/beam for the peak, Jy for the integrated flux).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    /// Island this source belongs to
    pub island: usize,
    /// Index of the component within its island
    pub source: usize,
    pub background: f64,
    pub local_rms: f64,
    pub ra: f64,
    pub err_ra: f64,
    pub dec: f64,
    pub err_dec: f64,
    pub peak_flux: f64,
    pub err_peak_flux: f64,
    pub int_flux: f64,
    pub err_int_flux: f64,
    pub a: f64,
    pub err_a: f64,
    pub b: f64,
    pub err_b: f64,
    pub pa: f64,
    pub err_pa: f64,
    /// Pixel coordinates (0-based, column/row)
    pub x_pixel: f64,
    pub y_pixel: f64,
    /// Number of pixels in the island (islands only)
    #[serde(default)]
    pub pixels: usize,
    /// Bit flags set by the engine, see [`flags`]
    #[serde(default)]
    pub flags: u32,
}

/// Flag bits carried in [`Source::flags`].
pub mod flags {
    /// Position or shape was held fixed during measurement
    pub const FIXED: u32 = 0x01;
    /// Measurement hit the edge of the image
    pub const EDGE: u32 = 0x02;
    /// Island contained more summits than were fitted
    pub const SUMMITS_TRUNCATED: u32 = 0x04;
    /// Component is a negative (absorption-like) detection
    pub const NEGATIVE: u32 = 0x08;
    /// Shape could not be determined and was set to the beam
    pub const SHAPE_FROM_BEAM: u32 = 0x10;
}

impl Default for Source {
    fn default() -> Self {
        Self {
            kind: SourceKind::Component,
            island: 0,
            source: 0,
            background: 0.0,
            local_rms: 0.0,
            ra: 0.0,
            err_ra: ERR_MASK,
            dec: 0.0,
            err_dec: ERR_MASK,
            peak_flux: 0.0,
            err_peak_flux: ERR_MASK,
            int_flux: 0.0,
            err_int_flux: ERR_MASK,
            a: 0.0,
            err_a: ERR_MASK,
            b: 0.0,
            err_b: ERR_MASK,
            pa: 0.0,
            err_pa: ERR_MASK,
            x_pixel: 0.0,
            y_pixel: 0.0,
            pixels: 0,
            flags: 0,
        }
    }
}

impl Source {
    /// Column header for the plain-text listing.
    pub const TEXT_HEADER: &'static str = "#isle,src   bkg      rms      RA(deg)      Dec(deg)     \
         peak     err      int      err      a(\")   b(\")   pa(deg)  flags";

    pub fn is_component(&self) -> bool {
        self.kind == SourceKind::Component
    }

    pub fn is_island(&self) -> bool {
        self.kind == SourceKind::Island
    }

    /// Signal to noise ratio of the peak, zero when the rms is unknown.
    pub fn snr(&self) -> f64 {
        if self.local_rms > 0.0 {
            self.peak_flux / self.local_rms
        } else {
            0.0
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:4},{:<3} {:8.5} {:8.5} {:12.6} {:12.6} {:8.5} {:8.5} {:8.5} {:8.5} {:6.2} {:6.2} {:7.2}  {:#06x}",
            self.island,
            self.source,
            self.background,
            self.local_rms,
            self.ra,
            self.dec,
            self.peak_flux,
            self.err_peak_flux,
            self.int_flux,
            self.err_int_flux,
            self.a,
            self.b,
            self.pa,
            self.flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_errors_are_masked() {
        let source = Source::default();
        assert_eq!(source.err_peak_flux, ERR_MASK);
        assert_eq!(source.err_a, ERR_MASK);
        assert!(source.is_component());
    }

    #[test]
    fn test_snr_without_rms() {
        let source = Source {
            peak_flux: 2.0,
            ..Default::default()
        };
        assert_eq!(source.snr(), 0.0);

        let source = Source {
            peak_flux: 2.0,
            local_rms: 0.5,
            ..Default::default()
        };
        assert_eq!(source.snr(), 4.0);
    }

    #[test]
    fn test_display_row_starts_with_island_and_source() {
        let source = Source {
            island: 12,
            source: 3,
            ..Default::default()
        };
        let row = source.to_string();
        assert!(row.trim_start().starts_with("12,3"));
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&SourceKind::Island).unwrap();
        assert_eq!(json, "\"island\"");
    }
}
