//! Pixel ↔ sky mapping and beam lookup.
//!
//! Positions use a linear approximation around the reference pixel built from
//! `CRVAL`/`CRPIX` and either the `CD` matrix or `CDELT`. That is adequate for
//! the small fields a single island spans; full projection handling is left to
//! dedicated WCS tools.

use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;

use crate::engine::EngineError;
use crate::io::fits::{self, HeaderValue, GRID_KEYS};
use crate::options::Beam;

/// Linear sky grid of one image. Pixel coordinates are 0-based (col, row).
#[derive(Debug, Clone, PartialEq)]
pub struct SkyGrid {
    crval: [f64; 2],
    crpix: [f64; 2],
    cd: [[f64; 2]; 2],
}

fn number(cards: &HashMap<String, HeaderValue>, key: &str) -> Option<f64> {
    cards.get(key).and_then(HeaderValue::as_f64)
}

impl SkyGrid {
    /// Grid from header cards. Missing keywords fall back to a one degree per
    /// pixel grid centred on the origin.
    pub fn from_cards(cards: &HashMap<String, HeaderValue>) -> Self {
        let crval = [
            number(cards, "CRVAL1").unwrap_or(0.0),
            number(cards, "CRVAL2").unwrap_or(0.0),
        ];
        let crpix = [
            number(cards, "CRPIX1").unwrap_or(1.0),
            number(cards, "CRPIX2").unwrap_or(1.0),
        ];
        let cd = match (
            number(cards, "CD1_1"),
            number(cards, "CD1_2"),
            number(cards, "CD2_1"),
            number(cards, "CD2_2"),
        ) {
            (Some(c11), c12, c21, Some(c22)) => {
                [[c11, c12.unwrap_or(0.0)], [c21.unwrap_or(0.0), c22]]
            }
            _ => {
                if !cards.contains_key("CDELT1") {
                    log::warn!("image has no CD or CDELT keywords, assuming 1 degree pixels");
                }
                [
                    [number(cards, "CDELT1").unwrap_or(1.0), 0.0],
                    [0.0, number(cards, "CDELT2").unwrap_or(1.0)],
                ]
            }
        };
        Self { crval, crpix, cd }
    }

    fn cos_dec0(&self) -> f64 {
        self.crval[1].to_radians().cos().abs().max(1e-6)
    }

    /// Sky position (ra, dec) in degrees of pixel (x, y).
    pub fn pix2sky(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x + 1.0 - self.crpix[0];
        let dy = y + 1.0 - self.crpix[1];
        let xi = self.cd[0][0] * dx + self.cd[0][1] * dy;
        let eta = self.cd[1][0] * dx + self.cd[1][1] * dy;
        let ra = (self.crval[0] + xi / self.cos_dec0()).rem_euclid(360.0);
        let dec = (self.crval[1] + eta).clamp(-90.0, 90.0);
        (ra, dec)
    }

    /// Pixel position (x, y) of sky position (ra, dec). `None` when the
    /// grid matrix is singular.
    pub fn sky2pix(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let mut dra = ra - self.crval[0];
        if dra > 180.0 {
            dra -= 360.0;
        } else if dra < -180.0 {
            dra += 360.0;
        }
        let xi = dra * self.cos_dec0();
        let eta = dec - self.crval[1];

        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        if det.abs() < f64::EPSILON * f64::EPSILON {
            return None;
        }
        let dx = (self.cd[1][1] * xi - self.cd[0][1] * eta) / det;
        let dy = (-self.cd[1][0] * xi + self.cd[0][0] * eta) / det;
        Some((dx + self.crpix[0] - 1.0, dy + self.crpix[1] - 1.0))
    }

    /// Geometric mean pixel size in degrees.
    pub fn pixel_scale(&self) -> f64 {
        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        det.abs().sqrt()
    }
}

/// Beam from the `BMAJ`/`BMIN`/`BPA` header keywords.
pub fn beam_from_cards(cards: &HashMap<String, HeaderValue>) -> Option<Beam> {
    let major = number(cards, "BMAJ")?;
    let minor = number(cards, "BMIN")?;
    let pa = number(cards, "BPA").unwrap_or(0.0);
    Beam::new(major.max(minor), major.min(minor), pa).ok()
}

/// Beam at declination `dec` for an instrument at `latitude`.
///
/// Zenithal images stretch the beam along the meridian as the source moves
/// away from the zenith.
pub fn beam_at(beam: &Beam, dec: f64, latitude: Option<f64>) -> Beam {
    let Some(latitude) = latitude else {
        return *beam;
    };
    let zenith_cos = (dec - latitude).to_radians().cos().abs().max(0.05);
    let stretched = beam.major / zenith_cos;
    Beam {
        major: stretched.max(beam.minor),
        minor: beam.minor,
        pa: beam.pa,
    }
}

/// Spatially varying PSF: three planes holding major, minor (degrees) and pa.
#[derive(Debug, Clone)]
pub struct PsfMap {
    planes: Vec<Array2<f64>>,
    grid: SkyGrid,
}

impl PsfMap {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let planes = fits::read_image_planes(path, 0)?;
        if planes.len() < 3 {
            return Err(EngineError::InvalidConfig(format!(
                "PSF map {} has {} planes, expected 3 (major, minor, pa)",
                path.display(),
                planes.len()
            )));
        }
        let cards = fits::read_header_keys(path, 0, GRID_KEYS)?;
        Ok(Self {
            planes,
            grid: SkyGrid::from_cards(&cards),
        })
    }

    #[cfg(test)]
    pub fn from_parts(planes: Vec<Array2<f64>>, grid: SkyGrid) -> Self {
        Self { planes, grid }
    }

    /// PSF at a sky position, nearest pixel. `None` outside the map or where
    /// the map is blank.
    pub fn beam_at(&self, ra: f64, dec: f64) -> Option<Beam> {
        let (x, y) = self.grid.sky2pix(ra, dec)?;
        let (col, row) = (x.round(), y.round());
        let (height, width) = self.planes[0].dim();
        if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
            return None;
        }
        let index = [row as usize, col as usize];
        let major = self.planes[0][index];
        let minor = self.planes[1][index];
        let pa = self.planes[2][index];
        Beam::new(major.max(minor), major.min(minor), pa).ok()
    }
}
