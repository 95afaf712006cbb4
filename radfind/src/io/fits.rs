//! FITS header and image access.
//!
//! Thin layer over `fitsio` that reads header keywords and 2D image planes and
//! writes single-HDU f64 images. Pixel arrays are indexed `[[row, col]]`, i.e.
//! `[[y, x]]` with `x` running along NAXIS1.

use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::Array2;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Keywords describing the sky grid and beam, copied to derived images.
pub const GRID_KEYS: &[&str] = &[
    "CTYPE1", "CTYPE2", "CRVAL1", "CRVAL2", "CRPIX1", "CRPIX2", "CDELT1", "CDELT2", "CD1_1",
    "CD1_2", "CD2_1", "CD2_2", "BMAJ", "BMIN", "BPA", "BUNIT", "EQUINOX",
];

/// Errors that can occur during FITS file operations
#[derive(Error, Debug)]
pub enum FitsError {
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),
    #[error("HDU not found: {0}")]
    HduNotFound(usize),
    #[error("Invalid image data: {0}")]
    InvalidData(String),
}

/// A header keyword value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Text(String),
    Number(f64),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Number(value) => Some(*value),
            HeaderValue::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(text) => Some(text.as_str()),
            HeaderValue::Number(_) => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(text) => write!(f, "{text}"),
            HeaderValue::Number(value) => write!(f, "{value}"),
        }
    }
}

/// Read-only access to image header keywords.
pub trait HeaderSource {
    /// Value of `key` in HDU `hdu` of `image`, `None` when absent.
    fn header_field(
        &self,
        image: &Path,
        hdu: usize,
        key: &str,
    ) -> Result<Option<HeaderValue>, FitsError>;

    fn header_number(&self, image: &Path, hdu: usize, key: &str) -> Result<Option<f64>, FitsError> {
        Ok(self
            .header_field(image, hdu, key)?
            .and_then(|value| value.as_f64()))
    }
}

/// [`HeaderSource`] backed by files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FitsHeaderReader;

impl HeaderSource for FitsHeaderReader {
    fn header_field(
        &self,
        image: &Path,
        hdu: usize,
        key: &str,
    ) -> Result<Option<HeaderValue>, FitsError> {
        let mut fptr = FitsFile::open(image)?;
        let hdu_handle = fptr.hdu(hdu).map_err(|_| FitsError::HduNotFound(hdu))?;
        Ok(read_value(&hdu_handle, &mut fptr, key))
    }
}

fn read_value(hdu: &fitsio::hdu::FitsHdu, fptr: &mut FitsFile, key: &str) -> Option<HeaderValue> {
    if let Ok(value) = hdu.read_key::<f64>(fptr, key) {
        return Some(HeaderValue::Number(value));
    }
    hdu.read_key::<String>(fptr, key)
        .ok()
        .map(|text| HeaderValue::Text(text.trim().to_string()))
}

/// Read the listed keywords that are present in HDU `hdu`.
pub fn read_header_keys(
    path: &Path,
    hdu: usize,
    keys: &[&str],
) -> Result<HashMap<String, HeaderValue>, FitsError> {
    let mut fptr = FitsFile::open(path)?;
    let hdu_handle = fptr.hdu(hdu).map_err(|_| FitsError::HduNotFound(hdu))?;

    let mut cards = HashMap::new();
    for key in keys {
        if let Some(value) = read_value(&hdu_handle, &mut fptr, key) {
            cards.insert(key.to_string(), value);
        }
    }
    Ok(cards)
}

/// Read every 2D plane of HDU `hdu`.
///
/// Degenerate trailing axes (frequency, Stokes) are split into planes; a plain
/// 2D image yields a single plane.
pub fn read_image_planes(path: &Path, hdu: usize) -> Result<Vec<Array2<f64>>, FitsError> {
    let mut fptr = FitsFile::open(path)?;
    let hdu_handle = fptr.hdu(hdu).map_err(|_| FitsError::HduNotFound(hdu))?;

    let naxis = hdu_handle.read_key::<i64>(&mut fptr, "NAXIS").unwrap_or(0);
    if naxis < 2 {
        return Err(FitsError::InvalidData(format!(
            "HDU {hdu} of {} has NAXIS={naxis}, expected an image",
            path.display()
        )));
    }
    let naxis1 = hdu_handle.read_key::<i64>(&mut fptr, "NAXIS1")? as usize;
    let naxis2 = hdu_handle.read_key::<i64>(&mut fptr, "NAXIS2")? as usize;
    let plane_len = naxis1 * naxis2;
    if plane_len == 0 {
        return Err(FitsError::InvalidData(format!(
            "{} has an empty image",
            path.display()
        )));
    }

    let data: Vec<f64> = hdu_handle.read_image(&mut fptr)?;
    if data.len() % plane_len != 0 {
        return Err(FitsError::InvalidData(format!(
            "{} values do not tile {naxis1}x{naxis2} planes",
            data.len()
        )));
    }

    data.chunks(plane_len)
        .map(|chunk| {
            Array2::from_shape_vec((naxis2, naxis1), chunk.to_vec()).map_err(|_| {
                FitsError::InvalidData(format!(
                    "Cannot reshape image data from {}",
                    path.display()
                ))
            })
        })
        .collect()
}

/// Read the first 2D plane of HDU `hdu`.
pub fn read_image(path: &Path, hdu: usize) -> Result<Array2<f64>, FitsError> {
    read_image_planes(path, hdu)?
        .into_iter()
        .next()
        .ok_or_else(|| FitsError::InvalidData(format!("{} has no planes", path.display())))
}

/// Write `image` as the primary HDU of `path`, overwriting any existing file.
///
/// `cards` are written after the data, typically the grid keywords of the
/// image the array was derived from.
pub fn write_image(
    path: &Path,
    image: &Array2<f64>,
    cards: &HashMap<String, HeaderValue>,
) -> Result<(), FitsError> {
    let (height, width) = image.dim();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[height, width],
    };

    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    let flat: Vec<f64> = image.iter().copied().collect();
    hdu.write_image(&mut fptr, &flat)?;

    let mut keys: Vec<&String> = cards.keys().collect();
    keys.sort();
    for key in keys {
        match &cards[key] {
            HeaderValue::Number(value) => hdu.write_key(&mut fptr, key, *value)?,
            HeaderValue::Text(text) => hdu.write_key(&mut fptr, key, text.as_str())?,
        }
    }

    Ok(())
}
