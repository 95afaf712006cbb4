//! Background and noise estimation.
//!
//! The image is split into square zones. Each zone gets the median of its
//! finite pixels as background and 1.4826 × the median absolute deviation as
//! noise. Zones are independent and are measured in parallel.

use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;

/// Scale from median absolute deviation to Gaussian sigma.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Zone side in beams when the beam size is known.
const BEAMS_PER_ZONE: f64 = 20.0;

/// Smallest zone side in pixels.
const MIN_ZONE: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundMaps {
    pub background: Array2<f64>,
    pub noise: Array2<f64>,
}

/// Median of `values`, which are sorted in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// (median, MAD-derived sigma) of the finite values in `zone`.
pub fn zone_statistics(zone: &ArrayView2<f64>) -> Option<(f64, f64)> {
    let mut values: Vec<f64> = zone.iter().copied().filter(|v| v.is_finite()).collect();
    let center = median(&mut values)?;
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    let mad = median(&mut deviations)?;
    Some((center, mad * MAD_TO_SIGMA))
}

/// Zone side for an image of `dim` with a beam `beam_pixels` wide.
pub fn zone_size(dim: (usize, usize), beam_pixels: Option<f64>) -> usize {
    let smallest = dim.0.min(dim.1).max(1);
    let size = match beam_pixels {
        Some(beam) if beam.is_finite() && beam > 0.0 => (beam * BEAMS_PER_ZONE).round() as usize,
        _ => smallest / 8,
    };
    size.clamp(MIN_ZONE.min(smallest), smallest)
}

/// Estimate background and noise maps for `image` using zones of `zone` pixels.
pub fn estimate(image: &ArrayView2<f64>, zone: usize) -> BackgroundMaps {
    let (height, width) = image.dim();
    let zone = zone.max(1);

    let origins: Vec<(usize, usize)> = (0..height)
        .step_by(zone)
        .flat_map(|row| (0..width).step_by(zone).map(move |col| (row, col)))
        .collect();

    let stats: Vec<((usize, usize), Option<(f64, f64)>)> = origins
        .into_par_iter()
        .map(|(row, col)| {
            let view =
                image.slice(s![row..(row + zone).min(height), col..(col + zone).min(width)]);
            ((row, col), zone_statistics(&view))
        })
        .collect();

    let mut background = Array2::from_elem((height, width), f64::NAN);
    let mut noise = Array2::from_elem((height, width), f64::NAN);
    for ((row, col), stat) in stats {
        let Some((level, sigma)) = stat else {
            continue;
        };
        let rows = row..(row + zone).min(height);
        let cols = col..(col + zone).min(width);
        background
            .slice_mut(s![rows.clone(), cols.clone()])
            .fill(level);
        noise.slice_mut(s![rows, cols]).fill(sigma);
    }

    BackgroundMaps { background, noise }
}

/// Number of non-finite values in `image`.
pub fn count_non_finite(image: &ArrayView2<f64>) -> usize {
    image.iter().filter(|v| !v.is_finite()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_median() {
        let mut empty: Vec<f64> = Vec::new();
        assert_eq!(median(&mut empty), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn test_zone_statistics_ignores_nan() {
        let zone = array![[1.0, 2.0, f64::NAN], [3.0, 100.0, f64::INFINITY]];
        let (level, sigma) = zone_statistics(&zone.view()).unwrap();
        assert_relative_eq!(level, 2.5);
        // deviations 1.5, 0.5, 0.5, 97.5 -> MAD 1.0
        assert_relative_eq!(sigma, MAD_TO_SIGMA);

        let blank = Array2::from_elem((2, 2), f64::NAN);
        assert!(zone_statistics(&blank.view()).is_none());
    }

    #[test]
    fn test_zone_size() {
        assert_eq!(zone_size((64, 128), None), 8);
        assert_eq!(zone_size((64, 128), Some(2.0)), 40);
        assert_eq!(zone_size((64, 128), Some(100.0)), 64);
        assert_eq!(zone_size((8, 8), None), 3);
        assert_eq!(zone_size((2, 2), None), 2);
    }

    #[test]
    fn test_estimate_flat_image() {
        let image =
            Array2::from_shape_fn((20, 20), |(r, c)| if (r + c) % 2 == 0 { 6.0 } else { 4.0 });
        let maps = estimate(&image.view(), 7);
        assert_eq!(maps.background.dim(), (20, 20));
        assert!(maps.background.iter().all(|&v| (v - 5.0).abs() < 1.0 + 1e-12));
        assert!(maps.noise.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_count_non_finite() {
        let image = array![[1.0, f64::NAN], [f64::NEG_INFINITY, 0.0]];
        assert_eq!(count_non_finite(&image.view()), 2);
    }
}
