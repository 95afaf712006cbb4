//! The bundled [`Engine`].
//!
//! Find: background and noise maps, a signal to noise map, seed/flood clipped
//! islands, then one moment-measured component per island. Priorized fitting
//! measures catalog sources at their known positions, optionally letting the
//! position (stage 2) and shape (stage 3) move. Per-island and per-source work
//! runs on a rayon pool sized to the configured core count.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use std::collections::HashMap;
use std::f64::consts::{LN_2, PI};
use std::path::{Path, PathBuf};

use crate::engine::background::{self, BackgroundMaps};
use crate::engine::grid::{self, PsfMap, SkyGrid};
use crate::engine::labeling::{self, DisjointSet, Island};
use crate::engine::{background_paths, Engine, EngineConfig, EngineError, NumericPolicy};
use crate::io::catalog::read_catalog;
use crate::io::fits::{self, HeaderValue, GRID_KEYS};
use crate::options::Beam;
use crate::region::{angular_separation, RegionMask};
use crate::source::{flags, Source, SourceKind};

/// Gaussian FWHM in units of sigma, 2√(2 ln 2).
const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

const ARCSEC_PER_DEG: f64 = 3600.0;

/// Beam assumed when neither the options nor the header give one, in pixels.
const FALLBACK_BEAM_PIXELS: f64 = 3.0;

/// Intensity weighted image moments.
#[derive(Debug, Default, Clone, Copy)]
struct Moments {
    m00: f64,
    m10: f64,
    m01: f64,
    m20: f64,
    m02: f64,
    m11: f64,
}

/// Second moment shape: sigmas along the principal axes and the angle of the
/// major axis from +x in radians.
#[derive(Debug, Clone, Copy)]
struct MomentShape {
    sigma_major: f64,
    sigma_minor: f64,
    theta: f64,
}

impl Moments {
    fn add(&mut self, col: usize, row: usize, weight: f64) {
        let (x, y) = (col as f64, row as f64);
        self.m00 += weight;
        self.m10 += x * weight;
        self.m01 += y * weight;
        self.m20 += x * x * weight;
        self.m02 += y * y * weight;
        self.m11 += x * y * weight;
    }

    fn centroid(&self) -> Option<(f64, f64)> {
        (self.m00 > f64::EPSILON).then(|| (self.m10 / self.m00, self.m01 / self.m00))
    }

    fn shape(&self) -> Option<MomentShape> {
        let (x, y) = self.centroid()?;
        let mu20 = self.m20 / self.m00 - x * x;
        let mu02 = self.m02 / self.m00 - y * y;
        let mu11 = self.m11 / self.m00 - x * y;

        let sum = mu20 + mu02;
        let discriminant = (4.0 * mu11 * mu11 + (mu20 - mu02).powi(2)).sqrt();
        let lambda1 = (sum + discriminant) / 2.0;
        let lambda2 = (sum - discriminant) / 2.0;
        if lambda2 <= f64::EPSILON || !lambda1.is_finite() {
            return None;
        }
        Some(MomentShape {
            sigma_major: lambda1.sqrt(),
            sigma_minor: lambda2.sqrt(),
            theta: 0.5 * (2.0 * mu11).atan2(mu20 - mu02),
        })
    }
}

/// Fold a position angle into (-90, 90].
fn wrap_pa(pa: f64) -> f64 {
    let mut pa = pa % 180.0;
    if pa > 90.0 {
        pa -= 180.0;
    } else if pa <= -90.0 {
        pa += 180.0;
    }
    pa
}

/// Position angle east of north of a pixel-frame direction at (x, y).
fn sky_position_angle(grid: &SkyGrid, x: f64, y: f64, theta: f64) -> f64 {
    let (ra0, dec0) = grid.pix2sky(x, y);
    let (ra1, dec1) = grid.pix2sky(x + theta.cos(), y + theta.sin());
    let mut dra = ra1 - ra0;
    if dra > 180.0 {
        dra -= 360.0;
    } else if dra < -180.0 {
        dra += 360.0;
    }
    let east = dra * dec0.to_radians().cos();
    let north = dec1 - dec0;
    wrap_pa(east.atan2(north).to_degrees())
}

/// Everything measured about one image.
struct Scene {
    pixels: Array2<f64>,
    maps: BackgroundMaps,
    grid: SkyGrid,
    beam: Beam,
    psf: Option<PsfMap>,
    cards: HashMap<String, HeaderValue>,
}

impl Scene {
    /// Beam at a sky position: PSF map first, then the latitude corrected beam.
    fn local_beam(&self, ra: f64, dec: f64, latitude: Option<f64>) -> Beam {
        self.psf
            .as_ref()
            .and_then(|psf| psf.beam_at(ra, dec))
            .unwrap_or_else(|| grid::beam_at(&self.beam, dec, latitude))
    }

    /// Beam solid angle in pixels.
    fn beam_area_pixels(&self, beam: &Beam) -> f64 {
        let scale = self.grid.pixel_scale();
        (PI / (4.0 * LN_2) * beam.major * beam.minor / (scale * scale)).max(1.0)
    }

    /// Background subtracted flux of a pixel, flipped for negative searches.
    fn flux(&self, row: usize, col: usize, sign: f64) -> f64 {
        sign * (self.pixels[[row, col]] - self.maps.background[[row, col]])
    }

    fn snr(&self, sign: f64) -> Array2<f64> {
        let mut snr = &self.pixels - &self.maps.background;
        snr.zip_mut_with(&self.maps.noise, |value, &rms| {
            *value = if rms > 0.0 { sign * *value / rms } else { f64::NAN };
        });
        snr
    }

    fn contains(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (height, width) = self.pixels.dim();
        let (col, row) = (x.round(), y.round());
        if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }
}

/// Island finder with moment based component measurement.
#[derive(Debug, Default)]
pub struct IslandEngine {
    blanked: Option<(Array2<f64>, HashMap<String, HeaderValue>)>,
}

impl IslandEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(config: &EngineConfig) -> Result<rayon::ThreadPool, EngineError> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(config.cores)
            .build()?)
    }

    fn load(
        &self,
        image: &Path,
        config: &EngineConfig,
        pool: &rayon::ThreadPool,
    ) -> Result<Scene, EngineError> {
        let pixels = fits::read_image(image, config.hdu)?;
        if config.numeric_policy == NumericPolicy::Report {
            let bad = background::count_non_finite(&pixels.view());
            if bad > 0 {
                log::warn!(
                    "{bad} non-finite pixels in {} will be ignored",
                    image.display()
                );
            }
        }

        let cards = fits::read_header_keys(image, config.hdu, GRID_KEYS)?;
        let grid = SkyGrid::from_cards(&cards);
        let beam = match config.beam.or_else(|| grid::beam_from_cards(&cards)) {
            Some(beam) => beam,
            None => {
                log::warn!(
                    "no beam in the header or options, assuming {FALLBACK_BEAM_PIXELS} pixels"
                );
                let size = FALLBACK_BEAM_PIXELS * grid.pixel_scale();
                Beam {
                    major: size,
                    minor: size,
                    pa: 0.0,
                }
            }
        };
        let psf = config.psf.as_deref().map(PsfMap::load).transpose()?;
        let maps = background_maps(&pixels, &grid, &beam, config, pool)?;

        Ok(Scene {
            pixels,
            maps,
            grid,
            beam,
            psf,
            cards,
        })
    }
}

/// Background and noise maps, read from user images where given.
fn background_maps(
    pixels: &Array2<f64>,
    grid: &SkyGrid,
    beam: &Beam,
    config: &EngineConfig,
    pool: &rayon::ThreadPool,
) -> Result<BackgroundMaps, EngineError> {
    let read_map = |path: &Path, what: &str| -> Result<Array2<f64>, EngineError> {
        let map = fits::read_image(path, 0)?;
        if map.dim() != pixels.dim() {
            return Err(EngineError::ShapeMismatch {
                what: format!("{what} image {}", path.display()),
                expected: pixels.dim(),
                found: map.dim(),
            });
        }
        Ok(map)
    };
    let background = config
        .background
        .as_deref()
        .map(|path| read_map(path, "background"))
        .transpose()?;
    let noise = config
        .noise
        .as_deref()
        .map(|path| read_map(path, "noise"))
        .transpose()?;

    if let (Some(background), Some(noise)) = (&background, &noise) {
        return Ok(BackgroundMaps {
            background: background.clone(),
            noise: noise.clone(),
        });
    }

    let beam_pixels = beam.major / grid.pixel_scale();
    let zone = background::zone_size(pixels.dim(), Some(beam_pixels));
    log::debug!("estimating background in {zone}x{zone} pixel zones");
    let view = pixels.view();
    let estimated = pool.install(|| background::estimate(&view, zone));

    Ok(BackgroundMaps {
        background: background.unwrap_or(estimated.background),
        noise: noise.unwrap_or(estimated.noise),
    })
}

/// A measured island: its component and, on request, an island summary.
struct Measured {
    component: Source,
    summary: Option<Source>,
}

fn measure_island(
    scene: &Scene,
    snr: &ArrayView2<f64>,
    island: &Island,
    sign: f64,
    config: &EngineConfig,
) -> Option<Measured> {
    let mut moments = Moments::default();
    let mut peak: Option<(f64, (usize, usize))> = None;
    let mut total = 0.0;
    for &(row, col) in &island.pixels {
        let flux = scene.flux(row, col, sign);
        if !flux.is_finite() {
            continue;
        }
        total += flux;
        if peak.map_or(true, |(best, _)| flux > best) {
            peak = Some((flux, (row, col)));
        }
        moments.add(col, row, flux.max(0.0));
    }
    let (peak_value, (peak_row, peak_col)) = peak?;
    let (x, y) = moments
        .centroid()
        .unwrap_or((peak_col as f64, peak_row as f64));

    let (ra, dec) = scene.grid.pix2sky(x, y);
    let beam = scene.local_beam(ra, dec, config.latitude);
    let scale_arcsec = scene.grid.pixel_scale() * ARCSEC_PER_DEG;
    let mut source_flags = 0;

    let (a, b, pa) = match moments.shape() {
        Some(shape) => (
            (FWHM_PER_SIGMA * shape.sigma_major * scale_arcsec).max(beam.major * ARCSEC_PER_DEG),
            (FWHM_PER_SIGMA * shape.sigma_minor * scale_arcsec).max(beam.minor * ARCSEC_PER_DEG),
            sky_position_angle(&scene.grid, x, y, shape.theta),
        ),
        None => {
            source_flags |= flags::SHAPE_FROM_BEAM;
            (
                beam.major * ARCSEC_PER_DEG,
                beam.minor * ARCSEC_PER_DEG,
                beam.pa,
            )
        }
    };

    let (height, width) = scene.pixels.dim();
    let (min_row, min_col, max_row, max_col) = island.bounds;
    if min_row == 0 || min_col == 0 || max_row + 1 == height || max_col + 1 == width {
        source_flags |= flags::EDGE;
    }
    if let Some(max) = config.max_summits {
        if labeling::count_summits(snr, island, config.inner_clip) > max.get() {
            source_flags |= flags::SUMMITS_TRUNCATED;
        }
    }
    if sign < 0.0 {
        source_flags |= flags::NEGATIVE;
    }

    let background = scene.maps.background[[peak_row, peak_col]];
    let local_rms = scene.maps.noise[[peak_row, peak_col]];
    let peak_flux = sign * peak_value;
    let beam_arcsec2 = beam.major * beam.minor * ARCSEC_PER_DEG * ARCSEC_PER_DEG;
    let int_flux = peak_flux * a * b / beam_arcsec2;

    // Pixels within a beam are correlated: fewer independent samples
    let beam_pixels = scene.beam_area_pixels(&beam);
    let npix = island.len() as f64;
    let err_sum = if config.use_covariance {
        local_rms * (npix / beam_pixels).sqrt()
    } else {
        local_rms * npix.sqrt() / beam_pixels
    };

    let snr_peak = if local_rms > 0.0 {
        peak_value / local_rms
    } else {
        0.0
    };
    let mut component = Source {
        kind: SourceKind::Component,
        background,
        local_rms,
        ra,
        dec,
        peak_flux,
        int_flux,
        a,
        b,
        pa,
        x_pixel: x,
        y_pixel: y,
        flags: source_flags,
        ..Default::default()
    };
    if snr_peak > 0.0 {
        let position_err = (a / ARCSEC_PER_DEG) / (FWHM_PER_SIGMA * snr_peak);
        component.err_ra = position_err;
        component.err_dec = position_err;
        component.err_peak_flux = local_rms;
        component.err_a = a / snr_peak;
        component.err_b = b / snr_peak;
        component.err_int_flux = int_flux.abs()
            * ((1.0 / snr_peak).powi(2) + 2.0 * (1.0 / snr_peak).powi(2)).sqrt();
        if source_flags & flags::SHAPE_FROM_BEAM == 0 {
            component.err_pa = (1.0 / snr_peak).to_degrees().min(90.0);
        }
    }

    let summary = config.do_island_flux.then(|| {
        let row_span = (max_row - min_row + 1) as f64;
        let col_span = (max_col - min_col + 1) as f64;
        Source {
            kind: SourceKind::Island,
            background,
            local_rms,
            ra,
            dec,
            peak_flux,
            int_flux: sign * total / beam_pixels,
            err_int_flux: err_sum,
            a: row_span.max(col_span) * scale_arcsec,
            b: row_span.min(col_span) * scale_arcsec,
            x_pixel: x,
            y_pixel: y,
            pixels: island.len(),
            flags: source_flags,
            ..Default::default()
        }
    });

    Some(Measured { component, summary })
}

/// Shape of a catalog source on this image, scaled for a different PSF.
fn prior_shape(
    scene: &Scene,
    prior: &Source,
    catalog_psf: Option<&PsfMap>,
    config: &EngineConfig,
) -> (f64, f64, f64) {
    let beam = scene.local_beam(prior.ra, prior.dec, config.latitude);
    if prior.a <= 0.0 || prior.b <= 0.0 {
        return (
            beam.major * ARCSEC_PER_DEG,
            beam.minor * ARCSEC_PER_DEG,
            beam.pa,
        );
    }

    let (mut a, mut b) = (prior.a, prior.b);
    if let Some(ratio) = config.resize_ratio {
        a *= ratio;
        b *= ratio;
    } else if let Some(catalog_beam) = catalog_psf.and_then(|psf| psf.beam_at(prior.ra, prior.dec))
    {
        if catalog_beam.major > 0.0 && catalog_beam.minor > 0.0 {
            a *= beam.major / catalog_beam.major;
            b *= beam.minor / catalog_beam.minor;
        }
    }
    (a, b, prior.pa)
}

/// Moments of pixels within `radius` of (x0, y0) that pass `clip`.
fn window_moments(
    scene: &Scene,
    x0: f64,
    y0: f64,
    radius: f64,
    sign: f64,
    clip: f64,
) -> Moments {
    let (height, width) = scene.pixels.dim();
    let row_lo = (y0 - radius).floor().max(0.0) as usize;
    let col_lo = (x0 - radius).floor().max(0.0) as usize;
    let row_hi = ((y0 + radius).ceil() as usize).min(height - 1);
    let col_hi = ((x0 + radius).ceil() as usize).min(width - 1);

    let mut moments = Moments::default();
    for row in row_lo..=row_hi {
        for col in col_lo..=col_hi {
            let (dx, dy) = (col as f64 - x0, row as f64 - y0);
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let flux = scene.flux(row, col, sign);
            let rms = scene.maps.noise[[row, col]];
            if flux.is_finite() && rms > 0.0 && flux >= clip * rms {
                moments.add(col, row, flux);
            }
        }
    }
    moments
}

fn measure_prior(
    scene: &Scene,
    prior: &Source,
    catalog_psf: Option<&PsfMap>,
    config: &EngineConfig,
) -> Option<Source> {
    let (x0, y0) = scene.grid.sky2pix(prior.ra, prior.dec)?;
    scene.contains(x0, y0)?;

    let stage = config.priorized_stage.clamp(1, 3);
    let sign = if prior.peak_flux < 0.0 { -1.0 } else { 1.0 };
    let beam = scene.local_beam(prior.ra, prior.dec, config.latitude);
    let (mut a, mut b, mut pa) = prior_shape(scene, prior, catalog_psf, config);
    let (mut x, mut y) = (x0, y0);
    let mut source_flags = flags::FIXED;
    let mut shape_moved = false;

    if stage >= 2 {
        let radius = (beam.major / scene.grid.pixel_scale()).max(1.0);
        let moments = window_moments(scene, x0, y0, radius, sign, config.outer_clip);
        if let Some((cx, cy)) = moments.centroid() {
            x = cx;
            y = cy;
            source_flags = 0;
        }
        if stage >= 3 {
            if let Some(shape) = moments.shape() {
                let scale_arcsec = scene.grid.pixel_scale() * ARCSEC_PER_DEG;
                a = (FWHM_PER_SIGMA * shape.sigma_major * scale_arcsec)
                    .max(beam.major * ARCSEC_PER_DEG);
                b = (FWHM_PER_SIGMA * shape.sigma_minor * scale_arcsec)
                    .max(beam.minor * ARCSEC_PER_DEG);
                pa = sky_position_angle(&scene.grid, x, y, shape.theta);
                shape_moved = true;
            }
        }
    }

    let (row, col) = scene.contains(x, y)?;
    let peak_flux = sign * scene.flux(row, col, sign);
    let local_rms = scene.maps.noise[[row, col]];
    let (ra, dec) = if source_flags & flags::FIXED != 0 {
        (prior.ra, prior.dec)
    } else {
        scene.grid.pix2sky(x, y)
    };
    let beam_arcsec2 = beam.major * beam.minor * ARCSEC_PER_DEG * ARCSEC_PER_DEG;
    let int_flux = peak_flux * a * b / beam_arcsec2;

    let mut source = Source {
        kind: SourceKind::Component,
        island: prior.island,
        source: prior.source,
        background: scene.maps.background[[row, col]],
        local_rms,
        ra,
        dec,
        peak_flux,
        int_flux,
        a,
        b,
        pa,
        x_pixel: x,
        y_pixel: y,
        flags: source_flags,
        ..Default::default()
    };
    if local_rms > 0.0 {
        let snr = peak_flux.abs() / local_rms;
        source.err_peak_flux = local_rms;
        source.err_int_flux = int_flux.abs() / snr.max(f64::EPSILON);
        if source_flags & flags::FIXED == 0 {
            let position_err = (a / ARCSEC_PER_DEG) / (FWHM_PER_SIGMA * snr.max(f64::EPSILON));
            source.err_ra = position_err;
            source.err_dec = position_err;
        }
        if shape_moved {
            source.err_a = a / snr.max(f64::EPSILON);
            source.err_b = b / snr.max(f64::EPSILON);
            source.err_pa = (1.0 / snr.max(f64::EPSILON)).to_degrees().min(90.0);
        }
    }
    Some(source)
}

/// Group sources closer than `eps` beams and renumber islands by group.
///
/// Sources keep their relative order inside a group.
pub fn regroup(mut sources: Vec<Source>, eps: f64, beam_major: f64) -> Vec<Source> {
    let limit = eps * beam_major;
    let mut sets = DisjointSet::new(sources.len());
    for i in 0..sources.len() {
        for j in (i + 1)..sources.len() {
            let separation =
                angular_separation(sources[i].ra, sources[i].dec, sources[j].ra, sources[j].dec);
            if separation <= limit {
                sets.union(i, j);
            }
        }
    }

    let groups = sets.groups();
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for (source, &group) in sources.iter_mut().zip(&groups) {
        let count = counts.entry(group).or_insert(0);
        source.island = group;
        source.source = *count;
        *count += 1;
    }
    sources.sort_by_key(|source| (source.island, source.source));
    sources
}

impl Engine for IslandEngine {
    fn find_sources(
        &mut self,
        image: &Path,
        config: &EngineConfig,
    ) -> Result<Vec<Source>, EngineError> {
        let pool = Self::pool(config)?;
        let scene = self.load(image, config, &pool)?;
        let region = config
            .region
            .as_deref()
            .map(RegionMask::load_from_file)
            .transpose()?;

        let mut signs = Vec::with_capacity(2);
        if config.positive {
            signs.push(1.0);
        }
        if config.negative {
            signs.push(-1.0);
        }

        let mut blanked = config.blank.then(|| scene.pixels.clone());
        let mut sources = Vec::new();
        let mut island_index = 0;

        for sign in signs {
            let snr = scene.snr(sign);
            let islands =
                labeling::find_islands(&snr.view(), config.inner_clip, config.outer_clip);
            log::info!(
                "found {} {} islands in {}",
                islands.len(),
                if sign > 0.0 { "positive" } else { "negative" },
                image.display()
            );

            let snr_view = snr.view();
            let measured: Vec<Option<Measured>> = pool.install(|| {
                islands
                    .par_iter()
                    .map(|island| measure_island(&scene, &snr_view, island, sign, config))
                    .collect()
            });

            for (island, measured) in islands.iter().zip(measured) {
                let Some(Measured {
                    mut component,
                    summary,
                }) = measured
                else {
                    continue;
                };
                if let Some(mask) = &region {
                    if !mask.contains(component.ra, component.dec) {
                        continue;
                    }
                }
                if let Some(blanked) = blanked.as_mut() {
                    for &(row, col) in &island.pixels {
                        blanked[[row, col]] = f64::NAN;
                    }
                }
                component.island = island_index;
                sources.push(component);
                if let Some(mut summary) = summary {
                    summary.island = island_index;
                    sources.push(summary);
                }
                island_index += 1;
            }
        }

        if let Some(blanked) = blanked {
            self.blanked = Some((blanked, scene.cards.clone()));
        }
        Ok(sources)
    }

    fn priorized_fit(
        &mut self,
        image: &Path,
        catalog: &Path,
        config: &EngineConfig,
    ) -> Result<Vec<Source>, EngineError> {
        let priors = read_catalog(catalog)?;
        let pool = Self::pool(config)?;
        let scene = self.load(image, config, &pool)?;
        let catalog_psf = config
            .catalog_psf
            .as_deref()
            .map(PsfMap::load)
            .transpose()?;

        let fitted: Vec<Source> = pool.install(|| {
            priors
                .par_iter()
                .filter_map(|prior| measure_prior(&scene, prior, catalog_psf.as_ref(), config))
                .collect()
        });
        let skipped = priors.len() - fitted.len();
        if skipped > 0 {
            log::info!(
                "{skipped} of {} catalog sources fall outside {}",
                priors.len(),
                image.display()
            );
        }

        if config.regroup {
            Ok(regroup(fitted, config.regroup_eps, scene.beam.major))
        } else {
            Ok(fitted)
        }
    }

    fn save_background(
        &mut self,
        image: &Path,
        config: &EngineConfig,
    ) -> Result<(PathBuf, PathBuf), EngineError> {
        let pool = Self::pool(config)?;
        let scene = self.load(image, config, &pool)?;
        let (background_path, noise_path) = background_paths(image, config.output_base.as_deref());

        fits::write_image(&background_path, &scene.maps.background, &scene.cards)?;
        fits::write_image(&noise_path, &scene.maps.noise, &scene.cards)?;
        log::info!(
            "wrote {} and {}",
            background_path.display(),
            noise_path.display()
        );
        Ok((background_path, noise_path))
    }

    fn save_blanked_image(&mut self, path: &Path) -> Result<(), EngineError> {
        let Some((pixels, cards)) = &self.blanked else {
            return Err(EngineError::NothingToBlank);
        };
        fits::write_image(path, pixels, cards)?;
        log::info!("wrote blanked image {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ERR_MASK;
    use approx::assert_relative_eq;
    use std::num::NonZeroUsize;

    const SCALE: f64 = 0.01;

    fn grid() -> SkyGrid {
        let cards: HashMap<String, HeaderValue> = [
            ("CRVAL1", 150.0),
            ("CRVAL2", 0.0),
            ("CRPIX1", 33.0),
            ("CRPIX2", 33.0),
            ("CDELT1", -SCALE),
            ("CDELT2", SCALE),
        ]
        .iter()
        .map(|(key, value)| (key.to_string(), HeaderValue::Number(*value)))
        .collect();
        SkyGrid::from_cards(&cards)
    }

    /// 64x64 image, unit noise, zero background, Gaussians of sigma 1.5 px.
    fn scene(peaks: &[(f64, f64, f64)]) -> Scene {
        let sigma = 1.5;
        let pixels = Array2::from_shape_fn((64, 64), |(row, col)| {
            peaks
                .iter()
                .map(|&(x, y, amp)| {
                    let r2 = (col as f64 - x).powi(2) + (row as f64 - y).powi(2);
                    amp * (-r2 / (2.0 * sigma * sigma)).exp()
                })
                .sum()
        });
        let beam_deg = FWHM_PER_SIGMA * sigma * SCALE;
        Scene {
            maps: BackgroundMaps {
                background: Array2::zeros((64, 64)),
                noise: Array2::ones((64, 64)),
            },
            pixels,
            grid: grid(),
            beam: Beam {
                major: beam_deg,
                minor: beam_deg,
                pa: 0.0,
            },
            psf: None,
            cards: HashMap::new(),
        }
    }

    fn islands_of(scene: &Scene, config: &EngineConfig) -> (Array2<f64>, Vec<Island>) {
        let snr = scene.snr(1.0);
        let islands = labeling::find_islands(&snr.view(), config.inner_clip, config.outer_clip);
        (snr, islands)
    }

    #[test]
    fn test_wrap_pa() {
        assert_eq!(wrap_pa(0.0), 0.0);
        assert_eq!(wrap_pa(90.0), 90.0);
        assert_eq!(wrap_pa(135.0), -45.0);
        assert_eq!(wrap_pa(-90.0), 90.0);
        assert_eq!(wrap_pa(270.0), 90.0);
    }

    #[test]
    fn test_position_angle_follows_axes() {
        let grid = grid();
        // +y is north, -x is east for a negative CDELT1
        assert_relative_eq!(sky_position_angle(&grid, 32.0, 32.0, PI / 2.0), 0.0, epsilon = 1e-6);
        assert_relative_eq!(
            sky_position_angle(&grid, 32.0, 32.0, PI).abs(),
            90.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_measure_single_gaussian() {
        let scene = scene(&[(20.0, 30.0, 50.0)]);
        let config = EngineConfig::default();
        let (snr, islands) = islands_of(&scene, &config);
        assert_eq!(islands.len(), 1);

        let measured = measure_island(&scene, &snr.view(), &islands[0], 1.0, &config).unwrap();
        let component = measured.component;
        assert_relative_eq!(component.x_pixel, 20.0, epsilon = 1e-6);
        assert_relative_eq!(component.y_pixel, 30.0, epsilon = 1e-6);
        assert_relative_eq!(component.peak_flux, 50.0, epsilon = 1e-9);
        assert_relative_eq!(component.local_rms, 1.0);
        // Truncated moments are smaller than the beam, so the beam wins
        let beam_arcsec = scene.beam.major * ARCSEC_PER_DEG;
        assert_relative_eq!(component.a, beam_arcsec, epsilon = 1e-9);
        assert_relative_eq!(component.int_flux, 50.0, epsilon = 1e-9);
        assert!(component.err_peak_flux > 0.0);
        assert_eq!(component.flags & flags::EDGE, 0);
        assert!(measured.summary.is_none());
    }

    #[test]
    fn test_negative_search_flips_sign() {
        let scene = scene(&[(32.0, 32.0, -40.0)]);
        let config = EngineConfig {
            positive: false,
            negative: true,
            ..Default::default()
        };
        assert!(islands_of(&scene, &config).1.is_empty());

        let snr = scene.snr(-1.0);
        let islands = labeling::find_islands(&snr.view(), config.inner_clip, config.outer_clip);
        assert_eq!(islands.len(), 1);
        let measured = measure_island(&scene, &snr.view(), &islands[0], -1.0, &config).unwrap();
        assert_relative_eq!(measured.component.peak_flux, -40.0, epsilon = 1e-9);
        assert_ne!(measured.component.flags & flags::NEGATIVE, 0);
    }

    #[test]
    fn test_island_summary_and_summits() {
        let scene = scene(&[(20.0, 32.0, 30.0), (25.0, 32.0, 30.0)]);
        let config = EngineConfig {
            do_island_flux: true,
            max_summits: NonZeroUsize::new(1),
            ..Default::default()
        };
        let (snr, islands) = islands_of(&scene, &config);
        assert_eq!(islands.len(), 1);

        let measured = measure_island(&scene, &snr.view(), &islands[0], 1.0, &config).unwrap();
        assert_ne!(measured.component.flags & flags::SUMMITS_TRUNCATED, 0);
        let summary = measured.summary.unwrap();
        assert_eq!(summary.kind, SourceKind::Island);
        assert_eq!(summary.pixels, islands[0].len());
        assert!(summary.int_flux > 0.0);
    }

    #[test]
    fn test_covariance_inflates_sum_error() {
        let scene = scene(&[(32.0, 32.0, 30.0)]);
        let (snr, islands) = islands_of(&scene, &EngineConfig::default());
        let with_cov = EngineConfig {
            do_island_flux: true,
            ..Default::default()
        };
        let without_cov = EngineConfig {
            use_covariance: false,
            ..with_cov.clone()
        };
        let err = |config: &EngineConfig| {
            measure_island(&scene, &snr.view(), &islands[0], 1.0, config)
                .unwrap()
                .summary
                .unwrap()
                .err_int_flux
        };
        assert!(err(&with_cov) > err(&without_cov));
    }

    #[test]
    fn test_priorized_stages() {
        let scene = scene(&[(30.0, 30.0, 20.0)]);
        // Catalog position one pixel off the true peak
        let (ra, dec) = scene.grid.pix2sky(31.0, 30.0);
        let prior = Source {
            ra,
            dec,
            peak_flux: 1.0,
            a: 120.0,
            b: 100.0,
            pa: 10.0,
            ..Default::default()
        };

        let stage1 = EngineConfig {
            priorized_stage: 1,
            ..Default::default()
        };
        let fixed = measure_prior(&scene, &prior, None, &stage1).unwrap();
        assert_eq!(fixed.flags & flags::FIXED, flags::FIXED);
        assert_eq!((fixed.ra, fixed.dec), (ra, dec));
        assert_eq!(fixed.a, 120.0);
        assert_eq!(fixed.err_ra, ERR_MASK);

        let stage2 = EngineConfig {
            priorized_stage: 2,
            ..Default::default()
        };
        let moved = measure_prior(&scene, &prior, None, &stage2).unwrap();
        assert_eq!(moved.flags & flags::FIXED, 0);
        assert!((moved.x_pixel - 30.0).abs() < (31.0f64 - 30.0).abs());
        assert_relative_eq!(moved.peak_flux, 20.0, epsilon = 1e-9);
        assert_eq!(moved.a, 120.0);

        let stage3 = EngineConfig {
            priorized_stage: 3,
            ..Default::default()
        };
        let reshaped = measure_prior(&scene, &prior, None, &stage3).unwrap();
        assert!(reshaped.err_a > 0.0);
    }

    #[test]
    fn test_priorized_ratio_and_outside_sources() {
        let scene = scene(&[(30.0, 30.0, 20.0)]);
        let (ra, dec) = scene.grid.pix2sky(30.0, 30.0);
        let prior = Source {
            ra,
            dec,
            a: 100.0,
            b: 50.0,
            ..Default::default()
        };
        let config = EngineConfig {
            priorized_stage: 1,
            resize_ratio: Some(0.5),
            ..Default::default()
        };
        let fitted = measure_prior(&scene, &prior, None, &config).unwrap();
        assert_eq!((fitted.a, fitted.b), (50.0, 25.0));

        let (ra, dec) = scene.grid.pix2sky(200.0, 30.0);
        let outside = Source { ra, dec, ..prior };
        assert!(measure_prior(&scene, &outside, None, &config).is_none());
    }

    #[test]
    fn test_regroup() {
        let at = |ra: f64, dec: f64| Source {
            ra,
            dec,
            island: 99,
            ..Default::default()
        };
        let sources = vec![at(10.0, 0.0), at(20.0, 0.0), at(10.01, 0.0), at(20.5, 0.0)];
        let grouped = regroup(sources, 4.0, 0.01);
        let ids: Vec<(usize, usize)> = grouped.iter().map(|s| (s.island, s.source)).collect();
        assert_eq!(ids, vec![(0, 0), (0, 1), (1, 0), (2, 0)]);
        assert_relative_eq!(grouped[1].ra, 10.01);
    }

    #[test]
    fn test_blank_without_find_is_error() {
        let mut engine = IslandEngine::new();
        assert!(matches!(
            engine.save_blanked_image(Path::new("never.fits")),
            Err(EngineError::NothingToBlank)
        ));
    }
}
