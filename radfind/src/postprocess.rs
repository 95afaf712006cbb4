//! Result post-processing: Condon (1997) uncertainties and table output.
//!
//! Corrections never touch the input slice; they produce a new sequence in the
//! same order.

use std::path::{Path, PathBuf};

use crate::advisory::{Advisory, RunReport};
use crate::io::catalog::{format_of, table_path_for, CatalogError, CatalogMeta, CatalogSink};
use crate::io::fits::{FitsError, HeaderSource};
use crate::options::OptionSet;
use crate::source::{Source, SourceKind, ERR_MASK};

/// Exponents (α₁, α₂) of the Condon ρ² terms.
#[derive(Debug, Clone, Copy)]
enum Term {
    Amplitude,
    Major,
    X,
    Minor,
    Y,
    Pa,
}

impl Term {
    fn alphas(self) -> (f64, f64) {
        match self {
            Term::Amplitude => (1.5, 1.5),
            Term::Major | Term::X => (2.5, 0.5),
            Term::Minor | Term::Y | Term::Pa => (0.5, 2.5),
        }
    }
}

/// Noise correlation width in degrees.
///
/// The user beam wins; otherwise `BMAJ`/`BMIN` from the image header.
pub fn resolve_theta_n(
    options: &OptionSet,
    header: &dyn HeaderSource,
    image: &Path,
) -> Result<Option<f64>, FitsError> {
    if let Some(beam) = options.beam {
        return Ok(Some(beam.theta_n()));
    }
    let major = header.header_number(image, options.hdu_index, "BMAJ")?;
    let minor = header.header_number(image, options.hdu_index, "BMIN")?;
    Ok(match (major, minor) {
        (Some(major), Some(minor)) => Some(major.hypot(minor)),
        _ => None,
    })
}

/// Condon (1997) uncertainties for one component.
///
/// Without `theta_n` the flux and shape errors (`err_peak_flux`,
/// `err_int_flux`, `err_a`, `err_b`, `err_pa`) are set to zero, since each is
/// scaled by the beam. `err_ra` and `err_dec` keep the engine's values.
/// Sources without a usable signal to noise are returned unchanged.
pub fn condon_errors(source: &Source, theta_n: Option<f64>) -> Source {
    let mut out = source.clone();
    let Some(theta_n) = theta_n else {
        out.err_peak_flux = 0.0;
        out.err_int_flux = 0.0;
        out.err_a = 0.0;
        out.err_b = 0.0;
        out.err_pa = 0.0;
        return out;
    };

    let snr = source.peak_flux / source.local_rms;
    if !snr.is_finite() || snr == 0.0 || theta_n <= 0.0 {
        return out;
    }

    let major = source.a / 3600.0;
    let minor = source.b / 3600.0;
    let phi = source.pa.to_radians();

    let smoothing = major * minor / (theta_n * theta_n);
    let factor1 = 1.0 + major / theta_n;
    let factor2 = 1.0 + minor / theta_n;
    let rho2 = |term: Term| {
        let (alpha1, alpha2) = term.alphas();
        smoothing / 4.0 * factor1.powf(alpha1) * factor2.powf(alpha2) * snr * snr
    };

    out.err_peak_flux = (source.peak_flux * (2.0 / rho2(Term::Amplitude)).sqrt()).abs();
    out.err_a = major * (2.0 / rho2(Term::Major)).sqrt() * 3600.0;
    out.err_b = minor * (2.0 / rho2(Term::Minor)).sqrt() * 3600.0;

    let err_x2 = 2.0 / rho2(Term::X) * major * major / (8.0 * 2f64.ln());
    let err_y2 = 2.0 / rho2(Term::Y) * minor * minor / (8.0 * 2f64.ln());
    let (sin_phi, cos_phi) = phi.sin_cos();
    out.err_ra = (err_x2 * sin_phi * sin_phi + err_y2 * cos_phi * cos_phi).sqrt();
    out.err_dec = (err_x2 * cos_phi * cos_phi + err_y2 * sin_phi * sin_phi).sqrt();

    out.err_pa = if major == 0.0 || minor == 0.0 {
        ERR_MASK
    } else if (2.0 * (major - minor) / (major + minor)).abs() < 0.01 {
        // Near-circular: the angle is undefined
        ERR_MASK
    } else {
        ((4.0 / rho2(Term::Pa)).sqrt() * (major * minor / (major * major - minor * minor)))
            .to_degrees()
    };

    let mut err2 = (out.err_peak_flux / source.peak_flux).powi(2);
    if source.a > 0.0 && source.b > 0.0 {
        err2 += (theta_n * theta_n / (major * minor))
            * ((out.err_a / source.a).powi(2) + (out.err_b / source.b).powi(2));
    }
    out.err_int_flux = (source.int_flux * err2.sqrt()).abs();
    out
}

/// Corrected copy of `sources`. Island summaries pass through untouched.
pub fn apply_condon(sources: &[Source], theta_n: Option<f64>) -> Vec<Source> {
    sources
        .iter()
        .map(|source| match source.kind {
            SourceKind::Component => condon_errors(source, theta_n),
            SourceKind::Island => source.clone(),
        })
        .collect()
}

/// Apply the requested corrections.
///
/// With `apply_condon_errors` unset this returns `sources` as given.
pub fn postprocess(
    sources: Vec<Source>,
    options: &OptionSet,
    theta_n: Option<f64>,
    report: &mut RunReport,
) -> Vec<Source> {
    if !options.apply_condon_errors {
        return sources;
    }
    if theta_n.is_none() {
        report.advise(Advisory::NoBeamForCondon);
    }
    log::debug!("applying Condon errors to {} sources", sources.len());
    apply_condon(&sources, theta_n)
}

/// Write `sources` to every requested table.
///
/// Components go to `<stem>_comp.<ext>` and island summaries to
/// `<stem>_isle.<ext>`. Returns the files written.
pub fn write_tables(
    sources: &[Source],
    tables: &[PathBuf],
    sink: &mut dyn CatalogSink,
    meta: &CatalogMeta,
) -> Result<Vec<PathBuf>, CatalogError> {
    let mut written = Vec::new();
    if sources.is_empty() || tables.is_empty() {
        return Ok(written);
    }

    let components: Vec<Source> = sources.iter().filter(|s| s.is_component()).cloned().collect();
    let islands: Vec<Source> = sources.iter().filter(|s| s.is_island()).cloned().collect();

    for table in tables {
        let format = format_of(table);
        for (kind, rows) in [
            (SourceKind::Component, &components),
            (SourceKind::Island, &islands),
        ] {
            if rows.is_empty() {
                continue;
            }
            let path = table_path_for(table, kind);
            sink.write(&path, &format, rows, meta)?;
            log::info!("wrote {} rows to {}", rows.len(), path.display());
            written.push(path);
        }
    }
    Ok(written)
}
