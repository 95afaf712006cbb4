//! Companion file resolution.
//!
//! Background, noise, region and PSF files can be given explicitly or, with
//! `--autoload`, found next to the image by naming convention:
//!
//! | kind       | companion            |
//! |------------|----------------------|
//! | background | `<base>_bkg.fits`    |
//! | noise      | `<base>_rms.fits`    |
//! | region     | `<base>.mim`         |
//! | psf        | `<base>_psf.fits`    |
//!
//! where `<base>` is the image path without its extension. Discovery only
//! fills gaps; a path the user supplied is never replaced.

use std::path::{Path, PathBuf};

use crate::error::{RadfindError, ValidationError};
use crate::options::OptionSet;
use crate::region::Capabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxKind {
    Background,
    Noise,
    Region,
    Psf,
}

impl AuxKind {
    pub const ALL: [AuxKind; 4] = [
        AuxKind::Background,
        AuxKind::Noise,
        AuxKind::Region,
        AuxKind::Psf,
    ];

    /// Command-line option that sets this file.
    pub fn option_name(self) -> &'static str {
        match self {
            AuxKind::Background => "--background",
            AuxKind::Noise => "--noise",
            AuxKind::Region => "--region",
            AuxKind::Psf => "--psf",
        }
    }

    /// Suffix appended to the image base name when looking for a companion.
    pub fn companion_suffix(self) -> &'static str {
        match self {
            AuxKind::Background => "_bkg.fits",
            AuxKind::Noise => "_rms.fits",
            AuxKind::Region => ".mim",
            AuxKind::Psf => "_psf.fits",
        }
    }

    fn user_value(self, options: &OptionSet) -> Option<&PathBuf> {
        match self {
            AuxKind::Background => options.background_image.as_ref(),
            AuxKind::Noise => options.noise_image.as_ref(),
            AuxKind::Region => options.region_mask.as_ref(),
            AuxKind::Psf => options.psf_image.as_ref(),
        }
    }
}

/// Where an auxiliary path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxOrigin {
    /// Given on the command line; authoritative
    User,
    /// Found by `--autoload`; best effort
    Discovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxPath {
    pub path: PathBuf,
    pub origin: AuxOrigin,
}

/// Resolved auxiliary inputs for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxFileSet {
    pub background: Option<AuxPath>,
    pub noise: Option<AuxPath>,
    pub region: Option<AuxPath>,
    pub psf: Option<AuxPath>,
}

impl AuxFileSet {
    pub fn get(&self, kind: AuxKind) -> Option<&AuxPath> {
        match kind {
            AuxKind::Background => self.background.as_ref(),
            AuxKind::Noise => self.noise.as_ref(),
            AuxKind::Region => self.region.as_ref(),
            AuxKind::Psf => self.psf.as_ref(),
        }
    }

    fn slot(&mut self, kind: AuxKind) -> &mut Option<AuxPath> {
        match kind {
            AuxKind::Background => &mut self.background,
            AuxKind::Noise => &mut self.noise,
            AuxKind::Region => &mut self.region,
            AuxKind::Psf => &mut self.psf,
        }
    }

    pub fn path(&self, kind: AuxKind) -> Option<&Path> {
        self.get(kind).map(|aux| aux.path.as_path())
    }

    /// Copy the resolved paths back into `options`.
    ///
    /// Only empty fields are written, so user values survive untouched.
    pub fn apply_to(&self, options: &mut OptionSet) {
        let fill = |slot: &mut Option<PathBuf>, aux: &Option<AuxPath>| {
            if slot.is_none() {
                *slot = aux.as_ref().map(|aux| aux.path.clone());
            }
        };
        fill(&mut options.background_image, &self.background);
        fill(&mut options.noise_image, &self.noise);
        fill(&mut options.region_mask, &self.region);
        fill(&mut options.psf_image, &self.psf);
    }
}

/// Image path with its extension removed.
pub fn image_base_name(image: &Path) -> PathBuf {
    image.with_extension("")
}

/// Candidate companion path for `kind`.
pub fn companion_path(image: &Path, kind: AuxKind) -> PathBuf {
    let base = image_base_name(image);
    let mut name = base.into_os_string();
    name.push(kind.companion_suffix());
    PathBuf::from(name)
}

/// Resolve companion files for `image`.
///
/// User supplied paths are carried over as-is. With `autoload`, the
/// remaining slots are filled by companions that exist on disk.
pub fn resolve_aux_files(image: &Path, options: &OptionSet, autoload: bool) -> AuxFileSet {
    resolve_aux_files_with(image, options, autoload, |path| path.exists())
}

/// Same as [`resolve_aux_files`] with an explicit existence probe.
pub fn resolve_aux_files_with<F>(
    image: &Path,
    options: &OptionSet,
    autoload: bool,
    exists: F,
) -> AuxFileSet
where
    F: Fn(&Path) -> bool,
{
    let mut aux = AuxFileSet::default();

    for kind in AuxKind::ALL {
        if let Some(path) = kind.user_value(options) {
            *aux.slot(kind) = Some(AuxPath {
                path: path.clone(),
                origin: AuxOrigin::User,
            });
            continue;
        }
        if !autoload {
            continue;
        }
        let candidate = companion_path(image, kind);
        if exists(&candidate) {
            log::info!(
                "autoload: using {} for {}",
                candidate.display(),
                kind.option_name()
            );
            *aux.slot(kind) = Some(AuxPath {
                path: candidate,
                origin: AuxOrigin::Discovered,
            });
        }
    }

    aux
}

/// Check every resolved path exists and that required capabilities are present.
///
/// Missing user paths are errors. Missing discovered paths are dropped.
pub fn validate_aux_files(
    mut aux: AuxFileSet,
    capabilities: &Capabilities,
) -> Result<AuxFileSet, RadfindError> {
    validate_aux_files_with(&mut aux, capabilities, |path| path.exists())?;
    Ok(aux)
}

/// Same as [`validate_aux_files`] with an explicit existence probe.
pub fn validate_aux_files_with<F>(
    aux: &mut AuxFileSet,
    capabilities: &Capabilities,
    exists: F,
) -> Result<(), RadfindError>
where
    F: Fn(&Path) -> bool,
{
    for kind in AuxKind::ALL {
        let slot = aux.slot(kind);
        let Some(AuxPath { path, origin }) = slot.clone() else {
            continue;
        };
        if exists(&path) {
            continue;
        }
        match origin {
            AuxOrigin::User => {
                return Err(ValidationError::FileNotFound {
                    option: kind.option_name(),
                    path,
                }
                .into());
            }
            AuxOrigin::Discovered => {
                log::debug!("autoload candidate {} vanished", path.display());
                *slot = None;
            }
        }
    }

    if aux.region.is_some() {
        capabilities.require_regions()?;
    }

    Ok(())
}
