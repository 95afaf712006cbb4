//! Non-fatal conditions reported while planning a run.
//!
//! Advisories never stop a run. Components hand them back as values and the
//! [`RunReport`] records them, logging each one as it arrives.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    /// ZEA image with no telescope, latitude or PSF map
    ZeaNeedsBeamHint,
    /// Telescope given for a SIN image; the hint is dropped
    TelescopeUnnecessary { telescope: String },
    /// Latitude given for a SIN image; the hint is dropped
    LatitudeUnnecessary { latitude: f64 },
    /// Telescope name not present in the lookup table
    UnknownTelescope { telescope: String },
    /// Priorized resize ratio below one
    SmallResizeRatio { ratio: f64 },
    /// `--island` cannot be combined with priorized fitting
    IslandFluxUnsupported,
    /// Requested core count exceeded what the platform offers
    CoresClamped { requested: usize, allowed: usize },
    /// Flood clip was above the seed clip and has been lowered
    FloodClipLowered { inner: f64, outer: f64 },
    /// Condon errors requested but no beam is known
    NoBeamForCondon,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::ZeaNeedsBeamHint => write!(
                f,
                "image has a ZEA projection: supply --telescope, --lat or --psf \
                 for accurate beam sizes at high declination"
            ),
            Advisory::TelescopeUnnecessary { telescope } => write!(
                f,
                "image has a SIN projection: telescope '{telescope}' is not needed and will be ignored"
            ),
            Advisory::LatitudeUnnecessary { latitude } => write!(
                f,
                "image has a SIN projection: latitude {latitude} is not needed and will be ignored"
            ),
            Advisory::UnknownTelescope { telescope } => {
                write!(f, "telescope '{telescope}' is unknown, latitude left unset")
            }
            Advisory::SmallResizeRatio { ratio } => {
                write!(f, "ratio {ratio} < 1 is not advised, shapes will shrink")
            }
            Advisory::IslandFluxUnsupported => {
                write!(f, "--island is not supported with priorized fitting, ignoring")
            }
            Advisory::CoresClamped { requested, allowed } => {
                write!(f, "requested {requested} cores but only {allowed} are available, using {allowed}")
            }
            Advisory::FloodClipLowered { inner, outer } => write!(
                f,
                "flood clip {outer} is above seed clip {inner}, using {inner} for both"
            ),
            Advisory::NoBeamForCondon => {
                write!(f, "no beam available for Condon errors, uncertainties set to zero")
            }
        }
    }
}

/// Record of everything noteworthy that happened while planning and running.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    advisories: Vec<Advisory>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an advisory and log it.
    pub fn advise(&mut self, advisory: Advisory) {
        log::warn!("{advisory}");
        self.advisories.push(advisory);
    }

    pub fn extend<I: IntoIterator<Item = Advisory>>(&mut self, advisories: I) {
        for advisory in advisories {
            self.advise(advisory);
        }
    }

    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    pub fn contains(&self, advisory: &Advisory) -> bool {
        self.advisories.contains(advisory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_keeps_order() {
        let mut report = RunReport::new();
        report.advise(Advisory::ZeaNeedsBeamHint);
        report.advise(Advisory::SmallResizeRatio { ratio: 0.5 });

        assert_eq!(report.advisories().len(), 2);
        assert_eq!(report.advisories()[0], Advisory::ZeaNeedsBeamHint);
        assert!(report.contains(&Advisory::SmallResizeRatio { ratio: 0.5 }));
    }

    #[test]
    fn test_display_mentions_telescope() {
        let advisory = Advisory::TelescopeUnnecessary {
            telescope: "MWA".to_string(),
        };
        assert!(advisory.to_string().contains("MWA"));
    }
}
