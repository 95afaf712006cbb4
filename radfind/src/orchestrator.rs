//! Run orchestration.
//!
//! [`RunOrchestrator::execute`] turns an [`OptionSet`] into work:
//!
//! 1. select the run plan; terminal plans return immediately
//! 2. validate options and the priorized inputs
//! 3. resolve the core count; `--blankout` turns `auto` into one core and
//!    rejects an explicit count above one
//! 4. resolve companion files, then projection and telescope hints
//! 5. save background and noise, or
//! 6. check table formats, open the listing, run PriorizedFit then Find
//! 7. post-process and write tables
//!
//! Every check that does not need pixels runs before the engine is called.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::advisory::{Advisory, RunReport};
use crate::aux_files::{image_base_name, resolve_aux_files, validate_aux_files};
use crate::engine::{Engine, EngineConfig, IslandEngine};
use crate::error::{RadfindError, ValidationError};
use crate::io::catalog::{
    check_table_formats, read_catalog, CatalogError, CatalogMeta, CatalogSink, TableWriter,
};
use crate::io::fits::{FitsHeaderReader, HeaderSource};
use crate::io::output::OutputDestination;
use crate::mode::{select_mode, RunPlan, Stage};
use crate::options::{CoreCount, OptionSet};
use crate::postprocess::{postprocess, resolve_theta_n, write_tables};
use crate::projection::{advise_projection, apply_advice};
use crate::region::Capabilities;
use crate::source::Source;
use crate::telescope::telescope_to_latitude;

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    ShowFormats,
    ShowVersions,
    ShowHelp,
    NothingToFind,
    BackgroundSaved {
        background: PathBuf,
        noise: PathBuf,
        report: RunReport,
    },
    Detected {
        sources: Vec<Source>,
        tables: Vec<PathBuf>,
        report: RunReport,
    },
}

impl Outcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Outcome::BackgroundSaved { report, .. } | Outcome::Detected { report, .. } => {
                Some(report)
            }
            _ => None,
        }
    }
}

/// Effective worker count.
///
/// `--debug` always runs on one core. A fixed request above `platform_max` is
/// clamped and reported.
pub fn resolve_cores(
    requested: CoreCount,
    debug: bool,
    platform_max: usize,
) -> (usize, Option<Advisory>) {
    let platform_max = platform_max.max(1);
    if debug {
        return (1, None);
    }
    match requested {
        CoreCount::Auto => (platform_max, None),
        CoreCount::Fixed(n) if n.get() > platform_max => (
            platform_max,
            Some(Advisory::CoresClamped {
                requested: n.get(),
                allowed: platform_max,
            }),
        ),
        CoreCount::Fixed(n) => (n.get(), None),
    }
}

/// Where `--blankout` writes the blanked image of `image`.
pub fn blanked_image_path(image: &Path) -> PathBuf {
    let mut name = image_base_name(image).into_os_string();
    name.push("_blank.fits");
    PathBuf::from(name)
}

/// Drives one run against an engine, a header source and a catalog sink.
pub struct RunOrchestrator<E, H, C> {
    engine: E,
    header: H,
    sink: C,
    capabilities: Capabilities,
    platform_cores: usize,
    listing: Option<OutputDestination>,
}

impl RunOrchestrator<IslandEngine, FitsHeaderReader, TableWriter> {
    /// Orchestrator wired to the bundled engine and file writers.
    pub fn standard() -> Self {
        Self::new(IslandEngine::new(), FitsHeaderReader, TableWriter)
    }
}

impl<E, H, C> RunOrchestrator<E, H, C>
where
    E: Engine,
    H: HeaderSource,
    C: CatalogSink,
{
    pub fn new(engine: E, header: H, sink: C) -> Self {
        Self {
            engine,
            header,
            sink,
            capabilities: Capabilities::detect(),
            platform_cores: num_cpus::get(),
            listing: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_platform_cores(mut self, cores: usize) -> Self {
        self.platform_cores = cores;
        self
    }

    /// Send the listing to `listing` instead of the `--out` destination.
    pub fn with_listing(mut self, listing: OutputDestination) -> Self {
        self.listing = Some(listing);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn sink(&self) -> &C {
        &self.sink
    }

    pub fn execute(&mut self, mut options: OptionSet) -> Result<Outcome, RadfindError> {
        let plan = select_mode(&options, |path| path.exists())?;
        log::debug!("run plan: {plan:?}");
        match plan {
            RunPlan::ShowFormats => return Ok(Outcome::ShowFormats),
            RunPlan::ShowVersions => return Ok(Outcome::ShowVersions),
            RunPlan::ShowHelp => return Ok(Outcome::ShowHelp),
            RunPlan::NothingToFind => {
                log::warn!("nothing to find: --nopositive given without --negative");
                return Ok(Outcome::NothingToFind);
            }
            RunPlan::SaveBackground | RunPlan::Detect(_) => {}
        }
        let Some(image) = options.input_image.clone() else {
            return Ok(Outcome::ShowHelp);
        };

        let mut report = RunReport::new();
        report.extend(options.validate()?);

        let catalog = if plan.includes(Stage::PriorizedFit) {
            Some(self.check_priorized(&mut options, &mut report)?)
        } else {
            None
        };

        let blanking = plan.includes(Stage::Find) && options.blank_output;
        let requested = match options.cores {
            CoreCount::Auto if blanking => {
                log::info!("--blankout runs on a single core");
                CoreCount::Fixed(NonZeroUsize::MIN)
            }
            requested => requested,
        };
        let (cores, clamped) = resolve_cores(requested, options.debug, self.platform_cores);
        if let Some(advisory) = clamped {
            report.advise(advisory);
        }
        log::info!("using {cores} core(s)");
        if blanking && cores > 1 {
            return Err(ValidationError::BlankingRequiresSingleCore { cores }.into());
        }

        let aux = resolve_aux_files(&image, &options, options.autoload);
        let aux = validate_aux_files(aux, &self.capabilities)?;
        aux.apply_to(&mut options);

        let advice = advise_projection(&self.header, &image, options.hdu_index, &options)?;
        apply_advice(&mut options, &advice);
        report.extend(advice);
        self.resolve_latitude(&mut options, &mut report);

        if options.debug {
            if let Ok(json) = serde_json::to_string(&options) {
                log::debug!("resolved options: {json}");
            }
        }
        let config = EngineConfig::from_options(&options, cores);

        if plan == RunPlan::SaveBackground {
            let (background, noise) = self.engine.save_background(&image, &config)?;
            return Ok(Outcome::BackgroundSaved {
                background,
                noise,
                report,
            });
        }

        check_table_formats(&options.table_output_spec, &self.sink)?;

        let mut listing = match self.listing.take() {
            Some(listing) => listing,
            None => OutputDestination::open(options.listing_destination())?,
        };

        let mut sources = Vec::new();
        for stage in plan.stages() {
            let found = match stage {
                Stage::PriorizedFit => {
                    let catalog = catalog.as_deref().ok_or(ValidationError::MissingInputCatalog)?;
                    self.engine.priorized_fit(&image, catalog, &config)?
                }
                Stage::Find => {
                    let found = self.engine.find_sources(&image, &config)?;
                    if options.blank_output {
                        self.engine.save_blanked_image(&blanked_image_path(&image))?;
                    }
                    found
                }
            };
            log::info!("{stage:?}: {} sources", found.len());
            listing.write_sources(&found)?;
            sources.extend(found);
        }
        listing.flush()?;
        if sources.is_empty() {
            log::info!("no sources found in {}", image.display());
        }

        let theta_n = if options.apply_condon_errors {
            resolve_theta_n(&options, &self.header, &image)?
        } else {
            None
        };
        let sources = postprocess(sources, &options, theta_n, &mut report);

        let meta = CatalogMeta::for_image(&image);
        let tables = write_tables(&sources, &options.table_output_spec, &mut self.sink, &meta)?;

        Ok(Outcome::Detected {
            sources,
            tables,
            report,
        })
    }

    /// Checks for priorized fitting that need no pixels. Returns the catalog.
    fn check_priorized(
        &self,
        options: &mut OptionSet,
        report: &mut RunReport,
    ) -> Result<PathBuf, RadfindError> {
        let catalog = options
            .priorized_input_catalog
            .clone()
            .ok_or(ValidationError::MissingInputCatalog)?;
        if !catalog.exists() {
            return Err(ValidationError::FileNotFound {
                option: "--input",
                path: catalog,
            }
            .into());
        }
        match read_catalog(&catalog) {
            Ok(priors) => log::debug!("{} lists {} sources", catalog.display(), priors.len()),
            Err(CatalogError::Empty(path)) => {
                return Err(ValidationError::EmptyInputCatalog(path).into())
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(ratio) = options.resize_ratio {
            if !(ratio > 0.0) {
                return Err(ValidationError::NonPositiveRatio(ratio).into());
            }
            if ratio < 1.0 {
                report.advise(Advisory::SmallResizeRatio { ratio });
            }
        }

        if options.do_island_flux {
            report.advise(Advisory::IslandFluxUnsupported);
            options.do_island_flux = false;
        }
        Ok(catalog)
    }

    /// Fill the latitude from the telescope name unless given explicitly.
    fn resolve_latitude(&self, options: &mut OptionSet, report: &mut RunReport) {
        if options.latitude.is_some() {
            return;
        }
        let Some(telescope) = options.telescope.as_deref() else {
            return;
        };
        match telescope_to_latitude(telescope) {
            Some(lat) => {
                log::debug!("telescope {telescope} is at latitude {lat}");
                options.latitude = Some(lat);
            }
            None => report.advise(Advisory::UnknownTelescope {
                telescope: telescope.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_cores() {
        assert_eq!(resolve_cores(CoreCount::Auto, false, 8), (8, None));
        assert_eq!(resolve_cores(CoreCount::Auto, true, 8), (1, None));

        let four = CoreCount::Fixed(NonZeroUsize::new(4).unwrap());
        assert_eq!(resolve_cores(four, false, 8), (4, None));
        assert_eq!(resolve_cores(four, true, 8), (1, None));
        assert_eq!(
            resolve_cores(four, false, 2),
            (
                2,
                Some(Advisory::CoresClamped {
                    requested: 4,
                    allowed: 2
                })
            )
        );
        assert_eq!(resolve_cores(CoreCount::Auto, false, 0), (1, None));
    }

    #[test]
    fn test_blanked_image_path() {
        assert_eq!(
            blanked_image_path(Path::new("data/field.fits")),
            PathBuf::from("data/field_blank.fits")
        );
    }
}
