//! Mode selection.
//!
//! Turns an [`OptionSet`] into a [`RunPlan`]. Selection is a pure decision:
//! the only outside fact it needs, whether the input image exists, comes in
//! through a probe closure so the caller decides how the filesystem is seen.
//!
//! Decision order, first terminal match wins:
//!
//! 1. `--tformats` → [`RunPlan::ShowFormats`]
//! 2. `--versions` → [`RunPlan::ShowVersions`]
//! 3. no image → [`RunPlan::ShowHelp`]
//! 4. image missing → [`SelectionError::ImageNotFound`]
//! 5. `--nopositive` without `--negative` → [`RunPlan::NothingToFind`]
//! 6. `--measure` without `--priorized` → [`SelectionError::UnsupportedCombination`]
//! 7. `--save` → [`RunPlan::SaveBackground`]
//! 8. otherwise [`RunPlan::Detect`] with PriorizedFit then Find as selected

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::options::OptionSet;

/// A detection stage. Stages always run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    PriorizedFit,
    Find,
}

/// What a run will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPlan {
    ShowFormats,
    ShowVersions,
    ShowHelp,
    /// No positive and no negative sources requested; clean exit
    NothingToFind,
    /// Write background and noise images only
    SaveBackground,
    /// Run the listed stages in order
    Detect(Vec<Stage>),
}

impl RunPlan {
    /// True for plans that end the process without touching the image.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPlan::ShowFormats | RunPlan::ShowVersions | RunPlan::ShowHelp | RunPlan::NothingToFind
        )
    }

    pub fn stages(&self) -> &[Stage] {
        match self {
            RunPlan::Detect(stages) => stages,
            _ => &[],
        }
    }

    pub fn includes(&self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("{} not found", .0.display())]
    ImageNotFound(PathBuf),

    #[error("{0}")]
    UnsupportedCombination(String),
}

/// Whether the Find stage runs.
///
/// An explicit `--find` always wins. Otherwise any of `--measure`, `--save`
/// or `--priorized` switches it off.
pub fn effective_find(options: &OptionSet) -> bool {
    if options.find_requested() {
        return true;
    }
    if let Some(explicit) = options.find {
        return explicit;
    }
    !(options.measure || options.save || options.priorized_stage > 0)
}

/// Select the run plan for `options`.
pub fn select_mode<F>(options: &OptionSet, image_exists: F) -> Result<RunPlan, SelectionError>
where
    F: Fn(&Path) -> bool,
{
    if options.table_formats_requested {
        return Ok(RunPlan::ShowFormats);
    }
    if options.file_versions_requested {
        return Ok(RunPlan::ShowVersions);
    }

    let image = match &options.input_image {
        Some(image) => image,
        None => return Ok(RunPlan::ShowHelp),
    };
    if !image_exists(image) {
        return Err(SelectionError::ImageNotFound(image.clone()));
    }

    if options.no_positive && !options.negative {
        return Ok(RunPlan::NothingToFind);
    }

    if options.measure && options.priorized_stage == 0 {
        return Err(SelectionError::UnsupportedCombination(
            "--measure without --priorized is not supported".to_string(),
        ));
    }

    if options.save {
        return Ok(RunPlan::SaveBackground);
    }

    let mut stages = Vec::with_capacity(2);
    if options.priorized_stage > 0 {
        stages.push(Stage::PriorizedFit);
    }
    if effective_find(options) {
        stages.push(Stage::Find);
    }
    Ok(RunPlan::Detect(stages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exists(_: &Path) -> bool {
        true
    }

    fn missing(_: &Path) -> bool {
        false
    }

    fn with_image() -> OptionSet {
        OptionSet::for_image("image.fits")
    }

    #[test]
    fn test_formats_win_over_everything() {
        let options = OptionSet {
            table_formats_requested: true,
            file_versions_requested: true,
            save: true,
            measure: true,
            no_positive: true,
            ..with_image()
        };
        assert_eq!(select_mode(&options, missing), Ok(RunPlan::ShowFormats));
        assert_eq!(
            select_mode(&OptionSet { input_image: None, ..options }, exists),
            Ok(RunPlan::ShowFormats)
        );
    }

    #[test]
    fn test_versions_before_help() {
        let options = OptionSet {
            file_versions_requested: true,
            ..Default::default()
        };
        assert_eq!(select_mode(&options, exists), Ok(RunPlan::ShowVersions));
    }

    #[test]
    fn test_no_image_shows_help() {
        assert_eq!(
            select_mode(&OptionSet::default(), exists),
            Ok(RunPlan::ShowHelp)
        );
    }

    #[test]
    fn test_missing_image() {
        assert_eq!(
            select_mode(&with_image(), missing),
            Err(SelectionError::ImageNotFound(PathBuf::from("image.fits")))
        );
    }

    #[test]
    fn test_nothing_to_find() {
        let options = OptionSet {
            no_positive: true,
            ..with_image()
        };
        assert_eq!(select_mode(&options, exists), Ok(RunPlan::NothingToFind));

        let options = OptionSet {
            no_positive: true,
            negative: true,
            ..with_image()
        };
        assert_eq!(
            select_mode(&options, exists),
            Ok(RunPlan::Detect(vec![Stage::Find]))
        );
    }

    #[test]
    fn test_default_is_find() {
        assert_eq!(
            select_mode(&with_image(), exists),
            Ok(RunPlan::Detect(vec![Stage::Find]))
        );
    }

    #[test]
    fn test_save_suppresses_detection() {
        for find in [None, Some(true)] {
            for priorized_stage in [0, 1, 3] {
                let options = OptionSet {
                    save: true,
                    find,
                    priorized_stage,
                    ..with_image()
                };
                let plan = select_mode(&options, exists).unwrap();
                assert_eq!(plan, RunPlan::SaveBackground);
                assert!(plan.stages().is_empty());
            }
        }
    }

    #[test]
    fn test_priorized_without_find() {
        let options = OptionSet {
            priorized_stage: 1,
            ..with_image()
        };
        assert_eq!(
            select_mode(&options, exists),
            Ok(RunPlan::Detect(vec![Stage::PriorizedFit]))
        );
    }

    #[test]
    fn test_priorized_with_explicit_find_runs_both_in_order() {
        let options = OptionSet {
            priorized_stage: 2,
            find: Some(true),
            ..with_image()
        };
        assert_eq!(
            select_mode(&options, exists),
            Ok(RunPlan::Detect(vec![Stage::PriorizedFit, Stage::Find]))
        );
    }

    #[test]
    fn test_measure_requires_priorized() {
        let options = OptionSet {
            measure: true,
            ..with_image()
        };
        assert!(matches!(
            select_mode(&options, exists),
            Err(SelectionError::UnsupportedCombination(_))
        ));

        let options = OptionSet {
            measure: true,
            priorized_stage: 1,
            ..with_image()
        };
        assert_eq!(
            select_mode(&options, exists),
            Ok(RunPlan::Detect(vec![Stage::PriorizedFit]))
        );
    }

    #[test]
    fn test_effective_find_table() {
        let base = with_image();
        assert!(effective_find(&base));
        assert!(!effective_find(&OptionSet { save: true, ..base.clone() }));
        assert!(!effective_find(&OptionSet { measure: true, ..base.clone() }));
        assert!(!effective_find(&OptionSet {
            priorized_stage: 1,
            ..base.clone()
        }));
        assert!(effective_find(&OptionSet {
            priorized_stage: 1,
            find: Some(true),
            ..base.clone()
        }));
        assert!(effective_find(&OptionSet {
            save: true,
            measure: true,
            find: Some(true),
            ..base
        }));
    }

    #[test]
    fn test_terminal_plans() {
        assert!(RunPlan::ShowHelp.is_terminal());
        assert!(RunPlan::NothingToFind.is_terminal());
        assert!(!RunPlan::SaveBackground.is_terminal());
        assert!(!RunPlan::Detect(vec![Stage::Find]).is_terminal());
        assert!(RunPlan::Detect(vec![Stage::PriorizedFit, Stage::Find]).includes(Stage::Find));
    }
}
