//! Common utilities for radfind integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use radfind::engine::{Engine, EngineConfig, EngineError};
use radfind::io::{
    CatalogError, CatalogMeta, CatalogSink, FitsError, HeaderSource, HeaderValue, TableWriter,
};
use radfind::orchestrator::RunOrchestrator;
use radfind::region::Capabilities;
use radfind::source::{Source, SourceKind};
use radfind::OptionSet;
use tempfile::TempDir;

/// Engine calls recorded by [`MockEngine`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Find,
    Priorized { catalog: PathBuf },
    SaveBackground,
    SaveBlanked(PathBuf),
}

/// Engine that returns canned sources and records every call
#[derive(Debug, Default)]
pub struct MockEngine {
    pub calls: Vec<Call>,
    pub configs: Vec<EngineConfig>,
    pub found: Vec<Source>,
    pub priorized: Vec<Source>,
}

impl MockEngine {
    pub fn with_sources(found: Vec<Source>) -> Self {
        Self {
            found,
            ..Default::default()
        }
    }
}

impl Engine for MockEngine {
    fn find_sources(
        &mut self,
        _image: &Path,
        config: &EngineConfig,
    ) -> Result<Vec<Source>, EngineError> {
        self.calls.push(Call::Find);
        self.configs.push(config.clone());
        Ok(self.found.clone())
    }

    fn priorized_fit(
        &mut self,
        _image: &Path,
        catalog: &Path,
        config: &EngineConfig,
    ) -> Result<Vec<Source>, EngineError> {
        self.calls.push(Call::Priorized {
            catalog: catalog.to_path_buf(),
        });
        self.configs.push(config.clone());
        Ok(self.priorized.clone())
    }

    fn save_background(
        &mut self,
        image: &Path,
        config: &EngineConfig,
    ) -> Result<(PathBuf, PathBuf), EngineError> {
        self.calls.push(Call::SaveBackground);
        self.configs.push(config.clone());
        Ok(radfind::engine::background_paths(
            image,
            config.output_base.as_deref(),
        ))
    }

    fn save_blanked_image(&mut self, path: &Path) -> Result<(), EngineError> {
        self.calls.push(Call::SaveBlanked(path.to_path_buf()));
        Ok(())
    }
}

/// Header with fixed keyword values
#[derive(Debug, Default, Clone)]
pub struct MockHeader {
    pub keys: HashMap<String, HeaderValue>,
}

impl MockHeader {
    pub fn projection(ctype: &str) -> Self {
        Self::default().with_text("CTYPE1", ctype)
    }

    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.keys
            .insert(key.to_string(), HeaderValue::Text(value.to_string()));
        self
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.keys.insert(key.to_string(), HeaderValue::Number(value));
        self
    }
}

impl HeaderSource for MockHeader {
    fn header_field(
        &self,
        _image: &Path,
        _hdu: usize,
        key: &str,
    ) -> Result<Option<HeaderValue>, FitsError> {
        Ok(self.keys.get(key).cloned())
    }
}

/// Sink that records what it was asked to write
#[derive(Debug, Clone)]
pub struct MockSink {
    pub formats: Vec<&'static str>,
    pub written: Vec<(PathBuf, String, Vec<Source>)>,
}

impl Default for MockSink {
    fn default() -> Self {
        Self {
            formats: vec!["csv", "json", "reg"],
            written: Vec::new(),
        }
    }
}

impl CatalogSink for MockSink {
    fn supported_formats(&self) -> Vec<&'static str> {
        self.formats.clone()
    }

    fn write(
        &mut self,
        path: &Path,
        format: &str,
        sources: &[Source],
        _meta: &CatalogMeta,
    ) -> Result<(), CatalogError> {
        self.written
            .push((path.to_path_buf(), format.to_string(), sources.to_vec()));
        Ok(())
    }
}

/// Scratch directory holding an (empty) image file
pub struct Workspace {
    pub dir: TempDir,
    pub image: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("field.fits");
        fs::write(&image, b"").unwrap();
        Self { dir, image }
    }

    /// Create an empty file next to the image
    pub fn touch(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    /// Write `sources` as a JSON catalog next to the image
    pub fn catalog(&self, name: &str, sources: &[Source]) -> PathBuf {
        let path = self.dir.path().join(name);
        TableWriter
            .write(&path, "json", sources, &CatalogMeta::for_image(&self.image))
            .unwrap();
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Options for a run on the image with the listing switched off
    pub fn options(&self) -> OptionSet {
        OptionSet {
            output_catalog_path: "none".to_string(),
            ..OptionSet::for_image(&self.image)
        }
    }
}

pub type MockOrchestrator = RunOrchestrator<MockEngine, MockHeader, MockSink>;

pub fn orchestrator(engine: MockEngine, header: MockHeader) -> MockOrchestrator {
    let _ = env_logger::builder().is_test(true).try_init();
    RunOrchestrator::new(engine, header, MockSink::default())
        .with_capabilities(Capabilities::all())
        .with_platform_cores(4)
}

/// A bright, well resolved component
pub fn component(island: usize) -> Source {
    Source {
        island,
        ra: 150.0 + island as f64 * 0.1,
        dec: -30.0,
        peak_flux: 1.0,
        err_peak_flux: 0.02,
        local_rms: 0.01,
        int_flux: 1.5,
        err_int_flux: 0.03,
        a: 180.0,
        err_a: 3.0,
        b: 120.0,
        err_b: 2.0,
        pa: 30.0,
        err_pa: 1.0,
        err_ra: 0.001,
        err_dec: 0.001,
        ..Default::default()
    }
}

pub fn island_summary(island: usize) -> Source {
    Source {
        kind: SourceKind::Island,
        island,
        pixels: 42,
        ..component(island)
    }
}
