//! Catalog tables.
//!
//! The orchestrator only sees the [`CatalogSink`] trait. [`TableWriter`] is
//! the sink used by the command line tool and understands:
//!
//! | ext   | format                                   |
//! |-------|------------------------------------------|
//! | `csv` | comma separated values                   |
//! | `tab` | tab separated values                     |
//! | `json`| JSON document with metadata and sources  |
//! | `reg` | DS9 region file                          |
//! | `ann` | Kvis annotation file                     |

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::ValidationError;
use crate::source::{Source, SourceKind};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported catalog format '{0}'")]
    UnsupportedFormat(String),
    #[error("catalog {} contains no sources", .0.display())]
    Empty(PathBuf),
}

/// Provenance attached to every table written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMeta {
    pub program: String,
    pub version: String,
    pub image: String,
}

impl CatalogMeta {
    pub fn for_image(image: &Path) -> Self {
        Self {
            program: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            image: image
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Destination for catalog tables.
pub trait CatalogSink {
    /// File extensions this sink can write, lower case without the dot.
    fn supported_formats(&self) -> Vec<&'static str>;

    /// Write `sources` to `path` in `format`.
    fn write(
        &mut self,
        path: &Path,
        format: &str,
        sources: &[Source],
        meta: &CatalogMeta,
    ) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Tab,
    Json,
    Ds9,
    Kvis,
}

impl TableFormat {
    pub const ALL: [TableFormat; 5] = [
        TableFormat::Csv,
        TableFormat::Tab,
        TableFormat::Json,
        TableFormat::Ds9,
        TableFormat::Kvis,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Tab => "tab",
            TableFormat::Json => "json",
            TableFormat::Ds9 => "reg",
            TableFormat::Kvis => "ann",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TableFormat::Csv => "comma separated values",
            TableFormat::Tab => "tab separated values",
            TableFormat::Json => "JSON with run metadata",
            TableFormat::Ds9 => "DS9 region file",
            TableFormat::Kvis => "Kvis annotation file",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL.into_iter().find(|format| format.extension() == ext)
    }
}

/// Lower-cased extension of `path`, empty when there is none.
pub fn format_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Fail on the first requested table the sink cannot write.
pub fn check_table_formats(
    tables: &[PathBuf],
    sink: &dyn CatalogSink,
) -> Result<(), ValidationError> {
    let supported = sink.supported_formats();
    for table in tables {
        let format = format_of(table);
        if !supported.contains(&format.as_str()) {
            return Err(ValidationError::UnsupportedTableFormat {
                format,
                path: table.clone(),
            });
        }
    }
    Ok(())
}

/// Output name for the rows of `kind` requested as `table`.
///
/// `out.csv` becomes `out_comp.csv` or `out_isle.csv`.
pub fn table_path_for(table: &Path, kind: SourceKind) -> PathBuf {
    let suffix = match kind {
        SourceKind::Component => "_comp",
        SourceKind::Island => "_isle",
    };
    let stem = table
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match table.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    table.with_file_name(name)
}

/// File based [`CatalogSink`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TableWriter;

#[derive(Serialize, Deserialize)]
struct JsonCatalog {
    meta: CatalogMeta,
    sources: Vec<Source>,
}

impl CatalogSink for TableWriter {
    fn supported_formats(&self) -> Vec<&'static str> {
        TableFormat::ALL.iter().map(|format| format.extension()).collect()
    }

    fn write(
        &mut self,
        path: &Path,
        format: &str,
        sources: &[Source],
        meta: &CatalogMeta,
    ) -> Result<(), CatalogError> {
        let format = TableFormat::from_extension(format)
            .ok_or_else(|| CatalogError::UnsupportedFormat(format.to_string()))?;
        let io_err = |source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut out = BufWriter::new(file);

        match format {
            TableFormat::Csv | TableFormat::Tab => {
                let delimiter = if format == TableFormat::Csv { b',' } else { b'\t' };
                write_comment_header(&mut out, meta).map_err(io_err)?;
                write_delimited(&mut out, delimiter, sources).map_err(|source| {
                    CatalogError::Csv {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
            }
            TableFormat::Json => {
                let doc = JsonCatalog {
                    meta: meta.clone(),
                    sources: sources.to_vec(),
                };
                serde_json::to_writer_pretty(&mut out, &doc).map_err(|source| {
                    CatalogError::Json {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
            }
            TableFormat::Ds9 => write_ds9(&mut out, sources, meta).map_err(io_err)?,
            TableFormat::Kvis => write_kvis(&mut out, sources, meta).map_err(io_err)?,
        }

        out.flush().map_err(io_err)?;
        log::info!("wrote {} rows to {}", sources.len(), path.display());
        Ok(())
    }
}

fn write_comment_header<W: Write>(out: &mut W, meta: &CatalogMeta) -> std::io::Result<()> {
    writeln!(out, "# PROGRAM={}", meta.program)?;
    writeln!(out, "# VERSION={}", meta.version)?;
    writeln!(out, "# IMAGE={}", meta.image)
}

fn write_delimited<W: Write>(out: W, delimiter: u8, sources: &[Source]) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(out);
    for source in sources {
        writer.serialize(source)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_ds9<W: Write>(out: &mut W, sources: &[Source], meta: &CatalogMeta) -> std::io::Result<()> {
    writeln!(out, "# Region file format: DS9")?;
    writeln!(out, "# {} {} {}", meta.program, meta.version, meta.image)?;
    writeln!(out, "fk5")?;
    for source in sources {
        match source.kind {
            SourceKind::Component => writeln!(
                out,
                "ellipse({:.6},{:.6},{:.2}\",{:.2}\",{:.2}) # text={{{}:{}}}",
                source.ra,
                source.dec,
                source.a / 2.0,
                source.b / 2.0,
                // DS9 angles run from the x axis
                source.pa + 90.0,
                source.island,
                source.source
            )?,
            SourceKind::Island => writeln!(
                out,
                "point({:.6},{:.6}) # point=box text={{{}}}",
                source.ra, source.dec, source.island
            )?,
        }
    }
    Ok(())
}

fn write_kvis<W: Write>(out: &mut W, sources: &[Source], meta: &CatalogMeta) -> std::io::Result<()> {
    writeln!(out, "# {} {} {}", meta.program, meta.version, meta.image)?;
    writeln!(out, "COORD W")?;
    writeln!(out, "PA SKY")?;
    writeln!(out, "COLOR GREEN")?;
    for source in sources {
        match source.kind {
            SourceKind::Component => writeln!(
                out,
                "ELLIPSE W {:.6} {:.6} {:.6} {:.6} {:.2}",
                source.ra,
                source.dec,
                source.a / 3600.0 / 2.0,
                source.b / 3600.0 / 2.0,
                source.pa
            )?,
            SourceKind::Island => {
                writeln!(out, "TEXT W {:.6} {:.6} {}", source.ra, source.dec, source.island)?
            }
        }
    }
    Ok(())
}

/// Read a catalog written by [`TableWriter`] in `csv`, `tab` or `json` form.
pub fn read_catalog(path: &Path) -> Result<Vec<Source>, CatalogError> {
    let format = format_of(path);
    let sources = match TableFormat::from_extension(&format) {
        Some(TableFormat::Csv) => read_delimited(path, b',')?,
        Some(TableFormat::Tab) => read_delimited(path, b'\t')?,
        Some(TableFormat::Json) => {
            let file = File::open(path).map_err(|source| CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let doc: JsonCatalog =
                serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
                    CatalogError::Json {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
            doc.sources
        }
        _ => return Err(CatalogError::UnsupportedFormat(format)),
    };

    let components: Vec<Source> = sources.into_iter().filter(Source::is_component).collect();
    if components.is_empty() {
        return Err(CatalogError::Empty(path.to_path_buf()));
    }
    Ok(components)
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Vec<Source>, CatalogError> {
    let csv_err = |source| CatalogError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<Source>, _>>()
        .map_err(csv_err)
}
