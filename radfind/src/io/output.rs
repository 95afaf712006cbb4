//! Plain-text source listing.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::error::ValidationError;
use crate::options::STDOUT_DESTINATION;
use crate::source::Source;

/// Where the text listing goes. Opened once per run and shared by every stage.
pub enum OutputDestination {
    Stdout(io::Stdout),
    File { path: PathBuf, writer: BufWriter<File> },
    Memory(Vec<u8>),
    Discard,
}

impl OutputDestination {
    /// Open `dest`: `stdout` for standard output, anything else is a file.
    pub fn open(dest: Option<&str>) -> Result<Self, ValidationError> {
        let Some(dest) = dest else {
            return Ok(OutputDestination::Discard);
        };
        if dest.eq_ignore_ascii_case(STDOUT_DESTINATION) || dest == "-" {
            return Ok(OutputDestination::Stdout(io::stdout()));
        }
        let path = PathBuf::from(dest);
        let file = File::create(&path).map_err(|source| ValidationError::OutputUnwritable {
            path: path.clone(),
            source,
        })?;
        Ok(OutputDestination::File {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// In-memory destination, used by tests.
    pub fn memory() -> Self {
        OutputDestination::Memory(Vec::new())
    }

    fn writer(&mut self) -> Option<&mut dyn Write> {
        match self {
            OutputDestination::Stdout(stdout) => Some(stdout as &mut dyn Write),
            OutputDestination::File { writer, .. } => Some(writer as &mut dyn Write),
            OutputDestination::Memory(buffer) => Some(buffer as &mut dyn Write),
            OutputDestination::Discard => None,
        }
    }

    /// Write a block of sources under the column header.
    pub fn write_sources(&mut self, sources: &[Source]) -> io::Result<()> {
        let Some(out) = self.writer() else {
            return Ok(());
        };
        if sources.is_empty() {
            return Ok(());
        }
        writeln!(out, "{}", Source::TEXT_HEADER)?;
        for source in sources {
            writeln!(out, "{source}")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.writer() {
            Some(out) => out.flush(),
            None => Ok(()),
        }
    }

    /// Text written so far to a memory destination.
    pub fn contents(&self) -> Option<String> {
        match self {
            OutputDestination::Memory(buffer) => Some(String::from_utf8_lossy(buffer).into_owned()),
            _ => None,
        }
    }
}

impl Drop for OutputDestination {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            if let OutputDestination::File { path, .. } = self {
                log::warn!("failed to flush {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_listing() {
        let mut out = OutputDestination::memory();
        out.write_sources(&[]).unwrap();
        assert_eq!(out.contents().unwrap(), "");

        out.write_sources(&[Source::default(), Source::default()])
            .unwrap();
        let text = out.contents().unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("#isle"));
    }

    #[test]
    fn test_file_destination_is_flushed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listing.txt");
        {
            let mut out = OutputDestination::open(Some(path.to_str().unwrap())).unwrap();
            out.write_sources(&[Source::default()]).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_unwritable_destination() {
        let result = OutputDestination::open(Some("/nonexistent-dir/for/sure/out.txt"));
        assert!(matches!(
            result,
            Err(ValidationError::OutputUnwritable { .. })
        ));
    }

    #[test]
    fn test_discard() {
        let mut out = OutputDestination::open(None).unwrap();
        out.write_sources(&[Source::default()]).unwrap();
        assert!(out.contents().is_none());
    }
}
