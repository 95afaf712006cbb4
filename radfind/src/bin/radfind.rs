//! radfind command-line entry point.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use log::LevelFilter;

use radfind::io::TableFormat;
use radfind::orchestrator::{Outcome, RunOrchestrator};
use radfind::region::Capabilities;
use radfind::telescope::known_telescopes;
use radfind::Cli;

fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    // RUST_LOG still overrides the level chosen here
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn print_formats(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Supported table formats:")?;
    for format in TableFormat::ALL {
        writeln!(out, "  {:<5} {}", format.extension(), format.description())?;
    }
    Ok(())
}

fn print_versions(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "radfind {}", env!("CARGO_PKG_VERSION"))?;
    let capabilities = Capabilities::detect().names();
    if capabilities.is_empty() {
        writeln!(out, "capabilities: none")?;
    } else {
        writeln!(out, "capabilities: {}", capabilities.join(", "))?;
    }
    let formats: Vec<&str> = TableFormat::ALL.iter().map(|f| f.extension()).collect();
    writeln!(out, "table formats: {}", formats.join(", "))?;
    let telescopes: Vec<&str> = known_telescopes().collect();
    writeln!(out, "telescopes: {}", telescopes.join(", "))?;
    Ok(())
}

/// Print whatever an informational outcome asks for.
fn show(outcome: &Outcome) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    match outcome {
        Outcome::ShowFormats => print_formats(&mut stdout).context("writing format list")?,
        Outcome::ShowVersions => print_versions(&mut stdout).context("writing versions")?,
        Outcome::ShowHelp => Cli::command().print_help().context("writing help")?,
        Outcome::NothingToFind => {}
        Outcome::BackgroundSaved {
            background, noise, ..
        } => {
            log::info!("wrote {} and {}", background.display(), noise.display());
        }
        Outcome::Detected {
            sources, tables, ..
        } => {
            log::info!(
                "found {} sources, wrote {} tables",
                sources.len(),
                tables.len()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let options = match cli.into_options() {
        Ok(options) => options,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut orchestrator = RunOrchestrator::standard();
    match orchestrator.execute(options) {
        Ok(outcome) => {
            if let Err(e) = show(&outcome) {
                log::error!("{e:#}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
