//! Report — parse one file and write the resulting log as JSON.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tracing::{error, info};

use crate::conf::ParserConfig;
use crate::model::GcLog;
use crate::session::{parse, ResourceContext, SessionFailure};

/// Parse `path` and print the log to stdout.
///
/// A fatal session still prints whatever was parsed before the failure,
/// then returns the error.
pub fn report(path: &Path, config: &ParserConfig) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(path).map_err(|e| {
        error!("Failed to open {}: {}", path.display(), e);
        e
    })?;
    let ctx = ResourceContext::new(path.display().to_string(), file);

    match parse(ctx, config) {
        Ok(outcome) => {
            info!("Parsed {} events from {}", outcome.log.len(), path.display());
            write_log(&outcome.log, io::stdout().lock())?;
            Ok(())
        }
        Err(SessionFailure { error, partial }) => {
            write_log(&partial, io::stdout().lock())?;
            Err(error.into())
        }
    }
}

fn write_log<W: Write>(log: &GcLog, mut out: W) -> Result<(), Box<dyn std::error::Error>> {
    serde_json::to_writer_pretty(&mut out, log)?;
    writeln!(out)?;
    Ok(())
}
