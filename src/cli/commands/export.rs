//! Export command implementation.

use std::path::Path;

use crate::cli::commands::{Global, conclude, load, open_store, reporter, runtime};
use crate::error::Result;
use crate::sync::SyncEngine;

/// Export every account to `file`.
///
/// # Errors
///
/// Returns an error if the profile cannot be loaded, the query fails, or the
/// file cannot be written.
pub fn execute(file: &Path, global: &Global<'_>) -> Result<()> {
    let profile = load(global)?;
    let store = open_store(&profile)?;
    let rt = runtime()?;

    let engine = SyncEngine::new(&store, &profile.settings, reporter(global));
    let outcome = rt.block_on(engine.export(file))?;

    if !global.json && !global.quiet {
        println!("Wrote {}", file.display());
    }
    conclude(&outcome, global)
}
