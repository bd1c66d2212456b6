//! Delete-all command implementation.

use crate::cli::commands::{Global, conclude, load, open_store, reporter, runtime};
use crate::error::Result;
use crate::sync::SyncEngine;

/// Delete every account in the profile's org.
///
/// # Errors
///
/// Returns an error if the profile cannot be loaded, the id query fails, or
/// any record could not be deleted.
pub fn execute(global: &Global<'_>) -> Result<()> {
    let profile = load(global)?;
    let store = open_store(&profile)?;
    let rt = runtime()?;

    let engine =
        SyncEngine::new(&store, &profile.settings, reporter(global)).dry_run(global.dry_run);
    let outcome = rt.block_on(engine.delete_all())?;
    conclude(&outcome, global)
}
