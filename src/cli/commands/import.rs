//! Import command implementation.

use crate::cli::commands::{Global, conclude, load, open_store, reporter, runtime};
use crate::cli::{ImportArgs, ImportMode};
use crate::config::{MAX_BATCH_SIZE, SyncSettings};
use crate::error::{Error, Result};
use crate::sync::SyncEngine;

/// Apply command-line overrides on top of profile settings.
///
/// Bad flag values are usage errors; bad profile values stay config errors.
fn apply_overrides(settings: &mut SyncSettings, args: &ImportArgs) -> Result<()> {
    if let Some(size) = args.batch_size {
        if !(1..=MAX_BATCH_SIZE).contains(&size) {
            return Err(Error::InvalidArgument(format!(
                "--batch-size must be between 1 and {MAX_BATCH_SIZE}, got {size}"
            )));
        }
        settings.batch_size = size;
    }
    if args.abort_on_first_error {
        settings.abort_on_first_error = true;
    }
    if let Some(field) = &args.external_id {
        if field.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "--external-id must name a field".to_string(),
            ));
        }
        settings.external_id_field.clone_from(field);
    }
    settings.validate()
}

/// Import accounts from `args.file`.
///
/// # Errors
///
/// Returns an error if the profile cannot be loaded, the file header is
/// wrong, a bulk job is rejected, or any record failed.
pub fn execute(args: &ImportArgs, global: &Global<'_>) -> Result<()> {
    let mut profile = load(global)?;
    apply_overrides(&mut profile.settings, args)?;
    let store = open_store(&profile)?;
    let rt = runtime()?;

    let engine =
        SyncEngine::new(&store, &profile.settings, reporter(global)).dry_run(global.dry_run);
    let outcome = match args.mode {
        ImportMode::Upsert => rt.block_on(engine.upsert(&args.file))?,
        ImportMode::Create => rt.block_on(engine.create(&args.file))?,
    };
    conclude(&outcome, global)
}
