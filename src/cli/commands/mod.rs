//! Command implementations.
//!
//! Each sync command resolves its profile, opens a store, runs one engine
//! workflow on a Tokio runtime and prints the outcome.

pub mod completions;
pub mod delete;
pub mod export;
pub mod import;
pub mod version;

use std::io::{self, Write};
use std::path::Path;

use tokio::runtime::Runtime;
use tracing::debug;

use crate::config::{Profile, load_profile};
use crate::error::{Error, Result};
use crate::remote::SalesforceStore;
use crate::sync::{Reporter, RunOutcome};

/// Options every sync command shares.
#[derive(Debug, Clone, Copy)]
pub struct Global<'a> {
    pub creds: Option<&'a Path>,
    pub profile: Option<&'a str>,
    pub dry_run: bool,
    pub json: bool,
    pub quiet: bool,
}

pub(crate) fn runtime() -> Result<Runtime> {
    Runtime::new().map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

pub(crate) fn load(global: &Global<'_>) -> Result<Profile> {
    let profile = load_profile(global.creds, global.profile)?;
    debug!(profile = %profile.name, endpoint = %profile.credentials.endpoint, "loaded profile");
    Ok(profile)
}

pub(crate) fn open_store(profile: &Profile) -> Result<SalesforceStore> {
    SalesforceStore::new(&profile.credentials, &profile.settings)
}

/// Human report lines go to stdout unless JSON or quiet output was asked for.
pub(crate) fn reporter(global: &Global<'_>) -> Reporter<Box<dyn Write>> {
    if global.json || global.quiet {
        Reporter::new(Box::new(io::sink()))
    } else {
        Reporter::new(Box::new(io::stdout()))
    }
}

/// Print the outcome in JSON mode and turn failed records into an error.
pub(crate) fn conclude(outcome: &RunOutcome, global: &Global<'_>) -> Result<()> {
    if global.json {
        let output = serde_json::json!({
            "success": !outcome.has_failures(),
            "dry_run": global.dry_run,
            "run": outcome.run,
            "summary": outcome.summary,
        });
        println!("{}", serde_json::to_string(&output)?);
    }

    if outcome.has_failures() {
        return Err(Error::PartialFailure {
            failed: outcome.summary.failed,
            submitted: outcome.summary.submitted,
        });
    }
    Ok(())
}
