//! Maps validated CLI matches to the action to run.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, ARG_UPSTREAM_URL, gate, identity};
use anyhow::{Context, Result};
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let upstream_url = matches
        .get_one::<String>(ARG_UPSTREAM_URL)
        .context("missing required argument: --upstream-url")?;
    let upstream_url = Url::parse(upstream_url).context("invalid RIGLIFY_UPSTREAM_URL")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        upstream_url,
        gate: gate::Options::parse(matches)?,
        identity: identity::Options::parse(matches)?,
    }))
}
