//! Subcommand handlers

pub mod auth;
pub mod clusters;
pub mod events;
pub mod metrics;
pub mod watch;

use anyhow::{Context, Result};
use serde::Serialize;

/// Pretty-print a response body to stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to render response")?;
    println!("{}", out);
    Ok(())
}
