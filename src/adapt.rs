//! Deployment adapter hand-off.
//!
//! Adapters run after the build has fully written the output directory,
//! receiving the compilation and the deployment manifest. Every adapter
//! runs even when an earlier one fails; failures are reported together
//! at the end and never roll back the output.

use crate::{
    compilation::{Compilation, Manifest},
    log,
    plugins::registry::PluginRegistry,
};
use anyhow::{Result, bail};
use std::sync::Arc;

/// Instantiate and invoke every adapter plugin, in declaration order.
pub fn run_adapters(
    registry: &PluginRegistry,
    compilation: &Arc<Compilation>,
    manifest: &Manifest,
) -> Result<()> {
    let adapters = registry.adapters();
    if adapters.is_empty() {
        return Ok(());
    }

    let mut failed = Vec::new();
    for entry in adapters {
        log!("adapt"; "running `{}`", entry.name);
        let outcome = (entry.capability)(compilation, manifest).and_then(|adapter| adapter());
        if let Err(e) = outcome {
            log!("error"; "adapter `{}` failed: {e:#}", entry.name);
            failed.push(entry.name.as_str());
        }
    }

    if !failed.is_empty() {
        bail!("{} adapter(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
