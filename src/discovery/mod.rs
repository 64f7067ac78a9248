//! Enumerate the executables a package installed into an environment.
//!
//! Conda records every installed file in
//! `<prefix>/conda-meta/<package>-<version>-<build>.json`; the binaries are
//! the entries directly under `bin/`.

use std::path::{Component, Path};

use serde_json::Value;

use crate::isolation::Environment;
use crate::logging::TaskLog;
use crate::model::BinaryDescriptor;

/// What: Shell command printing the package's manifest(s).
///
/// Details:
/// - The trailing glob matches the build string suffix.
#[must_use]
pub fn manifest_command(prefix: &str, package: &str, version: &str) -> String {
    format!(
        "cat {}/conda-meta/{package}-{version}*.json",
        prefix.trim_end_matches('/')
    )
}

/// What: List the binaries of `package` `version` installed in `env`.
///
/// Inputs:
/// - `env`: Running environment.
/// - `package`, `version`: Unit being processed.
/// - `prefix`: Environment prefix holding `conda-meta/`.
/// - `log`: Task log.
///
/// Output:
/// - Binaries in manifest order; empty when the manifest is missing or
///   unreadable (a warning is logged).
pub async fn discover(
    env: &Environment<'_>,
    package: &str,
    version: &str,
    prefix: &str,
    log: &TaskLog,
) -> Vec<BinaryDescriptor> {
    let script = manifest_command(prefix, package, version);
    let out = match env.shell(&script).await {
        Ok(out) => out,
        Err(e) => {
            log.warn(format!("Could not read the package manifest: {e}"));
            return Vec::new();
        }
    };
    if out.exit_code != 0 {
        log.warn(format!(
            "Package manifest not found (exit {}): {}",
            out.exit_code,
            out.stderr.trim()
        ));
        return Vec::new();
    }
    match binaries_from_manifest(&out.stdout) {
        Ok(bins) => bins,
        Err(e) => {
            log.warn(format!("Package manifest is not valid JSON: {e}"));
            Vec::new()
        }
    }
}

/// What: Extract binaries from the text of a conda manifest.
///
/// Inputs:
/// - `manifest`: JSON object with a `files` array of relative paths.
///
/// Output:
/// - Names of entries of the exact form `bin/<name>`.
///
/// # Errors
/// - The JSON parse error when `manifest` is not valid JSON.
///
/// Details:
/// - A missing or non-array `files` key yields an empty list.
pub fn binaries_from_manifest(manifest: &str) -> Result<Vec<BinaryDescriptor>, serde_json::Error> {
    let v: Value = serde_json::from_str(manifest)?;
    let bins = v
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(Value::as_str)
                .filter_map(bin_entry)
                .collect()
        })
        .unwrap_or_default();
    Ok(bins)
}

/// `Some(name)` when `path` is exactly `bin/<name>`.
fn bin_entry(path: &str) -> Option<BinaryDescriptor> {
    let parts: Vec<_> = Path::new(path).components().collect();
    match parts.as_slice() {
        [Component::Normal(dir), Component::Normal(name)] if *dir == "bin" => {
            Some(BinaryDescriptor(name.to_string_lossy().into_owned()))
        }
        _ => None,
    }
}
