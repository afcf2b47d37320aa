//! Removal deadline enforcement.

use crate::audit::{scan_with, ScanOptions};
use crate::callable::CallableRef;
use crate::error::{DeprecationError, Result};
use crate::namespace::{package_version, Module};
use crate::version::Version;
use tracing::{debug, warn};

/// Fail when `current_version` has reached the callable's `remove_in`.
pub fn check_one(callable: &CallableRef, current_version: &str) -> Result<()> {
    let record = callable.deprecation().ok_or_else(|| {
        DeprecationError::Configuration(format!(
            "`{}` is not a deprecated callable",
            callable.path()
        ))
    })?;
    if record.remove_in.is_empty() {
        return Err(DeprecationError::Configuration(format!(
            "Callable `{}` does not have a 'remove_in' version specified in its deprecation metadata.",
            callable.display_name()
        )));
    }

    let current = Version::parse(current_version)?;
    let remove_in = Version::parse(&record.remove_in)?;
    if current >= remove_in {
        return Err(DeprecationError::ExpiredDeprecation {
            callable: callable.display_name(),
            remove_in: record.remove_in.clone(),
            current: current_version.to_string(),
        });
    }
    Ok(())
}

/// Version of the package owning `root`.
///
/// Looks up the registered package named by the top-level namespace, then
/// falls back to the root module's own version.
pub fn detect_version(root: &Module) -> Result<String> {
    let package = root.top_level_name();
    package_version(package)
        .or_else(|| root.version().map(str::to_string))
        .ok_or_else(|| DeprecationError::VersionDetection(package.to_string()))
}

/// Messages for every deprecated callable in `root` past its removal version.
///
/// Callables without a `remove_in`, or with one that does not parse, are
/// skipped. An unparsable `current_version` fails immediately.
pub fn check_namespace(root: &Module, current_version: Option<&str>, recursive: bool) -> Result<Vec<String>> {
    check_namespace_with(root, current_version, &ScanOptions::new(recursive))
}

/// Like [`check_namespace`], covering only what `options` lets a scan see.
pub fn check_namespace_with(
    root: &Module,
    current_version: Option<&str>,
    options: &ScanOptions,
) -> Result<Vec<String>> {
    let current = match current_version {
        Some(version) => version.to_string(),
        None => {
            let detected = detect_version(root)?;
            debug!(package = %root.top_level_name(), version = %detected, "Detected current version");
            detected
        }
    };
    let current_version = Version::parse(&current)?;

    let mut expired = Vec::new();
    for finding in scan_with(root, options) {
        let remove_in = &finding.record.remove_in;
        if remove_in.is_empty() {
            continue;
        }
        let scheduled = match Version::parse(remove_in) {
            Ok(version) => version,
            Err(e) => {
                debug!(callable = %finding.path(), error = %e, "Skipping unparsable removal version");
                continue;
            }
        };
        if current_version >= scheduled {
            let error = DeprecationError::ExpiredDeprecation {
                callable: finding.name.clone(),
                remove_in: remove_in.clone(),
                current: current.clone(),
            };
            warn!(callable = %finding.path(), remove_in = %remove_in, "Deprecated callable is past removal");
            expired.push(error.to_string());
        }
    }
    Ok(expired)
}
