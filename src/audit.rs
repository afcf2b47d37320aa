//! Static audit of deprecation wrappers.
//!
//! The audit never calls a wrapper. It reads the [`DeprecationRecord`]
//! attached at wrap time and reports configurations that do nothing, name
//! arguments the callable does not have, or forward through other deprecated
//! callables instead of the final implementation.

use crate::callable::{same_callable, CallableRef};
use crate::error::{DeprecationError, Result};
use crate::namespace::Module;
use crate::record::{DeprecationRecord, RecordInfo, Target};
use crate::signature::signature_of;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, info};

/// Why a wrapper should be collapsed into its neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// Forwards to another deprecated callable.
    Target,
    /// Argument mappings compose across self-renaming layers.
    Stacked,
}

/// Result of auditing one deprecated callable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditFinding {
    /// Namespace the callable was found in; empty for direct validation
    pub module: String,
    pub name: String,
    pub record: RecordInfo,
    /// Mapping keys the callable does not declare
    pub invalid_args: Vec<String>,
    pub empty_mapping: bool,
    pub identity_mapping: Vec<String>,
    pub self_reference: bool,
    /// The wrapper neither forwards, remaps, nor warns usefully
    pub no_effect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_kind: Option<ChainKind>,
}

impl AuditFinding {
    /// `module.name`, or just the name when the module is unknown.
    pub fn path(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }
}

/// Audit a single deprecated callable.
///
/// Fails with [`DeprecationError::Configuration`] when `callable` carries no
/// deprecation record.
pub fn validate_one(callable: &CallableRef) -> Result<AuditFinding> {
    let record = callable.deprecation().ok_or_else(|| {
        DeprecationError::Configuration(format!(
            "`{}` is not a deprecated callable",
            callable.path()
        ))
    })?;
    Ok(audit(callable, record))
}

fn audit(callable: &CallableRef, record: &DeprecationRecord) -> AuditFinding {
    let self_reference = match &record.target {
        Target::Forward(target) => {
            same_callable(target, callable)
                || callable
                    .wrapped()
                    .is_some_and(|source| same_callable(target, &source))
        }
        _ => false,
    };

    let mapping = record.args_mapping.as_ref().filter(|m| !m.is_empty());
    let empty_mapping = mapping.is_none();
    let (invalid_args, identity_mapping) = match mapping {
        Some(mapping) => {
            let signature = signature_of(callable);
            let invalid = if signature.is_opaque() {
                Vec::new()
            } else {
                mapping
                    .keys()
                    .filter(|key| signature.get(key).is_none())
                    .map(str::to_string)
                    .collect()
            };
            (invalid, mapping.identity_entries())
        }
        None => (Vec::new(), Vec::new()),
    };
    let all_identity = mapping.is_some_and(|m| identity_mapping.len() == m.len());

    let self_deprecation = record.target.is_self_rename() || self_reference;
    let no_effect = self_reference || (self_deprecation && (empty_mapping || all_identity));

    AuditFinding {
        module: String::new(),
        name: callable.display_name(),
        record: record.info(),
        invalid_args,
        empty_mapping,
        identity_mapping,
        self_reference,
        no_effect,
        chain_kind: chain_kind(callable, record, self_reference),
    }
}

fn chain_kind(callable: &CallableRef, record: &DeprecationRecord, self_reference: bool) -> Option<ChainKind> {
    match &record.target {
        Target::Forward(target) if !self_reference => {
            let inner = target.deprecation()?;
            if inner.target.is_self_rename() {
                Some(ChainKind::Stacked)
            } else {
                Some(ChainKind::Target)
            }
        }
        Target::SelfRename => {
            let mut layer = callable.wrapped();
            while let Some(current) = layer {
                if current
                    .deprecation()
                    .is_some_and(|r| r.target.is_self_rename())
                {
                    return Some(ChainKind::Stacked);
                }
                layer = current.wrapped();
            }
            None
        }
        _ => None,
    }
}

/// Which namespaces and members a scan covers.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Matched against module names and `module.member` paths
    pub ignore: Option<GlobSet>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            ignore: None,
        }
    }
}

impl ScanOptions {
    pub fn new(recursive: bool) -> Self {
        Self {
            recursive,
            ignore: None,
        }
    }

    /// Skip modules and members matching any of the glob `patterns`.
    pub fn with_ignore<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut any = false;
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| {
                DeprecationError::Configuration(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
            any = true;
        }
        if any {
            let set = builder
                .build()
                .map_err(|e| DeprecationError::Configuration(e.to_string()))?;
            self.ignore = Some(set);
        }
        Ok(self)
    }

    fn ignores(&self, path: &str) -> bool {
        self.ignore.as_ref().is_some_and(|set| set.is_match(path))
    }
}

/// Audit every public deprecated callable in `root` (and its submodules when
/// `recursive`).
pub fn scan(root: &Module, recursive: bool) -> Vec<AuditFinding> {
    scan_with(root, &ScanOptions::new(recursive))
}

pub fn scan_with(root: &Module, options: &ScanOptions) -> Vec<AuditFinding> {
    let mut findings = Vec::new();
    root.walk(options.recursive, &mut |module| {
        if options.ignores(module.name()) {
            debug!(module = %module.name(), "Ignoring namespace");
            return;
        }
        for (name, callable) in module.callables() {
            if name.starts_with('_') {
                continue;
            }
            let path = format!("{}.{}", module.name(), name);
            if options.ignores(&path) {
                debug!(callable = %path, "Ignoring callable");
                continue;
            }
            if let Some(record) = callable.deprecation() {
                let mut finding = audit(callable, record);
                finding.module = module.name().to_string();
                finding.name = name.to_string();
                findings.push(finding);
            }
        }
    });
    info!(
        root = %root.name(),
        recursive = options.recursive,
        findings = findings.len(),
        "Scanned namespace for deprecated callables"
    );
    findings
}

/// Findings that form a forwarding or stacking chain.
pub fn find_chains(root: &Module, recursive: bool) -> Vec<AuditFinding> {
    find_chains_with(root, &ScanOptions::new(recursive))
}

pub fn find_chains_with(root: &Module, options: &ScanOptions) -> Vec<AuditFinding> {
    scan_with(root, options)
        .into_iter()
        .filter(|finding| finding.chain_kind.is_some())
        .collect()
}
