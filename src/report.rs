//! Audit report rendering for the command line.

use crate::audit::{AuditFinding, ChainKind};
use serde::Serialize;
use std::fmt;

/// Output format of an [`AuditReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Findings of one audit run, grouped by problem.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub root: String,
    pub findings: Vec<AuditFinding>,
    /// Expiry messages, when removal deadlines were checked
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expired: Vec<String>,
}

impl AuditReport {
    pub fn new(root: impl Into<String>, findings: Vec<AuditFinding>) -> Self {
        Self {
            root: root.into(),
            findings,
            expired: Vec::new(),
        }
    }

    pub fn with_expired(mut self, expired: Vec<String>) -> Self {
        self.expired = expired;
        self
    }

    pub fn invalid_args(&self) -> impl Iterator<Item = &AuditFinding> {
        self.findings.iter().filter(|f| !f.invalid_args.is_empty())
    }

    pub fn identity_mappings(&self) -> impl Iterator<Item = &AuditFinding> {
        self.findings.iter().filter(|f| !f.identity_mapping.is_empty())
    }

    pub fn no_effect(&self) -> impl Iterator<Item = &AuditFinding> {
        self.findings.iter().filter(|f| f.no_effect)
    }

    pub fn chains(&self) -> impl Iterator<Item = &AuditFinding> {
        self.findings.iter().filter(|f| f.chain_kind.is_some())
    }

    /// Problems that fail the run.
    pub fn has_errors(&self) -> bool {
        self.invalid_args().next().is_some() || !self.expired.is_empty()
    }

    pub fn has_issues(&self) -> bool {
        self.has_errors()
            || self.identity_mappings().next().is_some()
            || self.no_effect().next().is_some()
            || self.chains().next().is_some()
    }

    /// Process exit code: 1 on errors unless they are suppressed.
    pub fn exit_code(&self, skip_errors: bool) -> u8 {
        if self.has_errors() && !skip_errors {
            1
        } else {
            0
        }
    }

    pub fn render(&self, format: ReportFormat) -> anyhow::Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_string()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scanning: {} ...", self.root)?;
        if self.findings.is_empty() && self.expired.is_empty() {
            return writeln!(f, "No deprecated callables found.");
        }

        if self.invalid_args().next().is_some() {
            writeln!(f, "\n[ERROR] Found callables with invalid argument mappings:")?;
            for finding in self.invalid_args() {
                writeln!(f, "  - {}: {:?}", finding.path(), finding.invalid_args)?;
            }
        }
        if !self.expired.is_empty() {
            writeln!(f, "\n[ERROR] Found deprecated callables past their removal version:")?;
            for message in &self.expired {
                writeln!(f, "  - {}", message)?;
            }
        }
        if self.identity_mappings().next().is_some() {
            writeln!(f, "\n[WARNING] Found callables with identity argument mappings (arg -> arg):")?;
            for finding in self.identity_mappings() {
                writeln!(f, "  - {}: {:?}", finding.path(), finding.identity_mapping)?;
            }
        }
        if self.no_effect().next().is_some() {
            writeln!(f, "\n[WARNING] Found deprecated wrappers with NO EFFECT (zero impact):")?;
            for finding in self.no_effect() {
                writeln!(f, "  - {}", finding.path())?;
                if finding.empty_mapping {
                    writeln!(f, "    Reason: Empty mapping")?;
                }
                if finding.self_reference {
                    writeln!(f, "    Reason: Self reference")?;
                }
                if !finding.identity_mapping.is_empty() && finding.invalid_args.is_empty() {
                    writeln!(f, "    Reason: All identity mappings")?;
                }
            }
        }
        if self.chains().next().is_some() {
            writeln!(f, "\n[WARNING] Found deprecation chains that should be collapsed:")?;
            for finding in self.chains() {
                let kind = match finding.chain_kind {
                    Some(ChainKind::Target) => "forwards to a deprecated target",
                    _ => "stacked argument mappings",
                };
                writeln!(f, "  - {}: {}", finding.path(), kind)?;
            }
        }

        if self.has_issues() {
            writeln!(f, "\nIssues were found in deprecated wrappers.")
        } else {
            writeln!(f, "\nAll deprecated wrappers look correct!")
        }
    }
}
