//! Deprecation management for callable APIs
//!
//! Wraps callables so that calling the old entry point warns and either
//! forwards to its replacement, renames arguments in place, or just warns.
//! Deprecated callables can be audited for broken configurations and checked
//! against their scheduled removal version in CI.
//!
//! # Features
//!
//! - **Forwarding**: Route calls of a deprecated callable to its replacement
//! - **Argument Mapping**: Rename or drop deprecated arguments, inject extras
//! - **Rate-Limited Warnings**: Warn once, N times, or on every call
//! - **Audit**: Detect invalid mappings, no-effect wrappers, and chains
//! - **Expiry Checks**: Fail when a callable outlives its `remove_in` version
//! - **Usage Tracking**: Prometheus metrics for deprecated calls
//!
//! # Example
//!
//! ```
//! use deprecate::{deprecated, Args, ArgsMapping, Callable, CapturedWarnings, Function, Signature, Target};
//!
//! let new_sum = Function::new("new_sum", Signature::new().arg("a").arg("b"), |bound| {
//!     Ok((bound.i64("a")? + bound.i64("b")?).into())
//! })
//! .into_ref();
//! let old_sum = Function::new("old_sum", Signature::new().arg("x").arg("b"), |_| {
//!     Ok(serde_json::Value::Null)
//! })
//! .into_ref();
//!
//! let captured = CapturedWarnings::new();
//! let old_sum = deprecated(Target::Forward(new_sum))
//!     .deprecated_in("0.1")
//!     .remove_in("0.5")
//!     .args_mapping(ArgsMapping::new().rename("x", "a"))
//!     .sink(captured.sink())
//!     .wrap(old_sum);
//!
//! assert_eq!(old_sum.call(Args::new().arg(1).arg(2)).unwrap(), 3);
//! assert_eq!(captured.len(), 1);
//! ```

pub mod arguments;
pub mod audit;
pub mod callable;
pub mod config;
pub mod deprecated;
pub mod error;
pub mod expiry;
pub mod metrics;
pub mod namespace;
pub mod record;
pub mod report;
pub mod signature;
pub mod version;
pub mod warning;

pub use audit::{find_chains, scan, validate_one, AuditFinding, ChainKind, ScanOptions};
pub use callable::{Args, Bound, Callable, CallableKind, CallableRef, Function, Kwargs};
pub use config::DeprecationManifest;
pub use deprecated::{deprecated, Deprecated, DeprecatedBuilder, SkipIf};
pub use error::{DeprecationError, Result};
pub use expiry::{check_namespace, check_namespace_with, check_one};
pub use namespace::Module;
pub use record::{ArgsMapping, DeprecationRecord, MappedArg, Target};
pub use signature::{Param, ParamKind, Signature};
pub use version::Version;
pub use warning::{CapturedWarnings, Sink, WarnLimit};
