//! Deprecation notices: message templates, sinks, and per-wrapper call counters.
//!
//! A notice is rendered by substituting named variables into a template and
//! handed to a [`Sink`]. How often a wrapper warns is governed by its
//! [`WarnLimit`] and tracked in [`CallCounters`]: one counter for the callable
//! as a whole, and one per deprecated argument name seen in calls.

use crate::callable::Callable;
use crate::record::MappedArg;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Warning for a callable forwarded to a replacement.
pub const TEMPLATE_WARNING_CALLABLE: &str = "The `{source_name}` was deprecated since v{deprecated_in} in favor of `{target_path}`. It will be removed in v{remove_in}.";

/// Warning for renamed or retired arguments.
pub const TEMPLATE_WARNING_ARGUMENTS: &str = "The `{source_name}` uses deprecated arguments: {argument_map}. They were deprecated since v{deprecated_in} and will be removed in v{remove_in}.";

/// Warning for a callable without replacement.
pub const TEMPLATE_WARNING_NO_TARGET: &str =
    "The `{source_name}` was deprecated since v{deprecated_in}. It will be removed in v{remove_in}.";

/// One entry of the rendered argument map.
pub const TEMPLATE_ARGUMENT_MAPPING: &str = "`{old_arg}` -> `{new_arg}`";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}|%\(([A-Za-z_][A-Za-z0-9_]*)\)s")
        .expect("placeholder pattern is valid")
});

/// Substitute `{name}` or `%(name)s` placeholders; unknown names stay verbatim.
pub fn render(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Render `old -> new` pairs for the argument warning.
pub fn render_argument_map<'a>(entries: impl IntoIterator<Item = (&'a str, &'a MappedArg)>) -> String {
    entries
        .into_iter()
        .map(|(old, mapped)| {
            let new = mapped.to_string();
            render(TEMPLATE_ARGUMENT_MAPPING, |name| match name {
                "old_arg" => Some(old.to_string()),
                "new_arg" => Some(new.clone()),
                _ => None,
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values available to a message template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    pub source_name: String,
    pub source_path: String,
    pub target_name: String,
    pub target_path: String,
    pub deprecated_in: String,
    pub remove_in: String,
    pub argument_map: String,
}

impl TemplateVars {
    /// Variables describing `source`; the rest is filled in by the caller.
    pub fn for_source(source: &dyn Callable) -> Self {
        Self {
            source_name: source.display_name(),
            source_path: source.path(),
            ..Default::default()
        }
    }

    pub fn lookup(&self, name: &str) -> Option<String> {
        let value = match name {
            "source_name" => &self.source_name,
            "source_path" => &self.source_path,
            "target_name" => &self.target_name,
            "target_path" => &self.target_path,
            "deprecated_in" => &self.deprecated_in,
            "remove_in" => &self.remove_in,
            "argument_map" => &self.argument_map,
            _ => return None,
        };
        Some(value.clone())
    }

    pub fn render(&self, template: &str) -> String {
        render(template, |name| self.lookup(name))
    }
}

/// Destination of deprecation notices.
#[derive(Clone, Default)]
pub enum Sink {
    /// Log through `tracing` as a `FutureWarning`.
    #[default]
    FutureWarning,
    Custom(Arc<dyn Fn(&str) + Send + Sync>),
    /// Never emit.
    Disabled,
}

impl Sink {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn emit(&self, message: &str) {
        match self {
            Self::FutureWarning => {
                warn!(target: "deprecate", category = "FutureWarning", "{}", message);
            }
            Self::Custom(f) => f(message),
            Self::Disabled => {}
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FutureWarning => write!(f, "Sink::FutureWarning"),
            Self::Custom(_) => write!(f, "Sink::Custom(..)"),
            Self::Disabled => write!(f, "Sink::Disabled"),
        }
    }
}

/// Render `template` for `source` and hand it to `sink`.
pub fn emit(sink: &Sink, template: &str, vars: &TemplateVars) {
    if sink.is_enabled() {
        sink.emit(&vars.render(template));
    }
}

/// In-memory sink collecting every emitted message.
#[derive(Debug, Clone, Default)]
pub struct CapturedWarnings {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CapturedWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink appending to this capture.
    pub fn sink(&self) -> Sink {
        let messages = self.messages.clone();
        Sink::custom(move |message| messages.lock().push(message.to_string()))
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the captured messages, leaving the capture empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }
}

/// How many times a wrapper may warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnLimit {
    Times(u64),
    Unlimited,
}

impl Default for WarnLimit {
    fn default() -> Self {
        Self::Times(1)
    }
}

impl From<i64> for WarnLimit {
    /// Negative values mean no limit.
    fn from(n: i64) -> Self {
        if n < 0 {
            Self::Unlimited
        } else {
            Self::Times(n as u64)
        }
    }
}

impl WarnLimit {
    pub fn allows(self, already_warned: u64) -> bool {
        match self {
            Self::Times(n) => already_warned < n,
            Self::Unlimited => true,
        }
    }
}

/// Mutable call statistics of one wrapper.
///
/// Each counter is updated atomically, but a limit check followed by an
/// increment is not, so concurrent callers can warn slightly more often than
/// the limit allows.
#[derive(Debug, Default)]
pub struct CallCounters {
    calls: AtomicU64,
    warned: AtomicU64,
    warned_args: Mutex<HashMap<String, u64>>,
}

impl CallCounters {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Callable-level warnings issued.
    pub fn warned(&self) -> u64 {
        self.warned.load(Ordering::Relaxed)
    }

    /// Warnings issued for one deprecated argument.
    pub fn warned_for(&self, arg: &str) -> u64 {
        self.warned_args.lock().get(arg).copied().unwrap_or(0)
    }

    /// The smallest per-argument count among `args`, zero when `args` is empty.
    pub fn warned_min<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> u64 {
        let counts = self.warned_args.lock();
        args.into_iter()
            .map(|arg| counts.get(arg).copied().unwrap_or(0))
            .min()
            .unwrap_or(0)
    }

    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_warning(&self) {
        self.warned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_argument_warnings<'a>(&self, args: impl IntoIterator<Item = &'a str>) {
        let mut counts = self.warned_args.lock();
        for arg in args {
            *counts.entry(arg.to_string()).or_insert(0) += 1;
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.warned.store(0, Ordering::Relaxed);
        self.warned_args.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::{CallableKind, Function};
    use crate::signature::Signature;
    use serde_json::Value;

    fn vars() -> TemplateVars {
        TemplateVars {
            source_name: "old_func".to_string(),
            source_path: "pkg.old_func".to_string(),
            target_name: "new_func".to_string(),
            target_path: "pkg.new_func".to_string(),
            deprecated_in: "1.0".to_string(),
            remove_in: "2.0".to_string(),
            argument_map: String::new(),
        }
    }

    #[test]
    fn test_callable_template() {
        assert_eq!(
            vars().render(TEMPLATE_WARNING_CALLABLE),
            "The `old_func` was deprecated since v1.0 in favor of `pkg.new_func`. It will be removed in v2.0."
        );
    }

    #[test]
    fn test_legacy_placeholders_and_unknown_names() {
        let msg = vars().render("v%(deprecated_in)s: `%(source_name)s` -> {target_name} {nope}");
        assert_eq!(msg, "v1.0: `old_func` -> new_func {nope}");
    }

    #[test]
    fn test_argument_map_rendering() {
        let rename = MappedArg::Rename("new_arg".to_string());
        let dropped = MappedArg::Drop;
        let rendered = render_argument_map(vec![("old_arg", &rename), ("gone", &dropped)]);
        assert_eq!(rendered, "`old_arg` -> `new_arg`, `gone` -> `(dropped)`");
    }

    #[test]
    fn test_source_name_of_constructor() {
        let init = Function::new("__init__", Signature::new(), |_| Ok(Value::Null))
            .in_module("pkg")
            .with_kind(CallableKind::Constructor {
                owner: "MyClass".to_string(),
            });
        let vars = TemplateVars::for_source(&init);
        assert_eq!(vars.source_name, "MyClass");
        assert_eq!(vars.source_path, "pkg.MyClass");
    }

    #[test]
    fn test_custom_and_disabled_sinks() {
        let captured = CapturedWarnings::new();
        emit(&captured.sink(), "custom: {source_name}", &vars());
        emit(&Sink::Disabled, "never", &vars());
        assert_eq!(captured.messages(), vec!["custom: old_func".to_string()]);
    }

    #[test]
    fn test_warn_limit() {
        assert_eq!(WarnLimit::from(-1), WarnLimit::Unlimited);
        assert_eq!(WarnLimit::default(), WarnLimit::Times(1));
        let limit = WarnLimit::from(2);
        assert!(limit.allows(0));
        assert!(limit.allows(1));
        assert!(!limit.allows(2));
        assert!(!WarnLimit::from(0).allows(0));
        assert!(WarnLimit::Unlimited.allows(u64::MAX));
    }

    #[test]
    fn test_argument_counters_are_independent() {
        let counters = CallCounters::default();
        counters.record_argument_warnings(["a"]);
        counters.record_argument_warnings(["a", "b"]);
        assert_eq!(counters.warned_for("a"), 2);
        assert_eq!(counters.warned_for("b"), 1);
        assert_eq!(counters.warned_for("c"), 0);
        assert_eq!(counters.warned_min(["a", "b"]), 1);
        assert_eq!(counters.warned_min(["a", "c"]), 0);

        counters.reset();
        assert_eq!(counters.warned_for("a"), 0);
    }
}
