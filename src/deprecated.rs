//! The deprecation wrapper and its per-call forwarding state machine.
//!
//! [`deprecated`] starts a [`DeprecatedBuilder`]; [`DeprecatedBuilder::wrap`]
//! attaches the [`DeprecationRecord`] to a new [`Deprecated`] wrapper around a
//! source callable. Every call through the wrapper then goes through the same
//! steps: skip check, positional-to-keyword normalization, classification of
//! why the call is deprecated, rate-limited warning, argument resolution, and
//! dispatch to the source or the forwarding target.

use crate::arguments::{
    apply_extra, apply_mapping, fill_defaults, reassemble, to_keyword_args, unknown_keys,
    validate_against_target,
};
use crate::callable::{Args, Callable, CallableKind, CallableRef, Kwargs};
use crate::error::{DeprecationError, Result};
use crate::metrics::DeprecationMetrics;
use crate::record::{ArgsMapping, DeprecationRecord, MappedArg, Target};
use crate::signature::{signature_of, Signature};
use crate::warning::{
    emit, render_argument_map, CallCounters, Sink, TemplateVars, WarnLimit,
    TEMPLATE_WARNING_ARGUMENTS, TEMPLATE_WARNING_CALLABLE, TEMPLATE_WARNING_NO_TARGET,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Condition under which a call bypasses deprecation handling entirely.
#[derive(Clone)]
pub enum SkipIf {
    Static(bool),
    /// Evaluated on every call; must produce a JSON boolean.
    Predicate(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl SkipIf {
    /// Skip whenever `predicate` returns `true`.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(move || Value::Bool(predicate())))
    }

    /// Predicate with an unchecked result; anything but a boolean is an error.
    pub fn dynamic<F>(predicate: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    fn evaluate(&self, callable: &str) -> Result<bool> {
        match self {
            Self::Static(flag) => Ok(*flag),
            Self::Predicate(predicate) => match predicate() {
                Value::Bool(flag) => Ok(flag),
                other => Err(DeprecationError::TypeConstraint {
                    callable: callable.to_string(),
                    got: json_type_name(&other).to_string(),
                }),
            },
        }
    }
}

impl Default for SkipIf {
    fn default() -> Self {
        Self::Static(false)
    }
}

impl From<bool> for SkipIf {
    fn from(flag: bool) -> Self {
        Self::Static(flag)
    }
}

impl fmt::Debug for SkipIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(flag) => write!(f, "SkipIf::Static({})", flag),
            Self::Predicate(_) => write!(f, "SkipIf::Predicate(..)"),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Start configuring a deprecation with the given target.
pub fn deprecated(target: Target) -> DeprecatedBuilder {
    DeprecatedBuilder::new(target)
}

/// Configuration of a deprecation wrapper, applied by [`DeprecatedBuilder::wrap`].
#[derive(Debug, Clone)]
pub struct DeprecatedBuilder {
    target: Target,
    deprecated_in: String,
    remove_in: String,
    sink: Sink,
    limit: WarnLimit,
    template: Option<String>,
    args_mapping: Option<ArgsMapping>,
    args_extra: Option<Kwargs>,
    skip_if: SkipIf,
    update_docstring: bool,
    metrics: Option<Arc<DeprecationMetrics>>,
}

impl DeprecatedBuilder {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            deprecated_in: String::new(),
            remove_in: String::new(),
            sink: Sink::default(),
            limit: WarnLimit::default(),
            template: None,
            args_mapping: None,
            args_extra: None,
            skip_if: SkipIf::default(),
            update_docstring: false,
            metrics: None,
        }
    }

    pub fn deprecated_in(mut self, version: impl Into<String>) -> Self {
        self.deprecated_in = version.into();
        self
    }

    pub fn remove_in(mut self, version: impl Into<String>) -> Self {
        self.remove_in = version.into();
        self
    }

    pub fn sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    /// Number of warnings to emit; negative means every call.
    pub fn num_warns(mut self, n: i64) -> Self {
        self.limit = WarnLimit::from(n);
        self
    }

    pub fn warn_limit(mut self, limit: WarnLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Replace the built-in message template.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn args_mapping(mut self, mapping: ArgsMapping) -> Self {
        self.args_mapping = Some(mapping);
        self
    }

    pub fn args_extra(mut self, extra: Kwargs) -> Self {
        self.args_extra = Some(extra);
        self
    }

    pub fn skip_if(mut self, skip_if: impl Into<SkipIf>) -> Self {
        self.skip_if = skip_if.into();
        self
    }

    /// Append a deprecation notice to the wrapper's documentation.
    pub fn update_docstring(mut self, update: bool) -> Self {
        self.update_docstring = update;
        self
    }

    pub fn metrics(mut self, metrics: Arc<DeprecationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Wrap `source`, attaching the deprecation record immediately.
    pub fn wrap(self, source: CallableRef) -> Arc<Deprecated> {
        let previous_layer = source.deprecation().map(|_| source.clone());
        let record = DeprecationRecord {
            deprecated_in: self.deprecated_in,
            remove_in: self.remove_in,
            target: self.target,
            args_mapping: self.args_mapping,
            args_extra: self.args_extra,
            previous_layer,
        };

        let doc = if self.update_docstring {
            annotate_doc(source.doc(), &record)
        } else {
            source.doc().map(str::to_string)
        };

        debug!(
            callable = %source.path(),
            deprecated_in = %record.deprecated_in,
            remove_in = %record.remove_in,
            "Wrapped deprecated callable"
        );

        Arc::new(Deprecated {
            source,
            record,
            sink: self.sink,
            limit: self.limit,
            template: self.template,
            skip_if: self.skip_if,
            doc,
            counters: CallCounters::default(),
            metrics: self.metrics,
        })
    }

    /// Like [`wrap`](Self::wrap), returning a plain callable handle.
    pub fn wrap_ref(self, source: CallableRef) -> CallableRef {
        self.wrap(source)
    }
}

/// Append the `.. deprecated::` notice to existing documentation.
///
/// Callables without documentation stay without.
pub fn annotate_doc(doc: Option<&str>, record: &DeprecationRecord) -> Option<String> {
    let doc = doc.filter(|d| !d.is_empty())?;
    let mut notice = format!("\n\n.. deprecated:: {}", record.deprecated_in);
    if !record.remove_in.is_empty() {
        notice.push_str(&format!(" Will be removed in {}.", record.remove_in));
    }
    if let Target::Forward(target) = &record.target {
        notice.push_str(&format!(" Use {} instead.", target.path()));
    }
    notice.push('\n');
    Some(format!("{}{}", doc, notice))
}

/// A deprecated callable.
pub struct Deprecated {
    source: CallableRef,
    record: DeprecationRecord,
    sink: Sink,
    limit: WarnLimit,
    template: Option<String>,
    skip_if: SkipIf,
    doc: Option<String>,
    counters: CallCounters,
    metrics: Option<Arc<DeprecationMetrics>>,
}

impl Deprecated {
    /// The wrapped callable.
    pub fn source(&self) -> &CallableRef {
        &self.source
    }

    pub fn record(&self) -> &DeprecationRecord {
        &self.record
    }

    pub fn counters(&self) -> &CallCounters {
        &self.counters
    }

    /// Mapping entries whose old name appears in this call.
    fn matched_arguments(&self, kwargs: &Kwargs) -> Vec<(String, MappedArg)> {
        if matches!(self.record.target, Target::WarnOnly) {
            return Vec::new();
        }
        match &self.record.args_mapping {
            Some(mapping) => mapping
                .iter()
                .filter(|(old, _)| kwargs.contains_key(*old))
                .map(|(old, mapped)| (old.to_string(), mapped.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    fn warn(&self, callable_reason: bool, matched: &[(String, MappedArg)]) {
        if !self.sink.is_enabled() {
            return;
        }

        let names = || matched.iter().map(|(old, _)| old.as_str());
        // argument counters take precedence whenever a deprecated argument is used
        let already_warned = if matched.is_empty() {
            self.counters.warned()
        } else {
            self.counters.warned_min(names())
        };
        if !self.limit.allows(already_warned) {
            return;
        }

        let mut vars = TemplateVars::for_source(self.source.as_ref());
        vars.deprecated_in = self.record.deprecated_in.clone();
        vars.remove_in = self.record.remove_in.clone();
        if !matched.is_empty() {
            vars.argument_map =
                render_argument_map(matched.iter().map(|(old, mapped)| (old.as_str(), mapped)));
        }

        let reason = if callable_reason {
            let default = match &self.record.target {
                Target::Forward(target) => {
                    vars.target_name = target.display_name();
                    vars.target_path = target.path();
                    TEMPLATE_WARNING_CALLABLE
                }
                _ => TEMPLATE_WARNING_NO_TARGET,
            };
            emit(&self.sink, self.template.as_deref().unwrap_or(default), &vars);
            self.counters.record_warning();
            "callable"
        } else {
            let template = self
                .template
                .as_deref()
                .unwrap_or(TEMPLATE_WARNING_ARGUMENTS);
            emit(&self.sink, template, &vars);
            "arguments"
        };
        if !matched.is_empty() {
            self.counters.record_argument_warnings(names());
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_warning(&self.source.path(), reason);
        }
    }

    /// Call the source, preferring the caller's untouched arguments when the
    /// source collects `*args`.
    fn call_source(&self, signature: &Signature, original: Option<Args>, resolved: Args) -> Result<Value> {
        let args = match original {
            Some(original) => original,
            None => reassemble(
                &self.source.display_name(),
                signature,
                resolved.keyword,
                resolved.positional,
            )?,
        };
        self.source.call(args)
    }

    fn forward(&self, target: &CallableRef, kwargs: Kwargs, rest: Vec<Value>) -> Result<Value> {
        let callee = match target.kind() {
            CallableKind::Record => target.initializer().unwrap_or_else(|| target.clone()),
            _ => target.clone(),
        };
        let target_signature = signature_of(&callee);
        let unknown = unknown_keys(&kwargs, &target_signature);

        let args = if self.is_enum_value_case(target, &unknown) {
            // `value` takes the only positional slot, so it cannot share it with a tail
            if !rest.is_empty() {
                return Err(DeprecationError::ArgumentMapping {
                    source_name: self.source.display_name(),
                    missing: unknown,
                });
            }
            let mut kwargs = kwargs;
            let positional = kwargs.remove("value").into_iter().collect();
            Args {
                positional,
                keyword: kwargs,
            }
        } else {
            validate_against_target(&self.source.display_name(), &kwargs, &target_signature)?;
            reassemble(&callee.display_name(), &target_signature, kwargs, rest)?
        };

        debug!(
            source = %self.source.path(),
            target = %callee.path(),
            "Forwarding deprecated call"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_forward(&self.source.path(), &callee.path());
        }
        callee.call(args)
    }

    /// Enum-to-enum forwarding where the only key the target rejects is `value`.
    fn is_enum_value_case(&self, target: &CallableRef, unknown: &[String]) -> bool {
        self.source.kind() == CallableKind::Enum
            && target.kind() == CallableKind::Enum
            && unknown.len() == 1
            && unknown[0] == "value"
    }
}

impl fmt::Debug for Deprecated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deprecated")
            .field("source", &self.source)
            .field("record", &self.record)
            .field("limit", &self.limit)
            .field("sink", &self.sink)
            .finish()
    }
}

impl Callable for Deprecated {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn module(&self) -> &str {
        self.source.module()
    }

    fn kind(&self) -> CallableKind {
        self.source.kind()
    }

    fn signature(&self) -> Option<Signature> {
        self.source.signature()
    }

    fn cacheable(&self) -> bool {
        self.source.cacheable()
    }

    fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    fn call(&self, args: Args) -> Result<Value> {
        let source_name = self.source.display_name();
        if self.skip_if.evaluate(&source_name)? {
            debug!(callable = %source_name, "Deprecation skipped");
            if let Some(metrics) = &self.metrics {
                metrics.record_skip(&self.source.path());
            }
            return self.source.call(args);
        }

        self.counters.record_call();
        if let Some(metrics) = &self.metrics {
            metrics.record_call(&self.source.path());
        }

        let signature = signature_of(&self.source);
        let original = signature.has_var_positional().then(|| args.clone());
        let normalized = to_keyword_args(&source_name, &signature, args)?;

        let callable_reason = matches!(
            self.record.target,
            Target::Forward(_) | Target::WarnOnly
        );
        let matched = self.matched_arguments(&normalized.keyword);
        if !callable_reason && matched.is_empty() {
            return self.call_source(&signature, original, normalized);
        }

        self.warn(callable_reason, &matched);

        let Args {
            positional: rest,
            keyword: mut kwargs,
        } = normalized;
        if callable_reason {
            kwargs = fill_defaults(&signature, kwargs);
        }
        if !matches!(self.record.target, Target::WarnOnly) {
            if let Some(mapping) = &self.record.args_mapping {
                kwargs = apply_mapping(kwargs, mapping);
            }
            if let Some(extra) = &self.record.args_extra {
                kwargs = apply_extra(kwargs, extra);
            }
        }

        match &self.record.target {
            Target::WarnOnly => self.call_source(
                &signature,
                original,
                Args {
                    positional: rest,
                    keyword: kwargs,
                },
            ),
            Target::SelfRename => self.source.call(reassemble(
                &self.source.display_name(),
                &signature,
                kwargs,
                rest,
            )?),
            Target::Forward(target) => self.forward(target, kwargs, rest),
        }
    }

    fn initializer(&self) -> Option<CallableRef> {
        self.source.initializer()
    }

    fn wrapped(&self) -> Option<CallableRef> {
        Some(self.source.clone())
    }

    fn deprecation(&self) -> Option<&DeprecationRecord> {
        Some(&self.record)
    }
}
