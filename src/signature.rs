//! Parameter descriptors for callables.
//!
//! A [`Signature`] is the ordered list of parameters a callable declares. It
//! is supplied explicitly when the callable is built and read back through
//! [`signature_of`], which caches it per callable identity.

use crate::callable::{Callable, CallableRef};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

/// How a parameter can be bound at call time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    #[default]
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

impl ParamKind {
    /// Whether a positional argument can land on this parameter by position.
    pub fn is_positional(self) -> bool {
        matches!(self, Self::PositionalOnly | Self::PositionalOrKeyword)
    }

    /// Whether this is a catch-all (`*args` or `**kwargs`) parameter.
    pub fn is_variadic(self) -> bool {
        matches!(self, Self::VarPositional | Self::VarKeyword)
    }
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Param {
    pub name: String,

    /// Declared type tag, informational only
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,

    /// Default value; `Some(Value::Null)` is a real `null` default
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,

    #[serde(default)]
    pub kind: ParamKind,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
            default: None,
            kind,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Ordered parameter list of a callable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
    opaque: bool,
}

impl Signature {
    /// Create an empty signature (a callable taking no arguments).
    pub fn new() -> Self {
        Self::default()
    }

    /// Signature of a callable that cannot be introspected.
    ///
    /// Argument resolution passes calls through untouched for opaque signatures.
    pub fn opaque() -> Self {
        Self {
            params: Vec::new(),
            opaque: true,
        }
    }

    pub fn from_params(params: Vec<Param>) -> Self {
        Self {
            params,
            opaque: false,
        }
    }

    pub fn with(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Required positional-or-keyword parameter.
    pub fn arg(self, name: impl Into<String>) -> Self {
        self.with(Param::new(name, ParamKind::PositionalOrKeyword))
    }

    /// Positional-or-keyword parameter with a default.
    pub fn arg_default(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.with(Param::new(name, ParamKind::PositionalOrKeyword).with_default(default))
    }

    pub fn positional_only(self, name: impl Into<String>) -> Self {
        self.with(Param::new(name, ParamKind::PositionalOnly))
    }

    pub fn var_positional(self, name: impl Into<String>) -> Self {
        self.with(Param::new(name, ParamKind::VarPositional))
    }

    pub fn keyword_only(self, name: impl Into<String>, default: Option<Value>) -> Self {
        let mut param = Param::new(name, ParamKind::KeywordOnly);
        param.default = default;
        self.with(param)
    }

    pub fn var_keyword(self, name: impl Into<String>) -> Self {
        self.with(Param::new(name, ParamKind::VarKeyword))
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Names of all non-variadic parameters, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| !p.kind.is_variadic())
            .map(|p| p.name.as_str())
    }

    /// Parameters a positional argument can bind to, up to the first `*args`.
    pub fn positional_params(&self) -> impl Iterator<Item = &Param> {
        self.params
            .iter()
            .take_while(|p| p.kind != ParamKind::VarPositional)
            .filter(|p| p.kind.is_positional())
    }

    pub fn has_var_positional(&self) -> bool {
        self.params
            .iter()
            .any(|p| p.kind == ParamKind::VarPositional)
    }

    pub fn has_var_keyword(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::VarKeyword)
    }

    /// Whether `name` may appear among resolved keyword arguments.
    ///
    /// Positional-only names count: dispatch hands them back by position.
    pub fn accepts_keyword(&self, name: &str) -> bool {
        self.get(name)
            .map(|p| !p.kind.is_variadic())
            .unwrap_or(false)
    }

    /// Parameters with a declared default.
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.params
            .iter()
            .filter_map(|p| p.default.as_ref().map(|d| (p.name.as_str(), d)))
    }
}

const DEFAULT_CACHE_CAPACITY: usize = 512;

static SIGNATURES: Lazy<SignatureCache> =
    Lazy::new(|| SignatureCache::with_capacity(DEFAULT_CACHE_CAPACITY));

/// Signature of `callable`, computed once per callable and reused.
///
/// Callables whose [`Callable::cacheable`] returns `false` are recomputed on
/// every lookup; callables without a signature come back [`Signature::opaque`].
pub fn signature_of(callable: &CallableRef) -> Arc<Signature> {
    SIGNATURES.get_or_compute(callable)
}

struct CacheEntry {
    owner: Weak<dyn Callable>,
    signature: Arc<Signature>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<usize, CacheEntry>,
    order: VecDeque<usize>,
}

/// Bounded identity-keyed signature cache. Oldest entries are evicted first.
pub struct SignatureCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

impl SignatureCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_or_compute(&self, callable: &CallableRef) -> Arc<Signature> {
        if !callable.cacheable() {
            return Arc::new(compute(callable.as_ref()));
        }

        let key = identity(callable);
        {
            let inner = self.inner.read();
            if let Some(entry) = inner.entries.get(&key) {
                // the address may have been reused by a new callable
                if entry.owner.strong_count() > 0 {
                    return entry.signature.clone();
                }
            }
        }

        let signature = Arc::new(compute(callable.as_ref()));
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| *k != key);
        }
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.entries.insert(
            key,
            CacheEntry {
                owner: Arc::downgrade(callable),
                signature: signature.clone(),
            },
        );
        inner.order.push_back(key);
        signature
    }
}

fn identity(callable: &CallableRef) -> usize {
    Arc::as_ptr(callable) as *const () as usize
}

fn compute(callable: &dyn Callable) -> Signature {
    callable.signature().unwrap_or_else(Signature::opaque)
}
