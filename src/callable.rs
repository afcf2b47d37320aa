//! Callables, call arguments, and native argument binding.

use crate::error::{DeprecationError, Result};
use crate::record::DeprecationRecord;
use crate::signature::{ParamKind, Signature};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Keyword arguments, in insertion order.
pub type Kwargs = serde_json::Map<String, Value>;

/// Shared handle to a callable. Identity is pointer identity.
pub type CallableRef = Arc<dyn Callable>;

/// Arguments of a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: Kwargs,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn from_keywords(keyword: Kwargs) -> Self {
        Self {
            positional: Vec::new(),
            keyword,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// Structural kind of a callable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CallableKind {
    #[default]
    Function,
    Method,
    /// Initializer of the type named `owner`
    Constructor { owner: String },
    /// Composite type whose call goes through its initializer
    Record,
    /// Enum-like type looked up by value
    Enum,
}

/// Anything that can be wrapped, forwarded to, or audited.
pub trait Callable: Send + Sync {
    fn name(&self) -> &str;

    /// Dotted path of the namespace declaring the callable.
    fn module(&self) -> &str;

    fn kind(&self) -> CallableKind {
        CallableKind::Function
    }

    /// Declared parameters, or `None` when the callable cannot be introspected.
    fn signature(&self) -> Option<Signature>;

    /// Whether the signature may be cached by identity.
    fn cacheable(&self) -> bool {
        true
    }

    fn doc(&self) -> Option<&str> {
        None
    }

    fn call(&self, args: Args) -> Result<Value>;

    /// Initializer used when this composite type is a forwarding target.
    fn initializer(&self) -> Option<CallableRef> {
        None
    }

    /// The callable this one decorates, if any.
    fn wrapped(&self) -> Option<CallableRef> {
        None
    }

    fn deprecation(&self) -> Option<&DeprecationRecord> {
        None
    }

    /// Name used in messages; constructors report their owning type.
    fn display_name(&self) -> String {
        match self.kind() {
            CallableKind::Constructor { owner } => owner,
            _ => self.name().to_string(),
        }
    }

    /// `module.display_name`, or the bare name outside any module.
    fn path(&self) -> String {
        if self.module().is_empty() {
            self.display_name()
        } else {
            format!("{}.{}", self.module(), self.display_name())
        }
    }
}

impl fmt::Debug for dyn Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("path", &self.path())
            .field("kind", &self.kind())
            .field("deprecated", &self.deprecation().is_some())
            .finish()
    }
}

/// Pointer identity of two callables.
pub fn same_callable(a: &CallableRef, b: &CallableRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

type Body = Arc<dyn Fn(&Bound) -> Result<Value> + Send + Sync>;

/// A plain callable built from an explicit signature and a body.
#[derive(Clone)]
pub struct Function {
    name: String,
    module: String,
    kind: CallableKind,
    signature: Option<Arc<Signature>>,
    cacheable: bool,
    doc: Option<String>,
    initializer: Option<CallableRef>,
    body: Body,
}

impl Function {
    pub fn new<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&Bound) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            module: String::new(),
            kind: CallableKind::Function,
            signature: Some(Arc::new(signature)),
            cacheable: true,
            doc: None,
            initializer: None,
            body: Arc::new(body),
        }
    }

    /// A callable whose parameters cannot be seen.
    pub fn opaque<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Bound) -> Result<Value> + Send + Sync + 'static,
    {
        let mut function = Self::new(name, Signature::opaque(), body);
        function.signature = None;
        function
    }

    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_kind(mut self, kind: CallableKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_initializer(mut self, initializer: CallableRef) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Opt out of signature caching.
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }

    pub fn into_ref(self) -> CallableRef {
        Arc::new(self)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("kind", &self.kind)
            .field("signature", &self.signature)
            .finish()
    }
}

impl Callable for Function {
    fn name(&self) -> &str {
        &self.name
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn kind(&self) -> CallableKind {
        self.kind.clone()
    }

    fn signature(&self) -> Option<Signature> {
        self.signature.as_deref().cloned()
    }

    fn cacheable(&self) -> bool {
        self.cacheable
    }

    fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    fn call(&self, args: Args) -> Result<Value> {
        let bound = match &self.signature {
            Some(signature) => bind(&self.display_name(), signature, args)?,
            None => Bound {
                callable: self.display_name(),
                values: args.keyword,
                rest: args.positional,
                extra: Kwargs::new(),
            },
        };
        (self.body)(&bound)
    }

    fn initializer(&self) -> Option<CallableRef> {
        self.initializer.clone()
    }
}

/// Arguments bound to a signature, as seen by a callable body.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    callable: String,
    values: Kwargs,
    rest: Vec<Value>,
    extra: Kwargs,
}

impl Bound {
    /// Named parameters, in declaration order.
    pub fn values(&self) -> &Kwargs {
        &self.values
    }

    /// Positional arguments collected by `*args`.
    pub fn rest(&self) -> &[Value] {
        &self.rest
    }

    /// Keyword arguments collected by `**kwargs`.
    pub fn extra(&self) -> &Kwargs {
        &self.extra
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| self.extra.get(name))
    }

    pub fn value(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| {
            DeprecationError::call(&self.callable, format!("argument '{}' is not bound", name))
        })
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        self.value(name)?.as_i64().ok_or_else(|| self.type_error(name, "an integer"))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        self.value(name)?.as_f64().ok_or_else(|| self.type_error(name, "a number"))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.value(name)?.as_str().ok_or_else(|| self.type_error(name, "a string"))
    }

    fn type_error(&self, name: &str, expected: &str) -> DeprecationError {
        DeprecationError::call(
            &self.callable,
            format!("argument '{}' must be {}", name, expected),
        )
    }
}

/// Bind a call against `signature` the way a native call would.
pub fn bind(callable: &str, signature: &Signature, args: Args) -> Result<Bound> {
    let Args {
        positional,
        keyword,
    } = args;
    let given = positional.len();
    let mut named = Kwargs::new();
    let mut rest = Vec::new();

    let mut values = positional.into_iter();
    for param in signature.positional_params() {
        match values.next() {
            Some(value) => {
                named.insert(param.name.clone(), value);
            }
            None => break,
        }
    }
    let overflow: Vec<Value> = values.collect();
    if !overflow.is_empty() {
        if !signature.has_var_positional() {
            return Err(arity_error(callable, signature, given));
        }
        rest = overflow;
    }

    let mut extra = Kwargs::new();
    for (name, value) in keyword {
        match signature.get(&name) {
            Some(param)
                if !param.kind.is_variadic() && param.kind != ParamKind::PositionalOnly =>
            {
                if named.contains_key(&name) {
                    return Err(DeprecationError::DuplicateArgument {
                        callable: callable.to_string(),
                        name,
                    });
                }
                named.insert(name, value);
            }
            _ if signature.has_var_keyword() => {
                extra.insert(name, value);
            }
            _ => {
                return Err(DeprecationError::UnexpectedKeyword {
                    callable: callable.to_string(),
                    name,
                })
            }
        }
    }

    let mut ordered = Kwargs::new();
    let mut missing = Vec::new();
    for param in signature.params() {
        if param.kind.is_variadic() {
            continue;
        }
        match named.remove(&param.name).or_else(|| param.default.clone()) {
            Some(value) => {
                ordered.insert(param.name.clone(), value);
            }
            None => missing.push(param.name.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(DeprecationError::MissingArguments {
            callable: callable.to_string(),
            names: missing,
        });
    }

    Ok(Bound {
        callable: callable.to_string(),
        values: ordered,
        rest,
        extra,
    })
}

/// Too many positional arguments for `signature`.
pub(crate) fn arity_error(callable: &str, signature: &Signature, given: usize) -> DeprecationError {
    let params: Vec<_> = signature.positional_params().collect();
    DeprecationError::Arity {
        callable: callable.to_string(),
        required: params.iter().filter(|p| !p.has_default()).count(),
        max: params.len(),
        given,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add() -> Function {
        Function::new(
            "add",
            Signature::new().arg("a").arg_default("b", 3),
            |b| Ok(json!(b.i64("a")? + b.i64("b")?)),
        )
        .in_module("math")
    }

    #[test]
    fn test_call_binds_positional_and_defaults() {
        let f = add();
        assert_eq!(f.call(Args::new().arg(2)).unwrap(), json!(5));
        assert_eq!(f.call(Args::new().arg(2).arg(5)).unwrap(), json!(7));
        assert_eq!(f.call(Args::new().kwarg("b", 1).kwarg("a", 1)).unwrap(), json!(2));
    }

    #[test]
    fn test_call_rejects_bad_arguments() {
        let f = add();
        let err = f.call(Args::new().arg(1).arg(2).arg(3)).unwrap_err();
        assert!(matches!(err, DeprecationError::Arity { required: 1, max: 2, given: 3, .. }));

        let err = f.call(Args::new().arg(1).kwarg("a", 2)).unwrap_err();
        assert!(matches!(err, DeprecationError::DuplicateArgument { .. }));

        let err = f.call(Args::new().kwarg("c", 2)).unwrap_err();
        assert!(matches!(err, DeprecationError::UnexpectedKeyword { .. }));

        let err = f.call(Args::new()).unwrap_err();
        assert_eq!(err.to_string(), "add() missing required argument: 'a'");
    }

    #[test]
    fn test_variadics_are_collected() {
        let sig = Signature::new()
            .arg("a")
            .var_positional("args")
            .var_keyword("kwargs");
        let bound = bind(
            "f",
            &sig,
            Args::new().arg(1).arg(2).arg(3).kwarg("z", true),
        )
        .unwrap();
        assert_eq!(bound.get("a"), Some(&json!(1)));
        assert_eq!(bound.rest(), &[json!(2), json!(3)]);
        assert_eq!(bound.extra().get("z"), Some(&json!(true)));
    }

    #[test]
    fn test_positional_only_cannot_be_keyword() {
        let sig = Signature::new().positional_only("a");
        let err = bind("f", &sig, Args::new().kwarg("a", 1)).unwrap_err();
        assert!(matches!(err, DeprecationError::UnexpectedKeyword { .. }));
    }

    #[test]
    fn test_constructor_display_name() {
        let init = Function::new("__init__", Signature::new(), |_| Ok(Value::Null))
            .in_module("shapes")
            .with_kind(CallableKind::Constructor {
                owner: "Circle".to_string(),
            });
        assert_eq!(init.display_name(), "Circle");
        assert_eq!(init.path(), "shapes.Circle");
        assert_eq!(add().path(), "math.add");
    }

    #[test]
    fn test_opaque_passes_everything_through() {
        let f = Function::opaque("native", |b| Ok(json!(b.rest().len() + b.values().len())));
        assert_eq!(f.call(Args::new().arg(1).kwarg("x", 2)).unwrap(), json!(2));
        assert!(f.signature().is_none());
    }

    #[test]
    fn test_same_callable() {
        let a = add().into_ref();
        let b = add().into_ref();
        assert!(same_callable(&a, &a.clone()));
        assert!(!same_callable(&a, &b));
    }
}
