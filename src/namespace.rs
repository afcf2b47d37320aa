//! In-memory namespaces scanned by the audit engine.
//!
//! A [`Module`] holds named members (callables or plain values) and
//! submodules. Submodules are either attached directly or loaded on first use
//! through a loader closure; a loader that fails is logged and skipped so a
//! single broken namespace never aborts a scan.

use crate::callable::CallableRef;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces a submodule on demand.
pub type Loader = Arc<dyn Fn() -> anyhow::Result<Module> + Send + Sync>;

/// A named entry of a namespace.
#[derive(Debug, Clone)]
pub enum Member {
    Callable(CallableRef),
    Value(Value),
}

impl Member {
    pub fn as_callable(&self) -> Option<&CallableRef> {
        match self {
            Self::Callable(callable) => Some(callable),
            Self::Value(_) => None,
        }
    }
}

enum Submodule {
    Loaded(Arc<Module>),
    Lazy {
        name: String,
        loader: Loader,
        loaded: OnceCell<Arc<Module>>,
    },
}

impl Submodule {
    fn name(&self) -> &str {
        match self {
            Self::Loaded(module) => module.name(),
            Self::Lazy { name, .. } => name,
        }
    }

    fn load(&self) -> Option<Arc<Module>> {
        match self {
            Self::Loaded(module) => Some(module.clone()),
            Self::Lazy {
                name,
                loader,
                loaded,
            } => match loaded.get_or_try_init(|| loader().map(Arc::new)) {
                Ok(module) => Some(module.clone()),
                Err(e) => {
                    warn!(module = %name, error = %e, "Skipping namespace that failed to load");
                    None
                }
            },
        }
    }
}

/// A namespace of callables and values.
pub struct Module {
    name: String,
    version: Option<String>,
    members: Vec<(String, Member)>,
    submodules: Vec<Submodule>,
}

impl Module {
    /// Create an empty module with a fully qualified dotted name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            members: Vec::new(),
            submodules: Vec::new(),
        }
    }

    /// Version attribute of the module, consulted by expiry auto-detection.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_callable(self, name: impl Into<String>, callable: CallableRef) -> Self {
        self.with_member(name, Member::Callable(callable))
    }

    pub fn with_value(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_member(name, Member::Value(value.into()))
    }

    /// Add or replace a member.
    pub fn with_member(mut self, name: impl Into<String>, member: Member) -> Self {
        let name = name.into();
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = member,
            None => self.members.push((name, member)),
        }
        self
    }

    pub fn with_submodule(mut self, module: Module) -> Self {
        self.submodules.push(Submodule::Loaded(Arc::new(module)));
        self
    }

    /// Register a submodule loaded the first time it is visited.
    pub fn with_lazy_submodule<F>(mut self, name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Module> + Send + Sync + 'static,
    {
        self.submodules.push(Submodule::Lazy {
            name: name.into(),
            loader: Arc::new(loader),
            loaded: OnceCell::new(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// First component of the dotted name.
    pub fn top_level_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, member)| member)
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(name, member)| (name.as_str(), member))
    }

    pub fn callables(&self) -> impl Iterator<Item = (&str, &CallableRef)> {
        self.members()
            .filter_map(|(name, member)| member.as_callable().map(|c| (name, c)))
    }

    pub fn submodule_names(&self) -> impl Iterator<Item = &str> {
        self.submodules.iter().map(Submodule::name)
    }

    /// Direct submodules, loading lazy ones. Failed loads are left out.
    pub fn submodules(&self) -> Vec<Arc<Module>> {
        self.submodules.iter().filter_map(Submodule::load).collect()
    }

    /// Call `visit` on this module and, when `recursive`, on every reachable
    /// submodule. Each module name is visited at most once.
    pub fn walk(&self, recursive: bool, visit: &mut dyn FnMut(&Module)) {
        let mut seen = HashSet::new();
        self.walk_inner(recursive, &mut seen, visit);
    }

    fn walk_inner(&self, recursive: bool, seen: &mut HashSet<String>, visit: &mut dyn FnMut(&Module)) {
        if !seen.insert(self.name.clone()) {
            debug!(module = %self.name, "Namespace already visited");
            return;
        }
        visit(self);
        if recursive {
            for module in self.submodules() {
                module.walk_inner(true, seen, visit);
            }
        }
    }

    /// Look up a dotted member path such as `sub.module.func` relative to this module.
    pub fn resolve(&self, path: &str) -> Option<Member> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match rest {
            None => self.get(head).cloned(),
            Some(rest) => self
                .submodules()
                .into_iter()
                .find(|m| m.name.rsplit('.').next() == Some(head))
                .and_then(|m| m.resolve(rest)),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("members", &self.members.len())
            .field("submodules", &self.submodule_names().collect::<Vec<_>>())
            .finish()
    }
}

static PACKAGES: Lazy<RwLock<HashMap<String, String>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Record the installed version of a package.
pub fn register_package(name: impl Into<String>, version: impl Into<String>) {
    PACKAGES.write().insert(name.into(), version.into());
}

/// Installed version of a package, if registered.
pub fn package_version(name: &str) -> Option<String> {
    PACKAGES.read().get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::Function;
    use crate::signature::Signature;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop(name: &str) -> CallableRef {
        Function::new(name, Signature::new(), |_| Ok(Value::Null)).into_ref()
    }

    fn visited(root: &Module, recursive: bool) -> Vec<String> {
        let mut names = Vec::new();
        root.walk(recursive, &mut |m| names.push(m.name().to_string()));
        names
    }

    #[test]
    fn test_walk_recursive_and_flat() {
        let root = Module::new("pkg")
            .with_callable("f", noop("f"))
            .with_submodule(Module::new("pkg.a").with_submodule(Module::new("pkg.a.b")))
            .with_submodule(Module::new("pkg.c"));

        assert_eq!(visited(&root, false), vec!["pkg"]);
        assert_eq!(visited(&root, true), vec!["pkg", "pkg.a", "pkg.a.b", "pkg.c"]);
    }

    #[test]
    fn test_failing_loader_is_skipped() {
        let root = Module::new("pkg")
            .with_lazy_submodule("pkg.broken", || Err(anyhow::anyhow!("import failed")))
            .with_lazy_submodule("pkg.ok", || Ok(Module::new("pkg.ok")));
        assert_eq!(visited(&root, true), vec!["pkg", "pkg.ok"]);
        assert_eq!(root.submodule_names().count(), 2);
    }

    #[test]
    fn test_lazy_submodule_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let root = Module::new("pkg").with_lazy_submodule("pkg.lazy", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Module::new("pkg.lazy"))
        });
        visited(&root, true);
        visited(&root, true);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_members_and_resolve() {
        let root = Module::new("pkg")
            .with_callable("f", noop("f"))
            .with_value("VERSION", "1.0")
            .with_submodule(Module::new("pkg.sub").with_callable("g", noop("g")));

        assert_eq!(root.callables().count(), 1);
        assert_eq!(root.members().count(), 2);
        assert!(matches!(root.resolve("VERSION"), Some(Member::Value(_))));
        let g = root.resolve("sub.g").and_then(|m| m.as_callable().cloned());
        assert_eq!(g.map(|g| g.name().to_string()), Some("g".to_string()));
        assert!(root.resolve("sub.missing").is_none());
        assert_eq!(Module::new("pkg.sub.deep").top_level_name(), "pkg");
    }

    #[test]
    fn test_package_registry() {
        assert_eq!(package_version("namespace-test-unregistered"), None);
        register_package("namespace-test-pkg", "1.2.3");
        assert_eq!(package_version("namespace-test-pkg").as_deref(), Some("1.2.3"));
    }
}
