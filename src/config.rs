//! Deprecation manifest for the audit tool.
//!
//! A manifest declares a package as modules of callables with explicit
//! signatures and their stacked deprecation layers. [`DeprecationManifest::build`]
//! turns it into a [`Module`] tree of stub callables wrapped exactly the way
//! application code would wrap them, so the audit and expiry engines can
//! inspect it.

use crate::audit::ScanOptions;
use crate::callable::{Bound, CallableKind, CallableRef, Function, Kwargs};
use crate::deprecated::{deprecated, DeprecatedBuilder};
use crate::namespace::Module;
use crate::record::{ArgsMapping, Target};
use crate::signature::{Param, Signature};
use crate::version::Version;
use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Root of a deprecation manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeprecationManifest {
    /// Top-level package name; every module lives under it
    pub package: String,

    /// Current package version, used when expiry checks do not pass one
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub modules: Vec<ModuleSpec>,

    #[serde(default)]
    pub audit: AuditSettings,
}

impl DeprecationManifest {
    /// Load a manifest from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a manifest from YAML text.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let manifest: Self = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.package.is_empty() {
            bail!("Package name cannot be empty");
        }
        if let Some(version) = &self.version {
            Version::parse(version)?;
        }

        let mut module_names = HashSet::new();
        for module in &self.modules {
            if module.name != self.package
                && !module.name.starts_with(&format!("{}.", self.package))
            {
                bail!(
                    "Module '{}' is outside package '{}'",
                    module.name,
                    self.package
                );
            }
            if !module_names.insert(module.name.as_str()) {
                bail!("Duplicate module: {}", module.name);
            }
            module.validate()?;
        }

        let index = self.index();
        for (path, (_, callable)) in &index {
            for layer in &callable.deprecations {
                if let Some(TargetSpec::Path(target)) = &layer.target {
                    if target != "self" && !index.contains_key(target.as_str()) {
                        bail!("Unresolvable target '{}' for callable: {}", target, path);
                    }
                }
            }
        }
        if let Some(cycle) = self.find_cycle() {
            bail!("Forwarding cycle: {}", cycle.join(" -> "));
        }

        self.audit.scan_options()?;
        Ok(())
    }

    /// Build the namespace tree described by the manifest.
    pub fn build(&self) -> anyhow::Result<Module> {
        self.validate()?;

        let mut builder = TreeBuilder {
            index: self.index(),
            built: HashMap::new(),
            in_progress: HashSet::new(),
        };
        let mut shells: HashMap<String, Module> = HashMap::new();
        for spec in &self.modules {
            let mut module = Module::new(&spec.name);
            if let Some(version) = &spec.version {
                module = module.with_version(version);
            }
            for callable in &spec.callables {
                let built = builder.callable(&format!("{}.{}", spec.name, callable.name))?;
                module = module.with_callable(&callable.name, built);
            }
            for (name, value) in &spec.values {
                module = module.with_value(name, value.clone());
            }
            shells.insert(spec.name.clone(), module);
        }

        let mut root = shells
            .remove(&self.package)
            .unwrap_or_else(|| Module::new(&self.package));
        if let Some(version) = &self.version {
            root = root.with_version(version);
        }

        let known: HashSet<&str> = self.modules.iter().map(|m| m.name.as_str()).collect();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for spec in self.modules.iter().filter(|m| m.name != self.package) {
            children
                .entry(parent_of(&spec.name, &known, &self.package))
                .or_default()
                .push(spec.name.clone());
        }
        Ok(assemble(root, &mut shells, &children))
    }

    fn index(&self) -> HashMap<String, (&ModuleSpec, &CallableSpec)> {
        self.modules
            .iter()
            .flat_map(|module| {
                module
                    .callables
                    .iter()
                    .map(move |callable| (format!("{}.{}", module.name, callable.name), (module, callable)))
            })
            .collect()
    }

    /// First forwarding cycle between callables, as a path list.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();
        for (path, (_, callable)) in self.index() {
            let targets = callable
                .deprecations
                .iter()
                .filter_map(|layer| match &layer.target {
                    Some(TargetSpec::Path(target)) if target != "self" && *target != path => {
                        Some(target.clone())
                    }
                    _ => None,
                })
                .collect();
            graph.insert(path, targets);
        }

        let mut done = HashSet::new();
        let mut nodes: Vec<&String> = graph.keys().collect();
        nodes.sort();
        for node in nodes {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(node, &graph, &mut done, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }
}

fn visit<'a>(
    node: &'a str,
    graph: &'a HashMap<String, Vec<String>>,
    done: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    if done.contains(node) {
        return None;
    }
    if let Some(start) = stack.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    stack.push(node);
    for next in graph.get(node).into_iter().flatten() {
        if let Some(cycle) = visit(next, graph, done, stack) {
            return Some(cycle);
        }
    }
    stack.pop();
    done.insert(node);
    None
}

/// Attach every declared child below `module`, in manifest order.
fn assemble(
    mut module: Module,
    shells: &mut HashMap<String, Module>,
    children: &HashMap<String, Vec<String>>,
) -> Module {
    let name = module.name().to_string();
    for child in children.get(&name).into_iter().flatten() {
        if let Some(shell) = shells.remove(child) {
            module = module.with_submodule(assemble(shell, shells, children));
        }
    }
    module
}

fn parent_of(name: &str, known: &HashSet<&str>, package: &str) -> String {
    let mut current = name;
    while let Some((prefix, _)) = current.rsplit_once('.') {
        if prefix == package || known.contains(prefix) {
            return prefix.to_string();
        }
        current = prefix;
    }
    package.to_string()
}

struct TreeBuilder<'a> {
    index: HashMap<String, (&'a ModuleSpec, &'a CallableSpec)>,
    built: HashMap<String, CallableRef>,
    in_progress: HashSet<String>,
}

impl TreeBuilder<'_> {
    /// The fully wrapped callable at `path`, building its targets first.
    fn callable(&mut self, path: &str) -> anyhow::Result<CallableRef> {
        if let Some(built) = self.built.get(path) {
            return Ok(built.clone());
        }
        if !self.in_progress.insert(path.to_string()) {
            bail!("Forwarding cycle through '{}'", path);
        }
        let (module, spec) = self
            .index
            .get(path)
            .copied()
            .ok_or_else(|| anyhow!("Unknown callable '{}'", path))?;

        let base = spec.stub(&module.name);
        let mut current = base.clone();
        for layer in &spec.deprecations {
            let target = match &layer.target {
                None | Some(TargetSpec::Flag(false)) => Target::WarnOnly,
                Some(TargetSpec::Flag(true)) => Target::SelfRename,
                Some(TargetSpec::Path(target)) if target == "self" => Target::SelfRename,
                Some(TargetSpec::Path(target)) if target == path => Target::Forward(base.clone()),
                Some(TargetSpec::Path(target)) => Target::Forward(self.callable(target)?),
            };
            current = layer
                .apply(deprecated(target))
                .update_docstring(spec.doc.is_some())
                .wrap_ref(current);
        }

        self.in_progress.remove(path);
        self.built.insert(path.to_string(), current.clone());
        Ok(current)
    }
}

/// One namespace of the package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    /// Fully qualified dotted name
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub callables: Vec<CallableSpec>,

    /// Plain values exposed by the module
    #[serde(default)]
    pub values: Kwargs,
}

impl ModuleSpec {
    fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for callable in &self.callables {
            if callable.name.is_empty() {
                bail!("Callable name cannot be empty in module: {}", self.name);
            }
            if !names.insert(callable.name.as_str()) {
                bail!("Duplicate callable '{}' in module: {}", callable.name, self.name);
            }
            callable.validate(&self.name)?;
        }
        Ok(())
    }
}

/// A callable and its deprecation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallableSpec {
    pub name: String,

    #[serde(default)]
    pub kind: KindSpec,

    /// Owning type of a constructor
    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub doc: Option<String>,

    /// Declared parameters; leave out for a callable that cannot be introspected
    #[serde(default)]
    pub params: Option<Vec<Param>>,

    /// Deprecation layers, innermost first
    #[serde(default)]
    pub deprecations: Vec<LayerSpec>,
}

impl CallableSpec {
    fn validate(&self, module: &str) -> anyhow::Result<()> {
        if self.kind == KindSpec::Constructor && self.owner.is_none() {
            bail!("Constructor '{}.{}' requires an owner", module, self.name);
        }
        if let Some(params) = &self.params {
            let mut seen = HashSet::new();
            for param in params {
                if !seen.insert(param.name.as_str()) {
                    bail!("Duplicate parameter '{}' in {}.{}", param.name, module, self.name);
                }
            }
        }
        for layer in &self.deprecations {
            if layer.target == Some(TargetSpec::Flag(false)) {
                bail!(
                    "`target: false` on {}.{} disables the deprecation; remove the layer instead",
                    module,
                    self.name
                );
            }
            if !layer.remove_in.is_empty() && Version::parse(&layer.remove_in).is_err() {
                tracing::warn!(
                    callable = %format!("{}.{}", module, self.name),
                    remove_in = %layer.remove_in,
                    "Removal version is not a valid version and will be ignored by expiry checks"
                );
            }
        }
        Ok(())
    }

    fn signature(&self) -> Option<Signature> {
        self.params.clone().map(Signature::from_params)
    }

    /// Undecorated callable echoing its bound arguments.
    fn stub(&self, module: &str) -> CallableRef {
        let function = match self.signature() {
            Some(signature) => Function::new(&self.name, signature, echo),
            None => Function::opaque(&self.name, echo),
        };
        let mut function = function
            .in_module(module)
            .with_kind(self.kind.to_callable_kind(self.owner.as_deref()));
        if let Some(doc) = &self.doc {
            function = function.with_doc(doc);
        }
        if self.kind == KindSpec::Record {
            let init = Function::new("__init__", self.signature().unwrap_or_default(), echo)
                .in_module(module)
                .with_kind(CallableKind::Constructor {
                    owner: self.name.clone(),
                });
            function = function.with_initializer(init.into_ref());
        }
        function.into_ref()
    }
}

fn echo(bound: &Bound) -> crate::error::Result<Value> {
    Ok(Value::Object(bound.values().clone()))
}

/// Structural kind of a declared callable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindSpec {
    #[default]
    Function,
    Method,
    Constructor,
    Record,
    Enum,
}

impl KindSpec {
    fn to_callable_kind(self, owner: Option<&str>) -> CallableKind {
        match self {
            Self::Function => CallableKind::Function,
            Self::Method => CallableKind::Method,
            Self::Constructor => CallableKind::Constructor {
                owner: owner.unwrap_or_default().to_string(),
            },
            Self::Record => CallableKind::Record,
            Self::Enum => CallableKind::Enum,
        }
    }
}

/// Deprecation target as written in the manifest.
///
/// `true` or `self` renames arguments in place, a dotted path forwards, and
/// an absent target only warns. `false` is rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Flag(bool),
    Path(String),
}

/// One deprecation layer applied to a callable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    #[serde(default)]
    pub target: Option<TargetSpec>,

    #[serde(default)]
    pub deprecated_in: String,

    #[serde(default)]
    pub remove_in: String,

    #[serde(default)]
    pub args_mapping: Option<ArgsMapping>,

    #[serde(default)]
    pub args_extra: Option<Kwargs>,

    /// Warnings to emit; negative means every call
    #[serde(default = "default_num_warns")]
    pub num_warns: i64,

    #[serde(default)]
    pub template: Option<String>,
}

fn default_num_warns() -> i64 {
    1
}

impl LayerSpec {
    fn apply(&self, builder: DeprecatedBuilder) -> DeprecatedBuilder {
        let mut builder = builder
            .deprecated_in(&self.deprecated_in)
            .remove_in(&self.remove_in)
            .num_warns(self.num_warns);
        if let Some(mapping) = &self.args_mapping {
            builder = builder.args_mapping(mapping.clone());
        }
        if let Some(extra) = &self.args_extra {
            builder = builder.args_extra(extra.clone());
        }
        if let Some(template) = &self.template {
            builder = builder.template(template);
        }
        builder
    }
}

/// Audit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSettings {
    /// Whether to scan submodules
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Glob patterns of module names or `module.member` paths to skip
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            recursive: true,
            ignore: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl AuditSettings {
    pub fn scan_options(&self) -> anyhow::Result<ScanOptions> {
        Ok(ScanOptions::new(self.recursive).with_ignore(&self.ignore)?)
    }
}
