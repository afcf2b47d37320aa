//! Deprecation metadata attached to every wrapped callable.

use crate::callable::{CallableRef, Kwargs};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Where calls to a deprecated callable go.
#[derive(Debug, Clone)]
pub enum Target {
    /// Forward every call to a replacement.
    Forward(CallableRef),
    /// Rename or retire arguments in place and keep calling the source.
    SelfRename,
    /// Warn and call the source unchanged.
    WarnOnly,
}

impl Target {
    pub fn is_self_rename(&self) -> bool {
        matches!(self, Self::SelfRename)
    }

    pub fn forward(&self) -> Option<&CallableRef> {
        match self {
            Self::Forward(target) => Some(target),
            _ => None,
        }
    }
}

/// What an old argument name becomes when forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedArg {
    Rename(String),
    Drop,
}

impl MappedArg {
    pub fn new_name(&self) -> Option<&str> {
        match self {
            Self::Rename(name) => Some(name),
            Self::Drop => None,
        }
    }
}

impl fmt::Display for MappedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename(name) => write!(f, "{}", name),
            Self::Drop => write!(f, "(dropped)"),
        }
    }
}

/// Ordered old-name to new-name table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgsMapping {
    entries: Vec<(String, MappedArg)>,
}

impl ArgsMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.with(old, MappedArg::Rename(new.into()))
    }

    pub fn drop_arg(self, old: impl Into<String>) -> Self {
        self.with(old, MappedArg::Drop)
    }

    /// Add or replace the entry for `old`, keeping its original position.
    pub fn with(mut self, old: impl Into<String>, mapped: MappedArg) -> Self {
        let old = old.into();
        match self.entries.iter_mut().find(|(name, _)| *name == old) {
            Some(entry) => entry.1 = mapped,
            None => self.entries.push((old, mapped)),
        }
        self
    }

    pub fn get(&self, old: &str) -> Option<&MappedArg> {
        self.entries
            .iter()
            .find(|(name, _)| name == old)
            .map(|(_, mapped)| mapped)
    }

    pub fn contains(&self, old: &str) -> bool {
        self.get(old).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappedArg)> {
        self.entries.iter().map(|(old, mapped)| (old.as_str(), mapped))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(old, _)| old.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Old names mapped onto themselves.
    pub fn identity_entries(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(old, mapped)| mapped.new_name() == Some(old.as_str()))
            .map(|(old, _)| old.clone())
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, MappedArg)> for ArgsMapping {
    fn from_iter<I: IntoIterator<Item = (K, MappedArg)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |mapping, (old, mapped)| mapping.with(old, mapped))
    }
}

impl Serialize for ArgsMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (old, mapped) in &self.entries {
            map.serialize_entry(old, &mapped.new_name())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ArgsMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = ArgsMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of old argument names to new names or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut mapping = ArgsMapping::new();
                while let Some((old, new)) = access.next_entry::<String, Option<String>>()? {
                    let mapped = match new {
                        Some(name) => MappedArg::Rename(name),
                        None => MappedArg::Drop,
                    };
                    mapping = mapping.with(old, mapped);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Configuration attached to a wrapper when it is created. Never mutated afterwards.
#[derive(Debug, Clone)]
pub struct DeprecationRecord {
    pub deprecated_in: String,
    pub remove_in: String,
    pub target: Target,
    pub args_mapping: Option<ArgsMapping>,
    pub args_extra: Option<Kwargs>,
    /// The decorated source, when it is itself a deprecation wrapper
    pub previous_layer: Option<CallableRef>,
}

impl DeprecationRecord {
    /// Snapshot suitable for reports.
    pub fn info(&self) -> RecordInfo {
        RecordInfo {
            deprecated_in: self.deprecated_in.clone(),
            remove_in: self.remove_in.clone(),
            target: match &self.target {
                Target::Forward(target) => TargetInfo::Forward {
                    path: target.path(),
                },
                Target::SelfRename => TargetInfo::SelfRename,
                Target::WarnOnly => TargetInfo::WarnOnly,
            },
            args_mapping: self.args_mapping.clone(),
            args_extra: self.args_extra.clone(),
        }
    }
}

/// Serializable view of a [`DeprecationRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordInfo {
    pub deprecated_in: String,
    pub remove_in: String,
    pub target: TargetInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_mapping: Option<ArgsMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_extra: Option<Kwargs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetInfo {
    Forward { path: String },
    SelfRename,
    WarnOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mapping_keeps_order_and_drops() {
        let yaml = r#"
preds: y_pred
yeah_arg: null
truth: y_true
"#;
        let mapping: ArgsMapping = serde_yaml::from_str(yaml).unwrap();
        let keys: Vec<_> = mapping.keys().collect();
        assert_eq!(keys, vec!["preds", "yeah_arg", "truth"]);
        assert_eq!(mapping.get("yeah_arg"), Some(&MappedArg::Drop));
        assert_eq!(
            mapping.get("preds"),
            Some(&MappedArg::Rename("y_pred".to_string()))
        );
    }

    #[test]
    fn test_identity_entries() {
        let mapping = ArgsMapping::new()
            .rename("a", "a")
            .rename("b", "c")
            .drop_arg("d");
        assert_eq!(mapping.identity_entries(), vec!["a".to_string()]);
    }

    #[test]
    fn test_with_replaces_existing_entry() {
        let mapping = ArgsMapping::new().rename("a", "b").rename("a", "c");
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("a").and_then(|m| m.new_name()), Some("c"));
    }

    #[test]
    fn test_serialize_mapping() {
        let mapping = ArgsMapping::new().rename("old", "new").drop_arg("gone");
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"old":"new","gone":null}"#);
    }
}
