//! Argument resolution: positional-to-keyword conversion, defaults, renaming,
//! injection, and validation against a forwarding target.

use crate::callable::{arity_error, Args, Kwargs};
use crate::error::{DeprecationError, Result};
use crate::record::{ArgsMapping, MappedArg};
use crate::signature::{Param, ParamKind, Signature};
use serde_json::Value;

/// Move positional arguments onto the names of the positional parameters.
///
/// Mapping stops at `*args`; whatever is left stays positional in the
/// returned [`Args`]. Keyword arguments are applied after the converted
/// positionals. Opaque signatures pass the call through untouched.
pub fn to_keyword_args(callable: &str, signature: &Signature, args: Args) -> Result<Args> {
    if signature.is_opaque() || args.positional.is_empty() {
        return Ok(args);
    }

    let Args {
        positional,
        keyword,
    } = args;
    let given = positional.len();
    let mut converted = Kwargs::new();
    let mut values = positional.into_iter();
    for param in signature.positional_params() {
        match values.next() {
            Some(value) => {
                converted.insert(param.name.clone(), value);
            }
            None => break,
        }
    }

    let rest: Vec<_> = values.collect();
    if !rest.is_empty() && !signature.has_var_positional() {
        return Err(arity_error(callable, signature, given));
    }

    converted.extend(keyword);
    Ok(Args {
        positional: rest,
        keyword: converted,
    })
}

/// Insert declared defaults for every parameter the caller did not supply.
pub fn fill_defaults(signature: &Signature, mut kwargs: Kwargs) -> Kwargs {
    for (name, default) in signature.defaults() {
        if !kwargs.contains_key(name) {
            kwargs.insert(name.to_string(), default.clone());
        }
    }
    kwargs
}

/// Rename or drop mapped keys; unmapped keys pass through in place.
pub fn apply_mapping(kwargs: Kwargs, mapping: &ArgsMapping) -> Kwargs {
    let mut mapped = Kwargs::new();
    for (name, value) in kwargs {
        match mapping.get(&name) {
            Some(MappedArg::Rename(new_name)) => {
                mapped.insert(new_name.clone(), value);
            }
            Some(MappedArg::Drop) => {}
            None => {
                mapped.insert(name, value);
            }
        }
    }
    mapped
}

/// Set every extra argument, overriding caller-supplied values.
pub fn apply_extra(mut kwargs: Kwargs, extra: &Kwargs) -> Kwargs {
    for (name, value) in extra {
        kwargs.insert(name.clone(), value.clone());
    }
    kwargs
}

/// Keys of `kwargs` that `target` has no parameter for.
///
/// Empty when the target takes `**kwargs` or cannot be introspected.
pub fn unknown_keys(kwargs: &Kwargs, target: &Signature) -> Vec<String> {
    if target.is_opaque() || target.has_var_keyword() {
        return Vec::new();
    }
    kwargs
        .keys()
        .filter(|name| !target.accepts_keyword(name))
        .cloned()
        .collect()
}

/// Check that `target` can accept every resolved keyword argument.
pub fn validate_against_target(source_name: &str, kwargs: &Kwargs, target: &Signature) -> Result<()> {
    let missing = unknown_keys(kwargs, target);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DeprecationError::ArgumentMapping {
            source_name: source_name.to_string(),
            missing,
        })
    }
}

/// Turn resolved keywords back into a call.
///
/// Positional-only parameters always go back by position. With an unmapped
/// `*args` tail, every positional parameter in front of it does too, taking
/// its default when the keyword was mapped away; a parameter with neither
/// fails the call instead of letting the tail shift onto it.
pub(crate) fn reassemble(
    callable: &str,
    signature: &Signature,
    mut kwargs: Kwargs,
    rest: Vec<Value>,
) -> Result<Args> {
    if signature.is_opaque() {
        return Ok(Args {
            positional: rest,
            keyword: kwargs,
        });
    }

    let params: Vec<&Param> = signature.positional_params().collect();
    let placed = if rest.is_empty() {
        params
            .iter()
            .rposition(|p| p.kind == ParamKind::PositionalOnly && kwargs.contains_key(&p.name))
            .map_or(0, |last| last + 1)
    } else {
        params.len()
    };

    let mut positional = Vec::with_capacity(placed + rest.len());
    let mut missing = Vec::new();
    for param in &params[..placed] {
        match kwargs.remove(&param.name).or_else(|| param.default.clone()) {
            Some(value) => positional.push(value),
            None => missing.push(param.name.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(DeprecationError::MissingArguments {
            callable: callable.to_string(),
            names: missing,
        });
    }

    positional.extend(rest);
    Ok(Args {
        positional,
        keyword: kwargs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(value: Value) -> Kwargs {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_no_positional_args_returns_kwargs_unchanged() {
        let sig = Signature::new().arg("a").arg("b");
        let args = to_keyword_args("f", &sig, Args::new().kwarg("a", 1)).unwrap();
        assert_eq!(args.keyword, kwargs(json!({"a": 1})));
    }

    #[test]
    fn test_maps_positional_to_param_names() {
        let sig = Signature::new().arg("a").arg("b").arg_default("c", 3.0);
        let args = to_keyword_args("f", &sig, Args::new().arg(1).arg("hello")).unwrap();
        assert_eq!(args.keyword, kwargs(json!({"a": 1, "b": "hello"})));
        assert!(args.positional.is_empty());
    }

    #[test]
    fn test_merges_with_existing_kwargs() {
        let sig = Signature::new().arg("a").arg("b").arg_default("c", 0);
        let args = to_keyword_args("f", &sig, Args::new().arg(10).kwarg("c", 99)).unwrap();
        assert_eq!(args.keyword, kwargs(json!({"a": 10, "c": 99})));
    }

    #[test]
    fn test_stops_at_var_positional() {
        let sig = Signature::new().arg("a").var_positional("args");
        let args = to_keyword_args("f", &sig, Args::new().arg(1).arg(2).arg(3)).unwrap();
        assert_eq!(args.keyword, kwargs(json!({"a": 1})));
        assert_eq!(args.positional, vec![json!(2), json!(3)]);
    }

    #[test]
    fn test_too_many_positional_is_arity_error() {
        let sig = Signature::new().arg("a").arg("b");
        let err = to_keyword_args("my_func", &sig, Args::new().arg(1).arg(2).arg(3)).unwrap_err();
        assert!(err.to_string().contains("takes 2 positional"));

        let sig = Signature::new().arg("a").arg_default("b", 1);
        let err = to_keyword_args("my_func", &sig, Args::new().arg(1).arg(2).arg(3)).unwrap_err();
        assert!(err.to_string().contains("takes from 1 to 2 positional"));
    }

    #[test]
    fn test_keyword_only_is_not_positional() {
        let sig = Signature::new().arg("a").keyword_only("b", None);
        assert!(to_keyword_args("f", &sig, Args::new().arg(1).arg(2)).is_err());
    }

    #[test]
    fn test_fill_defaults() {
        let sig = Signature::new()
            .arg("required")
            .arg_default("a", 1)
            .arg_default("b", 2);
        let filled = fill_defaults(&sig, kwargs(json!({"b": 20})));
        assert_eq!(filled, kwargs(json!({"b": 20, "a": 1})));
        assert!(!filled.contains_key("required"));
    }

    #[test]
    fn test_fill_defaults_is_idempotent() {
        let sig = Signature::new().arg_default("a", 1).arg_default("b", 2);
        let once = fill_defaults(&sig, kwargs(json!({"a": 5})));
        let twice = fill_defaults(&sig, once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_apply_mapping_renames_and_drops() {
        let mapping = ArgsMapping::new().rename("preds", "y_pred").drop_arg("yeah_arg");
        let mapped = apply_mapping(
            kwargs(json!({"preds": [1], "y_true": [0], "yeah_arg": 1.23})),
            &mapping,
        );
        assert_eq!(mapped, kwargs(json!({"y_pred": [1], "y_true": [0]})));
    }

    #[test]
    fn test_apply_extra_overrides() {
        let extra = kwargs(json!({"y_pred": [0, 1]}));
        let applied = apply_extra(kwargs(json!({"y_pred": [1, 1], "y_true": [0]})), &extra);
        assert_eq!(applied.get("y_pred"), Some(&json!([0, 1])));
        assert_eq!(applied.len(), 2);
    }

    #[test]
    fn test_validate_against_target() {
        let target = Signature::new().arg("a").arg("b");
        assert!(validate_against_target("old", &kwargs(json!({"a": 1})), &target).is_ok());

        let err = validate_against_target("old", &kwargs(json!({"a": 1, "c": 2})), &target)
            .unwrap_err();
        match err {
            DeprecationError::ArgumentMapping {
                source_name,
                missing,
            } => {
                assert_eq!(source_name, "old");
                assert_eq!(missing, vec!["c".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let catch_all = Signature::new().arg("a").var_keyword("kwargs");
        assert!(validate_against_target("old", &kwargs(json!({"zzz": 1})), &catch_all).is_ok());
    }

    #[test]
    fn test_reassemble_restores_positional_tail() {
        let sig = Signature::new().arg("a").arg("b").var_positional("args");
        let args = reassemble("f", &sig, kwargs(json!({"b": 2, "a": 1, "k": 0})), vec![json!(3)]).unwrap();
        assert_eq!(args.positional, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(args.keyword, kwargs(json!({"k": 0})));
    }

    #[test]
    fn test_reassemble_places_positional_only_params() {
        let sig = Signature::new()
            .positional_only("a")
            .positional_only("b")
            .arg("c");
        let args = reassemble("f", &sig, kwargs(json!({"c": 3, "b": 2, "a": 1})), Vec::new()).unwrap();
        assert_eq!(args.positional, vec![json!(1), json!(2)]);
        assert_eq!(args.keyword, kwargs(json!({"c": 3})));

        // trailing positional-only parameters without a value are left to binding
        let args = reassemble("f", &sig, kwargs(json!({"a": 1})), Vec::new()).unwrap();
        assert_eq!(args.positional, vec![json!(1)]);
        assert!(args.keyword.is_empty());
    }

    #[test]
    fn test_reassemble_never_shifts_tail() {
        let sig = Signature::new()
            .arg_default("old", 0)
            .arg_default("new", 0)
            .var_positional("args");
        let args = reassemble("f", &sig, kwargs(json!({"new": 2})), vec![json!(3)]).unwrap();
        assert_eq!(args.positional, vec![json!(0), json!(2), json!(3)]);

        let required = Signature::new().arg("old").arg("new").var_positional("args");
        let err = reassemble("f", &required, kwargs(json!({"new": 2})), vec![json!(3)]).unwrap_err();
        assert!(matches!(
            err,
            DeprecationError::MissingArguments { ref names, .. } if names == &vec!["old".to_string()]
        ));
    }
}
