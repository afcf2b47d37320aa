//! Error types raised by the forwarding engine and the audit tooling.

use thiserror::Error;

/// Errors produced while calling, resolving, auditing, or expiring deprecated callables.
#[derive(Debug, Error)]
pub enum DeprecationError {
    /// More positional arguments than the signature can take.
    #[error("{callable}() takes {} positional argument{} but {given} {} given",
        expected_count(.required, .max), plural(.max), was_were(.given))]
    Arity {
        callable: String,
        required: usize,
        max: usize,
        given: usize,
    },

    /// Resolved keyword arguments the forwarding target cannot accept.
    #[error("Failed mapping of `{source_name}`, arguments missing in target source: {missing:?}")]
    ArgumentMapping {
        source_name: String,
        missing: Vec<String>,
    },

    /// A skip predicate returned something other than a boolean.
    #[error("skip predicate of `{callable}` shall return bool, but got: {got}")]
    TypeConstraint { callable: String, got: String },

    /// Audit or expiry invoked on a callable that is not configured for it.
    #[error("{0}")]
    Configuration(String),

    /// The callable outlived its scheduled removal version.
    #[error("Callable `{callable}` was scheduled for removal in version {remove_in} but still exists in version {current}. Please delete this deprecated code.")]
    ExpiredDeprecation {
        callable: String,
        remove_in: String,
        current: String,
    },

    #[error("Failed to parse version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Could not determine version for package '{0}'. Ensure the package is registered or carries a version.")]
    VersionDetection(String),

    #[error("{callable}() got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword { callable: String, name: String },

    #[error("{callable}() got multiple values for argument '{name}'")]
    DuplicateArgument { callable: String, name: String },

    #[error("{callable}() missing required argument{}: {}", plural_of(.names), quoted(.names))]
    MissingArguments { callable: String, names: Vec<String> },

    /// Raised from inside a callable body.
    #[error("{callable}: {message}")]
    Call { callable: String, message: String },
}

impl DeprecationError {
    /// Error raised by a callable body.
    pub fn call(callable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Call {
            callable: callable.into(),
            message: message.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = DeprecationError> = std::result::Result<T, E>;

fn expected_count(required: &usize, max: &usize) -> String {
    if required == max {
        max.to_string()
    } else {
        format!("from {} to {}", required, max)
    }
}

fn plural(n: &usize) -> &'static str {
    if *n == 1 {
        ""
    } else {
        "s"
    }
}

fn plural_of(names: &[String]) -> &'static str {
    plural(&names.len())
}

fn was_were(n: &usize) -> &'static str {
    if *n == 1 {
        "was"
    } else {
        "were"
    }
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{}'", n))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_message_exact() {
        let err = DeprecationError::Arity {
            callable: "my_func".to_string(),
            required: 2,
            max: 2,
            given: 3,
        };
        assert_eq!(
            err.to_string(),
            "my_func() takes 2 positional arguments but 3 were given"
        );
    }

    #[test]
    fn test_arity_message_range() {
        let err = DeprecationError::Arity {
            callable: "my_func".to_string(),
            required: 1,
            max: 3,
            given: 4,
        };
        assert_eq!(
            err.to_string(),
            "my_func() takes from 1 to 3 positional arguments but 4 were given"
        );
    }

    #[test]
    fn test_missing_arguments_message() {
        let err = DeprecationError::MissingArguments {
            callable: "f".to_string(),
            names: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "f() missing required arguments: 'a', 'b'");
    }
}
